use std::{
	sync::{
		atomic::{AtomicBool, AtomicUsize, Ordering},
		Arc,
	},
	thread::{self, JoinHandle},
	time::Instant,
};

use tracing::{debug, error, trace, trace_span, warn};

use super::{
	error::{JobError, JobSystemError},
	job::{panic_reason, JobOutcome, ReportSender},
	queue::JobQueue,
};

pub type WorkerId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
	Idle,
	Busy,
}

#[derive(Debug)]
pub(crate) struct WorkerStatus {
	busy: AtomicBool,
}

impl WorkerStatus {
	const fn new() -> Self {
		Self {
			busy: AtomicBool::new(false),
		}
	}

	pub(crate) fn set(&self, state: WorkerState) {
		self.busy
			.store(state == WorkerState::Busy, Ordering::Release);
	}

	pub(crate) fn get(&self) -> WorkerState {
		if self.busy.load(Ordering::Acquire) {
			WorkerState::Busy
		} else {
			WorkerState::Idle
		}
	}
}

/// Counts worker threads that are still running, shared with whoever wants to check that a
/// shutdown really joined every thread.
#[derive(Debug, Clone, Default)]
pub struct WorkerLiveness(Arc<AtomicUsize>);

impl WorkerLiveness {
	#[must_use]
	pub fn count(&self) -> usize {
		self.0.load(Ordering::Acquire)
	}

	fn track(&self) -> LivenessGuard {
		self.0.fetch_add(1, Ordering::AcqRel);
		LivenessGuard(self.clone())
	}
}

struct LivenessGuard(WorkerLiveness);

impl Drop for LivenessGuard {
	fn drop(&mut self) {
		(self.0).0.fetch_sub(1, Ordering::AcqRel);
	}
}

pub(crate) struct WorkerBuilder {
	id: WorkerId,
	is_engine_worker: bool,
	thread_name: String,
	stack_size: Option<usize>,
}

impl WorkerBuilder {
	pub(crate) fn new(id: WorkerId, is_engine_worker: bool, thread_name_prefix: &str) -> Self {
		Self {
			id,
			is_engine_worker,
			thread_name: format!("{thread_name_prefix}-{id}"),
			stack_size: None,
		}
	}

	pub(crate) const fn stack_size(mut self, stack_size: Option<usize>) -> Self {
		self.stack_size = stack_size;
		self
	}

	pub(crate) fn build(
		self,
		queue: Arc<JobQueue>,
		reports: ReportSender,
		liveness: &WorkerLiveness,
	) -> Result<JobWorker, JobSystemError> {
		let Self {
			id,
			is_engine_worker,
			thread_name,
			stack_size,
		} = self;

		let status = Arc::new(WorkerStatus::new());

		let mut builder = thread::Builder::new().name(thread_name);
		if let Some(stack_size) = stack_size {
			builder = builder.stack_size(stack_size);
		}

		let handle = builder
			.spawn({
				let status = Arc::clone(&status);
				let guard = liveness.track();

				move || {
					let _guard = guard;

					trace_span!("job_worker", worker_id = id, is_engine_worker)
						.in_scope(|| run(id, is_engine_worker, &queue, &status, &reports));
				}
			})
			.map_err(|source| JobSystemError::WorkerSpawn {
				worker_id: id,
				source,
			})?;

		Ok(JobWorker {
			id,
			is_engine_worker,
			status,
			handle: Some(handle),
		})
	}
}

/// One pool thread, pulling jobs from the shared queue until the manager stops it.
#[derive(Debug)]
pub struct JobWorker {
	id: WorkerId,
	is_engine_worker: bool,
	status: Arc<WorkerStatus>,
	handle: Option<JoinHandle<()>>,
}

impl JobWorker {
	#[must_use]
	pub const fn id(&self) -> WorkerId {
		self.id
	}

	/// The reserved slot, only running jobs submitted for the engine worker and left out of idle
	/// checks.
	#[must_use]
	pub const fn is_engine_worker(&self) -> bool {
		self.is_engine_worker
	}

	#[must_use]
	pub fn state(&self) -> WorkerState {
		self.status.get()
	}

	#[must_use]
	pub const fn is_running(&self) -> bool {
		self.handle.is_some()
	}

	pub(crate) fn status(&self) -> &WorkerStatus {
		&self.status
	}

	pub(crate) fn join(&mut self) {
		if let Some(handle) = self.handle.take() {
			if let Err(payload) = handle.join() {
				error!(
					worker_id = self.id,
					reason = %panic_reason(payload.as_ref()),
					"Worker thread critically failed"
				);
			}
		} else {
			warn!(
				worker_id = self.id,
				"Trying to join a worker that was already joined"
			);
		}
	}
}

fn run(
	id: WorkerId,
	is_engine_worker: bool,
	queue: &JobQueue,
	status: &WorkerStatus,
	reports: &ReportSender,
) {
	trace!("Worker starting...");

	while let Some(mut job) = queue.next_job(status, is_engine_worker) {
		let started_at = Instant::now();

		if !job.silent {
			trace!(job_id = %job.id, name = %job.name, "Running job");
		}

		let outcome = job.execute();

		if !job.silent {
			match &outcome {
				JobOutcome::Completed => {}
				JobOutcome::Failed(e @ JobError::Canceled(_)) => {
					debug!(job_id = %job.id, name = %job.name, %e, "Skipped canceled job");
				}
				JobOutcome::Failed(e) => {
					error!(job_id = %job.id, name = %job.name, %e, "Job failed");
				}
			}
		}

		job.finish(outcome, Some(id), started_at.elapsed(), reports);

		status.set(WorkerState::Idle);
	}

	debug!("Worker received shutdown signal and exited");
}
