use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};
use tracing::trace;

use super::{
	job::Job,
	worker::{WorkerState, WorkerStatus},
};

const JOB_QUEUE_INITIAL_SIZE: usize = 64;

#[derive(Debug)]
struct QueueState {
	jobs: VecDeque<Job>,
	engine_jobs: VecDeque<Job>,
	stopping: bool,
}

/// FIFO shared by every regular worker, plus a separate lane only the reserved engine worker pulls
/// from. A worker pops a job and flips to [`WorkerState::Busy`] inside the same critical section,
/// so a job is always either queued or owned by a busy worker.
#[derive(Debug)]
pub(crate) struct JobQueue {
	state: Mutex<QueueState>,
	job_available: Condvar,
	engine_job_available: Condvar,
	has_engine_worker: bool,
}

impl JobQueue {
	pub(crate) fn new(has_engine_worker: bool) -> Self {
		Self {
			state: Mutex::new(QueueState {
				jobs: VecDeque::with_capacity(JOB_QUEUE_INITIAL_SIZE),
				engine_jobs: VecDeque::new(),
				stopping: false,
			}),
			job_available: Condvar::new(),
			engine_job_available: Condvar::new(),
			has_engine_worker,
		}
	}

	const fn goes_to_engine(&self, job: &Job) -> bool {
		self.has_engine_worker && job.on_engine_worker
	}

	pub(crate) fn push(&self, job: Job) {
		if self.goes_to_engine(&job) {
			self.state.lock().engine_jobs.push_back(job);
			self.engine_job_available.notify_one();
		} else {
			self.state.lock().jobs.push_back(job);
			self.job_available.notify_one();
		}
	}

	pub(crate) fn push_many(&self, jobs: Vec<Job>) {
		let (mut regular, mut engine) = (0, 0);

		{
			let mut state = self.state.lock();

			for job in jobs {
				if self.goes_to_engine(&job) {
					state.engine_jobs.push_back(job);
					engine += 1;
				} else {
					state.jobs.push_back(job);
					regular += 1;
				}
			}
		}

		if engine > 0 {
			self.engine_job_available.notify_one();
		}

		for _ in 0..regular {
			if !self.job_available.notify_one() {
				break;
			}
		}
	}

	/// Blocks until a job is available on the worker's lane, returning `None` once the queue is
	/// stopping.
	///
	/// The stop flag is only checked while idle, so a worker always finishes its current job first.
	pub(crate) fn next_job(&self, status: &WorkerStatus, is_engine_worker: bool) -> Option<Job> {
		let lane_available = if is_engine_worker {
			&self.engine_job_available
		} else {
			&self.job_available
		};

		let mut state = self.state.lock();

		loop {
			if state.stopping {
				return None;
			}

			let lane = if is_engine_worker {
				&mut state.engine_jobs
			} else {
				&mut state.jobs
			};

			if let Some(job) = lane.pop_front() {
				status.set(WorkerState::Busy);
				return Some(job);
			}

			lane_available.wait(&mut state);
		}
	}

	pub(crate) fn stop(&self) {
		self.state.lock().stopping = true;
		self.job_available.notify_all();
		self.engine_job_available.notify_all();

		trace!("Job queue is stopping, all workers notified");
	}

	/// Takes every job that no worker claimed, from both lanes.
	pub(crate) fn drain(&self) -> Vec<Job> {
		let mut state = self.state.lock();
		let QueueState {
			jobs, engine_jobs, ..
		} = &mut *state;

		jobs.drain(..).chain(engine_jobs.drain(..)).collect()
	}

	pub(crate) fn len(&self) -> usize {
		let state = self.state.lock();
		state.jobs.len() + state.engine_jobs.len()
	}

	/// Checks the regular lane and the given worker states under the queue lock, so no worker can be
	/// caught between popping a job and reporting itself busy.
	pub(crate) fn is_idle<'status>(
		&self,
		mut statuses: impl Iterator<Item = &'status WorkerStatus>,
	) -> bool {
		let state = self.state.lock();

		state.jobs.is_empty() && statuses.all(|status| status.get() == WorkerState::Idle)
	}
}
