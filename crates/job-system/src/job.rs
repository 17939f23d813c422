use std::{
	any::Any,
	fmt,
	panic::{self, AssertUnwindSafe},
	sync::{
		atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering},
		Arc,
	},
	time::Duration,
};

use async_channel as chan;
use tokio::sync::oneshot;
use tracing::{trace, warn};

use super::{catalog::JobCatalog, error::JobError, handle::JobHandle, worker::WorkerId};

static NEXT_JOB_ID: AtomicU64 = AtomicU64::new(1);

/// Process-wide job identifier, assigned in submission order and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct JobId(u64);

impl JobId {
	pub(crate) fn next() -> Self {
		Self(NEXT_JOB_ID.fetch_add(1, Ordering::Relaxed))
	}

	#[must_use]
	pub const fn as_u64(self) -> u64 {
		self.0
	}
}

impl fmt::Display for JobId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		self.0.fmt(f)
	}
}

/// Name, silent flag, catalog membership and target worker for a submitted job.
///
/// Silent jobs produce no submission, failure or completion logs, which is what fire-and-forget
/// per-frame work usually wants.
#[derive(Debug, Clone, Default)]
pub struct JobOptions {
	pub(crate) name: String,
	pub(crate) silent: bool,
	pub(crate) catalog: Option<Arc<JobCatalog>>,
	pub(crate) on_engine_worker: bool,
}

impl JobOptions {
	#[must_use]
	pub fn named(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			..Default::default()
		}
	}

	#[must_use]
	pub const fn silent(mut self) -> Self {
		self.silent = true;
		self
	}

	#[must_use]
	pub fn with_silent(mut self, silent: bool) -> Self {
		self.silent = silent;
		self
	}

	#[must_use]
	pub fn in_catalog(mut self, catalog: &Arc<JobCatalog>) -> Self {
		self.catalog = Some(Arc::clone(catalog));
		self
	}

	/// Runs the job on the reserved engine worker, which never takes regular jobs. Without a
	/// reserved worker (single worker pools) the job goes to the shared queue like any other.
	#[must_use]
	pub const fn on_engine_worker(mut self) -> Self {
		self.on_engine_worker = true;
		self
	}
}

const QUEUED: u8 = 0;
const RUNNING: u8 = 1;
const CANCELED: u8 = 2;

/// Status cell shared between a queued job and its handle, deciding who wins between a worker
/// claiming the job and the holder canceling it.
#[derive(Debug)]
pub(crate) struct JobWorktable {
	status: AtomicU8,
}

impl JobWorktable {
	const fn new() -> Self {
		Self {
			status: AtomicU8::new(QUEUED),
		}
	}

	pub(crate) fn claim(&self) -> bool {
		self.status
			.compare_exchange(QUEUED, RUNNING, Ordering::AcqRel, Ordering::Acquire)
			.is_ok()
	}

	pub(crate) fn cancel(&self) -> bool {
		self.status
			.compare_exchange(QUEUED, CANCELED, Ordering::AcqRel, Ordering::Acquire)
			.is_ok()
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum JobOutcome {
	Completed,
	Failed(JobError),
}

impl JobOutcome {
	pub(crate) const fn is_failure(&self) -> bool {
		matches!(self, Self::Failed(_))
	}
}

/// Type erased job body, executed or rejected once and then delivered to the handle.
///
/// The wrapped closure reports failures as a plain reason, the body turns it (or a panic) into a
/// [`JobError`] carrying the job id.
pub(crate) trait JobBody: Send {
	fn execute(&mut self) -> JobOutcome;

	fn reject(&mut self, error: JobError) -> JobOutcome;

	/// Sends the stored result to the handle, returning `false` if the handle was already dropped.
	fn deliver(self: Box<Self>) -> bool;
}

struct Deliverable<T, F> {
	id: JobId,
	task: Option<F>,
	result: Option<Result<T, JobError>>,
	done_tx: oneshot::Sender<Result<T, JobError>>,
}

impl<T, F> JobBody for Deliverable<T, F>
where
	T: Send + 'static,
	F: FnOnce() -> Result<T, String> + Send + 'static,
{
	fn execute(&mut self) -> JobOutcome {
		let Some(task) = self.task.take() else {
			return self.reject(JobError::Abandoned(self.id));
		};

		let result = match panic::catch_unwind(AssertUnwindSafe(task)) {
			Ok(Ok(output)) => Ok(output),
			Ok(Err(reason)) => Err(JobError::Failed {
				id: self.id,
				reason,
			}),
			Err(payload) => Err(JobError::Panicked {
				id: self.id,
				reason: panic_reason(payload.as_ref()),
			}),
		};

		let outcome = match &result {
			Ok(_) => JobOutcome::Completed,
			Err(e) => JobOutcome::Failed(e.clone()),
		};

		self.result = Some(result);

		outcome
	}

	fn reject(&mut self, error: JobError) -> JobOutcome {
		self.task = None;
		self.result = Some(Err(error.clone()));

		JobOutcome::Failed(error)
	}

	fn deliver(self: Box<Self>) -> bool {
		let Self {
			result, done_tx, ..
		} = *self;

		// Without a result the sender is dropped and the handle resolves to `Abandoned`
		result.is_some_and(|result| done_tx.send(result).is_ok())
	}
}

pub(crate) fn panic_reason(payload: &(dyn Any + Send)) -> String {
	payload
		.downcast_ref::<&str>()
		.map(|reason| (*reason).to_string())
		.or_else(|| payload.downcast_ref::<String>().cloned())
		.unwrap_or_else(|| "<non-string panic payload>".to_string())
}

/// Summary of a finished non-silent job, logged later by `update` on the pumping thread.
#[derive(Debug, Clone)]
pub(crate) struct JobReport {
	pub(crate) id: JobId,
	pub(crate) name: Arc<str>,
	pub(crate) worker_id: Option<WorkerId>,
	pub(crate) elapsed: Duration,
	pub(crate) outcome: JobOutcome,
}

/// Sending side of the bounded completion report channel. Reports that don't fit are dropped and
/// counted, so an owner that never pumps `update` doesn't grow memory without bound.
#[derive(Debug, Clone)]
pub(crate) struct ReportSender {
	reports_tx: chan::Sender<JobReport>,
	dropped: Arc<AtomicUsize>,
}

impl ReportSender {
	pub(crate) fn new(reports_tx: chan::Sender<JobReport>) -> Self {
		Self {
			reports_tx,
			dropped: Arc::default(),
		}
	}

	pub(crate) fn send(&self, report: JobReport) {
		match self.reports_tx.try_send(report) {
			Ok(()) => {}
			Err(chan::TrySendError::Full(_)) => {
				self.dropped.fetch_add(1, Ordering::Relaxed);
			}
			Err(chan::TrySendError::Closed(report)) => {
				warn!(id = %report.id, "Completion report channel closed, dropping job report");
			}
		}
	}

	/// Reports dropped since the last call.
	pub(crate) fn take_dropped(&self) -> usize {
		self.dropped.swap(0, Ordering::Relaxed)
	}
}

pub(crate) struct Job {
	pub(crate) id: JobId,
	pub(crate) name: Arc<str>,
	pub(crate) silent: bool,
	pub(crate) catalog: Option<Arc<JobCatalog>>,
	pub(crate) on_engine_worker: bool,
	pub(crate) worktable: Arc<JobWorktable>,
	body: Box<dyn JobBody>,
}

impl fmt::Debug for Job {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Job")
			.field("id", &self.id)
			.field("name", &self.name)
			.field("silent", &self.silent)
			.finish_non_exhaustive()
	}
}

impl Job {
	pub(crate) fn new<T, F>(options: JobOptions, task: F) -> (Self, JobHandle<T>)
	where
		T: Send + 'static,
		F: FnOnce() -> Result<T, String> + Send + 'static,
	{
		let JobOptions {
			name,
			silent,
			catalog,
			on_engine_worker,
		} = options;

		let id = JobId::next();
		let name = Arc::<str>::from(name);
		let worktable = Arc::new(JobWorktable::new());
		let (done_tx, done_rx) = oneshot::channel();

		let job = Self {
			id,
			name: Arc::clone(&name),
			silent,
			catalog,
			on_engine_worker,
			worktable: Arc::clone(&worktable),
			body: Box::new(Deliverable {
				id,
				task: Some(task),
				result: None,
				done_tx,
			}),
		};

		(job, JobHandle::new(id, name, done_rx, worktable))
	}

	/// Claims and runs the body, or rejects it when its handle canceled it first.
	pub(crate) fn execute(&mut self) -> JobOutcome {
		if self.worktable.claim() {
			self.body.execute()
		} else {
			self.body.reject(JobError::Canceled(self.id))
		}
	}

	pub(crate) fn reject(&mut self, error: JobError) -> JobOutcome {
		self.body.reject(error)
	}

	/// Updates the catalog, queues a completion report and only then hands the result to the
	/// holder, so anyone woken by the handle already sees the catalog and report up to date.
	pub(crate) fn finish(
		self,
		outcome: JobOutcome,
		worker_id: Option<WorkerId>,
		elapsed: Duration,
		reports: &ReportSender,
	) {
		let Self {
			id,
			name,
			silent,
			catalog,
			body,
			..
		} = self;

		if let Some(catalog) = catalog {
			catalog.finish(id, outcome.is_failure());
		}

		if !silent {
			reports.send(JobReport {
				id,
				name,
				worker_id,
				elapsed,
				outcome,
			});
		}

		if !body.deliver() && !silent {
			trace!(%id, "Job handle was dropped, discarding result");
		}
	}
}
