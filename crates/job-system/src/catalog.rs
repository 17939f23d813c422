use parking_lot::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use super::job::JobId;

pub type CatalogId = Uuid;

#[derive(Debug, Default)]
struct CatalogState {
	job_ids: Vec<JobId>,
	completed: usize,
	failed: usize,
	sealed: bool,
}

impl CatalogState {
	fn is_done(&self) -> bool {
		self.sealed && self.completed == self.job_ids.len()
	}
}

/// A named group of jobs, polled to know whether the whole batch finished.
///
/// Jobs join the catalog while it is open. Once every job of the batch was submitted the owner
/// calls [`seal`](Self::seal), and from then on the catalog reports done as soon as all of them
/// finished. A sealed catalog never accepts new jobs, so [`is_done`](Self::is_done) never goes back
/// to `false`.
///
/// Catalogs are owned by the job manager and live as long as it does; callers keep an `Arc` to
/// poll them. Names don't need to be unique, two catalogs are only the same if they're the same
/// `Arc` (or share a [`CatalogId`]).
#[derive(Debug)]
pub struct JobCatalog {
	id: CatalogId,
	name: String,
	state: Mutex<CatalogState>,
}

impl JobCatalog {
	pub(crate) fn new(name: impl Into<String>) -> Self {
		Self {
			id: Uuid::new_v4(),
			name: name.into(),
			state: Mutex::default(),
		}
	}

	#[must_use]
	pub const fn id(&self) -> CatalogId {
		self.id
	}

	#[must_use]
	pub fn name(&self) -> &str {
		&self.name
	}

	/// Ids of every job submitted under this catalog, in submission order.
	#[must_use]
	pub fn job_ids(&self) -> Vec<JobId> {
		self.state.lock().job_ids.clone()
	}

	#[must_use]
	pub fn submitted_count(&self) -> usize {
		self.state.lock().job_ids.len()
	}

	/// Jobs that reached a final outcome, failed ones included.
	#[must_use]
	pub fn completed_count(&self) -> usize {
		self.state.lock().completed
	}

	/// Jobs that panicked, returned an error, were canceled or were dropped at shutdown.
	#[must_use]
	pub fn failed_count(&self) -> usize {
		self.state.lock().failed
	}

	#[must_use]
	pub fn is_sealed(&self) -> bool {
		self.state.lock().sealed
	}

	/// Sealed and every submitted job finished.
	#[must_use]
	pub fn is_done(&self) -> bool {
		self.state.lock().is_done()
	}

	/// Closes the batch. Jobs submitted under a sealed catalog are rejected with
	/// [`JobError::CatalogSealed`](crate::JobError::CatalogSealed) without running.
	pub fn seal(&self) {
		let mut state = self.state.lock();

		if state.sealed {
			warn!(catalog_id = %self.id, "Trying to seal a catalog that was already sealed");
			return;
		}

		state.sealed = true;

		if state.is_done() {
			self.log_done(&state);
		}
	}

	/// Adds `job_id` to the batch, unless the catalog is already sealed.
	pub(crate) fn register(&self, job_id: JobId) -> bool {
		let mut state = self.state.lock();

		if state.sealed {
			return false;
		}

		state.job_ids.push(job_id);

		true
	}

	pub(crate) fn finish(&self, job_id: JobId, failed: bool) {
		let mut state = self.state.lock();

		if state.completed >= state.job_ids.len() {
			warn!(
				catalog_id = %self.id,
				%job_id,
				"Catalog received more completions than submitted jobs, ignoring"
			);
			return;
		}

		state.completed += 1;
		if failed {
			state.failed += 1;
		}

		if state.is_done() {
			self.log_done(&state);
		}
	}

	fn log_done(&self, state: &CatalogState) {
		debug!(
			catalog_id = %self.id,
			name = %self.name,
			jobs = state.completed,
			failed = state.failed,
			"Catalog done"
		);
	}
}
