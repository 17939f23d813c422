use std::{
	fmt,
	future::Future,
	mem,
	pin::Pin,
	sync::Arc,
	task::{Context, Poll},
};

use futures::executor::block_on;
use tokio::sync::oneshot::{self, error::TryRecvError};
use tracing::trace;

use super::{
	error::JobError,
	job::{JobId, JobWorktable},
};

enum HandleState<T> {
	Pending(oneshot::Receiver<Result<T, JobError>>),
	Ready(Result<T, JobError>),
	Consumed,
}

/// A handle returned when a job is enqueued, used to wait for its result or to cancel it while it
/// is still queued.
///
/// The handle can't be cloned as the result is delivered exactly once. Dropping it without waiting
/// is fine: the job still runs and its result is discarded.
pub struct JobHandle<T> {
	id: JobId,
	name: Arc<str>,
	state: HandleState<T>,
	worktable: Arc<JobWorktable>,
}

impl<T> fmt::Debug for JobHandle<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let state = match &self.state {
			HandleState::Pending(_) => "pending",
			HandleState::Ready(_) => "ready",
			HandleState::Consumed => "consumed",
		};

		f.debug_struct("JobHandle")
			.field("id", &self.id)
			.field("name", &self.name)
			.field("state", &state)
			.finish()
	}
}

// The output is never pinned in place, only moved out once it arrives
impl<T> Unpin for JobHandle<T> {}

impl<T> JobHandle<T> {
	pub(crate) fn new(
		id: JobId,
		name: Arc<str>,
		done_rx: oneshot::Receiver<Result<T, JobError>>,
		worktable: Arc<JobWorktable>,
	) -> Self {
		Self {
			id,
			name,
			state: HandleState::Pending(done_rx),
			worktable,
		}
	}

	#[must_use]
	pub const fn id(&self) -> JobId {
		self.id
	}

	#[must_use]
	pub fn name(&self) -> &str {
		&self.name
	}

	/// Non-blocking check whether the job already delivered its result.
	///
	/// The result, if any, is kept inside the handle for a later [`wait`](Self::wait).
	pub fn has_completed(&mut self) -> bool {
		match &mut self.state {
			HandleState::Pending(done_rx) => match done_rx.try_recv() {
				Ok(result) => {
					self.state = HandleState::Ready(result);
					true
				}
				Err(TryRecvError::Empty) => false,
				Err(TryRecvError::Closed) => {
					self.state = HandleState::Ready(Err(JobError::Abandoned(self.id)));
					true
				}
			},
			HandleState::Ready(_) | HandleState::Consumed => true,
		}
	}

	/// Blocks the current thread until the job delivers its result.
	///
	/// Only the first call returns the job's result, any later one gets
	/// [`JobError::AlreadyConsumed`]. Works from inside an async runtime too, where it blocks the
	/// runtime thread like any blocking call would, so prefer `.await`ing the handle there.
	pub fn wait(&mut self) -> Result<T, JobError> {
		match mem::replace(&mut self.state, HandleState::Consumed) {
			HandleState::Pending(done_rx) => {
				block_on(done_rx).unwrap_or_else(|_| Err(JobError::Abandoned(self.id)))
			}
			HandleState::Ready(result) => result,
			HandleState::Consumed => {
				trace!(id = %self.id, "Tried to wait on an already consumed job handle");
				Err(JobError::AlreadyConsumed(self.id))
			}
		}
	}

	/// Cancels the job if no worker picked it up yet, in which case it resolves to
	/// [`JobError::Canceled`] without running. Returns `false` when the job is already running or
	/// done, as dispatched jobs are never interrupted.
	pub fn cancel(&self) -> bool {
		let canceled = self.worktable.cancel();

		trace!(id = %self.id, %canceled, "Cancel requested for job");

		canceled
	}
}

impl<T> Future for JobHandle<T> {
	type Output = Result<T, JobError>;

	fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		let this = self.get_mut();

		match mem::replace(&mut this.state, HandleState::Consumed) {
			HandleState::Pending(mut done_rx) => match Pin::new(&mut done_rx).poll(cx) {
				Poll::Ready(res) => {
					Poll::Ready(res.unwrap_or_else(|_| Err(JobError::Abandoned(this.id))))
				}
				Poll::Pending => {
					this.state = HandleState::Pending(done_rx);
					Poll::Pending
				}
			},
			HandleState::Ready(result) => Poll::Ready(result),
			HandleState::Consumed => Poll::Ready(Err(JobError::AlreadyConsumed(this.id))),
		}
	}
}
