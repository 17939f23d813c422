use std::io;

use thiserror::Error;

use super::{catalog::CatalogId, job::JobId, worker::WorkerId};

/// Failure value delivered through a [`JobHandle`](crate::JobHandle) instead of a successful
/// output.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum JobError {
	#[error("job <id='{id}'> panicked: {reason}")]
	Panicked { id: JobId, reason: String },
	#[error("job <id='{id}'> failed: {reason}")]
	Failed { id: JobId, reason: String },
	#[error("job <id='{0}'> was canceled before being dispatched")]
	Canceled(JobId),
	#[error("job <id='{id}'> submitted to sealed catalog <catalog_id='{catalog_id}'>")]
	CatalogSealed { id: JobId, catalog_id: CatalogId },
	#[error("job system shutdown before job <id='{0}'> was dispatched")]
	Shutdown(JobId),
	#[error("job <id='{0}'> was dropped without delivering a result")]
	Abandoned(JobId),
	#[error("result of job <id='{0}'> was already consumed")]
	AlreadyConsumed(JobId),
}

impl JobError {
	#[must_use]
	pub const fn job_id(&self) -> JobId {
		match self {
			Self::Panicked { id, .. }
			| Self::Failed { id, .. }
			| Self::CatalogSealed { id, .. }
			| Self::Canceled(id)
			| Self::Shutdown(id)
			| Self::Abandoned(id)
			| Self::AlreadyConsumed(id) => *id,
		}
	}
}

#[derive(Debug, Error)]
pub enum JobSystemError {
	#[error("job system is shut down")]
	Shutdown,
	#[error("failed to spawn worker thread <worker_id='{worker_id}'>: {source}")]
	WorkerSpawn {
		worker_id: WorkerId,
		#[source]
		source: io::Error,
	},
}
