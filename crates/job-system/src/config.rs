use std::thread;

use serde::{Deserialize, Serialize};
use tracing::error;

const DEFAULT_RESERVED_THREADS: usize = 1;
const DEFAULT_THREAD_NAME_PREFIX: &str = "sd-job-worker";
const DEFAULT_REPORT_CAPACITY: usize = 1024;

/// Settings used to build a [`JobManager`](crate::JobManager) or a [`JobSystem`](crate::JobSystem).
///
/// Every field has a default, so a partial document (or an empty one) deserializes fine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobSystemConfig {
	/// How many workers to spawn, `None` meaning one per available thread.
	pub worker_count: Option<usize>,
	/// Hardware threads to plan for, detected when `None`.
	pub hardware_threads: Option<usize>,
	/// Hardware threads left for the caller, usually the main or frame loop thread.
	pub reserved_threads: usize,
	pub thread_name_prefix: String,
	/// Worker stack size in bytes, platform default when `None`.
	pub stack_size: Option<usize>,
	/// Completion reports kept until the next `update`, later ones are dropped and counted.
	pub report_capacity: usize,
}

impl Default for JobSystemConfig {
	fn default() -> Self {
		Self {
			worker_count: None,
			hardware_threads: None,
			reserved_threads: DEFAULT_RESERVED_THREADS,
			thread_name_prefix: DEFAULT_THREAD_NAME_PREFIX.to_string(),
			stack_size: None,
			report_capacity: DEFAULT_REPORT_CAPACITY,
		}
	}
}

impl JobSystemConfig {
	#[must_use]
	pub const fn with_worker_count(mut self, worker_count: usize) -> Self {
		self.worker_count = Some(worker_count);
		self
	}

	#[must_use]
	pub const fn with_hardware_threads(mut self, hardware_threads: usize) -> Self {
		self.hardware_threads = Some(hardware_threads);
		self
	}

	#[must_use]
	pub const fn with_reserved_threads(mut self, reserved_threads: usize) -> Self {
		self.reserved_threads = reserved_threads;
		self
	}

	#[must_use]
	pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
		self.thread_name_prefix = prefix.into();
		self
	}

	#[must_use]
	pub const fn with_stack_size(mut self, stack_size: usize) -> Self {
		self.stack_size = Some(stack_size);
		self
	}

	#[must_use]
	pub const fn with_report_capacity(mut self, report_capacity: usize) -> Self {
		self.report_capacity = report_capacity;
		self
	}

	/// Hardware concurrency minus the reserved threads, never below 1.
	#[must_use]
	pub fn available_threads(&self) -> usize {
		self.hardware_threads
			.unwrap_or_else(hardware_concurrency)
			.saturating_sub(self.reserved_threads)
			.max(1)
	}

	#[must_use]
	pub fn resolved_worker_count(&self) -> usize {
		self.worker_count
			.unwrap_or_else(|| self.available_threads())
	}
}

fn hardware_concurrency() -> usize {
	thread::available_parallelism().map_or_else(
		|e| {
			error!("Failed to get available parallelism in the job system: {e:#?}");
			1
		},
		|non_zero| non_zero.get(),
	)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn partial_document_keeps_defaults() {
		let config: JobSystemConfig =
			serde_json::from_str(r#"{ "worker_count": 3, "thread_name_prefix": "frame-jobs" }"#)
				.unwrap();

		assert_eq!(config.worker_count, Some(3));
		assert_eq!(config.thread_name_prefix, "frame-jobs");
		assert_eq!(config.reserved_threads, DEFAULT_RESERVED_THREADS);
		assert_eq!(config.stack_size, None);
		assert_eq!(config.report_capacity, DEFAULT_REPORT_CAPACITY);
	}

	#[test]
	fn available_threads_never_zero() {
		let config = JobSystemConfig::default().with_reserved_threads(usize::MAX);

		assert_eq!(config.available_threads(), 1);
		assert_eq!(config.resolved_worker_count(), 1);
	}

	#[test]
	fn hardware_threads_override_detection() {
		let config = JobSystemConfig::default().with_hardware_threads(8);

		assert_eq!(config.available_threads(), 7);
		assert_eq!(config.with_reserved_threads(0).available_threads(), 8);
	}

	#[test]
	fn explicit_worker_count_wins() {
		let config = JobSystemConfig::default().with_worker_count(7);

		assert_eq!(config.resolved_worker_count(), 7);
	}
}
