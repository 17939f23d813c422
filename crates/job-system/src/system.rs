use std::{fmt::Display, sync::Arc};

use parking_lot::RwLock;
use tracing::{info, instrument, warn};

use super::{
	catalog::JobCatalog,
	config::JobSystemConfig,
	error::JobSystemError,
	handle::JobHandle,
	job::JobOptions,
	manager::JobManager,
	worker::WorkerLiveness,
};

type ManagerSlot = Arc<RwLock<Option<JobManager>>>;

/// Process level owner of the job manager, created once by the entry point with
/// [`init`](Self::init) and torn down with [`cleanup`](Self::cleanup) (or on drop).
///
/// Call sites that only need to submit work should get a [`JobDispatcher`] instead.
#[derive(Debug)]
pub struct JobSystem {
	dispatcher: JobDispatcher,
	liveness: WorkerLiveness,
}

impl JobSystem {
	pub fn init(worker_count: usize) -> Result<Self, JobSystemError> {
		Self::init_with_config(JobSystemConfig::default().with_worker_count(worker_count))
	}

	#[instrument(skip_all, fields(worker_count = ?config.worker_count))]
	pub fn init_with_config(config: JobSystemConfig) -> Result<Self, JobSystemError> {
		let manager = JobManager::with_config(&config)?;

		info!(
			workers_count = manager.workers_count(),
			available_threads = manager.available_threads(),
			"Job system initialized"
		);

		Ok(Self {
			liveness: manager.worker_liveness(),
			dispatcher: JobDispatcher {
				slot: Arc::new(RwLock::new(Some(manager))),
			},
		})
	}

	#[must_use]
	pub fn dispatcher(&self) -> JobDispatcher {
		self.dispatcher.clone()
	}

	/// Joins every worker. Jobs enqueued afterwards, from here or from any dispatcher, fail with
	/// [`JobSystemError::Shutdown`].
	pub fn cleanup(&self) {
		// The manager leaves the slot before joining, so a running job submitting more work gets
		// an error instead of waiting on the lock forever
		let maybe_manager = self.dispatcher.slot.write().take();

		if let Some(mut manager) = maybe_manager {
			manager.shutdown();
			info!("Job system cleaned up");
		} else {
			warn!("Trying to cleanup the job system that was already cleaned up");
		}
	}

	#[must_use]
	pub fn is_running(&self) -> bool {
		!self.dispatcher.is_shutdown()
	}

	pub fn enqueue<T, F>(
		&self,
		task: F,
		name: impl Into<String>,
		silent: bool,
	) -> Result<JobHandle<T>, JobSystemError>
	where
		T: Send + 'static,
		F: FnOnce() -> T + Send + 'static,
	{
		self.dispatcher.enqueue(task, name, silent)
	}

	pub fn enqueue_with<T, F>(
		&self,
		task: F,
		options: JobOptions,
	) -> Result<JobHandle<T>, JobSystemError>
	where
		T: Send + 'static,
		F: FnOnce() -> T + Send + 'static,
	{
		self.dispatcher.enqueue_with(task, options)
	}

	pub fn enqueue_fallible<T, E, F>(
		&self,
		task: F,
		options: JobOptions,
	) -> Result<JobHandle<T>, JobSystemError>
	where
		T: Send + 'static,
		E: Display,
		F: FnOnce() -> Result<T, E> + Send + 'static,
	{
		self.dispatcher.enqueue_fallible(task, options)
	}

	pub fn create_catalogue(
		&self,
		name: impl Into<String>,
	) -> Result<Arc<JobCatalog>, JobSystemError> {
		self.dispatcher.create_catalogue(name)
	}

	pub fn for_each<F>(
		&self,
		indexed_task: F,
		iteration_count: usize,
		iterations_per_job: usize,
		start_idx: usize,
	) -> Result<(), JobSystemError>
	where
		F: Fn(usize) + Send + Sync + 'static,
	{
		self.dispatcher
			.for_each(indexed_task, iteration_count, iterations_per_job, start_idx)
	}

	pub fn for_each_with<F>(
		&self,
		indexed_task: F,
		iteration_count: usize,
		iterations_per_job: usize,
		start_idx: usize,
		options: JobOptions,
	) -> Result<(), JobSystemError>
	where
		F: Fn(usize) + Send + Sync + 'static,
	{
		self.dispatcher.for_each_with(
			indexed_task,
			iteration_count,
			iterations_per_job,
			start_idx,
			options,
		)
	}

	/// Logs completions reported by workers since the last call, see [`JobManager::update`].
	/// Does nothing after cleanup.
	pub fn update(&self) -> usize {
		self.dispatcher
			.slot
			.read()
			.as_ref()
			.map_or(0, JobManager::update)
	}

	#[must_use]
	pub fn are_workers_idle(&self) -> bool {
		self.dispatcher.are_workers_idle()
	}

	/// Zero after cleanup.
	#[must_use]
	pub fn workers_count(&self) -> usize {
		self.dispatcher
			.slot
			.read()
			.as_ref()
			.map_or(0, JobManager::workers_count)
	}

	/// Running worker threads, still readable after cleanup.
	#[must_use]
	pub fn worker_liveness(&self) -> WorkerLiveness {
		self.liveness.clone()
	}
}

impl Drop for JobSystem {
	fn drop(&mut self) {
		if self.is_running() {
			self.cleanup();
		}
	}
}

/// Cheap to clone submission side of a [`JobSystem`], meant to be handed to whoever needs to
/// enqueue work. Every operation fails with [`JobSystemError::Shutdown`] once the system is cleaned
/// up.
#[derive(Debug, Clone)]
pub struct JobDispatcher {
	slot: ManagerSlot,
}

impl JobDispatcher {
	fn with_manager<R>(&self, f: impl FnOnce(&JobManager) -> R) -> Result<R, JobSystemError> {
		self.slot.read().as_ref().map(f).ok_or(JobSystemError::Shutdown)
	}

	pub fn enqueue<T, F>(
		&self,
		task: F,
		name: impl Into<String>,
		silent: bool,
	) -> Result<JobHandle<T>, JobSystemError>
	where
		T: Send + 'static,
		F: FnOnce() -> T + Send + 'static,
	{
		self.with_manager(|manager| manager.enqueue(task, name, silent))
	}

	pub fn enqueue_with<T, F>(
		&self,
		task: F,
		options: JobOptions,
	) -> Result<JobHandle<T>, JobSystemError>
	where
		T: Send + 'static,
		F: FnOnce() -> T + Send + 'static,
	{
		self.with_manager(|manager| manager.enqueue_with(task, options))
	}

	pub fn enqueue_fallible<T, E, F>(
		&self,
		task: F,
		options: JobOptions,
	) -> Result<JobHandle<T>, JobSystemError>
	where
		T: Send + 'static,
		E: Display,
		F: FnOnce() -> Result<T, E> + Send + 'static,
	{
		self.with_manager(|manager| manager.enqueue_fallible(task, options))
	}

	pub fn create_catalogue(
		&self,
		name: impl Into<String>,
	) -> Result<Arc<JobCatalog>, JobSystemError> {
		self.with_manager(|manager| manager.create_catalogue(name))
	}

	pub fn for_each<F>(
		&self,
		indexed_task: F,
		iteration_count: usize,
		iterations_per_job: usize,
		start_idx: usize,
	) -> Result<(), JobSystemError>
	where
		F: Fn(usize) + Send + Sync + 'static,
	{
		self.with_manager(|manager| {
			manager.for_each(indexed_task, iteration_count, iterations_per_job, start_idx);
		})
	}

	pub fn for_each_with<F>(
		&self,
		indexed_task: F,
		iteration_count: usize,
		iterations_per_job: usize,
		start_idx: usize,
		options: JobOptions,
	) -> Result<(), JobSystemError>
	where
		F: Fn(usize) + Send + Sync + 'static,
	{
		self.with_manager(|manager| {
			manager.for_each_with(
				indexed_task,
				iteration_count,
				iterations_per_job,
				start_idx,
				options,
			);
		})
	}

	/// Always `true` once the system is cleaned up, as nothing can be running anymore.
	#[must_use]
	pub fn are_workers_idle(&self) -> bool {
		self.with_manager(JobManager::are_workers_idle)
			.unwrap_or(true)
	}

	#[must_use]
	pub fn is_shutdown(&self) -> bool {
		self.slot.read().is_none()
	}
}
