use std::{fmt::Display, sync::Arc, time::Duration};

use async_channel as chan;
use parking_lot::Mutex;
use tracing::{debug, info, instrument, trace, warn};

use super::{
	catalog::JobCatalog,
	config::JobSystemConfig,
	error::{JobError, JobSystemError},
	for_each::chunk_ranges,
	handle::JobHandle,
	job::{Job, JobOptions, JobOutcome, JobReport, ReportSender},
	queue::JobQueue,
	worker::{JobWorker, WorkerBuilder, WorkerLiveness},
};

const FOR_EACH_DEFAULT_NAME: &str = "for_each";

/// Owns the worker pool, the shared job queue and the catalog registry.
///
/// The worker count is fixed at construction. With more than one worker the last one is reserved
/// as the engine worker: it only runs jobs submitted with [`JobOptions::on_engine_worker`] and is
/// left out of [`are_workers_idle`](Self::are_workers_idle). Dropping the manager shuts it down,
/// joining every worker thread.
#[derive(Debug)]
pub struct JobManager {
	queue: Arc<JobQueue>,
	workers: Vec<JobWorker>,
	catalogs: Mutex<Vec<Arc<JobCatalog>>>,
	reports: ReportSender,
	reports_rx: chan::Receiver<JobReport>,
	available_threads: usize,
	liveness: WorkerLiveness,
	is_shutdown: bool,
}

impl JobManager {
	/// Spawns `worker_count` workers, clamped to `[1, available_threads]`.
	///
	/// # Panics
	///
	/// Panics if `available_threads` is zero, as the system can't run anything without threads.
	pub fn new(worker_count: usize, available_threads: usize) -> Result<Self, JobSystemError> {
		Self::build(worker_count, available_threads, &JobSystemConfig::default())
	}

	pub fn with_config(config: &JobSystemConfig) -> Result<Self, JobSystemError> {
		Self::build(
			config.resolved_worker_count(),
			config.available_threads(),
			config,
		)
	}

	fn build(
		worker_count: usize,
		available_threads: usize,
		config: &JobSystemConfig,
	) -> Result<Self, JobSystemError> {
		assert!(
			available_threads != 0,
			"job system needs at least one available thread"
		);

		let workers_count = worker_count.clamp(1, available_threads);
		if workers_count != worker_count {
			warn!(
				requested = worker_count,
				available_threads, workers_count, "Clamped worker count to the available threads"
			);
		}

		let (reports_tx, reports_rx) = chan::bounded(config.report_capacity.max(1));

		// With a single worker there is nothing to reserve
		let has_engine_worker = workers_count > 1;

		let mut manager = Self {
			queue: Arc::new(JobQueue::new(has_engine_worker)),
			workers: Vec::with_capacity(workers_count),
			catalogs: Mutex::default(),
			reports: ReportSender::new(reports_tx),
			reports_rx,
			available_threads,
			liveness: WorkerLiveness::default(),
			is_shutdown: false,
		};

		for id in 0..workers_count {
			let is_engine_worker = has_engine_worker && id == workers_count - 1;

			// On error the partially built manager is dropped, joining the workers spawned so far
			let worker = WorkerBuilder::new(id, is_engine_worker, &config.thread_name_prefix)
				.stack_size(config.stack_size)
				.build(
					Arc::clone(&manager.queue),
					manager.reports.clone(),
					&manager.liveness,
				)?;

			manager.workers.push(worker);
		}

		debug!(workers_count, available_threads, "Job manager started");

		Ok(manager)
	}

	/// Enqueues `task`, returning a handle to its output. Never blocks besides the queue lock.
	pub fn enqueue<T, F>(&self, task: F, name: impl Into<String>, silent: bool) -> JobHandle<T>
	where
		T: Send + 'static,
		F: FnOnce() -> T + Send + 'static,
	{
		self.enqueue_with(task, JobOptions::named(name).with_silent(silent))
	}

	/// Jobs for a sealed catalog resolve to [`JobError::CatalogSealed`] without running.
	pub fn enqueue_with<T, F>(&self, task: F, options: JobOptions) -> JobHandle<T>
	where
		T: Send + 'static,
		F: FnOnce() -> T + Send + 'static,
	{
		self.submit(options, move || Ok(task()))
	}

	/// Like [`enqueue_with`](Self::enqueue_with), but an `Err` returned by `task` resolves the
	/// handle to [`JobError::Failed`] and gets logged like a panicking job would.
	pub fn enqueue_fallible<T, E, F>(&self, task: F, options: JobOptions) -> JobHandle<T>
	where
		T: Send + 'static,
		E: Display,
		F: FnOnce() -> Result<T, E> + Send + 'static,
	{
		self.submit(options, move || task().map_err(|e| e.to_string()))
	}

	/// Registers a new open catalog. Names may repeat, keep the returned `Arc` to track it and
	/// [`seal`](JobCatalog::seal) it once the whole batch was submitted.
	pub fn create_catalogue(&self, name: impl Into<String>) -> Arc<JobCatalog> {
		let catalog = Arc::new(JobCatalog::new(name));

		debug!(catalog_id = %catalog.id(), name = %catalog.name(), "Created job catalog");

		self.catalogs.lock().push(Arc::clone(&catalog));

		catalog
	}

	#[must_use]
	pub fn catalogues(&self) -> Vec<Arc<JobCatalog>> {
		self.catalogs.lock().clone()
	}

	/// Runs `indexed_task` for every index in `[start_idx, start_idx + iteration_count)`, one job
	/// per `iterations_per_job` indices.
	///
	/// Indices of a chunk run in ascending order on the same worker, chunks run in any order. No
	/// handles are returned, failures only show up in the logs.
	pub fn for_each<F>(
		&self,
		indexed_task: F,
		iteration_count: usize,
		iterations_per_job: usize,
		start_idx: usize,
	) where
		F: Fn(usize) + Send + Sync + 'static,
	{
		self.for_each_with(
			indexed_task,
			iteration_count,
			iterations_per_job,
			start_idx,
			JobOptions::named(FOR_EACH_DEFAULT_NAME),
		);
	}

	/// [`for_each`](Self::for_each) with chunk jobs sharing `options`, so the whole loop can be
	/// tracked through a catalog. Chunks are named `"{name}[{start}..{end})"`.
	pub fn for_each_with<F>(
		&self,
		indexed_task: F,
		iteration_count: usize,
		iterations_per_job: usize,
		start_idx: usize,
		options: JobOptions,
	) where
		F: Fn(usize) + Send + Sync + 'static,
	{
		let iterations_per_job = if iterations_per_job == 0 {
			warn!(
				name = %options.name,
				"Received for_each with zero iterations per job, running one iteration per job"
			);
			1
		} else {
			iterations_per_job
		};

		let indexed_task = Arc::new(indexed_task);

		// Every chunk gets registered on the catalog before the first one can complete
		let jobs = chunk_ranges(start_idx, iteration_count, iterations_per_job)
			.filter_map(|chunk| {
				let indexed_task = Arc::clone(&indexed_task);
				let options = JobOptions {
					name: format!("{}[{}..{})", options.name, chunk.start, chunk.end),
					..options.clone()
				};

				// for_each is fire-and-forget, so the handle is dropped right away
				let (maybe_job, _handle) = self.prepare(options, move || {
					for idx in chunk {
						indexed_task(idx);
					}

					Ok(())
				});

				maybe_job
			})
			.collect::<Vec<_>>();

		if jobs.is_empty() {
			trace!(name = %options.name, "for_each has no chunks to enqueue");
			return;
		}

		if self.is_shutdown {
			jobs.into_iter().for_each(|job| self.reject_on_shutdown(job));
		} else {
			self.queue.push_many(jobs);
		}
	}

	/// Logs every completion reported since the last call on the calling thread, returning how
	/// many were drained. Meant to be pumped periodically, like once per frame.
	///
	/// Up to [`JobSystemConfig::report_capacity`] reports are kept between calls. Reports that
	/// didn't fit are dropped, only their count gets logged here.
	pub fn update(&self) -> usize {
		let mut drained = 0;

		while let Ok(JobReport {
			id,
			name,
			worker_id,
			elapsed,
			outcome,
		}) = self.reports_rx.try_recv()
		{
			drained += 1;

			match outcome {
				JobOutcome::Completed => {
					info!(job_id = %id, %name, ?worker_id, ?elapsed, "Job completed");
				}
				JobOutcome::Failed(e) => {
					warn!(job_id = %id, %name, ?worker_id, ?elapsed, %e, "Job finished without output");
				}
			}
		}

		let dropped = self.reports.take_dropped();
		if dropped > 0 {
			warn!(dropped, "Dropped completion reports, update isn't pumped often enough");
		}

		drained
	}

	/// Whether no regular job is queued and every worker besides the reserved engine worker is
	/// idle. The engine worker never runs regular jobs, so leaving it out can't hide any of them.
	#[must_use]
	pub fn are_workers_idle(&self) -> bool {
		self.queue.is_idle(
			self.workers
				.iter()
				.filter(|worker| !worker.is_engine_worker())
				.map(JobWorker::status),
		)
	}

	#[must_use]
	pub fn workers_count(&self) -> usize {
		self.workers.len()
	}

	#[must_use]
	pub fn workers(&self) -> &[JobWorker] {
		&self.workers
	}

	#[must_use]
	pub const fn available_threads(&self) -> usize {
		self.available_threads
	}

	/// Jobs waiting for a worker, engine worker jobs included.
	#[must_use]
	pub fn queued_jobs(&self) -> usize {
		self.queue.len()
	}

	#[must_use]
	pub fn worker_liveness(&self) -> WorkerLiveness {
		self.liveness.clone()
	}

	#[must_use]
	pub const fn is_shutdown(&self) -> bool {
		self.is_shutdown
	}

	/// Stops and joins every worker. Running jobs finish first, jobs still queued resolve to
	/// [`JobError::Shutdown`] without running.
	#[instrument(skip(self), fields(workers_count = self.workers.len()))]
	pub fn shutdown(&mut self) {
		if self.is_shutdown {
			warn!("Trying to shutdown the job manager that was already shutdown");
			return;
		}

		self.is_shutdown = true;
		self.queue.stop();

		for worker in &mut self.workers {
			worker.join();
		}

		let pending_jobs = self.queue.drain();
		if !pending_jobs.is_empty() {
			debug!(
				pending_jobs = pending_jobs.len(),
				"Rejecting jobs that were never dispatched"
			);
		}

		for job in pending_jobs {
			self.reject_on_shutdown(job);
		}

		assert_eq!(
			self.liveness.count(),
			0,
			"every worker thread must be joined on shutdown"
		);

		debug!("Job manager shutdown complete");
	}

	fn submit<T, F>(&self, options: JobOptions, task: F) -> JobHandle<T>
	where
		T: Send + 'static,
		F: FnOnce() -> Result<T, String> + Send + 'static,
	{
		let (maybe_job, handle) = self.prepare(options, task);

		if let Some(job) = maybe_job {
			if self.is_shutdown {
				self.reject_on_shutdown(job);
			} else {
				self.queue.push(job);
			}
		}

		handle
	}

	/// Builds the job and registers it on its catalog. A job for a sealed catalog is rejected
	/// right away, only its handle is left.
	fn prepare<T, F>(&self, options: JobOptions, task: F) -> (Option<Job>, JobHandle<T>)
	where
		T: Send + 'static,
		F: FnOnce() -> Result<T, String> + Send + 'static,
	{
		let (mut job, handle) = Job::new(options, task);

		let sealed_catalog_id = job
			.catalog
			.as_ref()
			.filter(|catalog| !catalog.register(job.id))
			.map(|catalog| catalog.id());

		if let Some(catalog_id) = sealed_catalog_id {
			if !job.silent {
				warn!(
					job_id = %job.id,
					name = %job.name,
					%catalog_id,
					"Job submitted to a sealed catalog, rejecting it"
				);
			}

			// Never registered, so the catalog must not count it
			job.catalog = None;

			let outcome = job.reject(JobError::CatalogSealed {
				id: job.id,
				catalog_id,
			});
			job.finish(outcome, None, Duration::ZERO, &self.reports);

			return (None, handle);
		}

		if !job.silent {
			debug!(
				job_id = %job.id,
				name = %job.name,
				catalog_id = ?job.catalog.as_ref().map(|catalog| catalog.id()),
				on_engine_worker = job.on_engine_worker,
				"Job enqueued"
			);
		}

		(Some(job), handle)
	}

	fn reject_on_shutdown(&self, mut job: Job) {
		if !job.silent {
			warn!(job_id = %job.id, name = %job.name, "Job received after shutdown, rejecting it");
		}

		let outcome = job.reject(JobError::Shutdown(job.id));
		job.finish(outcome, None, Duration::ZERO, &self.reports);
	}
}

impl Drop for JobManager {
	fn drop(&mut self) {
		if !self.is_shutdown {
			self.shutdown();
		}
	}
}
