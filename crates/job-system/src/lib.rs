//!
//! # Job System
//!
//! Spacedrive's Job System is a fixed size pool of worker threads executing short lived jobs
//! submitted from any thread.
//!
//! Submit a closure and get back a [`JobHandle`] to wait on, poll or `.await` its output, or just drop
//! it and let the job run on its own. Aside from that:
//! - Jobs are dequeued in FIFO order from a single queue shared by every worker;
//! - Panicking or failing jobs are captured and delivered as [`JobError`]s, workers keep going;
//! - Jobs can be grouped in a [`JobCatalog`] to poll when a whole batch is done, once sealed;
//! - [`JobSystem::for_each`] splits an index range in chunks and runs them in parallel;
//! - Queued jobs can be canceled through their handle, running ones are never interrupted;
//! - With more than one worker, the last one is reserved for jobs submitted
//!   [`on_engine_worker`](JobOptions::on_engine_worker);
//! - Completion logs are deferred until the owner pumps [`JobSystem::update`];
//! - On cleanup, running jobs finish, queued ones are rejected and every worker thread is joined.
//!
//!
//! ## Basic example
//!
//! ```
//! use std::sync::{
//! 	atomic::{AtomicUsize, Ordering},
//! 	Arc,
//! };
//!
//! use sd_job_system::{JobOptions, JobSystem};
//!
//! let system = JobSystem::init(4).unwrap();
//!
//! let mut handle = system.enqueue(|| 40 + 2, "answer", false).unwrap();
//! assert_eq!(handle.wait(), Ok(42));
//!
//! let catalog = system.create_catalogue("counting").unwrap();
//! let counter = Arc::new(AtomicUsize::new(0));
//!
//! system
//! 	.for_each_with(
//! 		{
//! 			let counter = Arc::clone(&counter);
//! 			move |_idx| {
//! 				counter.fetch_add(1, Ordering::Relaxed);
//! 			}
//! 		},
//! 		100,
//! 		8,
//! 		0,
//! 		JobOptions::named("count").silent().in_catalog(&catalog),
//! 	)
//! 	.unwrap();
//!
//! // Nothing else joins the batch, it can report done now
//! catalog.seal();
//!
//! while !catalog.is_done() {
//! 	system.update();
//! 	std::thread::yield_now();
//! }
//!
//! assert_eq!(counter.load(Ordering::Relaxed), 100);
//!
//! system.cleanup();
//! ```

#![warn(
	clippy::all,
	clippy::pedantic,
	clippy::correctness,
	clippy::perf,
	clippy::style,
	clippy::suspicious,
	clippy::complexity,
	clippy::nursery,
	clippy::unwrap_used,
	unused_qualifications,
	rust_2018_idioms,
	trivial_casts,
	trivial_numeric_casts,
	unused_allocation,
	clippy::unnecessary_cast,
	clippy::cast_lossless,
	clippy::cast_possible_truncation,
	clippy::cast_possible_wrap,
	clippy::cast_precision_loss,
	clippy::cast_sign_loss,
	clippy::dbg_macro,
	clippy::deprecated_cfg_attr,
	clippy::separated_literal_suffix,
	deprecated
)]
#![forbid(deprecated_in_future)]
#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

mod catalog;
mod config;
mod error;
mod for_each;
mod handle;
mod job;
mod manager;
mod queue;
mod system;
mod worker;

pub use catalog::{CatalogId, JobCatalog};
pub use config::JobSystemConfig;
pub use error::{JobError, JobSystemError};
pub use handle::JobHandle;
pub use job::{JobId, JobOptions};
pub use manager::JobManager;
pub use system::{JobDispatcher, JobSystem};
pub use worker::{JobWorker, WorkerId, WorkerLiveness, WorkerState};
