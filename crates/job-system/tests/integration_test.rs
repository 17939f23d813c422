use sd_job_system::{
	JobError, JobHandle, JobManager, JobOptions, JobSystem, JobSystemConfig, JobSystemError,
};

use std::{
	sync::{
		atomic::{AtomicUsize, Ordering},
		mpsc, Arc,
	},
	thread,
	time::{Duration, Instant},
};

use futures_concurrency::future::Join;
use parking_lot::Mutex;
use rand::Rng;
use tracing::info;
use tracing_test::traced_test;

mod common;

use common::{wait_until, Gate};

#[test]
#[traced_test]
fn every_job_completes_test() {
	let system = JobSystem::init(4).unwrap();

	let mut handles = (0..256)
		.map(|i| {
			system
				.enqueue(move || i * 2, format!("double {i}"), true)
				.unwrap()
		})
		.collect::<Vec<_>>();

	assert!(wait_until(|| handles.iter_mut().all(JobHandle::has_completed)));

	for (i, handle) in handles.iter_mut().enumerate() {
		assert_eq!(handle.wait(), Ok(i * 2));
		assert!(matches!(handle.wait(), Err(JobError::AlreadyConsumed(id)) if id == handle.id()));
	}

	system.cleanup();
}

#[test]
#[traced_test]
fn fire_and_forget_test() {
	let system = JobSystem::init(2).unwrap();
	let (done_tx, done_rx) = mpsc::channel();
	let job_duration = Duration::from_millis(200);

	let submitted_at = Instant::now();

	drop(
		system
			.enqueue(
				move || {
					thread::sleep(job_duration);
					done_tx.send(()).unwrap();
				},
				"fire and forget",
				false,
			)
			.unwrap(),
	);

	assert!(submitted_at.elapsed() < job_duration);

	done_rx.recv_timeout(Duration::from_secs(10)).unwrap();

	system.cleanup();
}

#[test]
#[traced_test]
fn for_each_visits_every_index_once_test() {
	let system = JobSystem::init(4).unwrap();
	let visited = Arc::new(Mutex::new(Vec::new()));
	let catalog = system.create_catalogue("for each").unwrap();

	system
		.for_each_with(
			{
				let visited = Arc::clone(&visited);
				move |idx| visited.lock().push(idx)
			},
			10,
			3,
			0,
			JobOptions::named("record").in_catalog(&catalog),
		)
		.unwrap();
	catalog.seal();

	assert_eq!(catalog.submitted_count(), 4);
	assert!(wait_until(|| catalog.is_done()));

	let visited = visited.lock().clone();

	let mut sorted = visited.clone();
	sorted.sort_unstable();
	assert_eq!(sorted, (0..10).collect::<Vec<_>>());

	// Indices of the same chunk were logged in ascending order
	for chunk in [0..3, 3..6, 6..9, 9..10] {
		let positions = chunk
			.map(|idx| visited.iter().position(|&logged| logged == idx).unwrap())
			.collect::<Vec<_>>();

		assert!(positions.windows(2).all(|pair| pair[0] < pair[1]));
	}

	system.cleanup();
}

#[test]
#[traced_test]
fn for_each_with_offset_test() {
	let system = JobSystem::init(3).unwrap();
	let sum = Arc::new(AtomicUsize::new(0));
	let calls = Arc::new(AtomicUsize::new(0));

	system
		.for_each(
			{
				let sum = Arc::clone(&sum);
				let calls = Arc::clone(&calls);
				move |idx| {
					sum.fetch_add(idx, Ordering::Relaxed);
					calls.fetch_add(1, Ordering::Relaxed);
				}
			},
			5,
			2,
			100,
		)
		.unwrap();

	assert!(wait_until(|| calls.load(Ordering::Relaxed) == 5));
	assert_eq!(sum.load(Ordering::Relaxed), 100 + 101 + 102 + 103 + 104);

	// Nothing to run, nothing to enqueue
	system.for_each(|_| unreachable!(), 0, 4, 0).unwrap();
	assert!(wait_until(|| system.are_workers_idle()));

	system.cleanup();
}

#[test]
#[traced_test]
fn catalog_done_is_monotonic_test() {
	let system = JobSystem::init(4).unwrap();
	let gate = Gate::default();
	let catalog = system.create_catalogue("gated").unwrap();

	let _handles = (0..8)
		.map(|i| {
			let gate = gate.clone();
			system
				.enqueue_with(
					move || gate.wait(),
					JobOptions::named(format!("gated {i}")).in_catalog(&catalog),
				)
				.unwrap()
		})
		.collect::<Vec<_>>();

	assert_eq!(catalog.submitted_count(), 8);
	assert_eq!(catalog.completed_count(), 0);
	assert!(!catalog.is_done());

	catalog.seal();
	assert!(!catalog.is_done());

	gate.open();

	let mut last_completed = 0;
	assert!(wait_until(|| {
		let is_done = catalog.is_done();
		let completed = catalog.completed_count();

		assert!(completed >= last_completed);
		last_completed = completed;

		if is_done {
			assert_eq!(completed, 8);
		}

		is_done
	}));

	for _ in 0..100 {
		assert!(catalog.is_done());
	}

	assert_eq!(catalog.failed_count(), 0);
	assert_eq!(catalog.job_ids().len(), 8);

	let same_name = system.create_catalogue("gated").unwrap();
	assert_ne!(same_name.id(), catalog.id());
	assert!(!same_name.is_done());

	same_name.seal();
	assert!(same_name.is_done());

	system.cleanup();
}

#[test]
#[traced_test]
fn failure_isolation_test() {
	let system = JobSystem::init(2).unwrap();
	let catalog = system.create_catalogue("mixed").unwrap();

	let mut boom = system
		.enqueue_with(
			|| -> u32 { panic!("job exploded") },
			JobOptions::named("boom").in_catalog(&catalog),
		)
		.unwrap();

	let mut fallible = system
		.enqueue_fallible(
			|| "not a number".parse::<u32>(),
			JobOptions::named("parse").in_catalog(&catalog),
		)
		.unwrap();

	catalog.seal();

	assert!(matches!(
		boom.wait(),
		Err(JobError::Panicked { reason, .. }) if reason == "job exploded"
	));
	assert!(matches!(fallible.wait(), Err(JobError::Failed { .. })));

	let mut handles = (0..32)
		.map(|i| system.enqueue(move || i + 1, "after failure", true).unwrap())
		.collect::<Vec<_>>();

	for (i, handle) in handles.iter_mut().enumerate() {
		assert_eq!(handle.wait(), Ok(i + 1));
	}

	assert!(catalog.is_done());
	assert_eq!(catalog.failed_count(), 2);
	assert_eq!(system.worker_liveness().count(), system.workers_count());

	assert_eq!(system.update(), 2);
	assert!(logs_contain("job exploded"));

	system.cleanup();
}

#[test]
#[traced_test]
fn idle_detection_test() {
	// A single worker has no reserved slot, so it always counts for idleness
	let system = JobSystem::init_with_config(
		JobSystemConfig::default()
			.with_worker_count(1)
			.with_reserved_threads(0),
	)
	.unwrap();

	assert!(wait_until(|| system.are_workers_idle()));

	let gate = Gate::default();

	let handles = (0..3)
		.map(|i| {
			let gate = gate.clone();
			system
				.enqueue(move || gate.wait(), format!("gated {i}"), false)
				.unwrap()
		})
		.collect::<Vec<_>>();

	// Jobs are either still queued or held by the busy worker
	assert!(!system.are_workers_idle());

	gate.open();
	drop(handles);

	assert!(wait_until(|| system.are_workers_idle()));
	assert_eq!(system.update(), 3);

	system.cleanup();
}

#[test]
#[traced_test]
fn idle_detection_with_reserved_worker_test() {
	let system = JobSystem::init_with_config(
		JobSystemConfig::default()
			.with_hardware_threads(4)
			.with_reserved_threads(0)
			.with_worker_count(4),
	)
	.unwrap();

	assert!(wait_until(|| system.are_workers_idle()));

	let gate = Gate::default();

	// More gated jobs than regular workers, so some of them also wait in the queue
	let handles = (0..6)
		.map(|i| {
			let gate = gate.clone();
			system
				.enqueue(move || gate.wait(), format!("gated {i}"), false)
				.unwrap()
		})
		.collect::<Vec<_>>();

	for _ in 0..50 {
		assert!(!system.are_workers_idle());
		thread::sleep(Duration::from_millis(1));
	}

	gate.open();
	drop(handles);

	assert!(wait_until(|| system.are_workers_idle()));
	assert_eq!(system.update(), 6);

	system.cleanup();
}

#[test]
#[traced_test]
fn cleanup_joins_every_worker_test() {
	let manager = JobManager::new(4, 4).unwrap();
	let liveness = manager.worker_liveness();

	assert_eq!(manager.workers_count(), 4);
	assert_eq!(liveness.count(), 4);

	drop(manager);

	assert_eq!(liveness.count(), 0);

	let system = JobSystem::init_with_config(
		JobSystemConfig::default()
			.with_hardware_threads(4)
			.with_reserved_threads(0)
			.with_worker_count(4),
	)
	.unwrap();
	let liveness = system.worker_liveness();

	assert_eq!(system.workers_count(), 4);
	assert_eq!(liveness.count(), 4);

	system.cleanup();

	assert_eq!(liveness.count(), 0);
	assert!(!system.is_running());

	system.cleanup();
	assert!(logs_contain("already cleaned up"));
}

#[test]
#[traced_test]
fn facade_after_cleanup_test() {
	let system = JobSystem::init(2).unwrap();
	let dispatcher = system.dispatcher();

	system.cleanup();

	assert!(matches!(
		system.enqueue(|| (), "late", false),
		Err(JobSystemError::Shutdown)
	));
	assert!(matches!(
		dispatcher.create_catalogue("late"),
		Err(JobSystemError::Shutdown)
	));
	assert!(matches!(
		dispatcher.for_each(|_| {}, 10, 2, 0),
		Err(JobSystemError::Shutdown)
	));
	assert_eq!(system.update(), 0);
	assert_eq!(system.workers_count(), 0);
	assert!(system.are_workers_idle());
	assert!(dispatcher.is_shutdown());
}

#[test]
#[traced_test]
fn submitting_from_a_job_during_cleanup_test() {
	let system =
		JobSystem::init_with_config(JobSystemConfig::default().with_worker_count(1)).unwrap();
	let dispatcher = system.dispatcher();
	let (started_tx, started_rx) = mpsc::channel();

	let mut spammer = system
		.enqueue(
			move || {
				let mut accepted = 0_usize;
				started_tx.send(()).unwrap();

				while let Ok(handle) = dispatcher.enqueue(|| (), "spam", true) {
					drop(handle);
					accepted += 1;
					thread::sleep(Duration::from_millis(1));
				}

				accepted
			},
			"spammer",
			false,
		)
		.unwrap();

	started_rx.recv().unwrap();
	thread::sleep(Duration::from_millis(20));

	system.cleanup();

	assert!(spammer.wait().unwrap() > 0);
}

#[tokio::test]
#[traced_test]
async fn await_handles_test() {
	let system = JobSystem::init(4).unwrap();
	let mut rng = rand::thread_rng();

	let handles = (0..64)
		.map(|i| {
			let sleep_for = Duration::from_millis(rng.gen_range(1..10));
			system
				.enqueue(
					move || {
						thread::sleep(sleep_for);
						i
					},
					format!("sleepy {i}"),
					true,
				)
				.unwrap()
		})
		.collect::<Vec<_>>();

	info!("all jobs enqueued, now we await them...");

	let results = handles.join().await;

	assert!(results
		.into_iter()
		.enumerate()
		.all(|(i, res)| res == Ok(i)));

	system.cleanup();
}

#[tokio::test]
#[traced_test]
async fn wait_inside_async_runtime_test() {
	let system = JobSystem::init(2).unwrap();

	let mut handle = system
		.enqueue(
			|| {
				thread::sleep(Duration::from_millis(20));
				"blocking"
			},
			"waited in runtime",
			false,
		)
		.unwrap();

	assert_eq!(handle.wait(), Ok("blocking"));
	assert!(matches!(handle.wait(), Err(JobError::AlreadyConsumed(_))));

	system.cleanup();
}

#[tokio::test]
#[traced_test]
async fn polled_then_awaited_test() {
	let system = JobSystem::init(1).unwrap();

	let mut handle = system.enqueue(|| "done", "polled", false).unwrap();

	assert!(wait_until(|| handle.has_completed()));
	assert_eq!((&mut handle).await, Ok("done"));
	assert!(matches!(
		handle.await,
		Err(JobError::AlreadyConsumed(_))
	));

	system.cleanup();
}

#[test]
#[traced_test]
fn dispatcher_outlives_system_test() {
	let system = JobSystem::init(1).unwrap();
	let dispatcher = system.dispatcher();

	let mut handle = dispatcher.enqueue(|| 1, "before drop", false).unwrap();
	assert_eq!(handle.wait(), Ok(1));

	drop(system);

	assert!(dispatcher.is_shutdown());
	assert!(matches!(
		dispatcher.enqueue(|| 2, "after drop", false),
		Err(JobSystemError::Shutdown)
	));
}
