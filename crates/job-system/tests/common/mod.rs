#![allow(dead_code)]

use std::{
	sync::Arc,
	thread,
	time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex};

const WAIT_LIMIT: Duration = Duration::from_secs(10);

/// Polls `condition` until it holds, giving up after a generous limit.
pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
	let started_at = Instant::now();

	while !condition() {
		if started_at.elapsed() > WAIT_LIMIT {
			return false;
		}

		thread::sleep(Duration::from_millis(1));
	}

	true
}

/// A latch that blocks jobs until the test opens it.
#[derive(Clone, Default)]
pub struct Gate {
	inner: Arc<(Mutex<bool>, Condvar)>,
}

impl Gate {
	pub fn open(&self) {
		let (is_open, opened) = &*self.inner;
		*is_open.lock() = true;
		opened.notify_all();
	}

	pub fn wait(&self) {
		let (is_open, opened) = &*self.inner;
		let mut is_open = is_open.lock();

		while !*is_open {
			opened.wait(&mut is_open);
		}
	}
}
