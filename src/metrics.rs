use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic event counter.
///
/// Shared by reference across threads; every operation is a single relaxed
/// atomic. Not a synchronization point.
#[derive(Debug, Default)]
pub struct Counter {
	value: AtomicU64,
}

impl Counter {
	pub const fn new() -> Self {
		Self {
			value: AtomicU64::new(0),
		}
	}

	#[inline]
	pub fn get(&self) -> u64 {
		self.value.load(Ordering::Relaxed)
	}

	#[inline]
	pub fn set(&self, value: u64) {
		self.value.store(value, Ordering::Relaxed);
	}

	/// Adds one. Returns the value before the increment.
	#[inline]
	pub fn inc(&self) -> u64 {
		self.add(1)
	}

	/// Returns the value before the addition. Wraps on overflow.
	#[inline]
	pub fn add(&self, n: u64) -> u64 {
		self.value.fetch_add(n, Ordering::Relaxed)
	}

	#[inline]
	pub fn reset(&self) {
		self.set(0);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::Arc;
	use std::thread;

	#[test]
	fn counts_and_resets() {
		let c = Counter::new();
		assert_eq!(c.inc(), 0);
		assert_eq!(c.inc(), 1);
		c.add(10);
		assert_eq!(c.get(), 12);
		c.set(5);
		assert_eq!(c.get(), 5);
		c.reset();
		assert_eq!(c.get(), 0);
	}

	#[test]
	fn concurrent_increments_are_not_lost() {
		let c = Arc::new(Counter::new());
		let handles: Vec<_> = (0..4)
			.map(|_| {
				let c = Arc::clone(&c);
				thread::spawn(move || {
					for _ in 0..1000 {
						c.inc();
					}
				})
			})
			.collect();
		for h in handles {
			h.join().unwrap();
		}
		assert_eq!(c.get(), 4000);
	}
}
