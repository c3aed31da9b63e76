//! Per-address reference counters.
//!
//! Counters exist only at an address's author; every other executor forwards
//! its increments and decrements there. The map lock covers entry lookup
//! only — the counters themselves are atomics shared out via `Arc`, so they
//! can be touched after the entry is located without holding the lock.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

pub(crate) struct MemoryController {
	counters: Mutex<HashMap<u64, Arc<AtomicU64>>>,
}

impl MemoryController {
	pub(crate) fn new() -> Self {
		MemoryController { counters: Mutex::new(HashMap::new()) }
	}

	/// Creates the counter for a freshly mapped address, starting at 1.
	pub(crate) fn rc_init(&self, a: u64) {
		tracing::trace!(addr = a, "rc init");
		let prev = self
			.counters
			.lock()
			.insert(a, Arc::new(AtomicU64::new(1)));
		debug_assert!(prev.is_none());
	}

	/// Returns the post-increment value.
	pub(crate) fn rc_inc(&self, a: u64) -> u64 {
		let value = self.counter(a).fetch_add(1, Ordering::SeqCst) + 1;
		tracing::trace!(addr = a, value, "rc +1");
		value
	}

	/// Returns the post-decrement value.
	pub(crate) fn rc_dec(&self, a: u64) -> u64 {
		let value = self.counter(a).fetch_sub(1, Ordering::SeqCst) - 1;
		tracing::trace!(addr = a, value, "rc -1");
		value
	}

	pub(crate) fn rc_get(&self, a: u64) -> u64 {
		self.counter(a).load(Ordering::SeqCst)
	}

	/// Discards the counter of an unmapped address.
	pub(crate) fn rc_drop(&self, a: u64) {
		self.counters.lock().remove(&a);
	}

	fn counter(&self, a: u64) -> Arc<AtomicU64> {
		self.counters
			.lock()
			.entry(a)
			.or_insert_with(|| Arc::new(AtomicU64::new(0)))
			.clone()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn init_starts_at_one() {
		let mc = MemoryController::new();
		mc.rc_init(1);
		assert_eq!(mc.rc_get(1), 1);
	}

	#[test]
	fn inc_and_dec_return_the_new_value() {
		let mc = MemoryController::new();
		mc.rc_init(1);
		assert_eq!(mc.rc_inc(1), 2);
		assert_eq!(mc.rc_inc(1), 3);
		assert_eq!(mc.rc_dec(1), 2);
		assert_eq!(mc.rc_dec(1), 1);
		assert_eq!(mc.rc_dec(1), 0);
	}

	#[test]
	fn get_is_idempotent() {
		let mc = MemoryController::new();
		mc.rc_init(5);
		mc.rc_inc(5);
		assert_eq!(mc.rc_get(5), 2);
		assert_eq!(mc.rc_get(5), 2);
	}

	#[test]
	fn dropped_counter_restarts_from_zero() {
		let mc = MemoryController::new();
		mc.rc_init(3);
		mc.rc_drop(3);
		assert_eq!(mc.rc_get(3), 0);
	}
}
