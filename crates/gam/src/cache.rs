//! Read-through cache of remote public objects.
//!
//! The first local copy of a remote public object is fetched over the wire
//! and a replica is kept here; later copies are cloned out without traffic.
//! The cache is unbounded — public objects are immutable once published, so
//! entries never go stale and are only discarded with the context.

use std::any::Any;
use std::collections::HashMap;

use parking_lot::Mutex;

pub(crate) struct Cache {
	map: Mutex<HashMap<u64, Box<dyn Any + Send>>>,
}

impl Cache {
	pub(crate) fn new() -> Self {
		Cache { map: Mutex::new(HashMap::new()) }
	}

	/// Inserts the replica for an address. The address must not be cached.
	pub(crate) fn store<T: Send + 'static>(&self, a: u64, value: T) {
		tracing::trace!(addr = a, "cache store");
		let prev = self.map.lock().insert(a, Box::new(value));
		debug_assert!(prev.is_none());
	}

	/// Clones the replica for an address out of the cache, if present.
	pub(crate) fn load<T: Clone + 'static>(&self, a: u64) -> Option<T> {
		let map = self.map.lock();
		let hit = map.get(&a).and_then(|b| b.downcast_ref::<T>()).cloned();
		tracing::trace!(addr = a, hit = hit.is_some(), "cache load");
		hit
	}

	pub(crate) fn contains(&self, a: u64) -> bool {
		self.map.lock().contains_key(&a)
	}

	pub(crate) fn clear(&self) {
		self.map.lock().clear();
	}
}
