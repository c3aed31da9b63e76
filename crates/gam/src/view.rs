//! The global memory state as perceived by a single executor.
//!
//! Two tables: global address → per-address record, and object identity →
//! global address (the parent table, used when a materialised child is
//! turned back into a private pointer). Both are mutated by the application
//! thread and the daemon, so each sits behind its own mutex; every critical
//! section encloses exactly one map operation.

use std::collections::HashMap;

use gam_proto::messages::AccessLevel;
use gam_proto::pointer::ExecutorId;
use parking_lot::Mutex;

use crate::backend::Backend;

/// Stable identity of a locally materialised private object.
///
/// The parent table is keyed by this identity rather than by the object's
/// address in memory, so allocator address reuse can never alias two
/// children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId(pub(crate) u64);

pub(crate) struct Record {
	pub(crate) access: AccessLevel,
	pub(crate) author: ExecutorId,
	/// Capability holder; `None` for public addresses.
	pub(crate) owner: Option<ExecutorId>,
	/// The committed backing object, held only at the author.
	pub(crate) committed: Option<Box<dyn Backend>>,
	/// Identity of the in-place materialised object, private only.
	pub(crate) child: Option<ObjectId>,
}

impl Default for Record {
	fn default() -> Self {
		Record {
			access: AccessLevel::Public,
			author: 0,
			owner: None,
			committed: None,
			child: None,
		}
	}
}

pub(crate) struct View {
	map: Mutex<HashMap<u64, Record>>,
	parents: Mutex<HashMap<ObjectId, u64>>,
}

impl View {
	pub(crate) fn new() -> Self {
		View {
			map: Mutex::new(HashMap::new()),
			parents: Mutex::new(HashMap::new()),
		}
	}

	pub(crate) fn mapped(&self, a: u64) -> bool {
		self.map.lock().contains_key(&a)
	}

	pub(crate) fn access(&self, a: u64) -> AccessLevel {
		self.map.lock().entry(a).or_default().access
	}

	pub(crate) fn author(&self, a: u64) -> ExecutorId {
		self.map.lock().entry(a).or_default().author
	}

	pub(crate) fn owner(&self, a: u64) -> Option<ExecutorId> {
		self.map.lock().entry(a).or_default().owner
	}

	pub(crate) fn child(&self, a: u64) -> Option<ObjectId> {
		self.map.lock().entry(a).or_default().child
	}

	pub(crate) fn parent(&self, id: ObjectId) -> Option<u64> {
		self.parents.lock().get(&id).copied()
	}

	pub(crate) fn has_committed(&self, a: u64) -> bool {
		self.map.lock().get(&a).is_some_and(|r| r.committed.is_some())
	}

	pub(crate) fn bind_access(&self, a: u64, access: AccessLevel) {
		tracing::trace!(addr = a, ?access, "view: bind access");
		self.map.lock().entry(a).or_default().access = access;
	}

	pub(crate) fn bind_author(&self, a: u64, author: ExecutorId) {
		tracing::trace!(addr = a, author, "view: bind author");
		self.map.lock().entry(a).or_default().author = author;
	}

	pub(crate) fn bind_owner(&self, a: u64, owner: ExecutorId) {
		tracing::trace!(addr = a, owner, "view: bind owner");
		self.map.lock().entry(a).or_default().owner = Some(owner);
	}

	pub(crate) fn bind_child(&self, a: u64, id: ObjectId) {
		tracing::trace!(addr = a, id = id.0, "view: bind child");
		self.map.lock().entry(a).or_default().child = Some(id);
	}

	pub(crate) fn bind_parent(&self, id: ObjectId, a: u64) {
		tracing::trace!(id = id.0, addr = a, "view: bind parent");
		self.parents.lock().insert(id, a);
	}

	pub(crate) fn unbind_parent(&self, id: ObjectId) {
		tracing::trace!(id = id.0, "view: unbind parent");
		self.parents.lock().remove(&id);
	}

	pub(crate) fn bind_committed(&self, a: u64, backing: Box<dyn Backend>) {
		tracing::trace!(addr = a, "view: bind committed");
		self.map.lock().entry(a).or_default().committed = Some(backing);
	}

	pub(crate) fn take_committed(&self, a: u64) -> Option<Box<dyn Backend>> {
		self.map.lock().get_mut(&a).and_then(|r| r.committed.take())
	}

	pub(crate) fn with_committed<R>(
		&self,
		a: u64,
		f: impl FnOnce(&dyn Backend) -> R,
	) -> Option<R> {
		self.map
			.lock()
			.get(&a)
			.and_then(|r| r.committed.as_deref())
			.map(|backing| f(backing))
	}

	/// Erases a record, handing it back for cleanup.
	pub(crate) fn unmap(&self, a: u64) -> Option<Record> {
		tracing::trace!(addr = a, "view: unmap");
		self.map.lock().remove(&a)
	}
}
