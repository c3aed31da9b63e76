//! The per-executor coordinator.
//!
//! A [`Context`] is one executor's view of the group: the three channel
//! endpoints, the memory tables, the daemon thread, and the operation
//! surface the pointer façades are built on. Everything behind it is shared
//! through an `Arc`, so façades stay valid wherever they travel inside the
//! process.
//!
//! Dropping the context terminates cooperatively: the daemon announces the
//! end of this executor's requests to every peer and keeps servicing remote
//! requests until every peer has announced the same.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};

use gam_proto::marshal::Marshal;
use gam_proto::messages::{AccessLevel, DaemonMsg, DaemonOp, PapMsg};
use gam_proto::pointer::{ExecutorId, GlobalPointer};

use crate::backend::{Backend, TypedBackend};
use crate::cache::Cache;
use crate::config::Config;
use crate::daemon;
use crate::error::{ConfigError, LinkError, Result};
use crate::links::Links;
use crate::logging;
use crate::ptr::{PrivatePtr, PublicPtr};
use crate::refcount::MemoryController;
use crate::view::{ObjectId, View};

/// One executor's handle on the global address space.
pub struct Context {
	inner: Arc<ContextInner>,
	daemon: Option<JoinHandle<()>>,
}

impl Context {
	/// Joins the executor group described by `config`.
	///
	/// Binds the three channel endpoints, connects to every peer (waiting
	/// for peers that have not come up yet), and spawns the daemon thread.
	pub fn new(config: Config) -> Result<Self> {
		let n = config.cardinality;
		if n == 0 {
			return Err(ConfigError::EmptyGroup.into());
		}
		if u64::from(n) - 1 > u64::from(GlobalPointer::MAX_HOME) {
			return Err(ConfigError::CardinalityOverflow(u64::from(n)).into());
		}
		if config.rank >= n {
			return Err(ConfigError::RankOutOfRange {
				rank: u64::from(config.rank),
				cardinality: u64::from(n),
			}
			.into());
		}
		if config.nodes.len() != n as usize {
			return Err(ConfigError::NodeCountMismatch {
				expected: u64::from(n),
				got: config.nodes.len() as u64,
			}
			.into());
		}

		if let Some(prefix) = &config.log_prefix {
			logging::init(prefix, config.rank);
		}

		let me = &config.nodes[config.rank as usize];
		let pap = Links::bind("pap", config.rank, &me.pap_addr())?;
		let local = Links::bind("local", config.rank, &me.local_addr())?;
		let remote = Links::bind("remote", config.rank, &me.remote_addr())?;

		// Outgoing wiring. Capability pushes go rank-to-rank on pap — self
		// included, so reserved tokens can loop back. Daemon traffic crosses
		// over: the local channel sends requests into peers' remote
		// endpoints, the remote channel sends replies into peers' local
		// endpoints.
		for (i, node) in config.nodes.iter().enumerate() {
			let i = i as ExecutorId;
			pap.peer(i, &node.pap_addr())?;
			if i != config.rank {
				local.peer(i, &node.remote_addr())?;
				remote.peer(i, &node.local_addr())?;
			}
		}

		let inner = Arc::new(ContextInner {
			rank: config.rank,
			cardinality: n,
			view: View::new(),
			mc: MemoryController::new(),
			cache: Cache::new(),
			pap,
			local,
			remote,
			termination: AtomicBool::new(false),
			next_offset: AtomicU32::new(1),
			next_object: AtomicU64::new(1),
		});

		let daemon = {
			let inner = inner.clone();
			thread::Builder::new()
				.name(format!("gam-daemon-{}", config.rank))
				.spawn(move || daemon::run(inner))
				.map_err(|error| LinkError::Io { channel: "remote", error })?
		};

		tracing::debug!(rank = config.rank, cardinality = n, "context up");
		Ok(Context { inner, daemon: Some(daemon) })
	}

	/// This executor's rank.
	pub fn rank(&self) -> ExecutorId {
		self.inner.rank
	}

	/// Total number of executors in the group.
	pub fn cardinality(&self) -> ExecutorId {
		self.inner.cardinality
	}

	/// Maps a fresh public global address over `value`, with this executor
	/// as author and a reference count of one.
	pub fn make_public<T: Marshal>(&self, value: T) -> PublicPtr<T> {
		PublicPtr::from_parts(self.inner.clone(), self.inner.mmap_public(value))
	}

	/// Maps a fresh private global address over `value`, with this executor
	/// as author and owner.
	pub fn make_private<T: Marshal>(&self, value: T) -> PrivatePtr<T> {
		PrivatePtr::from_parts(self.inner.clone(), self.inner.mmap_private(value))
	}

	/// Blocking pull of a public pointer, from a specific executor or any.
	///
	/// Returns a null pointer if the pulled descriptor is an address whose
	/// advertised access level is not public.
	pub fn pull_public<T: Marshal>(&self, from: Option<ExecutorId>) -> PublicPtr<T> {
		let gp = if self.valid_source(from) {
			self.inner.pull_public(from)
		} else {
			GlobalPointer::default()
		};
		PublicPtr::from_parts(self.inner.clone(), gp)
	}

	/// Blocking pull of a private pointer, from a specific executor or any.
	///
	/// Takes ownership of the pulled address. Returns a null pointer if the
	/// pulled descriptor is an address whose advertised access level is not
	/// private.
	pub fn pull_private<T: Marshal>(&self, from: Option<ExecutorId>) -> PrivatePtr<T> {
		let gp = if self.valid_source(from) {
			self.inner.pull_private(from)
		} else {
			GlobalPointer::default()
		};
		PrivatePtr::from_parts(self.inner.clone(), gp)
	}

	/// Sends a reserved token (or the null pointer) to another executor —
	/// or to self. No view bookkeeping is touched.
	pub fn push_reserved(&self, p: GlobalPointer, to: ExecutorId) {
		if p.is_address() {
			tracing::error!(%p, "> reserved push of a global address");
			return;
		}
		if !self.inner.valid_rank(to) {
			tracing::error!(to, "> push towards an invalid rank");
			return;
		}
		self.inner.push_reserved(p, to);
	}

	/// True iff this executor currently holds a view record for `p`.
	pub fn is_mapped(&self, p: GlobalPointer) -> bool {
		p.is_address() && self.inner.view.mapped(p.raw())
	}

	/// True iff `p` is an address mapped public here.
	pub fn is_public(&self, p: GlobalPointer) -> bool {
		p.is_address() && self.inner.view.access(p.raw()) == AccessLevel::Public
	}

	/// True iff `p` is an address mapped private here.
	pub fn is_private(&self, p: GlobalPointer) -> bool {
		p.is_address() && self.inner.view.access(p.raw()) == AccessLevel::Private
	}

	/// True iff this executor records itself as the owner of `p`.
	pub fn am_owner(&self, p: GlobalPointer) -> bool {
		self.inner.am_owner(p)
	}

	/// True iff this executor records itself as the author of `p`.
	pub fn am_author(&self, p: GlobalPointer) -> bool {
		p.is_address() && self.inner.view.author(p.raw()) == self.inner.rank
	}

	/// The recorded author of an address.
	pub fn author(&self, p: GlobalPointer) -> Option<ExecutorId> {
		p.is_address().then(|| self.inner.view.author(p.raw()))
	}

	#[doc(hidden)]
	pub fn is_cached(&self, p: GlobalPointer) -> bool {
		p.is_address() && self.inner.cache.contains(p.raw())
	}

	fn valid_source(&self, from: Option<ExecutorId>) -> bool {
		if let Some(e) = from
			&& !self.inner.valid_rank(e)
		{
			tracing::error!(from = e, "> pull from an invalid rank");
			return false;
		}
		true
	}
}

impl Drop for Context {
	fn drop(&mut self) {
		self.inner.termination.store(true, Ordering::Release);
		if let Some(handle) = self.daemon.take()
			&& handle.join().is_err()
		{
			tracing::error!(rank = self.inner.rank, "daemon thread panicked");
		}
		self.inner.cache.clear();
	}
}

pub(crate) struct ContextInner {
	rank: ExecutorId,
	cardinality: ExecutorId,
	pub(crate) view: View,
	pub(crate) mc: MemoryController,
	pub(crate) cache: Cache,
	pub(crate) pap: Links<PapMsg>,
	pub(crate) local: Links<DaemonMsg>,
	pub(crate) remote: Links<DaemonMsg>,
	pub(crate) termination: AtomicBool,
	next_offset: AtomicU32,
	next_object: AtomicU64,
}

impl ContextInner {
	pub(crate) fn rank(&self) -> ExecutorId {
		self.rank
	}

	pub(crate) fn cardinality(&self) -> ExecutorId {
		self.cardinality
	}

	pub(crate) fn valid_rank(&self, e: ExecutorId) -> bool {
		e < self.cardinality
	}

	fn fresh_address(&self) -> GlobalPointer {
		GlobalPointer::new(self.next_offset.fetch_add(1, Ordering::Relaxed), self.rank)
	}

	fn fresh_object_id(&self) -> ObjectId {
		ObjectId(self.next_object.fetch_add(1, Ordering::Relaxed))
	}

	/*
	 * global memory mapping
	 */

	fn mmap_global<T: Marshal>(&self, value: T, access: AccessLevel) -> GlobalPointer {
		let gp = self.fresh_address();
		let a = gp.raw();
		tracing::debug!(%gp, ?access, "mapping fresh global address");
		debug_assert!(!self.view.mapped(a));
		self.view.bind_committed(a, Box::new(TypedBackend(value)));
		self.view.bind_access(a, access);
		self.view.bind_author(a, self.rank);
		gp
	}

	pub(crate) fn mmap_public<T: Marshal>(&self, value: T) -> GlobalPointer {
		let gp = self.mmap_global(value, AccessLevel::Public);
		self.mc.rc_init(gp.raw());
		gp
	}

	pub(crate) fn mmap_private<T: Marshal>(&self, value: T) -> GlobalPointer {
		let gp = self.mmap_global(value, AccessLevel::Private);
		let a = gp.raw();
		let id = self.fresh_object_id();
		self.view.bind_owner(a, self.rank);
		self.view.bind_parent(id, a);
		self.view.bind_child(a, id);
		gp
	}

	/// Erases a record and everything bound to it, releasing the committed
	/// backing if one is present.
	pub(crate) fn unmap(&self, a: u64) {
		let Some(record) = self.view.unmap(a) else {
			tracing::error!(addr = a, "> unmap of an unmapped address");
			return;
		};
		match record.access {
			AccessLevel::Private => {
				if let Some(id) = record.child {
					self.view.unbind_parent(id);
				}
			}
			AccessLevel::Public => self.mc.rc_drop(a),
		}
	}

	/*
	 * capability passing
	 */

	pub(crate) fn push_public(&self, p: GlobalPointer, to: ExecutorId) {
		let a = p.raw();
		debug_assert_eq!(self.view.access(a), AccessLevel::Public);
		tracing::debug!(%p, to, "push public");

		// The destination's reference is counted before the capability
		// leaves, so a prompt release at the destination cannot reach the
		// author ahead of it.
		self.rc_inc(p);

		let msg = PapMsg { p, author: self.view.author(a), access: AccessLevel::Public };
		if let Err(error) = self.pap.send(&msg, to) {
			tracing::error!(%error, %p, to, "> push failed");
		}
	}

	pub(crate) fn push_private(&self, p: GlobalPointer, to: ExecutorId) {
		let a = p.raw();
		debug_assert_eq!(self.view.access(a), AccessLevel::Private);
		debug_assert_eq!(self.view.owner(a), Some(self.rank));
		tracing::debug!(%p, to, "push private");

		let author = self.view.author(a);
		// Ownership moves before the send returns: a reset issued by the
		// destination must find this record already relinquished.
		self.view.bind_owner(a, to);

		let msg = PapMsg { p, author, access: AccessLevel::Private };
		if let Err(error) = self.pap.send(&msg, to) {
			tracing::error!(%error, %p, to, "> push failed");
		}
	}

	pub(crate) fn push_reserved(&self, p: GlobalPointer, to: ExecutorId) {
		debug_assert!(!p.is_address());
		tracing::debug!(%p, to, "push reserved");
		let msg = PapMsg { p, author: 0, access: AccessLevel::Public };
		if let Err(error) = self.pap.send(&msg, to) {
			tracing::error!(%error, %p, to, "> push failed");
		}
	}

	fn pull_pap(&self, from: Option<ExecutorId>) -> Option<PapMsg> {
		let received = match from {
			Some(e) => self.pap.recv(e),
			None => self.pap.recv_any().map(|(msg, _)| msg),
		};
		match received {
			Ok(msg) => Some(msg),
			Err(error) => {
				tracing::error!(%error, "> pull failed");
				None
			}
		}
	}

	pub(crate) fn pull_public(&self, from: Option<ExecutorId>) -> GlobalPointer {
		let Some(msg) = self.pull_pap(from) else {
			return GlobalPointer::default();
		};
		if msg.p.is_address() {
			if msg.access != AccessLevel::Public {
				tracing::error!(p = %msg.p, "> pulled a non-public pointer on the public surface");
				return GlobalPointer::default();
			}
			let a = msg.p.raw();
			// Metadata instals on first observation only; the author's own
			// record must survive its capability coming back.
			if !self.view.mapped(a) {
				self.view.bind_access(a, AccessLevel::Public);
				self.view.bind_author(a, msg.author);
			}
			tracing::debug!(p = %msg.p, "pulled public");
		} else {
			tracing::debug!(p = %msg.p, "pulled reserved");
		}
		msg.p
	}

	pub(crate) fn pull_private(&self, from: Option<ExecutorId>) -> GlobalPointer {
		let Some(msg) = self.pull_pap(from) else {
			return GlobalPointer::default();
		};
		if msg.p.is_address() {
			if msg.access != AccessLevel::Private {
				tracing::error!(p = %msg.p, "> pulled a non-private pointer on the private surface");
				return GlobalPointer::default();
			}
			let a = msg.p.raw();
			if !self.view.mapped(a) || msg.author != self.rank {
				self.view.bind_access(a, AccessLevel::Private);
				self.view.bind_author(a, msg.author);
				debug_assert!(!self.view.has_committed(a));
			}
			// Take ownership: the committed copy is preserved only when the
			// capability returns to its recorded author.
			self.view.bind_owner(a, self.rank);
			tracing::debug!(p = %msg.p, "pulled private");
		} else {
			tracing::debug!(p = %msg.p, "pulled reserved");
		}
		msg.p
	}

	/*
	 * conversion to local objects
	 */

	pub(crate) fn local_public<T: Marshal + Clone>(&self, p: GlobalPointer) -> Option<Arc<T>> {
		let a = p.raw();
		debug_assert_eq!(self.view.access(a), AccessLevel::Public);
		tracing::debug!(%p, "local public");

		if self.view.author(a) == self.rank {
			let Some(value) = self
				.view
				.with_committed(a, |b| b.as_any().downcast_ref::<T>().cloned())
				.flatten()
			else {
				tracing::error!(%p, "> local copy with no committed object or a mismatched type");
				return None;
			};
			return Some(Arc::new(value));
		}

		if let Some(value) = self.cache.load::<T>(a) {
			return Some(Arc::new(value));
		}
		let author = self.view.author(a);
		let value: T = self.remote_load(p, author)?;
		self.cache.store(a, value.clone());
		Some(Arc::new(value))
	}

	pub(crate) fn local_private<T: Marshal>(&self, p: GlobalPointer) -> Option<(T, ObjectId)> {
		let a = p.raw();
		debug_assert_eq!(self.view.access(a), AccessLevel::Private);
		debug_assert_eq!(self.view.owner(a), Some(self.rank));
		tracing::debug!(%p, "local private");

		let author = self.view.author(a);
		if author != self.rank {
			// Withdraw: steal the object and move authorship here, then
			// have the old author clear its record.
			debug_assert!(!self.view.has_committed(a));
			let value: T = self.remote_load(p, author)?;
			let id = self.fresh_object_id();
			self.view.bind_parent(id, a);
			self.view.bind_child(a, id);
			self.view.bind_author(a, self.rank);
			self.forward_reset(p, author);
			return Some((value, id));
		}

		if !self.view.with_committed(a, |b| b.as_any().is::<T>()).unwrap_or(false) {
			tracing::error!(%p, "> materialise with no committed object or a mismatched type");
			return None;
		}
		let value = *self.view.take_committed(a)?.into_any().downcast::<T>().ok()?;
		let id = match self.view.child(a) {
			Some(id) => id,
			None => {
				let id = self.fresh_object_id();
				self.view.bind_parent(id, a);
				self.view.bind_child(a, id);
				id
			}
		};
		Some((value, id))
	}

	/*
	 * publishing private addresses
	 */

	pub(crate) fn publish<T: Marshal>(&self, p: GlobalPointer) -> Option<GlobalPointer> {
		let a = p.raw();
		debug_assert_eq!(self.view.access(a), AccessLevel::Private);
		debug_assert_eq!(self.view.owner(a), Some(self.rank));
		tracing::debug!(%p, "publish");

		let author = self.view.author(a);
		let backing: Box<dyn Backend> = if author == self.rank {
			match self.view.take_committed(a) {
				Some(backing) => backing,
				None => {
					tracing::error!(%p, "> publish of a record with no committed object");
					return None;
				}
			}
		} else {
			debug_assert!(!self.view.has_committed(a));
			let value: T = self.remote_load(p, author)?;
			self.forward_reset(p, author);
			Box::new(TypedBackend(value))
		};

		// The old record is gone; the object lives on at a fresh public
		// address authored here.
		self.unmap(a);

		let fresh = self.fresh_address();
		let a2 = fresh.raw();
		self.view.bind_committed(a2, backing);
		self.view.bind_access(a2, AccessLevel::Public);
		self.view.bind_author(a2, self.rank);
		self.mc.rc_init(a2);
		Some(fresh)
	}

	/*
	 * reference counting
	 */

	pub(crate) fn rc_inc(&self, p: GlobalPointer) {
		let a = p.raw();
		debug_assert_eq!(self.view.access(a), AccessLevel::Public);
		if self.view.author(a) == self.rank {
			self.mc.rc_inc(a);
		} else {
			self.forward(DaemonOp::RcInc, p);
		}
	}

	pub(crate) fn rc_dec(&self, p: GlobalPointer) {
		let a = p.raw();
		debug_assert_eq!(self.view.access(a), AccessLevel::Public);
		if self.view.author(a) == self.rank {
			if self.mc.rc_dec(a) == 0 {
				self.unmap(a);
			}
		} else {
			self.forward(DaemonOp::RcDec, p);
		}
	}

	pub(crate) fn rc_get(&self, p: GlobalPointer) -> u64 {
		let a = p.raw();
		let author = self.view.author(a);
		if author == self.rank {
			return self.mc.rc_get(a);
		}

		// Synchronous request/reply with the author's daemon.
		if let Err(error) = self
			.local
			.send(&DaemonMsg::new(DaemonOp::RcGet, self.rank, p), author)
		{
			tracing::error!(%error, %p, "> count query failed");
			return 0;
		}
		let mut bytes = [0u8; 8];
		match self.local.raw_recv(&mut bytes, author) {
			Ok(()) => u64::from_le_bytes(bytes),
			Err(error) => {
				tracing::error!(%error, %p, "> count query failed");
				0
			}
		}
	}

	fn forward(&self, op: DaemonOp, p: GlobalPointer) {
		let to = self.view.author(p.raw());
		tracing::trace!(?op, %p, to, "forwarding to author");
		if let Err(error) = self.local.send(&DaemonMsg::new(op, self.rank, p), to) {
			tracing::error!(%error, ?op, %p, "> forward failed");
		}
	}

	/*
	 * private pointer support
	 */

	pub(crate) fn forward_reset(&self, p: GlobalPointer, to: ExecutorId) {
		tracing::trace!(%p, to, "forwarding reset");
		if let Err(error) = self
			.local
			.send(&DaemonMsg::new(DaemonOp::PvtReset, self.rank, p), to)
		{
			tracing::error!(%error, %p, to, "> reset failed");
		}
	}

	/// Drops a private capability: erase locally when author, else have the
	/// author erase.
	pub(crate) fn reset_private(&self, p: GlobalPointer) {
		let a = p.raw();
		tracing::debug!(%p, "private reset");
		if self.view.author(a) == self.rank {
			self.unmap(a);
		} else {
			self.forward_reset(p, self.view.author(a));
		}
	}

	/// Rebinds a materialised object to its parent address.
	pub(crate) fn writeback<T: Marshal>(&self, id: ObjectId, value: T) -> Option<GlobalPointer> {
		let Some(a) = self.view.parent(id) else {
			tracing::error!("> write-back of an unknown child");
			return None;
		};
		debug_assert_eq!(self.view.owner(a), Some(self.rank));
		tracing::debug!(addr = a, "write-back");
		self.view.bind_committed(a, Box::new(TypedBackend(value)));
		Some(GlobalPointer::from_raw(a))
	}

	/// Called when a materialised child is dropped without write-back.
	pub(crate) fn child_dropped(&self, id: ObjectId) {
		let Some(a) = self.view.parent(id) else {
			tracing::error!("> drop of an unknown child");
			return;
		};
		self.unmap(a);
	}

	pub(crate) fn am_owner(&self, p: GlobalPointer) -> bool {
		p.is_address() && self.view.owner(p.raw()) == Some(self.rank)
	}

	/*
	 * remote loads
	 */

	fn remote_load<T: Marshal>(&self, p: GlobalPointer, author: ExecutorId) -> Option<T> {
		tracing::debug!(%p, author, "remote load");
		let req = DaemonMsg {
			op: DaemonOp::Rload,
			size: T::WIRE_SIZE.unwrap_or(0),
			from: self.rank,
			p,
		};
		if let Err(error) = self.local.send(&req, author) {
			tracing::error!(%error, %p, "> remote load failed");
			return None;
		}
		let mut source =
			|dst: &mut [u8]| self.local.raw_recv(dst, author).map_err(io::Error::other);
		match T::ingest(&mut source) {
			Ok(value) => Some(value),
			Err(error) => {
				tracing::error!(%error, %p, "> remote load failed");
				None
			}
		}
	}
}
