//! Reference-counted global pointers.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use gam_proto::marshal::Marshal;
use gam_proto::pointer::{ExecutorId, GlobalPointer};

use crate::context::ContextInner;
use crate::ptr::private::PrivatePtr;

/// A shared handle on a public global address.
///
/// Every live clone, across every executor, is one unit of the reference
/// count maintained at the address's author. Cloning increments it, dropping
/// decrements it; when it reaches zero the author releases the committed
/// object and erases the address.
///
/// A `PublicPtr` may also carry a reserved token or be null, in which case
/// no counting happens at all.
pub struct PublicPtr<T> {
	gp: GlobalPointer,
	ctx: Arc<ContextInner>,
	_object: PhantomData<fn() -> T>,
}

impl<T> PublicPtr<T> {
	pub(crate) fn from_parts(ctx: Arc<ContextInner>, gp: GlobalPointer) -> Self {
		PublicPtr { gp, ctx, _object: PhantomData }
	}

	/// The wrapped descriptor.
	pub fn get(&self) -> GlobalPointer {
		self.gp
	}

	/// True iff the pointer carries nothing.
	pub fn is_null(&self) -> bool {
		self.gp.is_null()
	}

	/// Sends this pointer to another executor.
	///
	/// For an address, the destination's future reference is counted at the
	/// author as part of the send.
	pub fn push(&self, to: ExecutorId) {
		if !self.ctx.valid_rank(to) {
			tracing::error!(to, "> push towards an invalid rank");
			return;
		}
		if self.gp.is_address() {
			self.ctx.push_public(self.gp, to);
		} else {
			self.ctx.push_reserved(self.gp, to);
		}
	}

	/// Releases this reference and nulls the pointer.
	pub fn reset(&mut self) {
		if self.gp.is_address() {
			self.ctx.rc_dec(self.gp);
		}
		self.gp = GlobalPointer::default();
	}

	/// The current reference count, queried from the author.
	pub fn use_count(&self) -> u64 {
		if self.gp.is_address() { self.ctx.rc_get(self.gp) } else { 0 }
	}
}

impl<T: Marshal + Clone> PublicPtr<T> {
	/// Produces a local copy of the object.
	///
	/// At the author this copies out of the committed object; elsewhere it
	/// is served from the replica cache, fetching from the author on the
	/// first call.
	pub fn local(&self) -> Option<Arc<T>> {
		if !self.gp.is_address() {
			tracing::error!(p = %self.gp, "> local copy of a non-address pointer");
			return None;
		}
		self.ctx.local_public::<T>(self.gp)
	}
}

impl<T> Clone for PublicPtr<T> {
	fn clone(&self) -> Self {
		if self.gp.is_address() {
			self.ctx.rc_inc(self.gp);
		}
		PublicPtr { gp: self.gp, ctx: self.ctx.clone(), _object: PhantomData }
	}
}

impl<T> Drop for PublicPtr<T> {
	fn drop(&mut self) {
		if self.gp.is_address() {
			self.ctx.rc_dec(self.gp);
		}
	}
}

/// Republishing: the private object moves to a fresh public address authored
/// by this executor. The conversion is one-way.
impl<T: Marshal> From<PrivatePtr<T>> for PublicPtr<T> {
	fn from(p: PrivatePtr<T>) -> Self {
		let (gp, ctx) = p.take_parts();
		if !gp.is_address() {
			// Reserved tokens and null carry over untouched.
			return PublicPtr::from_parts(ctx, gp);
		}
		if !ctx.am_owner(gp) {
			tracing::error!(p = %gp, "> republish of a non-owned pointer");
			return PublicPtr::from_parts(ctx, GlobalPointer::default());
		}
		let fresh = ctx.publish::<T>(gp).unwrap_or_default();
		PublicPtr::from_parts(ctx, fresh)
	}
}

impl<T> fmt::Debug for PublicPtr<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "PublicPtr({})", self.gp)
	}
}

impl<T> fmt::Display for PublicPtr<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "[PUB global={}]", self.gp)
	}
}
