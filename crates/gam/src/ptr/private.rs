//! Single-owner global pointers and their materialised children.

use std::fmt;
use std::marker::PhantomData;
use std::mem;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use gam_proto::marshal::Marshal;
use gam_proto::pointer::{ExecutorId, GlobalPointer};

use crate::context::ContextInner;
use crate::view::ObjectId;

/// The owning handle on a private global address.
///
/// Exactly one executor owns a private address at any time. Pushing the
/// pointer moves ownership to the destination and nulls this handle;
/// materialising it yields the object itself as a [`UniqueChild`]. Dropping
/// an owning handle erases the address — locally when this executor is the
/// author, through a reset request otherwise.
///
/// A `PrivatePtr` may also carry a reserved token or be null.
pub struct PrivatePtr<T> {
	gp: GlobalPointer,
	ctx: Arc<ContextInner>,
	_object: PhantomData<fn() -> T>,
}

impl<T> PrivatePtr<T> {
	pub(crate) fn from_parts(ctx: Arc<ContextInner>, gp: GlobalPointer) -> Self {
		PrivatePtr { gp, ctx, _object: PhantomData }
	}

	/// The wrapped descriptor.
	pub fn get(&self) -> GlobalPointer {
		self.gp
	}

	/// True iff the pointer carries nothing.
	pub fn is_null(&self) -> bool {
		self.gp.is_null()
	}

	/// Transfers this pointer to another executor, nulling it here.
	pub fn push(&mut self, to: ExecutorId) {
		if to == self.ctx.rank() || !self.ctx.valid_rank(to) {
			tracing::error!(to, "> push towards an invalid rank");
			return;
		}
		if self.gp.is_address() {
			if !self.ctx.am_owner(self.gp) {
				tracing::error!(p = %self.gp, "> push of a non-owned pointer");
				return;
			}
			self.ctx.push_private(self.gp, to);
			self.gp = GlobalPointer::default();
		} else {
			self.ctx.push_reserved(self.gp, to);
		}
	}

	pub(crate) fn take_parts(mut self) -> (GlobalPointer, Arc<ContextInner>) {
		(mem::take(&mut self.gp), self.ctx.clone())
	}
}

impl<T: Marshal> PrivatePtr<T> {
	/// Materialises the object, consuming the pointer.
	///
	/// When this executor is not the author, the object is withdrawn first:
	/// loaded from the current author, which then erases its record, leaving
	/// this executor as the new author.
	pub fn local(&mut self) -> Option<UniqueChild<T>> {
		if !self.gp.is_address() {
			tracing::error!(p = %self.gp, "> materialise of a non-address pointer");
			return None;
		}
		if !self.ctx.am_owner(self.gp) {
			tracing::error!(p = %self.gp, "> materialise of a non-owned pointer");
			return None;
		}
		let (value, id) = self.ctx.local_private::<T>(self.gp)?;
		// The child takes the record over; this handle is spent.
		self.gp = GlobalPointer::default();
		Some(UniqueChild { value: Some(value), id, ctx: self.ctx.clone() })
	}
}

impl<T> Drop for PrivatePtr<T> {
	fn drop(&mut self) {
		if self.gp.is_address() {
			self.ctx.reset_private(self.gp);
		}
	}
}

impl<T> fmt::Debug for PrivatePtr<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "PrivatePtr({})", self.gp)
	}
}

impl<T> fmt::Display for PrivatePtr<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "[PVT global={}]", self.gp)
	}
}

/// The locally materialised object of a private address.
///
/// Owns the object outright; dereference to read and mutate it. Dropping
/// the child erases the parent record. Converting it back into a
/// [`PrivatePtr`] re-commits the object under the same global address.
pub struct UniqueChild<T: Marshal> {
	value: Option<T>,
	id: ObjectId,
	ctx: Arc<ContextInner>,
}

impl<T: Marshal> Deref for UniqueChild<T> {
	type Target = T;

	fn deref(&self) -> &T {
		self.value.as_ref().unwrap()
	}
}

impl<T: Marshal> DerefMut for UniqueChild<T> {
	fn deref_mut(&mut self) -> &mut T {
		self.value.as_mut().unwrap()
	}
}

impl<T: Marshal> Drop for UniqueChild<T> {
	fn drop(&mut self) {
		if self.value.take().is_some() {
			self.ctx.child_dropped(self.id);
		}
	}
}

/// Write-back: the object is re-committed under its parent address and the
/// rebuilt pointer owns it again.
impl<T: Marshal> From<UniqueChild<T>> for PrivatePtr<T> {
	fn from(mut child: UniqueChild<T>) -> Self {
		let value = child.value.take().unwrap();
		let id = child.id;
		let ctx = child.ctx.clone();
		drop(child);
		let gp = ctx.writeback(id, value).unwrap_or_default();
		PrivatePtr::from_parts(ctx, gp)
	}
}
