//! Type-erased owners of committed objects.
//!
//! The view and the cache hold objects of arbitrary application types. A
//! [`Backend`] erases the type while keeping the two capabilities the
//! runtime needs: streaming the object's marshalled regions (for servicing
//! remote loads) and typed access for copy-out or move-out. Ownership and
//! release are plain `Drop`.

use std::any::Any;
use std::io;

use gam_proto::marshal::{Marshal, RegionSink};

pub(crate) trait Backend: Send {
	/// Streams the committed object's wire regions, in order.
	fn marshall(&self, sink: &mut RegionSink<'_>) -> io::Result<()>;

	/// Typed read access.
	fn as_any(&self) -> &dyn Any;

	/// Typed move-out.
	fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

pub(crate) struct TypedBackend<T>(pub(crate) T);

impl<T: Marshal> Backend for TypedBackend<T> {
	fn marshall(&self, sink: &mut RegionSink<'_>) -> io::Result<()> {
		self.0.marshall(sink)
	}

	fn as_any(&self) -> &dyn Any {
		&self.0
	}

	fn into_any(self: Box<Self>) -> Box<dyn Any> {
		Box::new(self.0)
	}
}

/// Collects a backend's regions into one buffer.
pub(crate) fn marshalled_bytes(backend: &dyn Backend) -> Vec<u8> {
	let mut out = Vec::new();
	let ok = backend.marshall(&mut |region| {
		out.extend_from_slice(region);
		Ok(())
	});
	debug_assert!(ok.is_ok());
	out
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn marshalls_like_the_underlying_value() {
		let backend = TypedBackend(String::from("abc"));
		let bytes = marshalled_bytes(&backend);
		assert_eq!(&bytes[..8], &3u64.to_le_bytes());
		assert_eq!(&bytes[8..], b"abc");
	}

	#[test]
	fn typed_access() {
		let backend: Box<dyn Backend> = Box::new(TypedBackend(42i32));
		assert_eq!(backend.as_any().downcast_ref::<i32>(), Some(&42));
		assert!(backend.as_any().downcast_ref::<u64>().is_none());
		let value = backend.into_any().downcast::<i32>().unwrap();
		assert_eq!(*value, 42);
	}
}
