//! Global memory addresses.
//!
//! A [`GlobalPointer`] is the global counterpart of a raw pointer: a 64-bit
//! descriptor naming an object in the distributed address space, or carrying
//! an application-defined reserved token with no lifecycle attached.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Rank of an executor within the static peer group, in `[0, cardinality)`.
pub type ExecutorId = u32;

/// A global memory address or reserved token.
///
/// The descriptor layout is:
/// - bit 63 — reserved flag (0 = address, 1 = reserved token)
/// - bits 32–62 — home partition (the rank that minted the address)
/// - bits 0–31 — offset within the home partition
///
/// Descriptor value 0 is the null pointer. Reserved descriptors are plain
/// numeric tokens: no release mechanism is triggered when a pointer carrying
/// one is dropped, and the runtime never interprets the token value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GlobalPointer(u64);

impl GlobalPointer {
	/// Lowest descriptor value denoting a reserved token.
	pub const FIRST_RESERVED: u64 = 1 << 63;

	/// Largest rank representable in the home field.
	pub const MAX_HOME: ExecutorId = (1 << 31) - 1;

	/// Conventional end-of-stream token, available to layers above the core.
	pub const EOS: GlobalPointer = GlobalPointer(u64::MAX);

	/// Conventional continuation token, available to layers above the core.
	pub const GO_ON: GlobalPointer = GlobalPointer(u64::MAX - 1);

	/// Builds an address from an offset and its home rank.
	///
	/// `home` must not exceed [`Self::MAX_HOME`], which keeps bit 63 clear.
	#[must_use]
	pub fn new(offset: u32, home: ExecutorId) -> Self {
		debug_assert!(home <= Self::MAX_HOME);
		GlobalPointer(u64::from(offset) | (u64::from(home) << 32))
	}

	/// Reinterprets a raw descriptor.
	#[must_use]
	pub fn from_raw(raw: u64) -> Self {
		GlobalPointer(raw)
	}

	/// Builds a reserved token carrying an application-defined value.
	#[must_use]
	pub fn reserved(token: u64) -> Self {
		GlobalPointer(token | Self::FIRST_RESERVED)
	}

	/// The full 64-bit descriptor.
	#[must_use]
	pub fn raw(self) -> u64 {
		self.0
	}

	/// True iff the descriptor names a global address.
	#[must_use]
	pub fn is_address(self) -> bool {
		self.0 != 0 && self.0 < Self::FIRST_RESERVED
	}

	/// True iff the descriptor carries a reserved token.
	#[must_use]
	pub fn is_reserved(self) -> bool {
		self.0 >= Self::FIRST_RESERVED
	}

	/// True iff this is the null pointer.
	#[must_use]
	pub fn is_null(self) -> bool {
		self.0 == 0
	}

	/// Home partition of an address: the rank that minted it.
	///
	/// The home is diagnostic only; routing goes through the author recorded
	/// in the executor's view, which may have moved since creation.
	#[must_use]
	pub fn home(self) -> ExecutorId {
		((self.0 >> 32) & u64::from(Self::MAX_HOME)) as ExecutorId
	}

	/// Offset of an address within its home partition.
	#[must_use]
	pub fn offset(self) -> u32 {
		self.0 as u32
	}
}

impl fmt::Display for GlobalPointer {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		if self.is_address() {
			write!(f, "{{addr={} home={}}}", self.0, self.home())
		} else {
			write!(f, "{{token={}}}", self.0)
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn address_bit_layout() {
		let p = GlobalPointer::new(5, 3);
		assert_eq!(p.raw(), 5 | (3 << 32));
		assert_eq!(p.offset(), 5);
		assert_eq!(p.home(), 3);
		assert!(p.is_address());
		assert!(!p.is_reserved());
		assert!(!p.is_null());
	}

	#[test]
	fn max_home_keeps_reserved_bit_clear() {
		let p = GlobalPointer::new(u32::MAX, GlobalPointer::MAX_HOME);
		assert!(p.is_address());
		assert_eq!(p.home(), GlobalPointer::MAX_HOME);
		assert_eq!(p.offset(), u32::MAX);
	}

	#[test]
	fn null_is_neither_address_nor_reserved() {
		let p = GlobalPointer::default();
		assert!(p.is_null());
		assert!(!p.is_address());
		assert!(!p.is_reserved());
	}

	#[test]
	fn reserved_tokens() {
		let p = GlobalPointer::reserved(7);
		assert!(p.is_reserved());
		assert!(!p.is_address());
		assert_eq!(p.raw(), 7 | GlobalPointer::FIRST_RESERVED);

		assert_eq!(GlobalPointer::EOS.raw(), u64::MAX);
		assert_eq!(GlobalPointer::GO_ON.raw(), u64::MAX - 1);
		assert!(GlobalPointer::EOS.is_reserved());
		assert!(GlobalPointer::GO_ON.is_reserved());
	}

	#[test]
	fn equality_compares_full_descriptor() {
		assert_eq!(GlobalPointer::new(1, 2), GlobalPointer::from_raw(1 | (2 << 32)));
		assert_ne!(GlobalPointer::new(1, 2), GlobalPointer::new(1, 3));
	}

	#[test]
	fn display_formats() {
		assert_eq!(GlobalPointer::new(9, 1).to_string(), format!("{{addr={} home=1}}", 9u64 | (1 << 32)));
		assert_eq!(GlobalPointer::EOS.to_string(), format!("{{token={}}}", u64::MAX));
	}
}
