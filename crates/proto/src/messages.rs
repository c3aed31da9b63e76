//! Channel message records and frame encoding.
//!
//! Each executor owns three message channels. The *pap* channel carries
//! capability transfers ([`PapMsg`]); the *local* and *remote* channels carry
//! daemon requests and termination sentinels ([`DaemonMsg`]). Typed messages
//! are framed as a little-endian `u32` length prefix followed by a postcard
//! body; object payloads and reply values travel as unframed raw bytes whose
//! length is implied by the request context.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::pointer::{ExecutorId, GlobalPointer};

/// Sharing discipline of a global address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessLevel {
	/// Reference-counted, read-only replicated.
	Public,
	/// Single-owner, migratable.
	Private,
}

/// Capability transfer record carried on the pap channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PapMsg {
	/// The transferred pointer: an address, a reserved token, or null.
	pub p: GlobalPointer,
	/// The sender's recorded author for `p`; meaningful only for addresses.
	pub author: ExecutorId,
	/// Advertised sharing discipline; meaningful only for addresses.
	pub access: AccessLevel,
}

/// Operation requested on the daemon channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DaemonOp {
	/// Stream the committed object's marshalled regions back to the sender.
	Rload,
	/// Increment the reference counter.
	RcInc,
	/// Decrement the reference counter; unmap on zero.
	RcDec,
	/// Reply with the current reference count.
	RcGet,
	/// Erase the record and release the committed backing.
	PvtReset,
	/// Termination sentinel: the sender's application issues no further
	/// requests on this channel pair.
	DmnEnd,
}

/// Request record carried on the local and remote channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonMsg {
	/// The requested operation.
	pub op: DaemonOp,
	/// Payload byte count for [`DaemonOp::Rload`] with a fixed-layout type;
	/// zero when the layout is receiver-driven or for every other operation.
	pub size: u64,
	/// Rank of the requesting executor, which replies are directed to.
	pub from: ExecutorId,
	/// The address the operation applies to.
	pub p: GlobalPointer,
}

impl DaemonMsg {
	/// Builds a request with no payload size.
	#[must_use]
	pub fn new(op: DaemonOp, from: ExecutorId, p: GlobalPointer) -> Self {
		DaemonMsg { op, size: 0, from, p }
	}
}

/// Encodes a typed message as a length-prefixed frame.
pub fn encode_frame<T: Serialize>(msg: &T) -> Result<Vec<u8>, postcard::Error> {
	let body = postcard::to_allocvec(msg)?;
	let mut frame = Vec::with_capacity(4 + body.len());
	frame.extend_from_slice(&(body.len() as u32).to_le_bytes());
	frame.extend_from_slice(&body);
	Ok(frame)
}

/// Decodes a frame body (the bytes following the length prefix).
pub fn decode_frame<T: DeserializeOwned>(body: &[u8]) -> Result<T, postcard::Error> {
	postcard::from_bytes(body)
}
