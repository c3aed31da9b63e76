//! Shared wire vocabulary for the gam runtime.
//!
//! This crate defines everything two executors must agree on to talk to each
//! other: the 64-bit global pointer descriptor, the fixed records exchanged on
//! the capability-passing and daemon channels, the binary framing used for
//! typed messages, and the [`Marshal`] trait that governs how object payloads
//! travel as raw byte regions.

#![warn(missing_docs)]

pub mod marshal;
pub mod messages;
pub mod pointer;

pub use marshal::Marshal;
pub use messages::{AccessLevel, DaemonMsg, DaemonOp, PapMsg};
pub use pointer::{ExecutorId, GlobalPointer};
