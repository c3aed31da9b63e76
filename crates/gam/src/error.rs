//! Error types for the runtime.
//!
//! Only executor bootstrap reports errors through `Result`: a malformed
//! configuration or an unreachable peer is fatal and surfaces from
//! [`Context::new`](crate::Context::new). Programmer misuse of the pointer
//! façades (pushing to an invalid rank, materialising a non-owned pointer,
//! pulling a mismatched access level) is reported as a diagnostic on the
//! error stream and yields a null value instead — protocol state is left
//! unchanged and nothing panics.

use gam_proto::pointer::ExecutorId;
use thiserror::Error;

/// Errors raised while reading the bootstrap configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// A required environment variable is absent.
	#[error("missing environment variable: {0}")]
	MissingVar(String),

	/// A variable is present but does not parse.
	#[error("invalid value for {name}: {value:?}")]
	InvalidVar {
		/// Name of the offending variable.
		name: String,
		/// The raw value that failed to parse.
		value: String,
	},

	/// The executor group is empty.
	#[error("cardinality must be at least 1")]
	EmptyGroup,

	/// The group is too large for the home field of a global address.
	#[error("cardinality {0} exceeds the addressable executor range")]
	CardinalityOverflow(u64),

	/// The configured rank does not fall in `[0, cardinality)`.
	#[error("rank {rank} out of range for cardinality {cardinality}")]
	RankOutOfRange {
		/// The configured rank.
		rank: u64,
		/// The configured group size.
		cardinality: u64,
	},

	/// The node table does not cover every rank exactly once.
	#[error("{got} node addresses configured for cardinality {expected}")]
	NodeCountMismatch {
		/// The configured group size.
		expected: u64,
		/// How many node addresses were supplied.
		got: u64,
	},
}

/// Errors raised by the message channels.
#[derive(Debug, Error)]
pub enum LinkError {
	/// I/O failure on a channel endpoint or stream.
	#[error("I/O error on {channel} channel: {error}")]
	Io {
		/// Which of the three channels failed.
		channel: &'static str,
		/// The underlying I/O error.
		error: std::io::Error,
	},

	/// A peer could not be reached within the connect deadline.
	#[error("could not reach peer {rank} at {addr}: {error}")]
	Connect {
		/// Rank of the unreachable peer.
		rank: ExecutorId,
		/// The address that was dialled.
		addr: String,
		/// The last connection error observed.
		error: std::io::Error,
	},

	/// A send was directed at a rank with no registered peer.
	#[error("no registered peer with rank {0}")]
	UnknownPeer(ExecutorId),

	/// A peer closed its stream while a receive was outstanding.
	#[error("connection from peer {0} closed")]
	Disconnected(ExecutorId),

	/// A frame failed to encode or decode.
	#[error("codec error: {0}")]
	Codec(#[from] postcard::Error),
}

/// Any error the runtime can surface to the application.
#[derive(Debug, Error)]
pub enum Error {
	/// Bootstrap configuration failure.
	#[error(transparent)]
	Config(#[from] ConfigError),

	/// Channel failure during executor construction.
	#[error(transparent)]
	Link(#[from] LinkError),
}

/// Result alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;
