//! Runtime for distributed partitioned-global-address-space programs.
//!
//! A fixed group of peer executors, one process each, cooperatively manages a
//! logical global address space. Application code creates globally
//! addressable objects, hands their addresses to other executors over typed
//! message channels, and later materialises them back into local objects.
//! Two sharing disciplines are provided: *public* pointers are
//! reference-counted and replicated read-only, *private* pointers have a
//! single owner and migrate.
//!
//! Each executor hosts one [`Context`] with an application-facing operation
//! surface and a daemon thread that services remote requests (reference
//! counting, remote loads, record resets). Executors are bootstrapped from a
//! [`Config`], usually read from `GAM_*` environment variables.
//!
//! ```no_run
//! use gam::{Config, Context};
//!
//! let ctx = Context::new(Config::from_env()?)?;
//! if ctx.rank() == 0 {
//! 	let mut p = ctx.make_private(42i32);
//! 	p.push(1);
//! } else {
//! 	let mut p = ctx.pull_private::<i32>(Some(0));
//! 	let value = p.local().expect("owned pointer");
//! 	assert_eq!(*value, 42);
//! }
//! # Ok::<(), gam::Error>(())
//! ```

mod backend;
mod cache;
mod daemon;
mod links;
mod logging;
mod refcount;
mod view;

pub mod config;
pub mod context;
pub mod error;
pub mod ptr;

pub use config::Config;
pub use context::Context;
pub use error::{Error, Result};
pub use gam_proto as proto;
pub use ptr::{PrivatePtr, PublicPtr, UniqueChild};
