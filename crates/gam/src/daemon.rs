//! Remote request servicing.
//!
//! Every executor runs one daemon thread for the lifetime of its context.
//! The daemon is the only reader of the remote channel endpoint and the only
//! writer of its send side (remote-load streams and count replies). It
//! polls, dispatches, and repeats; every request it handles targets an
//! address this executor authors.
//!
//! Termination is cooperative. When the context signals shutdown, the
//! daemon broadcasts [`DaemonOp::DmnEnd`] to every peer on the *local*
//! channel — per-stream FIFO orders the sentinel behind the application's
//! in-flight requests — then keeps draining remote requests until the same
//! sentinel has arrived from every peer.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread;

use gam_proto::messages::{DaemonMsg, DaemonOp};
use gam_proto::pointer::GlobalPointer;

use crate::backend;
use crate::context::ContextInner;

pub(crate) fn run(ctx: Arc<ContextInner>) {
	let mut live_peers = ctx.cardinality() - 1;

	if live_peers > 0 {
		tracing::debug!(rank = ctx.rank(), "daemon serving remote requests");
		while !ctx.termination.load(Ordering::Acquire) {
			poll_once(&ctx, &mut live_peers);
		}
	}

	tracing::debug!(rank = ctx.rank(), "daemon broadcasting termination");
	let end = DaemonMsg::new(DaemonOp::DmnEnd, ctx.rank(), GlobalPointer::default());
	if let Err(error) = ctx.local.broadcast(&end) {
		tracing::error!(%error, "daemon termination broadcast failed");
	}

	while live_peers > 0 {
		poll_once(&ctx, &mut live_peers);
	}
	tracing::debug!(rank = ctx.rank(), "daemon done");
}

fn poll_once(ctx: &ContextInner, live_peers: &mut u32) {
	match ctx.remote.try_recv_any() {
		Ok(Some((msg, _))) => handle(ctx, msg, live_peers),
		Ok(None) => thread::yield_now(),
		Err(error) => {
			tracing::error!(%error, "daemon receive failed");
			thread::yield_now();
		}
	}
}

fn handle(ctx: &ContextInner, msg: DaemonMsg, live_peers: &mut u32) {
	let a = msg.p.raw();
	match msg.op {
		DaemonOp::RcInc => {
			tracing::trace!(addr = a, from = msg.from, "daemon: rc +1");
			debug_assert_eq!(ctx.view.author(a), ctx.rank());
			ctx.mc.rc_inc(a);
		}
		DaemonOp::RcDec => {
			tracing::trace!(addr = a, from = msg.from, "daemon: rc -1");
			debug_assert_eq!(ctx.view.author(a), ctx.rank());
			if ctx.mc.rc_dec(a) == 0 {
				ctx.unmap(a);
			}
		}
		DaemonOp::RcGet => {
			tracing::trace!(addr = a, from = msg.from, "daemon: rc get");
			debug_assert_eq!(ctx.view.author(a), ctx.rank());
			let count = ctx.mc.rc_get(a);
			if let Err(error) = ctx.remote.raw_send(&count.to_le_bytes(), msg.from) {
				tracing::error!(%error, addr = a, "daemon: count reply failed");
			}
		}
		DaemonOp::PvtReset => {
			tracing::trace!(addr = a, from = msg.from, "daemon: private reset");
			debug_assert_eq!(ctx.view.author(a), ctx.rank());
			ctx.unmap(a);
		}
		DaemonOp::Rload => {
			tracing::trace!(addr = a, from = msg.from, size = msg.size, "daemon: remote load");
			debug_assert_eq!(ctx.view.author(a), ctx.rank());
			// Snapshot the regions under the view lock, stream without it.
			let Some(bytes) = ctx.view.with_committed(a, backend::marshalled_bytes) else {
				tracing::error!(addr = a, from = msg.from, "daemon: remote load with no committed object");
				return;
			};
			if let Err(error) = ctx.remote.raw_send(&bytes, msg.from) {
				tracing::error!(%error, addr = a, "daemon: remote load stream failed");
			}
		}
		DaemonOp::DmnEnd => {
			tracing::trace!(from = msg.from, "daemon: termination sentinel");
			*live_peers = live_peers.saturating_sub(1);
		}
	}
}
