//! In-process executor groups for end-to-end tests.
//!
//! Each test runs one closure per rank, each on its own thread with its own
//! [`Context`], all wired over loopback TCP. Contexts drop when the closures
//! return, which exercises the cooperative termination drain on every test.

use std::net::TcpListener;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use gam::Context;
use gam::config::{Config, NodeAddr};

fn free_port() -> u16 {
	TcpListener::bind("127.0.0.1:0")
		.unwrap()
		.local_addr()
		.unwrap()
		.port()
}

fn node() -> NodeAddr {
	NodeAddr {
		host: "127.0.0.1".into(),
		svc_pap: free_port().to_string(),
		svc_local: free_port().to_string(),
		svc_remote: free_port().to_string(),
	}
}

pub fn configs(n: u32) -> Vec<Config> {
	let nodes: Vec<NodeAddr> = (0..n).map(|_| node()).collect();
	(0..n)
		.map(|rank| Config {
			rank,
			cardinality: n,
			nodes: nodes.clone(),
			log_prefix: None,
		})
		.collect()
}

/// Runs one closure per rank and propagates the first panic.
pub fn run_group(n: u32, body: impl Fn(u32, &Context) + Send + Sync + 'static) {
	let body = Arc::new(body);
	let handles: Vec<_> = configs(n)
		.into_iter()
		.map(|config| {
			let body = body.clone();
			thread::Builder::new()
				.name(format!("executor-{}", config.rank))
				.spawn(move || {
					let rank = config.rank;
					let ctx = Context::new(config).expect("context construction");
					body(rank, &ctx);
				})
				.unwrap()
		})
		.collect();
	for handle in handles {
		if let Err(panic) = handle.join() {
			std::panic::resume_unwind(panic);
		}
	}
}

/// Polls a condition that a peer satisfies asynchronously.
#[allow(dead_code)]
pub fn wait_until(what: &str, cond: impl Fn() -> bool) {
	let deadline = Instant::now() + Duration::from_secs(10);
	while !cond() {
		assert!(Instant::now() < deadline, "timed out waiting for {what}");
		thread::sleep(Duration::from_millis(1));
	}
}
