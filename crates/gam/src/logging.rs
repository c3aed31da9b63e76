//! Optional per-rank log files.
//!
//! When the configuration carries a log prefix, the runtime writes its
//! `tracing` output to `gam.<rank>.log` under that directory. Without a
//! prefix the library installs no subscriber, leaving the choice to the
//! embedding process.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use gam_proto::pointer::ExecutorId;

pub(crate) fn init(prefix: &Path, rank: ExecutorId) {
	let path = prefix.join(format!("gam.{rank}.log"));
	let file = match fs::File::create(&path) {
		Ok(file) => file,
		Err(error) => {
			eprintln!("> could not open log file {}: {error}", path.display());
			return;
		}
	};

	let subscriber = tracing_subscriber::fmt()
		.with_ansi(false)
		.with_max_level(tracing::Level::TRACE)
		.with_writer(Arc::new(file))
		.finish();

	// Another subscriber may already be installed (several contexts in one
	// process, or the embedder's own); first one wins.
	let _ = tracing::subscriber::set_global_default(subscriber);
}
