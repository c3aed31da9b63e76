//! Bootstrap configuration.
//!
//! Every executor reads the same description of the group before
//! constructing its [`Context`](crate::Context): its own rank, the group
//! cardinality, and the host plus three service ports of every member. The
//! canonical source is the process environment ([`Config::from_env`]); tests
//! and embedders may build a [`Config`] directly.

use std::env;
use std::path::PathBuf;

use gam_proto::pointer::{ExecutorId, GlobalPointer};

use crate::error::ConfigError;

/// Network location of one executor: a host plus the service identifiers of
/// its three channels.
#[derive(Debug, Clone)]
pub struct NodeAddr {
	/// Hostname or IP address.
	pub host: String,
	/// Service for the capability-passing channel.
	pub svc_pap: String,
	/// Service for the local channel (daemon requests leave through here on
	/// the peer side; replies come back to it).
	pub svc_local: String,
	/// Service for the remote channel (the daemon's receive endpoint).
	pub svc_remote: String,
}

impl NodeAddr {
	pub(crate) fn pap_addr(&self) -> String {
		format!("{}:{}", self.host, self.svc_pap)
	}

	pub(crate) fn local_addr(&self) -> String {
		format!("{}:{}", self.host, self.svc_local)
	}

	pub(crate) fn remote_addr(&self) -> String {
		format!("{}:{}", self.host, self.svc_remote)
	}
}

/// Everything a [`Context`](crate::Context) needs to join its group.
#[derive(Debug, Clone)]
pub struct Config {
	/// This executor's rank, in `[0, cardinality)`.
	pub rank: ExecutorId,
	/// Total number of executors; identical across the group.
	pub cardinality: ExecutorId,
	/// Addresses of every executor, indexed by rank.
	pub nodes: Vec<NodeAddr>,
	/// Directory for per-rank log files; `None` disables file logging.
	pub log_prefix: Option<PathBuf>,
}

impl Config {
	/// Reads the configuration from the process environment.
	///
	/// Expects `GAM_RANK`, `GAM_CARDINALITY` and, for every rank `i`,
	/// `GAM_NODE_i`, `GAM_SVC_PAP_i`, `GAM_SVC_MEM_i` and `GAM_SVC_DMN_i`.
	/// `GAM_LOG_PREFIX` is optional. Missing or malformed values are fatal.
	pub fn from_env() -> Result<Self, ConfigError> {
		Self::from_lookup(|name| env::var(name).ok())
	}

	/// Reads the configuration through an arbitrary variable lookup.
	pub fn from_lookup(
		lookup: impl Fn(&str) -> Option<String>,
	) -> Result<Self, ConfigError> {
		let rank = parse_u64(&lookup, "GAM_RANK")?;
		let cardinality = parse_u64(&lookup, "GAM_CARDINALITY")?;

		if cardinality == 0 {
			return Err(ConfigError::EmptyGroup);
		}
		if cardinality - 1 > u64::from(GlobalPointer::MAX_HOME) {
			return Err(ConfigError::CardinalityOverflow(cardinality));
		}
		if rank >= cardinality {
			return Err(ConfigError::RankOutOfRange { rank, cardinality });
		}

		let mut nodes = Vec::with_capacity(cardinality as usize);
		for i in 0..cardinality {
			nodes.push(NodeAddr {
				host: require(&lookup, &format!("GAM_NODE_{i}"))?,
				svc_pap: require(&lookup, &format!("GAM_SVC_PAP_{i}"))?,
				svc_local: require(&lookup, &format!("GAM_SVC_MEM_{i}"))?,
				svc_remote: require(&lookup, &format!("GAM_SVC_DMN_{i}"))?,
			});
		}

		Ok(Config {
			rank: rank as ExecutorId,
			cardinality: cardinality as ExecutorId,
			nodes,
			log_prefix: lookup("GAM_LOG_PREFIX").map(PathBuf::from),
		})
	}
}

fn require(
	lookup: &impl Fn(&str) -> Option<String>,
	name: &str,
) -> Result<String, ConfigError> {
	lookup(name).ok_or_else(|| ConfigError::MissingVar(name.to_string()))
}

fn parse_u64(
	lookup: &impl Fn(&str) -> Option<String>,
	name: &str,
) -> Result<u64, ConfigError> {
	let value = require(lookup, name)?;
	value.trim().parse().map_err(|_| ConfigError::InvalidVar {
		name: name.to_string(),
		value,
	})
}

#[cfg(test)]
mod tests {
	use std::collections::HashMap;

	use super::*;

	fn env_for(n: u32, rank: u32) -> HashMap<String, String> {
		let mut vars = HashMap::new();
		vars.insert("GAM_RANK".into(), rank.to_string());
		vars.insert("GAM_CARDINALITY".into(), n.to_string());
		for i in 0..n {
			vars.insert(format!("GAM_NODE_{i}"), "127.0.0.1".into());
			vars.insert(format!("GAM_SVC_PAP_{i}"), format!("71{i}0"));
			vars.insert(format!("GAM_SVC_MEM_{i}"), format!("71{i}1"));
			vars.insert(format!("GAM_SVC_DMN_{i}"), format!("71{i}2"));
		}
		vars
	}

	fn parse(vars: &HashMap<String, String>) -> Result<Config, ConfigError> {
		Config::from_lookup(|name| vars.get(name).cloned())
	}

	#[test]
	fn parses_a_full_group() {
		let cfg = parse(&env_for(3, 1)).unwrap();
		assert_eq!(cfg.rank, 1);
		assert_eq!(cfg.cardinality, 3);
		assert_eq!(cfg.nodes.len(), 3);
		assert_eq!(cfg.nodes[2].pap_addr(), "127.0.0.1:7120");
		assert_eq!(cfg.nodes[2].local_addr(), "127.0.0.1:7121");
		assert_eq!(cfg.nodes[2].remote_addr(), "127.0.0.1:7122");
		assert!(cfg.log_prefix.is_none());
	}

	#[test]
	fn log_prefix_is_optional() {
		let mut vars = env_for(1, 0);
		vars.insert("GAM_LOG_PREFIX".into(), "/tmp/logs".into());
		let cfg = parse(&vars).unwrap();
		assert_eq!(cfg.log_prefix, Some(PathBuf::from("/tmp/logs")));
	}

	#[test]
	fn missing_node_is_fatal() {
		let mut vars = env_for(2, 0);
		vars.remove("GAM_NODE_1");
		assert!(matches!(
			parse(&vars),
			Err(ConfigError::MissingVar(name)) if name == "GAM_NODE_1"
		));
	}

	#[test]
	fn malformed_rank_is_fatal() {
		let mut vars = env_for(2, 0);
		vars.insert("GAM_RANK".into(), "zero".into());
		assert!(matches!(parse(&vars), Err(ConfigError::InvalidVar { .. })));
	}

	#[test]
	fn rank_must_fall_inside_the_group() {
		let mut vars = env_for(2, 0);
		vars.insert("GAM_RANK".into(), "2".into());
		assert!(matches!(
			parse(&vars),
			Err(ConfigError::RankOutOfRange { rank: 2, cardinality: 2 })
		));
	}

	#[test]
	fn empty_group_is_fatal() {
		let mut vars = env_for(1, 0);
		vars.insert("GAM_CARDINALITY".into(), "0".into());
		assert!(matches!(parse(&vars), Err(ConfigError::EmptyGroup)));
	}

	#[test]
	fn oversized_group_is_fatal() {
		let mut vars = env_for(1, 0);
		vars.insert("GAM_CARDINALITY".into(), (1u64 << 40).to_string());
		assert!(matches!(
			parse(&vars),
			Err(ConfigError::CardinalityOverflow(_))
		));
	}
}
