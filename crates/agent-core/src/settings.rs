use crate::{Error, PoolConfig, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

/// How the workers of one run are executed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParallelType {
    /// Workers share the run counters behind one lock
    #[default]
    Thread,
    /// Workers share nothing and report outcomes back to a coordinator
    Process,
}

/// Per-source settings consumed by a processor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessorConfig {
    /// Number of resources processed at once
    #[serde(default = "default_parallel_size")]
    pub parallel_size: usize,

    #[serde(default)]
    pub parallel_type: ParallelType,

    /// Defaults to `parallel_size`
    #[serde(default)]
    pub connection_pool_size: Option<usize>,

    /// Seconds to wait for a free connection
    #[serde(default = "default_connection_pool_timeout")]
    pub connection_pool_timeout: u64,

    /// Defaults to the connection pool size
    #[serde(default)]
    pub sink_pool_size: Option<usize>,

    /// Seconds to wait for a free sink client, defaults to `connection_pool_timeout`
    #[serde(default)]
    pub sink_pool_timeout: Option<u64>,

    /// Consecutive failed turns tolerated before the run aborts
    #[serde(default = "default_max_consecutive_errors")]
    pub max_consecutive_errors: usize,

    /// Connection construction data keyed by resource uri prefix
    #[serde(default)]
    pub connection_info: BTreeMap<String, Value>,
}

fn default_parallel_size() -> usize {
    1
}

fn default_connection_pool_timeout() -> u64 {
    60
}

fn default_max_consecutive_errors() -> usize {
    3
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            parallel_size: default_parallel_size(),
            parallel_type: ParallelType::default(),
            connection_pool_size: None,
            connection_pool_timeout: default_connection_pool_timeout(),
            sink_pool_size: None,
            sink_pool_timeout: None,
            max_consecutive_errors: default_max_consecutive_errors(),
            connection_info: BTreeMap::new(),
        }
    }
}

impl ProcessorConfig {
    pub fn connection_pool(&self) -> PoolConfig {
        PoolConfig::new(
            self.connection_pool_size.unwrap_or(self.parallel_size),
            Duration::from_secs(self.connection_pool_timeout),
        )
    }

    pub fn sink_pool(&self) -> PoolConfig {
        let connection = self.connection_pool();
        PoolConfig::new(
            self.sink_pool_size.unwrap_or(connection.size),
            self.sink_pool_timeout
                .map(Duration::from_secs)
                .unwrap_or(connection.timeout),
        )
    }

    pub fn connection_info_for(&self, resource_uri_prefix: &str) -> Option<&Value> {
        self.connection_info.get(resource_uri_prefix)
    }

    /// Configured prefixes, in sorted order
    pub fn resource_uri_prefixes(&self) -> impl Iterator<Item = &str> {
        self.connection_info.keys().map(String::as_str)
    }

    pub fn validate(&self) -> Result<()> {
        if self.parallel_size == 0 {
            return Err(Error::Configuration("parallel_size must be at least 1".into()));
        }
        if self.connection_pool_size == Some(0) {
            return Err(Error::Configuration(
                "connection_pool_size must be at least 1".into(),
            ));
        }
        if self.sink_pool_size == Some(0) {
            return Err(Error::Configuration("sink_pool_size must be at least 1".into()));
        }
        Ok(())
    }
}
