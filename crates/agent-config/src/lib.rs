use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

// Re-export processor settings from agent-core
pub use agent_core::{ParallelType, ProcessorConfig};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub agent: AgentConfig,

    /// Sources keyed by name
    #[serde(default)]
    pub sources: BTreeMap<String, SourceConfig>,

    /// Settings handed to the event transport (sink and resource lister)
    #[serde(default)]
    pub transport: Value,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Seconds between polling rounds
    #[serde(default = "default_interval")]
    pub interval: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Registered source kind (e.g., "redis")
    pub kind: String,

    /// Registered sink (e.g., "nats")
    #[serde(default = "default_sink")]
    pub sink: String,

    #[serde(flatten)]
    pub processor: ProcessorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_level")]
    pub level: String,

    /// JSON formatted logs
    #[serde(default)]
    pub json: bool,
}

fn default_interval() -> u64 {
    60
}

fn default_sink() -> String {
    "nats".to_string()
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            interval: default_interval(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            json: false,
        }
    }
}

impl AgentConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval)
    }
}

impl AppConfig {
    pub fn load(config_dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        let config_dir = config_dir.as_ref();
        let s = config::Config::builder()
            // Start with defaults
            .add_source(config::Config::try_from(&Self::default())?)
            .add_source(
                config::File::with_name(&config_dir.join("default.yaml").to_string_lossy())
                    .required(false),
            )
            // Machine-local overrides
            .add_source(
                config::File::with_name(&config_dir.join("local.yaml").to_string_lossy())
                    .required(false),
            )
            // Add environment variables (AGENT_AGENT__INTERVAL=30)
            .add_source(
                config::Environment::with_prefix("AGENT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = s.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check every source's settings
    pub fn validate(&self) -> anyhow::Result<()> {
        for (name, source) in &self.sources {
            source
                .processor
                .validate()
                .with_context(|| format!("source '{}'", name))?;
        }
        Ok(())
    }
}
