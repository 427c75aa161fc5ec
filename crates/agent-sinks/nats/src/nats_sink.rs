use agent_core::{Error, Event, EventSink, Result};
use async_nats::Client;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NatsConfig {
    /// NATS server URL(s)
    #[serde(default = "default_servers")]
    pub servers: Vec<String>,

    /// Subject event batches are published to
    #[serde(default = "default_subject")]
    pub subject: String,

    /// Subject answering resource list requests
    #[serde(default = "default_resources_subject")]
    pub resources_subject: String,

    /// Seconds to wait for a request reply
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,

    /// Optional username for authentication
    #[serde(default)]
    pub username: Option<String>,

    /// Optional password for authentication
    #[serde(default)]
    pub password: Option<String>,

    /// Optional token for authentication
    #[serde(default)]
    pub token: Option<String>,
}

fn default_servers() -> Vec<String> {
    vec!["nats://localhost:4222".to_string()]
}

fn default_subject() -> String {
    "agent.messages".to_string()
}

fn default_resources_subject() -> String {
    "agent.resources".to_string()
}

fn default_request_timeout() -> u64 {
    10
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            servers: default_servers(),
            subject: default_subject(),
            resources_subject: default_resources_subject(),
            request_timeout: default_request_timeout(),
            username: None,
            password: None,
            token: None,
        }
    }
}

/// Connect to the first configured server
pub async fn connect(config: &NatsConfig) -> Result<Client> {
    let server = config
        .servers
        .first()
        .ok_or_else(|| Error::Configuration("No NATS server configured".to_string()))?;
    info!("Connecting to NATS server: {}", server);

    // Build connection options with authentication if provided
    let mut opts = async_nats::ConnectOptions::new()
        .request_timeout(Some(Duration::from_secs(config.request_timeout)));

    if let Some(ref username) = config.username {
        if let Some(ref password) = config.password {
            debug!("Using username/password authentication");
            opts = opts.user_and_password(username.clone(), password.clone());
        }
    } else if let Some(ref token) = config.token {
        debug!("Using token authentication");
        opts = opts.token(token.clone());
    }

    opts.connect(server.as_str())
        .await
        .map_err(|e| Error::Connection(format!("Failed to connect to NATS: {}", e)))
}

/// Publishes each batch as one JSON array message
pub struct NatsSink {
    client: Client,
    subject: String,
}

impl NatsSink {
    pub fn new(client: Client, subject: String) -> Self {
        Self { client, subject }
    }
}

#[async_trait]
impl EventSink for NatsSink {
    async fn send_messages(&mut self, events: &[Event]) -> Result<()> {
        let payload = serde_json::to_vec(events)?;

        self.client
            .publish(self.subject.clone(), payload.into())
            .await
            .map_err(|e| Error::Sink(format!("Failed to publish: {}", e)))?;
        self.client
            .flush()
            .await
            .map_err(|e| Error::Sink(format!("Failed to flush: {}", e)))?;

        debug!("Published {} events to '{}'", events.len(), self.subject);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        // Dropping the client closes the connection once outstanding messages are out
        self.client
            .flush()
            .await
            .map_err(|e| Error::Sink(format!("Failed to flush: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_config_defaults() {
        let config: NatsConfig = serde_json::from_value(json!({})).unwrap();

        assert_eq!(config.servers, vec!["nats://localhost:4222"]);
        assert_eq!(config.subject, "agent.messages");
        assert_eq!(config.resources_subject, "agent.resources");
        assert_eq!(config.request_timeout, 10);
        assert!(config.token.is_none());
    }

    #[tokio::test]
    async fn test_connect_requires_a_server() {
        let config = NatsConfig {
            servers: vec![],
            ..Default::default()
        };

        assert!(matches!(
            connect(&config).await,
            Err(Error::Configuration(_))
        ));
    }
}
