use crate::{connect, NatsConfig};
use agent_core::{Error, Resource, ResourceLister, Result};
use async_nats::Client;
use async_trait::async_trait;
use serde_json::json;
use tokio::sync::OnceCell;
use tracing::debug;

/// Asks the control plane for the aggregated resources of a prefix.
///
/// The reply is a JSON array of resources, or `null` when the prefix is unknown.
pub struct NatsResourceLister {
    config: NatsConfig,
    client: OnceCell<Client>,
}

impl NatsResourceLister {
    pub fn new(config: NatsConfig) -> Self {
        Self {
            config,
            client: OnceCell::new(),
        }
    }

    async fn client(&self) -> Result<&Client> {
        self.client.get_or_try_init(|| connect(&self.config)).await
    }
}

#[async_trait]
impl ResourceLister for NatsResourceLister {
    async fn list_aggregated_resources(
        &self,
        resource_uri_prefix: &str,
    ) -> Result<Option<Vec<Resource>>> {
        let client = self
            .client()
            .await
            .map_err(|e| Error::Listing(e.to_string()))?;
        let request = serde_json::to_vec(&json!({ "resource_uri_prefix": resource_uri_prefix }))?;

        let reply = client
            .request(self.config.resources_subject.clone(), request.into())
            .await
            .map_err(|e| Error::Listing(format!("Resource request failed: {}", e)))?;

        let resources = decode_resources(&reply.payload)?;
        debug!(
            "Listed {} resources for '{}'",
            resources.as_ref().map_or(0, Vec::len),
            resource_uri_prefix
        );
        Ok(resources)
    }
}

fn decode_resources(payload: &[u8]) -> Result<Option<Vec<Resource>>> {
    serde_json::from_slice(payload)
        .map_err(|e| Error::Listing(format!("Invalid resource list: {}", e)))
}
