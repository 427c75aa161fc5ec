use crate::{Resource, Result};
use async_trait::async_trait;

/// Discovers the resources to poll under a prefix
#[async_trait]
pub trait ResourceLister: Send + Sync {
    /// `Ok(None)` and `Ok(Some(vec![]))` both mean there is nothing to do
    async fn list_aggregated_resources(
        &self,
        resource_uri_prefix: &str,
    ) -> Result<Option<Vec<Resource>>>;
}
