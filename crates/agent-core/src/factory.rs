use crate::{Connection, EventSink, Monitor, Resource, Result};
use async_trait::async_trait;
use serde_json::Value;

/// Factory trait for creating source connections
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    type Connection: Connection;

    /// Get the name/type identifier for this source kind
    fn name(&self) -> &str;

    /// Open a new connection from the `connection_info` entry of a prefix
    async fn connect(&self, connection_info: &Value) -> Result<Self::Connection>;
}

/// Factory trait for creating monitors over a connection type
pub trait MonitorFactory<C>: Send + Sync {
    /// Build the monitor for one resource turn
    fn create(&self, resource: &Resource) -> Result<Box<dyn Monitor<C>>>;
}

/// Factory trait for creating sink clients
#[async_trait]
pub trait SinkFactory: Send + Sync {
    /// Get the name/type identifier for this sink
    fn name(&self) -> &str;

    /// Open a new client; called lazily by the sink pool
    async fn create(&self) -> Result<Box<dyn EventSink>>;
}
