use crate::{RedisConnection, RedisConnectionInfo, RedisStreamMonitor};
use agent_core::{ConnectionFactory, Monitor, MonitorFactory, Resource, Result};
use async_trait::async_trait;
use serde_json::Value;

pub struct RedisConnectionFactory;

#[async_trait]
impl ConnectionFactory for RedisConnectionFactory {
    type Connection = RedisConnection;

    fn name(&self) -> &str {
        "redis"
    }

    async fn connect(&self, connection_info: &Value) -> Result<RedisConnection> {
        let info: RedisConnectionInfo = serde_json::from_value(connection_info.clone())?;
        RedisConnection::open(info).await
    }
}

pub struct RedisStreamMonitorFactory;

impl MonitorFactory<RedisConnection> for RedisStreamMonitorFactory {
    fn create(&self, resource: &Resource) -> Result<Box<dyn Monitor<RedisConnection>>> {
        Ok(Box::new(RedisStreamMonitor::new(resource.clone())?))
    }
}
