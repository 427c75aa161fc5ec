use crate::{connect, NatsConfig, NatsSink};
use agent_core::{EventSink, Result, SinkFactory};
use async_trait::async_trait;
use serde_json::Value;

pub struct NatsSinkFactory {
    config: NatsConfig,
}

impl NatsSinkFactory {
    pub fn new(config: NatsConfig) -> Self {
        Self { config }
    }

    pub fn from_value(config: Value) -> Result<Self> {
        Ok(Self::new(serde_json::from_value(config)?))
    }
}

#[async_trait]
impl SinkFactory for NatsSinkFactory {
    fn name(&self) -> &str {
        "nats"
    }

    // Every sink client gets its own connection
    async fn create(&self) -> Result<Box<dyn EventSink>> {
        let client = connect(&self.config).await?;
        Ok(Box::new(NatsSink::new(client, self.config.subject.clone())))
    }
}
