use crate::{Event, Result};
use async_trait::async_trait;

/// Downstream collector for event batches
#[async_trait]
pub trait EventSink: Send {
    /// Forward one batch of events
    async fn send_messages(&mut self, events: &[Event]) -> Result<()>;

    /// Close the client; errors are ignored by the pool
    async fn close(&mut self) -> Result<()>;
}
