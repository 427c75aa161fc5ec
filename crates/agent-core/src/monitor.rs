use crate::{Event, Result};
use async_trait::async_trait;

/// Continuation handed to a monitor; receives the batch found for the resource.
///
/// One batch per resource turn: a second `deliver` fails with [`Error::Monitor`]
/// and leaves the first batch as the one reported.
///
/// [`Error::Monitor`]: crate::Error::Monitor
#[async_trait]
pub trait Delivery: Send {
    async fn deliver(&mut self, events: Vec<Event>) -> Result<()>;
}

/// Extracts events from one resource through one connection.
///
/// A monitor is built per resource turn. The connection is only borrowed for the
/// duration of `process`, so it cannot outlive the turn.
#[async_trait]
pub trait Monitor<C>: Send {
    /// Look for events and hand them to `delivery` as one batch.
    ///
    /// Not calling `delivery` at all means nothing changed. Work done after
    /// `deliver` returns (e.g. committing a cursor) only happens once the batch
    /// was forwarded.
    async fn process(&mut self, connection: &mut C, delivery: &mut dyn Delivery) -> Result<()>;
}
