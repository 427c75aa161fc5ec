use crate::Result;
use async_trait::async_trait;

/// Stateful handle to the system backing a source.
///
/// Checked out of the connection pool for exactly one resource turn at a time.
#[async_trait]
pub trait Connection: Send + 'static {
    /// Close the underlying handle.
    ///
    /// May be called on a connection that is already broken; the pool ignores
    /// whatever this returns.
    async fn close(&mut self) -> Result<()>;
}
