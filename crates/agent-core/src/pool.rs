//! Bounded pools of reusable handles on top of `deadpool`.
//!
//! Entries are created lazily on checkout, up to `size` live at once. A checkout
//! waits at most `timeout` for a free slot. Dropping a [`Pooled`] guard puts the
//! entry back, whatever the outcome of the work it was used for.

use crate::{Connection, ConnectionFactory, Error, EventSink, Result, SinkFactory};
use async_trait::async_trait;
use deadpool::managed::{self, Metrics, PoolError, RecycleResult};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Checked-out entry; returns to its pool on drop
pub type Pooled<M> = managed::Object<M>;

/// A pool manager that can also close its entries at shutdown
#[async_trait]
pub trait Teardown: managed::Manager<Error = Error> {
    async fn close(&self, item: Self::Type) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    pub size: usize,
    pub timeout: Duration,
}

impl PoolConfig {
    pub fn new(size: usize, timeout: Duration) -> Self {
        Self { size, timeout }
    }
}

pub struct Pool<M: Teardown> {
    name: Arc<str>,
    timeout: Duration,
    inner: managed::Pool<M>,
}

impl<M: Teardown> Clone for Pool<M> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            timeout: self.timeout,
            inner: self.inner.clone(),
        }
    }
}

impl<M: Teardown> Pool<M> {
    pub fn new(name: &str, manager: M, config: PoolConfig) -> Result<Self> {
        let inner = managed::Pool::builder(manager)
            .max_size(config.size.max(1))
            .wait_timeout(Some(config.timeout))
            .runtime(deadpool::Runtime::Tokio1)
            .build()
            .map_err(|e| Error::Configuration(format!("Failed to build {} pool: {}", name, e)))?;

        Ok(Self {
            name: name.into(),
            timeout: config.timeout,
            inner,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Check an entry out, reusing an idle one or creating a new one.
    pub async fn get(&self) -> Result<Pooled<M>> {
        self.inner.get().await.map_err(|e| match e {
            // A failed create frees its slot again
            PoolError::Backend(e) => e,
            PoolError::Timeout(_) => Error::PoolTimeout {
                pool: self.name.to_string(),
                timeout: self.timeout,
            },
            PoolError::Closed => Error::PoolClosed(self.name.to_string()),
            other => Error::Connection(format!("[{}] pool checkout failed: {}", self.name, other)),
        })
    }

    /// Number of entries currently waiting for reuse
    pub fn idle_count(&self) -> usize {
        self.inner.status().available
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Stop handing out entries, then close every idle one.
    ///
    /// Close failures are logged and dropped; teardown is best effort. Entries
    /// still checked out are dropped without closing when they come back.
    /// Returns how many entries were closed.
    pub async fn shutdown(&self) -> usize {
        let drained = self.inner.retain(|_, _| false).removed;
        self.inner.close();

        let count = drained.len();
        for item in drained {
            if let Err(e) = self.inner.manager().close(item).await {
                debug!("[{}] ignoring close error: {}", self.name, e);
            }
        }

        debug!("[{}] pool shut down, {} entries closed", self.name, count);
        count
    }
}

/// Opens source connections for one prefix
pub struct ConnectionManager<C: Connection> {
    factory: Arc<dyn ConnectionFactory<Connection = C>>,
    resource_uri_prefix: String,
    connection_info: Option<Value>,
}

impl<C: Connection> ConnectionManager<C> {
    pub fn new(
        factory: Arc<dyn ConnectionFactory<Connection = C>>,
        resource_uri_prefix: impl Into<String>,
        connection_info: Option<Value>,
    ) -> Self {
        Self {
            factory,
            resource_uri_prefix: resource_uri_prefix.into(),
            connection_info,
        }
    }
}

impl<C: Connection> managed::Manager for ConnectionManager<C> {
    type Type = C;
    type Error = Error;

    async fn create(&self) -> Result<C> {
        let info = self.connection_info.as_ref().ok_or_else(|| {
            Error::Configuration(format!(
                "no connection_info for '{}'",
                self.resource_uri_prefix
            ))
        })?;
        self.factory.connect(info).await
    }

    async fn recycle(&self, _connection: &mut C, _metrics: &Metrics) -> RecycleResult<Error> {
        Ok(())
    }
}

#[async_trait]
impl<C: Connection> Teardown for ConnectionManager<C> {
    async fn close(&self, mut item: C) -> Result<()> {
        item.close().await
    }
}

/// Opens sink clients
pub struct SinkManager {
    factory: Arc<dyn SinkFactory>,
}

impl SinkManager {
    pub fn new(factory: Arc<dyn SinkFactory>) -> Self {
        Self { factory }
    }
}

impl managed::Manager for SinkManager {
    type Type = Box<dyn EventSink>;
    type Error = Error;

    async fn create(&self) -> Result<Self::Type> {
        self.factory.create().await
    }

    async fn recycle(&self, _sink: &mut Self::Type, _metrics: &Metrics) -> RecycleResult<Error> {
        Ok(())
    }
}

#[async_trait]
impl Teardown for SinkManager {
    async fn close(&self, mut item: Self::Type) -> Result<()> {
        item.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counters {
        created: AtomicUsize,
        closed: AtomicUsize,
    }

    #[derive(Default)]
    struct Counting {
        counters: Arc<Counters>,
        fail_close: bool,
        fail_create: bool,
    }

    impl managed::Manager for Counting {
        type Type = usize;
        type Error = Error;

        async fn create(&self) -> Result<usize> {
            if self.fail_create {
                return Err(Error::Connection("refused".into()));
            }
            Ok(self.counters.created.fetch_add(1, Ordering::SeqCst))
        }

        async fn recycle(&self, _item: &mut usize, _metrics: &Metrics) -> RecycleResult<Error> {
            Ok(())
        }
    }

    #[async_trait]
    impl Teardown for Counting {
        async fn close(&self, _item: usize) -> Result<()> {
            self.counters.closed.fetch_add(1, Ordering::SeqCst);
            if self.fail_close {
                return Err(Error::Connection("already broken".into()));
            }
            Ok(())
        }
    }

    fn pool(manager: Counting, size: usize, timeout_ms: u64) -> Pool<Counting> {
        Pool::new(
            "test",
            manager,
            PoolConfig::new(size, Duration::from_millis(timeout_ms)),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_creates_lazily_and_reuses() {
        let manager = Counting::default();
        let counters = manager.counters.clone();
        let pool = pool(manager, 4, 100);
        assert_eq!(counters.created.load(Ordering::SeqCst), 0);

        {
            let first = pool.get().await.unwrap();
            assert_eq!(*first, 0);
        }
        assert_eq!(pool.idle_count(), 1);

        let again = pool.get().await.unwrap();
        assert_eq!(*again, 0);
        assert_eq!(counters.created.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_never_exceeds_size() {
        let manager = Counting::default();
        let counters = manager.counters.clone();
        let pool = pool(manager, 2, 50);

        let a = pool.get().await.unwrap();
        let b = pool.get().await.unwrap();
        assert_ne!(*a, *b);

        match pool.get().await {
            Err(Error::PoolTimeout { pool, .. }) => assert_eq!(pool, "test"),
            Err(e) => panic!("unexpected error: {}", e),
            Ok(_) => panic!("pool handed out more entries than its size"),
        }
        assert_eq!(counters.created.load(Ordering::SeqCst), 2);

        drop(a);
        assert!(pool.get().await.is_ok());
        drop(b);
    }

    #[tokio::test]
    async fn test_zero_timeout_fails_fast_when_exhausted() {
        let pool = pool(Counting::default(), 1, 0);

        let _held = pool.get().await.unwrap();
        assert!(matches!(pool.get().await, Err(Error::PoolTimeout { .. })));
    }

    #[tokio::test]
    async fn test_waiter_gets_released_entry() {
        let manager = Counting::default();
        let counters = manager.counters.clone();
        let pool = pool(manager, 1, 1_000);

        let held = pool.get().await.unwrap();
        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.get().await.map(|entry| *entry) })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(held);

        assert_eq!(waiter.await.unwrap().unwrap(), 0);
        assert_eq!(counters.created.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_create_frees_slot() {
        let pool = pool(
            Counting {
                fail_create: true,
                ..Default::default()
            },
            1,
            50,
        );

        assert!(matches!(pool.get().await, Err(Error::Connection(_))));
        // Slot is free again, so this fails on create rather than timing out
        assert!(matches!(pool.get().await, Err(Error::Connection(_))));
    }

    #[tokio::test]
    async fn test_shutdown_closes_idle_and_swallows_errors() {
        let manager = Counting {
            fail_close: true,
            ..Default::default()
        };
        let counters = manager.counters.clone();
        let pool = pool(manager, 3, 50);

        let a = pool.get().await.unwrap();
        let b = pool.get().await.unwrap();
        drop(a);
        drop(b);

        assert_eq!(pool.shutdown().await, 2);
        assert_eq!(counters.closed.load(Ordering::SeqCst), 2);
        assert!(pool.is_closed());
        assert!(matches!(pool.get().await, Err(Error::PoolClosed(_))));
    }

    #[tokio::test]
    async fn test_entry_returned_after_shutdown_is_not_reused() {
        let manager = Counting::default();
        let counters = manager.counters.clone();
        let pool = pool(manager, 2, 50);

        let late = pool.get().await.unwrap();
        assert_eq!(pool.shutdown().await, 0);
        drop(late);

        assert_eq!(pool.idle_count(), 0);
        assert_eq!(counters.closed.load(Ordering::SeqCst), 0);
    }
}
