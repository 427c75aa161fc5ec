use crate::pool::{ConnectionManager, Pool, SinkManager};
use crate::strategy::{strategy_for, Turn};
use crate::{
    Connection, ConnectionFactory, Delivery, Error, Event, MonitorFactory, NeverStop,
    ProcessorConfig, Resource, ResourceLister, Result, SinkFactory, SourceId, StopSignal,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, error, info};

/// A processor run as seen by the polling worker
#[async_trait]
pub trait Process: Send + Sync {
    fn source(&self) -> &SourceId;

    /// Process every listed resource, returning how many succeeded
    async fn process(&self) -> Result<usize>;

    /// Number of listed resources
    async fn total_count(&self) -> Result<usize>;
}

/// Polls every resource under one prefix and forwards what the monitors find.
///
/// The resource list is fetched once per processor and shared by `process` and
/// `total_count`, so build a new processor for every polling round.
pub struct Processor<C: Connection> {
    source: SourceId,
    config: ProcessorConfig,
    connections: Arc<dyn ConnectionFactory<Connection = C>>,
    monitors: Arc<dyn MonitorFactory<C>>,
    sinks: Arc<dyn SinkFactory>,
    lister: Arc<dyn ResourceLister>,
    stop: Arc<dyn StopSignal>,
    resources: OnceCell<Arc<Vec<Resource>>>,
    teardowns: AtomicUsize,
}

struct RunPools<C: Connection> {
    connections: Pool<ConnectionManager<C>>,
    sinks: Pool<SinkManager>,
}

impl<C: Connection> Processor<C> {
    pub fn new(
        source: SourceId,
        config: ProcessorConfig,
        connections: Arc<dyn ConnectionFactory<Connection = C>>,
        monitors: Arc<dyn MonitorFactory<C>>,
        sinks: Arc<dyn SinkFactory>,
        lister: Arc<dyn ResourceLister>,
    ) -> Self {
        Self {
            source,
            config,
            connections,
            monitors,
            sinks,
            lister,
            stop: Arc::new(NeverStop),
            resources: OnceCell::new(),
            teardowns: AtomicUsize::new(0),
        }
    }

    pub fn with_stop_signal(mut self, stop: Arc<dyn StopSignal>) -> Self {
        self.stop = stop;
        self
    }

    pub fn source(&self) -> &SourceId {
        &self.source
    }

    /// Run once over the listed resources.
    ///
    /// Per-resource failures are logged and counted. Going over
    /// `max_consecutive_errors` in a row, a listing failure or a crashed worker
    /// ends the run with an error. Both pools are shut down on every path.
    pub async fn process(&self) -> Result<usize> {
        let pools = self.before_process()?;
        let outcome = self.run(&pools).await;
        self.after_process(pools).await;
        outcome
    }

    pub async fn total_count(&self) -> Result<usize> {
        Ok(self.resources().await?.len())
    }

    /// How many runs have shut their pools down so far
    pub fn teardown_count(&self) -> usize {
        self.teardowns.load(Ordering::SeqCst)
    }

    fn before_process(&self) -> Result<RunPools<C>> {
        let prefix = &self.source.resource_uri_prefix;
        let manager = ConnectionManager::new(
            self.connections.clone(),
            prefix.clone(),
            self.config.connection_info_for(prefix).cloned(),
        );
        Ok(RunPools {
            connections: Pool::new("connection", manager, self.config.connection_pool())?,
            sinks: Pool::new(
                "sink",
                SinkManager::new(self.sinks.clone()),
                self.config.sink_pool(),
            )?,
        })
    }

    async fn after_process(&self, pools: RunPools<C>) {
        let connections = pools.connections.shutdown().await;
        let sinks = pools.sinks.shutdown().await;
        self.teardowns.fetch_add(1, Ordering::SeqCst);
        debug!(
            "[{}] closed {} connections and {} sink clients",
            self.source.name, connections, sinks
        );
    }

    async fn run(&self, pools: &RunPools<C>) -> Result<usize> {
        let resources = self.resources().await?;
        let strategy = strategy_for(
            self.config.parallel_type,
            self.config.parallel_size,
            self.config.max_consecutive_errors,
        );
        let turn = Arc::new(ResourceTurn {
            source: self.source.name.clone(),
            connections: pools.connections.clone(),
            sinks: pools.sinks.clone(),
            monitors: self.monitors.clone(),
        });

        match strategy
            .run_each(resources.to_vec(), turn, self.stop.clone())
            .await
        {
            Ok(state) => Ok(state.success_count),
            Err(e) => {
                error!(
                    "[{}] aborting {}: {}",
                    self.source.name, self.source.resource_uri_prefix, e
                );
                Err(e)
            }
        }
    }

    async fn resources(&self) -> Result<Arc<Vec<Resource>>> {
        let resources = self
            .resources
            .get_or_try_init(|| async {
                let prefix = &self.source.resource_uri_prefix;
                let listed = self
                    .lister
                    .list_aggregated_resources(prefix)
                    .await
                    .map_err(|e| match e {
                        Error::Listing(_) => e,
                        other => Error::Listing(other.to_string()),
                    })?
                    .unwrap_or_default();
                debug!(
                    "[{}] resource_uri_prefix:{} resources.size:{}",
                    self.source.name,
                    prefix,
                    listed.len()
                );
                Ok::<_, Error>(Arc::new(listed))
            })
            .await?;
        Ok(resources.clone())
    }
}

#[async_trait]
impl<C: Connection> Process for Processor<C> {
    fn source(&self) -> &SourceId {
        &self.source
    }

    async fn process(&self) -> Result<usize> {
        Processor::process(self).await
    }

    async fn total_count(&self) -> Result<usize> {
        Processor::total_count(self).await
    }
}

/// One resource: connection checkout, monitor, forward
struct ResourceTurn<C: Connection> {
    source: String,
    connections: Pool<ConnectionManager<C>>,
    sinks: Pool<SinkManager>,
    monitors: Arc<dyn MonitorFactory<C>>,
}

impl<C: Connection> ResourceTurn<C> {
    async fn attempt(&self, resource: &Resource, delivery: &mut PooledDelivery) -> Result<()> {
        let mut connection = self.connections.get().await?;
        let mut monitor = self.monitors.create(resource)?;
        monitor.process(&mut *connection, delivery).await
    }
}

#[async_trait]
impl<C: Connection> Turn for ResourceTurn<C> {
    async fn run(&self, resource: Resource) -> Result<()> {
        let mut delivery = PooledDelivery {
            source: self.source.clone(),
            sinks: self.sinks.clone(),
            events: None,
        };

        let outcome = self.attempt(&resource, &mut delivery).await;
        if let Err(e) = &outcome {
            error!("[{}] {}: {}", self.source, resource.uri, e);
            // Only present when the monitor got as far as producing a batch
            if let Some(events) = &delivery.events {
                info!("[{}] failed_events:{}", self.source, batch_json(events));
            }
        }
        outcome
    }
}

/// Forwards a monitor's batch through a sink client checked out for the occasion
struct PooledDelivery {
    source: String,
    sinks: Pool<SinkManager>,
    events: Option<Vec<Event>>,
}

#[async_trait]
impl Delivery for PooledDelivery {
    async fn deliver(&mut self, events: Vec<Event>) -> Result<()> {
        if self.events.is_some() {
            return Err(Error::Monitor(
                "batch already delivered for this resource".to_string(),
            ));
        }
        info!("[{}] send_messages:{}", self.source, batch_json(&events));
        let events = self.events.insert(events);
        let mut sink = self.sinks.get().await?;
        sink.send_messages(events.as_slice()).await
    }
}

fn batch_json(events: &[Event]) -> String {
    serde_json::to_string(events).unwrap_or_else(|e| format!("<unserializable: {}>", e))
}
