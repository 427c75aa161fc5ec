//! In-memory collaborators for engine tests

use crate::{
    Connection, ConnectionFactory, Delivery, Error, Event, EventSink, Monitor, MonitorFactory,
    Processor, ProcessorConfig, Resource, ResourceLister, Result, SinkFactory, SourceId,
};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const PREFIX: &str = "mock://warehouse";

pub fn uri(index: usize) -> String {
    format!("{}/t{}", PREFIX, index)
}

fn uris(indexes: &[usize]) -> HashSet<String> {
    indexes.iter().map(|i| uri(*i)).collect()
}

pub struct MockConnection {
    pub id: usize,
    closed: Arc<AtomicUsize>,
}

#[async_trait]
impl Connection for MockConnection {
    async fn close(&mut self) -> Result<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Err(Error::Connection("close on a broken socket".into()))
    }
}

#[derive(Default)]
pub struct MockConnections {
    created: AtomicUsize,
    closed: Arc<AtomicUsize>,
    refuse: AtomicBool,
}

impl MockConnections {
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn refuse(&self) {
        self.refuse.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ConnectionFactory for MockConnections {
    type Connection = MockConnection;

    fn name(&self) -> &str {
        "mock"
    }

    async fn connect(&self, connection_info: &Value) -> Result<MockConnection> {
        assert_eq!(connection_info["dsn"], "mock");
        if self.refuse.load(Ordering::SeqCst) {
            return Err(Error::Connection("connection refused".into()));
        }
        Ok(MockConnection {
            id: self.created.fetch_add(1, Ordering::SeqCst),
            closed: self.closed.clone(),
        })
    }
}

#[derive(Default)]
pub struct ScriptedMonitors {
    failing: Mutex<HashSet<String>>,
    seen: Arc<Mutex<Vec<String>>>,
    quiet: AtomicBool,
    twice: AtomicBool,
    events_per_batch: AtomicUsize,
    delay_ms: AtomicU64,
    stop_after: Mutex<Option<(usize, Arc<AtomicBool>)>>,
}

impl ScriptedMonitors {
    pub fn fail_on(&self, indexes: &[usize]) {
        *self.failing.lock() = uris(indexes);
    }

    pub fn quiet(&self) {
        self.quiet.store(true, Ordering::SeqCst);
    }

    /// Deliver the batch a second time in every turn
    pub fn deliver_twice(&self) {
        self.twice.store(true, Ordering::SeqCst);
    }

    pub fn events_per_batch(&self, count: usize) {
        self.events_per_batch.store(count, Ordering::SeqCst);
    }

    pub fn delay_ms(&self, ms: u64) {
        self.delay_ms.store(ms, Ordering::SeqCst);
    }

    /// Raise `stop` while processing the `turns`-th resource
    pub fn stop_after(&self, turns: usize, stop: Arc<AtomicBool>) {
        *self.stop_after.lock() = Some((turns, stop));
    }

    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().clone()
    }
}

impl MonitorFactory<MockConnection> for ScriptedMonitors {
    fn create(&self, resource: &Resource) -> Result<Box<dyn Monitor<MockConnection>>> {
        let position = {
            let mut seen = self.seen.lock();
            seen.push(resource.uri.clone());
            seen.len()
        };
        if let Some((turns, stop)) = &*self.stop_after.lock() {
            if position == *turns {
                stop.store(true, Ordering::SeqCst);
            }
        }

        Ok(Box::new(ScriptedMonitor {
            resource: resource.clone(),
            fail: self.failing.lock().contains(&resource.uri),
            quiet: self.quiet.load(Ordering::SeqCst),
            twice: self.twice.load(Ordering::SeqCst),
            events: self.events_per_batch.load(Ordering::SeqCst).max(1),
            delay: Duration::from_millis(self.delay_ms.load(Ordering::SeqCst)),
        }))
    }
}

struct ScriptedMonitor {
    resource: Resource,
    fail: bool,
    quiet: bool,
    twice: bool,
    events: usize,
    delay: Duration,
}

#[async_trait]
impl Monitor<MockConnection> for ScriptedMonitor {
    async fn process(
        &mut self,
        connection: &mut MockConnection,
        delivery: &mut dyn Delivery,
    ) -> Result<()> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail {
            return Err(Error::Monitor(format!("cannot read {}", self.resource.uri)));
        }
        if self.quiet {
            return Ok(());
        }

        let events: Vec<Event> = (0..self.events)
            .map(|n| {
                Event::new(
                    &self.resource,
                    Utc::now(),
                    json!({"connection": connection.id, "n": n}),
                )
            })
            .collect();
        if self.twice {
            delivery.deliver(events.clone()).await?;
        }
        delivery.deliver(events).await
    }
}

#[derive(Default)]
pub struct RecordingSinks {
    created: AtomicUsize,
    closed: Arc<AtomicUsize>,
    batches: Arc<Mutex<Vec<Vec<Event>>>>,
    rejected: Arc<Mutex<HashSet<String>>>,
}

impl RecordingSinks {
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn reject(&self, indexes: &[usize]) {
        *self.rejected.lock() = uris(indexes);
    }

    pub fn batches(&self) -> Vec<Vec<Event>> {
        self.batches.lock().clone()
    }
}

#[async_trait]
impl SinkFactory for RecordingSinks {
    fn name(&self) -> &str {
        "recording"
    }

    async fn create(&self) -> Result<Box<dyn EventSink>> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(RecordingSink {
            closed: self.closed.clone(),
            batches: self.batches.clone(),
            rejected: self.rejected.clone(),
        }))
    }
}

struct RecordingSink {
    closed: Arc<AtomicUsize>,
    batches: Arc<Mutex<Vec<Vec<Event>>>>,
    rejected: Arc<Mutex<HashSet<String>>>,
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn send_messages(&mut self, events: &[Event]) -> Result<()> {
        let rejected = {
            let rejected = self.rejected.lock();
            events.iter().any(|e| rejected.contains(&e.resource_uri))
        };
        if rejected {
            return Err(Error::Sink("collector returned 503".into()));
        }
        self.batches.lock().push(events.to_vec());
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct CountingLister {
    resources: Vec<Resource>,
    calls: AtomicUsize,
    null: AtomicBool,
    fail: AtomicBool,
}

impl CountingLister {
    pub fn new(count: usize) -> Self {
        Self {
            resources: (1..=count).map(|i| Resource::new(uri(i))).collect(),
            calls: AtomicUsize::new(0),
            null: AtomicBool::new(false),
            fail: AtomicBool::new(false),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn answer_null(&self) {
        self.null.store(true, Ordering::SeqCst);
    }

    pub fn fail(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ResourceLister for CountingLister {
    async fn list_aggregated_resources(&self, prefix: &str) -> Result<Option<Vec<Resource>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Connection("api unreachable".into()));
        }
        if self.null.load(Ordering::SeqCst) {
            return Ok(None);
        }
        Ok(Some(
            self.resources
                .iter()
                .filter(|r| r.uri.starts_with(prefix))
                .cloned()
                .collect(),
        ))
    }
}

/// All collaborators of one processor, kept around for assertions
pub struct Harness {
    pub connections: Arc<MockConnections>,
    pub monitors: Arc<ScriptedMonitors>,
    pub sinks: Arc<RecordingSinks>,
    pub lister: Arc<CountingLister>,
}

impl Harness {
    pub fn new(resources: usize) -> Self {
        Self {
            connections: Arc::new(MockConnections::default()),
            monitors: Arc::new(ScriptedMonitors::default()),
            sinks: Arc::new(RecordingSinks::default()),
            lister: Arc::new(CountingLister::new(resources)),
        }
    }

    pub fn processor(&self, config: ProcessorConfig) -> Processor<MockConnection> {
        Processor::<MockConnection>::new(
            SourceId::new("mock", PREFIX),
            config,
            self.connections.clone(),
            self.monitors.clone(),
            self.sinks.clone(),
            self.lister.clone(),
        )
    }
}
