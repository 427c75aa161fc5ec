use crate::{
    Connection, ConnectionFactory, Error, MonitorFactory, Process, Processor, ProcessorConfig,
    ResourceLister, Result, SinkFactory, SourceId, StopSignal,
};
use std::collections::HashMap;
use std::sync::Arc;

/// Builds processors for one kind of source, whatever its connection type
pub trait SourceKind: Send + Sync {
    fn name(&self) -> &str;

    fn processor(
        &self,
        source: SourceId,
        config: ProcessorConfig,
        sinks: Arc<dyn SinkFactory>,
        lister: Arc<dyn ResourceLister>,
        stop: Arc<dyn StopSignal>,
    ) -> Box<dyn Process>;
}

/// A connection factory paired with the monitors that understand its connections
pub struct SourceDriver<C: Connection> {
    connections: Arc<dyn ConnectionFactory<Connection = C>>,
    monitors: Arc<dyn MonitorFactory<C>>,
}

impl<C: Connection> SourceDriver<C> {
    pub fn new(
        connections: Arc<dyn ConnectionFactory<Connection = C>>,
        monitors: Arc<dyn MonitorFactory<C>>,
    ) -> Self {
        Self {
            connections,
            monitors,
        }
    }
}

impl<C: Connection> SourceKind for SourceDriver<C> {
    fn name(&self) -> &str {
        self.connections.name()
    }

    fn processor(
        &self,
        source: SourceId,
        config: ProcessorConfig,
        sinks: Arc<dyn SinkFactory>,
        lister: Arc<dyn ResourceLister>,
        stop: Arc<dyn StopSignal>,
    ) -> Box<dyn Process> {
        Box::new(
            Processor::new(
                source,
                config,
                self.connections.clone(),
                self.monitors.clone(),
                sinks,
                lister,
            )
            .with_stop_signal(stop),
        )
    }
}

/// Registry for source kinds and sink factories
pub struct Registry {
    sources: HashMap<String, Arc<dyn SourceKind>>,
    sinks: HashMap<String, Arc<dyn SinkFactory>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            sources: HashMap::new(),
            sinks: HashMap::new(),
        }
    }

    /// Register a source kind
    pub fn register_source(&mut self, kind: Arc<dyn SourceKind>) {
        let name = kind.name().to_string();
        self.sources.insert(name, kind);
    }

    /// Register a sink factory
    pub fn register_sink(&mut self, factory: Arc<dyn SinkFactory>) {
        let name = factory.name().to_string();
        self.sinks.insert(name, factory);
    }

    /// Get a source kind by name
    pub fn get_source(&self, name: &str) -> Result<Arc<dyn SourceKind>> {
        self.sources
            .get(name)
            .cloned()
            .ok_or_else(|| Error::Configuration(format!("Source kind '{}' not found", name)))
    }

    /// Get a sink factory by name
    pub fn get_sink(&self, name: &str) -> Result<Arc<dyn SinkFactory>> {
        self.sinks
            .get(name)
            .cloned()
            .ok_or_else(|| Error::Configuration(format!("Sink factory '{}' not found", name)))
    }

    /// List all registered source kinds
    pub fn list_sources(&self) -> Vec<String> {
        let mut names: Vec<String> = self.sources.keys().cloned().collect();
        names.sort();
        names
    }

    /// List all registered sinks
    pub fn list_sinks(&self) -> Vec<String> {
        let mut names: Vec<String> = self.sinks.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
