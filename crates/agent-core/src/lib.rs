mod connection;
mod error;
mod event;
mod factory;
mod lister;
mod monitor;
pub mod pool;
mod processor;
mod registry;
mod settings;
mod sink;
mod stop;
pub mod strategy;
mod worker;

#[cfg(test)]
mod test_support;

pub use connection::Connection;
pub use error::{Error, Result};
pub use event::{Event, Resource, SourceId};
pub use factory::{ConnectionFactory, MonitorFactory, SinkFactory};
pub use lister::ResourceLister;
pub use monitor::{Delivery, Monitor};
pub use pool::{Pool, PoolConfig, Pooled, Teardown};
pub use processor::{Process, Processor};
pub use registry::{Registry, SourceDriver, SourceKind};
pub use settings::{ParallelType, ProcessorConfig};
pub use sink::EventSink;
pub use stop::{NeverStop, StopSignal};
pub use strategy::{ExecutionStrategy, IsolatedStrategy, RunState, SharedStrategy};
pub use worker::{RoundSummary, Worker};
