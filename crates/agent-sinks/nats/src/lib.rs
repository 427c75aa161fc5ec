mod factory;
mod lister;
mod nats_sink;

pub use factory::NatsSinkFactory;
pub use lister::NatsResourceLister;
pub use nats_sink::{connect, NatsConfig, NatsSink};
