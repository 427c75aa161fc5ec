mod factory;
mod redis_source;

pub use factory::{RedisConnectionFactory, RedisStreamMonitorFactory};
pub use redis_source::{RedisConnection, RedisConnectionInfo, RedisStreamMonitor};
