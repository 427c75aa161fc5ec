use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Monitor error: {0}")]
    Monitor(String),

    #[error("Sink error: {0}")]
    Sink(String),

    #[error("Listing error: {0}")]
    Listing(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Timed out after {timeout:?} waiting for a '{pool}' pool entry")]
    PoolTimeout { pool: String, timeout: Duration },

    #[error("Pool '{0}' is shut down")]
    PoolClosed(String),

    #[error("Too many consecutive errors: {consecutive} > {max} ({succeeded} succeeded before abort)")]
    TooManyConsecutiveErrors {
        consecutive: usize,
        max: usize,
        succeeded: usize,
    },

    #[error("Worker error: {0}")]
    Worker(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Generic error: {0}")]
    Generic(#[from] anyhow::Error),
}

impl Error {
    /// Errors that end a whole run instead of a single resource turn.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Listing(_) | Error::TooManyConsecutiveErrors { .. } | Error::Worker(_)
        )
    }
}
