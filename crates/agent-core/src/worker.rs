use crate::{ProcessorConfig, ResourceLister, SinkFactory, SourceId, SourceKind};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Outcome of one polling round over every prefix of a source
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoundSummary {
    pub prefixes: usize,
    pub succeeded: usize,
    pub total: usize,
    pub failed_prefixes: Vec<String>,
}

/// Long-running loop polling every configured prefix of a source
pub struct Worker {
    name: String,
    kind: Arc<dyn SourceKind>,
    config: ProcessorConfig,
    sinks: Arc<dyn SinkFactory>,
    lister: Arc<dyn ResourceLister>,
    interval: Duration,
    token: CancellationToken,
}

impl Worker {
    pub fn new(
        name: impl Into<String>,
        kind: Arc<dyn SourceKind>,
        config: ProcessorConfig,
        sinks: Arc<dyn SinkFactory>,
        lister: Arc<dyn ResourceLister>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            config,
            sinks,
            lister,
            interval: Duration::from_secs(60),
            token: CancellationToken::new(),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Share a cancellation token, e.g. one token for every worker of an agent
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Finish the resource turns in flight, then return from `run`
    pub fn stop(&self) {
        self.token.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    pub async fn run(&self) {
        info!("[{}] Worker started, interval {:?}", self.name, self.interval);

        loop {
            self.process().await;
            if self.is_stopped() {
                break;
            }
            tokio::select! {
                _ = self.token.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        info!("[{}] Worker stopped", self.name);
    }

    /// One round: a fresh processor per prefix, in prefix order.
    ///
    /// A failed prefix is logged and the round moves on to the next one.
    pub async fn process(&self) -> RoundSummary {
        let mut summary = RoundSummary::default();

        for prefix in self.config.resource_uri_prefixes() {
            if self.is_stopped() {
                info!("[{}] stop requested, skipping remaining prefixes", self.name);
                break;
            }
            summary.prefixes += 1;

            let processor = self.kind.processor(
                SourceId::new(self.name.clone(), prefix),
                self.config.clone(),
                self.sinks.clone(),
                self.lister.clone(),
                Arc::new(self.token.clone()),
            );
            let started = Instant::now();

            let total = match processor.total_count().await {
                Ok(total) => total,
                Err(e) => {
                    error!("[{}] resource_uri_prefix:{} {}", self.name, prefix, e);
                    summary.failed_prefixes.push(prefix.to_string());
                    continue;
                }
            };
            summary.total += total;

            match processor.process().await {
                Ok(success_count) => {
                    summary.succeeded += success_count;
                    info!(
                        "[{}] resource_uri_prefix:{} success_count:{}/{} elapsed:{:?}",
                        self.name,
                        prefix,
                        success_count,
                        total,
                        started.elapsed()
                    );
                }
                Err(e) => {
                    error!("[{}] resource_uri_prefix:{} {}", self.name, prefix, e);
                    summary.failed_prefixes.push(prefix.to_string());
                }
            }
        }

        summary
    }
}
