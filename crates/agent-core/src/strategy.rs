//! Execution strategies: how the resource turns of one run are scheduled and
//! how their outcomes are counted.

use crate::{Error, ParallelType, Resource, Result, StopSignal};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Work done for a single resource
#[async_trait]
pub trait Turn: Send + Sync + 'static {
    /// Errors returned here are counted, not propagated
    async fn run(&self, resource: Resource) -> Result<()>;
}

/// Counters of one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunState {
    pub success_count: usize,
    pub consecutive_error_count: usize,
}

impl RunState {
    pub fn record_success(&mut self) {
        self.success_count += 1;
        self.consecutive_error_count = 0;
    }

    /// Count a failed turn; errors once the count goes past `max`.
    pub fn record_failure(&mut self, max: usize) -> Result<()> {
        self.consecutive_error_count += 1;
        if self.consecutive_error_count > max {
            return Err(Error::TooManyConsecutiveErrors {
                consecutive: self.consecutive_error_count,
                max,
                succeeded: self.success_count,
            });
        }
        Ok(())
    }
}

/// Schedules turns over a resource list and aggregates their outcomes
#[async_trait]
pub trait ExecutionStrategy: Send + Sync {
    /// Run `turn` for each resource until the list is exhausted, `stop` fires or
    /// the consecutive error threshold is crossed.
    ///
    /// Turns already running are allowed to finish in every case.
    async fn run_each(
        &self,
        resources: Vec<Resource>,
        turn: Arc<dyn Turn>,
        stop: Arc<dyn StopSignal>,
    ) -> Result<RunState>;
}

pub fn strategy_for(
    parallel_type: ParallelType,
    parallelism: usize,
    max_consecutive_errors: usize,
) -> Box<dyn ExecutionStrategy> {
    match parallel_type {
        ParallelType::Thread => Box::new(SharedStrategy::new(parallelism, max_consecutive_errors)),
        ParallelType::Process => {
            Box::new(IsolatedStrategy::new(parallelism, max_consecutive_errors))
        }
    }
}

/// Worker tasks pull from one queue and update one locked [`RunState`]
pub struct SharedStrategy {
    parallelism: usize,
    max_consecutive_errors: usize,
}

impl SharedStrategy {
    pub fn new(parallelism: usize, max_consecutive_errors: usize) -> Self {
        Self {
            parallelism: parallelism.max(1),
            max_consecutive_errors,
        }
    }
}

#[async_trait]
impl ExecutionStrategy for SharedStrategy {
    async fn run_each(
        &self,
        resources: Vec<Resource>,
        turn: Arc<dyn Turn>,
        stop: Arc<dyn StopSignal>,
    ) -> Result<RunState> {
        let queue = Arc::new(Mutex::new(VecDeque::from(resources)));
        let state = Arc::new(Mutex::new(RunState::default()));
        let halt = CancellationToken::new();
        let max = self.max_consecutive_errors;

        let mut workers = JoinSet::new();
        for worker in 0..self.parallelism {
            let queue = queue.clone();
            let state = state.clone();
            let halt = halt.clone();
            let turn = turn.clone();
            let stop = stop.clone();

            workers.spawn(async move {
                loop {
                    if halt.is_cancelled() {
                        return Ok(());
                    }
                    if stop.is_stopped() {
                        debug!("worker {} observed stop signal", worker);
                        halt.cancel();
                        return Ok(());
                    }
                    let next = queue.lock().pop_front();
                    let Some(resource) = next else {
                        return Ok(());
                    };

                    let outcome = turn.run(resource).await;

                    let mut counters = state.lock();
                    match outcome {
                        Ok(()) => counters.record_success(),
                        Err(_) => {
                            if let Err(fatal) = counters.record_failure(max) {
                                halt.cancel();
                                return Err(fatal);
                            }
                        }
                    }
                }
            });
        }

        let mut fatal = None;
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    fatal.get_or_insert(e);
                }
                Err(e) => {
                    error!("worker task failed: {}", e);
                    halt.cancel();
                    fatal.get_or_insert(Error::Worker(e.to_string()));
                }
            }
        }

        let state = *state.lock();
        match fatal {
            Some(e) => Err(e),
            None => Ok(state),
        }
    }
}

enum Report {
    Finished { worker: usize, succeeded: bool },
    Aborted,
}

/// Workers own nothing shared with each other.
///
/// A coordinator hands resources out over per-worker channels and counts the
/// outcomes the workers send back.
pub struct IsolatedStrategy {
    parallelism: usize,
    max_consecutive_errors: usize,
}

impl IsolatedStrategy {
    pub fn new(parallelism: usize, max_consecutive_errors: usize) -> Self {
        Self {
            parallelism: parallelism.max(1),
            max_consecutive_errors,
        }
    }
}

#[async_trait]
impl ExecutionStrategy for IsolatedStrategy {
    async fn run_each(
        &self,
        resources: Vec<Resource>,
        turn: Arc<dyn Turn>,
        stop: Arc<dyn StopSignal>,
    ) -> Result<RunState> {
        let (report_tx, mut reports) = mpsc::channel::<Report>(self.parallelism);
        let mut inboxes = Vec::with_capacity(self.parallelism);
        let mut workers = JoinSet::new();

        for worker in 0..self.parallelism {
            let (work_tx, mut work_rx) = mpsc::channel::<Resource>(1);
            inboxes.push(work_tx);
            let report_tx = report_tx.clone();
            let turn = turn.clone();
            let stop = stop.clone();

            workers.spawn(async move {
                while let Some(resource) = work_rx.recv().await {
                    let report = if stop.is_stopped() {
                        debug!("worker {} observed stop signal", worker);
                        Report::Aborted
                    } else {
                        let succeeded = turn.run(resource).await.is_ok();
                        Report::Finished { worker, succeeded }
                    };
                    if report_tx.send(report).await.is_err() {
                        break;
                    }
                }
            });
        }
        drop(report_tx);

        let mut pending = resources.into_iter();
        let mut in_flight = 0usize;
        let mut halted = false;
        let mut state = RunState::default();
        let mut fatal = None;

        for inbox in &inboxes {
            let Some(resource) = pending.next() else { break };
            if inbox.send(resource).await.is_err() {
                return Err(Error::Worker("worker exited before receiving work".into()));
            }
            in_flight += 1;
        }

        while in_flight > 0 {
            tokio::select! {
                report = reports.recv() => {
                    let Some(report) = report else { break };
                    in_flight -= 1;
                    let worker = match report {
                        Report::Aborted => {
                            halted = true;
                            continue;
                        }
                        Report::Finished { worker, succeeded: true } => {
                            state.record_success();
                            worker
                        }
                        Report::Finished { worker, succeeded: false } => {
                            if let Err(e) = state.record_failure(self.max_consecutive_errors) {
                                halted = true;
                                fatal.get_or_insert(e);
                            }
                            worker
                        }
                    };
                    if halted {
                        continue;
                    }
                    if let Some(resource) = pending.next() {
                        if inboxes[worker].send(resource).await.is_ok() {
                            in_flight += 1;
                        }
                    }
                }
                Some(joined) = workers.join_next() => {
                    if let Err(e) = joined {
                        // A worker only dies mid-turn, so its turn never reports
                        error!("worker task failed: {}", e);
                        in_flight = in_flight.saturating_sub(1);
                        halted = true;
                        fatal.get_or_insert(Error::Worker(e.to_string()));
                    }
                }
            }
        }

        drop(inboxes);
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!("worker task failed: {}", e);
                fatal.get_or_insert(Error::Worker(e.to_string()));
            }
        }

        match fatal {
            Some(e) => Err(e),
            None => Ok(state),
        }
    }
}
