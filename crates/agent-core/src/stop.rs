use std::sync::atomic::{AtomicBool, Ordering};
use tokio_util::sync::CancellationToken;

/// Cooperative stop flag polled at the top of every resource turn
pub trait StopSignal: Send + Sync {
    fn is_stopped(&self) -> bool;
}

/// Stop signal used when the host provides none
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverStop;

impl StopSignal for NeverStop {
    fn is_stopped(&self) -> bool {
        false
    }
}

impl StopSignal for CancellationToken {
    fn is_stopped(&self) -> bool {
        self.is_cancelled()
    }
}

impl StopSignal for AtomicBool {
    fn is_stopped(&self) -> bool {
        self.load(Ordering::SeqCst)
    }
}
