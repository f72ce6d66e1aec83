//! Process-wide shutdown requests, set by signal handlers and polled by the loops.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// What the outside world asked the loop to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownRequest {
    /// Finish the current step, then exit (warm shutdown).
    Stop,
    /// Abandon the current iteration immediately (cold shutdown).
    Terminate,
}

/// Two independent flags shared between the loop and whoever handles
/// signals. Cloning yields another handle onto the same flags.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    stop: Arc<AtomicBool>,
    terminate: Arc<AtomicBool>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    pub fn request_terminate(&self) {
        self.terminate.store(true, Ordering::Release);
    }

    pub fn should_stop(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    pub fn should_terminate(&self) -> bool {
        self.terminate.load(Ordering::Acquire)
    }

    /// Read both flags without blocking. Terminate wins when both are set.
    pub fn poll(&self) -> Option<ShutdownRequest> {
        if self.should_terminate() {
            Some(ShutdownRequest::Terminate)
        } else if self.should_stop() {
            Some(ShutdownRequest::Stop)
        } else {
            None
        }
    }
}
