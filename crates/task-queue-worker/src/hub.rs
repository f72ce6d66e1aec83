//! The event loop hub: a single-threaded I/O multiplexer the async loop
//! drives one step at a time.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::time::Duration;
use task_queue_core::Result;
use tracing::error;

/// A descriptor registered with a hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fd(pub i32);

impl fmt::Display for Fd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fd:{}", self.0)
    }
}

/// Which readiness a handler waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interest {
    Readable,
    Writable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u64);

/// Called when a registered descriptor becomes ready.
pub type IoHandler = Box<dyn FnMut() -> Result<()> + Send>;

/// Called each time a repeating timer fires.
pub type TimerCallback = Box<dyn FnMut() -> Result<()> + Send>;

/// Outcome of advancing the hub's step sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HubStep {
    /// One unit of work was done (possibly an empty poll).
    Advanced,
    /// The current sequence has ended; call [`Hub::create_loop`] to start
    /// another one.
    Exhausted,
}

pub trait Hub {
    fn add_reader(&mut self, fd: Fd, handler: IoHandler);

    fn add_writer(&mut self, fd: Fd, handler: IoHandler);

    /// Drop both the reader and the writer registered for `fd`.
    fn remove(&mut self, fd: Fd);

    fn call_repeatedly(&mut self, period: Duration, callback: TimerCallback) -> TimerId;

    /// Start a fresh step sequence, replacing any previous one.
    fn create_loop(&mut self);

    /// Advance the current sequence by one step.
    ///
    /// Blocks until a registered descriptor is ready or the soonest timer
    /// is due. Errors raised by handlers or timers are returned as-is.
    fn step(&mut self) -> Result<HubStep>;

    /// Release every descriptor and timer. A closed hub must not be reused.
    fn close(&mut self) -> Result<()>;

    fn is_closed(&self) -> bool;
}

/// Closes the wrapped hub when dropped, whichever way the owner exits.
pub struct HubGuard<'a> {
    hub: &'a mut (dyn Hub + 'a),
}

impl<'a> HubGuard<'a> {
    pub fn new(hub: &'a mut (dyn Hub + 'a)) -> Self {
        HubGuard { hub }
    }
}

impl<'a> Deref for HubGuard<'a> {
    type Target = dyn Hub + 'a;

    fn deref(&self) -> &Self::Target {
        &*self.hub
    }
}

impl<'a> DerefMut for HubGuard<'a> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.hub
    }
}

impl Drop for HubGuard<'_> {
    fn drop(&mut self) {
        if self.hub.is_closed() {
            return;
        }
        if let Err(e) = self.hub.close() {
            error!(error = %e, "Error cleaning up after event loop: {:?}", e);
        }
    }
}
