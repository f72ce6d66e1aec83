//! Capabilities the consumer loops need from the rest of the worker.

use crate::hub::Hub;
use std::time::Duration;
use task_queue_core::{Result, TaskMessage, TransportError};

/// Invoked by a consumer for every message it receives.
pub type MessageCallback = Box<dyn FnMut(TaskMessage) + Send>;

/// A live session with the broker.
///
/// Methods take `&self` so a heartbeat timer can hold its own handle to the
/// connection while the loop keeps using it.
pub trait Connection: Send + Sync {
    fn is_live(&self) -> bool;

    fn supports_heartbeats(&self) -> bool;

    /// Send/verify heartbeats. Called `rate` times per heartbeat window.
    fn heartbeat_check(&self, rate: f64) -> Result<()>;

    /// Process broker events until one arrives or `timeout` elapses.
    /// An elapsed timeout is reported as [`TransportError::Timeout`].
    fn drain_events(&self, timeout: Duration) -> Result<()>;

    /// Whether `err` means the connection itself is unusable.
    fn is_connection_error(&self, err: &TransportError) -> bool {
        err.is_connection_error()
    }

    /// Whether the transport exposes descriptors a hub can multiplex.
    fn is_evented(&self) -> bool {
        false
    }

    /// Register the transport's own readers and writers with `hub`.
    fn register_with_event_loop(&self, _hub: &mut dyn Hub) -> Result<()> {
        Ok(())
    }
}

/// A subscription bound to one connection.
pub trait Consumer {
    fn register_callback(&mut self, callback: MessageCallback);

    /// Replace every registered callback.
    fn set_callbacks(&mut self, callbacks: Vec<MessageCallback>);

    /// Start delivery.
    fn consume(&mut self) -> Result<()>;

    /// Stop delivery.
    fn cancel(&mut self) -> Result<()>;
}

pub trait Pool {
    /// Whether the pool's processes came up.
    fn did_start_ok(&self) -> bool;
}

/// The worker handle the loops call back into.
pub trait WorkerHost {
    /// Build the callback that dispatches received task messages.
    fn create_task_handler(&mut self) -> MessageCallback;

    /// The loop is about to start consuming.
    fn on_ready(&mut self);

    /// Register the remote-control consumer with the hub.
    fn register_controller(&mut self, _hub: &mut dyn Hub) -> Result<()> {
        Ok(())
    }

    /// Register any extra readers/writers the worker owns.
    fn register_with_event_loop(&mut self, _hub: &mut dyn Hub) -> Result<()> {
        Ok(())
    }

    /// How many times the consumer has been restarted so far.
    fn restart_count(&self) -> u32;

    fn pool(&self) -> &dyn Pool;
}
