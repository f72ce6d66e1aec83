//! The consumer's inner loops.
//!
//! Both drivers share one protocol: start consuming, then repeatedly check
//! the lifecycle state, the shutdown flags and the prefetch credit before
//! waiting for broker I/O, until one of those checks says to stop.

mod asynchronous;
mod blocking;

pub use asynchronous::asynloop;
pub use blocking::{synloop, DEFAULT_DRAIN_TIMEOUT};

use crate::error::{GracefulReason, Iteration, LoopError, LoopExit, Result};
use crate::heartbeat::HeartbeatSettings;
use crate::hub::Hub;
use crate::lifecycle::Lifecycle;
use crate::qos::Qos;
use crate::shutdown::{ShutdownRequest, ShutdownSignal};
use crate::transport::{Connection, Consumer, WorkerHost};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use task_queue_core::TransportError;
use tracing::{error, info, warn};

/// Everything a loop driver borrows for the length of its run.
pub struct LoopContext<'a> {
    pub host: &'a mut dyn WorkerHost,
    pub connection: &'a Arc<dyn Connection>,
    pub consumer: &'a mut dyn Consumer,
    pub lifecycle: &'a dyn Lifecycle,
    pub qos: &'a mut Qos,
    pub shutdown: &'a ShutdownSignal,
    pub heartbeat: HeartbeatSettings,
}

impl LoopContext<'_> {
    /// The loop's governing condition: lifecycle in RUN and connection live.
    fn check_running(&self) -> Option<GracefulReason> {
        if !self.lifecycle.is_running() {
            return Some(GracefulReason::LifecycleEnded);
        }
        if !self.connection.is_live() {
            return Some(GracefulReason::ConnectionLost);
        }
        None
    }

    /// Control-plane checks that run before every wait.
    fn poll_control(&mut self) -> Iteration {
        if let Some(reason) = self.check_running() {
            return Iteration::GracefulStop(reason);
        }

        match self.shutdown.poll() {
            Some(ShutdownRequest::Terminate) => return Iteration::ForcefulStop,
            Some(ShutdownRequest::Stop) => {
                return Iteration::GracefulStop(GracefulReason::StopRequested)
            }
            None => {}
        }

        // Only update QoS between waits. This batches credit changes and
        // makes remote control commands take priority over task messages.
        if let Err(e) = self.qos.maybe_update() {
            return self.transport_fault(e);
        }

        Iteration::Continue
    }

    /// A transport fault is fatal while running and swallowed once the
    /// lifecycle has left RUN.
    fn transport_fault(&self, err: TransportError) -> Iteration {
        if self.lifecycle.is_running() {
            Iteration::Fatal(LoopError::Transport(err))
        } else {
            warn!(
                state = self.lifecycle.state().as_str(),
                "Ignoring transport error during shutdown: {}", err
            );
            Iteration::GracefulStop(GracefulReason::LifecycleEnded)
        }
    }

    /// The pool can only be checked on the first start; a restart skews
    /// its process accounting.
    fn ensure_pool_started(&self) -> Result<()> {
        if self.host.restart_count() == 0 && !self.host.pool().did_start_ok() {
            return Err(LoopError::WorkerLost(
                "Could not start worker processes".to_string(),
            ));
        }
        Ok(())
    }
}

fn log_exit(kind: LoopKind, result: &Result<LoopExit>) {
    match result {
        Ok(LoopExit::Graceful(reason)) => {
            info!(loop_kind = kind.as_str(), ?reason, "Consumer loop stopped")
        }
        Ok(LoopExit::Terminated) => info!(loop_kind = kind.as_str(), "Consumer loop terminated"),
        Err(e) => error!(loop_kind = kind.as_str(), "Consumer loop failed: {}", e),
    }
}

/// Which loop the configuration asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopMode {
    /// Async when the transport is evented, blocking otherwise.
    #[default]
    Auto,
    Async,
    Blocking,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopKind {
    Async,
    Blocking,
}

impl LoopKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoopKind::Async => "async",
            LoopKind::Blocking => "blocking",
        }
    }
}

impl LoopMode {
    pub fn resolve(self, evented: bool, has_hub: bool) -> Result<LoopKind> {
        match self {
            LoopMode::Auto if evented && has_hub => Ok(LoopKind::Async),
            LoopMode::Auto | LoopMode::Blocking => Ok(LoopKind::Blocking),
            LoopMode::Async if !has_hub => Err(LoopError::InvalidConfig(
                "async loop requested but no event loop hub is available".to_string(),
            )),
            LoopMode::Async if !evented => Err(LoopError::InvalidConfig(
                "async loop requested but the transport does not support it".to_string(),
            )),
            LoopMode::Async => Ok(LoopKind::Async),
        }
    }
}

/// Run whichever loop `mode` resolves to for this connection.
pub fn run_consumer_loop(
    ctx: LoopContext<'_>,
    hub: Option<&mut dyn Hub>,
    mode: LoopMode,
    drain_timeout: Duration,
) -> Result<LoopExit> {
    let kind = mode.resolve(ctx.connection.is_evented(), hub.is_some())?;
    info!(loop_kind = kind.as_str(), "Starting consumer loop");

    let result = match (kind, hub) {
        (LoopKind::Async, Some(hub)) => asynloop(ctx, hub),
        _ => synloop(ctx, drain_timeout),
    };

    log_exit(kind, &result);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_mode_follows_transport() {
        assert_eq!(LoopMode::Auto.resolve(true, true).unwrap(), LoopKind::Async);
        assert_eq!(LoopMode::Auto.resolve(false, true).unwrap(), LoopKind::Blocking);
        assert_eq!(LoopMode::Auto.resolve(true, false).unwrap(), LoopKind::Blocking);
    }

    #[test]
    fn test_forced_modes() {
        assert_eq!(LoopMode::Blocking.resolve(true, true).unwrap(), LoopKind::Blocking);
        assert_eq!(LoopMode::Async.resolve(true, true).unwrap(), LoopKind::Async);
        assert!(matches!(
            LoopMode::Async.resolve(true, false),
            Err(LoopError::InvalidConfig(_))
        ));
        assert!(matches!(
            LoopMode::Async.resolve(false, true),
            Err(LoopError::InvalidConfig(_))
        ));
    }
}
