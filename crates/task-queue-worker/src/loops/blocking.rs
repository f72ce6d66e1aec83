use super::LoopContext;
use crate::error::{Iteration, LoopExit, Result};
use std::time::Duration;
use tracing::info;

pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Fallback blocking loop for transports that can't be multiplexed.
///
/// Liveness checks are left to the transport's own `drain_events`, so no
/// heartbeat timer is installed here.
pub fn synloop(mut ctx: LoopContext<'_>, drain_timeout: Duration) -> Result<LoopExit> {
    let on_task_received = ctx.host.create_task_handler();
    ctx.consumer.register_callback(on_task_received);
    ctx.consumer.consume()?;

    ctx.host.on_ready();
    info!(?drain_timeout, "Consumer ready, draining events");

    loop {
        let iteration = match ctx.poll_control() {
            Iteration::Continue => match ctx.connection.drain_events(drain_timeout) {
                Ok(()) => Iteration::Continue,
                Err(e) if e.is_timeout() => Iteration::Continue,
                Err(e) => ctx.transport_fault(e),
            },
            other => other,
        };
        if let Some(exit) = iteration.into_exit() {
            return exit;
        }
    }
}
