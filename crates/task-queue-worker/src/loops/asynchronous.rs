use super::LoopContext;
use crate::error::{Iteration, LoopError, LoopExit, Result};
use crate::heartbeat::register_heartbeat;
use crate::hub::{Hub, HubGuard, HubStep};
use tracing::{debug, error, info};

/// Non-blocking event loop: consumes messages through the hub until the
/// connection is lost or shutdown is requested.
///
/// The hub is closed on every way out of this function, including errors
/// during startup and panics unwinding through it.
pub fn asynloop(mut ctx: LoopContext<'_>, hub: &mut dyn Hub) -> Result<LoopExit> {
    if hub.is_closed() {
        return Err(LoopError::HubClosed);
    }
    let mut hub = HubGuard::new(hub);

    let on_task_received = ctx.host.create_task_handler();

    if let Some(timer) = register_heartbeat(&mut *hub, ctx.connection, ctx.heartbeat) {
        debug!(?timer, heartbeat = ctx.heartbeat.heartbeat, "Heartbeat timer registered");
    }

    ctx.consumer.set_callbacks(vec![on_task_received]);
    ctx.consumer.consume()?;
    ctx.host.on_ready();
    ctx.host.register_controller(&mut *hub)?;
    ctx.host.register_with_event_loop(&mut *hub)?;
    ctx.connection.register_with_event_loop(&mut *hub)?;

    ctx.ensure_pool_started()?;

    info!("Consumer ready, entering event loop");
    hub.create_loop();

    loop {
        let iteration = match ctx.poll_control() {
            Iteration::Continue => advance(&ctx, &mut *hub),
            other => other,
        };
        if let Some(exit) = iteration.into_exit() {
            return exit;
        }
    }
}

/// Advance the hub one step, restarting its sequence when it runs out.
fn advance(ctx: &LoopContext<'_>, hub: &mut dyn Hub) -> Iteration {
    match hub.step() {
        Ok(HubStep::Advanced) => Iteration::Continue,
        Ok(HubStep::Exhausted) => {
            debug!("Event loop sequence exhausted, restarting");
            hub.create_loop();
            Iteration::Continue
        }
        Err(e) if ctx.connection.is_connection_error(&e) => ctx.transport_fault(e),
        Err(e) => {
            error!("Error in event loop: {}", e);
            Iteration::Continue
        }
    }
}
