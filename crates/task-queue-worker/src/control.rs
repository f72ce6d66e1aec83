//! In-process remote control: commands that adjust prefetch credit or ask
//! the worker to shut down, delivered through the event loop.

use crate::hub::{Fd, Interest, IoHandler};
use crate::memory::{HubWaker, MemoryHub};
use crate::qos::QosHandle;
use crate::shutdown::ShutdownSignal;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::info;

pub const CONTROL_FD: Fd = Fd(4);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    IncreasePrefetch(u32),
    DecreasePrefetch(u32),
    SetPrefetch(u32),
    /// Warm shutdown
    Shutdown,
    /// Cold shutdown
    Terminate,
}

#[derive(Default)]
struct Mailbox {
    commands: VecDeque<ControlCommand>,
    waker: Option<HubWaker>,
}

/// Sending side and event-loop reader for control commands.
#[derive(Clone)]
pub struct RemoteControl {
    mailbox: Arc<Mutex<Mailbox>>,
    qos: QosHandle,
    shutdown: ShutdownSignal,
}

impl RemoteControl {
    pub fn new(qos: QosHandle, shutdown: ShutdownSignal) -> Self {
        RemoteControl {
            mailbox: Arc::new(Mutex::new(Mailbox::default())),
            qos,
            shutdown,
        }
    }

    pub fn send(&self, command: ControlCommand) {
        let mut mailbox = self.mailbox.lock();
        mailbox.commands.push_back(command);
        if let Some(waker) = &mailbox.waker {
            waker.wake(CONTROL_FD, Interest::Readable);
        }
    }

    /// Route readiness to `hub`, including commands already queued.
    pub fn attach(&self, hub: &MemoryHub) {
        let waker = hub.waker();
        let mut mailbox = self.mailbox.lock();
        if !mailbox.commands.is_empty() {
            waker.wake(CONTROL_FD, Interest::Readable);
        }
        mailbox.waker = Some(waker);
    }

    pub fn pending(&self) -> usize {
        self.mailbox.lock().commands.len()
    }

    /// Apply every queued command. Credit changes only touch the desired
    /// value; the loop pushes it to the broker on its next pass.
    pub fn process_pending(&self) -> usize {
        let commands: Vec<ControlCommand> = self.mailbox.lock().commands.drain(..).collect();
        for command in &commands {
            info!(?command, "Remote control command");
            match *command {
                ControlCommand::IncreasePrefetch(n) => {
                    self.qos.increment_eventually(n);
                }
                ControlCommand::DecreasePrefetch(n) => {
                    self.qos.decrement_eventually(n);
                }
                ControlCommand::SetPrefetch(n) => self.qos.set(n),
                ControlCommand::Shutdown => self.shutdown.request_stop(),
                ControlCommand::Terminate => self.shutdown.request_terminate(),
            }
        }
        commands.len()
    }

    pub fn reader(&self) -> IoHandler {
        let control = self.clone();
        Box::new(move || {
            control.process_pending();
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commands_adjust_credit() {
        let qos = QosHandle::new(10);
        let control = RemoteControl::new(qos.clone(), ShutdownSignal::new());

        control.send(ControlCommand::IncreasePrefetch(2));
        control.send(ControlCommand::DecreasePrefetch(5));
        assert_eq!(control.pending(), 2);

        assert_eq!(control.process_pending(), 2);
        assert_eq!(qos.value(), 7);

        control.send(ControlCommand::SetPrefetch(1));
        control.process_pending();
        assert_eq!(qos.value(), 1);
    }

    #[test]
    fn test_shutdown_commands() {
        let shutdown = ShutdownSignal::new();
        let control = RemoteControl::new(QosHandle::new(1), shutdown.clone());

        control.send(ControlCommand::Shutdown);
        let mut reader = control.reader();
        reader().unwrap();
        assert!(shutdown.should_stop());
        assert!(!shutdown.should_terminate());

        control.send(ControlCommand::Terminate);
        reader().unwrap();
        assert!(shutdown.should_terminate());
    }
}
