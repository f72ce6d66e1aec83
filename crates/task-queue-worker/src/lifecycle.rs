use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Phase of the worker's startup/shutdown state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BlueprintState {
    Init = 0,
    Run = 1,
    Close = 2,
    Terminate = 3,
}

impl BlueprintState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlueprintState::Init => "init",
            BlueprintState::Run => "run",
            BlueprintState::Close => "close",
            BlueprintState::Terminate => "terminate",
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => BlueprintState::Init,
            1 => BlueprintState::Run,
            2 => BlueprintState::Close,
            _ => BlueprintState::Terminate,
        }
    }
}

/// Read access to the externally owned lifecycle state.
pub trait Lifecycle: Send + Sync {
    fn state(&self) -> BlueprintState;

    fn is_running(&self) -> bool {
        self.state() == BlueprintState::Run
    }
}

/// Lifecycle state that can be moved from any thread.
#[derive(Debug, Clone)]
pub struct SharedLifecycle {
    state: Arc<AtomicU8>,
}

impl SharedLifecycle {
    pub fn new(state: BlueprintState) -> Self {
        SharedLifecycle {
            state: Arc::new(AtomicU8::new(state as u8)),
        }
    }

    pub fn set(&self, state: BlueprintState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

impl Default for SharedLifecycle {
    fn default() -> Self {
        Self::new(BlueprintState::Init)
    }
}

impl Lifecycle for SharedLifecycle {
    fn state(&self) -> BlueprintState {
        BlueprintState::from_u8(self.state.load(Ordering::Acquire))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_lifecycle_transitions() {
        let lifecycle = SharedLifecycle::default();
        assert_eq!(lifecycle.state(), BlueprintState::Init);
        assert!(!lifecycle.is_running());

        let other = lifecycle.clone();
        other.set(BlueprintState::Run);
        assert!(lifecycle.is_running());

        other.set(BlueprintState::Close);
        assert_eq!(lifecycle.state().as_str(), "close");
        assert!(!lifecycle.is_running());
    }
}
