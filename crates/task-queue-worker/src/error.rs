use task_queue_core::TransportError;
use thiserror::Error;

/// Fatal conditions that end a consumer loop abnormally.
#[derive(Error, Debug)]
pub enum LoopError {
    /// The execution pool failed to come up on a fresh start.
    #[error("Worker lost: {0}")]
    WorkerLost(String),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Event loop hub has already been closed")]
    HubClosed,

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, LoopError>;

/// Why a loop stopped without failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GracefulReason {
    /// A warm shutdown was requested.
    StopRequested,
    /// The worker lifecycle left the run state.
    LifecycleEnded,
    /// The connection reported itself as no longer live.
    ConnectionLost,
}

/// How a loop that did not fail came to an end.
///
/// `Terminated` is kept apart from the graceful exits so the caller can
/// skip the cleanup steps that assume a clean stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    Graceful(GracefulReason),
    Terminated,
}

impl LoopExit {
    pub fn is_graceful(&self) -> bool {
        matches!(self, LoopExit::Graceful(_))
    }
}

/// Result of a single pass through a loop driver.
#[derive(Debug)]
pub(crate) enum Iteration {
    Continue,
    GracefulStop(GracefulReason),
    ForcefulStop,
    Fatal(LoopError),
}

impl Iteration {
    /// Maps a finished iteration to the loop's return value, or `None` to keep going.
    pub(crate) fn into_exit(self) -> Option<Result<LoopExit>> {
        match self {
            Iteration::Continue => None,
            Iteration::GracefulStop(reason) => Some(Ok(LoopExit::Graceful(reason))),
            Iteration::ForcefulStop => Some(Ok(LoopExit::Terminated)),
            Iteration::Fatal(err) => Some(Err(err)),
        }
    }
}
