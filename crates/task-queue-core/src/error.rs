use thiserror::Error;

/// Errors raised by a broker transport.
#[derive(Error, Debug)]
pub enum TransportError {
    /// A bounded wait elapsed without any event arriving.
    #[error("Timed out waiting for broker events")]
    Timeout,

    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Transport is closed")]
    Closed,
}

impl TransportError {
    pub fn is_timeout(&self) -> bool {
        match self {
            TransportError::Timeout => true,
            TransportError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
            ),
            _ => false,
        }
    }

    /// Errors that mean the session itself is gone, as opposed to a
    /// fault scoped to one channel or operation.
    pub fn is_connection_error(&self) -> bool {
        match self {
            TransportError::ConnectionLost(_) | TransportError::Closed => true,
            TransportError::Io(e) => !self.is_timeout() && e.kind() != std::io::ErrorKind::Interrupted,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_timeout_classification() {
        assert!(TransportError::Timeout.is_timeout());
        assert!(TransportError::Io(io::Error::from(io::ErrorKind::TimedOut)).is_timeout());
        assert!(!TransportError::Timeout.is_connection_error());
    }

    #[test]
    fn test_connection_error_classification() {
        assert!(TransportError::ConnectionLost("reset".into()).is_connection_error());
        assert!(TransportError::Closed.is_connection_error());
        assert!(TransportError::Io(io::Error::from(io::ErrorKind::ConnectionReset)).is_connection_error());
        assert!(!TransportError::Io(io::Error::from(io::ErrorKind::Interrupted)).is_connection_error());
        assert!(!TransportError::Channel("precondition failed".into()).is_connection_error());
    }
}
