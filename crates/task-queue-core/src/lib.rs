mod error;
mod message;

pub use error::{TransportError, Result};
pub use message::{DeliveryTag, TaskMessage};

/// Largest prefetch count the wire protocol can carry. Anything above it
/// is sent as 0, which brokers treat as "unlimited".
pub const PREFETCH_COUNT_MAX: u32 = 0xFFFF;
