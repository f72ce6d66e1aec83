//! In-process transport, hub and pool.
//!
//! Used by the `tq-worker` demo binary and by the tests to drive both loops
//! without a real broker.

mod broker;
mod hub;

pub use broker::{MemoryBroker, MemoryConnection, MemoryConsumer};
pub use hub::{HubWaker, MemoryHub};

use crate::transport::Pool;

/// A pool whose startup result is fixed up front.
#[derive(Debug, Clone, Copy)]
pub struct StaticPool {
    started_ok: bool,
}

impl StaticPool {
    pub fn started() -> Self {
        StaticPool { started_ok: true }
    }

    pub fn failed() -> Self {
        StaticPool { started_ok: false }
    }
}

impl Pool for StaticPool {
    fn did_start_ok(&self) -> bool {
        self.started_ok
    }
}
