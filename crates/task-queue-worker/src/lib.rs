//! Task Queue Worker
//!
//! The consumer's inner loops: pull task messages off a broker connection,
//! dispatch them, keep the connection alive and stop cleanly on shutdown
//! or connection loss.

pub mod config;
pub mod control;
pub mod error;
pub mod executor;
pub mod handler;
pub mod heartbeat;
pub mod hub;
pub mod lifecycle;
pub mod loops;
pub mod memory;
pub mod qos;
pub mod shutdown;
pub mod transport;
pub mod worker;

pub use config::WorkerConfig;
pub use error::{GracefulReason, LoopError, LoopExit};
pub use handler::{TaskHandler, TaskHandlerRegistry};
pub use lifecycle::{BlueprintState, Lifecycle, SharedLifecycle};
pub use loops::{asynloop, run_consumer_loop, synloop, LoopContext, LoopMode};
pub use qos::{Qos, QosHandle};
pub use shutdown::ShutdownSignal;
pub use worker::Worker;
