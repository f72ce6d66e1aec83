use crate::handler::{TaskHandlerRegistry, TaskResult};
use crate::transport::MessageCallback;
use parking_lot::RwLock;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use task_queue_core::TaskMessage;
use tracing::{debug, error, warn};

/// Counters for messages dispatched by a worker
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub received: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub unknown: u64,
}

/// Dispatches received messages to their registered handler
#[derive(Clone)]
pub struct TaskExecutor {
    registry: TaskHandlerRegistry,
    stats: Arc<RwLock<WorkerStats>>,
}

impl TaskExecutor {
    pub fn new(registry: TaskHandlerRegistry, stats: Arc<RwLock<WorkerStats>>) -> Self {
        TaskExecutor { registry, stats }
    }

    /// Execute a message with panic recovery
    pub fn execute(&self, message: &TaskMessage) -> TaskResult {
        self.stats.write().received += 1;

        let Some(handler) = self.registry.get(&message.name) else {
            warn!(task = %message.name, id = %message.id, "Received unregistered task");
            self.stats.write().unknown += 1;
            return Err(format!("No handler for task: {}", message.name));
        };

        let result = match panic::catch_unwind(AssertUnwindSafe(|| handler.handle(message))) {
            Ok(result) => result,
            Err(_) => {
                error!(task = %message.name, id = %message.id, "Task panicked");
                Err("Task panicked during execution".to_string())
            }
        };

        match &result {
            Ok(output) => {
                debug!(task = %message.name, id = %message.id, bytes = output.len(), "Task succeeded");
                self.stats.write().succeeded += 1;
            }
            Err(e) => {
                error!(task = %message.name, id = %message.id, "Task failed: {}", e);
                self.stats.write().failed += 1;
            }
        }
        result
    }

    /// Wrap the executor as the consumer's on-message callback
    pub fn into_callback(self) -> MessageCallback {
        Box::new(move |message| {
            let _ = self.execute(&message);
        })
    }
}
