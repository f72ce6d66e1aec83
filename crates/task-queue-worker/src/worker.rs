use crate::control::{RemoteControl, CONTROL_FD};
use crate::executor::{TaskExecutor, WorkerStats};
use crate::handler::TaskHandlerRegistry;
use crate::hub::Hub;
use crate::transport::{MessageCallback, Pool, WorkerHost};
use parking_lot::RwLock;
use std::sync::Arc;
use task_queue_core::Result;
use tracing::info;

/// The worker handle a consumer loop runs on behalf of.
pub struct Worker {
    worker_id: String,
    registry: TaskHandlerRegistry,
    stats: Arc<RwLock<WorkerStats>>,
    pool: Box<dyn Pool + Send>,
    controller: Option<RemoteControl>,
    restart_count: u32,
    ready: bool,
}

impl Worker {
    pub fn new(worker_id: impl Into<String>, registry: TaskHandlerRegistry, pool: impl Pool + Send + 'static) -> Self {
        Worker {
            worker_id: worker_id.into(),
            registry,
            stats: Arc::new(RwLock::new(WorkerStats::default())),
            pool: Box::new(pool),
            controller: None,
            restart_count: 0,
            ready: false,
        }
    }

    pub fn with_controller(mut self, controller: RemoteControl) -> Self {
        self.controller = Some(controller);
        self
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn stats(&self) -> WorkerStats {
        self.stats.read().clone()
    }

    /// Shared view of the counters, readable while the loop runs.
    pub fn stats_handle(&self) -> Arc<RwLock<WorkerStats>> {
        self.stats.clone()
    }

    /// Called by the supervisor before running the loop again.
    pub fn record_restart(&mut self) {
        self.restart_count += 1;
        self.ready = false;
    }
}

impl WorkerHost for Worker {
    fn create_task_handler(&mut self) -> MessageCallback {
        TaskExecutor::new(self.registry.clone(), self.stats.clone()).into_callback()
    }

    fn on_ready(&mut self) {
        self.ready = true;
        info!(
            worker_id = %self.worker_id,
            tasks = ?self.registry.task_names(),
            "Worker ready"
        );
    }

    fn register_controller(&mut self, hub: &mut dyn Hub) -> Result<()> {
        if let Some(controller) = &self.controller {
            hub.add_reader(CONTROL_FD, controller.reader());
        }
        Ok(())
    }

    fn restart_count(&self) -> u32 {
        self.restart_count
    }

    fn pool(&self) -> &dyn Pool {
        self.pool.as_ref()
    }
}
