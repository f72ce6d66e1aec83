use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use task_queue_core::TaskMessage;
use task_queue_worker::control::RemoteControl;
use task_queue_worker::handler::{EchoHandler, FailHandler, JsonProcessorHandler};
use task_queue_worker::hub::Hub;
use task_queue_worker::memory::{MemoryBroker, MemoryHub, StaticPool};
use task_queue_worker::transport::Connection;
use task_queue_worker::{
    run_consumer_loop, BlueprintState, LoopContext, LoopExit, LoopMode, Qos, SharedLifecycle,
    ShutdownSignal, TaskHandlerRegistry, Worker, WorkerConfig,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "tq-worker")]
#[command(about = "Task Queue Worker consumer loop (in-memory broker)", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(long)]
    config: Option<String>,

    /// Loop to run: auto, async or blocking
    #[arg(long, value_parser = parse_mode)]
    mode: Option<LoopMode>,

    /// Heartbeat window in seconds (0 disables)
    #[arg(long)]
    heartbeat: Option<f64>,

    /// Initial prefetch count
    #[arg(long)]
    prefetch: Option<u32>,

    /// Number of demo messages to publish before starting
    #[arg(short, long, default_value = "5")]
    messages: usize,

    /// Emit logs as JSON
    #[arg(long)]
    json: bool,
}

fn parse_mode(s: &str) -> Result<LoopMode, String> {
    match s {
        "auto" => Ok(LoopMode::Auto),
        "async" => Ok(LoopMode::Async),
        "blocking" => Ok(LoopMode::Blocking),
        other => Err(format!("unknown loop mode: {}", other)),
    }
}

fn init_tracing(config: &WorkerConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));

    let registry = tracing_subscriber::registry().with(filter);
    if config.json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .init();
    }
}

/// SIGINT/SIGTERM ask for a warm shutdown, SIGQUIT for a cold one.
async fn forward_signals(shutdown: ShutdownSignal) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let (Ok(mut term), Ok(mut quit)) = (
            signal(SignalKind::terminate()),
            signal(SignalKind::quit()),
        ) else {
            tracing::warn!("Could not install signal handlers");
            return;
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received SIGINT, shutting down");
                shutdown.request_stop();
            }
            _ = term.recv() => {
                tracing::info!("Received SIGTERM, shutting down");
                shutdown.request_stop();
            }
            _ = quit.recv() => {
                tracing::info!("Received SIGQUIT, terminating");
                shutdown.request_terminate();
            }
        }
    }

    #[cfg(not(unix))]
    {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received Ctrl-C, shutting down");
            shutdown.request_stop();
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    // Load configuration
    let mut config = WorkerConfig::load(args.config.as_deref())?;

    // Override with CLI args
    if let Some(mode) = args.mode {
        config.mode = mode;
    }
    if let Some(heartbeat) = args.heartbeat {
        config.heartbeat_secs = heartbeat;
    }
    if let Some(prefetch) = args.prefetch {
        config.prefetch_count = prefetch;
    }
    config.json_logs |= args.json;
    config.validate()?;

    init_tracing(&config);

    let broker = MemoryBroker::new();
    for i in 0..args.messages {
        let name = match i % 3 {
            0 => "echo",
            1 => "json_processor",
            _ => "fail",
        };
        let body = serde_json::to_vec(&serde_json::json!({ "n": i }))?;
        broker.publish(TaskMessage::new(name, body));
    }

    let registry = TaskHandlerRegistry::new();
    registry.register("echo", EchoHandler);
    registry.register("json_processor", JsonProcessorHandler);
    registry.register("fail", FailHandler);

    let shutdown = ShutdownSignal::new();
    tokio::spawn(forward_signals(shutdown.clone()));

    let worker_id = config.generate_worker_id();
    tracing::info!(%worker_id, mode = ?config.mode, "Starting worker");

    let loop_shutdown = shutdown.clone();
    let result = tokio::task::spawn_blocking(move || {
        let memory_conn = broker.connection();
        let mut consumer = broker.consumer();
        let mut qos = Qos::new(config.prefetch_count, consumer.qos_apply());
        let controller = RemoteControl::new(qos.handle(), loop_shutdown.clone());
        let mut worker = Worker::new(worker_id, registry, StaticPool::started())
            .with_controller(controller.clone());
        let lifecycle = SharedLifecycle::new(BlueprintState::Run);

        let mut hub = MemoryHub::new();
        memory_conn.attach(&hub);
        controller.attach(&hub);
        let connection: Arc<dyn Connection> = Arc::new(memory_conn);

        let ctx = LoopContext {
            host: &mut worker,
            connection: &connection,
            consumer: &mut consumer,
            lifecycle: &lifecycle,
            qos: &mut qos,
            shutdown: &loop_shutdown,
            heartbeat: config.heartbeat(),
        };
        let exit = run_consumer_loop(ctx, Some(&mut hub as &mut dyn Hub), config.mode, config.drain_timeout());
        lifecycle.set(BlueprintState::Close);
        (exit, worker.stats())
    })
    .await?;

    let (exit, stats) = result;
    tracing::info!(
        received = stats.received,
        succeeded = stats.succeeded,
        failed = stats.failed,
        "Worker finished"
    );

    match exit {
        Ok(LoopExit::Graceful(reason)) => {
            tracing::info!(?reason, "Worker stopped");
            Ok(ExitCode::SUCCESS)
        }
        Ok(LoopExit::Terminated) => {
            tracing::warn!("Worker terminated");
            Ok(ExitCode::from(2))
        }
        Err(e) => {
            tracing::error!("Worker failed: {}", e);
            Ok(ExitCode::FAILURE)
        }
    }
}
