use anyhow::Context;
use clap::Parser;
use meter_queue_core::TaskFactory;
use meter_queue_engine::{EngineMetrics, NormalQueue, PriorityQueue, TaskExecutor, TaskScheduler};
use meter_queue_server::{Ingestor, MessageInterpreter, ServerConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, BufReader};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "meter-queue")]
#[command(about = "Schedules and executes utility metering tasks", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Newline-delimited JSON envelopes (stdin if omitted)
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Stop after this many executor cycles
    #[arg(long)]
    max_cycles: Option<u64>,

    /// Executions allowed per task before it is retired
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Seconds a normal task may wait before it is boosted
    #[arg(long)]
    boost_threshold: Option<u64>,

    /// Print Prometheus metrics on exit
    #[arg(long)]
    metrics: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = match &args.config {
        Some(path) => ServerConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => ServerConfig::default(),
    };

    // Override with CLI args
    if let Some(input) = args.input {
        config.input = Some(input);
    }
    if let Some(max_attempts) = args.max_attempts {
        config.engine.executor.max_attempts = max_attempts;
    }
    if let Some(threshold) = args.boost_threshold {
        config.engine.executor.priority_boost_threshold_secs = threshold;
    }
    config.validate()?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let metrics = Arc::new(EngineMetrics::new()?);
    let normal = Arc::new(NormalQueue::new(config.engine.queues.normal_capacity));
    let priority = Arc::new(PriorityQueue::new(config.engine.queues.priority_capacity));

    let scheduler = TaskScheduler::new(Arc::clone(&normal), Arc::clone(&priority))
        .with_metrics(Arc::clone(&metrics));
    let executor = Arc::new(
        TaskExecutor::new(
            Arc::clone(&normal),
            Arc::clone(&priority),
            &config.engine.executor,
        )
        .with_metrics(Arc::clone(&metrics)),
    );
    let factory = TaskFactory::default();
    tracing::info!("Registered task kinds: {:?}", factory.registry().kinds());
    let interpreter = MessageInterpreter::new(factory);

    tracing::info!(
        normal_capacity = normal.capacity(),
        priority_capacity = priority.capacity(),
        max_attempts = config.engine.executor.max_attempts,
        "Starting meter queue"
    );

    // Handle shutdown signals
    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Received shutdown signal");
        signal_token.cancel();
    });

    // Execute while the input is still streaming in
    let handle = Arc::clone(&executor).spawn(args.max_cycles);

    let reader = open_input(&config).await?;
    let ingestor = Ingestor::new(&interpreter, &scheduler);
    let report = tokio::select! {
        report = ingestor.ingest(reader) => report.context("Failed to read input")?,
        _ = shutdown.cancelled() => Default::default(),
    };
    tracing::info!(?report, "Ingestion finished");

    let mut summary = handle.stop().await?;

    // Drain what is left unless interrupted or out of cycles
    let remaining = args.max_cycles.map(|max| max.saturating_sub(summary.cycles));
    if remaining != Some(0) && !shutdown.is_cancelled() {
        summary += executor.drain(remaining, shutdown.clone()).await;
    }

    tracing::info!(
        ?summary,
        pending_normal = normal.len(),
        pending_priority = priority.len(),
        "Meter queue stopped"
    );

    if args.metrics {
        print!("{}", metrics.render()?);
    }

    Ok(())
}

async fn open_input(
    config: &ServerConfig,
) -> anyhow::Result<Box<dyn AsyncBufRead + Unpin + Send>> {
    match &config.input {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("Failed to open input {}", path.display()))?;
            Ok(Box::new(BufReader::new(file)))
        }
        None => Ok(Box::new(BufReader::new(tokio::io::stdin()))),
    }
}
