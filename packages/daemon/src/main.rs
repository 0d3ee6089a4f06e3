//! `compactord`: run the coordinator over a set of targets and stream its
//! events to stdout as JSON lines.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use actors::{
    BlockingEngine, EngineAdapter, EventEmitter, StoreCodec, StubEngine, set_default_emitter,
    start_coordinator,
};
use anyhow::Context;
use clap::{Parser, ValueEnum};
use compactor_core::{CoordinatorConfig, EventFilter, JobConfig, JobKind, Priority};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "compactord", about = "Compression job coordinator")]
struct Cli {
    /// Path to a TOML config file (defaults are used when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Engine that executes jobs
    #[arg(long, value_enum, default_value_t = EngineKind::Stub)]
    engine: EngineKind,

    /// What to do with each target
    #[arg(long, value_enum, default_value_t = KindArg::Compress)]
    kind: KindArg,

    /// Priority for every submitted job (low, normal, high, critical)
    #[arg(short, long, default_value = "normal")]
    priority: Priority,

    /// Compression level (1-9)
    #[arg(short, long)]
    level: Option<u8>,

    /// Capability to request instead of the one implied by --kind
    #[arg(long)]
    capability: Option<String>,

    /// Per-job timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Polls a stub run takes to finish
    #[arg(long, default_value_t = 20)]
    stub_steps: u32,

    /// Files to process
    #[arg(required = true)]
    targets: Vec<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
enum EngineKind {
    /// Simulated runs, no file access
    Stub,
    /// Stream targets through the store codec
    Store,
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Compress,
    Decompress,
    Verify,
}

impl From<KindArg> for JobKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Compress => JobKind::Compress,
            KindArg::Decompress => JobKind::Decompress,
            KindArg::Verify => JobKind::Verify,
        }
    }
}

async fn load_config(path: Option<&Path>) -> anyhow::Result<CoordinatorConfig> {
    let config: CoordinatorConfig = match path {
        Some(path) => {
            let raw = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
            toml::from_str(&raw)
                .with_context(|| format!("Invalid config file '{}'", path.display()))?
        }
        None => CoordinatorConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

impl Cli {
    fn job_config(&self, target: &Path) -> JobConfig {
        let mut config = JobConfig::new(self.kind.into(), target);
        if let Some(level) = self.level {
            config = config.with_level(level);
        }
        if let Some(capability) = &self.capability {
            config = config.with_capability(capability.clone());
        }
        if let Some(timeout) = self.timeout {
            config = config.with_timeout(timeout);
        }
        config
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries the event stream.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref()).await?;

    let emitter = Arc::new(EventEmitter::from_config(&config.events));
    set_default_emitter(emitter.clone());
    let (_, mut events) = emitter.subscribe_channel(EventFilter::all());

    let engine: Arc<dyn EngineAdapter> = match cli.engine {
        EngineKind::Stub => Arc::new(StubEngine::new(cli.stub_steps)),
        EngineKind::Store => Arc::new(BlockingEngine::new(StoreCodec)?),
    };
    let coordinator = start_coordinator(config, engine).await?;
    let queue = coordinator.queue();

    let mut outstanding = HashSet::new();
    for target in &cli.targets {
        match queue.submit(cli.job_config(target), cli.priority).await {
            Ok(job_id) => {
                outstanding.insert(job_id);
            }
            Err(e) => tracing::error!("Rejected {}: {}", target.display(), e),
        }
    }

    while !outstanding.is_empty() {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    break;
                };
                println!("{}", serde_json::to_string(&event)?);
                if event.kind.is_terminal()
                    && let Some(job_id) = event.job_id()
                {
                    outstanding.remove(&job_id);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, cancelling {} jobs", outstanding.len());
                break;
            }
        }
    }

    let stats = queue.stats().await?;
    tracing::info!(
        "Done: {} completed, {} failed, {} cancelled",
        stats.completed,
        stats.failed,
        stats.cancelled
    );
    coordinator.shutdown().await?;

    // Cancellations published during shutdown.
    while let Ok(event) = events.try_recv() {
        println!("{}", serde_json::to_string(&event)?);
    }

    if stats.failed > 0 {
        anyhow::bail!("{} jobs failed", stats.failed);
    }
    Ok(())
}
