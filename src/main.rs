//! vimc-rs - Main Entry Point
//!
//! Builds the configured topology, streams a number of frames from one
//! capture endpoint and reports what arrived.

use anyhow::{bail, Context};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};
use vimc_rs::{
    config::{self, LoggingConfig},
    pipeline::{BufferState, TickMode},
    EntityRegistry, MediaGraph, SimConfig, TopologyBuilder, VideoNode,
};

#[derive(Debug, Parser)]
#[command(name = "vimc-rs", version, about = "Virtual media controller pipeline simulator")]
struct Args {
    /// Configuration file (defaults to the platform config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Capture endpoint to stream from
    #[arg(short, long, default_value = "RGB/YUV Capture")]
    endpoint: String,

    /// Number of frames to capture
    #[arg(short = 'n', long, default_value_t = 30)]
    frames: u32,

    /// Number of buffers to queue
    #[arg(short, long, default_value_t = 4)]
    buffers: usize,

    /// Print the topology as JSON and exit
    #[arg(long)]
    dump_topology: bool,

    /// Write the effective configuration to this path and exit
    #[arg(long)]
    write_config: Option<PathBuf>,
}

fn init_logging(logging: &LoggingConfig) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.filter))
    };

    let (file_layer, guard) = match &logging.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {:?}", dir))?;
            let appender = tracing_appender::rolling::never(dir, "vimc-rs.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(filter());
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_filter(filter()))
        .with(file_layer)
        .init();

    Ok(guard)
}

fn load_config(args: &Args) -> anyhow::Result<SimConfig> {
    match &args.config {
        Some(path) => SimConfig::load(path)
            .with_context(|| format!("Failed to load config {:?}", path)),
        None => Ok(config::default_config_path()
            .filter(|p| p.exists())
            .map(SimConfig::load_or_default)
            .unwrap_or_default()),
    }
}

fn run_capture(graph: &Arc<MediaGraph>, args: &Args) -> anyhow::Result<()> {
    let node = VideoNode::open_by_name(graph.clone(), &args.endpoint)
        .with_context(|| format!("Cannot open endpoint '{}'", args.endpoint))?;
    graph
        .sync_formats(node.entity())
        .context("Failed to propagate formats")?;

    let format = node.format()?;
    tracing::info!(
        "Streaming {} frames of {}x{} {} from '{}'",
        args.frames,
        format.width,
        format.height,
        format.pixelformat,
        node.name()
    );

    for buffer in node.request_buffers(args.buffers) {
        node.queue(buffer)?;
    }
    node.stream_on().context("Failed to start streaming")?;

    let manual = TickMode::from_rate(graph.params().frame_rate_hz) == TickMode::Manual;
    let timeout = Duration::from_secs(2);
    let mut received = 0u32;
    let mut errors = 0u32;
    while received < args.frames {
        if manual {
            node.trigger()?;
        }
        let Some(buffer) = node.dequeue(timeout)? else {
            node.stream_off();
            bail!("No frame within {:?} after {} frames", timeout, received);
        };
        match buffer.state() {
            BufferState::Done => tracing::debug!(
                "Buffer {} seq {} {} bytes at {:?}",
                buffer.index(),
                buffer.sequence,
                buffer.bytes_used,
                buffer.timestamp
            ),
            state => {
                errors += 1;
                tracing::warn!("Buffer {} completed as {:?}", buffer.index(), state);
            }
        }
        received += 1;
        node.queue(buffer)?;
    }
    node.stream_off();

    let stats = node.queue_stats();
    println!(
        "{}: {} frames, {} errors, {} submitted, {} starved",
        node.name(),
        received,
        errors,
        stats.submitted,
        stats.starved
    );
    for id in graph.entity_ids() {
        let slot = graph.slot(id)?;
        let entity_stats = slot.stats();
        println!(
            "  {:<20} processed {:>6} dropped {:>6}",
            slot.name, entity_stats.frames_processed, entity_stats.frames_dropped
        );
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;
    let _log_guard = init_logging(&config.logging)?;

    tracing::info!("Starting vimc-rs");

    if let Some(path) = &args.write_config {
        config
            .save(path)
            .with_context(|| format!("Failed to write config {:?}", path))?;
        println!("Wrote configuration to {}", path.display());
        return Ok(());
    }

    let graph = Arc::new(MediaGraph::new(config.pipeline.entity_params()));
    let registry = EntityRegistry::with_builtins();
    TopologyBuilder::new(&registry)
        .build(&graph, &config.topology)
        .context("Failed to build topology")?;

    if args.dump_topology {
        let snapshot = serde_json::to_string_pretty(&graph.snapshot())?;
        println!("{}", snapshot);
        return Ok(());
    }

    let result = run_capture(&graph, &args);
    graph.stop_all();
    tracing::info!("Shutting down...");
    result
}
