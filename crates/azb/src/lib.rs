//! 🚀 azb — batch log lines by time slice, squeeze them, and park them in blob storage.
//!
//! 🎬 *[narrator voice]* "Records go in. Blobs come out. You can't explain that."
//!
//! The moving parts, upstream to downstream:
//! - [`ingest::LineSource`] turns lines into [`Record`]s stamped with a time slice
//! - [`BatchingEngine`] groups records per time slice and decides when a batch is done
//! - the flusher (inside the engine) compresses, names, retries and uploads
//! - a [`backends::BlobSink`] does the actual I/O
//!
//! 🦆

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

pub mod app_config;
pub mod backends;
mod common;
pub mod compression;
mod engine;
pub mod ingest;
pub mod object_key;
pub mod retry;

pub use common::Record;
pub use engine::{BatchingEngine, FlushStatsSnapshot};

use app_config::AppConfig;
use backends::{BlobSink, SinkBackend};
use ingest::LineSource;

/// 📊 What a run did, for the humans at the end of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub records_read: u64,
    pub stats: FlushStatsSnapshot,
}

/// 🚀 Build the sink and the engine, pump every record from the configured source
/// through them, then shut down and report.
pub async fn run(app_config: AppConfig) -> Result<RunSummary> {
    let sink = SinkBackend::from_config(&app_config.sink_config)
        .context("💀 couldn't build the sink from sink_config")?;
    let source = LineSource::open(&app_config.ingest)
        .await
        .context("💀 couldn't open the record source")?;
    let engine = BatchingEngine::new(app_config.engine, Arc::new(sink));
    pump(source, engine).await
}

/// 🔁 Source → engine until EOF, then shutdown. The shutdown happens even if reading fails.
async fn pump(mut source: LineSource, engine: BatchingEngine) -> Result<RunSummary> {
    let mut records_read = 0u64;
    let read_outcome: Result<()> = async {
        while let Some(record) = source.next_record().await? {
            engine.submit(record.time_slice, record.payload).await?;
            records_read += 1;
        }
        Ok(())
    }
    .await;

    engine
        .shutdown()
        .await
        .context("💀 the engine did not shut down cleanly")?;
    read_outcome.context("💀 reading records stopped early; what was read has been flushed")?;

    let summary = RunSummary {
        records_read,
        stats: engine.stats(),
    };
    info!("🏁 run complete: {:?}", summary);
    Ok(summary)
}

/// 🧪 Wire an arbitrary sink, for callers that bring their own `BlobSink`.
pub async fn run_with_sink(
    app_config: AppConfig,
    sink: Arc<dyn BlobSink>,
) -> Result<RunSummary> {
    let source = LineSource::open(&app_config.ingest)
        .await
        .context("💀 couldn't open the record source")?;
    pump(source, BatchingEngine::new(app_config.engine, sink)).await
}
