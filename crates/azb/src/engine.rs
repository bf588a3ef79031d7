//! 🎬 *[camera pans across a dimly lit server room]*
//! 🎬 "In a world where log lines arrive one at a time..."
//! 🎬 "One coordinator dared to batch them all."
//! 🎬 *[record scratch]* 🦆
//!
//! 🧠 The batching engine. One task owns the map of open batches and nobody else
//! ever touches it: no locks, just a `select!` over four things that can happen:
//!
//! 1. 🛑 shutdown → fold in whatever is still queued, flush everything, wait, exit
//! 2. ⏱️ tick → flush every batch at least `batch_wait` old
//! 3. 📥 record → append to its batch, or (if the batch is already over the size
//!    limit) flush the old batch and start a new one with this record
//! 4. 🧹 a flush task finished → reap it
//!
//! Flushes run as their own tasks in a `JoinSet`. The batch bytes are moved into the
//! task at dispatch, so the coordinator can't touch them afterwards even if it wanted to.
//!
//! ⚠️ Shutdown waits for every flush, including all of its retries. With
//! `retry_limit = "unlimited"` and a dead endpoint, that's forever. Pick a limit.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_channel::{Receiver, Sender};
use tokio::sync::{Mutex, watch};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, trace};

use crate::app_config::EngineConfig;
use crate::backends::BlobSink;
use crate::common::{Batch, Record};
use crate::retry::RetryExecutor;

mod flusher;
mod stats;
#[cfg(test)]
pub(crate) mod test_support;

use flusher::Flusher;
use stats::FlushStats;
pub use stats::FlushStatsSnapshot;

/// 🧠 The public face of the engine: a mailbox for records and a big red shutdown button.
///
/// Cheap to share behind an `Arc`; every method takes `&self`.
#[derive(Debug)]
pub struct BatchingEngine {
    intake: Sender<Record>,
    shutdown_signal: watch::Sender<bool>,
    coordinator: Mutex<Option<JoinHandle<()>>>,
    stats: Arc<FlushStats>,
}

impl BatchingEngine {
    /// 🚀 Build the engine and spawn its coordinator on the current tokio runtime.
    pub fn new(config: EngineConfig, sink: Arc<dyn BlobSink>) -> Self {
        let retry = RetryExecutor::new(config.retry_initial_backoff());
        Self::with_retry_executor(config, sink, retry)
    }

    /// 🎲 Same as [`BatchingEngine::new`], with the retry executor (and its dice) supplied.
    pub fn with_retry_executor(
        config: EngineConfig,
        sink: Arc<dyn BlobSink>,
        retry: RetryExecutor,
    ) -> Self {
        let hostname = config.hostname.clone().unwrap_or_else(local_hostname);
        let stats = Arc::new(FlushStats::default());
        let flusher = Arc::new(Flusher::new(&config, hostname, retry, sink, stats.clone()));

        let (intake, intake_rx) = async_channel::bounded(config.intake_capacity.max(1));
        let (shutdown_signal, shutdown_rx) = watch::channel(false);

        let coordinator = Coordinator {
            open_batches: HashMap::new(),
            intake: intake_rx,
            shutdown: shutdown_rx,
            in_flight: JoinSet::new(),
            flusher,
            stats: stats.clone(),
            batch_wait: config.batch_wait(),
            batch_limit_size: config.batch_limit_size,
            check_interval: config.check_interval(),
        };
        info!(
            "🚀 batching engine up: wait={:?} limit={} bytes store_as={:?}",
            config.batch_wait(),
            config.batch_limit_size,
            config.store_as
        );
        let handle = tokio::spawn(coordinator.run());

        Self {
            intake,
            shutdown_signal,
            coordinator: Mutex::new(Some(handle)),
            stats,
        }
    }

    /// 📥 Hand a record to the engine. Waits while the intake queue is full; that wait is
    /// the backpressure. Fails only once the engine has been shut down.
    pub async fn submit(
        &self,
        time_slice: impl Into<String>,
        payload: impl Into<Vec<u8>>,
    ) -> Result<()> {
        self.intake
            .send(Record::new(time_slice, payload))
            .await
            .map_err(|_| anyhow!("💀 the batching engine is shut down; the record was not accepted"))
    }

    /// 🛑 Stop accepting records, flush every open batch, and wait until each flush has
    /// run its course. Calling it again (or concurrently) waits for the first call and
    /// does nothing else.
    pub async fn shutdown(&self) -> Result<()> {
        let mut coordinator = self.coordinator.lock().await;
        // -- the handle stays in the slot until it resolves, so a cancelled call leaves
        // -- the next caller something to wait on
        let Some(handle) = coordinator.as_mut() else {
            return Ok(());
        };
        self.shutdown_signal.send_replace(true);
        let joined = handle.await;
        *coordinator = None;
        joined.context("💀 the coordinator task died before it could finish flushing")?;
        info!("🏁 batching engine stopped: {:?}", self.stats.snapshot());
        Ok(())
    }

    pub fn stats(&self) -> FlushStatsSnapshot {
        self.stats.snapshot()
    }
}

/// 🏠 The machine's name, or "localhost" if the kernel is being shy.
fn local_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .unwrap_or_else(|| "localhost".to_string())
}

/// 🔒 The single owner of every open batch.
struct Coordinator {
    open_batches: HashMap<String, Batch>,
    intake: Receiver<Record>,
    shutdown: watch::Receiver<bool>,
    in_flight: JoinSet<()>,
    flusher: Arc<Flusher>,
    stats: Arc<FlushStats>,
    batch_wait: Duration,
    batch_limit_size: usize,
    check_interval: Duration,
}

impl Coordinator {
    async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                // -- Err means the engine handle is gone. Same outcome as an explicit shutdown.
                _ = self.shutdown.changed() => break,
                _ = ticker.tick() => self.flush_expired(),
                received = self.intake.recv() => match received {
                    Ok(record) => self.accept(record),
                    Err(_) => break,
                },
                Some(joined) = self.in_flight.join_next(), if !self.in_flight.is_empty() => {
                    reap(joined);
                }
            }
        }

        self.drain_and_flush_everything().await;
    }

    fn accept(&mut self, record: Record) {
        self.stats.record_received();
        let Record {
            time_slice,
            payload,
        } = record;

        match self.open_batches.entry(time_slice) {
            Entry::Vacant(slot) => {
                trace!("🆕 new batch for time_slice={}", slot.key());
                slot.insert(Batch::new(payload));
            }
            Entry::Occupied(mut slot) if slot.get().len() <= self.batch_limit_size => {
                slot.get_mut().append(&payload);
            }
            Entry::Occupied(slot) => {
                // -- the full batch goes out as-is; this record starts the next one
                let (time_slice, full_batch) = slot.remove_entry();
                debug!(
                    "📏 max size reached for time_slice={} ({} bytes), sending batch",
                    time_slice,
                    full_batch.len()
                );
                self.dispatch(time_slice.clone(), full_batch);
                self.open_batches.insert(time_slice, Batch::new(payload));
            }
        }
    }

    fn flush_expired(&mut self) {
        let now = Instant::now();
        let expired: Vec<String> = self
            .open_batches
            .iter()
            .filter(|(_, batch)| batch.is_expired(now, self.batch_wait))
            .map(|(time_slice, _)| time_slice.clone())
            .collect();

        for time_slice in expired {
            if let Some(batch) = self.open_batches.remove(&time_slice) {
                debug!(
                    "⏱️ max wait reached for time_slice={}, sending batch",
                    time_slice
                );
                self.dispatch(time_slice, batch);
            }
        }
    }

    /// 🚚 Ownership of the bytes moves into the task right here.
    fn dispatch(&mut self, time_slice: String, batch: Batch) {
        let flusher = self.flusher.clone();
        self.in_flight.spawn(async move {
            flusher.flush(time_slice, batch.buffer).await;
        });
    }

    async fn drain_and_flush_everything(mut self) {
        // 🚪 close the door, then let in whoever was already standing in the doorway
        self.intake.close();
        while let Ok(record) = self.intake.try_recv() {
            self.accept(record);
        }

        info!(
            "🛑 shutting down: flushing {} open batches ({} flushes already in flight)",
            self.open_batches.len(),
            self.in_flight.len()
        );
        let remaining: Vec<(String, Batch)> = self.open_batches.drain().collect();
        for (time_slice, batch) in remaining {
            self.dispatch(time_slice, batch);
        }

        while let Some(joined) = self.in_flight.join_next().await {
            reap(joined);
        }
    }
}

fn reap(joined: Result<(), JoinError>) {
    if let Err(err) = joined {
        error!("💀 a flush task died without finishing: {err}");
    }
}
