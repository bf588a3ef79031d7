//! 📊 Flush bookkeeping — "did it work?" answered with four atomic integers.

use std::sync::atomic::{AtomicU64, Ordering};

/// 📊 Counters shared between the coordinator and every flush task.
#[derive(Debug, Default)]
pub(crate) struct FlushStats {
    records_received: AtomicU64,
    batches_flushed: AtomicU64,
    batches_failed: AtomicU64,
    bytes_uploaded: AtomicU64,
}

impl FlushStats {
    pub(crate) fn record_received(&self) {
        self.records_received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn batch_flushed(&self, uploaded_bytes: usize) {
        self.batches_flushed.fetch_add(1, Ordering::Relaxed);
        self.bytes_uploaded
            .fetch_add(uploaded_bytes as u64, Ordering::Relaxed);
    }

    pub(crate) fn batch_failed(&self) {
        self.batches_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> FlushStatsSnapshot {
        FlushStatsSnapshot {
            records_received: self.records_received.load(Ordering::Relaxed),
            batches_flushed: self.batches_flushed.load(Ordering::Relaxed),
            batches_failed: self.batches_failed.load(Ordering::Relaxed),
            bytes_uploaded: self.bytes_uploaded.load(Ordering::Relaxed),
        }
    }
}

/// 📸 A point-in-time copy of the engine's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushStatsSnapshot {
    /// 📥 records accepted by the coordinator
    pub records_received: u64,
    /// ✅ batches that made it to the sink
    pub batches_flushed: u64,
    /// 💀 batches dropped after the retry budget ran out
    pub batches_failed: u64,
    /// 📦 bytes handed to the sink, after compression
    pub bytes_uploaded: u64,
}
