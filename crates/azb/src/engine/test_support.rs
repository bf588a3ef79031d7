//! 🧪 Sinks that misbehave on purpose, for tests that need the network to be rude.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use crate::backends::{BlobSink, InMemorySink};

/// 🎭 An in-memory sink with stage fright: can fail the first N uploads or container
/// checks, hang on the first of either, or refuse any key containing a marker forever.
#[derive(Debug, Default)]
pub(crate) struct FlakySink {
    pub vault: InMemorySink,
    failures_left: AtomicU64,
    hang_first_upload: AtomicBool,
    ensure_failures_left: AtomicU64,
    hang_first_ensure: AtomicBool,
    doomed_marker: Option<String>,
    upload_calls: AtomicU64,
    ensure_calls: AtomicU64,
}

impl FlakySink {
    pub(crate) fn failing_first(failures: u64) -> Self {
        Self {
            failures_left: AtomicU64::new(failures),
            ..Self::default()
        }
    }

    pub(crate) fn hanging_first() -> Self {
        Self {
            hang_first_upload: AtomicBool::new(true),
            ..Self::default()
        }
    }

    pub(crate) fn ensure_failing_first(failures: u64) -> Self {
        Self {
            ensure_failures_left: AtomicU64::new(failures),
            ..Self::default()
        }
    }

    pub(crate) fn ensure_hanging_first() -> Self {
        Self {
            hang_first_ensure: AtomicBool::new(true),
            ..Self::default()
        }
    }

    pub(crate) fn dooming(marker: &str) -> Self {
        Self {
            doomed_marker: Some(marker.to_string()),
            ..Self::default()
        }
    }

    pub(crate) fn upload_calls(&self) -> u64 {
        self.upload_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn ensure_calls(&self) -> u64 {
        self.ensure_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BlobSink for FlakySink {
    async fn ensure_container(&self) -> Result<()> {
        self.ensure_calls.fetch_add(1, Ordering::SeqCst);
        if self.hang_first_ensure.swap(false, Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if take_one(&self.ensure_failures_left) {
            anyhow::bail!("💀 container check: 500 Internal Server Error (simulated)");
        }
        Ok(())
    }

    async fn upload(&self, object_key: &str, data: Vec<u8>) -> Result<()> {
        self.upload_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(marker) = &self.doomed_marker {
            if object_key.contains(marker.as_str()) {
                anyhow::bail!("💀 '{object_key}' is doomed");
            }
        }
        if self.hang_first_upload.swap(false, Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if take_one(&self.failures_left) {
            anyhow::bail!("💀 503 Service Unavailable (simulated)");
        }
        self.vault.upload(object_key, data).await
    }
}

/// 🎟️ Spend one ticket if any are left.
fn take_one(tickets: &AtomicU64) -> bool {
    tickets
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
        .is_ok()
}
