//! 🚚 The flusher — one batch in, one blob out (or one very apologetic log line).
//!
//! Per batch: render the object key once, then inside the retried operation compress,
//! ensure the container (if asked), and upload under the per-attempt deadline. When
//! the retry budget is gone, the batch is logged with its key and dropped. There is no
//! dead-letter queue. There is only the log line.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error};

use super::stats::FlushStats;
use crate::app_config::EngineConfig;
use crate::backends::BlobSink;
use crate::compression::CompressionMode;
use crate::object_key::ObjectKeyFormatter;
use crate::retry::RetryExecutor;

/// 🚚 Everything a flush task needs, bundled and shared read-only behind an `Arc`.
#[derive(Debug)]
pub(crate) struct Flusher {
    formatter: ObjectKeyFormatter,
    store_as: CompressionMode,
    retry: RetryExecutor,
    retry_limit: Option<u64>,
    auto_create_container: bool,
    upload_timeout: Duration,
    sink: Arc<dyn BlobSink>,
    stats: Arc<FlushStats>,
}

impl Flusher {
    pub(crate) fn new(
        config: &EngineConfig,
        hostname: String,
        retry: RetryExecutor,
        sink: Arc<dyn BlobSink>,
        stats: Arc<FlushStats>,
    ) -> Self {
        Self {
            formatter: ObjectKeyFormatter::new(config.object_key_format.clone(), hostname),
            store_as: config.store_as,
            retry,
            retry_limit: config.retry_limit,
            auto_create_container: config.auto_create_container,
            upload_timeout: config.upload_timeout(),
            sink,
            stats,
        }
    }

    /// 🚀 Flush one batch. Never returns an error: the outcome is logged and counted.
    pub(crate) async fn flush(&self, time_slice: String, raw: Vec<u8>) {
        let object_key = self.formatter.render(&time_slice);
        debug!("📤 upload blob={} size={} bytes", object_key, raw.len());

        let key = object_key.as_str();
        let bytes = raw.as_slice();
        let outcome = self
            .retry
            .run(self.retry_limit, move |attempt| {
                self.attempt(key, bytes, attempt)
            })
            .await;

        match outcome {
            Ok(uploaded_bytes) => self.stats.batch_flushed(uploaded_bytes),
            Err(err) => {
                let reason = format!("{err:#}");
                error!(
                    blob = %object_key,
                    error = %reason,
                    "💀 retry limit reached, dropping batch"
                );
                self.stats.batch_failed();
            }
        }
    }

    /// 🎯 One try: compress a fresh copy, check the container, upload, all under one deadline.
    async fn attempt(&self, object_key: &str, raw: &[u8], attempt: u64) -> Result<usize> {
        let compressed = self
            .store_as
            .compress(raw)
            .with_context(|| format!("💀 compressing '{object_key}' failed on attempt {}", attempt + 1))?;
        let uploaded_bytes = compressed.len();

        let upload = async {
            if self.auto_create_container {
                self.sink
                    .ensure_container()
                    .await
                    .context("💀 the container could not be made to exist")?;
            }
            self.sink.upload(object_key, compressed).await
        };

        // ⏰ dropping the future on timeout is the cancellation
        tokio::time::timeout(self.upload_timeout, upload)
            .await
            .map_err(|_| {
                anyhow!(
                    "💀 upload of '{}' timed out after {:?} on attempt {}",
                    object_key,
                    self.upload_timeout,
                    attempt + 1
                )
            })??;

        Ok(uploaded_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::test_support::FlakySink;

    fn flusher_over(
        sink: Arc<dyn BlobSink>,
        retry_limit: Option<u64>,
    ) -> (Flusher, Arc<FlushStats>) {
        let config = EngineConfig {
            retry_limit,
            store_as: CompressionMode::None,
            object_key_format: "%{hostname}/%{time_slice}.log".to_string(),
            upload_timeout_ms: 500,
            ..EngineConfig::default()
        };
        let stats = Arc::new(FlushStats::default());
        let flusher = Flusher::new(
            &config,
            "box-1".to_string(),
            RetryExecutor::with_seed(Duration::from_millis(100), 5),
            sink,
            stats.clone(),
        );
        (flusher, stats)
    }

    #[tokio::test(start_paused = true)]
    async fn the_one_where_the_key_is_rendered_once_for_every_attempt() {
        let the_flake = Arc::new(FlakySink::failing_first(1));
        let (flusher, stats) = flusher_over(the_flake.clone(), Some(2));

        flusher.flush("2024".to_string(), b"hello".to_vec()).await;

        assert_eq!(the_flake.upload_calls(), 2);
        assert_eq!(the_flake.ensure_calls(), 2, "💀 auto-create is on by default");
        let objects = the_flake.vault.objects().await;
        assert_eq!(objects, vec![("box-1/2024.log".to_string(), b"hello".to_vec())]);
        assert_eq!(stats.snapshot().batches_flushed, 1);
        assert_eq!(stats.snapshot().bytes_uploaded, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn the_one_where_the_budget_is_spent_and_the_batch_is_dropped() {
        let the_flake = Arc::new(FlakySink::failing_first(10));
        let (flusher, stats) = flusher_over(the_flake.clone(), Some(2));

        flusher.flush("2024".to_string(), b"gone".to_vec()).await;

        assert_eq!(the_flake.upload_calls(), 3);
        assert!(the_flake.vault.objects().await.is_empty());
        assert_eq!(stats.snapshot().batches_failed, 1);
        assert_eq!(stats.snapshot().batches_flushed, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn the_one_where_the_deadline_covers_a_hung_attempt() {
        let the_flake = Arc::new(FlakySink::hanging_first());
        let (flusher, stats) = flusher_over(the_flake.clone(), Some(0));

        let started = tokio::time::Instant::now();
        flusher.flush("2024".to_string(), b"stuck".to_vec()).await;
        assert_eq!(stats.snapshot().batches_failed, 1);

        let waited = started.elapsed();
        assert!(waited >= Duration::from_millis(500), "💀 gave up early: {waited:?}");
        assert!(waited < Duration::from_secs(1), "💀 the hang leaked through: {waited:?}");
        assert_eq!(the_flake.upload_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn the_one_where_a_grumpy_container_check_is_retried_with_the_upload() {
        let the_flake = Arc::new(FlakySink::ensure_failing_first(2));
        let (flusher, stats) = flusher_over(the_flake.clone(), Some(3));

        flusher.flush("2024".to_string(), b"eventually".to_vec()).await;

        assert_eq!(the_flake.ensure_calls(), 3);
        assert_eq!(the_flake.upload_calls(), 1, "💀 no upload until the container check passes");
        let objects = the_flake.vault.objects().await;
        assert_eq!(objects, vec![("box-1/2024.log".to_string(), b"eventually".to_vec())]);
        assert_eq!(stats.snapshot().batches_flushed, 1);
        assert_eq!(stats.snapshot().batches_failed, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn the_one_where_a_hung_container_check_eats_the_attempt_deadline() {
        let the_flake = Arc::new(FlakySink::ensure_hanging_first());
        let (flusher, stats) = flusher_over(the_flake.clone(), Some(1));

        let started = tokio::time::Instant::now();
        flusher.flush("2024".to_string(), b"late".to_vec()).await;

        assert!(started.elapsed() >= Duration::from_millis(500), "💀 the deadline was skipped");
        assert_eq!(the_flake.ensure_calls(), 2);
        assert_eq!(the_flake.upload_calls(), 1);
        assert_eq!(the_flake.vault.objects().await.len(), 1);
        assert_eq!(stats.snapshot().batches_flushed, 1);
    }
}
