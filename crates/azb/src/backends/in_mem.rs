//! # Previously, on azb...
//!
//! 🎬 The batches were ready. The blob store was... a `Vec`. Nobody told the batches.
//!
//! `in_mem` provides an in-memory [`BlobSink`] for testing and local development.
//! [`InMemorySink`] keeps every uploaded object behind an `Arc<Mutex<...>>` so callers
//! can clone a handle before giving the sink away, then peek inside afterwards —
//! great for assertions, great for trust issues, great for both.
//!
//! ⚠️ This is NOT for production. Everything here evaporates when the process does.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::backends::BlobSink;

/// 📦 A sink that never forgets (until the process exits).
///
/// Clone-able because tests need to peek inside after handing a clone to the engine.
/// The `Arc`s mean every clone shares the same vault.
#[derive(Debug, Default, Clone)]
pub struct InMemorySink {
    /// 🔒 Every `(object_key, bytes)` pair, in upload order.
    received: Arc<Mutex<Vec<(String, Vec<u8>)>>>,
    /// 🏗️ How many times someone asked us to make sure the container exists.
    ensure_calls: Arc<AtomicU64>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// 📋 A snapshot of everything uploaded so far.
    pub async fn objects(&self) -> Vec<(String, Vec<u8>)> {
        self.received.lock().await.clone()
    }

    pub fn ensure_calls(&self) -> u64 {
        self.ensure_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BlobSink for InMemorySink {
    /// 🏗️ The container is a Vec. It always exists. We count the question anyway.
    async fn ensure_container(&self) -> Result<()> {
        self.ensure_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn upload(&self, object_key: &str, data: Vec<u8>) -> Result<()> {
        // 🔒 The Mutex is load-bearing: many flush tasks push at once.
        self.received.lock().await.push((object_key.to_string(), data));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn the_one_where_clones_share_the_same_vault() -> Result<()> {
        let the_original = InMemorySink::new();
        let the_clone = the_original.clone();

        the_clone.upload("one", b"1".to_vec()).await?;
        the_clone.upload("two", b"2".to_vec()).await?;
        the_clone.ensure_container().await?;

        let seen = the_original.objects().await;
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].0, "one");
        assert_eq!(seen[1].1, b"2".to_vec());
        assert_eq!(the_original.ensure_calls(), 1);
        Ok(())
    }
}
