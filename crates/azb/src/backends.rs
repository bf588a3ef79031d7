//! 🔌 Backends — where the bytes finally leave the building.
//!
//! 🕳️ A `BlobSink` knows two tricks: make sure the container exists, and put one
//! object into it. That's the whole contract. No buffering, no compression, no
//! retries, no opinions. The flusher upstream does the thinking; sinks do the I/O.
//!
//! 🎭 This module is the casting agency. Need a real Azure-style blob endpoint?
//! A directory on local disk? A Vec in RAM for tests? We've got a sink for that.
//!
//! 🦆 The duck is here because every file must have one. This is law.

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;

mod azblob;
mod file;
mod in_mem;

pub use azblob::{AzblobSink, AzblobSinkConfig};
pub use file::{FileSink, FileSinkConfig};
pub use in_mem::InMemorySink;

/// 🕳️ The narrow capability the flush pipeline needs from a blob store.
///
/// # Contract 📜
/// - `ensure_container` is idempotent. "Already exists" is a success, not a tantrum.
/// - `upload` writes one complete object under `object_key`. Called concurrently from many
///   flush tasks, hence `&self`: implementations must be safe to share.
/// - Neither method retries or times out on its own. That's the caller's job.
#[async_trait]
pub trait BlobSink: std::fmt::Debug + Send + Sync {
    /// 🏗️ Create the destination container if it isn't there yet.
    async fn ensure_container(&self) -> Result<()>;
    /// 📡 Store `data` at `object_key`. I/O only. No questions asked.
    async fn upload(&self, object_key: &str, data: Vec<u8>) -> Result<()>;
}

/// 🔧 Which sink to build, and how. Externally tagged, so the TOML reads
/// `[sink_config.Azblob]`, `[sink_config.File]`, or `sink_config = "InMemory"`.
#[derive(Debug, Deserialize, Clone)]
pub enum SinkConfig {
    InMemory,
    File(FileSinkConfig),
    Azblob(AzblobSinkConfig),
}

/// 🎭 The many faces of a sink — one enum, dispatching to whoever actually does the I/O.
///
/// The engine never needs to know whether the bytes land in Azure, on disk, or in a Vec.
/// Ignorance is a feature. It's called "abstraction."
#[derive(Debug)]
pub enum SinkBackend {
    InMemory(InMemorySink),
    File(FileSink),
    Azblob(AzblobSink),
}

impl SinkBackend {
    /// 🏗️ Build the configured sink. Only the HTTP one can fail here (client construction).
    pub fn from_config(config: &SinkConfig) -> Result<Self> {
        Ok(match config {
            SinkConfig::InMemory => SinkBackend::InMemory(InMemorySink::new()),
            SinkConfig::File(file_config) => SinkBackend::File(FileSink::new(file_config.clone())),
            SinkConfig::Azblob(azblob_config) => {
                SinkBackend::Azblob(AzblobSink::new(azblob_config.clone())?)
            }
        })
    }
}

#[async_trait]
impl BlobSink for SinkBackend {
    async fn ensure_container(&self) -> Result<()> {
        match self {
            SinkBackend::InMemory(sink) => sink.ensure_container().await,
            SinkBackend::File(sink) => sink.ensure_container().await,
            SinkBackend::Azblob(sink) => sink.ensure_container().await,
        }
    }

    async fn upload(&self, object_key: &str, data: Vec<u8>) -> Result<()> {
        match self {
            SinkBackend::InMemory(sink) => sink.upload(object_key, data).await,
            SinkBackend::File(sink) => sink.upload(object_key, data).await,
            SinkBackend::Azblob(sink) => sink.upload(object_key, data).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Wrapper {
        sink_config: SinkConfig,
    }

    #[test]
    fn the_one_where_every_sink_flavor_parses() {
        let in_mem: Wrapper = toml::from_str(r#"sink_config = "InMemory""#)
            .expect("💀 unit variant should parse from a bare string");
        assert!(matches!(in_mem.sink_config, SinkConfig::InMemory));

        let file: Wrapper = toml::from_str(
            r#"
            [sink_config.File]
            root_dir = "/tmp/blobs"
            "#,
        )
        .expect("💀 file sink config should parse");
        match file.sink_config {
            SinkConfig::File(cfg) => assert_eq!(cfg.root_dir, std::path::PathBuf::from("/tmp/blobs")),
            other => panic!("💀 expected File, serde took us to {other:?}"),
        }

        let azblob: Wrapper = toml::from_str(
            r#"
            [sink_config.Azblob]
            endpoint = "https://acct.blob.core.windows.net"
            container = "logs"
            "#,
        )
        .expect("💀 azblob sink config should parse");
        match azblob.sink_config {
            SinkConfig::Azblob(cfg) => {
                assert_eq!(cfg.container, "logs");
                assert_eq!(cfg.sas_token, None);
            }
            other => panic!("💀 expected Azblob, serde took us to {other:?}"),
        }
    }

    #[tokio::test]
    async fn the_one_where_the_enum_forwards_to_the_real_sink() -> Result<()> {
        let the_vault = InMemorySink::new();
        let backend = SinkBackend::InMemory(the_vault.clone());

        backend.ensure_container().await?;
        backend.upload("a/b.log", b"hello".to_vec()).await?;

        assert_eq!(the_vault.ensure_calls(), 1);
        assert_eq!(the_vault.objects().await, vec![("a/b.log".to_string(), b"hello".to_vec())]);
        Ok(())
    }
}
