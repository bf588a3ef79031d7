// ai
//! 📂 Previously, on "Things That Could Go Wrong With A Directory"...
//!
//! The blob store was down for maintenance. Or it was never up. Or you just wanted to
//! see what a batch looks like without paying egress. Enter the file sink: every object
//! key becomes a path under `root_dir`, slashes and all.
//!
//! 🚰 Flusher → FileSink → `root_dir/<object_key>`
//! 💀 Disk full → your problem now
//! 🦆 (mandatory, no notes)

use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::fs;
use tracing::trace;

use crate::backends::BlobSink;

// -- 📂 FileSinkConfig — lives next to the FileSink that uses it. One backend, one config, one file.
#[derive(Debug, Deserialize, Clone)]
pub struct FileSinkConfig {
    /// 📁 The "container". Created on demand when `auto_create_container` is on.
    pub root_dir: PathBuf,
}

/// 🚰 FileSink — writes each object to `root_dir/<object_key>`. I/O only.
///
/// ⚠️ Writing to an existing key truncates it. Keys carry a fresh UUID, so in practice
/// that only happens if your template forgot `%{uuid}`. He who forgets the uuid,
/// overwrites his own logs.
#[derive(Debug)]
pub struct FileSink {
    sink_config: FileSinkConfig,
}

impl FileSink {
    pub fn new(sink_config: FileSinkConfig) -> Self {
        Self { sink_config }
    }

    /// 🔒 Object keys are relative paths. No `..`, no leading `/`, no escaping the root.
    fn path_for(&self, object_key: &str) -> Result<PathBuf> {
        let relative = Path::new(object_key);
        let stays_inside = relative
            .components()
            .all(|component| matches!(component, Component::Normal(_) | Component::CurDir));
        if object_key.is_empty() || !stays_inside {
            anyhow::bail!(
                "💀 Object key '{}' tried to wander outside '{}'. The file sink only writes \
                 inside its own root. Check your object_key_format.",
                object_key,
                self.sink_config.root_dir.display()
            );
        }
        Ok(self.sink_config.root_dir.join(relative))
    }
}

#[async_trait]
impl BlobSink for FileSink {
    async fn ensure_container(&self) -> Result<()> {
        // -- create_dir_all is already idempotent. "Already exists" was never an error here.
        fs::create_dir_all(&self.sink_config.root_dir)
            .await
            .with_context(|| {
                format!(
                    "💀 Could not conjure the root directory '{}'. Permissions, probably. It's always permissions.",
                    self.sink_config.root_dir.display()
                )
            })
    }

    async fn upload(&self, object_key: &str, data: Vec<u8>) -> Result<()> {
        let path = self.path_for(object_key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("💀 Could not create '{}'", parent.display()))?;
        }
        trace!(
            "📬 {} bytes walked into the file sink, headed for {}",
            data.len(),
            path.display()
        );
        fs::write(&path, data)
            .await
            .with_context(|| format!("💀 The bytes would not land in '{}'. The disk said no.", path.display()))
    }
}
