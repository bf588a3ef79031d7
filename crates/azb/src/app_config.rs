//! 🔧 App Configuration — the sacred TOML-to-struct pipeline.
//!
//! 📡 "Config not found: We looked everywhere. Under the couch. Behind the fridge.
//! In the junk drawer. Nothing." — every developer at 3am 🦆
//!
//! 🏗️ Powered by Figment, because manually parsing env vars is a form of
//! self-harm that even the borrow checker wouldn't approve of.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;
use tracing::info;

use crate::backends::SinkConfig;
use crate::compression::CompressionMode;
use crate::ingest::IngestConfig;

/// 📦 The AppConfig: one struct to rule them all, one struct to find them,
/// one struct to bring them all, and in the Figment bind them.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    /// 🧠 How the batching engine behaves. Every knob has a default.
    #[serde(default)]
    pub engine: EngineConfig,
    /// 🕳️ Where the batches go. No default: you have to pick a destination.
    pub sink_config: SinkConfig,
    /// 🚰 Where the records come from (CLI only).
    #[serde(default)]
    pub ingest: IngestConfig,
}

/// 🧠 The batching engine's knobs. Read-only once the engine is built.
///
/// Durations are plain milliseconds, because TOML has no duration type and
/// `"1s"` strings are how config bugs are born.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// ⏱️ A batch older than this is flushed at the next tick.
    pub batch_wait_ms: u64,
    /// 📏 A batch larger than this (in bytes, before compression) is flushed on the next append.
    pub batch_limit_size: usize,
    /// 🔄 Retries per flush after the first attempt. `"unlimited"` in TOML means `None`: forever.
    #[serde(deserialize_with = "deserialize_retry_limit")]
    pub retry_limit: Option<u64>,
    /// 🔄 First backoff between attempts; it only grows from here.
    pub retry_initial_backoff_ms: u64,
    /// 🏷️ Object key template. Knows `%{hostname}`, `%{uuid}` and `%{time_slice}`.
    pub object_key_format: String,
    /// 🫁 `"gzip"` or `"none"`.
    pub store_as: CompressionMode,
    /// 🏗️ Make sure the container exists before every upload attempt.
    pub auto_create_container: bool,
    /// ⏰ Deadline for one upload attempt (container check included).
    pub upload_timeout_ms: u64,
    /// 🚦 How many records may queue between producers and the engine. Minimum 1.
    pub intake_capacity: usize,
    /// 🏠 Overrides the machine's host name in `%{hostname}`.
    pub hostname: Option<String>,
}

/// 🔄 `retry_limit = 3` or `retry_limit = "unlimited"`. Nothing else.
fn deserialize_retry_limit<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RetryLimit {
        Count(u64),
        Word(String),
    }

    match RetryLimit::deserialize(deserializer)? {
        RetryLimit::Count(count) => Ok(Some(count)),
        RetryLimit::Word(word) if word.eq_ignore_ascii_case("unlimited") => Ok(None),
        RetryLimit::Word(word) => Err(serde::de::Error::custom(format!(
            "retry_limit must be a number or \"unlimited\", got \"{word}\""
        ))),
    }
}

// 🔢 the floor for the staleness ticker. Faster than this is just busy-waiting with extra steps.
const MIN_CHECK_INTERVAL: Duration = Duration::from_millis(50);

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            batch_wait_ms: 1000,
            batch_limit_size: 100 * 1024,
            retry_limit: Some(5),
            retry_initial_backoff_ms: 1000,
            object_key_format: "%{hostname}/%{time_slice}/%{uuid}.log".to_string(),
            store_as: CompressionMode::Gzip,
            auto_create_container: true,
            upload_timeout_ms: 30_000,
            intake_capacity: 1,
            hostname: None,
        }
    }
}

impl EngineConfig {
    pub fn batch_wait(&self) -> Duration {
        Duration::from_millis(self.batch_wait_ms)
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_millis(self.upload_timeout_ms)
    }

    pub fn retry_initial_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_initial_backoff_ms)
    }

    /// ⏱️ How often the engine looks for stale batches: a tenth of the wait, never under 50ms.
    pub fn check_interval(&self) -> Duration {
        (self.batch_wait() / 10).max(MIN_CHECK_INTERVAL)
    }
}

/// 🚀 Load the config — from a file, from env vars, or from the sheer power of hoping.
///
/// 🔧 Merges environment variables (AZB_*) with an optional TOML file. TOML wins on conflicts.
///   - `None` → env vars only.
///   - `Some(path)` → env vars + TOML file, merged.
///
/// 💀 Returns an error if config is unparseable. The message says where we looked.
pub fn load_config(config_file_name: Option<&Path>) -> anyhow::Result<AppConfig> {
    info!(
        "🔧 Loading configuration: {:#?}",
        config_file_name.unwrap_or(Path::new(""))
    );

    let config = Figment::new().merge(Env::prefixed("AZB_"));
    let config = match config_file_name {
        Some(file_name) => config.merge(Toml::file(file_name)),
        None => config,
    };

    let context_msg = match config_file_name {
        Some(path) => format!(
            "💀 Failed to parse configuration from file '{}' and environment variables (AZB_*). \
             The file exists in our hearts, but apparently not in a shape serde recognizes.",
            path.display()
        ),
        None => "💀 Failed to parse configuration from environment variables (AZB_*). \
                 No file was provided — this one's all on the environment. Classic."
            .to_string(),
    };

    config.extract().context(context_msg)
}
