//! 🚰 Ingest — where records come from before the engine gets its hands on them.
//!
//! 📂 One line in, one record out. Blank lines are skipped, like the small talk at
//! the start of a standup. Every record is stamped with "now" (UTC) run through a
//! strftime format, and that stamp is the time slice the engine batches by.
//!
//! ⚠️ The format decides the batching granularity. `%Y%m%d%H` = one batch stream per
//! hour. `%Y%m%d%H%M%S` = one per second, and a lot of tiny blobs. Choose wisely. 🦆

use std::fmt::Write;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use tokio::fs::File;
use tokio::io::{self, AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{info, trace};

use crate::common::Record;

/// 🚰 Where the CLI reads records from, and how it stamps them.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct IngestConfig {
    /// 📂 The file to read. Absent = stdin.
    pub file_name: Option<PathBuf>,
    /// 🕰️ chrono strftime format for the time slice, applied to the current UTC time.
    pub time_slice_format: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            file_name: None,
            time_slice_format: "%Y%m%d%H".to_string(),
        }
    }
}

/// 📖 Reads newline-delimited records from anything that can be read a line at a time.
pub struct LineSource {
    reader: Box<dyn AsyncBufRead + Send + Unpin>,
    time_slice_format: String,
    line: Vec<u8>,
}

impl std::fmt::Debug for LineSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineSource")
            .field("time_slice_format", &self.time_slice_format)
            .finish()
    }
}

impl LineSource {
    /// 🚪 Open the configured file, or fall back to stdin when there isn't one.
    pub async fn open(ingest_config: &IngestConfig) -> Result<Self> {
        let reader: Box<dyn AsyncBufRead + Send + Unpin> = match &ingest_config.file_name {
            Some(file_name) => {
                let file = File::open(file_name).await.with_context(|| {
                    format!(
                        "💀 The door to '{}' would not budge. It might not exist, or it might \
                         not want to talk to us. Either way, no records today.",
                        file_name.display()
                    )
                })?;
                info!("📂 reading records from '{}'", file_name.display());
                Box::new(BufReader::new(file))
            }
            None => {
                info!("📂 reading records from stdin");
                Box::new(BufReader::new(io::stdin()))
            }
        };
        Ok(Self::from_reader(reader, ingest_config.time_slice_format.clone()))
    }

    pub fn from_reader(
        reader: Box<dyn AsyncBufRead + Send + Unpin>,
        time_slice_format: String,
    ) -> Self {
        Self {
            reader,
            time_slice_format,
            line: Vec::new(),
        }
    }

    /// 📄 The next non-empty line as a record, or `None` at EOF.
    pub async fn next_record(&mut self) -> Result<Option<Record>> {
        loop {
            self.line.clear();
            let bytes_read = self
                .reader
                .read_until(b'\n', &mut self.line)
                .await
                .context("💀 reading the next line failed mid-sentence")?;
            if bytes_read == 0 {
                return Ok(None);
            }

            // 🧹 read_until keeps the \n (and the \r, on a bad day). Payloads are bytes,
            // not text: no utf-8 opinions here.
            let trimmed = trim_line_ending(&self.line);
            if trimmed.is_empty() {
                continue;
            }
            trace!("📖 read {} bytes", trimmed.len());
            let payload = trimmed.to_vec();
            let time_slice = self.current_time_slice()?;
            return Ok(Some(Record::new(time_slice, payload)));
        }
    }

    /// 🕰️ `Utc::now()` through the configured format. A bogus specifier is an error, not a panic.
    fn current_time_slice(&self) -> Result<String> {
        let mut time_slice = String::new();
        write!(
            time_slice,
            "{}",
            chrono::Utc::now().format(&self.time_slice_format)
        )
        .map_err(|_| {
            anyhow!(
                "💀 time_slice_format '{}' is not a format chrono understands",
                self.time_slice_format
            )
        })?;
        Ok(time_slice)
    }
}

fn trim_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}
