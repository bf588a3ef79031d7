//! 🫁 Compression — squeeze the batch before it leaves the building.
//!
//! Two modes. `None` hands the bytes back untouched. `Gzip` runs them through
//! flate2. Both are pure functions of the input: the batch you pass in is borrowed,
//! never mutated, so a failed attempt can simply try again with the same bytes.

use std::io::Write;

use anyhow::{Context, Result};
use flate2::{Compression, GzBuilder};
use serde::Deserialize;

/// 🗜️ How a batch is stored in the blob container.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CompressionMode {
    /// 📄 raw bytes, newline separated, exactly as they arrived
    None,
    /// 🫁 gzip, the default, because storage is billed by the byte
    #[default]
    Gzip,
}

impl CompressionMode {
    /// 🔧 Apply this mode to a batch. Returns a fresh buffer either way.
    pub fn compress(self, raw: &[u8]) -> Result<Vec<u8>> {
        match self {
            CompressionMode::None => Ok(raw.to_vec()),
            CompressionMode::Gzip => gzip(raw),
        }
    }
}

// -- the gzip header carries a file name. ours says who wrote it.
const GZIP_HEADER_NAME: &[u8] = b"azb";

fn gzip(raw: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzBuilder::new()
        .filename(GZIP_HEADER_NAME)
        .write(Vec::with_capacity(raw.len() / 4), Compression::default());
    encoder
        .write_all(raw)
        .context("💀 gzip refused to swallow the batch. The bytes went in, something came back up.")?;
    encoder
        .finish()
        .context("💀 gzip could not finish the stream. Half a gzip file is worth zero gzip files.")
}
