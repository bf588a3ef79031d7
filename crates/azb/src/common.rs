//! 📦 Common data structures — the building blocks of azb
//!
//! ---
//!
//! 🎬 COLD OPEN — INT. LOG PIPELINE — 3:47 AM
//!
//! A container somewhere prints "connection reset by peer" for the nine
//! hundredth time tonight. Nobody is reading it. Somebody will, eventually,
//! at a post-mortem. That line has to be in blob storage by then.
//!
//! ✅ Enter the `Record`: one line, one time slice, zero opinions about what the
//! bytes mean. And the `Batch`: the shopping cart those records pile into until
//! somebody decides the cart is full (or old, or the store is closing).
//!
//! 🦆

use tokio::time::Instant;

/// 🎯 One inbound log line — a time slice and an opaque payload.
///
/// We don't parse it. We don't validate it. We don't know if it's JSON, logfmt,
/// or a haiku. The time slice says which batch it belongs to. That is all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// 🗂️ The partition key, e.g. `"2024010100"`. Records with the same key share a batch.
    pub time_slice: String,
    /// 📦 The raw bytes. Never mutated after creation.
    pub payload: Vec<u8>,
}

impl Record {
    pub fn new(time_slice: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            time_slice: time_slice.into(),
            payload: payload.into(),
        }
    }
}

/// 🛒 An open batch for one time slice: accumulated bytes plus when it was born.
///
/// Lives in the engine's map while open. The moment it's removed, it is moved into
/// a flush task and nobody touches it again. Ownership is the lock. 🔒
#[derive(Debug)]
pub(crate) struct Batch {
    pub buffer: Vec<u8>,
    pub created_at: Instant,
}

impl Batch {
    /// 🏗️ Start a fresh batch seeded with the first payload.
    pub(crate) fn new(payload: Vec<u8>) -> Self {
        Self {
            buffer: payload,
            created_at: Instant::now(),
        }
    }

    /// ➕ Newline, then payload. Same key, arrival order, one separator byte.
    pub(crate) fn append(&mut self, payload: &[u8]) {
        self.buffer.reserve(payload.len() + 1);
        self.buffer.push(b'\n');
        self.buffer.extend_from_slice(payload);
    }

    pub(crate) fn len(&self) -> usize {
        self.buffer.len()
    }

    /// ⏱️ Has this batch been sitting around at least `max_wait`?
    pub(crate) fn is_expired(&self, now: Instant, max_wait: std::time::Duration) -> bool {
        now.saturating_duration_since(self.created_at) >= max_wait
    }
}
