//! 🏷️ Object keys — the name on the envelope of every uploaded batch.
//!
//! A template like `"%{hostname}/%{time_slice}/%{uuid}.log"` becomes
//! `"node-7/2024010100/1b4e28ba-2fa1-11d2-883f-0016d3cca427.log"`.
//! Anything that looks like a placeholder but isn't one of ours rides along untouched.

use uuid::Uuid;

const HOSTNAME_PLACEHOLDER: &str = "%{hostname}";
const UUID_PLACEHOLDER: &str = "%{uuid}";
const TIME_SLICE_PLACEHOLDER: &str = "%{time_slice}";

/// 🏷️ Renders per-batch object keys from a template and the producing host's name.
///
/// The host name is handed in at construction, not looked up behind your back,
/// so tests can pin it.
#[derive(Debug, Clone)]
pub struct ObjectKeyFormatter {
    template: String,
    hostname: String,
}

impl ObjectKeyFormatter {
    pub fn new(template: impl Into<String>, hostname: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            hostname: hostname.into(),
        }
    }

    /// 🎲 Render a key. Every call mints a brand new UUID, even for the same time slice.
    pub fn render(&self, time_slice: &str) -> String {
        // -- order matters a little: substitute the host and token first so a time slice
        // -- that happens to contain "%{uuid}" stays literal
        self.template
            .replace(HOSTNAME_PLACEHOLDER, &self.hostname)
            .replace(UUID_PLACEHOLDER, &Uuid::new_v4().to_string())
            .replace(TIME_SLICE_PLACEHOLDER, time_slice)
    }
}
