//! 📡 The Azure-Blob-flavored sink — PUT the batch, hope for a 201.
//!
//! Speaks just enough of the Blob service REST dialect to do our two jobs:
//! - `GET  /{container}?restype=container` → does it exist?
//! - `PUT  /{container}?restype=container` → make it exist (409 = someone beat us to it, fine)
//! - `PUT  /{container}/{object_key}` with `x-ms-blob-type: BlockBlob` → store the batch
//!
//! Auth is a SAS token glued onto the query string. Anything fancier belongs to a real SDK.
//! Object keys are used as-is in the URL path, so keep templates to URL-safe characters.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, trace};

use crate::backends::BlobSink;

const BLOB_SERVICE_VERSION: &str = "2021-08-06";

#[derive(Debug, Deserialize, Clone)]
pub struct AzblobSinkConfig {
    /// 📡 Service endpoint, e.g. `https://myaccount.blob.core.windows.net`
    pub endpoint: String,
    /// 🪣 The container every batch lands in.
    pub container: String,
    /// 🔒 Shared access signature, with or without the leading `?`.
    #[serde(default)]
    pub sas_token: Option<String>,
}

/// 📡 The sink side of the blob service — pure I/O, zero buffering, zero retries.
///
/// Holds one `reqwest::Client`, shared by every concurrent flush. The client is a
/// connection pool in a trench coat, so sharing it is exactly what it wants.
#[derive(Debug)]
pub struct AzblobSink {
    client: reqwest::Client,
    sink_config: AzblobSinkConfig,
}

impl AzblobSink {
    pub fn new(sink_config: AzblobSinkConfig) -> Result<Self> {
        // 🔧 connect timeout only; the flusher owns the per-upload deadline
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("💀 The HTTP client refused to be born. Probably TLS. It's usually TLS.")?;
        Ok(Self {
            client,
            sink_config,
        })
    }

    fn container_url(&self) -> String {
        format!(
            "{}/{}",
            self.sink_config.endpoint.trim_end_matches('/'),
            self.sink_config.container
        )
    }

    /// 🔗 Glue the SAS token onto a URL that may or may not already have a query.
    fn with_sas(&self, url: String) -> String {
        match self.sink_config.sas_token.as_deref() {
            Some(sas) if !sas.trim_start_matches('?').is_empty() => {
                let separator = if url.contains('?') { '&' } else { '?' };
                format!("{url}{separator}{}", sas.trim_start_matches('?'))
            }
            _ => url,
        }
    }

    fn container_properties_url(&self) -> String {
        self.with_sas(format!("{}?restype=container", self.container_url()))
    }

    fn blob_url(&self, object_key: &str) -> String {
        self.with_sas(format!(
            "{}/{}",
            self.container_url(),
            object_key.trim_start_matches('/')
        ))
    }
}

#[async_trait]
impl BlobSink for AzblobSink {
    async fn ensure_container(&self) -> Result<()> {
        let url = self.container_properties_url();
        let probe = self
            .client
            .get(&url)
            .header("x-ms-version", BLOB_SERVICE_VERSION)
            .send()
            .await
            .context("💀 Asked the blob service whether our container exists. Got ghosted.")?;
        if probe.status().is_success() {
            trace!("✅ container '{}' already exists", self.sink_config.container);
            return Ok(());
        }

        debug!(
            "🏗️ container '{}' answered {} — creating it",
            self.sink_config.container,
            probe.status()
        );
        let response = self
            .client
            .put(&url)
            .header("x-ms-version", BLOB_SERVICE_VERSION)
            .header("Content-Length", "0")
            .send()
            .await
            .context("💀 Tried to create the container. The request never came back.")?;

        let status = response.status();
        // -- 409: ContainerAlreadyExists. Somebody else won the race. We still get what we wanted.
        if status.is_success() || status == StatusCode::CONFLICT {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        anyhow::bail!(
            "💀 Creating container '{}' failed with {}: {}",
            self.sink_config.container,
            status,
            body
        )
    }

    async fn upload(&self, object_key: &str, data: Vec<u8>) -> Result<()> {
        debug!("📡 uploading blob={} size={} bytes", object_key, data.len());
        let response = self
            .client
            .put(self.blob_url(object_key))
            .header("x-ms-version", BLOB_SERVICE_VERSION)
            .header("x-ms-blob-type", "BlockBlob")
            .header("Content-Type", "application/octet-stream")
            .body(data)
            .send()
            .await
            .with_context(|| format!("💀 The upload of '{object_key}' never reached the blob service."))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!(
                "💀 The blob service looked at '{}' and said {}. It also said: '{}'",
                object_key,
                status,
                body
            );
        }
        Ok(())
    }
}
