//! Single-use download links and their redemption.

use std::sync::Arc;

use bytes::Bytes;
use metrics::counter;
use tracing::{debug, info};
use url::Url;

use crate::{
    domain::artifacts::ArtifactToken,
    infra::artifacts::{ArtifactStore, ArtifactStoreError, FetchOutcome},
};

const METRIC_DOWNLOADS_SERVED: &str = "docket_downloads_served_total";
const METRIC_DOWNLOADS_GONE: &str = "docket_downloads_gone_total";

/// Builds public download URLs of the form `<base>/<download-path>/<token>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadLinks {
    base: String,
    path: String,
}

impl DownloadLinks {
    /// `download_path` is the validated `documents.download_path` setting:
    /// a leading `/` and no trailing one.
    pub fn new(base_url: &Url, download_path: &str) -> Self {
        let base = base_url.as_str().trim_end_matches('/').to_string();
        Self {
            base,
            path: download_path.to_string(),
        }
    }

    pub fn link_for(&self, token: &ArtifactToken) -> String {
        format!("{}{}/{}", self.base, self.path, token)
    }
}

/// Outcome of redeeming a download link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    Ready(Bytes),
    /// Expired or already used. The store cannot tell the two apart.
    Gone,
}

#[derive(Clone)]
pub struct DownloadService {
    store: Arc<ArtifactStore>,
}

impl DownloadService {
    pub fn new(store: Arc<ArtifactStore>) -> Self {
        Self { store }
    }

    /// Redeem `raw_token`. Malformed tokens are reported as gone, like any
    /// other token with nothing behind it.
    pub async fn redeem(&self, raw_token: &str) -> Result<DownloadOutcome, ArtifactStoreError> {
        let Ok(token) = raw_token.parse::<ArtifactToken>() else {
            debug!(
                target = "application::downloads::redeem",
                "malformed download token"
            );
            counter!(METRIC_DOWNLOADS_GONE).increment(1);
            return Ok(DownloadOutcome::Gone);
        };

        match self.store.fetch_and_delete(&token).await? {
            FetchOutcome::Found(bytes) => {
                info!(
                    target = "application::downloads::redeem",
                    token = %token,
                    size_bytes = bytes.len(),
                    "artifact downloaded and removed"
                );
                counter!(METRIC_DOWNLOADS_SERVED).increment(1);
                Ok(DownloadOutcome::Ready(bytes))
            }
            FetchOutcome::NotFound => {
                counter!(METRIC_DOWNLOADS_GONE).increment(1);
                Ok(DownloadOutcome::Gone)
            }
        }
    }
}
