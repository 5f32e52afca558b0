//! Notifier transports.

use std::time::Duration;

use async_trait::async_trait;
use tracing::info;
use url::Url;

use crate::application::notify::{DeliveryMessage, NotifyError, Notifier};

/// Records deliveries in the log; used when no webhook is configured.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, message: &DeliveryMessage) -> Result<(), NotifyError> {
        info!(
            target = "infra::notify::log",
            recipient = %message.recipient,
            download_link = %message.download_link,
            expiry_minutes = message.expiry_minutes,
            "document ready for download"
        );
        Ok(())
    }
}

/// Posts a JSON [`docket_api_types::DeliveryNotice`] to a webhook that owns the
/// actual mail/push transport.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    endpoint: Url,
}

impl WebhookNotifier {
    pub fn new(endpoint: Url, timeout: Duration) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| NotifyError::Transport(err.to_string()))?;
        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, message: &DeliveryMessage) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&message.to_notice())
            .send()
            .await
            .map_err(|err| NotifyError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}
