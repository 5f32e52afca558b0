//! Delivery notifications for artifacts produced in the background.

use async_trait::async_trait;
use docket_api_types::DeliveryNotice;
use thiserror::Error;

/// Message handed to the notifier once per completed delivery job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryMessage {
    pub recipient: String,
    pub download_link: String,
    pub expiry_minutes: u64,
}

impl DeliveryMessage {
    pub fn subject(&self) -> String {
        "Your document is ready".to_string()
    }

    /// Human-readable text that states the link both expires and works once.
    pub fn body(&self) -> String {
        let unit = if self.expiry_minutes == 1 {
            "minute"
        } else {
            "minutes"
        };
        format!(
            "Your document is ready to download:\n\n{link}\n\nThis link expires in {minutes} {unit} and can be used only once.",
            link = self.download_link,
            minutes = self.expiry_minutes,
        )
    }

    pub fn to_notice(&self) -> DeliveryNotice {
        DeliveryNotice {
            recipient: self.recipient.clone(),
            subject: self.subject(),
            body: self.body(),
            download_link: self.download_link.clone(),
            expiry_minutes: self.expiry_minutes,
        }
    }
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification transport failed: {0}")]
    Transport(String),
    #[error("notification rejected with status {status}")]
    Rejected { status: u16 },
}

/// Transport that tells a recipient where to fetch their artifact.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, message: &DeliveryMessage) -> Result<(), NotifyError>;
}
