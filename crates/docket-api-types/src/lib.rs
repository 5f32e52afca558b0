//! Wire types shared by the docket HTTP surface, its job payloads and notifier webhooks.

use serde::{Deserialize, Serialize};

/// Body accepted by `POST /documents/{content_id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateDocumentRequest {
    /// Address or identifier notified when the document is delivered later.
    pub recipient: String,
}

/// Acknowledgement returned when generation continues in the background.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationAccepted {
    pub success: bool,
    pub message: String,
    pub job_id: String,
}

/// Payload posted to a notifier webhook once an artifact is ready.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryNotice {
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub download_link: String,
    pub expiry_minutes: u64,
}
