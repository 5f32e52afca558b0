//! Background half of document generation: render, store, notify.

use apalis::prelude::{Data, Error as ApalisError};
use metrics::counter;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
    application::{
        notify::DeliveryMessage,
        render::RenderError,
        repos::{JobsRepo, RepoError},
    },
    domain::{artifacts::ArtifactToken, content::ContentId, types::JobType},
    infra::artifacts::ArtifactStoreError,
};

use super::{
    context::{DeliveryWorkerContext, job_failed},
    queue::enqueue_job,
};

const METRIC_ARTIFACTS_SAVED: &str = "docket_artifacts_saved_total";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliverDocumentJobPayload {
    pub content_id: ContentId,
    pub recipient: String,
    /// In-process render started by the request that enqueued this job.
    #[serde(default)]
    pub handoff: Option<String>,
}

pub async fn enqueue_deliver_document_job<J: JobsRepo + ?Sized>(
    repo: &J,
    payload: &DeliverDocumentJobPayload,
    max_attempts: i32,
) -> Result<String, RepoError> {
    enqueue_job(
        repo,
        JobType::DeliverDocument,
        payload,
        None,
        max_attempts,
        0,
    )
    .await
}

/// What a finished delivery produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub token: ArtifactToken,
    pub download_link: String,
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("render failed: {0}")]
    Render(#[from] RenderError),
    #[error("artifact could not be stored: {0}")]
    Store(#[from] ArtifactStoreError),
}

/// Render (or adopt the request's in-flight render), store the artifact and
/// notify the recipient.
///
/// Every run that gets past the store produces a new token. A retry after a
/// failure further down therefore leaves the earlier artifact behind for the
/// janitor.
pub async fn deliver_document(
    ctx: &DeliveryWorkerContext,
    payload: &DeliverDocumentJobPayload,
) -> Result<DeliveryReceipt, DeliveryError> {
    let adopted = payload
        .handoff
        .as_deref()
        .and_then(|handoff| ctx.in_flight.take(handoff, payload.content_id));

    let document = match adopted {
        Some(render) => {
            debug!(
                target = "application::jobs::deliver_document",
                content_id = payload.content_id,
                "adopting in-flight render"
            );
            render.await?
        }
        None => ctx.renderer.render(payload.content_id).await?,
    };

    let token = ctx.store.save(&document.bytes).await?;
    counter!(METRIC_ARTIFACTS_SAVED).increment(1);

    let download_link = ctx.links.link_for(&token);
    let message = DeliveryMessage {
        recipient: payload.recipient.clone(),
        download_link: download_link.clone(),
        expiry_minutes: ctx.link_expiry_minutes,
    };

    if let Err(err) = ctx.notifier.send(&message).await {
        warn!(
            target = "application::jobs::deliver_document",
            content_id = payload.content_id,
            recipient = %payload.recipient,
            error = %err,
            "failed to notify recipient"
        );
    }

    info!(
        target = "application::jobs::deliver_document",
        content_id = payload.content_id,
        token = %token,
        size_bytes = document.bytes.len(),
        "document delivered"
    );

    Ok(DeliveryReceipt {
        token,
        download_link,
    })
}

pub async fn process_deliver_document_job(
    payload: DeliverDocumentJobPayload,
    context: Data<DeliveryWorkerContext>,
) -> Result<(), ApalisError> {
    match deliver_document(&context, &payload).await {
        Ok(_) => Ok(()),
        Err(err) => {
            error!(
                target = "application::jobs::process_deliver_document_job",
                content_id = payload.content_id,
                error = %err,
                "document delivery failed"
            );
            Err(job_failed(err))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_without_handoff_deserializes() {
        let payload: DeliverDocumentJobPayload =
            serde_json::from_str(r#"{"content_id":12,"recipient":"a@example.com"}"#)
                .expect("payload");
        assert_eq!(payload.content_id, 12);
        assert_eq!(payload.handoff, None);
    }
}
