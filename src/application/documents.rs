//! Entry point for document requests: inline when quick, queued otherwise.

use std::{sync::Arc, time::Duration};

use thiserror::Error;
use tracing::info;

use crate::{
    application::{
        dispatch::{RenderDispatcher, RenderOutcome},
        jobs::{DeliverDocumentJobPayload, enqueue_deliver_document_job},
        render::{RenderError, RenderedDocument},
        repos::{JobsRepo, RepoError},
    },
    domain::content::ContentId,
};

/// What the caller gets back from a generation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationOutcome {
    Inline(RenderedDocument),
    Queued { job_id: String, recipient: String },
}

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("recipient must not be empty")]
    InvalidRecipient,
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error("failed to enqueue delivery job: {0}")]
    Queue(#[from] RepoError),
}

#[derive(Clone)]
pub struct DocumentService {
    dispatcher: RenderDispatcher,
    jobs: Arc<dyn JobsRepo>,
    deadline: Duration,
    max_attempts: i32,
}

impl DocumentService {
    pub fn new(
        dispatcher: RenderDispatcher,
        jobs: Arc<dyn JobsRepo>,
        deadline: Duration,
        max_attempts: i32,
    ) -> Self {
        Self {
            dispatcher,
            jobs,
            deadline,
            max_attempts,
        }
    }

    /// Render `content_id` within the configured deadline, or queue its
    /// delivery to `recipient`.
    ///
    /// Returns after roughly `deadline` at most; the queued path never waits
    /// on the render.
    pub async fn generate(
        &self,
        content_id: ContentId,
        recipient: &str,
    ) -> Result<GenerationOutcome, DocumentError> {
        let recipient = recipient.trim();
        if recipient.is_empty() {
            return Err(DocumentError::InvalidRecipient);
        }

        match self
            .dispatcher
            .render_with_deadline(content_id, self.deadline)
            .await?
        {
            RenderOutcome::Completed(document) => Ok(GenerationOutcome::Inline(document)),
            RenderOutcome::TimedOut { handoff } => {
                let payload = DeliverDocumentJobPayload {
                    content_id,
                    recipient: recipient.to_string(),
                    handoff: Some(handoff),
                };
                let job_id =
                    enqueue_deliver_document_job(self.jobs.as_ref(), &payload, self.max_attempts)
                        .await?;

                info!(
                    target = "application::documents::generate",
                    content_id,
                    job_id = %job_id,
                    "document delivery queued"
                );

                Ok(GenerationOutcome::Queued {
                    job_id,
                    recipient: payload.recipient,
                })
            }
        }
    }
}
