use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use crate::domain::content::{ContentId, attachment_filename};

/// Content type of every document the built-in renderer produces.
///
/// Downloads of stored artifacts assume it, since the store keeps no
/// per-artifact content type.
pub const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";

/// A fully rendered document, ready to hand to a caller or to the artifact store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedDocument {
    pub title: String,
    pub content_type: &'static str,
    pub extension: &'static str,
    pub bytes: Bytes,
}

impl RenderedDocument {
    pub fn html(title: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            title: title.into(),
            content_type: HTML_CONTENT_TYPE,
            extension: "html",
            bytes: bytes.into(),
        }
    }

    /// Attachment file name derived from the document title.
    pub fn filename(&self) -> String {
        attachment_filename(&self.title, self.extension)
    }
}

/// Failures raised while producing a document.
///
/// Cloneable because a single in-flight render may be awaited by both the
/// request that started it and the background job that adopts it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RenderError {
    #[error("content `{0}` not found")]
    ContentNotFound(ContentId),
    #[error("content lookup failed: {0}")]
    Source(String),
    #[error("markdown rendering failed: {0}")]
    Markdown(String),
    #[error("render task aborted: {0}")]
    Aborted(String),
}

/// Turns a content record into document bytes. May be slow, may fail.
#[async_trait]
pub trait DocumentRenderer: Send + Sync {
    async fn render(&self, content_id: ContentId) -> Result<RenderedDocument, RenderError>;
}
