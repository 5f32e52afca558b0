use std::error::Error as StdError;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::{
    application::{documents::DocumentError, render::RenderError},
    infra::{artifacts::ArtifactStoreError, error::InfraError},
};

#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        let mut messages = Vec::new();
        messages.push(error.to_string());
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self {
            source,
            status,
            messages,
        }
    }

    pub fn from_message(
        source: &'static str,
        status: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source,
            status,
            messages: vec![message.into()],
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

#[derive(Debug)]
pub struct HttpError {
    status: StatusCode,
    public_message: &'static str,
    report: ErrorReport,
}

impl HttpError {
    pub fn new(
        source: &'static str,
        status: StatusCode,
        public_message: &'static str,
        detail: impl Into<String>,
    ) -> Self {
        let report = ErrorReport::from_message(source, status, detail);
        Self {
            status,
            public_message,
            report,
        }
    }

    pub fn from_error(
        source: &'static str,
        status: StatusCode,
        public_message: &'static str,
        error: &dyn StdError,
    ) -> Self {
        let report = ErrorReport::from_error(source, status, error);
        Self {
            status,
            public_message,
            report,
        }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let mut response = (self.status, self.public_message).into_response();
        self.report.attach(&mut response);
        response
    }
}

impl From<DocumentError> for HttpError {
    fn from(error: DocumentError) -> Self {
        const SOURCE: &str = "infra::http::document_error_to_http_error";
        match error {
            DocumentError::InvalidRecipient => HttpError::new(
                SOURCE,
                StatusCode::BAD_REQUEST,
                "Recipient is required",
                "Generation request carried an empty recipient",
            ),
            DocumentError::Render(RenderError::ContentNotFound(id)) => HttpError::new(
                SOURCE,
                StatusCode::NOT_FOUND,
                "Document not found",
                format!("Content `{id}` does not exist"),
            ),
            DocumentError::Render(err) => HttpError::from_error(
                SOURCE,
                StatusCode::INTERNAL_SERVER_ERROR,
                "Document rendering failed",
                &err,
            ),
            DocumentError::Queue(err) => HttpError::from_error(
                SOURCE,
                StatusCode::SERVICE_UNAVAILABLE,
                "Document generation is temporarily unavailable",
                &err,
            ),
        }
    }
}

impl From<ArtifactStoreError> for HttpError {
    fn from(error: ArtifactStoreError) -> Self {
        HttpError::from_error(
            "infra::http::artifact_error_to_http_error",
            StatusCode::INTERNAL_SERVER_ERROR,
            "Download failed",
            &error,
        )
    }
}

/// Startup and command failures surfaced by the binary.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }
}
