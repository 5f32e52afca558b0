use std::sync::Arc;

use axum::{
    Json, Router,
    body::Body,
    extract::{Path, State},
    http::{
        HeaderValue, StatusCode,
        header::{CACHE_CONTROL, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE},
    },
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use bytes::Bytes;
use docket_api_types::{GenerateDocumentRequest, GenerationAccepted};
use tracing::error;

use crate::{
    application::{
        documents::{DocumentService, GenerationOutcome},
        downloads::{DownloadOutcome, DownloadService},
        error::HttpError,
        render::HTML_CONTENT_TYPE,
    },
    domain::content::ContentId,
    infra::db::PostgresRepositories,
};

use super::{
    db_health_response,
    middleware::{log_responses, set_request_context},
};

const GONE_MESSAGE: &str = "This download link has expired or was already used.";
/// Stored artifacts are bytes without metadata. Every renderer in this crate
/// emits HTML, so downloads are always served as an HTML attachment.
const DOWNLOAD_FILENAME: &str = "document.html";

#[derive(Clone)]
pub struct HttpState {
    pub documents: Arc<DocumentService>,
    pub downloads: Arc<DownloadService>,
    pub db: Arc<PostgresRepositories>,
}

/// Build the public router. Download links are served under `download_path`.
pub fn build_router(state: HttpState, download_path: &str) -> Router {
    let download_route = format!("{download_path}/{{token}}");

    Router::new()
        .route("/documents/{content_id}", post(generate_document))
        .route(&download_route, get(download_artifact).post(download_artifact))
        .route("/_health/db", get(public_health))
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

async fn generate_document(
    State(state): State<HttpState>,
    Path(content_id): Path<ContentId>,
    Json(request): Json<GenerateDocumentRequest>,
) -> Result<Response, HttpError> {
    match state
        .documents
        .generate(content_id, &request.recipient)
        .await?
    {
        GenerationOutcome::Inline(document) => Ok(attachment_response(
            document.content_type,
            &document.filename(),
            document.bytes,
        )),
        GenerationOutcome::Queued { job_id, recipient } => {
            let body = GenerationAccepted {
                success: true,
                message: format!(
                    "Your document is taking longer than expected to prepare. \
                     A download link will be emailed to {recipient} when it is ready."
                ),
                job_id,
            };
            Ok((StatusCode::ACCEPTED, Json(body)).into_response())
        }
    }
}

async fn download_artifact(
    State(state): State<HttpState>,
    Path(token): Path<String>,
) -> Result<Response, HttpError> {
    match state.downloads.redeem(&token).await {
        Ok(DownloadOutcome::Ready(bytes)) => Ok(attachment_response(
            HTML_CONTENT_TYPE,
            DOWNLOAD_FILENAME,
            bytes,
        )),
        Ok(DownloadOutcome::Gone) => Ok(gone_response()),
        Err(err) => {
            error!(
                target = "infra::http::public::download_artifact",
                error = %err,
                "failed to read stored artifact"
            );
            Err(err.into())
        }
    }
}

async fn public_health(State(state): State<HttpState>) -> Response {
    db_health_response(state.db.health_check().await)
}

fn gone_response() -> Response {
    let mut response = (StatusCode::GONE, GONE_MESSAGE).into_response();
    response
        .headers_mut()
        .insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}

fn attachment_response(content_type: &str, filename: &str, bytes: Bytes) -> Response {
    let length = bytes.len();
    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = StatusCode::OK;

    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(content_type) {
        headers.insert(CONTENT_TYPE, value);
    }
    if let Ok(value) = HeaderValue::from_str(&length.to_string()) {
        headers.insert(CONTENT_LENGTH, value);
    }
    if let Ok(value) = HeaderValue::from_str(&format!("attachment; filename=\"{filename}\"")) {
        headers.insert(CONTENT_DISPOSITION, value);
    }
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attachment_headers_are_set() {
        let response = attachment_response(HTML_CONTENT_TYPE, "report.html", Bytes::from("<p/>"));
        let headers = response.headers();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(headers[CONTENT_TYPE], HTML_CONTENT_TYPE);
        assert_eq!(headers[CONTENT_LENGTH], "4");
        assert_eq!(
            headers[CONTENT_DISPOSITION],
            "attachment; filename=\"report.html\""
        );
        assert_eq!(headers[CACHE_CONTROL], "no-store");
    }

    #[test]
    fn gone_response_is_410() {
        let response = gone_response();
        assert_eq!(response.status(), StatusCode::GONE);
    }
}
