// Route exports
pub mod files;
pub mod markets;

use std::sync::Arc;

use actix_web::{http::StatusCode, web, HttpRequest, HttpResponse, ResponseError};
use thiserror::Error;

use crate::config::Settings;
use crate::core::{ProvenanceError, ProvenanceLedger, SearchEngine, SearchError};
use crate::models::ErrorResponse;
use crate::services::{
    BlobBackend, BulkExporter, CachedRatings, ExportError, PostgresClient, PostgresError,
};

pub type Ledger = ProvenanceLedger<BlobBackend, PostgresClient>;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub postgres: Arc<PostgresClient>,
    pub ratings: Arc<CachedRatings<Arc<PostgresClient>>>,
    pub engine: SearchEngine,
    pub ledger: Arc<Ledger>,
    pub exporter: BulkExporter,
    pub settings: Arc<Settings>,
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .configure(markets::configure)
            .configure(files::configure),
    );
}

/// Error returned by handlers, rendered as [`ErrorResponse`]
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Search(#[from] SearchError),

    #[error(transparent)]
    Provenance(#[from] ProvenanceError),

    #[error(transparent)]
    Database(#[from] PostgresError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),
}

impl ApiError {
    fn kind(&self) -> &'static str {
        match self {
            ApiError::Search(SearchError::InvalidQuery(_)) => "invalid_query",
            ApiError::Search(SearchError::Backend(_)) => "search_failed",
            ApiError::Provenance(ProvenanceError::MissingExtension(_)) => "missing_extension",
            ApiError::Provenance(_) => "file_record_failed",
            ApiError::Database(_) => "database_error",
            ApiError::Export(_) => "export_failed",
            ApiError::Storage(_) => "storage_error",
            ApiError::BadRequest(_) => "bad_request",
            ApiError::NotFound(_) => "not_found",
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Search(SearchError::InvalidQuery(_))
            | ApiError::Provenance(ProvenanceError::MissingExtension(_))
            | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        } else {
            tracing::info!("Rejected request: {}", self);
        }

        HttpResponse::build(status).json(ErrorResponse {
            error: self.kind().to_string(),
            message: self.to_string(),
            status_code: status.as_u16(),
        })
    }
}

/// Client address for the audit log
///
/// `X-Real-IP` set by the reverse proxy wins over the socket peer.
pub fn requester_origin(req: &HttpRequest) -> String {
    req.headers()
        .get("X-Real-IP")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .or_else(|| req.peer_addr().map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn test_origin_prefers_real_ip_header() {
        let req = TestRequest::default()
            .insert_header(("X-Real-IP", "203.0.113.7"))
            .peer_addr("10.0.0.1:5000".parse().unwrap())
            .to_http_request();
        assert_eq!(requester_origin(&req), "203.0.113.7");
    }

    #[test]
    fn test_origin_falls_back_to_peer_then_unknown() {
        let req = TestRequest::default()
            .peer_addr("10.0.0.1:5000".parse().unwrap())
            .to_http_request();
        assert_eq!(requester_origin(&req), "10.0.0.1");

        let req = TestRequest::default().to_http_request();
        assert_eq!(requester_origin(&req), "unknown");
    }

    #[test]
    fn test_status_codes() {
        let invalid = ApiError::from(SearchError::InvalidQuery("bad".into()));
        assert_eq!(invalid.status_code(), StatusCode::BAD_REQUEST);

        let missing = ApiError::from(ProvenanceError::MissingExtension("README".into()));
        assert_eq!(missing.status_code(), StatusCode::BAD_REQUEST);

        let audit = ApiError::from(ProvenanceError::Audit("down".into()));
        assert_eq!(audit.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

        let backend = ApiError::from(SearchError::Backend("down".into()));
        assert_eq!(backend.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[actix_web::test]
    async fn test_error_body_is_json() {
        let resp = ApiError::NotFound("report.csv".into()).error_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let bytes = actix_web::body::to_bytes(resp.into_body()).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(body["error"], "not_found");
        assert_eq!(body["status_code"], 404);
        assert!(body["message"].as_str().unwrap().contains("report.csv"));
    }
}
