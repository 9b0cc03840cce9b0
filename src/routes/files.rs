use actix_web::{http::header, web, HttpRequest, HttpResponse};
use chrono::{DateTime, Utc};
use validator::Validate;

use crate::core::{file_extension, AuditStore, BlobStore, ProvenanceLedger};
use crate::models::{ImportParams, OperationKind, StoredFileResponse};
use crate::routes::{requester_origin, ApiError, AppState};
use crate::services::{BulkExporter, ExportSource, ExportedFile};

/// Configure artifact routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/files/export", web::get().to(export_all))
        .route("/files/import", web::post().to(import_file))
        .route("/files/{generated_name}", web::get().to(download_file));
}

/// Bulk export that has been stored and logged
pub struct RecordedExport {
    pub export: ExportedFile,
    pub generated_name: String,
}

/// Export the whole directory and record the file in the ledger
pub async fn export_and_record<S, B, A>(
    exporter: &BulkExporter,
    source: &S,
    ledger: &ProvenanceLedger<B, A>,
    origin: &str,
    at: DateTime<Utc>,
) -> Result<RecordedExport, ApiError>
where
    S: ExportSource,
    B: BlobStore,
    A: AuditStore,
{
    let export = exporter.export(source, at).await?;

    tracing::info!("Built export {} with {} markets", export.filename, export.rows);

    let generated_name = ledger
        .record(export.file.path(), &export.filename, OperationKind::Export, origin)
        .await?;

    Ok(RecordedExport {
        export,
        generated_name,
    })
}

/// Check an uploaded file and record it in the ledger
///
/// The extension check happens before anything is written.
pub async fn store_import<B, A>(
    ledger: &ProvenanceLedger<B, A>,
    allowed_extensions: &[String],
    filename: &str,
    body: &[u8],
    origin: &str,
) -> Result<StoredFileResponse, ApiError>
where
    B: BlobStore,
    A: AuditStore,
{
    let extension = file_extension(filename)?;
    if !allowed_extensions.iter().any(|allowed| allowed.eq_ignore_ascii_case(&extension)) {
        return Err(ApiError::BadRequest(format!(
            "Unsupported file type '{}', expected one of: {}",
            extension,
            allowed_extensions.join(", ")
        )));
    }
    if body.is_empty() {
        return Err(ApiError::BadRequest("Uploaded file is empty".to_string()));
    }

    let upload = tempfile::Builder::new()
        .prefix("import_")
        .suffix(&extension)
        .tempfile()
        .map_err(|e| ApiError::Storage(e.to_string()))?;
    tokio::fs::write(upload.path(), body)
        .await
        .map_err(|e| ApiError::Storage(e.to_string()))?;

    let generated_name = ledger
        .record(upload.path(), filename, OperationKind::Import, origin)
        .await?;

    Ok(StoredFileResponse {
        original_filename: filename.to_string(),
        generated_name,
        operation: OperationKind::Import.to_string(),
    })
}

/// Bulk CSV export
///
/// GET /api/v1/files/export
async fn export_all(
    state: web::Data<AppState>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let origin = requester_origin(&req);

    let recorded = export_and_record(
        &state.exporter,
        &state.postgres,
        state.ledger.as_ref(),
        &origin,
        Utc::now(),
    )
    .await?;

    let bytes = tokio::fs::read(recorded.export.file.path())
        .await
        .map_err(|e| ApiError::Storage(e.to_string()))?;

    Ok(HttpResponse::Ok()
        .content_type("text/csv; charset=utf-8")
        .insert_header((
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", recorded.export.filename),
        ))
        .insert_header(("X-Generated-Name", recorded.generated_name))
        .body(bytes))
}

/// Import upload
///
/// POST /api/v1/files/import?filename=markets.xlsx with the file as the body
async fn import_file(
    state: web::Data<AppState>,
    params: web::Query<ImportParams>,
    body: web::Bytes,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    if let Err(errors) = params.validate() {
        return Err(ApiError::BadRequest(errors.to_string()));
    }

    let origin = requester_origin(&req);
    let stored = store_import(
        state.ledger.as_ref(),
        &state.settings.export.allowed_import_extensions,
        params.filename.trim(),
        &body,
        &origin,
    )
    .await?;

    Ok(HttpResponse::Created().json(stored))
}

/// Download a stored artifact by its generated name
async fn download_file(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let generated_name = path.into_inner();

    let bytes = state
        .ledger
        .blobs()
        .get(&generated_name)
        .await
        .map_err(|e| ApiError::Storage(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound(format!("No stored file named {}", generated_name)))?;

    Ok(HttpResponse::Ok()
        .content_type("application/octet-stream")
        .insert_header((
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", generated_name),
        ))
        .body(bytes))
}
