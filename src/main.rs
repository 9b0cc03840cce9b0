use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{error, http::StatusCode, middleware, web, App, HttpResponse, HttpServer};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use market_directory::config::{LoggingSettings, Settings};
use market_directory::core::{ProvenanceLedger, SearchEngine};
use market_directory::routes::{self, AppState};
use market_directory::services::{BlobBackend, BulkExporter, CachedRatings, PostgresClient};

/// JSON error response for JSON payload errors
#[derive(Debug, serde::Serialize)]
pub struct JsonError {
    pub error: String,
    pub message: String,
    pub status_code: u16,
}

impl std::fmt::Display for JsonError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error, self.message)
    }
}

impl std::error::Error for JsonError {}

impl error::ResponseError for JsonError {
    fn error_response(&self) -> HttpResponse {
        let body = serde_json::to_string(self).unwrap_or_else(|e| {
            tracing::warn!("Failed to serialize error body: {}", e);
            format!("{{\"error\":\"{}\",\"status_code\":{}}}", self.error, self.status_code)
        });

        HttpResponse::build(StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::BAD_REQUEST))
            .content_type("application/json")
            .body(body)
    }
}

/// Handle JSON payload errors
pub fn handle_json_payload_error(err: error::JsonPayloadError, req: &actix_web::HttpRequest) -> actix_web::Error {
    tracing::info!("JSON payload error on {}: {}", req.path(), err);
    JsonError {
        error: "invalid_json".to_string(),
        message: format!("Invalid JSON: {}", err),
        status_code: 400,
    }
    .into()
}

/// Handle query payload errors
pub fn handle_query_payload_error(err: error::QueryPayloadError, req: &actix_web::HttpRequest) -> actix_web::Error {
    tracing::info!("Query error on {}: {}", req.path(), err);
    JsonError {
        error: "invalid_query".to_string(),
        message: format!("Invalid query: {}", err),
        status_code: 400,
    }
    .into()
}

fn init_logging(logging: &LoggingSettings) {
    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true);

    if logging.format == "pretty" {
        subscriber.pretty().init();
    } else {
        subscriber.json().init();
    }
}

fn startup_error(context: &str, e: impl std::fmt::Display) -> std::io::Error {
    error!("{}: {}", context, e);
    std::io::Error::new(std::io::ErrorKind::Other, format!("{}: {}", context, e))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present
    dotenv::dotenv().ok();

    // Configuration comes first so logging can follow it
    let settings = match Settings::load() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            return Err(std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()));
        }
    };

    init_logging(&settings.logging);

    info!("Starting market directory service...");

    // Initialize PostgreSQL client
    let postgres = Arc::new(
        PostgresClient::from_settings(&settings.database)
            .await
            .map_err(|e| startup_error("Failed to connect to PostgreSQL", e))?,
    );

    info!("PostgreSQL client initialized");

    let ratings = Arc::new(CachedRatings::new(
        postgres.clone(),
        settings.search.rating_cache_size,
        settings.search.rating_cache_ttl_secs,
    ));

    info!(
        "Rating cache initialized ({} entries, TTL: {}s)",
        settings.search.rating_cache_size, settings.search.rating_cache_ttl_secs
    );

    let blobs = BlobBackend::from_settings(&settings.storage)
        .map_err(|e| startup_error("Failed to initialize blob storage", e))?;
    let ledger = Arc::new(ProvenanceLedger::new(Arc::new(blobs), postgres.clone()));

    let engine = SearchEngine::new(settings.search.bounding_box_prefilter);
    let exporter = BulkExporter::new(settings.export.chunk_size);

    // Configure HTTP server
    let host = settings.server.host.clone();
    let port = settings.server.port;
    let workers = settings.server.workers.unwrap_or(4);

    // Build application state
    let app_state = AppState {
        postgres,
        ratings,
        engine,
        ledger,
        exporter,
        settings: Arc::new(settings),
    };

    info!("Starting HTTP server on {}:{}", host, port);

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .app_data(web::JsonConfig::default().error_handler(handle_json_payload_error))
            .app_data(web::QueryConfig::default().error_handler(handle_query_payload_error))
            .app_data(web::PayloadConfig::new(50 * 1024 * 1024))
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .configure(routes::configure_routes)
    })
    .workers(workers)
    .bind((host, port))?
    .run()
    .await
}
