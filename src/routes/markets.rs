use actix_web::{web, HttpResponse};

use crate::core::Page;
use crate::models::{
    HealthResponse, ListMarketsParams, MarketListResponse, SearchParams, SearchResponse,
};
use crate::routes::{ApiError, AppState};

/// Configure all market-related routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check))
        .route("/markets", web::get().to(list_markets))
        .route("/markets/search", web::get().to(search_markets))
        .route("/stats", web::get().to(directory_stats));
}

/// Health check endpoint
async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let pg_healthy = match state.postgres.health_check().await {
        Ok(healthy) => healthy,
        Err(e) => {
            tracing::warn!("Database health check failed: {}", e);
            false
        }
    };

    let status = if pg_healthy { "healthy" } else { "degraded" };

    HttpResponse::Ok().json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now(),
        rating_cache_entries: state.ratings.cached_entries().await,
    })
}

/// Paginated market listing
///
/// GET /api/v1/markets?page=2
async fn list_markets(
    state: web::Data<AppState>,
    params: web::Query<ListMarketsParams>,
) -> Result<HttpResponse, ApiError> {
    let total = state.postgres.count_markets().await?;
    let page = Page::resolve(
        params.page.as_deref(),
        u64::try_from(total).unwrap_or(0),
        state.settings.search.page_size,
    );

    let markets = state.postgres.list_markets(page.per_page, page.offset()).await?;

    tracing::debug!(
        "Listing page {}/{} with {} markets",
        page.current,
        page.total_pages,
        markets.len()
    );

    Ok(HttpResponse::Ok().json(MarketListResponse {
        markets,
        current_page: page.current,
        total_pages: page.total_pages,
    }))
}

/// Search markets by field or radius
///
/// GET /api/v1/markets/search?mode=city&q=Moscow&sort=2
/// GET /api/v1/markets/search?radius=1&lat=55.75&lon=37.61&radius_val=25&sort=3
async fn search_markets(
    state: web::Data<AppState>,
    params: web::Query<SearchParams>,
) -> Result<HttpResponse, ApiError> {
    let query = params.into_inner().into_query()?;

    tracing::info!("Searching markets: {:?}, sort {:?}", query.mode, query.sort);

    let results = state
        .engine
        .search(&query, &state.postgres, &state.ratings)
        .await?;

    Ok(HttpResponse::Ok().json(SearchResponse {
        total_results: results.len(),
        results,
    }))
}

/// Directory statistics
async fn directory_stats(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let stats = state.postgres.directory_stats().await?;
    Ok(HttpResponse::Ok().json(stats))
}
