use serde::{Deserialize, Serialize};

use crate::models::domain::{MarketListing, MarketSummary};

/// Response for the search endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<MarketSummary>,
    pub total_results: usize,
}

/// Response for the paginated market listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketListResponse {
    pub markets: Vec<MarketListing>,
    pub current_page: u32,
    pub total_pages: u32,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub rating_cache_entries: u64,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub status_code: u16,
}

/// Result of recording an uploaded file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredFileResponse {
    pub original_filename: String,
    pub generated_name: String,
    pub operation: String,
}
