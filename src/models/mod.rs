// Model exports
pub mod domain;
pub mod requests;
pub mod responses;

pub use domain::{
    ArtifactRecord, BoundingBox, Coordinate, DirectoryStats, ExportCursor, ExportRow,
    MarketListing, MarketRow, MarketSummary, OperationKind, RatedMarket, RegionCount,
    SearchField, SearchMode, SearchQuery, SortOrder,
};
pub use requests::{ImportParams, ListMarketsParams, SearchParams};
pub use responses::{
    ErrorResponse, HealthResponse, MarketListResponse, SearchResponse, StoredFileResponse,
};
