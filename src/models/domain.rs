use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Geographic point in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Both components finite and within their geographic ranges
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// Candidate market row as returned by a row source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketRow {
    pub name: String,
    pub city: String,
    pub region: String,
    #[serde(default)]
    pub zip: String,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

impl MarketRow {
    /// Coordinate of the market, present only when both components are stored
    pub fn coordinate(&self) -> Option<Coordinate> {
        match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => Some(Coordinate { latitude, longitude }),
            _ => None,
        }
    }
}

/// Search result entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSummary {
    pub name: String,
    pub city: String,
    pub region: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coordinate: Option<Coordinate>,
    /// Miles from the search center, radius mode only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
    /// Average review rating, rating sort only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
}

impl From<MarketRow> for MarketSummary {
    fn from(row: MarketRow) -> Self {
        let coordinate = row.coordinate();
        Self {
            name: row.name,
            city: row.city,
            region: row.region,
            coordinate,
            distance: None,
            rating: None,
        }
    }
}

/// Fields that may be used for exact-match search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchField {
    Name,
    City,
    Region,
    Zip,
}

/// How candidates are filtered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    ExactField(SearchField),
    Radius,
}

/// Result ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    None,
    NameAsc,
    NameDesc,
    RatingDesc,
}

/// Validated search request
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub mode: SearchMode,
    pub filter_value: Option<String>,
    pub center: Option<Coordinate>,
    pub radius_miles: Option<f64>,
    pub sort: SortOrder,
}

impl SearchQuery {
    /// Exact-field search on `field`
    pub fn exact(field: SearchField, value: impl Into<String>) -> Self {
        Self {
            mode: SearchMode::ExactField(field),
            filter_value: Some(value.into()),
            center: None,
            radius_miles: None,
            sort: SortOrder::None,
        }
    }

    /// Radius search around `center`
    pub fn radius(center: Coordinate, radius_miles: f64) -> Self {
        Self {
            mode: SearchMode::Radius,
            filter_value: None,
            center: Some(center),
            radius_miles: Some(radius_miles),
            sort: SortOrder::None,
        }
    }

    pub fn sorted(mut self, sort: SortOrder) -> Self {
        self.sort = sort;
        self
    }
}

/// Geospatial bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

/// Kind of file-producing operation recorded in the audit log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Import,
    Export,
    PdfExport,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Import => "import",
            OperationKind::Export => "export",
            OperationKind::PdfExport => "pdf_export",
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audit log entry linking a stored artifact to its origin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub original_filename: String,
    pub generated_name: String,
    pub operation_kind: OperationKind,
    pub source_extension: String,
    pub requester_origin: String,
    pub created_at: DateTime<Utc>,
}

/// Market entry on the paginated directory listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketListing {
    pub name: String,
    pub city: String,
    pub region: String,
    pub rating: f64,
    pub review_count: i64,
}

/// Market entry ranked by rating in the directory statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatedMarket {
    pub name: String,
    pub city: String,
    pub region: String,
    pub average_rating: f64,
    pub review_count: i64,
}

/// Number of markets in a region
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionCount {
    pub region: String,
    pub count: i64,
}

/// Aggregate directory figures
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryStats {
    pub total_markets: i64,
    pub total_reviews: i64,
    pub average_rating: f64,
    pub top_markets: Vec<RatedMarket>,
    pub markets_by_region: Vec<RegionCount>,
}

/// One row of the bulk export
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRow {
    pub market_id: i64,
    pub name: String,
    pub street: String,
    pub city: String,
    pub region: String,
    pub zip: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub location: Option<String>,
    pub average_rating: f64,
    pub review_count: i64,
}

/// Keyset position after the last exported row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportCursor {
    pub name: String,
    pub market_id: i64,
}

impl From<&ExportRow> for ExportCursor {
    fn from(row: &ExportRow) -> Self {
        Self {
            name: row.name.clone(),
            market_id: row.market_id,
        }
    }
}
