// Core algorithm exports
pub mod distance;
pub mod filters;
pub mod paging;
pub mod provenance;
pub mod search;
pub mod sorting;

/// Error type returned by collaborator traits
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub use distance::{calculate_bounding_box, haversine_distance, is_within_bounding_box, EARTH_RADIUS_MILES};
pub use filters::{distance_within_radius, fold, matches_exact_field, round_distance};
pub use paging::Page;
pub use provenance::{file_extension, generate_name, AuditStore, BlobStore, ProvenanceError, ProvenanceLedger};
pub use search::{RatingLookup, RowFilter, RowSource, SearchEngine, SearchError};
