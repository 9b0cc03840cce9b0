//! Market Directory - farmers' market search service
//!
//! This library provides exact-field and radius search over a directory of
//! farmers' markets, rating-ordered results, and a provenance ledger that
//! stores every imported or exported file under a generated name with an
//! audit trail.

pub mod config;
pub mod core;
pub mod models;
pub mod routes;
pub mod services;

// Re-export commonly used types
pub use core::{
    distance::{calculate_bounding_box, haversine_distance},
    ProvenanceLedger, SearchEngine,
};
pub use models::{Coordinate, MarketRow, MarketSummary, SearchQuery};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_exports() {
        let center = Coordinate::new(40.7128, -74.0060);
        let bbox = calculate_bounding_box(center, 10.0);
        assert!(bbox.min_lat < 40.7128);
        assert_eq!(haversine_distance(center, center), 0.0);
    }
}
