use std::str::FromStr;

use crate::core::distance::haversine_distance;
use crate::core::search::SearchError;
use crate::models::{Coordinate, MarketRow, SearchField};

impl SearchField {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchField::Name => "name",
            SearchField::City => "city",
            SearchField::Region => "region",
            SearchField::Zip => "zip",
        }
    }
}

impl FromStr for SearchField {
    type Err = SearchError;

    /// Only the allow-listed names are accepted; `state` is kept as an alias
    /// for `region`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "name" | "market_name" => Ok(SearchField::Name),
            "city" => Ok(SearchField::City),
            "region" | "state" => Ok(SearchField::Region),
            "zip" => Ok(SearchField::Zip),
            other => Err(SearchError::InvalidQuery(format!(
                "unsupported search field '{}'",
                other
            ))),
        }
    }
}

/// Trim and case-fold a value for exact matching
#[inline]
pub fn fold(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Value of `field` on a candidate row
#[inline]
pub fn field_value(row: &MarketRow, field: SearchField) -> &str {
    match field {
        SearchField::Name => &row.name,
        SearchField::City => &row.city,
        SearchField::Region => &row.region,
        SearchField::Zip => &row.zip,
    }
}

/// Check if a row's field equals an already folded filter value
#[inline]
pub fn matches_exact_field(row: &MarketRow, field: SearchField, folded_value: &str) -> bool {
    fold(field_value(row, field)) == folded_value
}

/// Distance from `center` when the row lies within `radius_miles`
///
/// Rows without a coordinate never match. The threshold is compared at full
/// precision.
#[inline]
pub fn distance_within_radius(row: &MarketRow, center: Coordinate, radius_miles: f64) -> Option<f64> {
    let point = row.coordinate()?;
    let distance = haversine_distance(point, center);
    (distance <= radius_miles).then_some(distance)
}

/// Round a distance to one decimal place for display
#[inline]
pub fn round_distance(distance: f64) -> f64 {
    (distance * 10.0).round() / 10.0
}
