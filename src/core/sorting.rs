use std::collections::HashMap;
use std::str::FromStr;

use crate::core::search::SearchError;
use crate::models::{MarketSummary, SortOrder};

impl FromStr for SortOrder {
    type Err = SearchError;

    /// Accepts the numeric codes used by the search form (`0`..`3`) as well
    /// as the named orders.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "0" | "none" => Ok(SortOrder::None),
            "1" | "name_asc" => Ok(SortOrder::NameAsc),
            "2" | "name_desc" => Ok(SortOrder::NameDesc),
            "3" | "rating_desc" => Ok(SortOrder::RatingDesc),
            other => Err(SearchError::InvalidQuery(format!(
                "unsupported sort order '{}'",
                other
            ))),
        }
    }
}

/// Sort summaries by name. `sort_by` is stable, so equal names keep their
/// filter order.
pub fn sort_by_name(results: &mut [MarketSummary], descending: bool) {
    if descending {
        results.sort_by(|a, b| b.name.cmp(&a.name));
    } else {
        results.sort_by(|a, b| a.name.cmp(&b.name));
    }
}

/// Attach ratings from `ratings` and sort descending by rating
///
/// Markets missing from the map are rated 0.0. Ties keep filter order.
pub fn sort_by_rating(results: &mut [MarketSummary], ratings: &HashMap<String, f64>) {
    for summary in results.iter_mut() {
        summary.rating = Some(ratings.get(&summary.name).copied().unwrap_or(0.0));
    }

    results.sort_by(|a, b| {
        let a_rating = a.rating.unwrap_or(0.0);
        let b_rating = b.rating.unwrap_or(0.0);
        b_rating.total_cmp(&a_rating)
    });
}
