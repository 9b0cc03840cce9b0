use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::Arc;

use thiserror::Error;

use crate::core::distance::calculate_bounding_box;
use crate::core::filters::{distance_within_radius, fold, matches_exact_field, round_distance};
use crate::core::sorting::{sort_by_name, sort_by_rating};
use crate::core::BoxError;
use crate::models::{
    BoundingBox, Coordinate, MarketRow, MarketSummary, SearchField, SearchMode, SearchQuery,
    SortOrder,
};

/// Errors that can occur while searching markets
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Market lookup failed: {0}")]
    Backend(#[source] BoxError),
}

/// Narrowing hint passed to the row source
///
/// The engine re-applies its own predicates to whatever comes back, so a
/// source may ignore the hint and return every market.
#[derive(Debug, Clone, PartialEq)]
pub enum RowFilter {
    All,
    /// Trimmed, lower-cased value of `field` equals the given folded value
    FieldEquals(SearchField, String),
    Within(BoundingBox),
}

/// Read access to candidate markets
pub trait RowSource: Send + Sync {
    fn fetch_markets(
        &self,
        filter: &RowFilter,
    ) -> impl Future<Output = Result<Vec<MarketRow>, BoxError>> + Send;
}

/// Batched average-rating lookup keyed by market name
pub trait RatingLookup: Send + Sync {
    fn average_ratings_for(
        &self,
        names: &BTreeSet<String>,
    ) -> impl Future<Output = Result<HashMap<String, f64>, BoxError>> + Send;
}

impl<T: RowSource> RowSource for Arc<T> {
    fn fetch_markets(
        &self,
        filter: &RowFilter,
    ) -> impl Future<Output = Result<Vec<MarketRow>, BoxError>> + Send {
        (**self).fetch_markets(filter)
    }
}

impl<T: RatingLookup> RatingLookup for Arc<T> {
    fn average_ratings_for(
        &self,
        names: &BTreeSet<String>,
    ) -> impl Future<Output = Result<HashMap<String, f64>, BoxError>> + Send {
        (**self).average_ratings_for(names)
    }
}

/// Validated filtering strategy derived from a [`SearchQuery`]
#[derive(Debug, Clone, PartialEq)]
enum FilterPlan {
    Radius { center: Coordinate, radius_miles: f64 },
    Field { field: SearchField, folded: String },
}

impl FilterPlan {
    fn from_query(query: &SearchQuery) -> Result<Self, SearchError> {
        match query.mode {
            SearchMode::Radius => {
                let center = query.center.ok_or_else(|| {
                    SearchError::InvalidQuery("radius search requires a center".into())
                })?;
                let radius_miles = query.radius_miles.ok_or_else(|| {
                    SearchError::InvalidQuery("radius search requires a radius".into())
                })?;

                if !center.is_valid() {
                    return Err(SearchError::InvalidQuery(format!(
                        "center ({}, {}) is out of range",
                        center.latitude, center.longitude
                    )));
                }
                if !radius_miles.is_finite() || radius_miles < 0.0 {
                    return Err(SearchError::InvalidQuery(format!(
                        "radius {} must be a non-negative number",
                        radius_miles
                    )));
                }

                Ok(FilterPlan::Radius { center, radius_miles })
            }
            SearchMode::ExactField(field) => {
                let folded = query.filter_value.as_deref().map(fold).unwrap_or_default();
                if folded.is_empty() {
                    return Err(SearchError::InvalidQuery(format!(
                        "a value is required to search by {}",
                        field.as_str()
                    )));
                }

                Ok(FilterPlan::Field { field, folded })
            }
        }
    }
}

/// Market search orchestrator
///
/// # Pipeline Stages
/// 1. Query validation (before any row is fetched)
/// 2. Candidate fetch with a narrowing hint
/// 3. Radius or exact-field filtering
/// 4. Optional batched rating lookup and sorting
#[derive(Debug, Clone)]
pub struct SearchEngine {
    bounding_box_prefilter: bool,
}

impl SearchEngine {
    pub fn new(bounding_box_prefilter: bool) -> Self {
        Self { bounding_box_prefilter }
    }

    /// Run a search against `rows`, consulting `ratings` only for
    /// [`SortOrder::RatingDesc`]
    pub async fn search<S, L>(
        &self,
        query: &SearchQuery,
        rows: &S,
        ratings: &L,
    ) -> Result<Vec<MarketSummary>, SearchError>
    where
        S: RowSource,
        L: RatingLookup,
    {
        let plan = FilterPlan::from_query(query)?;
        let hint = self.row_filter(&plan);

        let candidates = rows
            .fetch_markets(&hint)
            .await
            .map_err(SearchError::Backend)?;
        let total_candidates = candidates.len();

        let mut results = apply_plan(&plan, candidates);
        self.rank(query.sort, &mut results, ratings).await?;

        tracing::debug!(
            "Search {:?} kept {} of {} candidates",
            query.mode,
            results.len(),
            total_candidates
        );

        Ok(results)
    }

    /// Filter already fetched rows without sorting
    pub fn filter(
        &self,
        query: &SearchQuery,
        candidates: Vec<MarketRow>,
    ) -> Result<Vec<MarketSummary>, SearchError> {
        let plan = FilterPlan::from_query(query)?;
        Ok(apply_plan(&plan, candidates))
    }

    /// Sort filtered results in place
    ///
    /// Rating order makes one batched lookup for the distinct names of a
    /// non-empty result set.
    pub async fn rank<L: RatingLookup>(
        &self,
        sort: SortOrder,
        results: &mut [MarketSummary],
        ratings: &L,
    ) -> Result<(), SearchError> {
        match sort {
            SortOrder::None => {}
            SortOrder::NameAsc => sort_by_name(results, false),
            SortOrder::NameDesc => sort_by_name(results, true),
            SortOrder::RatingDesc => {
                if results.is_empty() {
                    return Ok(());
                }

                let names: BTreeSet<String> = results.iter().map(|s| s.name.clone()).collect();
                let rating_map = ratings
                    .average_ratings_for(&names)
                    .await
                    .map_err(SearchError::Backend)?;

                sort_by_rating(results, &rating_map);
            }
        }

        Ok(())
    }

    fn row_filter(&self, plan: &FilterPlan) -> RowFilter {
        match plan {
            FilterPlan::Radius { center, radius_miles } if self.bounding_box_prefilter => {
                RowFilter::Within(calculate_bounding_box(*center, *radius_miles))
            }
            FilterPlan::Radius { .. } => RowFilter::All,
            FilterPlan::Field { field, folded } => RowFilter::FieldEquals(*field, folded.clone()),
        }
    }
}

impl Default for SearchEngine {
    fn default() -> Self {
        Self::new(true)
    }
}

fn apply_plan(plan: &FilterPlan, candidates: Vec<MarketRow>) -> Vec<MarketSummary> {
    match plan {
        FilterPlan::Radius { center, radius_miles } => candidates
            .into_iter()
            .filter_map(|row| {
                let distance = distance_within_radius(&row, *center, *radius_miles)?;
                let mut summary = MarketSummary::from(row);
                summary.distance = Some(round_distance(distance));
                Some(summary)
            })
            .collect(),
        FilterPlan::Field { field, folded } => candidates
            .into_iter()
            .filter(|row| matches_exact_field(row, *field, folded))
            .map(MarketSummary::from)
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_row(name: &str, city: &str, lat: Option<f64>, lon: Option<f64>) -> MarketRow {
        MarketRow {
            name: name.to_string(),
            city: city.to_string(),
            region: "Moscow".to_string(),
            zip: "101000".to_string(),
            latitude: lat,
            longitude: lon,
        }
    }

    #[test]
    fn test_radius_requires_center() {
        let mut query = SearchQuery::radius(Coordinate::new(0.0, 0.0), 10.0);
        query.center = None;

        let engine = SearchEngine::default();
        assert!(matches!(
            engine.filter(&query, vec![]),
            Err(SearchError::InvalidQuery(_))
        ));
    }

    #[test]
    fn test_radius_rejects_non_finite_and_negative() {
        let engine = SearchEngine::default();

        let nan = SearchQuery::radius(Coordinate::new(0.0, 0.0), f64::NAN);
        assert!(engine.filter(&nan, vec![]).is_err());

        let negative = SearchQuery::radius(Coordinate::new(0.0, 0.0), -1.0);
        assert!(engine.filter(&negative, vec![]).is_err());

        let off_globe = SearchQuery::radius(Coordinate::new(91.0, 0.0), 10.0);
        assert!(engine.filter(&off_globe, vec![]).is_err());
    }

    #[test]
    fn test_field_mode_requires_value() {
        let engine = SearchEngine::default();
        let query = SearchQuery::exact(SearchField::City, "   ");

        assert!(matches!(
            engine.filter(&query, vec![]),
            Err(SearchError::InvalidQuery(_))
        ));
    }

    #[test]
    fn test_radius_ignores_filter_value() {
        let engine = SearchEngine::default();
        let mut query = SearchQuery::radius(Coordinate::new(55.7558, 37.6176), 5.0);
        query.filter_value = Some("Nowhere".to_string());

        let rows = vec![create_row("Central", "Moscow", Some(55.76), Some(37.62))];
        let results = engine.filter(&query, rows).unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].distance, Some(0.3));
        assert!(results[0].rating.is_none());
    }

    #[test]
    fn test_row_filter_hint() {
        let query = SearchQuery::exact(SearchField::City, " Moscow ");
        let plan = FilterPlan::from_query(&query).unwrap();

        assert_eq!(
            SearchEngine::default().row_filter(&plan),
            RowFilter::FieldEquals(SearchField::City, "moscow".to_string())
        );

        let radius = SearchQuery::radius(Coordinate::new(10.0, 10.0), 5.0);
        let plan = FilterPlan::from_query(&radius).unwrap();
        assert_eq!(SearchEngine::new(false).row_filter(&plan), RowFilter::All);
        assert!(matches!(
            SearchEngine::new(true).row_filter(&plan),
            RowFilter::Within(_)
        ));
    }
}
