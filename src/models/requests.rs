use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::core::search::SearchError;
use crate::models::domain::{Coordinate, SearchField, SearchMode, SearchQuery, SortOrder};

/// Raw search parameters from the query string
///
/// Numbers are kept as strings so that malformed input surfaces as an
/// invalid query instead of a deserialization failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchParams {
    /// Field to match exactly (`name`, `city`, `region`/`state`, `zip`)
    pub mode: Option<String>,
    /// `1`/`true` selects radius search
    pub radius: Option<String>,
    pub sort: Option<String>,
    pub q: Option<String>,
    pub lat: Option<String>,
    pub lon: Option<String>,
    #[serde(alias = "radius_miles")]
    pub radius_val: Option<String>,
}

impl SearchParams {
    pub fn radius_selected(&self) -> bool {
        matches!(
            self.radius.as_deref().map(|r| r.trim().to_lowercase()).as_deref(),
            Some("1" | "true" | "on" | "yes")
        )
    }

    /// Validate and convert into a [`SearchQuery`]
    ///
    /// Selecting radius search makes the field and its value irrelevant, even
    /// when both are supplied.
    pub fn into_query(self) -> Result<SearchQuery, SearchError> {
        let sort = match self.sort.as_deref() {
            Some(s) => s.parse::<SortOrder>()?,
            None => SortOrder::None,
        };

        if self.radius_selected() {
            let latitude = parse_number("lat", self.lat.as_deref())?;
            let longitude = parse_number("lon", self.lon.as_deref())?;
            let radius_miles = parse_number("radius_val", self.radius_val.as_deref())?;

            return Ok(SearchQuery {
                mode: SearchMode::Radius,
                filter_value: self.q,
                center: Some(Coordinate::new(latitude, longitude)),
                radius_miles: Some(radius_miles),
                sort,
            });
        }

        let field = self
            .mode
            .as_deref()
            .unwrap_or("city")
            .parse::<SearchField>()?;

        Ok(SearchQuery {
            mode: SearchMode::ExactField(field),
            filter_value: self.q,
            center: None,
            radius_miles: None,
            sort,
        })
    }
}

fn parse_number(name: &str, value: Option<&str>) -> Result<f64, SearchError> {
    let raw = value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| SearchError::InvalidQuery(format!("'{}' is required for radius search", name)))?;

    raw.parse::<f64>()
        .map_err(|_| SearchError::InvalidQuery(format!("'{}' must be a number, got '{}'", name, raw)))
}

/// Market listing parameters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListMarketsParams {
    pub page: Option<String>,
}

/// Import upload parameters
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ImportParams {
    #[validate(length(min = 1, max = 255))]
    pub filename: String,
}
