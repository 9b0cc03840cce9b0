use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use thiserror::Error;

use crate::config::DatabaseSettings;
use crate::core::{AuditStore, BoxError, RatingLookup, RowFilter, RowSource};
use crate::models::{
    ArtifactRecord, DirectoryStats, ExportCursor, ExportRow, MarketListing, MarketRow,
    RatedMarket, RegionCount, SearchField,
};
use crate::services::export::ExportSource;

/// Errors that can occur when interacting with PostgreSQL
#[derive(Debug, Error)]
pub enum PostgresError {
    #[error("SQLx error: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    MigrateError(#[from] sqlx::migrate::MigrateError),
}

const MARKET_COLUMNS: &str = "SELECT market_name, city, state, zip, y AS lat, x AS lon FROM farmers_markets";

/// Parameterized exact-match query for each searchable field
///
/// Column names come from this closed mapping only.
fn field_query(field: SearchField) -> &'static str {
    match field {
        SearchField::Name => {
            "SELECT market_name, city, state, zip, y AS lat, x AS lon FROM farmers_markets \
             WHERE LOWER(TRIM(market_name)) = $1"
        }
        SearchField::City => {
            "SELECT market_name, city, state, zip, y AS lat, x AS lon FROM farmers_markets \
             WHERE LOWER(TRIM(city)) = $1"
        }
        SearchField::Region => {
            "SELECT market_name, city, state, zip, y AS lat, x AS lon FROM farmers_markets \
             WHERE LOWER(TRIM(state)) = $1"
        }
        SearchField::Zip => {
            "SELECT market_name, city, state, zip, y AS lat, x AS lon FROM farmers_markets \
             WHERE LOWER(TRIM(zip)) = $1"
        }
    }
}

fn market_row(row: &PgRow) -> Result<MarketRow, sqlx::Error> {
    Ok(MarketRow {
        name: row.try_get("market_name")?,
        city: row.try_get("city")?,
        region: row.try_get("state")?,
        zip: row.try_get("zip")?,
        latitude: row.try_get("lat")?,
        longitude: row.try_get("lon")?,
    })
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// PostgreSQL client for the market directory and the artifact audit log
pub struct PostgresClient {
    pool: PgPool,
}

impl PostgresClient {
    /// Create a new PostgreSQL client from a connection string
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
        acquire_timeout: Duration,
        idle_timeout: Duration,
    ) -> Result<Self, PostgresError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(acquire_timeout)
            .idle_timeout(idle_timeout)
            .test_before_acquire(true)
            .connect(database_url)
            .await?;

        // Run migrations on startup
        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    /// Create a new PostgreSQL client from settings
    pub async fn from_settings(settings: &DatabaseSettings) -> Result<Self, PostgresError> {
        let max_connections = settings.max_connections.unwrap_or(10);
        tracing::info!("Connecting to PostgreSQL (max {} connections)", max_connections);

        Self::new(
            &settings.url,
            max_connections,
            settings.min_connections.unwrap_or(1),
            Duration::from_secs(settings.acquire_timeout_secs.unwrap_or(5)),
            Duration::from_secs(settings.idle_timeout_secs.unwrap_or(600)),
        )
        .await
    }

    /// Count all markets in the directory
    pub async fn count_markets(&self) -> Result<i64, PostgresError> {
        let row = sqlx::query("SELECT COUNT(*) AS total FROM farmers_markets")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("total")?)
    }

    /// One page of the directory ordered by name, with rating aggregates
    pub async fn list_markets(
        &self,
        limit: u32,
        offset: u64,
    ) -> Result<Vec<MarketListing>, PostgresError> {
        let query = r#"
            SELECT fm.market_name, fm.city, fm.state,
                   COALESCE(AVG(r.rating)::float8, 0) AS avg_rating,
                   COUNT(r.review_id) AS review_count
            FROM farmers_markets fm
            LEFT JOIN reviews r ON fm.market_id = r.market_id
            GROUP BY fm.market_id, fm.market_name, fm.city, fm.state
            ORDER BY fm.market_name
            LIMIT $1 OFFSET $2
        "#;

        let rows = sqlx::query(query)
            .bind(i64::from(limit))
            .bind(i64::try_from(offset).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;

        let markets = rows
            .iter()
            .map(|row| {
                let avg: f64 = row.try_get("avg_rating")?;
                Ok(MarketListing {
                    name: row.try_get("market_name")?,
                    city: row.try_get("city")?,
                    region: row.try_get("state")?,
                    rating: round_to(avg, 1),
                    review_count: row.try_get("review_count")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()?;

        Ok(markets)
    }

    /// Aggregate figures for the statistics page
    pub async fn directory_stats(&self) -> Result<DirectoryStats, PostgresError> {
        let total_markets: i64 = sqlx::query("SELECT COUNT(*) AS total FROM farmers_markets")
            .fetch_one(&self.pool)
            .await?
            .try_get("total")?;

        let reviews = sqlx::query(
            "SELECT COUNT(*) AS total, COALESCE(ROUND(AVG(rating), 2)::float8, 0) AS avg_rating FROM reviews",
        )
        .fetch_one(&self.pool)
        .await?;

        let top_rows = sqlx::query(
            r#"
            SELECT fm.market_name, fm.city, fm.state,
                   COALESCE(ROUND(AVG(r.rating), 2)::float8, 0) AS avg_rating,
                   COUNT(r.review_id) AS review_count
            FROM farmers_markets fm
            LEFT JOIN reviews r ON fm.market_id = r.market_id
            GROUP BY fm.market_id, fm.market_name, fm.city, fm.state
            HAVING COUNT(r.review_id) > 0
            ORDER BY avg_rating DESC, review_count DESC
            LIMIT 5
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let top_markets = top_rows
            .iter()
            .map(|row| {
                Ok(RatedMarket {
                    name: row.try_get("market_name")?,
                    city: row.try_get("city")?,
                    region: row.try_get("state")?,
                    average_rating: row.try_get("avg_rating")?,
                    review_count: row.try_get("review_count")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()?;

        let region_rows = sqlx::query(
            r#"
            SELECT state, COUNT(*) AS count
            FROM farmers_markets
            GROUP BY state
            ORDER BY count DESC
            LIMIT 10
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let markets_by_region = region_rows
            .iter()
            .map(|row| {
                Ok(RegionCount {
                    region: row.try_get("state")?,
                    count: row.try_get("count")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()?;

        Ok(DirectoryStats {
            total_markets,
            total_reviews: reviews.try_get("total")?,
            average_rating: reviews.try_get("avg_rating")?,
            top_markets,
            markets_by_region,
        })
    }

    /// Health check for the database connection
    pub async fn health_check(&self) -> Result<bool, PostgresError> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map(|_| true)
            .map_err(Into::into)
    }

    async fn query_markets(&self, filter: &RowFilter) -> Result<Vec<MarketRow>, PostgresError> {
        let rows = match filter {
            RowFilter::All => sqlx::query(MARKET_COLUMNS).fetch_all(&self.pool).await?,
            RowFilter::FieldEquals(field, value) => {
                sqlx::query(field_query(*field))
                    .bind(value)
                    .fetch_all(&self.pool)
                    .await?
            }
            RowFilter::Within(bbox) => {
                let query = r#"
                    SELECT market_name, city, state, zip, y AS lat, x AS lon
                    FROM farmers_markets
                    WHERE y BETWEEN $1 AND $2 AND x BETWEEN $3 AND $4
                "#;
                sqlx::query(query)
                    .bind(bbox.min_lat)
                    .bind(bbox.max_lat)
                    .bind(bbox.min_lon)
                    .bind(bbox.max_lon)
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        let markets = rows
            .iter()
            .map(market_row)
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!("Fetched {} candidate markets for {:?}", markets.len(), filter);

        Ok(markets)
    }

    async fn query_ratings(
        &self,
        names: &BTreeSet<String>,
    ) -> Result<HashMap<String, f64>, PostgresError> {
        let query = r#"
            SELECT fm.market_name, COALESCE(AVG(r.rating)::float8, 0) AS avg_rating
            FROM farmers_markets fm
            LEFT JOIN reviews r ON fm.market_id = r.market_id
            WHERE fm.market_name = ANY($1)
            GROUP BY fm.market_name
        "#;

        let names: Vec<String> = names.iter().cloned().collect();
        let rows = sqlx::query(query).bind(&names).fetch_all(&self.pool).await?;

        let ratings = rows
            .iter()
            .map(|row| Ok((row.try_get("market_name")?, row.try_get("avg_rating")?)))
            .collect::<Result<HashMap<String, f64>, sqlx::Error>>()?;

        Ok(ratings)
    }

    async fn insert_file_log(&self, record: &ArtifactRecord) -> Result<(), PostgresError> {
        let query = r#"
            INSERT INTO file_logs (
                original_filename, hashed_filename, operation_type,
                file_extension, user_ip, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6)
        "#;

        sqlx::query(query)
            .bind(&record.original_filename)
            .bind(&record.generated_name)
            .bind(record.operation_kind.as_str())
            .bind(&record.source_extension)
            .bind(&record.requester_origin)
            .bind(record.created_at)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn query_export_chunk(
        &self,
        after: Option<&ExportCursor>,
        limit: u32,
    ) -> Result<Vec<ExportRow>, PostgresError> {
        let query = r#"
            SELECT fm.market_id, fm.market_name, fm.street, fm.city, fm.state, fm.zip,
                   fm.y AS lat, fm.x AS lon, fm.location,
                   COALESCE(AVG(r.rating)::float8, 0) AS avg_rating,
                   COUNT(r.review_id) AS review_count
            FROM farmers_markets fm
            LEFT JOIN reviews r ON fm.market_id = r.market_id
            WHERE $1::text IS NULL OR (fm.market_name, fm.market_id) > ($1::text, $2::bigint)
            GROUP BY fm.market_id
            ORDER BY fm.market_name, fm.market_id
            LIMIT $3
        "#;

        let rows = sqlx::query(query)
            .bind(after.map(|c| c.name.clone()))
            .bind(after.map(|c| c.market_id))
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;

        let chunk = rows
            .iter()
            .map(|row| {
                Ok(ExportRow {
                    market_id: row.try_get("market_id")?,
                    name: row.try_get("market_name")?,
                    street: row.try_get("street")?,
                    city: row.try_get("city")?,
                    region: row.try_get("state")?,
                    zip: row.try_get("zip")?,
                    latitude: row.try_get("lat")?,
                    longitude: row.try_get("lon")?,
                    location: row.try_get("location")?,
                    average_rating: row.try_get("avg_rating")?,
                    review_count: row.try_get("review_count")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()?;

        Ok(chunk)
    }
}

impl RowSource for PostgresClient {
    async fn fetch_markets(&self, filter: &RowFilter) -> Result<Vec<MarketRow>, BoxError> {
        Ok(self.query_markets(filter).await?)
    }
}

impl RatingLookup for PostgresClient {
    async fn average_ratings_for(
        &self,
        names: &BTreeSet<String>,
    ) -> Result<HashMap<String, f64>, BoxError> {
        Ok(self.query_ratings(names).await?)
    }
}

impl AuditStore for PostgresClient {
    async fn insert(&self, record: &ArtifactRecord) -> Result<(), BoxError> {
        Ok(self.insert_file_log(record).await?)
    }
}

impl ExportSource for PostgresClient {
    async fn fetch_export_chunk(
        &self,
        after: Option<&ExportCursor>,
        limit: u32,
    ) -> Result<Vec<ExportRow>, BoxError> {
        Ok(self.query_export_chunk(after, limit).await?)
    }
}
