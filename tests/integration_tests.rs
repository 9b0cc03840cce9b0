// Integration tests for the market directory

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use uuid::Uuid;

use market_directory::core::{
    generate_name, haversine_distance, BlobStore, ProvenanceError, ProvenanceLedger, SearchEngine,
    SearchError, EARTH_RADIUS_MILES,
};
use market_directory::models::{
    Coordinate, ExportRow, MarketRow, OperationKind, SearchField, SearchParams, SearchQuery,
    SortOrder,
};
use market_directory::routes::files::{export_and_record, store_import};
use market_directory::routes::ApiError;
use market_directory::services::{
    BulkExporter, MemoryAuditLog, MemoryBlobStore, MemoryExportSource, MemoryMarkets,
};

fn create_market(name: &str, city: &str, lat: Option<f64>, lon: Option<f64>) -> MarketRow {
    MarketRow {
        name: name.to_string(),
        city: city.to_string(),
        region: "Test Region".to_string(),
        zip: "100000".to_string(),
        latitude: lat,
        longitude: lon,
    }
}

/// Market due north of the equator/prime meridian at exactly `miles`
fn market_at_miles(name: &str, miles: f64) -> MarketRow {
    let latitude = (miles / EARTH_RADIUS_MILES).to_degrees();
    create_market(name, "Meridian", Some(latitude), Some(0.0))
}

fn fixed_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 9, 30, 0).unwrap()
}

fn scratch_file(content: &[u8]) -> tempfile::NamedTempFile {
    let file = tempfile::NamedTempFile::new().unwrap();
    std::fs::write(file.path(), content).unwrap();
    file
}

#[tokio::test]
async fn test_radius_search_keeps_markets_inside_radius() {
    let markets = MemoryMarkets::new(vec![
        market_at_miles("Ten", 10.0),
        market_at_miles("Fifty", 50.0),
        market_at_miles("OneFifty", 150.0),
    ]);
    let engine = SearchEngine::default();
    let query = SearchQuery::radius(Coordinate::new(0.0, 0.0), 100.0);

    let results = engine.search(&query, &markets, &markets).await.unwrap();

    let names: Vec<_> = results.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["Ten", "Fifty"]);
    assert_eq!(results[0].distance, Some(10.0));
    assert_eq!(results[1].distance, Some(50.0));
}

#[tokio::test]
async fn test_radius_search_without_prefilter_gives_same_results() {
    let rows = vec![
        market_at_miles("Ten", 10.0),
        market_at_miles("Fifty", 50.0),
        market_at_miles("OneFifty", 150.0),
    ];
    let query = SearchQuery::radius(Coordinate::new(0.0, 0.0), 100.0);

    let with = MemoryMarkets::new(rows.clone());
    let without = MemoryMarkets::new(rows);

    let a = SearchEngine::new(true).search(&query, &with, &with).await.unwrap();
    let b = SearchEngine::new(false).search(&query, &without, &without).await.unwrap();

    assert_eq!(a, b);
}

#[tokio::test]
async fn test_market_exactly_on_radius_found_with_and_without_prefilter() {
    let center = Coordinate::new(55.7558, 37.6176);

    for step in 0..500 {
        let miles = 25.0 + step as f64 * 0.01;
        let north = (center.latitude + (miles / EARTH_RADIUS_MILES).to_degrees(), center.longitude);
        let market = create_market("Edge", "Moscow", Some(north.0), Some(north.1));
        let radius = haversine_distance(market.coordinate().unwrap(), center);
        let query = SearchQuery::radius(center, radius);

        let with = MemoryMarkets::new(vec![market.clone()]);
        let without = MemoryMarkets::new(vec![market]);

        let a = SearchEngine::new(true).search(&query, &with, &with).await.unwrap();
        let b = SearchEngine::new(false).search(&query, &without, &without).await.unwrap();

        assert_eq!(b.len(), 1, "haversine must keep the edge market at {} mi", radius);
        assert_eq!(a, b, "prefilter changed results at {} mi", radius);
    }
}

#[tokio::test]
async fn test_radius_covering_globe_keeps_antipodal_market() {
    let markets = MemoryMarkets::new(vec![create_market("Far", "Apia", Some(5.63), Some(1.11))]);
    let query = SearchQuery::radius(Coordinate::new(-5.63, -178.89), 13_000.0);

    let results = SearchEngine::default()
        .search(&query, &markets, &markets)
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    assert!(results[0].distance.is_some_and(|d| d.is_finite()));
}

#[tokio::test]
async fn test_radius_search_skips_markets_without_coordinates() {
    let markets = MemoryMarkets::new(vec![
        create_market("Nowhere", "Moscow", None, None),
        create_market("HalfKnown", "Moscow", Some(55.75), None),
        create_market("Center", "Moscow", Some(55.7558), Some(37.6176)),
    ]);
    let engine = SearchEngine::new(false);
    let query = SearchQuery::radius(Coordinate::new(55.7558, 37.6176), 20_000.0);

    let results = engine.search(&query, &markets, &markets).await.unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].name, "Center");
}

#[tokio::test]
async fn test_exact_field_is_case_and_whitespace_insensitive() {
    let markets = MemoryMarkets::new(vec![
        create_market("Danilovsky", "moscow", None, None),
        create_market("Kuznechny", "Saint Petersburg", None, None),
    ]);
    let engine = SearchEngine::default();
    let query = SearchQuery::exact(SearchField::City, " Moscow ");

    let results = engine.search(&query, &markets, &markets).await.unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].name, "Danilovsky");
    assert!(results[0].distance.is_none());
}

#[tokio::test]
async fn test_radius_request_ignores_field_filter() {
    let markets = MemoryMarkets::new(vec![
        create_market("Danilovsky", "Moscow", Some(55.7105), Some(37.6216)),
        create_market("Kuznechny", "Saint Petersburg", Some(59.9286), Some(30.3497)),
    ]);
    let params = SearchParams {
        mode: Some("city".to_string()),
        q: Some("Saint Petersburg".to_string()),
        radius: Some("1".to_string()),
        lat: Some("55.7558".to_string()),
        lon: Some("37.6176".to_string()),
        radius_val: Some("50".to_string()),
        ..Default::default()
    };

    let query = params.into_query().unwrap();
    let results = SearchEngine::default()
        .search(&query, &markets, &markets)
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].name, "Danilovsky");
}

#[tokio::test]
async fn test_empty_field_value_rejected_before_fetch() {
    let markets = MemoryMarkets::new(vec![create_market("A", "Moscow", None, None)]);
    let query = SearchQuery::exact(SearchField::Name, "");

    let result = SearchEngine::default().search(&query, &markets, &markets).await;

    assert!(matches!(result, Err(SearchError::InvalidQuery(_))));
    assert_eq!(markets.fetches(), 0);
}

#[tokio::test]
async fn test_disallowed_field_never_reaches_row_source() {
    let markets = MemoryMarkets::new(vec![create_market("A", "Moscow", None, None)]);
    let params = SearchParams {
        mode: Some("market_name); DROP TABLE farmers_markets; --".to_string()),
        q: Some("A".to_string()),
        ..Default::default()
    };

    let result = match params.into_query() {
        Ok(query) => SearchEngine::default().search(&query, &markets, &markets).await,
        Err(e) => Err(e),
    };

    assert!(matches!(result, Err(SearchError::InvalidQuery(_))));
    assert_eq!(markets.fetches(), 0);
}

#[tokio::test]
async fn test_rating_sort_uses_one_batched_lookup() {
    let markets = MemoryMarkets::new(vec![
        create_market("Alpha", "Kazan", None, None),
        create_market("Beta", "Kazan", None, None),
        create_market("Gamma", "Kazan", None, None),
    ])
    .with_rating("Alpha", 3.8)
    .with_rating("Beta", 4.5);

    let query = SearchQuery::exact(SearchField::City, "kazan").sorted(SortOrder::RatingDesc);
    let results = SearchEngine::default()
        .search(&query, &markets, &markets)
        .await
        .unwrap();

    let ratings: Vec<_> = results.iter().map(|r| r.rating).collect();
    assert_eq!(ratings, vec![Some(4.5), Some(3.8), Some(0.0)]);
    assert_eq!(results[0].name, "Beta");
    assert_eq!(markets.rating_lookups(), 1);
    assert_eq!(markets.last_rating_request().map(|n| n.len()), Some(3));
}

#[tokio::test]
async fn test_rating_sort_on_empty_result_skips_lookup() {
    let markets = MemoryMarkets::new(vec![create_market("Alpha", "Kazan", None, None)]);

    let query = SearchQuery::exact(SearchField::City, "Omsk").sorted(SortOrder::RatingDesc);
    let results = SearchEngine::default()
        .search(&query, &markets, &markets)
        .await
        .unwrap();

    assert!(results.is_empty());
    assert_eq!(markets.rating_lookups(), 0);
}

#[tokio::test]
async fn test_backend_failures_surface_as_backend_errors() {
    let markets = MemoryMarkets::new(vec![create_market("Alpha", "Kazan", None, None)]);
    let query = SearchQuery::exact(SearchField::City, "Kazan").sorted(SortOrder::RatingDesc);

    markets.fail_rating_lookups(true);
    let result = SearchEngine::default().search(&query, &markets, &markets).await;
    assert!(matches!(result, Err(SearchError::Backend(_))));

    markets.fail_fetches(true);
    let result = SearchEngine::default().search(&query, &markets, &markets).await;
    assert!(matches!(result, Err(SearchError::Backend(_))));
}

#[tokio::test]
async fn test_record_twice_creates_two_entries() {
    let blobs = Arc::new(MemoryBlobStore::new());
    let audit = Arc::new(MemoryAuditLog::new());
    let tick = Arc::new(AtomicI64::new(0));
    let ledger = ProvenanceLedger::new(blobs.clone(), audit.clone())
        .with_id_source(|| Uuid::from_u128(42))
        .with_clock(move || fixed_time() + Duration::seconds(tick.fetch_add(1, Ordering::SeqCst)));
    let file = scratch_file(b"%PDF-1.4");

    let first = ledger
        .record(file.path(), "report.pdf", OperationKind::PdfExport, "10.0.0.1")
        .await
        .unwrap();
    let second = ledger
        .record(file.path(), "report.pdf", OperationKind::PdfExport, "10.0.0.1")
        .await
        .unwrap();

    assert_ne!(first, second);
    assert_eq!(blobs.len(), 2);

    let records = audit.records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].generated_name, first);
    assert_eq!(records[0].created_at, fixed_time());
    assert_eq!(records[1].created_at, fixed_time() + Duration::seconds(1));
    assert_eq!(records[1].operation_kind, OperationKind::PdfExport);
    assert_eq!(records[1].source_extension, ".pdf");
}

#[tokio::test]
async fn test_failed_upload_leaves_no_audit_row() {
    let blobs = Arc::new(MemoryBlobStore::new());
    let audit = Arc::new(MemoryAuditLog::new());
    let ledger = ProvenanceLedger::new(blobs.clone(), audit.clone());
    let file = scratch_file(b"name,city\n");

    blobs.fail_puts(true);
    let result = ledger
        .record(file.path(), "markets.csv", OperationKind::Export, "10.0.0.1")
        .await;

    assert!(matches!(result, Err(ProvenanceError::Storage(_))));
    assert!(audit.records().is_empty());
    assert!(blobs.is_empty());
}

#[tokio::test]
async fn test_missing_local_file_is_storage_error() {
    let blobs = Arc::new(MemoryBlobStore::new());
    let audit = Arc::new(MemoryAuditLog::new());
    let ledger = ProvenanceLedger::new(blobs.clone(), audit.clone());
    let dir = tempfile::tempdir().unwrap();

    let result = ledger
        .record(&dir.path().join("gone.csv"), "gone.csv", OperationKind::Export, "10.0.0.1")
        .await;

    assert!(matches!(result, Err(ProvenanceError::Storage(_))));
    assert_eq!(blobs.puts(), 0);
    assert!(audit.records().is_empty());
}

#[tokio::test]
async fn test_failed_audit_leaves_orphan_blob() {
    let blobs = Arc::new(MemoryBlobStore::new());
    let audit = Arc::new(MemoryAuditLog::new());
    let id = Uuid::from_u128(7);
    let ledger = ProvenanceLedger::new(blobs.clone(), audit.clone())
        .with_id_source(move || id)
        .with_clock(fixed_time);
    let file = scratch_file(b"%PDF-1.4");

    audit.fail_inserts(true);
    let result = ledger
        .record(file.path(), "Market.PDF", OperationKind::PdfExport, "192.168.1.20")
        .await;

    assert!(matches!(result, Err(ProvenanceError::Audit(_))));
    assert!(audit.records().is_empty());

    let expected = generate_name(id, fixed_time(), "192.168.1.20", ".pdf");
    let stored = ledger.blobs().get(&expected).await.unwrap();
    assert_eq!(stored, Some(b"%PDF-1.4".to_vec()));
}

#[tokio::test]
async fn test_missing_extension_touches_nothing() {
    let blobs = Arc::new(MemoryBlobStore::new());
    let audit = Arc::new(MemoryAuditLog::new());
    let ledger = ProvenanceLedger::new(blobs.clone(), audit.clone());
    let file = scratch_file(b"data");

    let result = ledger
        .record(file.path(), "Makefile", OperationKind::Import, "10.0.0.1")
        .await;

    assert!(matches!(result, Err(ProvenanceError::MissingExtension(_))));
    assert_eq!(blobs.puts(), 0);
    assert!(audit.records().is_empty());
}

fn export_rows(count: i64) -> Vec<ExportRow> {
    (1..=count)
        .map(|i| ExportRow {
            market_id: i,
            name: format!("Market {:05}", i),
            street: format!("{} Main St", i),
            city: "Yaroslavl".to_string(),
            region: "Yaroslavl Oblast".to_string(),
            zip: "150000".to_string(),
            latitude: Some(57.6),
            longitude: Some(39.9),
            location: None,
            average_rating: 3.5,
            review_count: i % 4,
        })
        .collect()
}

#[tokio::test]
async fn test_bulk_export_reads_in_chunks() {
    let source = MemoryExportSource::new(export_rows(2500));
    let exporter = BulkExporter::new(1000);

    let exported = exporter.export(&source, fixed_time()).await.unwrap();

    assert_eq!(source.chunk_reads(), 3);
    assert_eq!(exported.rows, 2500);
    assert_eq!(exported.filename, "all_markets_20240601_093000.csv");

    let content = std::fs::read_to_string(exported.file.path()).unwrap();
    assert_eq!(content.lines().count(), 2501);
    assert!(content.starts_with("market_id,market_name,"));
}

#[tokio::test]
async fn test_exact_multiple_of_chunk_size_needs_trailing_read() {
    let source = MemoryExportSource::new(export_rows(2000));

    let exported = BulkExporter::new(1000).export(&source, fixed_time()).await.unwrap();

    assert_eq!(exported.rows, 2000);
    assert_eq!(source.chunk_reads(), 3);
}

#[tokio::test]
async fn test_export_is_recorded_in_ledger() {
    let source = MemoryExportSource::new(export_rows(5));
    let blobs = Arc::new(MemoryBlobStore::new());
    let audit = Arc::new(MemoryAuditLog::new());
    let ledger = ProvenanceLedger::new(blobs.clone(), audit.clone());

    let recorded = export_and_record(
        &BulkExporter::new(1000),
        &source,
        &ledger,
        "172.16.0.3",
        fixed_time(),
    )
    .await
    .unwrap();

    assert!(recorded.generated_name.ends_with(".csv"));
    assert!(blobs.contains(&recorded.generated_name));

    let record = audit.find(&recorded.generated_name).unwrap();
    assert_eq!(record.operation_kind, OperationKind::Export);
    assert_eq!(record.original_filename, "all_markets_20240601_093000.csv");
    assert_eq!(record.requester_origin, "172.16.0.3");
}

#[tokio::test]
async fn test_import_rejects_disallowed_extension() {
    let blobs = Arc::new(MemoryBlobStore::new());
    let audit = Arc::new(MemoryAuditLog::new());
    let ledger = ProvenanceLedger::new(blobs.clone(), audit.clone());
    let allowed = vec![".xlsx".to_string(), ".xls".to_string(), ".csv".to_string()];

    let result = store_import(&ledger, &allowed, "payload.exe", b"MZ", "10.0.0.9").await;

    assert!(matches!(result, Err(ApiError::BadRequest(_))));
    assert_eq!(blobs.puts(), 0);
    assert!(audit.records().is_empty());
}
