/// Integration tests against the NWAC weather database
///
/// These tests verify:
/// 1. The station table can be listed and codes map back to AWS IDs
/// 2. Precipitation readings for a known winter week can be fetched
/// 3. Fetched readings bin into AM/PM buckets without integrity errors
///
/// Prerequisites:
/// - PostgreSQL with the weatherdata_station and weatherdata_measurement tables
/// - DATABASE_URL set in .env
///
/// Run with: cargo test --test db_integration -- --ignored --test-threads=1

use std::env;

use chrono::NaiveDate;
use postgres::Client;

use nwac_wx_service::analysis::binning::{aggregate, reading_window, PolicyTable};
use nwac_wx_service::ingest::db::{self, DbError};
use nwac_wx_service::model::Granularity;
use nwac_wx_service::stations::find_station;

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

fn get_test_client() -> Client {
    dotenv::dotenv().ok();
    let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    db::connect(&database_url).unwrap_or_else(|e| {
        eprintln!("\n{}\n", "=".repeat(80));
        eprintln!("INTEGRATION TEST SETUP ERROR");
        eprintln!("{}", "=".repeat(80));
        eprintln!("\nCould not connect to {}: {}\n", database_url, e);
        panic!("Database connection failed");
    })
}

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
#[ignore]
fn test_list_stations() {
    let mut client = get_test_client();
    let stations = db::list_stations(&mut client).expect("station query should succeed");
    assert!(!stations.is_empty(), "station table is empty");

    let ids: Vec<i32> = stations.iter().map(|s| s.id).collect();
    let mut sorted = ids.clone();
    sorted.sort_unstable();
    assert_eq!(ids, sorted, "stations must come back ordered by id");

    let known = stations
        .iter()
        .filter_map(|s| s.aws_id())
        .filter(|id| find_station(id).is_some())
        .count();
    println!("{} stations, {} in the registry", stations.len(), known);
}

#[test]
#[ignore]
fn test_fetch_and_bin_precipitation() {
    let mut client = get_test_client();
    let policy = PolicyTable::nwac_default();
    let (first, last) = (d(2019, 1, 1), d(2019, 1, 7));
    let (start, end) = reading_window(first, last);

    let readings = db::fetch_readings(&mut client, &["HUR", "MTB"], &["precipitation"], first, last, &policy)
        .expect("readings query should succeed");
    assert!(readings.iter().all(|r| r.time > start && r.time <= end));
    assert!(readings.iter().all(|r| r.station == "HUR" || r.station == "MTB"));

    let records = aggregate(&readings, &["precipitation"], Granularity::AmPm, &policy)
        .expect("precipitation has no integrity checks");
    assert!(records.len() <= 2 * 7 * 2, "at most two halves per day per station");
    assert!(records.iter().all(|r| r.key.date >= first && r.key.date <= last));
}

#[test]
#[ignore]
fn test_fetch_rejects_excluded_field() {
    let mut client = get_test_client();
    let err = db::fetch_readings(
        &mut client,
        &["HUR"],
        &["station_id"],
        d(2019, 1, 1),
        d(2019, 1, 1),
        &PolicyTable::nwac_default(),
    )
    .unwrap_err();
    assert!(matches!(err, DbError::NotADataField(_)));
}
