/// Weather database access.
///
/// Readings live in `weatherdata_measurement`, one row per station per
/// logger sample, with one column per sensor field. Stations live in
/// `weatherdata_station`, keyed by the "osoXXX" code (see `stations`).
///
/// Field names become SQL identifiers, so they are checked against the
/// aggregation policy table before any query text is assembled.

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use postgres::{Client, NoTls};

use crate::analysis::binning::{reading_window, PolicyTable};
use crate::logging::{self, Component};
use crate::model::{AggregationKind, SensorReading};
use crate::stations::{aws_id_from_db_code, db_code_for};

pub const STATION_TABLE: &str = "weatherdata_station";
pub const MEASUREMENT_TABLE: &str = "weatherdata_measurement";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum DbError {
    Postgres(postgres::Error),
    /// The field has no entry in the policy table.
    UnknownField(String),
    /// The field is a key/identity column, not sensor data.
    NotADataField(String),
}

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DbError::Postgres(e) => write!(f, "Database error: {}", e),
            DbError::UnknownField(field) => write!(f, "Unknown field: {}", field),
            DbError::NotADataField(field) => write!(f, "Not a data field: {}", field),
        }
    }
}

impl std::error::Error for DbError {}

impl From<postgres::Error> for DbError {
    fn from(e: postgres::Error) -> Self {
        DbError::Postgres(e)
    }
}

// ---------------------------------------------------------------------------
// Stations
// ---------------------------------------------------------------------------

/// A row of the station table.
#[derive(Debug, Clone, PartialEq)]
pub struct DbStation {
    pub id: i32,
    pub title: String,
    pub code: String,
}

impl DbStation {
    /// AWS ID derived from the code, or `None` if the code is malformed.
    pub fn aws_id(&self) -> Option<&str> {
        aws_id_from_db_code(&self.code)
    }
}

pub fn connect(database_url: &str) -> Result<Client, postgres::Error> {
    Client::connect(database_url, NoTls)
}

pub fn list_stations_query() -> String {
    format!("SELECT id, title, code FROM {} ORDER BY id", STATION_TABLE)
}

/// All stations, ordered by id.
pub fn list_stations(client: &mut Client) -> Result<Vec<DbStation>, DbError> {
    let rows = client.query(list_stations_query().as_str(), &[])?;
    let mut stations = Vec::with_capacity(rows.len());
    for row in rows {
        stations.push(DbStation {
            id: row.try_get(0)?,
            title: row.try_get(1)?,
            code: row.try_get(2)?,
        });
    }
    Ok(stations)
}

// ---------------------------------------------------------------------------
// Readings
// ---------------------------------------------------------------------------

fn check_fields(fields: &[&str], policy: &PolicyTable) -> Result<(), DbError> {
    for field in fields {
        match policy.get(field) {
            None => return Err(DbError::UnknownField(field.to_string())),
            Some(AggregationKind::Excluded) => return Err(DbError::NotADataField(field.to_string())),
            Some(_) => {}
        }
        // Policy names are plain identifiers, but a custom table could hold anything.
        if !field.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_') {
            return Err(DbError::UnknownField(field.to_string()));
        }
    }
    Ok(())
}

/// SQL for readings of the requested fields. Parameters: `$1` station codes
/// (text[]), `$2` exclusive start time, `$3` inclusive end time.
pub fn build_readings_query(fields: &[&str], policy: &PolicyTable) -> Result<String, DbError> {
    check_fields(fields, policy)?;

    let mut select = String::from("SELECT s.code, m.time");
    for field in fields {
        select.push_str(&format!(", m.{}::double precision", field));
    }

    Ok(format!(
        "{} FROM {} m JOIN {} s ON m.station_id = s.id \
         WHERE s.code = ANY($1) AND m.time > $2 AND m.time <= $3 \
         ORDER BY s.code, m.time",
        select, MEASUREMENT_TABLE, STATION_TABLE
    ))
}

/// Human-readable query plus its bound parameters, for `--print-query`.
pub fn describe_readings_query(
    query: &str,
    aws_ids: &[&str],
    first: NaiveDate,
    last: NaiveDate,
) -> String {
    let (start, end) = reading_window(first, last);
    let codes: Vec<String> = aws_ids.iter().map(|id| db_code_for(id)).collect();
    format!(
        "{}\n-- $1 = {{{}}}\n-- $2 = '{}'\n-- $3 = '{}'",
        query,
        codes.join(","),
        start.format("%Y-%m-%d %H:%M:%S"),
        end.format("%Y-%m-%d %H:%M:%S")
    )
}

/// Fetches raw readings for the given AWS IDs whose adjusted date falls in
/// `first..=last`.
pub fn fetch_readings(
    client: &mut Client,
    aws_ids: &[&str],
    fields: &[&str],
    first: NaiveDate,
    last: NaiveDate,
    policy: &PolicyTable,
) -> Result<Vec<SensorReading>, DbError> {
    let query = build_readings_query(fields, policy)?;
    let (start, end) = reading_window(first, last);
    let codes: Vec<String> = aws_ids.iter().map(|id| db_code_for(id)).collect();

    logging::debug(Component::Database, None, &format!("Running query: {}", query));
    let rows = client.query(query.as_str(), &[&codes, &start, &end])?;

    let mut readings = Vec::with_capacity(rows.len());
    for row in rows {
        let code: String = row.try_get(0)?;
        let time: NaiveDateTime = row.try_get(1)?;
        let station = match aws_id_from_db_code(&code) {
            Some(id) => id.to_string(),
            None => {
                logging::warn(Component::Database, Some(code.as_str()), "Unexpected format for station code");
                code.clone()
            }
        };

        let mut values = std::collections::BTreeMap::new();
        for (i, field) in fields.iter().enumerate() {
            let value: Option<f64> = row.try_get(i + 2)?;
            values.insert(field.to_string(), value);
        }

        readings.push(SensorReading { station, time, values });
    }

    logging::info(
        Component::Database,
        None,
        &format!("Fetched {} readings for {} station(s)", readings.len(), aws_ids.len()),
    );
    Ok(readings)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
