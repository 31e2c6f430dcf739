//! Loader for the bias-correction CSV.
//!
//! The file has a `Date` column followed by four columns per station,
//! `<SSS>1` through `<SSS>4`. Column 1 is the observed 24-hour
//! precipitation and column 4 the forecast; 2 and 3 are ignored.
//! Blank cells mean no data and load as NaN.

use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};

use crate::model::StationDay;

pub const DATE_COLUMN: &str = "Date";
pub const OBSERVED_SUFFIX: &str = "1";
pub const FORECAST_SUFFIX: &str = "4";

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%Y%m%d"];

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum IngestError {
    Io(std::io::Error),
    Csv(csv::Error),
    MissingColumn(String),
    BadDate { line: usize, value: String },
    BadValue { line: usize, column: String, value: String },
}

impl fmt::Display for IngestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestError::Io(e) => write!(f, "I/O error: {}", e),
            IngestError::Csv(e) => write!(f, "CSV error: {}", e),
            IngestError::MissingColumn(col) => write!(f, "Missing column: {}", col),
            IngestError::BadDate { line, value } => {
                write!(f, "Line {}: unparseable date '{}'", line, value)
            }
            IngestError::BadValue { line, column, value } => {
                write!(f, "Line {}: unparseable value '{}' in column {}", line, value, column)
            }
        }
    }
}

impl std::error::Error for IngestError {}

impl From<std::io::Error> for IngestError {
    fn from(e: std::io::Error) -> Self {
        IngestError::Io(e)
    }
}

impl From<csv::Error> for IngestError {
    fn from(e: csv::Error) -> Self {
        IngestError::Csv(e)
    }
}

// ---------------------------------------------------------------------------
// Parsing helpers
// ---------------------------------------------------------------------------

/// Parses the date formats seen in the CSV exports, including a trailing
/// midnight time.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
        .or_else(|| {
            NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|dt| dt.date())
        })
}

fn parse_value(value: &str) -> Option<f64> {
    let value = value.trim();
    if value.is_empty() || value.eq_ignore_ascii_case("nan") {
        return Some(f64::NAN);
    }
    value.parse().ok()
}

// ---------------------------------------------------------------------------
// Table
// ---------------------------------------------------------------------------

/// The date-filtered contents of a bias-correction CSV, column by column.
#[derive(Debug, Clone, PartialEq)]
pub struct BiasTable {
    pub dates: Vec<NaiveDate>,
    columns: BTreeMap<String, Vec<f64>>,
}

impl BiasTable {
    /// Reads every row whose date lies in `start..=end`.
    pub fn from_reader<R: Read>(reader: R, start: NaiveDate, end: NaiveDate) -> Result<Self, IngestError> {
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = rdr.headers()?.clone();
        let date_idx = headers
            .iter()
            .position(|h| h == DATE_COLUMN)
            .ok_or_else(|| IngestError::MissingColumn(DATE_COLUMN.to_string()))?;

        let value_columns: Vec<(usize, String)> = headers
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != date_idx)
            .map(|(i, h)| (i, h.to_string()))
            .collect();

        let mut dates = Vec::new();
        let mut columns: BTreeMap<String, Vec<f64>> =
            value_columns.iter().map(|(_, h)| (h.clone(), Vec::new())).collect();

        for (idx, result) in rdr.records().enumerate() {
            // Header is line 1.
            let line = idx + 2;
            let record = result?;

            let raw_date = record.get(date_idx).unwrap_or("");
            let date = parse_date(raw_date).ok_or_else(|| IngestError::BadDate {
                line,
                value: raw_date.to_string(),
            })?;
            if date < start || date > end {
                continue;
            }

            for (i, header) in &value_columns {
                let raw = record.get(*i).unwrap_or("");
                let value = parse_value(raw).ok_or_else(|| IngestError::BadValue {
                    line,
                    column: header.clone(),
                    value: raw.to_string(),
                })?;
                if let Some(column) = columns.get_mut(header) {
                    column.push(value);
                }
            }
            dates.push(date);
        }

        Ok(Self { dates, columns })
    }

    pub fn from_path(path: &Path, start: NaiveDate, end: NaiveDate) -> Result<Self, IngestError> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file), start, end)
    }

    /// Station prefixes that have both an observation and a forecast column.
    pub fn stations(&self) -> Vec<String> {
        self.columns
            .keys()
            .filter_map(|h| h.strip_suffix(OBSERVED_SUFFIX))
            .filter(|prefix| {
                self.columns
                    .contains_key(&format!("{}{}", prefix, FORECAST_SUFFIX))
            })
            .map(String::from)
            .collect()
    }

    /// The observation/forecast series for one station.
    pub fn station_series(&self, station: &str) -> Result<Vec<StationDay>, IngestError> {
        let obs = self.column(&format!("{}{}", station, OBSERVED_SUFFIX))?;
        let fcst = self.column(&format!("{}{}", station, FORECAST_SUFFIX))?;
        Ok(self
            .dates
            .iter()
            .zip(obs.iter().zip(fcst))
            .map(|(&date, (&observed, &forecast))| StationDay { date, observed, forecast })
            .collect())
    }

    fn column(&self, name: &str) -> Result<&Vec<f64>, IngestError> {
        self.columns
            .get(name)
            .ok_or_else(|| IngestError::MissingColumn(name.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
