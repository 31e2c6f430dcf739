/// Core data types for the NWAC weather-observation pipeline.
///
/// This module defines the shared domain model imported by all other modules.
/// It contains no logic beyond formatting, no I/O, and no external
/// dependencies other than chrono/serde. Only types.

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// Bias correction types
// ---------------------------------------------------------------------------

/// One day of observed and forecast precipitation for a single station.
///
/// Missing values are carried as `f64::NAN`, matching the CSV input where
/// blank cells mean "no data".
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StationDay {
    pub date: NaiveDate,
    pub observed: f64,
    pub forecast: f64,
}

/// A `StationDay` plus the values derived by the correction-factor pass.
///
/// The last day of a series only receives a correction factor; the three
/// forecast/bias fields stay `None` for it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiasCorrectedDay {
    pub date: NaiveDate,
    pub observed: f64,
    pub forecast: f64,
    pub correction_factor: f64,
    pub bias_corrected_forecast: Option<f64>,
    pub raw_bias: Option<f64>,
    pub bias_corrected_bias: Option<f64>,
}

// ---------------------------------------------------------------------------
// Sensor reading / binning types
// ---------------------------------------------------------------------------

/// A single raw sample from a weather station data logger.
///
/// Data timestamped at `time` covers the hour ending at `time`, so a
/// reading at 00:00 belongs to the previous day.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorReading {
    /// AWS station identifier, e.g. "HUR".
    pub station: String,
    pub time: NaiveDateTime,
    /// Field name -> value. `None` means the logger reported no value.
    pub values: BTreeMap<String, Option<f64>>,
}

/// Time resolution for binning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Granularity {
    /// No binning; raw readings are passed through.
    None,
    Daily,
    AmPm,
}

/// Half-day designator for AM/PM binning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Half {
    /// Hours 01:00 through 12:00.
    Am,
    /// Hours 13:00 through 00:00 (of the next calendar day).
    Pm,
}

impl fmt::Display for Half {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Half::Am => write!(f, "AM"),
            Half::Pm => write!(f, "PM"),
        }
    }
}

/// Identifies one aggregation bucket: a station plus an adjusted date and,
/// for AM/PM binning, a half.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct BucketKey {
    pub station: String,
    pub date: NaiveDate,
    pub half: Option<Half>,
}

impl BucketKey {
    /// Label used in text output: `2019-01-01` or `2019-01-01-PM`.
    pub fn label(&self) -> String {
        match self.half {
            Some(half) => format!("{}-{}", self.date.format("%Y-%m-%d"), half),
            None => self.date.format("%Y-%m-%d").to_string(),
        }
    }
}

/// How a field is folded when several readings land in one bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregationKind {
    /// All values in the bucket must be identical.
    CheckEqual,
    Average,
    Sum,
    Min,
    Max,
    /// Identity or key columns that are never aggregated.
    Excluded,
}

/// One output row of the aggregator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedRecord {
    pub key: BucketKey,
    /// Field name -> aggregated value; `None` when no reading in the bucket
    /// carried a value for that field.
    pub values: BTreeMap<String, Option<f64>>,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Structural problems with a bias-correction input series.
#[derive(Debug, Clone, PartialEq)]
pub enum BiasCorrectionError {
    EmptySeries,
    /// Dates must be strictly ascending; `index` is the first offending day.
    NonMonotonicDates { index: usize, date: NaiveDate },
    /// tau must be finite and greater than 1.
    InvalidTau(f64),
}

impl fmt::Display for BiasCorrectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BiasCorrectionError::EmptySeries => write!(f, "Series is empty"),
            BiasCorrectionError::NonMonotonicDates { index, date } => {
                write!(f, "Dates not strictly ascending at index {} ({})", index, date)
            }
            BiasCorrectionError::InvalidTau(tau) => {
                write!(f, "Invalid tau {}: must be finite and greater than 1", tau)
            }
        }
    }
}

impl std::error::Error for BiasCorrectionError {}

/// Errors raised by the time-bucket aggregator.
#[derive(Debug, Clone, PartialEq)]
pub enum AggregationError {
    /// A requested field has no entry in the policy table.
    UnknownField(String),
    /// A `CheckEqual` field carried two different values within one bucket.
    IntegrityViolation {
        bucket: String,
        field: String,
        expected: f64,
        found: f64,
    },
}

impl fmt::Display for AggregationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregationError::UnknownField(field) => {
                write!(f, "No aggregation policy for field: {}", field)
            }
            AggregationError::IntegrityViolation { bucket, field, expected, found } => write!(
                f,
                "Integrity violation in bucket {}: field {} expected {} but found {}",
                bucket, field, expected, found
            ),
        }
    }
}

impl std::error::Error for AggregationError {}
