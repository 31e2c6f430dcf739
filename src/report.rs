//! Text output for the command line tools.
//!
//! Everything here is plain columnar text: the per-day bias-correction
//! line, the per-station table written to `<S>_precip.txt`, and the
//! `station bucket value...` lines that `kleio` prints and the nightly run
//! reads back.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::analysis::skill::ForecastSkill;
use crate::model::{AggregatedRecord, BiasCorrectedDay, SensorReading};

/// Written in place of a missing value.
pub const MISSING: &str = "NaN";

fn fmt2(value: f64) -> String {
    if value.is_nan() {
        MISSING.to_string()
    } else {
        format!("{:.2}", value)
    }
}

fn fmt_opt(value: Option<f64>) -> String {
    value.map(fmt2).unwrap_or_else(|| MISSING.to_string())
}

// ---------------------------------------------------------------------------
// Bias correction
// ---------------------------------------------------------------------------

/// `<date> <station> <fcst> <obs> <cf> <bc_fcst>`, two decimals.
pub fn format_daily_line(station: &str, day: &BiasCorrectedDay) -> String {
    format!(
        "{} {} {} {} {} {}",
        day.date.format("%Y-%m-%d"),
        station,
        fmt2(day.forecast),
        fmt2(day.observed),
        fmt2(day.correction_factor),
        fmt_opt(day.bias_corrected_forecast)
    )
}

/// Right-aligned table of a station's corrected series.
pub fn format_station_table(station: &str, days: &[BiasCorrectedDay]) -> String {
    let headers = [
        "Date".to_string(),
        format!("{}_OBS", station),
        format!("{}_FCST", station),
        format!("{}_CF", station),
        format!("{}_BC", station),
        format!("{}_Raw_Bias", station),
        format!("{}_BC_Bias", station),
    ];
    let rows: Vec<[String; 7]> = days
        .iter()
        .map(|d| {
            [
                d.date.format("%Y-%m-%d").to_string(),
                fmt2(d.observed),
                fmt2(d.forecast),
                fmt2(d.correction_factor),
                fmt_opt(d.bias_corrected_forecast),
                fmt_opt(d.raw_bias),
                fmt_opt(d.bias_corrected_bias),
            ]
        })
        .collect();

    let mut widths: Vec<usize> = headers.iter().map(String::len).collect();
    for row in &rows {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.len());
        }
    }

    let mut out = String::new();
    let mut push_row = |cells: &[String]| {
        let line: Vec<String> = cells
            .iter()
            .zip(&widths)
            .map(|(cell, w)| format!("{:>width$}", cell, width = *w))
            .collect();
        out.push_str(&line.join("  "));
        out.push('\n');
    };
    push_row(&headers[..]);
    for row in &rows {
        push_row(&row[..]);
    }
    out
}

/// Path of a station's table inside `out_dir`.
pub fn station_table_path(out_dir: &Path, station: &str) -> PathBuf {
    out_dir.join(format!("{}_precip.txt", station))
}

/// Writes `<out_dir>/<station>_precip.txt` and returns its path.
pub fn write_station_table(out_dir: &Path, station: &str, days: &[BiasCorrectedDay]) -> std::io::Result<PathBuf> {
    let path = station_table_path(out_dir, station);
    fs::write(&path, format_station_table(station, days))?;
    Ok(path)
}

/// One-line skill summary, raw vs bias-corrected.
pub fn format_skill(station: &str, skill: &ForecastSkill) -> String {
    format!(
        "{} over {} days: raw MAE {:.3} MSE {:.3} RMSE {:.3} bias {:.3} | BC MAE {:.3} MSE {:.3} RMSE {:.3} bias {:.3}",
        station,
        skill.days,
        skill.raw_mae,
        skill.raw_mse,
        skill.raw_rmse,
        skill.mean_raw_bias,
        skill.bc_mae,
        skill.bc_mse,
        skill.bc_rmse,
        skill.mean_bc_bias
    )
}

// ---------------------------------------------------------------------------
// Binned readings
// ---------------------------------------------------------------------------

/// `<station> <bucket> <v1> <v2> ...` with values in `fields` order.
pub fn format_bucket_line(record: &AggregatedRecord, fields: &[&str]) -> String {
    let mut line = format!("{} {}", record.key.station, record.key.label());
    for field in fields {
        let value = record.values.get(*field).copied().flatten();
        line.push(' ');
        line.push_str(&fmt_opt(value));
    }
    line
}

/// Splits a bucket line back into station, bucket label and values.
/// Returns `None` for blank or malformed lines.
pub fn parse_bucket_line(line: &str) -> Option<(String, String, Vec<Option<f64>>)> {
    let mut parts = line.split_whitespace();
    let station = parts.next()?.to_string();
    let bucket = parts.next()?.to_string();
    let values: Option<Vec<Option<f64>>> = parts
        .map(|p| {
            if p == MISSING {
                Some(None)
            } else {
                p.parse::<f64>().ok().map(Some)
            }
        })
        .collect();
    Some((station, bucket, values?))
}

/// Bucket label -> station -> first value, from `kleio` bucket lines.
/// Malformed lines are skipped and counted.
pub fn load_bucket_observations(text: &str) -> (BTreeMap<String, BTreeMap<String, Option<f64>>>, usize) {
    let mut obs: BTreeMap<String, BTreeMap<String, Option<f64>>> = BTreeMap::new();
    let mut skipped = 0;
    for line in text.lines().filter(|l| !l.trim().is_empty()) {
        match parse_bucket_line(line) {
            Some((station, bucket, values)) => {
                let value = values.first().copied().flatten();
                obs.entry(bucket).or_default().insert(station, value);
            }
            None => skipped += 1,
        }
    }
    (obs, skipped)
}

/// `<station> <time> <v1> <v2> ...` for unbinned readings.
pub fn format_reading_line(reading: &SensorReading, fields: &[&str]) -> String {
    let mut line = format!("{} {}", reading.station, reading.time.format("%Y-%m-%d %H:%M"));
    for field in fields {
        let value = reading.values.get(*field).copied().flatten();
        line.push(' ');
        line.push_str(&fmt_opt(value));
    }
    line
}

#[derive(Serialize)]
struct JsonReading<'a> {
    station: &'a str,
    time: String,
    values: &'a BTreeMap<String, Option<f64>>,
}

/// JSON array of aggregated records.
pub fn records_to_json(records: &[AggregatedRecord]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(records)
}

/// JSON array of raw readings.
pub fn readings_to_json(readings: &[SensorReading]) -> serde_json::Result<String> {
    let rows: Vec<JsonReading> = readings
        .iter()
        .map(|r| JsonReading {
            station: &r.station,
            time: r.time.format("%Y-%m-%dT%H:%M:%S").to_string(),
            values: &r.values,
        })
        .collect();
    serde_json::to_string_pretty(&rows)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
