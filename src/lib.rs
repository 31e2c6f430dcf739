//! NWAC weather-observation pipeline.
//!
//! Pulls station observations from the weather database, bins them into
//! daily or AM/PM buckets, and computes an adaptive bias-correction factor
//! between forecast and observed precipitation.

pub mod analysis;
pub mod config;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod report;
pub mod stations;
