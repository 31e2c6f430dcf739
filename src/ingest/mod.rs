/// Data acquisition.
///
/// - `csv_series`: daily observation/forecast pairs from the bias-correction CSV.
/// - `db`: raw logger readings from the weather database.

pub mod csv_series;
pub mod db;
