/// Numeric core of the weather pipeline.
///
/// Both components are pure transforms over already-fetched, in-memory
/// data. Data acquisition lives in `ingest`, presentation in `report`.
///
/// Submodules:
/// - `bias_correction`: adaptive forecast/observation correction factor.
/// - `binning`: folds raw hourly readings into daily or AM/PM buckets.
/// - `skill`: MAE/MSE/RMSE and mean bias of raw vs corrected forecasts.

pub mod bias_correction;
pub mod binning;
pub mod skill;
