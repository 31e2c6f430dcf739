//! Forecast skill summary for a bias-corrected series.
//!
//! These are the numbers the old plotting script printed on each station's
//! chart. Days with a missing observation or forecast are skipped.

use crate::model::BiasCorrectedDay;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForecastSkill {
    /// Number of days that contributed.
    pub days: usize,
    pub raw_mae: f64,
    pub raw_mse: f64,
    pub raw_rmse: f64,
    pub bc_mae: f64,
    pub bc_mse: f64,
    pub bc_rmse: f64,
    pub mean_raw_bias: f64,
    pub mean_bc_bias: f64,
}

impl ForecastSkill {
    /// Returns `None` if no day has a finite observation, forecast and
    /// bias-corrected forecast.
    pub fn from_days(days: &[BiasCorrectedDay]) -> Option<Self> {
        let mut n = 0usize;
        let (mut raw_abs, mut raw_sq, mut raw_sum) = (0.0, 0.0, 0.0);
        let (mut bc_abs, mut bc_sq, mut bc_sum) = (0.0, 0.0, 0.0);

        for day in days {
            let Some(bc) = day.bias_corrected_forecast else { continue };
            if !(day.observed.is_finite() && day.forecast.is_finite() && bc.is_finite()) {
                continue;
            }
            let raw_err = day.forecast - day.observed;
            let bc_err = bc - day.observed;
            raw_abs += raw_err.abs();
            raw_sq += raw_err * raw_err;
            raw_sum += raw_err;
            bc_abs += bc_err.abs();
            bc_sq += bc_err * bc_err;
            bc_sum += bc_err;
            n += 1;
        }

        if n == 0 {
            return None;
        }

        let count = n as f64;
        Some(Self {
            days: n,
            raw_mae: raw_abs / count,
            raw_mse: raw_sq / count,
            raw_rmse: (raw_sq / count).sqrt(),
            bc_mae: bc_abs / count,
            bc_mse: bc_sq / count,
            bc_rmse: (bc_sq / count).sqrt(),
            mean_raw_bias: raw_sum / count,
            mean_bc_bias: bc_sum / count,
        })
    }
}
