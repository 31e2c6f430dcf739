//! Adaptive precipitation bias correction.
//!
//! The correction factor is a single-pole exponential smoother over the
//! daily forecast/observation ratio (Bourdin, Nipen & Stull, "Reliable
//! probabilistic forecasts from an ensemble reservoir inflow forecasting
//! system"). It is equivalent to the geometric series
//!
//! ```text
//! cf_i = 1/tau * SUM(k >= 0) r^k * a_(i-k-1),   r = (tau-1)/tau,  a_x = fcst_x / obs_x
//! ```
//!
//! Days with (near) zero or missing observations freeze the factor instead
//! of decaying it.

use serde::Deserialize;

use crate::model::{BiasCorrectedDay, BiasCorrectionError, StationDay};

/// Observations at or below this amount (inches) do not update the factor.
pub const MIN_OBSERVED_PRECIP: f64 = 0.01;

/// Memory of the smoother in days.
pub const DEFAULT_TAU: f64 = 30.0;

/// Ratio of tomorrow's to today's factor above which a jump is damped.
pub const DEFAULT_JUMP_THRESHOLD: f64 = 1.5;

/// Damping only applies when forecast + observation is below this amount.
pub const DEFAULT_LOW_SUM_THRESHOLD: f64 = 1.0;

/// How a large jump in the correction factor is pulled back.
///
/// Both variants keep the sign of the jump. `Normalized` is what the
/// production factors have always been generated with; `Tanh` is opt-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JumpDamping {
    /// `cf + (c - cf) / (c + cf)`. Only shrinks the jump when `c + cf > 1`.
    #[default]
    Normalized,
    /// `cf + tanh(c - cf)`. Always lands strictly between `cf` and `c`.
    Tanh,
}

impl JumpDamping {
    /// Returns the damped factor given today's factor and the undamped
    /// candidate for tomorrow.
    pub fn damp(self, cf_today: f64, candidate: f64) -> f64 {
        match self {
            JumpDamping::Normalized => {
                let denom = candidate + cf_today;
                if denom == 0.0 || !denom.is_finite() {
                    return candidate;
                }
                cf_today + (candidate - cf_today) / denom
            }
            JumpDamping::Tanh => cf_today + (candidate - cf_today).tanh(),
        }
    }
}

/// Tuning knobs for the correction-factor recurrence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiasCorrectionParams {
    pub tau: f64,
    pub jump_threshold: f64,
    pub low_sum_threshold: f64,
    pub damping: JumpDamping,
}

impl Default for BiasCorrectionParams {
    fn default() -> Self {
        Self {
            tau: DEFAULT_TAU,
            jump_threshold: DEFAULT_JUMP_THRESHOLD,
            low_sum_threshold: DEFAULT_LOW_SUM_THRESHOLD,
            damping: JumpDamping::default(),
        }
    }
}

impl BiasCorrectionParams {
    pub fn with_tau(tau: f64) -> Self {
        Self { tau, ..Self::default() }
    }
}

/// Computes tomorrow's correction factor from today's factor and today's
/// observation/forecast pair.
pub fn next_correction_factor(
    cf_today: f64,
    observed: f64,
    forecast: f64,
    params: &BiasCorrectionParams,
) -> f64 {
    if observed <= MIN_OBSERVED_PRECIP || observed.is_nan() || forecast.is_nan() {
        return cf_today;
    }

    let tau = params.tau;
    let candidate = ((tau - 1.0) / tau) * cf_today + (1.0 / tau) * (forecast / observed);

    // Near-zero totals make the ratio unstable. Only increases are damped.
    if candidate / cf_today > params.jump_threshold
        && (forecast + observed) < params.low_sum_threshold
    {
        params.damping.damp(cf_today, candidate)
    } else {
        candidate
    }
}

/// Runs the correction-factor recurrence over a station's daily series.
///
/// `series` must be non-empty and strictly ascending by date. The returned
/// vector has one entry per input day; the last entry carries only a
/// correction factor.
pub fn compute_bias_correction(
    series: &[StationDay],
    params: &BiasCorrectionParams,
) -> Result<Vec<BiasCorrectedDay>, BiasCorrectionError> {
    validate_series(series, params)?;

    let mut out = Vec::with_capacity(series.len());
    let mut cf_today = 1.0;

    for (i, day) in series.iter().enumerate() {
        let mut corrected = BiasCorrectedDay {
            date: day.date,
            observed: day.observed,
            forecast: day.forecast,
            correction_factor: cf_today,
            bias_corrected_forecast: None,
            raw_bias: None,
            bias_corrected_bias: None,
        };

        if i + 1 < series.len() {
            let bc_forecast = day.forecast / cf_today;
            corrected.bias_corrected_forecast = Some(bc_forecast);
            corrected.bias_corrected_bias = Some(bc_forecast - day.observed);
            corrected.raw_bias = Some(day.forecast - day.observed);
            cf_today = next_correction_factor(cf_today, day.observed, day.forecast, params);
        }

        out.push(corrected);
    }

    Ok(out)
}

fn validate_series(
    series: &[StationDay],
    params: &BiasCorrectionParams,
) -> Result<(), BiasCorrectionError> {
    if !(params.tau.is_finite() && params.tau > 1.0) {
        return Err(BiasCorrectionError::InvalidTau(params.tau));
    }
    if series.is_empty() {
        return Err(BiasCorrectionError::EmptySeries);
    }
    for (i, pair) in series.windows(2).enumerate() {
        if pair[1].date <= pair[0].date {
            return Err(BiasCorrectionError::NonMonotonicDates {
                index: i + 1,
                date: pair[1].date,
            });
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    const TOL: f64 = 1e-9;

    fn series(obs: &[f64], fcst: &[f64]) -> Vec<StationDay> {
        let start = NaiveDate::from_ymd_opt(2018, 12, 11).unwrap();
        obs.iter()
            .zip(fcst)
            .enumerate()
            .map(|(i, (&observed, &forecast))| StationDay {
                date: start + Duration::days(i as i64),
                observed,
                forecast,
            })
            .collect()
    }

    fn cfs(days: &[BiasCorrectedDay]) -> Vec<f64> {
        days.iter().map(|d| d.correction_factor).collect()
    }

    // --- Recurrence ---------------------------------------------------------

    #[test]
    fn test_first_correction_factor_is_one() {
        let days = compute_bias_correction(&series(&[2.0], &[3.0]), &BiasCorrectionParams::default())
            .expect("single-day series is valid");
        assert_eq!(days[0].correction_factor, 1.0);
    }

    #[test]
    fn test_worked_example_from_three_days() {
        let params = BiasCorrectionParams::with_tau(30.0);
        let days = compute_bias_correction(&series(&[0.5, 0.02, 1.0], &[0.4, 0.3, 0.9]), &params)
            .expect("valid series");
        let cf = cfs(&days);

        let cf1 = (29.0 / 30.0) * 1.0 + (1.0 / 30.0) * (0.4 / 0.5);
        let cf2 = (29.0 / 30.0) * cf1 + (1.0 / 30.0) * (0.3 / 0.02);
        assert!((cf[1] - cf1).abs() < TOL);
        assert!((cf[1] - 0.993333).abs() < 1e-5);
        // Ratio 1.4698 stays below the 1.5 jump threshold: no damping.
        assert!((cf[2] - cf2).abs() < TOL);
        assert!((cf[2] - 1.460222).abs() < 1e-5);
    }

    #[test]
    fn test_near_zero_observation_freezes_factor() {
        let params = BiasCorrectionParams::with_tau(10.0);
        let days = compute_bias_correction(&series(&[2.0, 0.01, 0.0, 1.0], &[3.0, 5.0, 5.0, 1.0]), &params)
            .expect("valid series");
        let cf = cfs(&days);
        assert_eq!(cf[2], cf[1], "obs == 0.01 must not update the factor");
        assert_eq!(cf[3], cf[2], "obs == 0.0 must not update the factor");
    }

    #[test]
    fn test_missing_values_freeze_factor() {
        let params = BiasCorrectionParams::default();
        let days = compute_bias_correction(
            &series(&[2.0, f64::NAN, 2.0, 1.0], &[3.0, 1.0, f64::NAN, 1.0]),
            &params,
        )
        .expect("NaN is data, not a structural error");
        let cf = cfs(&days);
        assert_eq!(cf[2], cf[1]);
        assert_eq!(cf[3], cf[2]);
    }

    #[test]
    fn test_bias_corrected_forecast_uses_todays_factor() {
        let params = BiasCorrectionParams::with_tau(5.0);
        let days = compute_bias_correction(&series(&[2.0, 2.0, 2.0], &[4.0, 4.0, 4.0]), &params)
            .expect("valid series");
        for day in &days[..2] {
            let bc = day.bias_corrected_forecast.expect("non-final day has bc forecast");
            assert!((bc - day.forecast / day.correction_factor).abs() < TOL);
            assert!((day.bias_corrected_bias.unwrap() - (bc - day.observed)).abs() < TOL);
            assert!((day.raw_bias.unwrap() - (day.forecast - day.observed)).abs() < TOL);
        }
        // Day 0 still uses cf == 1 even though cf[1] has already moved.
        assert_eq!(days[0].bias_corrected_forecast, Some(4.0));
    }

    #[test]
    fn test_last_day_has_factor_but_no_forecast_fields() {
        let days = compute_bias_correction(&series(&[1.0, 1.0], &[2.0, 2.0]), &BiasCorrectionParams::default())
            .expect("valid series");
        let last = days.last().unwrap();
        assert!(last.correction_factor > 1.0);
        assert_eq!(last.bias_corrected_forecast, None);
        assert_eq!(last.raw_bias, None);
        assert_eq!(last.bias_corrected_bias, None);
    }

    #[test]
    fn test_nan_forecast_propagates_into_bias_fields() {
        let days = compute_bias_correction(&series(&[1.0, 1.0], &[f64::NAN, 2.0]), &BiasCorrectionParams::default())
            .expect("valid series");
        assert!(days[0].bias_corrected_forecast.unwrap().is_nan());
        assert!(days[0].raw_bias.unwrap().is_nan());
    }

    // --- Jump damping -------------------------------------------------------

    #[test]
    fn test_jump_with_low_totals_is_damped() {
        // tau = 2: candidate = 0.5 * 1 + 0.5 * (0.5 / 0.05) = 5.5, ratio 5.5 > 1.5,
        // fcst + obs = 0.55 < 1.
        let params = BiasCorrectionParams { tau: 2.0, damping: JumpDamping::Tanh, ..BiasCorrectionParams::default() };
        let next = next_correction_factor(1.0, 0.05, 0.5, &params);
        assert!((next - (1.0 + 4.5f64.tanh())).abs() < TOL);
    }

    #[test]
    fn test_default_damping_matches_production_factors() {
        // Legacy formula: cf + (c - cf) / (c + cf) = 1 + 4.5 / 6.5.
        assert_eq!(BiasCorrectionParams::default().damping, JumpDamping::Normalized);
        let params = BiasCorrectionParams::with_tau(2.0);
        let days = compute_bias_correction(&series(&[0.05, 1.0], &[0.5, 1.0]), &params)
            .expect("valid series");
        assert!((days[1].correction_factor - 22.0 / 13.0).abs() < TOL, "got {}", days[1].correction_factor);
    }

    #[test]
    fn test_jump_with_high_totals_is_not_damped() {
        let params = BiasCorrectionParams { tau: 2.0, ..BiasCorrectionParams::default() };
        let next = next_correction_factor(1.0, 0.5, 5.0, &params);
        assert!((next - 5.5).abs() < TOL, "fcst + obs = 5.5 is not a low total");
    }

    #[test]
    fn test_decreases_are_never_damped() {
        let params = BiasCorrectionParams { tau: 2.0, ..BiasCorrectionParams::default() };
        let next = next_correction_factor(1.0, 0.5, 0.05, &params);
        assert!((next - 0.55).abs() < TOL);
    }

    #[test]
    fn test_tanh_damping_lies_strictly_between() {
        for &(cf, candidate) in &[(1.0, 5.5), (0.1, 0.2), (0.01, 0.9), (2.0, 3.5), (0.5, 40.0)] {
            let damped = JumpDamping::Tanh.damp(cf, candidate);
            assert!(
                damped > cf && damped < candidate,
                "tanh damping of {} -> {} gave {}",
                cf,
                candidate,
                damped
            );
        }
    }

    #[test]
    fn test_normalized_damping_lies_strictly_between_when_sum_exceeds_one() {
        for &(cf, candidate) in &[(1.0, 5.5), (0.6, 0.95), (2.0, 3.5)] {
            let damped = JumpDamping::Normalized.damp(cf, candidate);
            assert!(damped > cf && damped < candidate, "{} -> {} gave {}", cf, candidate, damped);
        }
    }

    #[test]
    fn test_normalized_damping_overshoots_for_small_factors() {
        // 0.1 + 0.1 / 0.3 = 0.433 > 0.2: the known flaw of this variant.
        let damped = JumpDamping::Normalized.damp(0.1, 0.2);
        assert!(damped > 0.2);
    }

    #[test]
    fn test_normalized_damping_guards_zero_denominator() {
        assert_eq!(JumpDamping::Normalized.damp(0.0, 0.0), 0.0);
        assert_eq!(JumpDamping::Normalized.damp(-1.0, 1.0), 1.0);
    }

    // --- Structural errors --------------------------------------------------

    #[test]
    fn test_empty_series_is_rejected() {
        let result = compute_bias_correction(&[], &BiasCorrectionParams::default());
        assert_eq!(result, Err(BiasCorrectionError::EmptySeries));
    }

    #[test]
    fn test_duplicate_date_is_rejected() {
        let mut s = series(&[1.0, 1.0, 1.0], &[1.0, 1.0, 1.0]);
        s[2].date = s[1].date;
        let result = compute_bias_correction(&s, &BiasCorrectionParams::default());
        assert!(matches!(result, Err(BiasCorrectionError::NonMonotonicDates { index: 2, .. })));
    }

    #[test]
    fn test_tau_must_exceed_one() {
        let s = series(&[1.0], &[1.0]);
        for tau in [1.0, 0.5, f64::NAN, f64::INFINITY] {
            let result = compute_bias_correction(&s, &BiasCorrectionParams::with_tau(tau));
            assert!(matches!(result, Err(BiasCorrectionError::InvalidTau(_))), "tau {} accepted", tau);
        }
    }
}
