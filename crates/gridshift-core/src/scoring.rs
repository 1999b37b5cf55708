//! Cost scoring for compute slots.
//!
//! A slot's cost score combines energy price, carbon intensity, and a fixed
//! hourly workload forecast into one bounded ranking signal:
//!
//! ```text
//! z     = price_weight·price + carbon_weight·carbon
//!       + workload_weight·forecast(hour) − offset
//! score = sigmoid(z) × 100          // 0.0..=100.0, lower is better
//! ```
//!
//! The sigmoid keeps the score bounded while staying strictly increasing in
//! both price and carbon, so ranking by score never inverts a cheaper,
//! cleaner slot against a dearer, dirtier one.

use serde::{Deserialize, Serialize};

use crate::types::EnergyReading;

/// Expected share of peak demand for each hour of the day (UTC).
pub const HOURLY_WORKLOAD_FORECAST: [f64; 24] = [
    0.30, 0.25, 0.20, 0.20, 0.20, 0.25, // 00–05
    0.35, 0.50, 0.70, 0.85, 0.90, 0.95, // 06–11
    0.95, 0.90, 0.90, 0.90, 0.95, 1.00, // 12–17
    0.95, 0.85, 0.70, 0.55, 0.45, 0.35, // 18–23
];

/// Coefficients of the cost score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    /// Per GBP/kWh.
    pub price: f64,
    /// Per gCO2/kWh.
    pub carbon: f64,
    /// Per unit of forecast workload (0..=1).
    pub workload: f64,
    pub offset: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            price: 10.0,
            carbon: 0.005,
            workload: 1.0,
            offset: 3.0,
        }
    }
}

/// Forecast workload for an hour of day. Hours wrap modulo 24.
pub fn hourly_workload_forecast(hour: u32) -> f64 {
    HOURLY_WORKLOAD_FORECAST[(hour % 24) as usize]
}

/// Logistic function.
pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Score a reading at the given hour of day. Always in `0.0..=100.0`.
///
/// A non-finite input scores as the worst possible slot.
pub fn cost_score(reading: &EnergyReading, hour: u32, weights: &ScoringWeights) -> f64 {
    let z = weights.price * reading.price
        + weights.carbon * reading.carbon_intensity
        + weights.workload * hourly_workload_forecast(hour)
        - weights.offset;

    let score = sigmoid(z) * 100.0;
    if score.is_nan() {
        return 100.0;
    }
    score.clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(price: f64, carbon: f64) -> EnergyReading {
        EnergyReading::new(price, carbon, 50.0)
    }

    #[test]
    fn sigmoid_midpoint() {
        assert!((sigmoid(0.0) - 0.5).abs() < f64::EPSILON);
        assert!(sigmoid(10.0) > 0.99);
        assert!(sigmoid(-10.0) < 0.01);
    }

    #[test]
    fn score_is_bounded() {
        let w = ScoringWeights::default();
        for hour in 0..24 {
            for &(price, carbon) in &[(0.0, 0.0), (100.0, 10_000.0), (-50.0, -50.0)] {
                let s = cost_score(&reading(price, carbon), hour, &w);
                assert!((0.0..=100.0).contains(&s), "score {s} out of range");
            }
        }
    }

    #[test]
    fn non_finite_input_scores_worst() {
        let w = ScoringWeights::default();
        assert_eq!(cost_score(&reading(f64::NAN, 100.0), 3, &w), 100.0);
        assert_eq!(cost_score(&reading(f64::INFINITY, 100.0), 3, &w), 100.0);
    }

    #[test]
    fn score_increases_with_price_and_carbon() {
        let w = ScoringWeights::default();
        let cheap = cost_score(&reading(0.10, 100.0), 12, &w);
        let dear = cost_score(&reading(0.20, 100.0), 12, &w);
        let dirty = cost_score(&reading(0.10, 300.0), 12, &w);
        assert!(dear > cheap);
        assert!(dirty > cheap);
    }

    #[test]
    fn default_weights_split_reference_prices_around_seventy() {
        // 0.50 GBP/kWh must exceed the default deferral ceiling and
        // 0.10 GBP/kWh must stay under it, whatever the hour.
        let w = ScoringWeights::default();
        for hour in 0..24 {
            assert!(cost_score(&reading(0.50, 100.0), hour, &w) > 70.0);
            assert!(cost_score(&reading(0.10, 100.0), hour, &w) < 70.0);
        }
    }

    #[test]
    fn forecast_wraps_hours() {
        assert_eq!(hourly_workload_forecast(24), hourly_workload_forecast(0));
        assert_eq!(hourly_workload_forecast(17), 1.0);
    }
}
