//! Energy price and carbon inputs for compute slots.
//!
//! Executors pull a fresh [`EnergyReading`] for their location on every
//! tick through the [`EnergySource`] trait. Two sources ship with the crate:
//!
//! - [`SyntheticEnergySource`] — a time-of-day price/carbon cycle with
//!   regional modifiers and bounded noise, used by the daemon's simulation.
//! - [`StaticEnergySource`] — pinned readings per location, for tests and
//!   replaying known grid conditions.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError, RwLock};

use chrono::{DateTime, Timelike, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::types::EnergyReading;

/// Supplies grid conditions for a location at a point in time.
pub trait EnergySource: Send + Sync {
    fn get(&self, timestamp: DateTime<Utc>, location: &str) -> EnergyReading;
}

// ── Static ───────────────────────────────────────────────────────

/// Returns pinned readings per location, or a fallback for unknown locations.
#[derive(Debug, Default)]
pub struct StaticEnergySource {
    readings: RwLock<HashMap<String, EnergyReading>>,
    fallback: EnergyReading,
}

impl StaticEnergySource {
    pub fn new(fallback: EnergyReading) -> Self {
        Self {
            readings: RwLock::new(HashMap::new()),
            fallback,
        }
    }

    /// Builder-style pin.
    pub fn with(self, location: &str, reading: EnergyReading) -> Self {
        self.set(location, reading);
        self
    }

    /// Replace the reading for a location. Takes effect on the next `get`.
    pub fn set(&self, location: &str, reading: EnergyReading) {
        self.readings
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(location.to_string(), reading);
    }
}

impl EnergySource for StaticEnergySource {
    fn get(&self, _timestamp: DateTime<Utc>, location: &str) -> EnergyReading {
        self.readings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(location)
            .copied()
            .unwrap_or(self.fallback)
    }
}

// ── Synthetic ────────────────────────────────────────────────────

/// Generates plausible UK grid conditions.
///
/// Prices peak between 09:00 and 20:00. London runs dearer and dirtier,
/// Scotland cheaper with more wind, and the South West gets a solar dip in
/// carbon around midday.
pub struct SyntheticEnergySource {
    rng: Mutex<StdRng>,
    /// GBP/kWh before multipliers.
    base_price: f64,
    /// gCO2/kWh before multipliers.
    base_carbon: f64,
    base_renewable_mix: f64,
}

impl SyntheticEnergySource {
    pub fn new() -> Self {
        Self::from_rng(StdRng::from_os_rng())
    }

    /// Deterministic output for a given seed.
    pub fn with_seed(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    fn from_rng(rng: StdRng) -> Self {
        Self {
            rng: Mutex::new(rng),
            base_price: 0.15,
            base_carbon: 200.0,
            base_renewable_mix: 40.0,
        }
    }
}

impl Default for SyntheticEnergySource {
    fn default() -> Self {
        Self::new()
    }
}

impl EnergySource for SyntheticEnergySource {
    fn get(&self, timestamp: DateTime<Utc>, location: &str) -> EnergyReading {
        let hour = timestamp.hour();
        let is_peak = (9..=20).contains(&hour);

        let region_modifier = if location.contains("London") {
            1.2
        } else if location.contains("Scotland") {
            0.8
        } else {
            1.0
        };

        let price_multiplier = if is_peak { 1.5 } else { 0.8 };
        let mut carbon_multiplier = if is_peak { 1.2 } else { 0.9 };
        let mut renewable_bonus = 0.0;
        if location.contains("South West") && (10..=16).contains(&hour) {
            carbon_multiplier = 0.6;
            renewable_bonus = 25.0;
        }
        if location.contains("Scotland") {
            renewable_bonus += 20.0;
        }

        let (price_noise, carbon_noise, mix_noise) = {
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            (
                rng.random_range(-0.04..=0.04),
                rng.random_range(-20.0..=20.0),
                rng.random_range(-10.0..=10.0),
            )
        };

        let price = self.base_price * price_multiplier * region_modifier + price_noise;
        let carbon = self.base_carbon * carbon_multiplier * region_modifier + carbon_noise;
        let renewable_mix = self.base_renewable_mix + renewable_bonus + mix_noise;

        EnergyReading {
            price: round_to(price.max(0.0), 3),
            carbon_intensity: round_to(carbon.max(0.0), 2),
            renewable_mix: round_to(renewable_mix.clamp(0.0, 100.0), 1),
        }
    }
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}
