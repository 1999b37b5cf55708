//! gridshift-core — shared types for the gridshift scheduling hierarchy.
//!
//! Everything the three scheduling tiers exchange lives here so that the
//! reservation and scheduler crates agree on one vocabulary:
//!
//! - **`types`** — jobs, schedule entries, typed executor/region reports
//! - **`scoring`** — the bounded cost score used to rank compute slots
//! - **`energy`** — the `EnergySource` collaborator and two implementations
//! - **`config`** — `gridshift.toml` parsing and validation

pub mod config;
pub mod energy;
pub mod scoring;
pub mod types;

pub use config::{ConfigError, ConfigResult, GridConfig};
pub use energy::{EnergySource, StaticEnergySource, SyntheticEnergySource};
pub use scoring::{ScoringWeights, cost_score, hourly_workload_forecast};
pub use types::*;
