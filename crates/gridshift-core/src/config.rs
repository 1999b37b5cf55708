//! gridshift.toml configuration parser.
//!
//! Every section is optional; omitted sections fall back to defaults that
//! reproduce the four-region UK topology.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::scoring::ScoringWeights;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GridConfig {
    pub scheduler: SchedulerSettings,
    pub scoring: ScoringWeights,
    pub reservation: ReservationSettings,
    pub simulation: SimulationSettings,
    pub regions: Vec<RegionConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchedulerSettings {
    /// Regions refuse to reserve a slot scoring above this ceiling.
    pub cost_threshold: f64,
    /// Executors priced above this (GBP/kWh) shed their running jobs.
    pub spike_price_threshold: f64,
    /// Length cap of a region's `lowest_cost_options`.
    pub max_cost_options: usize,
    /// Capacity of the scheduler's event ring buffer.
    pub log_capacity: usize,
    /// Number of log entries returned with a status snapshot.
    pub status_log_tail: usize,
    /// How long a discovery snapshot may be reused.
    pub discovery_ttl_secs: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            cost_threshold: 70.0,
            spike_price_threshold: 0.30,
            max_cost_options: 50,
            log_capacity: 500,
            status_log_tail: 20,
            discovery_ttl_secs: 300,
        }
    }
}

impl SchedulerSettings {
    pub fn discovery_ttl(&self) -> chrono::Duration {
        i64::try_from(self.discovery_ttl_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::Duration::MAX)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReservationSettings {
    /// Buyer identity presented to providers on `select`.
    pub buyer_id: String,
    /// Budget for any single provider call.
    pub timeout_ms: u64,
    /// Free-text discovery query.
    pub discovery_query: String,
}

impl Default for ReservationSettings {
    fn default() -> Self {
        Self {
            buyer_id: "gridshift-global".to_string(),
            timeout_ms: 5_000,
            discovery_query: "Grid flexibility windows".to_string(),
        }
    }
}

impl ReservationSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimulationSettings {
    /// Simulated time advanced per tick.
    pub tick_minutes: u32,
    /// Wall-clock pause between ticks.
    pub tick_interval_ms: u64,
    /// Chance that a tick brings new jobs.
    pub job_arrival_probability: f64,
    pub max_jobs_per_tick: u32,
    /// Chance per tick that a running job finishes early.
    pub completion_probability: f64,
    /// Fixes every random draw when set.
    pub seed: Option<u64>,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            tick_minutes: 15,
            tick_interval_ms: 2_000,
            job_arrival_probability: 0.5,
            max_jobs_per_tick: 5,
            completion_probability: 0.1,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegionConfig {
    pub name: String,
    #[serde(default)]
    pub executors: Vec<ExecutorConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutorConfig {
    pub name: String,
    /// Location key passed to the energy source.
    pub location: String,
    pub capacity: u32,
}

impl Default for GridConfig {
    fn default() -> Self {
        let topology: [(&str, [&str; 3]); 4] = [
            ("London", ["London Central", "London West", "London East"]),
            ("North", ["Manchester", "Leeds", "Liverpool"]),
            ("Scotland", ["Edinburgh", "Glasgow", "Aberdeen"]),
            ("South West", ["Bristol", "Cardiff", "Exeter"]),
        ];

        let regions = topology
            .iter()
            .map(|(region, cities)| RegionConfig {
                name: region.to_string(),
                executors: cities
                    .iter()
                    .map(|city| ExecutorConfig {
                        name: format!("{city} Node"),
                        location: region.to_string(),
                        capacity: 4,
                    })
                    .collect(),
            })
            .collect();

        Self {
            scheduler: SchedulerSettings::default(),
            scoring: ScoringWeights::default(),
            reservation: ReservationSettings::default(),
            simulation: SimulationSettings::default(),
            regions,
        }
    }
}

impl GridConfig {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate.
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: GridConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let s = &self.scheduler;
        if !(0.0..=100.0).contains(&s.cost_threshold) {
            return Err(invalid(format!(
                "scheduler.cost_threshold must be within 0..=100, got {}",
                s.cost_threshold
            )));
        }
        if s.spike_price_threshold.is_nan() || s.spike_price_threshold <= 0.0 {
            return Err(invalid("scheduler.spike_price_threshold must be positive"));
        }
        if s.max_cost_options == 0 || s.log_capacity == 0 {
            return Err(invalid(
                "scheduler.max_cost_options and scheduler.log_capacity must be non-zero",
            ));
        }

        let sim = &self.simulation;
        if sim.tick_minutes == 0 || sim.max_jobs_per_tick == 0 {
            return Err(invalid(
                "simulation.tick_minutes and simulation.max_jobs_per_tick must be non-zero",
            ));
        }
        for (key, p) in [
            ("job_arrival_probability", sim.job_arrival_probability),
            ("completion_probability", sim.completion_probability),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(invalid(format!("simulation.{key} must be within 0..=1, got {p}")));
            }
        }

        let mut region_names = HashSet::new();
        let mut executor_names = HashSet::new();
        for region in &self.regions {
            if region.name.trim().is_empty() {
                return Err(invalid("region name must not be empty"));
            }
            if !region_names.insert(region.name.as_str()) {
                return Err(invalid(format!("duplicate region '{}'", region.name)));
            }
            for executor in &region.executors {
                if executor.name.trim().is_empty() {
                    return Err(invalid(format!(
                        "executor in region '{}' has an empty name",
                        region.name
                    )));
                }
                if executor.capacity == 0 {
                    return Err(invalid(format!(
                        "executor '{}' must have non-zero capacity",
                        executor.name
                    )));
                }
                if !executor_names.insert(executor.name.as_str()) {
                    return Err(invalid(format!("duplicate executor '{}'", executor.name)));
                }
            }
        }

        Ok(())
    }
}

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(msg.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_topology_is_valid() {
        let config = GridConfig::default();
        config.validate().unwrap();
        assert_eq!(config.regions.len(), 4);
        assert!(config.regions.iter().all(|r| r.executors.len() == 3));
        assert_eq!(config.regions[0].executors[0].name, "London Central Node");
    }

    #[test]
    fn empty_file_yields_defaults() {
        let config = GridConfig::from_toml_str("").unwrap();
        assert_eq!(config, GridConfig::default());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = GridConfig::from_toml_str(
            r#"
[scheduler]
cost_threshold = 60.0

[[regions]]
name = "Test"

[[regions.executors]]
name = "A"
location = "Test"
capacity = 2
"#,
        )
        .unwrap();

        assert_eq!(config.scheduler.cost_threshold, 60.0);
        assert_eq!(config.scheduler.spike_price_threshold, 0.30);
        assert_eq!(config.scoring, ScoringWeights::default());
        assert_eq!(config.regions.len(), 1);
        assert_eq!(config.regions[0].executors[0].capacity, 2);
    }

    #[test]
    fn round_trips_through_toml() {
        let config = GridConfig::default();
        let text = config.to_toml_string().unwrap();
        assert!(text.contains("cost_threshold"));
        assert_eq!(GridConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn rejects_duplicate_executor_names() {
        let err = GridConfig::from_toml_str(
            r#"
[[regions]]
name = "A"
executors = [{ name = "X", location = "A", capacity = 1 }]

[[regions]]
name = "B"
executors = [{ name = "X", location = "B", capacity = 1 }]
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("duplicate executor")));
    }

    #[test]
    fn rejects_zero_capacity_and_bad_threshold() {
        let zero = GridConfig::from_toml_str(
            r#"
[[regions]]
name = "A"
executors = [{ name = "X", location = "A", capacity = 0 }]
"#,
        );
        assert!(matches!(zero, Err(ConfigError::Invalid(_))));

        let threshold = GridConfig::from_toml_str("[scheduler]\ncost_threshold = 150.0\n");
        assert!(matches!(threshold, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn from_file_reads_and_reports_missing_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[simulation]\nseed = 7").unwrap();
        let config = GridConfig::from_file(file.path()).unwrap();
        assert_eq!(config.simulation.seed, Some(7));

        let missing = GridConfig::from_file(Path::new("/nonexistent/gridshift.toml"));
        assert!(matches!(missing, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let err = GridConfig::from_toml_str("[scheduler\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
