//! Domain types shared by every scheduling tier.
//!
//! Reports flow upward (executor → region → global) as typed structs; jobs
//! flow downward. All types are serializable so the daemon can emit status
//! snapshots as JSON.

use std::ops::RangeInclusive;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a compute job.
pub type JobId = String;

/// Valid job priorities; higher is more urgent.
pub const PRIORITY_RANGE: RangeInclusive<u8> = 1..=5;

// ── Jobs ─────────────────────────────────────────────────────────

/// Lifecycle status of a compute job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Assigned,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    /// Completed and failed jobs never change status again.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// A unit of work to be placed on a compute slot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComputeJob {
    pub job_id: JobId,
    /// Abstract work size (FLOPs or core-hours).
    pub computation_size: f64,
    pub estimated_runtime_hours: f64,
    /// 1–5, higher = more urgent.
    pub priority: u8,
    /// The job must not start before this instant.
    pub earliest_start: DateTime<Utc>,
    /// The job must start by this instant or it fails.
    pub deadline: Option<DateTime<Utc>>,
    /// Explicit provider targeting; honoured only when that executor is eligible.
    #[serde(default)]
    pub preferred_executor: Option<String>,
    pub status: JobStatus,
}

impl ComputeJob {
    pub fn new(
        job_id: impl Into<JobId>,
        computation_size: f64,
        estimated_runtime_hours: f64,
        priority: u8,
        earliest_start: DateTime<Utc>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            computation_size,
            estimated_runtime_hours,
            priority,
            earliest_start,
            deadline: None,
            preferred_executor: None,
            status: JobStatus::Pending,
        }
    }

    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_preferred_executor(mut self, executor: impl Into<String>) -> Self {
        self.preferred_executor = Some(executor.into());
        self
    }

    pub fn has_valid_priority(&self) -> bool {
        PRIORITY_RANGE.contains(&self.priority)
    }

    /// True once `now` is strictly after the deadline.
    pub fn is_past_deadline(&self, now: DateTime<Utc>) -> bool {
        self.deadline.is_some_and(|deadline| now > deadline)
    }

    /// True once the earliest start has been reached.
    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        now >= self.earliest_start
    }

    /// Estimated runtime, rounded to whole seconds. Negative estimates count as zero.
    pub fn runtime(&self) -> Duration {
        let secs = (self.estimated_runtime_hours.max(0.0) * 3600.0).round();
        Duration::try_seconds(secs as i64).unwrap_or(Duration::MAX)
    }
}

/// A job description as submitted by a client; the scheduler assigns the id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobRequest {
    pub computation_size: f64,
    pub estimated_runtime_hours: f64,
    pub priority: u8,
    #[serde(default)]
    pub earliest_start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub preferred_executor: Option<String>,
}

impl JobRequest {
    /// Build a pending job; a missing earliest start means "now".
    pub fn into_job(self, job_id: JobId, now: DateTime<Utc>) -> ComputeJob {
        ComputeJob {
            job_id,
            computation_size: self.computation_size,
            estimated_runtime_hours: self.estimated_runtime_hours,
            priority: self.priority,
            earliest_start: self.earliest_start.unwrap_or(now),
            deadline: self.deadline,
            preferred_executor: self.preferred_executor,
            status: JobStatus::Pending,
        }
    }
}

/// Planned execution window for an admitted job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScheduleEntry {
    pub job_id: JobId,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

// ── Energy ───────────────────────────────────────────────────────

/// Grid conditions at one location and instant.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct EnergyReading {
    /// Energy price in GBP/kWh.
    pub price: f64,
    /// gCO2/kWh.
    pub carbon_intensity: f64,
    /// Renewable share in percent.
    pub renewable_mix: f64,
}

impl EnergyReading {
    pub fn new(price: f64, carbon_intensity: f64, renewable_mix: f64) -> Self {
        Self {
            price,
            carbon_intensity,
            renewable_mix,
        }
    }
}

// ── Reports ──────────────────────────────────────────────────────

/// State of one executor as seen by its regional coordinator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutorReport {
    pub name: String,
    pub location: String,
    pub price: f64,
    pub carbon_intensity: f64,
    pub renewable_mix: f64,
    /// Range 0.0..=100.0, lower is better.
    pub cost_score: f64,
    pub available_capacity: u32,
    pub total_capacity: u32,
    pub running_jobs: Vec<JobId>,
}

/// One entry of a region's ranked option list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LowestCostOption {
    pub executor: String,
    pub price: f64,
    pub carbon_intensity: f64,
    pub cost_score: f64,
    pub available_capacity: u32,
}

impl From<&ExecutorReport> for LowestCostOption {
    fn from(report: &ExecutorReport) -> Self {
        Self {
            executor: report.name.clone(),
            price: report.price,
            carbon_intensity: report.carbon_intensity,
            cost_score: report.cost_score,
            available_capacity: report.available_capacity,
        }
    }
}

/// Aggregated view of a region, used by the global scheduler to rank regions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegionReport {
    pub region: String,
    pub executors: Vec<ExecutorReport>,
    /// Ascending by cost score, bounded in length.
    pub lowest_cost_options: Vec<LowestCostOption>,
    /// Mean executor score; `None` for a region with no executors.
    pub average_score: Option<f64>,
    pub total_capacity: u32,
    pub available_capacity: u32,
    pub deferred_jobs: usize,
    /// Providers seen in the last discovery snapshot.
    pub catalog_providers: usize,
}

impl RegionReport {
    pub fn empty(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            executors: Vec::new(),
            lowest_cost_options: Vec::new(),
            average_score: None,
            total_capacity: 0,
            available_capacity: 0,
            deferred_jobs: 0,
            catalog_providers: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 11, 24, hour, 0, 0).unwrap()
    }

    #[test]
    fn deadline_is_exclusive() {
        let job = ComputeJob::new("j1", 1.0, 2.0, 3, at(8)).with_deadline(at(10));
        assert!(!job.is_past_deadline(at(9)));
        assert!(!job.is_past_deadline(at(10)));
        assert!(job.is_past_deadline(at(11)));
    }

    #[test]
    fn job_without_deadline_never_expires() {
        let job = ComputeJob::new("j1", 1.0, 2.0, 3, at(8));
        assert!(!job.is_past_deadline(at(23)));
    }

    #[test]
    fn runtime_rounds_to_seconds() {
        let job = ComputeJob::new("j1", 1.0, 1.5, 3, at(8));
        assert_eq!(job.runtime(), Duration::minutes(90));

        let negative = ComputeJob::new("j2", 1.0, -3.0, 3, at(8));
        assert_eq!(negative.runtime(), Duration::zero());
    }

    #[test]
    fn priority_validation() {
        assert!(ComputeJob::new("a", 1.0, 1.0, 1, at(0)).has_valid_priority());
        assert!(ComputeJob::new("b", 1.0, 1.0, 5, at(0)).has_valid_priority());
        assert!(!ComputeJob::new("c", 1.0, 1.0, 0, at(0)).has_valid_priority());
        assert!(!ComputeJob::new("d", 1.0, 1.0, 6, at(0)).has_valid_priority());
    }

    #[test]
    fn request_defaults_earliest_start_to_now() {
        let req = JobRequest {
            computation_size: 10.0,
            estimated_runtime_hours: 1.0,
            priority: 2,
            earliest_start: None,
            deadline: None,
            preferred_executor: None,
        };
        let job = req.into_job("job-1".to_string(), at(7));
        assert_eq!(job.earliest_start, at(7));
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.is_ready(at(7)));
    }

    #[test]
    fn status_serializes_uppercase() {
        let json = serde_json::to_string(&JobStatus::Assigned).unwrap();
        assert_eq!(json, "\"ASSIGNED\"");
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Assigned.is_terminal());
    }
}
