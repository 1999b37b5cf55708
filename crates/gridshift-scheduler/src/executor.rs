//! LocalExecutor — one schedulable compute slot.
//!
//! An executor owns its capacity and running-job set outright. Capacity is
//! never stored separately: it is always `total_capacity - running.len()`,
//! and a job enters `running` only after its reservation is confirmed.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Timelike, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use gridshift_core::config::ExecutorConfig;
use gridshift_core::{
    ComputeJob, EnergyReading, EnergySource, ExecutorReport, GridConfig, JobId, JobStatus,
    ScheduleEntry, ScoringWeights, cost_score,
};
use gridshift_reservation::{
    JobMetadata, RemoteOrderState, Reservation, ReservationClient, UpdateAction,
};

use crate::error::{SchedulerError, SchedulerResult};

/// Knobs shared by every executor in a deployment.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorPolicy {
    /// Buyer identity presented on `select`.
    pub buyer_id: String,
    /// Price (GBP/kWh) above which the executor counts as spiking.
    pub spike_price_threshold: f64,
    /// Per-tick chance that a running job finishes before its scheduled end.
    pub completion_probability: f64,
    pub weights: ScoringWeights,
}

impl ExecutorPolicy {
    pub fn from_config(config: &GridConfig) -> Self {
        Self {
            buyer_id: config.reservation.buyer_id.clone(),
            spike_price_threshold: config.scheduler.spike_price_threshold,
            completion_probability: config.simulation.completion_probability,
            weights: config.scoring,
        }
    }
}

impl Default for ExecutorPolicy {
    fn default() -> Self {
        Self::from_config(&GridConfig::default())
    }
}

/// A job admitted onto an executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Admission {
    pub job_id: JobId,
    pub executor: String,
    pub reservation_id: String,
    pub order_id: Option<String>,
    pub schedule: ScheduleEntry,
}

#[derive(Debug, Clone)]
struct RunningJob {
    job: ComputeJob,
    reservation: Reservation,
    schedule: ScheduleEntry,
}

pub struct LocalExecutor {
    name: String,
    location: String,
    slot_id: String,
    total_capacity: u32,
    running: BTreeMap<JobId, RunningJob>,
    reading: EnergyReading,
    /// Worst possible until the first `update`.
    cost_score: f64,
    policy: ExecutorPolicy,
    energy: Arc<dyn EnergySource>,
    client: Arc<dyn ReservationClient>,
    rng: StdRng,
}

impl LocalExecutor {
    pub fn new(
        config: &ExecutorConfig,
        policy: ExecutorPolicy,
        energy: Arc<dyn EnergySource>,
        client: Arc<dyn ReservationClient>,
    ) -> Self {
        Self {
            name: config.name.clone(),
            location: config.location.clone(),
            slot_id: format!("slot-{}", config.name.to_lowercase().replace(' ', "-")),
            total_capacity: config.capacity,
            running: BTreeMap::new(),
            reading: EnergyReading::default(),
            cost_score: 100.0,
            policy,
            energy,
            client,
            rng: StdRng::from_os_rng(),
        }
    }

    /// Fix the completion draws.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Pull fresh grid inputs, finish jobs, and rescore.
    ///
    /// A running job finishes once its scheduled end has passed, or earlier
    /// with probability `completion_probability`. Returns the finished ids.
    pub fn update(&mut self, now: DateTime<Utc>) -> Vec<JobId> {
        self.reading = self.energy.get(now, &self.location);

        let mut finished = Vec::new();
        for (job_id, slot) in &self.running {
            let due = now >= slot.schedule.end_time;
            if due || self.rng.random::<f64>() < self.policy.completion_probability {
                finished.push(job_id.clone());
            }
        }

        for job_id in &finished {
            if let Some(mut slot) = self.running.remove(job_id) {
                if let Err(e) = slot.reservation.complete() {
                    warn!(executor = %self.name, job = %job_id, error = %e, "reservation not completable");
                }
                slot.job.status = JobStatus::Completed;
                info!(executor = %self.name, job = %job_id, "job completed");
            }
        }

        self.cost_score = cost_score(&self.reading, now.hour(), &self.policy.weights);
        debug!(
            executor = %self.name,
            price = self.reading.price,
            carbon = self.reading.carbon_intensity,
            score = self.cost_score,
            available = self.available_capacity(),
            "executor updated"
        );

        finished
    }

    /// Reserve a slot for `job` and admit it.
    ///
    /// Nothing changes unless the whole select → init → confirm sequence
    /// succeeds.
    pub fn assign_job(&mut self, job: &ComputeJob, now: DateTime<Utc>) -> SchedulerResult<Admission> {
        if self.available_capacity() == 0 {
            return Err(SchedulerError::CapacityExhausted {
                scope: self.name.clone(),
            });
        }
        if self.running.contains_key(&job.job_id) {
            return Err(SchedulerError::DuplicateJob(job.job_id.clone()));
        }

        let metadata = JobMetadata::from(job);
        let reservation = Reservation::negotiate(
            self.client.as_ref(),
            &self.slot_id,
            &self.policy.buyer_id,
            &metadata,
            now,
        )
        .map_err(|failure| SchedulerError::ReservationFailed {
            executor: self.name.clone(),
            source: failure.error,
        })?;

        let start_time = now.max(job.earliest_start);
        let end_time = start_time
            .checked_add_signed(job.runtime())
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let schedule = ScheduleEntry {
            job_id: job.job_id.clone(),
            start_time,
            end_time,
        };

        let admission = Admission {
            job_id: job.job_id.clone(),
            executor: self.name.clone(),
            reservation_id: reservation.id.clone(),
            order_id: reservation.order_id.clone(),
            schedule: schedule.clone(),
        };

        let mut admitted = job.clone();
        admitted.status = JobStatus::Running;
        self.running.insert(
            job.job_id.clone(),
            RunningJob {
                job: admitted,
                reservation,
                schedule,
            },
        );

        info!(
            executor = %self.name,
            job = %job.job_id,
            order = ?admission.order_id,
            available = self.available_capacity(),
            "job admitted"
        );
        Ok(admission)
    }

    pub fn check_price_spike(&self) -> bool {
        self.reading.price > self.policy.spike_price_threshold
    }

    /// Tell the provider this job's load is moving to `target`.
    ///
    /// Returns `false` when the job has no active reservation here or the
    /// provider refuses the update.
    pub fn trigger_workload_shift(&self, job_id: &str, target: &str) -> bool {
        let Some(slot) = self.running.get(job_id) else {
            return false;
        };
        let Some(order_id) = slot.reservation.order_id.as_deref() else {
            return false;
        };
        if !slot.reservation.is_active() {
            return false;
        }

        let action = UpdateAction::FlexibilityResponse {
            target: target.to_string(),
            reason: format!(
                "price spike at {}: {:.2} GBP/kWh",
                self.name, self.reading.price
            ),
        };
        match self.client.update(order_id, &action) {
            Ok(_) => {
                info!(executor = %self.name, job = %job_id, %target, "workload shift signalled");
                true
            }
            Err(e) => {
                warn!(executor = %self.name, job = %job_id, error = %e, "workload shift refused");
                false
            }
        }
    }

    /// Provider-side state of a running job's order.
    pub fn reservation_status(&self, job_id: &str) -> Option<RemoteOrderState> {
        let order_id = self.running.get(job_id)?.reservation.order_id.as_deref()?;
        Some(self.client.status(order_id))
    }

    /// Drop a running job and cancel its local reservation.
    pub fn release_job(&mut self, job_id: &str) -> Option<ComputeJob> {
        let mut slot = self.running.remove(job_id)?;
        slot.reservation.cancel();
        debug!(executor = %self.name, job = %job_id, "job released");
        Some(slot.job)
    }

    pub fn report(&self) -> ExecutorReport {
        ExecutorReport {
            name: self.name.clone(),
            location: self.location.clone(),
            price: self.reading.price,
            carbon_intensity: self.reading.carbon_intensity,
            renewable_mix: self.reading.renewable_mix,
            cost_score: self.cost_score,
            available_capacity: self.available_capacity(),
            total_capacity: self.total_capacity,
            running_jobs: self.running.keys().cloned().collect(),
        }
    }

    /// One-line description for advisory prompts.
    pub fn summary(&self) -> String {
        format!(
            "{}: price {:.2} GBP/kWh, carbon {:.0} g/kWh, renewables {:.0}%, score {:.1}, {}/{} free",
            self.name,
            self.reading.price,
            self.reading.carbon_intensity,
            self.reading.renewable_mix,
            self.cost_score,
            self.available_capacity(),
            self.total_capacity
        )
    }

    // ── Accessors ────────────────────────────────────────────────

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn cost_score(&self) -> f64 {
        self.cost_score
    }

    pub fn reading(&self) -> EnergyReading {
        self.reading
    }

    pub fn total_capacity(&self) -> u32 {
        self.total_capacity
    }

    pub fn available_capacity(&self) -> u32 {
        let running = u32::try_from(self.running.len()).unwrap_or(u32::MAX);
        self.total_capacity.saturating_sub(running)
    }

    pub fn running_job_ids(&self) -> Vec<JobId> {
        self.running.keys().cloned().collect()
    }

    pub fn running_job(&self, job_id: &str) -> Option<&ComputeJob> {
        self.running.get(job_id).map(|slot| &slot.job)
    }

    pub fn schedule_entry(&self, job_id: &str) -> Option<&ScheduleEntry> {
        self.running.get(job_id).map(|slot| &slot.schedule)
    }

    pub fn has_job(&self, job_id: &str) -> bool {
        self.running.contains_key(job_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use gridshift_core::StaticEnergySource;
    use gridshift_reservation::{LifecycleStep, SimulatedReservationClient};

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 11, 24, 12, 0, 0).unwrap()
    }

    fn quiet_policy() -> ExecutorPolicy {
        ExecutorPolicy {
            completion_probability: 0.0,
            ..ExecutorPolicy::default()
        }
    }

    struct Fixture {
        energy: Arc<StaticEnergySource>,
        client: Arc<SimulatedReservationClient>,
        executor: LocalExecutor,
    }

    fn fixture(capacity: u32, price: f64) -> Fixture {
        let energy = Arc::new(
            StaticEnergySource::new(EnergyReading::default())
                .with("Leeds", EnergyReading::new(price, 100.0, 40.0)),
        );
        let client = Arc::new(SimulatedReservationClient::new("provider-1"));
        let config = ExecutorConfig {
            name: "Leeds Node".to_string(),
            location: "Leeds".to_string(),
            capacity,
        };
        let mut executor = LocalExecutor::new(&config, quiet_policy(), energy.clone(), client.clone())
            .with_seed(7);
        executor.update(noon());
        Fixture {
            energy,
            client,
            executor,
        }
    }

    fn job(id: &str, hours: f64) -> ComputeJob {
        ComputeJob::new(id, 100.0, hours, 3, noon())
    }

    fn assert_capacity_invariant(executor: &LocalExecutor) {
        assert_eq!(
            executor.available_capacity() as usize + executor.running_job_ids().len(),
            executor.total_capacity() as usize
        );
    }

    #[test]
    fn score_is_unrated_until_first_update() {
        let config = ExecutorConfig {
            name: "x".to_string(),
            location: "x".to_string(),
            capacity: 1,
        };
        let executor = LocalExecutor::new(
            &config,
            quiet_policy(),
            Arc::new(StaticEnergySource::default()),
            Arc::new(SimulatedReservationClient::new("p")),
        );
        assert_eq!(executor.cost_score(), 100.0);
    }

    #[test]
    fn update_scores_by_price() {
        let cheap = fixture(1, 0.10);
        let dear = fixture(1, 0.50);
        assert!(cheap.executor.cost_score() < 70.0);
        assert!(dear.executor.cost_score() > 70.0);
        assert!((0.0..=100.0).contains(&dear.executor.cost_score()));
    }

    #[test]
    fn admits_and_schedules() {
        let mut f = fixture(2, 0.10);
        let admission = f.executor.assign_job(&job("job-1", 2.0), noon()).unwrap();

        assert_eq!(admission.executor, "Leeds Node");
        assert_eq!(admission.schedule.start_time, noon());
        assert_eq!(admission.schedule.end_time, noon() + Duration::hours(2));
        assert!(admission.order_id.is_some());
        assert_eq!(f.executor.available_capacity(), 1);
        assert_eq!(
            f.executor.running_job("job-1").map(|j| j.status),
            Some(JobStatus::Running)
        );
        assert_capacity_invariant(&f.executor);
    }

    #[test]
    fn future_start_is_respected() {
        let mut f = fixture(1, 0.10);
        let later = noon() + Duration::hours(3);
        let job = ComputeJob::new("job-1", 1.0, 1.0, 3, later);
        let admission = f.executor.assign_job(&job, noon()).unwrap();
        assert_eq!(admission.schedule.start_time, later);
    }

    #[test]
    fn full_executor_rejects() {
        let mut f = fixture(1, 0.10);
        f.executor.assign_job(&job("job-1", 1.0), noon()).unwrap();
        let err = f.executor.assign_job(&job("job-2", 1.0), noon()).unwrap_err();
        assert!(matches!(err, SchedulerError::CapacityExhausted { .. }));
        assert_eq!(f.client.call_count(LifecycleStep::Select), 1);
        assert_capacity_invariant(&f.executor);
    }

    #[test]
    fn failed_lifecycle_leaves_state_untouched() {
        for step in [LifecycleStep::Select, LifecycleStep::Init, LifecycleStep::Confirm] {
            let mut f = fixture(2, 0.10);
            f.client.fail_at(step);

            let err = f.executor.assign_job(&job("job-1", 1.0), noon()).unwrap_err();
            assert!(matches!(err, SchedulerError::ReservationFailed { .. }));
            assert_eq!(f.executor.available_capacity(), 2);
            assert!(!f.executor.has_job("job-1"));
        }
    }

    #[test]
    fn provider_cancellation_is_not_admission() {
        let mut f = fixture(1, 0.10);
        f.client.cancel_on_confirm(true);
        assert!(f.executor.assign_job(&job("job-1", 1.0), noon()).is_err());
        assert_eq!(f.executor.available_capacity(), 1);
    }

    #[test]
    fn jobs_finish_at_scheduled_end() {
        let mut f = fixture(2, 0.10);
        f.executor.assign_job(&job("short", 1.0), noon()).unwrap();
        f.executor.assign_job(&job("long", 5.0), noon()).unwrap();

        assert!(f.executor.update(noon() + Duration::minutes(30)).is_empty());
        let finished = f.executor.update(noon() + Duration::hours(1));
        assert_eq!(finished, vec!["short".to_string()]);
        assert_eq!(f.executor.available_capacity(), 1);
        assert_capacity_invariant(&f.executor);
    }

    #[test]
    fn certain_completion_drains_everything() {
        let mut f = fixture(3, 0.10);
        f.executor.policy.completion_probability = 1.0;
        f.executor.assign_job(&job("a", 10.0), noon()).unwrap();
        f.executor.assign_job(&job("b", 10.0), noon()).unwrap();

        let finished = f.executor.update(noon());
        assert_eq!(finished.len(), 2);
        assert_eq!(f.executor.available_capacity(), 3);
    }

    #[test]
    fn spike_detection_follows_price() {
        let mut f = fixture(1, 0.10);
        assert!(!f.executor.check_price_spike());

        f.energy.set("Leeds", EnergyReading::new(0.35, 100.0, 40.0));
        f.executor.update(noon());
        assert!(f.executor.check_price_spike());
    }

    #[test]
    fn workload_shift_needs_active_reservation() {
        let mut f = fixture(1, 0.10);
        assert!(!f.executor.trigger_workload_shift("missing", "Glasgow Node"));

        f.executor.assign_job(&job("job-1", 1.0), noon()).unwrap();
        assert!(f.executor.trigger_workload_shift("job-1", "Glasgow Node"));

        let updates = f.client.updates();
        assert_eq!(updates.len(), 1);
        assert!(matches!(
            &updates[0].action,
            UpdateAction::FlexibilityResponse { target, .. } if target == "Glasgow Node"
        ));
    }

    #[test]
    fn workload_shift_reports_provider_refusal() {
        let mut f = fixture(1, 0.10);
        f.executor.assign_job(&job("job-1", 1.0), noon()).unwrap();
        f.client.fail_at(LifecycleStep::Update);
        assert!(!f.executor.trigger_workload_shift("job-1", "Glasgow Node"));
    }

    #[test]
    fn release_frees_capacity() {
        let mut f = fixture(1, 0.10);
        f.executor.assign_job(&job("job-1", 1.0), noon()).unwrap();
        assert_eq!(
            f.executor.reservation_status("job-1"),
            Some(RemoteOrderState::Confirmed)
        );

        let released = f.executor.release_job("job-1").unwrap();
        assert_eq!(released.job_id, "job-1");
        assert_eq!(f.executor.available_capacity(), 1);
        assert!(f.executor.release_job("job-1").is_none());
        assert_eq!(f.executor.reservation_status("job-1"), None);
    }

    #[test]
    fn report_reflects_state() {
        let mut f = fixture(2, 0.10);
        f.executor.assign_job(&job("job-1", 1.0), noon()).unwrap();

        let report = f.executor.report();
        assert_eq!(report.name, "Leeds Node");
        assert_eq!(report.available_capacity, 1);
        assert_eq!(report.total_capacity, 2);
        assert_eq!(report.running_jobs, vec!["job-1".to_string()]);
        assert_eq!(report.price, 0.10);
        assert!(f.executor.summary().contains("1/2 free"));
    }
}
