//! RegionalCoordinator — ranked placement within one region.
//!
//! # Placement
//!
//! ```text
//! assign(job)
//!   ├── candidates = executors with free capacity, ascending by score
//!   │     └── none ─────────────────────────────▶ CapacityExhausted
//!   ├── best score > ceiling ──▶ defer ─────────▶ CostThresholdExceeded
//!   ├── order = preferred executor, then valid suggestion, then rank
//!   └── try assign_job on each eligible candidate in order
//!         ├── first success ────────────────────▶ Placement
//!         └── all failed ──────▶ defer ─────────▶ CandidatesExhausted
//! ```
//!
//! Deferred jobs belong to the region until a later tick places them or
//! their deadline passes.

use std::cmp::Ordering;
use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use gridshift_core::config::SchedulerSettings;
use gridshift_core::{ComputeJob, JobId, LowestCostOption, RegionReport, ScheduleEntry};
use gridshift_reservation::CatalogSnapshot;

use crate::advisory::{self, AdvisoryRequest, NoAdvice, Suggester};
use crate::error::{SchedulerError, SchedulerResult};
use crate::executor::{Admission, LocalExecutor};

/// Where a job ended up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub job_id: JobId,
    pub region: String,
    pub executor: String,
    pub reservation_id: String,
    pub order_id: Option<String>,
    pub schedule: ScheduleEntry,
}

impl Placement {
    fn new(region: &str, admission: Admission) -> Self {
        Self {
            job_id: admission.job_id,
            region: region.to_string(),
            executor: admission.executor,
            reservation_id: admission.reservation_id,
            order_id: admission.order_id,
            schedule: admission.schedule,
        }
    }
}

/// A job moved off a spiking executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkloadShift {
    pub from: String,
    pub placement: Placement,
}

/// Outcome of one pass over the deferred queue.
#[derive(Debug, Clone, Default)]
pub struct RetryOutcome {
    pub placed: Vec<Placement>,
    /// Deferred jobs whose deadline passed; they are no longer queued anywhere.
    pub expired: Vec<ComputeJob>,
    pub still_deferred: usize,
}

/// Everything that happened in one coordinator tick.
#[derive(Debug, Clone, Default)]
pub struct RegionTick {
    pub completed: Vec<JobId>,
    pub placed: Vec<Placement>,
    pub expired: Vec<ComputeJob>,
    pub shifts: Vec<WorkloadShift>,
}

pub struct RegionalCoordinator {
    name: String,
    executors: Vec<LocalExecutor>,
    deferred: VecDeque<ComputeJob>,
    cost_threshold: f64,
    max_cost_options: usize,
    catalog: CatalogSnapshot,
    suggester: Arc<dyn Suggester>,
}

impl RegionalCoordinator {
    pub fn new(name: impl Into<String>, settings: &SchedulerSettings) -> Self {
        Self {
            name: name.into(),
            executors: Vec::new(),
            deferred: VecDeque::new(),
            cost_threshold: settings.cost_threshold,
            max_cost_options: settings.max_cost_options,
            catalog: CatalogSnapshot::default(),
            suggester: Arc::new(NoAdvice),
        }
    }

    pub fn with_suggester(mut self, suggester: Arc<dyn Suggester>) -> Self {
        self.suggester = suggester;
        self
    }

    pub fn register(&mut self, executor: LocalExecutor) -> SchedulerResult<()> {
        if self.executors.iter().any(|e| e.name() == executor.name()) {
            return Err(SchedulerError::DuplicateExecutor(executor.name().to_string()));
        }
        debug!(region = %self.name, executor = %executor.name(), "executor registered");
        self.executors.push(executor);
        Ok(())
    }

    /// Build the region's report. Reads only; two calls with no state
    /// change in between return identical reports.
    pub fn aggregate(&self) -> RegionReport {
        let executors: Vec<_> = self.executors.iter().map(LocalExecutor::report).collect();

        let mut options: Vec<LowestCostOption> =
            executors.iter().map(LowestCostOption::from).collect();
        options.sort_by(|a, b| {
            a.cost_score
                .partial_cmp(&b.cost_score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.executor.cmp(&b.executor))
        });
        options.truncate(self.max_cost_options);

        RegionReport {
            region: self.name.clone(),
            lowest_cost_options: options,
            average_score: self.average_score(),
            total_capacity: executors.iter().map(|e| e.total_capacity).sum(),
            available_capacity: executors.iter().map(|e| e.available_capacity).sum(),
            deferred_jobs: self.deferred.len(),
            catalog_providers: self.catalog.providers.len(),
            executors,
        }
    }

    /// Mean executor score; `None` with no executors.
    pub fn average_score(&self) -> Option<f64> {
        if self.executors.is_empty() {
            return None;
        }
        let total: f64 = self.executors.iter().map(LocalExecutor::cost_score).sum();
        Some(total / self.executors.len() as f64)
    }

    /// Place a job, deferring it when nothing affordable admits it.
    pub fn assign(&mut self, job: &ComputeJob, now: DateTime<Utc>) -> SchedulerResult<Placement> {
        match self.try_place(job, now) {
            Err(e) if e.is_deferral() => {
                info!(region = %self.name, job = %job.job_id, reason = %e, "job deferred");
                self.deferred.push_back(job.clone());
                Err(e)
            }
            other => other,
        }
    }

    /// Re-attempt every deferred job once.
    ///
    /// The queue is drained before the pass so a job failing again is
    /// re-appended exactly once. Jobs past their deadline are dropped.
    pub fn retry_deferred_jobs(&mut self, now: DateTime<Utc>) -> RetryOutcome {
        let mut outcome = RetryOutcome::default();
        let pending: Vec<ComputeJob> = self.deferred.drain(..).collect();

        for job in pending {
            if job.is_past_deadline(now) {
                warn!(region = %self.name, job = %job.job_id, "deferred job missed its deadline");
                outcome.expired.push(job);
                continue;
            }
            match self.try_place(&job, now) {
                Ok(placement) => {
                    info!(
                        region = %self.name,
                        job = %job.job_id,
                        executor = %placement.executor,
                        "deferred job placed"
                    );
                    outcome.placed.push(placement);
                }
                Err(e) => {
                    debug!(region = %self.name, job = %job.job_id, reason = %e, "job stays deferred");
                    self.deferred.push_back(job);
                }
            }
        }

        outcome.still_deferred = self.deferred.len();
        outcome
    }

    /// Move jobs off executors whose price is above the spike threshold.
    ///
    /// For each running job with an active provider order, the source
    /// signals the shift, then the cheapest other executor with room (and a
    /// strictly better score) admits it. The job leaves the source only
    /// once the target has admitted it.
    pub fn handle_price_spikes(&mut self, now: DateTime<Utc>) -> Vec<WorkloadShift> {
        let mut shifts = Vec::new();

        let spiking: Vec<usize> = (0..self.executors.len())
            .filter(|&i| {
                let e = &self.executors[i];
                e.check_price_spike() && !e.running_job_ids().is_empty()
            })
            .collect();

        for source in spiking {
            let source_name = self.executors[source].name().to_string();
            warn!(
                region = %self.name,
                executor = %source_name,
                price = self.executors[source].reading().price,
                "price spike"
            );

            for job_id in self.executors[source].running_job_ids() {
                let Some(target) = self.shift_target(source) else {
                    debug!(region = %self.name, executor = %source_name, "no cheaper executor with room");
                    break;
                };

                let active = self.executors[source]
                    .reservation_status(&job_id)
                    .is_some_and(|state| state.is_active());
                if !active {
                    debug!(job = %job_id, "skipping job without an active order");
                    continue;
                }

                let target_name = self.executors[target].name().to_string();
                if !self.executors[source].trigger_workload_shift(&job_id, &target_name) {
                    continue;
                }
                let Some(job) = self.executors[source].running_job(&job_id).cloned() else {
                    continue;
                };

                match self.executors[target].assign_job(&job, now) {
                    Ok(admission) => {
                        self.executors[source].release_job(&job_id);
                        info!(
                            region = %self.name,
                            job = %job_id,
                            from = %source_name,
                            to = %target_name,
                            "job reassigned"
                        );
                        shifts.push(WorkloadShift {
                            from: source_name.clone(),
                            placement: Placement::new(&self.name, admission),
                        });
                    }
                    Err(e) => {
                        warn!(job = %job_id, to = %target_name, error = %e, "reassignment failed, job stays");
                    }
                }
            }
        }

        shifts
    }

    /// Refresh every executor, then retry deferrals and handle spikes.
    pub fn update(&mut self, now: DateTime<Utc>) -> RegionTick {
        let mut tick = RegionTick::default();
        for executor in &mut self.executors {
            tick.completed.extend(executor.update(now));
        }

        let retry = self.retry_deferred_jobs(now);
        tick.placed = retry.placed;
        tick.expired = retry.expired;
        tick.shifts = self.handle_price_spikes(now);
        tick
    }

    /// Store the latest discovery snapshot.
    pub fn ingest_catalog(&mut self, catalog: CatalogSnapshot) {
        debug!(region = %self.name, providers = catalog.providers.len(), "catalog ingested");
        self.catalog = catalog;
    }

    // ── Accessors ────────────────────────────────────────────────

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn executors(&self) -> &[LocalExecutor] {
        &self.executors
    }

    pub fn executor(&self, name: &str) -> Option<&LocalExecutor> {
        self.executors.iter().find(|e| e.name() == name)
    }

    pub fn deferred_jobs(&self) -> impl Iterator<Item = &ComputeJob> {
        self.deferred.iter()
    }

    pub fn is_deferred(&self, job_id: &str) -> bool {
        self.deferred.iter().any(|j| j.job_id == job_id)
    }

    pub fn cost_threshold(&self) -> f64 {
        self.cost_threshold
    }

    // ── Internal helpers ─────────────────────────────────────────

    /// Indices of executors with room, best score first (ties by name).
    fn ranked_candidates(&self) -> Vec<usize> {
        let mut ranked: Vec<usize> = (0..self.executors.len())
            .filter(|&i| self.executors[i].available_capacity() > 0)
            .collect();
        ranked.sort_by(|&a, &b| self.compare(a, b));
        ranked
    }

    fn compare(&self, a: usize, b: usize) -> Ordering {
        let (a, b) = (&self.executors[a], &self.executors[b]);
        a.cost_score()
            .partial_cmp(&b.cost_score())
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.name().cmp(b.name()))
    }

    fn try_place(&mut self, job: &ComputeJob, now: DateTime<Utc>) -> SchedulerResult<Placement> {
        let ranked = self.ranked_candidates();
        let Some(&best) = ranked.first() else {
            return Err(SchedulerError::CapacityExhausted {
                scope: self.name.clone(),
            });
        };

        let best_score = self.executors[best].cost_score();
        if best_score > self.cost_threshold {
            return Err(SchedulerError::CostThresholdExceeded {
                region: self.name.clone(),
                best_score,
                threshold: self.cost_threshold,
            });
        }

        let eligible: Vec<usize> = ranked
            .into_iter()
            .filter(|&i| self.executors[i].cost_score() <= self.cost_threshold)
            .collect();
        let order = self.attempt_order(job, eligible);

        let mut attempted = 0;
        for idx in order {
            attempted += 1;
            match self.executors[idx].assign_job(job, now) {
                Ok(admission) => return Ok(Placement::new(&self.name, admission)),
                Err(e) => {
                    warn!(
                        region = %self.name,
                        job = %job.job_id,
                        executor = %self.executors[idx].name(),
                        error = %e,
                        "candidate failed, trying next"
                    );
                }
            }
        }

        Err(SchedulerError::CandidatesExhausted {
            region: self.name.clone(),
            attempted,
        })
    }

    /// Rank order, with a valid suggestion and then the job's preferred
    /// executor pulled to the front.
    fn attempt_order(&self, job: &ComputeJob, mut eligible: Vec<usize>) -> Vec<usize> {
        let names: Vec<String> = eligible
            .iter()
            .map(|&i| self.executors[i].name().to_string())
            .collect();
        let summaries: Vec<String> = eligible.iter().map(|&i| self.executors[i].summary()).collect();

        let request = AdvisoryRequest {
            job,
            candidates: &names,
            summaries: &summaries,
        };
        if let Some(suggestion) = advisory::validate(self.suggester.suggest(&request), &names) {
            debug!(
                job = %job.job_id,
                candidate = %suggestion.selected_candidate,
                rationale = %suggestion.rationale,
                "using advisory suggestion"
            );
            self.promote(&mut eligible, &suggestion.selected_candidate);
        }

        if let Some(preferred) = job.preferred_executor.as_deref() {
            if !self.promote(&mut eligible, preferred) {
                debug!(job = %job.job_id, %preferred, "preferred executor not eligible, using rank");
            }
        }

        eligible
    }

    /// Cheapest executor other than `source` with room and a strictly
    /// lower score than `source`.
    fn shift_target(&self, source: usize) -> Option<usize> {
        let source_score = self.executors[source].cost_score();
        self.ranked_candidates()
            .into_iter()
            .find(|&i| i != source && self.executors[i].cost_score() < source_score)
    }

    /// Move the executor called `name` to the front of `order`, if present.
    fn promote(&self, order: &mut Vec<usize>, name: &str) -> bool {
        let Some(pos) = order.iter().position(|&i| self.executors[i].name() == name) else {
            return false;
        };
        let idx = order.remove(pos);
        order.insert(0, idx);
        true
    }
}
