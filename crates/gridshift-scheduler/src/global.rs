//! GlobalScheduler — intake ordering and region selection.
//!
//! The global scheduler owns the intake queue and the central job registry.
//! Each cycle it orders the queue by urgency, fails jobs whose deadline has
//! passed, and hands every other job to the region with the best average
//! score. Jobs a region defers stay with that region; everything else that
//! fails goes back on the queue for the next cycle.
//!
//! # Cycle
//!
//! ```text
//! run_cycle(now)
//!   ├── queue empty ─────────────────────────────▶ idle
//!   ├── discovery (cached for discovery_ttl)
//!   │     └── unavailable, no fresh cache ───────▶ skipped, queue untouched
//!   ├── sort: priority desc, deadline asc, no deadline last
//!   └── per job
//!         ├── past deadline ──────────▶ FAILED (never requeued)
//!         ├── not yet startable ──────▶ requeue
//!         └── best region.assign(job)
//!               ├── ok ───────────────▶ ASSIGNED
//!               ├── deferred ─────────▶ stays PENDING in the region's queue
//!               └── other failure ────▶ requeue
//! ```

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use gridshift_core::{ComputeJob, EnergySource, GridConfig, JobId, JobRequest, JobStatus, RegionReport};
use gridshift_reservation::{BoundedClient, CatalogSnapshot, ReservationClient};

use crate::coordinator::{Placement, RegionTick, RegionalCoordinator, WorkloadShift};
use crate::error::{SchedulerError, SchedulerResult};
use crate::event_log::{EventLog, LogEntry};
use crate::executor::{ExecutorPolicy, LocalExecutor};

/// Registry entry for one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job: ComputeJob,
    pub submitted_at: DateTime<Utc>,
    /// Current placement, once admitted.
    pub placement: Option<Placement>,
    /// Region holding the job in its deferred queue.
    pub deferred_in: Option<String>,
    /// Why the job failed, for failed jobs.
    pub failure: Option<String>,
}

/// Outcome of one scheduling cycle.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub assigned: Vec<Placement>,
    pub deferred: Vec<JobId>,
    pub requeued: Vec<JobId>,
    pub failed: Vec<JobId>,
    /// Set when the cycle did not run.
    pub skipped: Option<SchedulerError>,
}

impl CycleReport {
    pub fn attempted(&self) -> usize {
        self.assigned.len() + self.deferred.len() + self.requeued.len() + self.failed.len()
    }
}

/// What the hierarchy did during a refresh.
#[derive(Debug, Clone, Default)]
pub struct RefreshReport {
    pub completed: Vec<JobId>,
    pub placed: Vec<Placement>,
    pub expired: Vec<JobId>,
    pub shifted: Vec<WorkloadShift>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCounts {
    pub pending: usize,
    pub assigned: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Read-only snapshot of the whole system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemStatus {
    pub queue_length: usize,
    pub deferred_jobs: usize,
    pub jobs: JobCounts,
    pub regions: Vec<RegionReport>,
    pub recent_log: Vec<LogEntry>,
}

#[derive(Debug, Clone)]
struct CachedCatalog {
    fetched_at: DateTime<Utc>,
    snapshot: CatalogSnapshot,
}

pub struct GlobalScheduler {
    regions: Vec<RegionalCoordinator>,
    queue: Vec<JobId>,
    registry: BTreeMap<JobId, JobRecord>,
    client: Arc<dyn ReservationClient>,
    discovery_query: String,
    discovery_ttl: chrono::Duration,
    discovery: Option<CachedCatalog>,
    log: EventLog,
    status_log_tail: usize,
}

impl GlobalScheduler {
    /// An empty scheduler; `client` is used for discovery only.
    pub fn new(config: &GridConfig, client: Arc<dyn ReservationClient>) -> Self {
        Self {
            regions: Vec::new(),
            queue: Vec::new(),
            registry: BTreeMap::new(),
            client,
            discovery_query: config.reservation.discovery_query.clone(),
            discovery_ttl: config.scheduler.discovery_ttl(),
            discovery: None,
            log: EventLog::new(config.scheduler.log_capacity),
            status_log_tail: config.scheduler.status_log_tail,
        }
    }

    /// Build the whole hierarchy described by `config`.
    ///
    /// Every provider call goes through a [`BoundedClient`] with the
    /// configured timeout. With a simulation seed set, executor `i` draws
    /// from `seed + i`.
    pub fn from_config(
        config: &GridConfig,
        energy: Arc<dyn EnergySource>,
        client: Arc<dyn ReservationClient>,
    ) -> SchedulerResult<Self> {
        let client: Arc<dyn ReservationClient> =
            Arc::new(BoundedClient::new(client, config.reservation.timeout()));
        let policy = ExecutorPolicy::from_config(config);
        let mut scheduler = Self::new(config, client.clone());

        let mut index: u64 = 0;
        for region_config in &config.regions {
            let mut region = RegionalCoordinator::new(&region_config.name, &config.scheduler);
            for executor_config in &region_config.executors {
                let mut executor = LocalExecutor::new(
                    executor_config,
                    policy.clone(),
                    energy.clone(),
                    client.clone(),
                );
                if let Some(seed) = config.simulation.seed {
                    executor = executor.with_seed(seed.wrapping_add(index));
                }
                index += 1;
                region.register(executor)?;
            }
            scheduler.register_region(region)?;
        }

        info!(
            regions = scheduler.regions.len(),
            executors = index,
            "scheduling hierarchy built"
        );
        Ok(scheduler)
    }

    pub fn register_region(&mut self, region: RegionalCoordinator) -> SchedulerResult<()> {
        if self.regions.iter().any(|r| r.name() == region.name()) {
            return Err(SchedulerError::DuplicateRegion(region.name().to_string()));
        }
        self.regions.push(region);
        Ok(())
    }

    /// Queue a job and enter it in the registry.
    pub fn add_job(&mut self, mut job: ComputeJob, now: DateTime<Utc>) -> SchedulerResult<()> {
        if self.registry.contains_key(&job.job_id) {
            return Err(SchedulerError::DuplicateJob(job.job_id));
        }
        if !job.has_valid_priority() {
            return Err(SchedulerError::InvalidJob {
                reason: format!("priority {} outside 1-5", job.priority),
                job_id: job.job_id,
            });
        }
        if !job.estimated_runtime_hours.is_finite() || job.estimated_runtime_hours < 0.0 {
            return Err(SchedulerError::InvalidJob {
                reason: "estimated runtime must be a non-negative number".to_string(),
                job_id: job.job_id,
            });
        }

        job.status = JobStatus::Pending;
        self.log.push(
            now,
            format!("job {} queued (priority {})", job.job_id, job.priority),
        );
        debug!(job = %job.job_id, priority = job.priority, "job queued");

        self.queue.push(job.job_id.clone());
        self.registry.insert(
            job.job_id.clone(),
            JobRecord {
                job,
                submitted_at: now,
                placement: None,
                deferred_in: None,
                failure: None,
            },
        );
        Ok(())
    }

    /// Accept a job description and return its generated id.
    pub fn submit(&mut self, request: JobRequest, now: DateTime<Utc>) -> SchedulerResult<JobId> {
        let job_id = format!("job-{}", Uuid::new_v4());
        self.add_job(request.into_job(job_id.clone(), now), now)?;
        Ok(job_id)
    }

    /// Tick every region and fold the results into the registry.
    pub fn refresh(&mut self, now: DateTime<Utc>) -> RefreshReport {
        let ticks: Vec<RegionTick> = self.regions.iter_mut().map(|r| r.update(now)).collect();

        let mut report = RefreshReport::default();
        for tick in ticks {
            for job_id in tick.completed {
                self.set_status(&job_id, JobStatus::Completed);
                self.log.push(now, format!("job {job_id} completed"));
                report.completed.push(job_id);
            }
            for placement in tick.placed {
                self.log.push(
                    now,
                    format!(
                        "deferred job {} placed on {} ({})",
                        placement.job_id, placement.executor, placement.region
                    ),
                );
                self.record_placement(placement.clone());
                report.placed.push(placement);
            }
            for job in tick.expired {
                let error = SchedulerError::DeadlineMissed {
                    job_id: job.job_id.clone(),
                };
                self.fail(&job.job_id, &error, now);
                report.expired.push(job.job_id);
            }
            for shift in tick.shifts {
                self.log.push(
                    now,
                    format!(
                        "job {} moved from {} to {} after a price spike",
                        shift.placement.job_id, shift.from, shift.placement.executor
                    ),
                );
                if let Some(record) = self.registry.get_mut(&shift.placement.job_id) {
                    record.placement = Some(shift.placement.clone());
                }
                report.shifted.push(shift);
            }
        }
        report
    }

    /// Run one scheduling cycle over the intake queue.
    pub fn run_cycle(&mut self, now: DateTime<Utc>) -> CycleReport {
        let mut report = CycleReport::default();
        if self.queue.is_empty() {
            return report;
        }

        match self.discover(now) {
            Ok(catalog) => {
                for region in &mut self.regions {
                    region.ingest_catalog(catalog.clone());
                }
            }
            Err(e) => {
                warn!(error = %e, queued = self.queue.len(), "skipping cycle");
                self.log.push(now, format!("cycle skipped: {e}"));
                report.skipped = Some(e);
                return report;
            }
        }

        let mut pending = std::mem::take(&mut self.queue);
        pending.sort_by(|a, b| self.urgency(a, b));

        let mut requeue = Vec::new();
        for job_id in pending {
            let Some(job) = self.registry.get(&job_id).map(|r| r.job.clone()) else {
                continue;
            };

            if job.is_past_deadline(now) {
                let error = SchedulerError::DeadlineMissed {
                    job_id: job_id.clone(),
                };
                self.fail(&job_id, &error, now);
                report.failed.push(job_id);
                continue;
            }
            // Not startable yet: no region sees it, so nothing is reserved early.
            if !job.is_ready(now) {
                requeue.push(job_id);
                continue;
            }

            let Some(idx) = self.best_region() else {
                if report.skipped.is_none() {
                    warn!("no regions registered");
                }
                report.skipped = Some(SchedulerError::NoRegions);
                requeue.push(job_id);
                continue;
            };

            match self.regions[idx].assign(&job, now) {
                Ok(placement) => {
                    self.log.push(
                        now,
                        format!(
                            "job {} assigned to {} ({})",
                            job_id, placement.executor, placement.region
                        ),
                    );
                    report.assigned.push(placement.clone());
                    self.record_placement(placement);
                }
                Err(e) if e.is_deferral() => {
                    let region = self.regions[idx].name().to_string();
                    self.log.push(now, format!("job {job_id} deferred in {region}: {e}"));
                    if let Some(record) = self.registry.get_mut(&job_id) {
                        record.deferred_in = Some(region);
                    }
                    report.deferred.push(job_id);
                }
                Err(e) => {
                    debug!(job = %job_id, error = %e, "requeueing job");
                    self.log.push(now, format!("job {job_id} requeued: {e}"));
                    requeue.push(job_id.clone());
                    report.requeued.push(job_id);
                }
            }
        }

        self.queue.extend(requeue);
        info!(
            assigned = report.assigned.len(),
            deferred = report.deferred.len(),
            requeued = report.requeued.len(),
            failed = report.failed.len(),
            queued = self.queue.len(),
            "cycle complete"
        );
        report
    }

    /// Pure read of queue, regions, and recent log.
    pub fn get_status(&self) -> SystemStatus {
        let mut jobs = JobCounts::default();
        for record in self.registry.values() {
            match record.job.status {
                JobStatus::Pending => jobs.pending += 1,
                JobStatus::Assigned => jobs.assigned += 1,
                JobStatus::Running => jobs.running += 1,
                JobStatus::Completed => jobs.completed += 1,
                JobStatus::Failed => jobs.failed += 1,
            }
        }

        let regions: Vec<RegionReport> = self.regions.iter().map(|r| r.aggregate()).collect();
        SystemStatus {
            queue_length: self.queue.len(),
            deferred_jobs: regions.iter().map(|r| r.deferred_jobs).sum(),
            jobs,
            regions,
            recent_log: self.log.tail(self.status_log_tail),
        }
    }

    // ── Accessors ────────────────────────────────────────────────

    pub fn job(&self, job_id: &str) -> Option<&JobRecord> {
        self.registry.get(job_id)
    }

    pub fn jobs(&self) -> impl Iterator<Item = &JobRecord> {
        self.registry.values()
    }

    /// Queued job ids in current queue order.
    pub fn queue(&self) -> &[JobId] {
        &self.queue
    }

    pub fn regions(&self) -> &[RegionalCoordinator] {
        &self.regions
    }

    pub fn region(&self, name: &str) -> Option<&RegionalCoordinator> {
        self.regions.iter().find(|r| r.name() == name)
    }

    pub fn log(&self) -> &EventLog {
        &self.log
    }

    // ── Internal helpers ─────────────────────────────────────────

    /// Fresh catalog, from cache while it is younger than the TTL.
    fn discover(&mut self, now: DateTime<Utc>) -> SchedulerResult<CatalogSnapshot> {
        if let Some(cached) = &self.discovery {
            if now.signed_duration_since(cached.fetched_at) < self.discovery_ttl {
                return Ok(cached.snapshot.clone());
            }
        }

        match self.client.discover(&self.discovery_query) {
            Ok(snapshot) => {
                debug!(
                    providers = snapshot.providers.len(),
                    items = snapshot.item_count(),
                    "discovery refreshed"
                );
                self.discovery = Some(CachedCatalog {
                    fetched_at: now,
                    snapshot: snapshot.clone(),
                });
                Ok(snapshot)
            }
            Err(e) => Err(SchedulerError::DiscoveryUnavailable(e)),
        }
    }

    /// Higher priority first, then earlier deadline, jobs without a
    /// deadline last. Ties keep queue order.
    fn urgency(&self, a: &str, b: &str) -> Ordering {
        let (Some(a), Some(b)) = (self.registry.get(a), self.registry.get(b)) else {
            return Ordering::Equal;
        };
        b.job.priority.cmp(&a.job.priority).then_with(|| {
            match (a.job.deadline, b.job.deadline) {
                (Some(x), Some(y)) => x.cmp(&y),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            }
        })
    }

    /// Region with the lowest average score; empty regions rank last.
    fn best_region(&self) -> Option<usize> {
        (0..self.regions.len()).min_by(|&a, &b| {
            match (self.regions[a].average_score(), self.regions[b].average_score()) {
                (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            }
        })
    }

    fn record_placement(&mut self, placement: Placement) {
        if let Some(record) = self.registry.get_mut(&placement.job_id) {
            record.job.status = JobStatus::Assigned;
            record.deferred_in = None;
            record.placement = Some(placement);
        }
    }

    fn set_status(&mut self, job_id: &str, status: JobStatus) {
        if let Some(record) = self.registry.get_mut(job_id) {
            record.job.status = status;
        }
    }

    fn fail(&mut self, job_id: &str, error: &SchedulerError, now: DateTime<Utc>) {
        warn!(job = %job_id, reason = %error, "job failed");
        self.log.push(now, format!("job {job_id} failed: {error}"));
        if let Some(record) = self.registry.get_mut(job_id) {
            record.job.status = JobStatus::Failed;
            record.deferred_in = None;
            record.failure = Some(error.to_string());
        }
    }
}
