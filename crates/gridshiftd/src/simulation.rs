//! Simulated clock driving the scheduler.
//!
//! Each tick advances simulated time by a fixed step, refreshes the whole
//! hierarchy, feeds in random jobs, and runs one scheduling cycle. Ticks
//! never overlap: the loop awaits each tick before sleeping again.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use gridshift_core::JobRequest;
use gridshift_core::config::SimulationSettings;
use gridshift_scheduler::{CycleReport, GlobalScheduler, RefreshReport};

/// What one tick did.
#[derive(Debug)]
pub struct TickSummary {
    pub now: DateTime<Utc>,
    pub submitted: usize,
    pub refresh: RefreshReport,
    pub cycle: CycleReport,
}

pub struct Simulation {
    scheduler: GlobalScheduler,
    clock: DateTime<Utc>,
    step: chrono::Duration,
    settings: SimulationSettings,
    rng: StdRng,
    ticks: u64,
}

impl Simulation {
    pub fn new(scheduler: GlobalScheduler, settings: &SimulationSettings, start: DateTime<Utc>) -> Self {
        let rng = match settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            scheduler,
            clock: start,
            step: chrono::Duration::minutes(i64::from(settings.tick_minutes)),
            settings: settings.clone(),
            rng,
            ticks: 0,
        }
    }

    /// Advance one step of simulated time.
    pub fn tick(&mut self) -> TickSummary {
        let now = self.clock;
        let refresh = self.scheduler.refresh(now);
        let submitted = self.generate_jobs(now);
        let cycle = self.scheduler.run_cycle(now);

        self.clock = now.checked_add_signed(self.step).unwrap_or(now);
        self.ticks += 1;

        TickSummary {
            now,
            submitted,
            refresh,
            cycle,
        }
    }

    /// Tick every `interval` until shutdown or `max_ticks`.
    pub async fn run(
        &mut self,
        interval: Duration,
        max_ticks: Option<u64>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(
            interval_ms = interval.as_millis() as u64,
            step_minutes = self.step.num_minutes(),
            "simulation started"
        );

        loop {
            if max_ticks.is_some_and(|max| self.ticks >= max) {
                info!(ticks = self.ticks, "tick limit reached");
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    let summary = self.tick();
                    self.log_tick(&summary);
                }
                _ = shutdown.changed() => {
                    info!("simulation shutting down");
                    break;
                }
            }
        }
    }

    pub fn scheduler(&self) -> &GlobalScheduler {
        &self.scheduler
    }

    pub fn clock(&self) -> DateTime<Utc> {
        self.clock
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    // ── Internal helpers ─────────────────────────────────────────

    fn generate_jobs(&mut self, now: DateTime<Utc>) -> usize {
        let max = self.settings.max_jobs_per_tick;
        if max == 0 || self.rng.random::<f64>() >= self.settings.job_arrival_probability {
            return 0;
        }

        let count = self.rng.random_range(1..=max);
        let mut submitted = 0;
        for _ in 0..count {
            let deadline = self
                .rng
                .random_bool(0.5)
                .then(|| now + chrono::Duration::hours(self.rng.random_range(4..=48)));
            let request = JobRequest {
                computation_size: self.rng.random_range(10.0..1000.0),
                estimated_runtime_hours: f64::from(self.rng.random_range(1..=24_u32)),
                priority: self.rng.random_range(1..=5),
                earliest_start: None,
                deadline,
                preferred_executor: None,
            };
            match self.scheduler.submit(request, now) {
                Ok(job_id) => {
                    debug!(job = %job_id, "job generated");
                    submitted += 1;
                }
                Err(e) => warn!(error = %e, "generated job rejected"),
            }
        }
        submitted
    }

    fn log_tick(&self, summary: &TickSummary) {
        let status = self.scheduler.get_status();
        info!(
            tick = self.ticks,
            time = %summary.now,
            submitted = summary.submitted,
            assigned = summary.cycle.assigned.len() + summary.refresh.placed.len(),
            completed = summary.refresh.completed.len(),
            shifted = summary.refresh.shifted.len(),
            failed = summary.cycle.failed.len() + summary.refresh.expired.len(),
            queued = status.queue_length,
            deferred = status.deferred_jobs,
            "tick"
        );
        if let Some(reason) = &summary.cycle.skipped {
            warn!(reason = %reason, "cycle skipped");
        }
    }
}
