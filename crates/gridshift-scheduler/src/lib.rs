//! gridshift-scheduler — the three-tier scheduling hierarchy.
//!
//! Places compute jobs on the cheapest, cleanest slots available:
//!
//! - **`executor`** — `LocalExecutor`, one slot's capacity, grid inputs,
//!   and cost score; admits jobs only through a confirmed reservation
//! - **`coordinator`** — `RegionalCoordinator`, ranked fallback with a cost
//!   ceiling, the deferred queue, and price-spike reassignment
//! - **`global`** — `GlobalScheduler`, the intake queue, job registry,
//!   discovery cache, and region selection
//! - **`advisory`** — optional non-binding placement hints
//! - **`event_log`** — bounded scheduler event log
//!
//! # Architecture
//!
//! ```text
//! GlobalScheduler
//!   ├── intake queue + job registry
//!   ├── discovery cache ──▶ ReservationClient::discover
//!   ├── EventLog (ring buffer)
//!   └── RegionalCoordinator (one per region)
//!         ├── deferred queue
//!         ├── Suggester (optional)
//!         └── LocalExecutor (one per slot)
//!               ├── EnergySource ──▶ price, carbon, renewables
//!               └── ReservationClient ──▶ select → init → confirm
//! ```
//!
//! Control flows down the tree; reports flow back up as typed structs.
//! The hierarchy is driven by an external clock: `refresh(now)` ticks every
//! region, `run_cycle(now)` drains the intake queue. Callers must not run
//! two cycles at once.

pub mod advisory;
pub mod coordinator;
pub mod error;
pub mod event_log;
pub mod executor;
pub mod global;

pub use advisory::{AdvisoryRequest, NoAdvice, Suggester, Suggestion};
pub use coordinator::{Placement, RegionTick, RegionalCoordinator, RetryOutcome, WorkloadShift};
pub use error::{SchedulerError, SchedulerResult};
pub use event_log::{EventLog, LogEntry};
pub use executor::{Admission, ExecutorPolicy, LocalExecutor};
pub use global::{CycleReport, GlobalScheduler, JobCounts, JobRecord, RefreshReport, SystemStatus};
