//! Reservation error types.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The protocol call an error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStep {
    Discover,
    Select,
    Init,
    Confirm,
    Status,
    Update,
}

impl std::fmt::Display for LifecycleStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LifecycleStep::Discover => "discover",
            LifecycleStep::Select => "select",
            LifecycleStep::Init => "init",
            LifecycleStep::Confirm => "confirm",
            LifecycleStep::Status => "status",
            LifecycleStep::Update => "update",
        };
        f.write_str(name)
    }
}

/// Errors returned by reservation providers and the local state machine.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ReservationError {
    #[error("provider unavailable during {step}: {reason}")]
    Unavailable { step: LifecycleStep, reason: String },

    #[error("provider rejected {step}: {reason}")]
    Rejected { step: LifecycleStep, reason: String },

    #[error("{step} exceeded its {budget_ms}ms budget (took {elapsed_ms}ms)")]
    Timeout {
        step: LifecycleStep,
        budget_ms: u64,
        elapsed_ms: u64,
    },

    #[error("order not found: {0}")]
    OrderNotFound(String),

    #[error("provider cancelled order {0}")]
    Cancelled(String),

    #[error("illegal reservation transition {from} -> {to}")]
    InvalidTransition { from: String, to: String },
}

impl ReservationError {
    /// The protocol step this error belongs to, when known.
    pub fn step(&self) -> Option<LifecycleStep> {
        match self {
            ReservationError::Unavailable { step, .. }
            | ReservationError::Rejected { step, .. }
            | ReservationError::Timeout { step, .. } => Some(*step),
            ReservationError::Cancelled(_) => Some(LifecycleStep::Confirm),
            ReservationError::OrderNotFound(_) | ReservationError::InvalidTransition { .. } => {
                None
            }
        }
    }
}

pub type ReservationResult<T> = Result<T, ReservationError>;
