//! Scheduler error types.

use gridshift_core::JobId;
use gridshift_reservation::ReservationError;
use thiserror::Error;

/// Errors that can occur while placing or tracking jobs.
#[derive(Debug, Clone, Error)]
pub enum SchedulerError {
    #[error("no executor with free capacity in {scope}")]
    CapacityExhausted { scope: String },

    #[error("best score {best_score:.1} in {region} exceeds the {threshold:.1} ceiling")]
    CostThresholdExceeded {
        region: String,
        best_score: f64,
        threshold: f64,
    },

    #[error("reservation on {executor} failed: {source}")]
    ReservationFailed {
        executor: String,
        #[source]
        source: ReservationError,
    },

    #[error("all {attempted} eligible candidates in {region} failed to admit the job")]
    CandidatesExhausted { region: String, attempted: usize },

    #[error("job {job_id} missed its deadline")]
    DeadlineMissed { job_id: JobId },

    #[error("discovery unavailable: {0}")]
    DiscoveryUnavailable(#[source] ReservationError),

    #[error("job already exists: {0}")]
    DuplicateJob(JobId),

    #[error("invalid job {job_id}: {reason}")]
    InvalidJob { job_id: JobId, reason: String },

    #[error("executor already registered: {0}")]
    DuplicateExecutor(String),

    #[error("region already registered: {0}")]
    DuplicateRegion(String),

    #[error("no regions registered")]
    NoRegions,
}

impl SchedulerError {
    /// True for failures after which the region keeps the job in its
    /// deferred queue instead of handing it back.
    pub fn is_deferral(&self) -> bool {
        matches!(
            self,
            SchedulerError::CostThresholdExceeded { .. } | SchedulerError::CandidatesExhausted { .. }
        )
    }
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deferral_classification() {
        let over = SchedulerError::CostThresholdExceeded {
            region: "London".to_string(),
            best_score: 81.2,
            threshold: 70.0,
        };
        assert!(over.is_deferral());
        assert_eq!(
            over.to_string(),
            "best score 81.2 in London exceeds the 70.0 ceiling"
        );

        let exhausted = SchedulerError::CandidatesExhausted {
            region: "North".to_string(),
            attempted: 3,
        };
        assert!(exhausted.is_deferral());

        let full = SchedulerError::CapacityExhausted {
            scope: "Scotland".to_string(),
        };
        assert!(!full.is_deferral());
        assert!(!SchedulerError::NoRegions.is_deferral());
    }
}
