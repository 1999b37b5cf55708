//! Local reservation records and the negotiation that creates them.
//!
//! A [`Reservation`] only ever leaves [`Reservation::negotiate`] in one of
//! two shapes: `Confirmed` (the caller may admit the job) or `Cancelled`
//! (inside a [`LifecycleFailure`], for logging). Intermediate states never
//! escape locally, and once the provider has an order a failed attempt is
//! reconciled against it: a provider-side confirmation is adopted, anything
//! else is released.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use gridshift_core::JobId;

use crate::client::ReservationClient;
use crate::error::{ReservationError, ReservationResult};
use crate::types::{ConfirmOutcome, JobMetadata, RemoteOrderState, UpdateAction};

/// Local lifecycle state of a reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationState {
    QuoteRequested,
    Initialized,
    Confirmed,
    Cancelled,
    Completed,
}

impl ReservationState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ReservationState::Cancelled | ReservationState::Completed)
    }

    fn can_transition_to(self, next: ReservationState) -> bool {
        use ReservationState::*;
        matches!(
            (self, next),
            (QuoteRequested, Initialized)
                | (Initialized, Confirmed)
                | (Confirmed, Completed)
                | (QuoteRequested | Initialized | Confirmed, Cancelled)
        )
    }
}

impl std::fmt::Display for ReservationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ReservationState::QuoteRequested => "QUOTE_REQUESTED",
            ReservationState::Initialized => "INITIALIZED",
            ReservationState::Confirmed => "CONFIRMED",
            ReservationState::Cancelled => "CANCELLED",
            ReservationState::Completed => "COMPLETED",
        };
        f.write_str(name)
    }
}

/// A booking of one slot for one job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Reservation {
    pub id: String,
    pub job_id: JobId,
    pub slot_id: String,
    /// Provider order id, known once `init` succeeds.
    pub order_id: Option<String>,
    pub state: ReservationState,
    pub created_at: DateTime<Utc>,
}

/// A negotiation that ended without a confirmed booking.
#[derive(Debug, Clone)]
pub struct LifecycleFailure {
    /// The discarded attempt, always `Cancelled`.
    pub reservation: Reservation,
    pub error: ReservationError,
}

impl Reservation {
    pub fn new(job_id: impl Into<JobId>, slot_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: format!("rsv-{}", Uuid::new_v4()),
            job_id: job_id.into(),
            slot_id: slot_id.into(),
            order_id: None,
            state: ReservationState::QuoteRequested,
            created_at: now,
        }
    }

    /// Confirmed reservations hold capacity.
    pub fn is_active(&self) -> bool {
        self.state == ReservationState::Confirmed
    }

    pub fn transition(&mut self, next: ReservationState) -> ReservationResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(ReservationError::InvalidTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        debug!(
            reservation = %self.id,
            job = %self.job_id,
            from = %self.state,
            to = %next,
            "reservation transition"
        );
        self.state = next;
        Ok(())
    }

    /// Mark a confirmed booking's job as finished.
    pub fn complete(&mut self) -> ReservationResult<()> {
        self.transition(ReservationState::Completed)
    }

    /// Cancel from any non-terminal state. Cancelling a terminal reservation is a no-op.
    pub fn cancel(&mut self) {
        if !self.state.is_terminal() {
            self.state = ReservationState::Cancelled;
        }
    }

    /// Run select → init → confirm against a provider.
    ///
    /// Returns a `Confirmed` reservation, or a failure carrying the
    /// cancelled attempt and the error of the step that broke.
    pub fn negotiate(
        client: &dyn ReservationClient,
        slot_id: &str,
        buyer_id: &str,
        job: &JobMetadata,
        now: DateTime<Utc>,
    ) -> Result<Reservation, LifecycleFailure> {
        let mut reservation = Reservation::new(job.job_id.clone(), slot_id, now);

        match reservation.drive(client, buyer_id, job) {
            Ok(()) => Ok(reservation),
            Err(error) => {
                if reservation.reconcile(client, &error) {
                    return Ok(reservation);
                }
                reservation.cancel();
                warn!(
                    job = %job.job_id,
                    slot = %slot_id,
                    step = ?error.step(),
                    error = %error,
                    "reservation attempt discarded"
                );
                Err(LifecycleFailure { reservation, error })
            }
        }
    }

    fn drive(
        &mut self,
        client: &dyn ReservationClient,
        buyer_id: &str,
        job: &JobMetadata,
    ) -> ReservationResult<()> {
        let quote = client.select(&self.slot_id, buyer_id)?;

        let order = client.init(&quote, job)?;
        self.order_id = Some(order.order_id.clone());
        self.transition(ReservationState::Initialized)?;

        match client.confirm(&order)? {
            ConfirmOutcome::Confirmed { order_id } => {
                self.order_id = Some(order_id);
                self.transition(ReservationState::Confirmed)
            }
            ConfirmOutcome::Cancelled { order_id } => Err(ReservationError::Cancelled(order_id)),
        }
    }

    /// Settle the provider order behind a failed attempt. Returns `true`
    /// when the provider holds it as active and the reservation adopted it.
    fn reconcile(&mut self, client: &dyn ReservationClient, error: &ReservationError) -> bool {
        let Some(order_id) = self.order_id.clone() else {
            return false;
        };

        let remote = client.status(&order_id);
        if remote.is_active() && self.state == ReservationState::Initialized {
            info!(
                reservation = %self.id,
                job = %self.job_id,
                order = %order_id,
                ?remote,
                error = %error,
                "provider holds order after failed step, adopting"
            );
            return self.transition(ReservationState::Confirmed).is_ok();
        }
        if matches!(remote, RemoteOrderState::Cancelled | RemoteOrderState::Completed) {
            return false;
        }

        let release = UpdateAction::Release {
            reason: format!("reservation {} abandoned: {error}", self.id),
        };
        match client.update(&order_id, &release) {
            Ok(_) => debug!(reservation = %self.id, order = %order_id, "provider order released"),
            Err(e) => warn!(
                reservation = %self.id,
                order = %order_id,
                error = %e,
                "could not release provider order"
            ),
        }
        false
    }
}
