//! The reservation provider contract.

use crate::error::ReservationResult;
use crate::types::{
    Ack, CatalogSnapshot, ConfirmOutcome, InitializedOrder, JobMetadata, Quote, RemoteOrderState,
    UpdateAction,
};

/// Client for an external reservation provider.
///
/// Implementations must bound every call in time and must never panic:
/// transport problems come back as `Err` (or `RemoteOrderState::Unknown`
/// for `status`) so a scheduling cycle can always carry on.
pub trait ReservationClient: Send + Sync {
    /// Query the provider network for offered slots.
    fn discover(&self, query: &str) -> ReservationResult<CatalogSnapshot>;

    /// Request a quote for a slot.
    fn select(&self, slot_id: &str, buyer_id: &str) -> ReservationResult<Quote>;

    /// Turn a quote into an order carrying the job's details.
    fn init(&self, quote: &Quote, job: &JobMetadata) -> ReservationResult<InitializedOrder>;

    /// Ask the provider to commit the order.
    fn confirm(&self, order: &InitializedOrder) -> ReservationResult<ConfirmOutcome>;

    /// Current provider-side state of an order.
    fn status(&self, order_id: &str) -> RemoteOrderState;

    /// Signal a change against an existing order.
    fn update(&self, order_id: &str, action: &UpdateAction) -> ReservationResult<Ack>;
}
