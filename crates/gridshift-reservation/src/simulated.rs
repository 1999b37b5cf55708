//! In-process reservation provider.
//!
//! Stands in for a remote provider network when running the simulation
//! and in tests. Every call succeeds by default; individual steps can be
//! made to fail, confirmations can be turned into provider cancellations,
//! and discovery can be taken offline.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::client::ReservationClient;
use crate::error::{LifecycleStep, ReservationError, ReservationResult};
use crate::types::{
    Ack, CatalogItem, CatalogProvider, CatalogSnapshot, ConfirmOutcome, InitializedOrder,
    JobMetadata, Quote, RemoteOrderState, UpdateAction,
};

/// An update the provider has accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateRecord {
    pub order_id: String,
    pub action: UpdateAction,
}

#[derive(Debug, Default)]
struct ProviderState {
    catalog: CatalogSnapshot,
    orders: HashMap<String, RemoteOrderState>,
    failing_step: Option<LifecycleStep>,
    cancel_on_confirm: bool,
    discovery_down: bool,
    updates: Vec<UpdateRecord>,
    calls: HashMap<LifecycleStep, usize>,
}

/// A provider that lives entirely in memory.
#[derive(Debug)]
pub struct SimulatedReservationClient {
    provider_id: String,
    state: Mutex<ProviderState>,
}

impl SimulatedReservationClient {
    /// Create a provider offering a single default flexibility slot.
    pub fn new(provider_id: impl Into<String>) -> Self {
        let provider_id = provider_id.into();
        let catalog = CatalogSnapshot {
            providers: vec![CatalogProvider {
                id: provider_id.clone(),
                name: "GridFlex".to_string(),
                items: vec![CatalogItem {
                    id: "item-ce-cambridge-morning-001".to_string(),
                    name: "Cambridge morning flexibility window".to_string(),
                    currency: "GBP".to_string(),
                    price: 0.10,
                    carbon_intensity: 150.0,
                    renewable_mix: 45.0,
                }],
            }],
        };

        Self {
            provider_id,
            state: Mutex::new(ProviderState {
                catalog,
                ..ProviderState::default()
            }),
        }
    }

    /// Replace the advertised catalog.
    pub fn with_catalog(self, catalog: CatalogSnapshot) -> Self {
        self.lock().catalog = catalog;
        self
    }

    pub fn provider_id(&self) -> &str {
        &self.provider_id
    }

    /// Make every subsequent call of `step` fail as unavailable.
    pub fn fail_at(&self, step: LifecycleStep) {
        self.lock().failing_step = Some(step);
    }

    pub fn clear_failures(&self) {
        self.lock().failing_step = None;
    }

    /// Answer `confirm` with a provider-side cancellation.
    pub fn cancel_on_confirm(&self, cancel: bool) {
        self.lock().cancel_on_confirm = cancel;
    }

    pub fn set_discovery_available(&self, available: bool) {
        self.lock().discovery_down = !available;
    }

    /// Force the state the provider reports for an order.
    pub fn set_order_state(&self, order_id: &str, state: RemoteOrderState) {
        self.lock().orders.insert(order_id.to_string(), state);
    }

    /// Provider-side state of an order, if the order exists.
    pub fn order_state(&self, order_id: &str) -> Option<RemoteOrderState> {
        self.lock().orders.get(order_id).copied()
    }

    /// All updates accepted so far, oldest first.
    pub fn updates(&self) -> Vec<UpdateRecord> {
        self.lock().updates.clone()
    }

    /// How many times `step` has been called, including failed calls.
    pub fn call_count(&self, step: LifecycleStep) -> usize {
        self.lock().calls.get(&step).copied().unwrap_or(0)
    }

    // ── Internal helpers ─────────────────────────────────────────

    fn lock(&self) -> MutexGuard<'_, ProviderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Count the call and apply any injected failure.
    fn enter(&self, step: LifecycleStep) -> ReservationResult<MutexGuard<'_, ProviderState>> {
        let mut state = self.lock();
        *state.calls.entry(step).or_insert(0) += 1;

        let down = state.failing_step == Some(step)
            || (step == LifecycleStep::Discover && state.discovery_down);
        if down {
            debug!(provider = %self.provider_id, %step, "injected provider failure");
            return Err(ReservationError::Unavailable {
                step,
                reason: format!("{} is not responding", self.provider_id),
            });
        }
        Ok(state)
    }
}

impl ReservationClient for SimulatedReservationClient {
    fn discover(&self, _query: &str) -> ReservationResult<CatalogSnapshot> {
        let state = self.enter(LifecycleStep::Discover)?;
        Ok(state.catalog.clone())
    }

    fn select(&self, slot_id: &str, buyer_id: &str) -> ReservationResult<Quote> {
        let _state = self.enter(LifecycleStep::Select)?;
        Ok(Quote {
            quote_id: format!("quote-{}", Uuid::new_v4()),
            slot_id: slot_id.to_string(),
            provider_id: self.provider_id.clone(),
            buyer_id: buyer_id.to_string(),
        })
    }

    fn init(&self, quote: &Quote, job: &JobMetadata) -> ReservationResult<InitializedOrder> {
        let mut state = self.enter(LifecycleStep::Init)?;
        let order_id = format!("order-{}", Uuid::new_v4());
        state.orders.insert(order_id.clone(), RemoteOrderState::Created);

        Ok(InitializedOrder {
            order_id,
            quote: quote.clone(),
            job: job.clone(),
        })
    }

    fn confirm(&self, order: &InitializedOrder) -> ReservationResult<ConfirmOutcome> {
        let mut state = self.enter(LifecycleStep::Confirm)?;
        let cancel = state.cancel_on_confirm;

        let Some(current) = state.orders.get_mut(&order.order_id) else {
            return Err(ReservationError::OrderNotFound(order.order_id.clone()));
        };

        let order_id = order.order_id.clone();
        if *current == RemoteOrderState::Cancelled {
            debug!(provider = %self.provider_id, order = %order_id, "confirm for released order");
            return Ok(ConfirmOutcome::Cancelled { order_id });
        }
        if cancel {
            *current = RemoteOrderState::Cancelled;
            Ok(ConfirmOutcome::Cancelled { order_id })
        } else {
            *current = RemoteOrderState::Confirmed;
            Ok(ConfirmOutcome::Confirmed { order_id })
        }
    }

    fn status(&self, order_id: &str) -> RemoteOrderState {
        match self.enter(LifecycleStep::Status) {
            Ok(state) => state
                .orders
                .get(order_id)
                .copied()
                .unwrap_or(RemoteOrderState::Unknown),
            Err(_) => RemoteOrderState::Unknown,
        }
    }

    fn update(&self, order_id: &str, action: &UpdateAction) -> ReservationResult<Ack> {
        let mut state = self.enter(LifecycleStep::Update)?;

        let Some(current) = state.orders.get_mut(order_id) else {
            return Err(ReservationError::OrderNotFound(order_id.to_string()));
        };
        let releasable = current.is_active() || *current == RemoteOrderState::Created;
        match action {
            UpdateAction::Release { .. } if releasable => *current = RemoteOrderState::Cancelled,
            UpdateAction::FlexibilityResponse { .. } if current.is_active() => {
                *current = RemoteOrderState::InProgress;
            }
            _ => {
                return Err(ReservationError::Rejected {
                    step: LifecycleStep::Update,
                    reason: format!("order {order_id} is {current:?}"),
                });
            }
        }

        state.updates.push(UpdateRecord {
            order_id: order_id.to_string(),
            action: action.clone(),
        });
        Ok(Ack {
            order_id: order_id.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> JobMetadata {
        JobMetadata {
            job_id: "job-1".to_string(),
            priority: 2,
            computation_size: 50.0,
            estimated_runtime_hours: 1.0,
            deadline: None,
        }
    }

    fn confirmed_order(client: &SimulatedReservationClient) -> String {
        let quote = client.select("slot-1", "buyer").unwrap();
        let order = client.init(&quote, &metadata()).unwrap();
        client.confirm(&order).unwrap();
        order.order_id
    }

    #[test]
    fn default_catalog_has_one_slot() {
        let client = SimulatedReservationClient::new("provider-gridflex-001");
        let catalog = client.discover("Grid flexibility windows").unwrap();
        assert_eq!(catalog.providers.len(), 1);
        assert_eq!(catalog.item_count(), 1);
        assert_eq!(catalog.providers[0].id, "provider-gridflex-001");
    }

    #[test]
    fn full_lifecycle() {
        let client = SimulatedReservationClient::new("p");
        let quote = client.select("slot-1", "buyer").unwrap();
        assert_eq!(quote.slot_id, "slot-1");
        assert_eq!(quote.provider_id, "p");

        let order = client.init(&quote, &metadata()).unwrap();
        assert_eq!(client.status(&order.order_id), RemoteOrderState::Created);

        let outcome = client.confirm(&order).unwrap();
        assert_eq!(
            outcome,
            ConfirmOutcome::Confirmed {
                order_id: order.order_id.clone()
            }
        );
        assert_eq!(client.status(&order.order_id), RemoteOrderState::Confirmed);
    }

    #[test]
    fn confirm_unknown_order() {
        let client = SimulatedReservationClient::new("p");
        let quote = client.select("slot-1", "buyer").unwrap();
        let mut order = client.init(&quote, &metadata()).unwrap();
        order.order_id = "order-missing".to_string();

        let err = client.confirm(&order).unwrap_err();
        assert_eq!(err, ReservationError::OrderNotFound("order-missing".to_string()));
    }

    #[test]
    fn injected_failures_are_counted() {
        let client = SimulatedReservationClient::new("p");
        client.fail_at(LifecycleStep::Select);

        assert!(client.select("slot-1", "buyer").is_err());
        assert!(client.select("slot-1", "buyer").is_err());
        assert_eq!(client.call_count(LifecycleStep::Select), 2);

        client.clear_failures();
        assert!(client.select("slot-1", "buyer").is_ok());
        assert_eq!(client.call_count(LifecycleStep::Select), 3);
    }

    #[test]
    fn discovery_can_go_offline() {
        let client = SimulatedReservationClient::new("p");
        client.set_discovery_available(false);
        let err = client.discover("q").unwrap_err();
        assert_eq!(err.step(), Some(LifecycleStep::Discover));

        client.set_discovery_available(true);
        assert!(client.discover("q").is_ok());
    }

    #[test]
    fn status_of_unknown_order_is_unknown() {
        let client = SimulatedReservationClient::new("p");
        assert_eq!(client.status("nope"), RemoteOrderState::Unknown);

        let order_id = confirmed_order(&client);
        client.fail_at(LifecycleStep::Status);
        assert_eq!(client.status(&order_id), RemoteOrderState::Unknown);
    }

    #[test]
    fn update_records_and_moves_to_in_progress() {
        let client = SimulatedReservationClient::new("p");
        let order_id = confirmed_order(&client);
        let action = UpdateAction::FlexibilityResponse {
            target: "Leeds Node".to_string(),
            reason: "price spike".to_string(),
        };

        let ack = client.update(&order_id, &action).unwrap();
        assert_eq!(ack.order_id, order_id);
        assert_eq!(client.order_state(&order_id), Some(RemoteOrderState::InProgress));

        let updates = client.updates();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].action, action);
    }

    #[test]
    fn update_rejected_for_inactive_order() {
        let client = SimulatedReservationClient::new("p");
        let order_id = confirmed_order(&client);
        client.set_order_state(&order_id, RemoteOrderState::Completed);

        let action = UpdateAction::FlexibilityResponse {
            target: "x".to_string(),
            reason: "y".to_string(),
        };
        let err = client.update(&order_id, &action).unwrap_err();
        assert!(matches!(err, ReservationError::Rejected { .. }));
        assert!(client.updates().is_empty());
    }

    #[test]
    fn released_order_is_never_confirmed() {
        let client = SimulatedReservationClient::new("p");
        let quote = client.select("slot-1", "buyer").unwrap();
        let order = client.init(&quote, &metadata()).unwrap();

        let release = UpdateAction::Release {
            reason: "confirm timed out".to_string(),
        };
        client.update(&order.order_id, &release).unwrap();
        assert_eq!(client.order_state(&order.order_id), Some(RemoteOrderState::Cancelled));

        let outcome = client.confirm(&order).unwrap();
        assert!(matches!(outcome, ConfirmOutcome::Cancelled { .. }));
        assert_eq!(client.order_state(&order.order_id), Some(RemoteOrderState::Cancelled));

        // A second release finds nothing left to give up.
        assert!(client.update(&order.order_id, &release).is_err());
    }
}
