//! Per-call time budget for reservation clients.
//!
//! Each call runs on its own worker thread and the caller waits at most
//! `budget` for the reply. Work the provider finishes after the deadline
//! is reconciled by [`crate::Reservation::negotiate`].

use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::warn;

use crate::client::ReservationClient;
use crate::error::{LifecycleStep, ReservationError, ReservationResult};
use crate::types::{
    Ack, CatalogSnapshot, ConfirmOutcome, InitializedOrder, JobMetadata, Quote, RemoteOrderState,
    UpdateAction,
};

/// Wraps a client so that no call blocks for longer than `budget`.
/// A late reply becomes `Timeout`; a late `status` reads as `Unknown`.
pub struct BoundedClient {
    inner: Arc<dyn ReservationClient>,
    budget: Duration,
}

impl BoundedClient {
    pub fn new(inner: Arc<dyn ReservationClient>, budget: Duration) -> Self {
        Self { inner, budget }
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    fn timed<T, F>(&self, step: LifecycleStep, call: F) -> ReservationResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn ReservationClient) -> ReservationResult<T> + Send + 'static,
    {
        let started = Instant::now();
        let inner = Arc::clone(&self.inner);
        let (tx, rx) = mpsc::channel();

        thread::Builder::new()
            .name(format!("reservation-{step}"))
            .spawn(move || {
                // The receiver is gone once the caller has timed out.
                let _ = tx.send(call(inner.as_ref()));
            })
            .map_err(|e| ReservationError::Unavailable {
                step,
                reason: format!("spawning worker: {e}"),
            })?;

        match rx.recv_timeout(self.budget) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                let budget_ms = self.budget.as_millis() as u64;
                let elapsed_ms = started.elapsed().as_millis() as u64;
                warn!(%step, budget_ms, elapsed_ms, "reservation call over budget");
                Err(ReservationError::Timeout {
                    step,
                    budget_ms,
                    elapsed_ms,
                })
            }
            Err(RecvTimeoutError::Disconnected) => Err(ReservationError::Unavailable {
                step,
                reason: "provider call aborted".to_string(),
            }),
        }
    }
}

impl ReservationClient for BoundedClient {
    fn discover(&self, query: &str) -> ReservationResult<CatalogSnapshot> {
        let query = query.to_string();
        self.timed(LifecycleStep::Discover, move |c| c.discover(&query))
    }

    fn select(&self, slot_id: &str, buyer_id: &str) -> ReservationResult<Quote> {
        let (slot_id, buyer_id) = (slot_id.to_string(), buyer_id.to_string());
        self.timed(LifecycleStep::Select, move |c| c.select(&slot_id, &buyer_id))
    }

    fn init(&self, quote: &Quote, job: &JobMetadata) -> ReservationResult<InitializedOrder> {
        let (quote, job) = (quote.clone(), job.clone());
        self.timed(LifecycleStep::Init, move |c| c.init(&quote, &job))
    }

    fn confirm(&self, order: &InitializedOrder) -> ReservationResult<ConfirmOutcome> {
        let order = order.clone();
        self.timed(LifecycleStep::Confirm, move |c| c.confirm(&order))
    }

    fn status(&self, order_id: &str) -> RemoteOrderState {
        let order_id = order_id.to_string();
        self.timed(LifecycleStep::Status, move |c| Ok(c.status(&order_id)))
            .unwrap_or(RemoteOrderState::Unknown)
    }

    fn update(&self, order_id: &str, action: &UpdateAction) -> ReservationResult<Ack> {
        let (order_id, action) = (order_id.to_string(), action.clone());
        self.timed(LifecycleStep::Update, move |c| c.update(&order_id, &action))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulated::SimulatedReservationClient;
    use std::thread;

    /// Delegates to a simulated provider after sleeping.
    struct SlowClient {
        delay: Duration,
        inner: SimulatedReservationClient,
    }

    impl ReservationClient for SlowClient {
        fn discover(&self, query: &str) -> ReservationResult<CatalogSnapshot> {
            thread::sleep(self.delay);
            self.inner.discover(query)
        }
        fn select(&self, slot_id: &str, buyer_id: &str) -> ReservationResult<Quote> {
            thread::sleep(self.delay);
            self.inner.select(slot_id, buyer_id)
        }
        fn init(&self, quote: &Quote, job: &JobMetadata) -> ReservationResult<InitializedOrder> {
            self.inner.init(quote, job)
        }
        fn confirm(&self, order: &InitializedOrder) -> ReservationResult<ConfirmOutcome> {
            self.inner.confirm(order)
        }
        fn status(&self, order_id: &str) -> RemoteOrderState {
            thread::sleep(self.delay);
            self.inner.status(order_id)
        }
        fn update(&self, order_id: &str, action: &UpdateAction) -> ReservationResult<Ack> {
            self.inner.update(order_id, action)
        }
    }

    fn slow(delay_ms: u64) -> Arc<dyn ReservationClient> {
        Arc::new(SlowClient {
            delay: Duration::from_millis(delay_ms),
            inner: SimulatedReservationClient::new("p"),
        })
    }

    #[test]
    fn fast_calls_pass_through() {
        let client = BoundedClient::new(slow(0), Duration::from_secs(5));
        let catalog = client.discover("q").unwrap();
        assert_eq!(catalog.item_count(), 1);
    }

    #[test]
    fn slow_call_becomes_timeout() {
        let client = BoundedClient::new(slow(50), Duration::from_millis(5));
        let err = client.select("slot-1", "buyer").unwrap_err();
        match err {
            ReservationError::Timeout {
                step, budget_ms, ..
            } => {
                assert_eq!(step, LifecycleStep::Select);
                assert_eq!(budget_ms, 5);
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[test]
    fn hung_call_returns_at_budget() {
        let client = BoundedClient::new(slow(2_000), Duration::from_millis(20));
        let started = Instant::now();
        let err = client.discover("q").unwrap_err();
        assert!(matches!(err, ReservationError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn slow_status_reads_unknown() {
        let client = BoundedClient::new(slow(50), Duration::from_millis(5));
        assert_eq!(client.status("order-1"), RemoteOrderState::Unknown);
    }

    #[test]
    fn inner_errors_survive() {
        let inner = SimulatedReservationClient::new("p");
        inner.fail_at(LifecycleStep::Discover);
        let client = BoundedClient::new(Arc::new(inner), Duration::from_secs(5));
        assert!(matches!(
            client.discover("q"),
            Err(ReservationError::Unavailable { .. })
        ));
    }
}
