//! Protocol payloads exchanged with reservation providers.
//!
//! These are the semantic shapes only; the JSON-LD wire mapping belongs to
//! whichever transport implements [`crate::ReservationClient`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gridshift_core::{ComputeJob, JobId};

// ── Discovery ────────────────────────────────────────────────────

/// A slot offered by a provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CatalogItem {
    pub id: String,
    pub name: String,
    pub currency: String,
    pub price: f64,
    pub carbon_intensity: f64,
    pub renewable_mix: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CatalogProvider {
    pub id: String,
    pub name: String,
    pub items: Vec<CatalogItem>,
}

/// Result of a discovery query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct CatalogSnapshot {
    pub providers: Vec<CatalogProvider>,
}

impl CatalogSnapshot {
    pub fn item_count(&self) -> usize {
        self.providers.iter().map(|p| p.items.len()).sum()
    }
}

// ── Ordering ─────────────────────────────────────────────────────

/// A provider's answer to `select`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Quote {
    pub quote_id: String,
    pub slot_id: String,
    pub provider_id: String,
    pub buyer_id: String,
}

/// Job details sent to the provider on `init`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobMetadata {
    pub job_id: JobId,
    pub priority: u8,
    pub computation_size: f64,
    pub estimated_runtime_hours: f64,
    pub deadline: Option<DateTime<Utc>>,
}

impl From<&ComputeJob> for JobMetadata {
    fn from(job: &ComputeJob) -> Self {
        Self {
            job_id: job.job_id.clone(),
            priority: job.priority,
            computation_size: job.computation_size,
            estimated_runtime_hours: job.estimated_runtime_hours,
            deadline: job.deadline,
        }
    }
}

/// A provider's answer to `init`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InitializedOrder {
    pub order_id: String,
    pub quote: Quote,
    pub job: JobMetadata,
}

/// A provider's answer to `confirm`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ConfirmOutcome {
    Confirmed { order_id: String },
    Cancelled { order_id: String },
}

/// Order state as reported by the provider's `status` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RemoteOrderState {
    Created,
    Pending,
    Accepted,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
    /// The provider could not be reached or returned something unreadable.
    Unknown,
}

impl RemoteOrderState {
    /// Orders in these states still hold provider capacity and may be shifted.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            RemoteOrderState::Pending
                | RemoteOrderState::Accepted
                | RemoteOrderState::Confirmed
                | RemoteOrderState::InProgress
        )
    }
}

// ── Updates ──────────────────────────────────────────────────────

/// A change signalled against an existing order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "update_type", rename_all = "snake_case")]
pub enum UpdateAction {
    /// The order's load is being moved to another executor.
    FlexibilityResponse { target: String, reason: String },
    /// The buyer gives up an order it could not complete; the provider
    /// must not confirm it afterwards.
    Release { reason: String },
}

/// Provider acknowledgement of an update.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Ack {
    pub order_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_states() {
        assert!(RemoteOrderState::Confirmed.is_active());
        assert!(RemoteOrderState::InProgress.is_active());
        assert!(RemoteOrderState::Accepted.is_active());
        assert!(RemoteOrderState::Pending.is_active());
        assert!(!RemoteOrderState::Completed.is_active());
        assert!(!RemoteOrderState::Cancelled.is_active());
        assert!(!RemoteOrderState::Unknown.is_active());
        assert!(!RemoteOrderState::Created.is_active());
    }

    #[test]
    fn update_action_is_tagged() {
        let action = UpdateAction::FlexibilityResponse {
            target: "Leeds Node".to_string(),
            reason: "price spike".to_string(),
        };
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["update_type"], "flexibility_response");
        assert_eq!(json["target"], "Leeds Node");
    }

    #[test]
    fn catalog_counts_items() {
        let snapshot = CatalogSnapshot {
            providers: vec![CatalogProvider {
                id: "p1".to_string(),
                name: "P1".to_string(),
                items: vec![
                    CatalogItem {
                        id: "a".to_string(),
                        name: "A".to_string(),
                        currency: "GBP".to_string(),
                        price: 0.1,
                        carbon_intensity: 150.0,
                        renewable_mix: 50.0,
                    };
                    2
                ],
            }],
        };
        assert_eq!(snapshot.item_count(), 2);
    }
}
