//! gridshift-reservation — the external reservation protocol lifecycle.
//!
//! Executors never talk to providers directly; they go through the
//! [`ReservationClient`] trait, which turns every remote call into a typed
//! result. This crate holds:
//!
//! - **`types`** — catalog, quote, order, and update payloads
//! - **`reservation`** — the local reservation state machine and the
//!   select → init → confirm negotiation
//! - **`client`** — the `ReservationClient` contract
//! - **`simulated`** — an in-process provider with failure injection
//! - **`bounded`** — a decorator that enforces a per-call time budget
//!
//! # Reservation lifecycle
//!
//! ```text
//! QUOTE_REQUESTED ──init ok──▶ INITIALIZED ──confirm ok──▶ CONFIRMED ──job done──▶ COMPLETED
//!        │                          │                          │
//!        └──── step failed ─────────┴──── cancelled ───────────┴──▶ CANCELLED
//! ```

pub mod bounded;
pub mod client;
pub mod error;
pub mod reservation;
pub mod simulated;
pub mod types;

pub use bounded::BoundedClient;
pub use client::ReservationClient;
pub use error::{LifecycleStep, ReservationError, ReservationResult};
pub use reservation::{LifecycleFailure, Reservation, ReservationState};
pub use simulated::{SimulatedReservationClient, UpdateRecord};
pub use types::*;
