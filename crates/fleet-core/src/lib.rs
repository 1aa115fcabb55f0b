// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Core of the fleet tire tracker.
//!
//! Vehicles own a fixed set of numbered wheel slots, and each slot may carry a
//! tire serial. The crate keeps that picture consistent:
//!
//! - [`coverage`] guarantees one wheel position per slot, filling gaps left by
//!   legacy data or a raised slot count, and retries when a concurrent writer
//!   fills the same gap first.
//! - [`tires`] applies single and bulk serial changes with install-time rules.
//! - [`registry`] owns the vehicle lifecycle (unique plates, capacity ceiling).
//! - [`schema`] is the idempotent startup guard that repairs persisted data.
//!
//! Persistence sits behind the [`FleetStore`] port; [`MemoryStore`] is the
//! in-process adapter used by tests and demos. [`Fleet`] ties everything
//! together behind the [`AuthGate`].
//!
//! # Invariants
//!
//! - After any successful operation a vehicle has exactly one position for
//!   every slot `1..=N`.
//! - `installed_at` changes only when a different non-empty serial is mounted,
//!   and is cleared together with the serial.
//! - Every operation is one transaction: it fully applies or leaves no trace.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms, unused_must_use)]
#![deny(
    clippy::all,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::dbg_macro,
    clippy::print_stdout,
    clippy::print_stderr
)]
#![allow(clippy::module_name_repetitions)]

pub mod auth;
pub mod clock;
pub mod coverage;
pub mod error;
pub mod fleet;
pub mod layout;
pub mod limits;
pub mod memory;
pub mod model;
pub mod registry;
pub mod schema;
pub mod store;
pub mod tires;

pub use auth::{AccessToken, AuthGate, Principal, TokenSigner};
pub use clock::{Clock, ManualClock, SystemClock};
pub use coverage::{ensure_full_coverage, load_covered, Coverage, MAX_RECONCILE_ATTEMPTS};
pub use error::FleetError;
pub use fleet::Fleet;
pub use limits::{FleetLimits, PlatePolicy};
pub use memory::MemoryStore;
pub use model::{
    Account, CoveredVehicle, Field, TireState, User, UserId, Vehicle, VehicleId, WheelPosition,
    WheelPositionId,
};
pub use registry::VehicleUpdate;
pub use schema::{reconcile_schema, SchemaReport};
pub use store::{Constraint, FleetStore, SqlDialect, StoreError, StoreTx};
pub use tires::{next_tire_state, TireUpdate};
