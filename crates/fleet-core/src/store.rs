// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Persistence port for fleet records.
//!
//! A [`FleetStore`] hands out one transaction per unit of work. The work runs
//! against a [`StoreTx`]; returning `Ok` commits, returning `Err` rolls back.
//! Adapters must enforce three unique constraints (vehicle plate, username and
//! the `(vehicle_id, position_index)` pair) and report violations as
//! [`StoreError::ConstraintViolation`] so callers can tell races from faults.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::model::{
    NewUser, TireState, User, UserId, Vehicle, VehicleId, WheelPosition, WheelPositionId,
};

/// Vehicle table name.
pub const VEHICLES_TABLE: &str = "vehicles";
/// Wheel position table name.
pub const WHEEL_POSITIONS_TABLE: &str = "wheel_positions";
/// User table name.
pub const USERS_TABLE: &str = "users";
/// Install timestamp column, added after the first schema shipped.
pub const INSTALLED_AT_COLUMN: &str = "installed_at";

/// Unique constraints the fleet core relies on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Constraint {
    /// `vehicles.license_plate`.
    VehiclePlate,
    /// `wheel_positions (vehicle_id, position_index)`.
    WheelPosition,
    /// `users.username`.
    Username,
    /// Anything the adapter could not classify.
    Other(String),
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::VehiclePlate => f.write_str("uq_vehicle_plate"),
            Self::WheelPosition => f.write_str("uq_vehicle_position"),
            Self::Username => f.write_str("uq_username"),
            Self::Other(name) => f.write_str(name),
        }
    }
}

/// Error type for store operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// A unique constraint rejected the write.
    #[error("[STORE_CONSTRAINT] unique constraint {constraint} violated")]
    ConstraintViolation {
        /// Constraint that fired.
        constraint: Constraint,
    },
    /// The row to update or delete does not exist.
    #[error("[STORE_MISSING_ROW] {0}")]
    MissingRow(String),
    /// The persisted layout does not support the requested operation.
    #[error("[STORE_SCHEMA] {0}")]
    Schema(String),
    /// Catch-all backend failure.
    #[error("[STORE_BACKEND] {0}")]
    Backend(String),
}

/// SQL flavour of the backing store, used to pick column types.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SqlDialect {
    /// PostgreSQL: has `TIMESTAMP WITH TIME ZONE`.
    Postgres,
    /// MySQL or MariaDB: microsecond `DATETIME(6)`.
    MySql,
    /// SQLite: naive `DATETIME` affinity.
    Sqlite,
    /// Anything else, including in-process stores.
    Other,
}

/// Operations available inside one transaction.
pub trait StoreTx {
    /// Dialect of the backing store.
    fn dialect(&self) -> SqlDialect;
    /// Column names of `table`, or `None` when the table does not exist.
    fn table_columns(&self, table: &str) -> Result<Option<Vec<String>>, StoreError>;
    /// Add a nullable column.
    fn add_column(&mut self, table: &str, column: &str, definition: &str) -> Result<(), StoreError>;

    /// Fetch a vehicle by id.
    fn vehicle(&self, id: VehicleId) -> Result<Option<Vehicle>, StoreError>;
    /// Fetch a vehicle by exact plate.
    fn vehicle_by_plate(&self, plate: &str) -> Result<Option<Vehicle>, StoreError>;
    /// Every vehicle id, ascending.
    fn vehicle_ids(&self) -> Result<Vec<VehicleId>, StoreError>;
    /// Number of vehicles.
    fn count_vehicles(&self) -> Result<usize, StoreError>;
    /// Vehicles whose plate contains `needle` ignoring ASCII case, ordered by
    /// plate. `needle` carries no wildcards; `None` lists everything.
    fn search_vehicles(&self, needle: Option<&str>) -> Result<Vec<Vehicle>, StoreError>;
    /// Insert a vehicle.
    fn insert_vehicle(
        &mut self,
        plate: &str,
        description: Option<&str>,
    ) -> Result<Vehicle, StoreError>;
    /// Overwrite plate and description of an existing vehicle.
    fn update_vehicle(&mut self, vehicle: &Vehicle) -> Result<(), StoreError>;
    /// Delete a vehicle and its wheel positions. Returns whether it existed.
    fn delete_vehicle(&mut self, id: VehicleId) -> Result<bool, StoreError>;

    /// Wheel positions of a vehicle, ordered by index.
    fn wheel_positions(&self, vehicle: VehicleId) -> Result<Vec<WheelPosition>, StoreError>;
    /// Insert one wheel position.
    fn insert_wheel_position(
        &mut self,
        vehicle: VehicleId,
        index: u32,
        tire: &TireState,
    ) -> Result<WheelPosition, StoreError>;
    /// Overwrite serial and install time of a wheel position.
    fn update_tire(&mut self, id: WheelPositionId, tire: &TireState) -> Result<(), StoreError>;

    /// Fetch a user by id.
    fn user(&self, id: UserId) -> Result<Option<User>, StoreError>;
    /// Fetch a user by exact name.
    fn user_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;
    /// Insert an active, unprivileged user.
    fn insert_user(&mut self, user: &NewUser) -> Result<User, StoreError>;
}

/// A transactional store handle, shared by every unit of work.
pub trait FleetStore {
    /// Run `work` in one transaction: commit on `Ok`, roll back on `Err`.
    fn transaction<T, E>(
        &self,
        work: impl FnOnce(&mut dyn StoreTx) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<StoreError>;
}

impl<S: FleetStore> FleetStore for Arc<S> {
    fn transaction<T, E>(
        &self,
        work: impl FnOnce(&mut dyn StoreTx) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        (**self).transaction(work)
    }
}
