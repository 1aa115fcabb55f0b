// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! SQLite implementation of the fleet store port.
//!
//! One connection sits behind a mutex and every unit of work runs in an
//! `IMMEDIATE` transaction, so writers serialize on the database lock and wait
//! at most the configured busy timeout. Opening a store creates any missing
//! table in its current layout; older tables are left for the schema guard to
//! repair.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms, unused_must_use)]
#![deny(
    clippy::all,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr
)]

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use fleet_core::model::NewUser;
use fleet_core::store::{INSTALLED_AT_COLUMN, USERS_TABLE, VEHICLES_TABLE, WHEEL_POSITIONS_TABLE};
use fleet_core::{
    Constraint, FleetStore, SqlDialect, StoreError, StoreTx, TireState, User, UserId, Vehicle,
    VehicleId, WheelPosition, WheelPositionId,
};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row, TransactionBehavior};
use tracing::debug;

/// Default wait for a locked database.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

const BOOTSTRAP: &str = "
    CREATE TABLE IF NOT EXISTS vehicles (
        id            INTEGER PRIMARY KEY AUTOINCREMENT,
        license_plate VARCHAR(32) NOT NULL UNIQUE,
        description   VARCHAR(255)
    );
    CREATE TABLE IF NOT EXISTS wheel_positions (
        id             INTEGER PRIMARY KEY AUTOINCREMENT,
        vehicle_id     INTEGER NOT NULL REFERENCES vehicles(id) ON DELETE CASCADE,
        position_index INTEGER NOT NULL,
        tire_serial    VARCHAR(64),
        installed_at   DATETIME,
        CONSTRAINT uq_vehicle_position UNIQUE (vehicle_id, position_index)
    );
    CREATE TABLE IF NOT EXISTS users (
        id              INTEGER PRIMARY KEY AUTOINCREMENT,
        username        VARCHAR(50) NOT NULL UNIQUE,
        hashed_password VARCHAR(255) NOT NULL,
        is_active       BOOLEAN NOT NULL DEFAULT 1,
        is_superuser    BOOLEAN NOT NULL DEFAULT 0
    );
";

/// [`FleetStore`] backed by one SQLite connection.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the database file at `path`.
    pub fn open(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(backend)?;
        Self::from_connection(conn, busy_timeout)
    }

    /// Private in-memory database.
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(backend)?;
        Self::from_connection(conn, DEFAULT_BUSY_TIMEOUT)
    }

    /// Adopt an existing connection and create any missing tables.
    pub fn from_connection(conn: Connection, busy_timeout: Duration) -> Result<Self, StoreError> {
        conn.busy_timeout(busy_timeout).map_err(backend)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(backend)?;
        conn.execute_batch(BOOTSTRAP).map_err(backend)?;
        debug!(?busy_timeout, "sqlite store ready");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl FleetStore for SqliteStore {
    fn transaction<T, E>(
        &self,
        work: impl FnOnce(&mut dyn StoreTx) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|_| StoreError::Backend("sqlite connection lock poisoned".into()))?;
        // Dropping an uncommitted transaction rolls it back.
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(backend)?;
        let value = {
            let conn: &Connection = &tx;
            work(&mut SqliteTx { conn })?
        };
        tx.commit().map_err(backend)?;
        Ok(value)
    }
}

struct SqliteTx<'a> {
    conn: &'a Connection,
}

impl SqliteTx<'_> {
    fn has_install_column(&self) -> Result<bool, StoreError> {
        Ok(self
            .table_columns(WHEEL_POSITIONS_TABLE)?
            .is_some_and(|columns| columns.iter().any(|c| c == INSTALLED_AT_COLUMN)))
    }

    fn install_column_for(&self, tire: &TireState) -> Result<bool, StoreError> {
        let present = self.has_install_column()?;
        if tire.installed_at.is_some() && !present {
            return Err(StoreError::Schema(format!(
                "{WHEEL_POSITIONS_TABLE} has no column {INSTALLED_AT_COLUMN}"
            )));
        }
        Ok(present)
    }

    fn position_select(&self) -> Result<String, StoreError> {
        let installed_at = if self.has_install_column()? {
            INSTALLED_AT_COLUMN
        } else {
            "NULL"
        };
        Ok(format!(
            "SELECT id, vehicle_id, position_index, tire_serial, {installed_at} \
             FROM {WHEEL_POSITIONS_TABLE}"
        ))
    }
}

impl StoreTx for SqliteTx<'_> {
    fn dialect(&self) -> SqlDialect {
        SqlDialect::Sqlite
    }

    fn table_columns(&self, table: &str) -> Result<Option<Vec<String>>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM pragma_table_info(?1)")
            .map_err(store_error)?;
        let columns = stmt
            .query_map(params![table], |row| row.get::<_, String>(0))
            .map_err(store_error)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(store_error)?;
        Ok((!columns.is_empty()).then_some(columns))
    }

    fn add_column(
        &mut self,
        table: &str,
        column: &str,
        definition: &str,
    ) -> Result<(), StoreError> {
        self.conn
            .execute_batch(&format!(
                "ALTER TABLE \"{table}\" ADD COLUMN \"{column}\" {definition}"
            ))
            .map_err(|err| StoreError::Schema(err.to_string()))
    }

    fn vehicle(&self, id: VehicleId) -> Result<Option<Vehicle>, StoreError> {
        self.conn
            .query_row(
                "SELECT id, license_plate, description FROM vehicles WHERE id = ?1",
                params![id.0],
                vehicle_row,
            )
            .optional()
            .map_err(store_error)
    }

    fn vehicle_by_plate(&self, plate: &str) -> Result<Option<Vehicle>, StoreError> {
        self.conn
            .query_row(
                "SELECT id, license_plate, description FROM vehicles WHERE license_plate = ?1",
                params![plate],
                vehicle_row,
            )
            .optional()
            .map_err(store_error)
    }

    fn vehicle_ids(&self) -> Result<Vec<VehicleId>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM vehicles ORDER BY id")
            .map_err(store_error)?;
        let ids = stmt
            .query_map([], |row| row.get(0).map(VehicleId))
            .map_err(store_error)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(store_error)?;
        Ok(ids)
    }

    fn count_vehicles(&self) -> Result<usize, StoreError> {
        let count: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {VEHICLES_TABLE}"), [], |row| row.get(0))
            .map_err(store_error)?;
        usize::try_from(count)
            .map_err(|_| StoreError::Backend(format!("vehicle count '{count}' out of range")))
    }

    fn search_vehicles(&self, needle: Option<&str>) -> Result<Vec<Vehicle>, StoreError> {
        // LIKE is ASCII case-insensitive in SQLite; the needle carries no wildcards.
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, license_plate, description FROM vehicles
                 WHERE ?1 IS NULL OR license_plate LIKE '%' || ?1 || '%'
                 ORDER BY license_plate",
            )
            .map_err(store_error)?;
        let vehicles = stmt
            .query_map(params![needle], vehicle_row)
            .map_err(store_error)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(store_error)?;
        Ok(vehicles)
    }

    fn insert_vehicle(
        &mut self,
        plate: &str,
        description: Option<&str>,
    ) -> Result<Vehicle, StoreError> {
        self.conn
            .execute(
                "INSERT INTO vehicles (license_plate, description) VALUES (?1, ?2)",
                params![plate, description],
            )
            .map_err(store_error)?;
        Ok(Vehicle {
            id: VehicleId(self.conn.last_insert_rowid()),
            license_plate: plate.to_owned(),
            description: description.map(str::to_owned),
        })
    }

    fn update_vehicle(&mut self, vehicle: &Vehicle) -> Result<(), StoreError> {
        let changed = self
            .conn
            .execute(
                "UPDATE vehicles SET license_plate = ?2, description = ?3 WHERE id = ?1",
                params![vehicle.id.0, vehicle.license_plate, vehicle.description],
            )
            .map_err(store_error)?;
        if changed == 0 {
            return Err(StoreError::MissingRow(format!("vehicle {}", vehicle.id)));
        }
        Ok(())
    }

    fn delete_vehicle(&mut self, id: VehicleId) -> Result<bool, StoreError> {
        // Explicit child delete covers tables created without ON DELETE CASCADE.
        self.conn
            .execute("DELETE FROM wheel_positions WHERE vehicle_id = ?1", params![id.0])
            .map_err(store_error)?;
        let deleted = self
            .conn
            .execute("DELETE FROM vehicles WHERE id = ?1", params![id.0])
            .map_err(store_error)?;
        Ok(deleted > 0)
    }

    fn wheel_positions(&self, vehicle: VehicleId) -> Result<Vec<WheelPosition>, StoreError> {
        let sql = format!(
            "{} WHERE vehicle_id = ?1 ORDER BY position_index",
            self.position_select()?
        );
        let mut stmt = self.conn.prepare(&sql).map_err(store_error)?;
        let positions = stmt
            .query_map(params![vehicle.0], position_row)
            .map_err(store_error)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(store_error)?;
        Ok(positions)
    }

    fn insert_wheel_position(
        &mut self,
        vehicle: VehicleId,
        index: u32,
        tire: &TireState,
    ) -> Result<WheelPosition, StoreError> {
        let inserted = if self.install_column_for(tire)? {
            self.conn.execute(
                "INSERT INTO wheel_positions (vehicle_id, position_index, tire_serial, installed_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![vehicle.0, index, tire.tire_serial, tire.installed_at],
            )
        } else {
            self.conn.execute(
                "INSERT INTO wheel_positions (vehicle_id, position_index, tire_serial)
                 VALUES (?1, ?2, ?3)",
                params![vehicle.0, index, tire.tire_serial],
            )
        };
        inserted.map_err(store_error)?;
        Ok(WheelPosition {
            id: WheelPositionId(self.conn.last_insert_rowid()),
            vehicle_id: vehicle,
            position_index: index,
            tire: tire.clone(),
        })
    }

    fn update_tire(&mut self, id: WheelPositionId, tire: &TireState) -> Result<(), StoreError> {
        let changed = if self.install_column_for(tire)? {
            self.conn.execute(
                "UPDATE wheel_positions SET tire_serial = ?2, installed_at = ?3 WHERE id = ?1",
                params![id.0, tire.tire_serial, tire.installed_at],
            )
        } else {
            self.conn.execute(
                "UPDATE wheel_positions SET tire_serial = ?2 WHERE id = ?1",
                params![id.0, tire.tire_serial],
            )
        }
        .map_err(store_error)?;
        if changed == 0 {
            return Err(StoreError::MissingRow(format!("wheel position {id}")));
        }
        Ok(())
    }

    fn user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        self.conn
            .query_row(
                &format!("{USER_SELECT} WHERE id = ?1"),
                params![id.0],
                user_row,
            )
            .optional()
            .map_err(store_error)
    }

    fn user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        self.conn
            .query_row(
                &format!("{USER_SELECT} WHERE username = ?1"),
                params![username],
                user_row,
            )
            .optional()
            .map_err(store_error)
    }

    fn insert_user(&mut self, user: &NewUser) -> Result<User, StoreError> {
        self.conn
            .execute(
                "INSERT INTO users (username, hashed_password, is_active, is_superuser)
                 VALUES (?1, ?2, 1, 0)",
                params![user.username, user.hashed_password],
            )
            .map_err(store_error)?;
        Ok(User {
            id: UserId(self.conn.last_insert_rowid()),
            username: user.username.clone(),
            hashed_password: user.hashed_password.clone(),
            is_active: true,
            is_superuser: false,
        })
    }
}

const USER_SELECT: &str =
    "SELECT id, username, hashed_password, is_active, is_superuser FROM users";

fn vehicle_row(row: &Row<'_>) -> rusqlite::Result<Vehicle> {
    Ok(Vehicle {
        id: VehicleId(row.get(0)?),
        license_plate: row.get(1)?,
        description: row.get(2)?,
    })
}

fn position_row(row: &Row<'_>) -> rusqlite::Result<WheelPosition> {
    let installed_at: Option<DateTime<Utc>> = row.get(4)?;
    Ok(WheelPosition {
        id: WheelPositionId(row.get(0)?),
        vehicle_id: VehicleId(row.get(1)?),
        position_index: row.get(2)?,
        tire: TireState {
            tire_serial: row.get(3)?,
            installed_at,
        },
    })
}

fn user_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: UserId(row.get(0)?),
        username: row.get(1)?,
        hashed_password: row.get(2)?,
        // Older rows may carry NULL flags.
        is_active: row.get::<_, Option<bool>>(3)?.unwrap_or(true),
        is_superuser: row.get::<_, Option<bool>>(4)?.unwrap_or(false),
    })
}

fn backend(err: rusqlite::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}

fn store_error(err: rusqlite::Error) -> StoreError {
    if let rusqlite::Error::SqliteFailure(failure, message) = &err {
        if failure.code == ErrorCode::ConstraintViolation {
            let message = message.as_deref().unwrap_or_default();
            return StoreError::ConstraintViolation {
                constraint: classify_constraint(message),
            };
        }
    }
    backend(err)
}

/// Map an SQLite constraint message to the constraint it names.
fn classify_constraint(message: &str) -> Constraint {
    if message.contains(&format!("{VEHICLES_TABLE}.license_plate")) {
        Constraint::VehiclePlate
    } else if message.contains(&format!("{WHEEL_POSITIONS_TABLE}.position_index")) {
        Constraint::WheelPosition
    } else if message.contains(&format!("{USERS_TABLE}.username")) {
        Constraint::Username
    } else {
        Constraint::Other(message.to_owned())
    }
}
