// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! In-memory fleet store.
//!
//! [`MemoryStore`] keeps every table in ordered maps behind one mutex. Each
//! transaction snapshots the tables and restores the snapshot when the work
//! fails, which gives the same all-or-nothing behavior as a database
//! transaction. Unique constraints and the vehicle → wheel position cascade are
//! enforced the same way the SQL adapter's schema enforces them.

use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::model::{
    NewUser, TireState, User, UserId, Vehicle, VehicleId, WheelPosition, WheelPositionId,
};
use crate::store::{
    Constraint, FleetStore, SqlDialect, StoreError, StoreTx, INSTALLED_AT_COLUMN,
    USERS_TABLE, VEHICLES_TABLE, WHEEL_POSITIONS_TABLE,
};

const VEHICLE_COLUMNS: &[&str] = &["id", "license_plate", "description"];
const WHEEL_COLUMNS: &[&str] = &["id", "vehicle_id", "position_index", "tire_serial"];
const USER_COLUMNS: &[&str] = &["id", "username", "hashed_password", "is_active", "is_superuser"];

#[derive(Clone, Debug, Default)]
struct Tables {
    vehicles: BTreeMap<VehicleId, Vehicle>,
    positions: BTreeMap<WheelPositionId, WheelPosition>,
    users: BTreeMap<UserId, User>,
    last_vehicle: i64,
    last_position: i64,
    last_user: i64,
    installed_at: bool,
}

/// In-memory [`FleetStore`] with snapshot rollback.
///
/// # Layout
///
/// - [`MemoryStore::new`] starts with the current layout.
/// - [`MemoryStore::legacy`] starts without the `installed_at` column, the
///   layout of deployments that predate install tracking. Writing an install
///   time fails with [`StoreError::Schema`] until the column is added.
#[derive(Debug)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    /// Create an empty store with the current layout.
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(Tables {
                installed_at: true,
                ..Tables::default()
            }),
        }
    }

    /// Create an empty store whose wheel positions lack `installed_at`.
    pub fn legacy() -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl FleetStore for MemoryStore {
    fn transaction<T, E>(
        &self,
        work: impl FnOnce(&mut dyn StoreTx) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        let mut guard = self
            .tables
            .lock()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".into()))?;
        let snapshot = guard.clone();
        let mut tx = MemoryTx {
            tables: &mut *guard,
        };
        match work(&mut tx) {
            Ok(value) => Ok(value),
            Err(err) => {
                *guard = snapshot;
                Err(err)
            }
        }
    }
}

struct MemoryTx<'a> {
    tables: &'a mut Tables,
}

impl MemoryTx<'_> {
    fn check_install_column(&self, tire: &TireState) -> Result<(), StoreError> {
        if tire.installed_at.is_some() && !self.tables.installed_at {
            return Err(StoreError::Schema(format!(
                "{WHEEL_POSITIONS_TABLE} has no column {INSTALLED_AT_COLUMN}"
            )));
        }
        Ok(())
    }

    fn plate_taken(&self, plate: &str, except: Option<VehicleId>) -> bool {
        self.tables
            .vehicles
            .values()
            .any(|v| v.license_plate == plate && Some(v.id) != except)
    }
}

impl StoreTx for MemoryTx<'_> {
    fn dialect(&self) -> SqlDialect {
        SqlDialect::Other
    }

    fn table_columns(&self, table: &str) -> Result<Option<Vec<String>>, StoreError> {
        let mut columns: Vec<String> = match table {
            VEHICLES_TABLE => VEHICLE_COLUMNS.iter().map(|c| (*c).to_owned()).collect(),
            WHEEL_POSITIONS_TABLE => WHEEL_COLUMNS.iter().map(|c| (*c).to_owned()).collect(),
            USERS_TABLE => USER_COLUMNS.iter().map(|c| (*c).to_owned()).collect(),
            _ => return Ok(None),
        };
        if table == WHEEL_POSITIONS_TABLE && self.tables.installed_at {
            columns.push(INSTALLED_AT_COLUMN.to_owned());
        }
        Ok(Some(columns))
    }

    fn add_column(
        &mut self,
        table: &str,
        column: &str,
        _definition: &str,
    ) -> Result<(), StoreError> {
        if table != WHEEL_POSITIONS_TABLE || column != INSTALLED_AT_COLUMN {
            return Err(StoreError::Schema(format!(
                "memory store cannot add {table}.{column}"
            )));
        }
        if self.tables.installed_at {
            return Err(StoreError::Schema(format!(
                "duplicate column name: {column}"
            )));
        }
        self.tables.installed_at = true;
        Ok(())
    }

    fn vehicle(&self, id: VehicleId) -> Result<Option<Vehicle>, StoreError> {
        Ok(self.tables.vehicles.get(&id).cloned())
    }

    fn vehicle_by_plate(&self, plate: &str) -> Result<Option<Vehicle>, StoreError> {
        Ok(self
            .tables
            .vehicles
            .values()
            .find(|v| v.license_plate == plate)
            .cloned())
    }

    fn vehicle_ids(&self) -> Result<Vec<VehicleId>, StoreError> {
        Ok(self.tables.vehicles.keys().copied().collect())
    }

    fn count_vehicles(&self) -> Result<usize, StoreError> {
        Ok(self.tables.vehicles.len())
    }

    fn search_vehicles(&self, needle: Option<&str>) -> Result<Vec<Vehicle>, StoreError> {
        let needle = needle.map(str::to_ascii_lowercase);
        let mut found: Vec<Vehicle> = self
            .tables
            .vehicles
            .values()
            .filter(|v| {
                needle
                    .as_deref()
                    .map_or(true, |n| v.license_plate.to_ascii_lowercase().contains(n))
            })
            .cloned()
            .collect();
        found.sort_by(|a, b| a.license_plate.cmp(&b.license_plate));
        Ok(found)
    }

    fn insert_vehicle(
        &mut self,
        plate: &str,
        description: Option<&str>,
    ) -> Result<Vehicle, StoreError> {
        if self.plate_taken(plate, None) {
            return Err(StoreError::ConstraintViolation {
                constraint: Constraint::VehiclePlate,
            });
        }
        self.tables.last_vehicle += 1;
        let vehicle = Vehicle {
            id: VehicleId(self.tables.last_vehicle),
            license_plate: plate.to_owned(),
            description: description.map(str::to_owned),
        };
        self.tables.vehicles.insert(vehicle.id, vehicle.clone());
        Ok(vehicle)
    }

    fn update_vehicle(&mut self, vehicle: &Vehicle) -> Result<(), StoreError> {
        if self.plate_taken(&vehicle.license_plate, Some(vehicle.id)) {
            return Err(StoreError::ConstraintViolation {
                constraint: Constraint::VehiclePlate,
            });
        }
        let slot = self
            .tables
            .vehicles
            .get_mut(&vehicle.id)
            .ok_or_else(|| StoreError::MissingRow(format!("vehicle {}", vehicle.id)))?;
        *slot = vehicle.clone();
        Ok(())
    }

    fn delete_vehicle(&mut self, id: VehicleId) -> Result<bool, StoreError> {
        if self.tables.vehicles.remove(&id).is_none() {
            return Ok(false);
        }
        self.tables.positions.retain(|_, p| p.vehicle_id != id);
        Ok(true)
    }

    fn wheel_positions(&self, vehicle: VehicleId) -> Result<Vec<WheelPosition>, StoreError> {
        let mut positions: Vec<WheelPosition> = self
            .tables
            .positions
            .values()
            .filter(|p| p.vehicle_id == vehicle)
            .cloned()
            .collect();
        positions.sort_by_key(|p| p.position_index);
        Ok(positions)
    }

    fn insert_wheel_position(
        &mut self,
        vehicle: VehicleId,
        index: u32,
        tire: &TireState,
    ) -> Result<WheelPosition, StoreError> {
        self.check_install_column(tire)?;
        if !self.tables.vehicles.contains_key(&vehicle) {
            return Err(StoreError::ConstraintViolation {
                constraint: Constraint::Other("fk_wheel_position_vehicle".into()),
            });
        }
        let taken = self
            .tables
            .positions
            .values()
            .any(|p| p.vehicle_id == vehicle && p.position_index == index);
        if taken {
            return Err(StoreError::ConstraintViolation {
                constraint: Constraint::WheelPosition,
            });
        }
        self.tables.last_position += 1;
        let position = WheelPosition {
            id: WheelPositionId(self.tables.last_position),
            vehicle_id: vehicle,
            position_index: index,
            tire: tire.clone(),
        };
        self.tables.positions.insert(position.id, position.clone());
        Ok(position)
    }

    fn update_tire(&mut self, id: WheelPositionId, tire: &TireState) -> Result<(), StoreError> {
        self.check_install_column(tire)?;
        let position = self
            .tables
            .positions
            .get_mut(&id)
            .ok_or_else(|| StoreError::MissingRow(format!("wheel position {id}")))?;
        position.tire = tire.clone();
        Ok(())
    }

    fn user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        Ok(self.tables.users.get(&id).cloned())
    }

    fn user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .tables
            .users
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    fn insert_user(&mut self, user: &NewUser) -> Result<User, StoreError> {
        if self.tables.users.values().any(|u| u.username == user.username) {
            return Err(StoreError::ConstraintViolation {
                constraint: Constraint::Username,
            });
        }
        self.tables.last_user += 1;
        let stored = User {
            id: UserId(self.tables.last_user),
            username: user.username.clone(),
            hashed_password: user.hashed_password.clone(),
            is_active: true,
            is_superuser: false,
        };
        self.tables.users.insert(stored.id, stored.clone());
        Ok(stored)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn add_vehicle(store: &MemoryStore, plate: &str) -> Vehicle {
        store.transaction(|tx| tx.insert_vehicle(plate, None)).unwrap()
    }

    #[test]
    fn failed_work_rolls_back_every_write() {
        let store = MemoryStore::new();
        let result: Result<(), StoreError> = store.transaction(|tx| {
            let v = tx.insert_vehicle("LT 123 CM", None)?;
            tx.insert_wheel_position(v.id, 1, &TireState::EMPTY)?;
            Err(StoreError::Backend("boom".into()))
        });
        assert!(result.is_err());
        let count = store.transaction(|tx| tx.count_vehicles()).unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn plate_and_position_uniqueness() {
        let store = MemoryStore::new();
        let v = add_vehicle(&store, "LT 123 CM");
        let dup = store.transaction(|tx| tx.insert_vehicle("LT 123 CM", None));
        assert_eq!(
            dup.unwrap_err(),
            StoreError::ConstraintViolation {
                constraint: Constraint::VehiclePlate
            }
        );

        store
            .transaction(|tx| tx.insert_wheel_position(v.id, 1, &TireState::EMPTY))
            .unwrap();
        let dup = store.transaction(|tx| tx.insert_wheel_position(v.id, 1, &TireState::EMPTY));
        assert_eq!(
            dup.unwrap_err(),
            StoreError::ConstraintViolation {
                constraint: Constraint::WheelPosition
            }
        );
    }

    #[test]
    fn delete_cascades_to_positions() {
        let store = MemoryStore::new();
        let keep = add_vehicle(&store, "KEEP 0001");
        let gone = add_vehicle(&store, "GONE 0002");
        store
            .transaction(|tx| {
                tx.insert_wheel_position(keep.id, 1, &TireState::EMPTY)?;
                tx.insert_wheel_position(gone.id, 1, &TireState::EMPTY)?;
                tx.delete_vehicle(gone.id)
            })
            .unwrap();
        let (kept, removed) = store
            .transaction(|tx| {
                Ok::<_, StoreError>((tx.wheel_positions(keep.id)?, tx.wheel_positions(gone.id)?))
            })
            .unwrap();
        assert_eq!(kept.len(), 1);
        assert!(removed.is_empty());
    }

    #[test]
    fn search_ignores_case_and_orders_by_plate() {
        let store = MemoryStore::new();
        add_vehicle(&store, "ZZ 987 AA");
        add_vehicle(&store, "cm 987 bb");
        add_vehicle(&store, "LT 123 CM");
        let found = store.transaction(|tx| tx.search_vehicles(Some("987"))).unwrap();
        let plates: Vec<_> = found.iter().map(|v| v.license_plate.as_str()).collect();
        assert_eq!(plates, ["ZZ 987 AA", "cm 987 bb"]);

        let found = store.transaction(|tx| tx.search_vehicles(Some("CM"))).unwrap();
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn legacy_layout_rejects_install_times_until_migrated() {
        let store = MemoryStore::legacy();
        let v = add_vehicle(&store, "OLD 00001");
        let tire = TireState {
            tire_serial: Some("T1".into()),
            installed_at: Some(chrono::Utc::now()),
        };
        let err = store
            .transaction(|tx| tx.insert_wheel_position(v.id, 1, &tire))
            .unwrap_err();
        assert!(matches!(err, StoreError::Schema(_)));

        store
            .transaction(|tx| tx.add_column(WHEEL_POSITIONS_TABLE, INSTALLED_AT_COLUMN, "DATETIME"))
            .unwrap();
        store
            .transaction(|tx| tx.insert_wheel_position(v.id, 1, &tire))
            .unwrap();
    }
}
