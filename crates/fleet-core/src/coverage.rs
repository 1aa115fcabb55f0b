// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Wheel-position reconciliation.
//!
//! Every vehicle owns exactly one wheel position per slot `1..=N`. Rows go
//! missing when a vehicle predates slot tracking or when `N` is raised; this
//! module fills the gaps. It never rewrites or deletes existing rows.
//!
//! Two units of work can observe the same gap and race to fill it. The store's
//! `(vehicle_id, position_index)` constraint rejects the loser, which rereads
//! and retries up to [`MAX_RECONCILE_ATTEMPTS`] times.

use std::collections::BTreeSet;

use tracing::{debug, warn};

use crate::error::FleetError;
use crate::limits::FleetLimits;
use crate::model::{CoveredVehicle, TireState, VehicleId, WheelPosition};
use crate::store::{Constraint, StoreError, StoreTx};

/// Fill attempts before a position race is reported to the caller.
pub const MAX_RECONCILE_ATTEMPTS: u32 = 3;

/// Result of one reconciliation pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Coverage {
    /// In-range positions ordered by index; exactly one per slot.
    pub positions: Vec<WheelPosition>,
    /// Placeholder rows created by this pass.
    pub inserted: usize,
}

/// Slots in `limits` that `positions` does not cover, ascending.
pub fn missing_indices(positions: &[WheelPosition], limits: &FleetLimits) -> Vec<u32> {
    let present: BTreeSet<u32> = positions.iter().map(|p| p.position_index).collect();
    limits.indices().filter(|index| !present.contains(index)).collect()
}

/// Create an empty position for every slot the vehicle lacks.
///
/// The caller must already know the vehicle exists. Idempotent: a second call
/// inserts nothing.
///
/// # Errors
/// [`FleetError::ConstraintViolation`] when every attempt lost a race, or any
/// store failure.
pub fn ensure_full_coverage(
    tx: &mut dyn StoreTx,
    vehicle: VehicleId,
    limits: &FleetLimits,
) -> Result<Coverage, FleetError> {
    let mut inserted = 0;
    for attempt in 1..=MAX_RECONCILE_ATTEMPTS {
        match fill_gaps(tx, vehicle, limits, &mut inserted) {
            Ok(()) => {
                let positions = in_range(tx.wheel_positions(vehicle)?, vehicle, limits);
                return Ok(Coverage {
                    positions,
                    inserted,
                });
            }
            Err(StoreError::ConstraintViolation {
                constraint: Constraint::WheelPosition,
            }) => {
                warn!(%vehicle, attempt, "wheel position already created concurrently; rereading");
            }
            Err(err) => return Err(err.into()),
        }
    }
    Err(FleetError::ConstraintViolation {
        constraint: Constraint::WheelPosition,
    })
}

/// Centralized accessor: load a vehicle with every slot guaranteed present.
///
/// Every read and write that addresses positions by index goes through here.
///
/// # Errors
/// [`FleetError::VehicleNotFound`] when the vehicle does not exist, plus
/// anything [`ensure_full_coverage`] returns.
pub fn load_covered(
    tx: &mut dyn StoreTx,
    id: VehicleId,
    limits: &FleetLimits,
) -> Result<CoveredVehicle, FleetError> {
    let vehicle = tx.vehicle(id)?.ok_or(FleetError::VehicleNotFound(id))?;
    let coverage = ensure_full_coverage(tx, id, limits)?;
    Ok(CoveredVehicle {
        vehicle,
        wheel_positions: coverage.positions,
    })
}

fn fill_gaps(
    tx: &mut dyn StoreTx,
    vehicle: VehicleId,
    limits: &FleetLimits,
    inserted: &mut usize,
) -> Result<(), StoreError> {
    let existing = tx.wheel_positions(vehicle)?;
    for index in missing_indices(&existing, limits) {
        tx.insert_wheel_position(vehicle, index, &TireState::EMPTY)?;
        *inserted += 1;
        debug!(%vehicle, index, "wheel position created");
    }
    Ok(())
}

// Rows beyond N survive a lowered slot count; they stay in storage but never
// reach callers.
fn in_range(
    positions: Vec<WheelPosition>,
    vehicle: VehicleId,
    limits: &FleetLimits,
) -> Vec<WheelPosition> {
    positions
        .into_iter()
        .filter(|position| {
            let keep = limits.contains(position.position_index);
            if !keep {
                warn!(
                    %vehicle,
                    index = position.position_index,
                    max = limits.wheel_positions(),
                    "wheel position outside configured range; excluded"
                );
            }
            keep
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::model::{NewUser, User, UserId, Vehicle, WheelPositionId};
    use crate::store::{FleetStore, SqlDialect};

    /// Simulates a second writer that wins every position insert race.
    struct RacingTx<'a> {
        inner: &'a mut dyn StoreTx,
        races: u32,
        // When false the "other writer" never actually commits its row.
        other_writer_inserts: bool,
    }

    impl StoreTx for RacingTx<'_> {
        fn dialect(&self) -> SqlDialect {
            self.inner.dialect()
        }
        fn table_columns(&self, table: &str) -> Result<Option<Vec<String>>, StoreError> {
            self.inner.table_columns(table)
        }
        fn add_column(
            &mut self,
            table: &str,
            column: &str,
            definition: &str,
        ) -> Result<(), StoreError> {
            self.inner.add_column(table, column, definition)
        }
        fn vehicle(&self, id: VehicleId) -> Result<Option<Vehicle>, StoreError> {
            self.inner.vehicle(id)
        }
        fn vehicle_by_plate(&self, plate: &str) -> Result<Option<Vehicle>, StoreError> {
            self.inner.vehicle_by_plate(plate)
        }
        fn vehicle_ids(&self) -> Result<Vec<VehicleId>, StoreError> {
            self.inner.vehicle_ids()
        }
        fn count_vehicles(&self) -> Result<usize, StoreError> {
            self.inner.count_vehicles()
        }
        fn search_vehicles(&self, needle: Option<&str>) -> Result<Vec<Vehicle>, StoreError> {
            self.inner.search_vehicles(needle)
        }
        fn insert_vehicle(
            &mut self,
            plate: &str,
            description: Option<&str>,
        ) -> Result<Vehicle, StoreError> {
            self.inner.insert_vehicle(plate, description)
        }
        fn update_vehicle(&mut self, vehicle: &Vehicle) -> Result<(), StoreError> {
            self.inner.update_vehicle(vehicle)
        }
        fn delete_vehicle(&mut self, id: VehicleId) -> Result<bool, StoreError> {
            self.inner.delete_vehicle(id)
        }
        fn wheel_positions(&self, vehicle: VehicleId) -> Result<Vec<WheelPosition>, StoreError> {
            self.inner.wheel_positions(vehicle)
        }
        fn insert_wheel_position(
            &mut self,
            vehicle: VehicleId,
            index: u32,
            tire: &TireState,
        ) -> Result<WheelPosition, StoreError> {
            if self.races == 0 {
                return self.inner.insert_wheel_position(vehicle, index, tire);
            }
            self.races -= 1;
            if self.other_writer_inserts {
                self.inner.insert_wheel_position(vehicle, index, tire)?;
            }
            Err(StoreError::ConstraintViolation {
                constraint: Constraint::WheelPosition,
            })
        }
        fn update_tire(&mut self, id: WheelPositionId, tire: &TireState) -> Result<(), StoreError> {
            self.inner.update_tire(id, tire)
        }
        fn user(&self, id: UserId) -> Result<Option<User>, StoreError> {
            self.inner.user(id)
        }
        fn user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
            self.inner.user_by_username(username)
        }
        fn insert_user(&mut self, user: &NewUser) -> Result<User, StoreError> {
            self.inner.insert_user(user)
        }
    }

    fn bare_vehicle(store: &MemoryStore) -> VehicleId {
        store
            .transaction(|tx| tx.insert_vehicle("LT 123 CM", None).map(|v| v.id))
            .unwrap()
    }

    // ── 1. gap filling ──

    #[test]
    fn fills_every_slot_of_a_bare_vehicle() {
        let store = MemoryStore::new();
        let id = bare_vehicle(&store);
        let limits = FleetLimits::default();

        let coverage = store
            .transaction(|tx| ensure_full_coverage(tx, id, &limits))
            .unwrap();
        assert_eq!(coverage.inserted, 20);
        let indices: Vec<u32> = coverage.positions.iter().map(|p| p.position_index).collect();
        assert_eq!(indices, (1..=20).collect::<Vec<_>>());
        assert!(coverage.positions.iter().all(|p| p.tire == TireState::EMPTY));
    }

    #[test]
    fn second_pass_is_a_no_op() {
        let store = MemoryStore::new();
        let id = bare_vehicle(&store);
        let limits = FleetLimits::default();

        let first = store
            .transaction(|tx| ensure_full_coverage(tx, id, &limits))
            .unwrap();
        let second = store
            .transaction(|tx| ensure_full_coverage(tx, id, &limits))
            .unwrap();
        assert_eq!(second.inserted, 0);
        assert_eq!(first.positions, second.positions);
    }

    #[test]
    fn keeps_existing_rows_untouched() {
        let store = MemoryStore::new();
        let id = bare_vehicle(&store);
        let limits = FleetLimits::new(4, 10).unwrap();
        let mounted = TireState {
            tire_serial: Some("KEEP".into()),
            installed_at: None,
        };
        store
            .transaction(|tx| tx.insert_wheel_position(id, 3, &mounted))
            .unwrap();

        let coverage = store
            .transaction(|tx| ensure_full_coverage(tx, id, &limits))
            .unwrap();
        assert_eq!(coverage.inserted, 3);
        assert_eq!(coverage.positions[2].tire, mounted);
    }

    // ── 2. races ──

    #[test]
    fn lost_race_rereads_and_completes() {
        let store = MemoryStore::new();
        let id = bare_vehicle(&store);
        let limits = FleetLimits::default();

        let coverage = store
            .transaction(|tx| {
                let mut racing = RacingTx {
                    inner: tx,
                    races: 2,
                    other_writer_inserts: true,
                };
                ensure_full_coverage(&mut racing, id, &limits)
            })
            .unwrap();
        assert_eq!(coverage.positions.len(), 20);
        assert_eq!(coverage.inserted, 18);
    }

    #[test]
    fn exhausted_attempts_surface_a_transient_error() {
        let store = MemoryStore::new();
        let id = bare_vehicle(&store);
        let limits = FleetLimits::default();

        let err = store
            .transaction(|tx| {
                let mut racing = RacingTx {
                    inner: tx,
                    races: u32::MAX,
                    other_writer_inserts: false,
                };
                ensure_full_coverage(&mut racing, id, &limits)
            })
            .unwrap_err();
        assert!(err.is_transient());
    }

    // ── 3. accessor ──

    #[test]
    fn load_covered_rejects_unknown_vehicle() {
        let store = MemoryStore::new();
        let limits = FleetLimits::default();
        let err = store
            .transaction(|tx| load_covered(tx, VehicleId(99), &limits))
            .unwrap_err();
        assert_eq!(err, FleetError::VehicleNotFound(VehicleId(99)));
    }

    #[test]
    fn out_of_range_rows_are_hidden_but_kept() {
        let store = MemoryStore::new();
        let id = bare_vehicle(&store);
        let wide = FleetLimits::new(6, 10).unwrap();
        let narrow = FleetLimits::new(4, 10).unwrap();

        store
            .transaction(|tx| ensure_full_coverage(tx, id, &wide))
            .unwrap();
        let covered = store
            .transaction(|tx| load_covered(tx, id, &narrow))
            .unwrap();
        assert_eq!(covered.indices(), vec![1, 2, 3, 4]);

        let stored = store.transaction(|tx| tx.wheel_positions(id)).unwrap();
        assert_eq!(stored.len(), 6);
    }
}
