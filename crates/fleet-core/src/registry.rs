// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Vehicle lifecycle: registration, search, partial update and deletion.

use serde::Deserialize;
use tracing::info;

use crate::coverage::ensure_full_coverage;
use crate::error::FleetError;
use crate::limits::{FleetLimits, PlatePolicy};
use crate::model::{
    check_description, normalize_plate, CoveredVehicle, Field, Vehicle, VehicleId,
};
use crate::store::{Constraint, StoreError, StoreTx};

/// Store pattern metacharacters removed from search input.
pub const WILDCARDS: [char; 2] = ['%', '_'];

/// Partial update of a vehicle. `Unset` fields are left alone.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct VehicleUpdate {
    /// Replacement plate; subject to [`PlatePolicy`].
    #[serde(default)]
    pub license_plate: Field<String>,
    /// Replacement description; `Set(None)` clears it.
    #[serde(default)]
    pub description: Field<Option<String>>,
}

type Setter =
    fn(&mut dyn StoreTx, &mut Vehicle, &VehicleUpdate, &FleetLimits) -> Result<bool, FleetError>;

// Applied top to bottom; each reports whether it changed the record.
const SETTERS: &[(&str, Setter)] = &[
    ("license_plate", set_plate),
    ("description", set_description),
];

/// Register a vehicle and create all of its wheel positions.
///
/// Plate duplicates are reported before capacity so a retried registration
/// never looks like a full fleet.
pub fn register(
    tx: &mut dyn StoreTx,
    plate: &str,
    description: Option<&str>,
    limits: &FleetLimits,
) -> Result<CoveredVehicle, FleetError> {
    let plate = normalize_plate(plate)?;
    let description = check_description(description)?;
    if tx.vehicle_by_plate(&plate)?.is_some() {
        return Err(FleetError::DuplicatePlate(plate));
    }
    if tx.count_vehicles()? >= limits.max_vehicles() {
        return Err(FleetError::CapacityExceeded {
            limit: limits.max_vehicles(),
        });
    }
    let vehicle = tx
        .insert_vehicle(&plate, description.as_deref())
        .map_err(|err| plate_conflict(err, &plate))?;
    let coverage = ensure_full_coverage(tx, vehicle.id, limits)?;
    info!(
        vehicle = %vehicle.id,
        plate = %vehicle.license_plate,
        positions = coverage.positions.len(),
        "vehicle registered"
    );
    Ok(CoveredVehicle {
        vehicle,
        wheel_positions: coverage.positions,
    })
}

/// Strip wildcards and surrounding whitespace; `None` means "match all".
pub fn sanitize_query(query: Option<&str>) -> Option<String> {
    let needle: String = query?.chars().filter(|c| !WILDCARDS.contains(c)).collect();
    let needle = needle.trim();
    (!needle.is_empty()).then(|| needle.to_owned())
}

/// Case-insensitive plate search, ordered by plate.
pub fn search(tx: &mut dyn StoreTx, query: Option<&str>) -> Result<Vec<Vehicle>, FleetError> {
    let needle = sanitize_query(query);
    Ok(tx.search_vehicles(needle.as_deref())?)
}

/// Apply a partial update and return the stored vehicle.
pub fn update(
    tx: &mut dyn StoreTx,
    id: VehicleId,
    changes: &VehicleUpdate,
    limits: &FleetLimits,
) -> Result<Vehicle, FleetError> {
    let mut vehicle = tx.vehicle(id)?.ok_or(FleetError::VehicleNotFound(id))?;
    let mut changed = Vec::new();
    for (field, setter) in SETTERS {
        if setter(&mut *tx, &mut vehicle, changes, limits)? {
            changed.push(*field);
        }
    }
    if changed.is_empty() {
        return Ok(vehicle);
    }
    tx.update_vehicle(&vehicle)
        .map_err(|err| plate_conflict(err, &vehicle.license_plate))?;
    info!(vehicle = %id, fields = ?changed, "vehicle updated");
    Ok(vehicle)
}

/// Delete a vehicle and, by cascade, its wheel positions.
pub fn delete(tx: &mut dyn StoreTx, id: VehicleId) -> Result<(), FleetError> {
    if !tx.delete_vehicle(id)? {
        return Err(FleetError::VehicleNotFound(id));
    }
    info!(vehicle = %id, "vehicle deleted");
    Ok(())
}

fn set_plate(
    tx: &mut dyn StoreTx,
    vehicle: &mut Vehicle,
    changes: &VehicleUpdate,
    limits: &FleetLimits,
) -> Result<bool, FleetError> {
    let Some(requested) = changes.license_plate.as_set() else {
        return Ok(false);
    };
    let plate = normalize_plate(requested)?;
    if plate == vehicle.license_plate {
        return Ok(false);
    }
    match limits.plate_policy() {
        PlatePolicy::Immutable => Err(FleetError::PlateImmutable(vehicle.id)),
        PlatePolicy::Mutable => {
            if let Some(other) = tx.vehicle_by_plate(&plate)? {
                if other.id != vehicle.id {
                    return Err(FleetError::DuplicatePlate(plate));
                }
            }
            vehicle.license_plate = plate;
            Ok(true)
        }
    }
}

fn set_description(
    _tx: &mut dyn StoreTx,
    vehicle: &mut Vehicle,
    changes: &VehicleUpdate,
    _limits: &FleetLimits,
) -> Result<bool, FleetError> {
    let Some(requested) = changes.description.as_set() else {
        return Ok(false);
    };
    let description = check_description(requested.as_deref())?;
    if description == vehicle.description {
        return Ok(false);
    }
    vehicle.description = description;
    Ok(true)
}

fn plate_conflict(err: StoreError, plate: &str) -> FleetError {
    match err {
        StoreError::ConstraintViolation {
            constraint: Constraint::VehiclePlate,
        } => FleetError::DuplicatePlate(plate.to_owned()),
        other => other.into(),
    }
}
