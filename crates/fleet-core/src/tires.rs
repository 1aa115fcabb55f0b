// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Tire assignment: single and bulk serial updates with install tracking.
//!
//! The install time moves only when a different non-empty serial is mounted.
//! Re-submitting the mounted serial changes nothing; clearing the serial clears
//! the install time too.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::coverage::load_covered;
use crate::error::FleetError;
use crate::limits::FleetLimits;
use crate::model::{normalize_serial, TireState, VehicleId, WheelPosition};
use crate::store::StoreTx;

/// One item of a bulk request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TireUpdate {
    /// Slot to change.
    pub position_index: u32,
    /// Serial to mount; `None` or blank removes the tire.
    #[serde(default)]
    pub tire_serial: Option<String>,
}

impl TireUpdate {
    /// Mount `serial` at `index`.
    pub fn mount(position_index: u32, serial: impl Into<String>) -> Self {
        Self {
            position_index,
            tire_serial: Some(serial.into()),
        }
    }

    /// Empty the slot at `index`.
    pub fn clear(position_index: u32) -> Self {
        Self {
            position_index,
            tire_serial: None,
        }
    }
}

/// State a slot moves to when `requested` is applied at `now`.
///
/// `requested` must already be normalized: trimmed, with blank mapped to `None`.
pub fn next_tire_state(
    current: &TireState,
    requested: Option<&str>,
    now: DateTime<Utc>,
) -> TireState {
    match requested {
        None => TireState::EMPTY,
        Some(serial) if current.tire_serial.as_deref() == Some(serial) => current.clone(),
        Some(serial) => TireState {
            tire_serial: Some(serial.to_owned()),
            installed_at: Some(now),
        },
    }
}

/// Set or clear the tire at one slot and return the refreshed position.
///
/// # Errors
/// Index or serial validation failures before any write, then
/// [`FleetError::VehicleNotFound`] and store failures.
pub fn set_tire(
    tx: &mut dyn StoreTx,
    vehicle: VehicleId,
    index: u32,
    serial: Option<&str>,
    limits: &FleetLimits,
    now: DateTime<Utc>,
) -> Result<WheelPosition, FleetError> {
    limits.check_index(index)?;
    let serial = normalize_serial(serial)?;
    let covered = load_covered(tx, vehicle, limits)?;
    let position = covered
        .position(index)
        .ok_or(FleetError::WheelPositionNotFound { vehicle, index })?;
    apply(tx, position.clone(), serial.as_deref(), now)
}

/// Apply a batch of updates all-or-nothing and return every position of the
/// vehicle afterwards.
///
/// Items are validated up front, so one bad item rejects the batch before any
/// write. Items apply in request order; a slot named twice sees the earlier
/// item's serial as its previous value. The caller's transaction provides the
/// rollback when a later write fails.
pub fn bulk_set_tires(
    tx: &mut dyn StoreTx,
    vehicle: VehicleId,
    items: &[TireUpdate],
    limits: &FleetLimits,
    now: DateTime<Utc>,
) -> Result<Vec<WheelPosition>, FleetError> {
    let requests = items
        .iter()
        .map(|item| -> Result<_, FleetError> {
            limits.check_index(item.position_index)?;
            Ok((item.position_index, normalize_serial(item.tire_serial.as_deref())?))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let covered = load_covered(tx, vehicle, limits)?;
    let mut slots: BTreeMap<u32, WheelPosition> = covered
        .wheel_positions
        .into_iter()
        .map(|position| (position.position_index, position))
        .collect();

    for (index, serial) in requests {
        let updated = match slots.remove(&index) {
            Some(position) => apply(tx, position, serial.as_deref(), now)?,
            None => {
                let tire = next_tire_state(&TireState::EMPTY, serial.as_deref(), now);
                let created = tx.insert_wheel_position(vehicle, index, &tire)?;
                debug!(%vehicle, index, "wheel position created by bulk update");
                created
            }
        };
        slots.insert(index, updated);
    }
    Ok(slots.into_values().collect())
}

fn apply(
    tx: &mut dyn StoreTx,
    mut position: WheelPosition,
    requested: Option<&str>,
    now: DateTime<Utc>,
) -> Result<WheelPosition, FleetError> {
    let next = next_tire_state(&position.tire, requested, now);
    if next != position.tire {
        tx.update_tire(position.id, &next)?;
        debug!(
            vehicle = %position.vehicle_id,
            index = position.position_index,
            serial = next.tire_serial.as_deref().unwrap_or("-"),
            "tire changed"
        );
        position.tire = next;
    }
    Ok(position)
}
