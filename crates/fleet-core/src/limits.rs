// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Fleet-wide knobs: slot count, capacity ceiling and plate policy.

use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use crate::error::FleetError;

/// Default number of wheel slots per vehicle.
pub const WHEEL_POSITIONS: u32 = 20;
/// Default fleet capacity.
pub const MAX_VEHICLES: usize = 1000;
/// Upper bound accepted for the slot count.
pub const MAX_WHEEL_POSITIONS: u32 = 64;

/// Whether a registered vehicle may change its plate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlatePolicy {
    /// Plate is fixed at registration.
    #[default]
    Immutable,
    /// Plate may be replaced through a partial update.
    Mutable,
}

/// Validated limits shared by every fleet component.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FleetLimits {
    wheel_positions: u32,
    max_vehicles: usize,
    plate_policy: PlatePolicy,
}

impl FleetLimits {
    /// Build limits, rejecting a slot count outside `1..=64` or a zero capacity.
    pub fn new(wheel_positions: u32, max_vehicles: usize) -> Result<Self, FleetError> {
        if !(1..=MAX_WHEEL_POSITIONS).contains(&wheel_positions) {
            return Err(FleetError::validation(
                "wheel_positions",
                format!("must be 1-{MAX_WHEEL_POSITIONS}, got {wheel_positions}"),
            ));
        }
        if max_vehicles == 0 {
            return Err(FleetError::validation("max_vehicles", "must be at least 1"));
        }
        Ok(Self {
            wheel_positions,
            max_vehicles,
            plate_policy: PlatePolicy::default(),
        })
    }

    /// Replace the plate policy.
    pub fn with_plate_policy(mut self, plate_policy: PlatePolicy) -> Self {
        self.plate_policy = plate_policy;
        self
    }

    /// Slots per vehicle.
    pub fn wheel_positions(&self) -> u32 {
        self.wheel_positions
    }

    /// Fleet capacity ceiling.
    pub fn max_vehicles(&self) -> usize {
        self.max_vehicles
    }

    /// Plate mutability.
    pub fn plate_policy(&self) -> PlatePolicy {
        self.plate_policy
    }

    /// Every valid slot number, ascending.
    pub fn indices(&self) -> RangeInclusive<u32> {
        1..=self.wheel_positions
    }

    /// Whether `index` addresses a slot.
    pub fn contains(&self, index: u32) -> bool {
        self.indices().contains(&index)
    }

    /// Reject an out-of-range slot number.
    pub fn check_index(&self, index: u32) -> Result<(), FleetError> {
        if self.contains(index) {
            Ok(())
        } else {
            Err(FleetError::InvalidPositionIndex {
                index,
                max: self.wheel_positions,
            })
        }
    }
}

impl Default for FleetLimits {
    fn default() -> Self {
        Self {
            wheel_positions: WHEEL_POSITIONS,
            max_vehicles: MAX_VEHICLES,
            plate_policy: PlatePolicy::default(),
        }
    }
}
