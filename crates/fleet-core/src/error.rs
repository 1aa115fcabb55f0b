// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Error taxonomy for fleet operations.

use thiserror::Error;

use crate::model::VehicleId;
use crate::store::{Constraint, StoreError};

/// Errors surfaced by registry, reconciliation, tire assignment and auth.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FleetError {
    /// No vehicle with this id.
    #[error("[FLEET_VEHICLE_NOT_FOUND] vehicle {0} not found")]
    VehicleNotFound(VehicleId),

    /// The vehicle exists but has no row for this slot.
    #[error("[FLEET_WHEEL_POSITION_NOT_FOUND] vehicle {vehicle} has no wheel position {index}")]
    WheelPositionNotFound {
        /// Vehicle that was searched.
        vehicle: VehicleId,
        /// Missing slot number.
        index: u32,
    },

    /// Another vehicle already carries this plate.
    #[error("[FLEET_DUPLICATE_PLATE] vehicle with plate '{0}' already exists")]
    DuplicatePlate(String),

    /// The fleet is full.
    #[error("[FLEET_CAPACITY_EXCEEDED] vehicle limit of {limit} reached")]
    CapacityExceeded {
        /// Configured ceiling.
        limit: usize,
    },

    /// Slot number outside `1..=max`.
    #[error("[FLEET_INVALID_POSITION] wheel position {index} outside 1..={max}")]
    InvalidPositionIndex {
        /// Rejected slot number.
        index: u32,
        /// Configured slot count.
        max: u32,
    },

    /// A text or numeric input failed its bounds.
    #[error("[FLEET_VALIDATION] {field}: {reason}")]
    Validation {
        /// Offending input field.
        field: &'static str,
        /// Human-readable rule.
        reason: String,
    },

    /// Plate changes are disabled by policy.
    #[error("[FLEET_PLATE_IMMUTABLE] license plate of vehicle {0} cannot be changed")]
    PlateImmutable(VehicleId),

    /// Another user already has this name.
    #[error("[FLEET_DUPLICATE_USERNAME] user '{0}' already exists")]
    DuplicateUsername(String),

    /// A uniqueness race the caller may retry after reloading.
    #[error("[FLEET_CONSTRAINT_RACE] concurrent write hit {constraint}; reload and retry")]
    ConstraintViolation {
        /// Constraint that fired.
        constraint: Constraint,
    },

    /// Missing, malformed, expired or forged credential.
    #[error("[FLEET_UNAUTHENTICATED] could not validate credentials")]
    Unauthenticated,

    /// Credential is valid but the account is disabled.
    #[error("[FLEET_INACTIVE] inactive user")]
    Inactive,

    /// Backend failure.
    #[error(transparent)]
    Store(StoreError),
}

impl FleetError {
    pub(crate) fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }

    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ConstraintViolation { .. })
    }

    /// Whether the request was rejected before touching the store.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::DuplicatePlate(_)
                | Self::CapacityExceeded { .. }
                | Self::InvalidPositionIndex { .. }
                | Self::Validation { .. }
                | Self::PlateImmutable(_)
                | Self::DuplicateUsername(_)
        )
    }
}

impl From<StoreError> for FleetError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ConstraintViolation { constraint } => {
                Self::ConstraintViolation { constraint }
            }
            other => Self::Store(other),
        }
    }
}
