// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Fleet records: vehicles, wheel positions, users, and the input rules that
//! guard their text fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::FleetError;

/// Minimum license plate length after trimming.
pub const PLATE_MIN_LEN: usize = 5;
/// Maximum license plate length after trimming.
pub const PLATE_MAX_LEN: usize = 32;
/// Maximum vehicle description length.
pub const DESCRIPTION_MAX_LEN: usize = 255;
/// Maximum tire serial length.
pub const SERIAL_MAX_LEN: usize = 64;
/// Username length bounds after trimming.
pub const USERNAME_LEN: (usize, usize) = (3, 50);
/// Password length bounds after trimming.
pub const PASSWORD_LEN: (usize, usize) = (6, 128);

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

record_id!(
    /// Store-assigned vehicle identifier.
    VehicleId
);
record_id!(
    /// Store-assigned wheel position identifier.
    WheelPositionId
);
record_id!(
    /// Store-assigned user identifier.
    UserId
);

/// A registered vehicle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vehicle {
    /// Immutable identifier.
    pub id: VehicleId,
    /// Unique plate, trimmed.
    pub license_plate: String,
    /// Free-form note.
    pub description: Option<String>,
}

/// Tire currently mounted on a wheel position.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TireState {
    /// Serial of the mounted tire; absent when the slot is empty.
    pub tire_serial: Option<String>,
    /// When the current tire was mounted; absent exactly when the serial is.
    pub installed_at: Option<DateTime<Utc>>,
}

impl TireState {
    /// A slot with no tire mounted.
    pub const EMPTY: Self = Self {
        tire_serial: None,
        installed_at: None,
    };
}

/// One physical tire-mounting slot on a vehicle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WheelPosition {
    /// Row identifier.
    pub id: WheelPositionId,
    /// Owning vehicle.
    pub vehicle_id: VehicleId,
    /// Slot number, `1..=wheel_positions`.
    pub position_index: u32,
    /// Mounted tire.
    #[serde(flatten)]
    pub tire: TireState,
}

/// A vehicle together with its complete, index-ordered set of wheel positions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoveredVehicle {
    /// The vehicle record.
    #[serde(flatten)]
    pub vehicle: Vehicle,
    /// Exactly one position per slot, ordered by index.
    pub wheel_positions: Vec<WheelPosition>,
}

impl CoveredVehicle {
    /// Look up a position by slot number.
    pub fn position(&self, index: u32) -> Option<&WheelPosition> {
        self.wheel_positions
            .iter()
            .find(|position| position.position_index == index)
    }

    /// Slot numbers in stored order.
    pub fn indices(&self) -> Vec<u32> {
        self.wheel_positions
            .iter()
            .map(|position| position.position_index)
            .collect()
    }
}

/// A user account. Only used as the authenticated principal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct User {
    /// Row identifier.
    pub id: UserId,
    /// Unique login name.
    pub username: String,
    /// Encoded password digest.
    pub hashed_password: String,
    /// Inactive users cannot authenticate.
    pub is_active: bool,
    /// Privilege flag.
    pub is_superuser: bool,
}

/// Public view of a user account, without the password digest.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Account {
    /// Row identifier.
    pub id: UserId,
    /// Unique login name.
    pub username: String,
    /// Whether the account may log in.
    pub is_active: bool,
    /// Privilege flag.
    pub is_superuser: bool,
}

impl From<&User> for Account {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            is_active: user.is_active,
            is_superuser: user.is_superuser,
        }
    }
}

/// Fields needed to insert a user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewUser {
    /// Unique login name.
    pub username: String,
    /// Encoded password digest.
    pub hashed_password: String,
}

/// Explicit "field present + value" wrapper for partial updates.
///
/// `Unset` leaves the stored value alone; `Set` replaces it. Deserializes any
/// present value (including `null` for optional fields) as `Set`, so pair it
/// with `#[serde(default)]`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Field<T> {
    /// Not supplied by the caller.
    #[default]
    Unset,
    /// Supplied by the caller.
    Set(T),
}

impl<T> Field<T> {
    /// Borrow the supplied value, if any.
    pub fn as_set(&self) -> Option<&T> {
        match self {
            Self::Unset => None,
            Self::Set(value) => Some(value),
        }
    }

    /// Whether the caller supplied this field.
    pub fn is_set(&self) -> bool {
        matches!(self, Self::Set(_))
    }
}

impl<'de, T> Deserialize<'de> for Field<T>
where
    T: Deserialize<'de>,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        T::deserialize(deserializer).map(Field::Set)
    }
}

/// Trim and length-check a license plate.
pub fn normalize_plate(plate: &str) -> Result<String, FleetError> {
    let plate = plate.trim();
    let len = plate.chars().count();
    if !(PLATE_MIN_LEN..=PLATE_MAX_LEN).contains(&len) {
        return Err(FleetError::validation(
            "license_plate",
            format!("must be {PLATE_MIN_LEN}-{PLATE_MAX_LEN} characters, got {len}"),
        ));
    }
    Ok(plate.to_owned())
}

/// Length-check an optional description. Stored verbatim.
pub fn check_description(description: Option<&str>) -> Result<Option<String>, FleetError> {
    match description {
        Some(text) if text.chars().count() > DESCRIPTION_MAX_LEN => Err(FleetError::validation(
            "description",
            format!("must be at most {DESCRIPTION_MAX_LEN} characters"),
        )),
        other => Ok(other.map(str::to_owned)),
    }
}

/// Trim a requested tire serial; blank means "no tire".
pub fn normalize_serial(serial: Option<&str>) -> Result<Option<String>, FleetError> {
    let Some(serial) = serial.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    if serial.chars().count() > SERIAL_MAX_LEN {
        return Err(FleetError::validation(
            "tire_serial",
            format!("must be at most {SERIAL_MAX_LEN} characters"),
        ));
    }
    Ok(Some(serial.to_owned()))
}

/// Trim and length-check a username.
pub fn normalize_username(username: &str) -> Result<String, FleetError> {
    bounded("username", username, USERNAME_LEN)
}

/// Trim and length-check a password.
pub fn normalize_password(password: &str) -> Result<String, FleetError> {
    bounded("password", password, PASSWORD_LEN)
}

fn bounded(
    field: &'static str,
    value: &str,
    (min, max): (usize, usize),
) -> Result<String, FleetError> {
    let value = value.trim();
    let len = value.chars().count();
    if len < min || len > max {
        return Err(FleetError::validation(
            field,
            format!("must be {min}-{max} characters"),
        ));
    }
    Ok(value.to_owned())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn plate_is_trimmed_and_bounded() {
        assert_eq!(normalize_plate("  LT 123 CM ").unwrap(), "LT 123 CM");
        assert!(normalize_plate("AB12").is_err());
        assert!(normalize_plate(&"X".repeat(33)).is_err());
        assert!(normalize_plate(&"X".repeat(32)).is_ok());
    }

    #[test]
    fn blank_serial_means_no_tire() {
        assert_eq!(normalize_serial(None).unwrap(), None);
        assert_eq!(normalize_serial(Some("")).unwrap(), None);
        assert_eq!(normalize_serial(Some("   ")).unwrap(), None);
        assert_eq!(
            normalize_serial(Some(" TIRE001 ")).unwrap().as_deref(),
            Some("TIRE001")
        );
        assert!(normalize_serial(Some(&"9".repeat(65))).is_err());
    }

    #[test]
    fn description_limit() {
        assert!(check_description(Some(&"d".repeat(255))).is_ok());
        assert!(check_description(Some(&"d".repeat(256))).is_err());
        assert_eq!(check_description(None).unwrap(), None);
    }

    #[derive(Deserialize)]
    struct Patch {
        #[serde(default)]
        description: Field<Option<String>>,
        #[serde(default)]
        license_plate: Field<String>,
    }

    #[test]
    fn field_distinguishes_missing_from_null() {
        let patch: Patch = serde_json::from_str(r#"{"description": null}"#).unwrap();
        assert_eq!(patch.description, Field::Set(None));
        assert_eq!(patch.license_plate, Field::Unset);

        let patch: Patch = serde_json::from_str("{}").unwrap();
        assert!(!patch.description.is_set());
    }

    #[test]
    fn wheel_position_serializes_flat() {
        let position = WheelPosition {
            id: WheelPositionId(7),
            vehicle_id: VehicleId(1),
            position_index: 3,
            tire: TireState {
                tire_serial: Some("TIRE-A".into()),
                installed_at: None,
            },
        };
        let json = serde_json::to_value(&position).unwrap();
        assert_eq!(json["tire_serial"], "TIRE-A");
        assert_eq!(json["position_index"], 3);
        assert!(json["installed_at"].is_null());
    }
}
