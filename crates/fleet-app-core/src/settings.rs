// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Service settings persisted through the config port.

use std::path::PathBuf;
use std::time::Duration;

use fleet_core::limits::{MAX_VEHICLES, WHEEL_POSITIONS};
use fleet_core::{FleetError, FleetLimits, PlatePolicy, TokenSigner};
use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, ConfigService, ConfigStore};

/// Config key the settings live under.
pub const SETTINGS_KEY: &str = "fleet-settings";
/// Secret shipped as a placeholder; deployments must override it.
pub const DEFAULT_SECRET_KEY: &str = "change-me-please";

/// Everything the service needs at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// SQLite database file.
    pub database_path: PathBuf,
    /// Wheel slots per vehicle.
    pub wheel_positions: u32,
    /// Fleet capacity ceiling.
    pub max_vehicles: usize,
    /// Whether plates may change after registration.
    pub plate_policy: PlatePolicy,
    /// Longest wait for a locked database, in milliseconds.
    pub busy_timeout_ms: u64,
    /// Bearer token lifetime, in minutes.
    pub token_ttl_minutes: i64,
    /// Token signing secret.
    pub secret_key: String,
    /// Account created on first start.
    pub default_admin_username: String,
    /// Password of the seeded account.
    pub default_admin_password: String,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("tire_management.db"),
            wheel_positions: WHEEL_POSITIONS,
            max_vehicles: MAX_VEHICLES,
            plate_policy: PlatePolicy::default(),
            busy_timeout_ms: 5000,
            token_ttl_minutes: fleet_core::auth::TOKEN_TTL_MINUTES,
            secret_key: DEFAULT_SECRET_KEY.to_owned(),
            default_admin_username: "admin".to_owned(),
            default_admin_password: "admin123".to_owned(),
        }
    }
}

impl ServiceSettings {
    /// Load from `config`, writing defaults on first use.
    pub fn load_or_init<S: ConfigStore>(config: &ConfigService<S>) -> Result<Self, ConfigError> {
        config.load_or_init(SETTINGS_KEY)
    }

    /// Validated fleet limits.
    pub fn limits(&self) -> Result<FleetLimits, FleetError> {
        Ok(FleetLimits::new(self.wheel_positions, self.max_vehicles)?
            .with_plate_policy(self.plate_policy))
    }

    /// Token signer for the configured secret and lifetime.
    ///
    /// # Errors
    /// [`FleetError::Validation`] when `token_ttl_minutes` is outside
    /// `1..=MAX_TOKEN_TTL_MINUTES`.
    pub fn token_signer(&self) -> Result<TokenSigner, FleetError> {
        TokenSigner::with_ttl_minutes(&self.secret_key, self.token_ttl_minutes)
    }

    /// Busy timeout as a [`Duration`].
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    /// Whether the placeholder secret is still in use.
    pub fn uses_default_secret(&self) -> bool {
        self.secret_key == DEFAULT_SECRET_KEY
    }

    /// Point at the database named by a `sqlite://` URL or a bare path.
    pub fn set_database_url(&mut self, url: &str) {
        let path = url
            .strip_prefix("sqlite:///")
            .or_else(|| url.strip_prefix("sqlite://"))
            .unwrap_or(url);
        self.database_path = PathBuf::from(path);
    }
}
