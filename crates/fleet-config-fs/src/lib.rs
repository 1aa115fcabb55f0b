// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Filesystem-backed `ConfigStore` (uses the platform config dir).

use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use fleet_app_core::config::{check_key, ConfigError, ConfigStore};

/// Store configs as JSON files under one directory.
#[derive(Debug, Clone)]
pub struct FsConfigStore {
    base: PathBuf,
}

impl FsConfigStore {
    /// Create a store rooted at the user config directory (e.g., `~/.config/fleettires`).
    pub fn new() -> Result<Self, ConfigError> {
        let proj = ProjectDirs::from("dev", "flyingrobots", "FleetTires")
            .ok_or_else(|| ConfigError::Other("could not resolve config dir".into()))?;
        Self::at(proj.config_dir())
    }

    /// Create a store rooted at `base`, creating the directory if needed.
    pub fn at(base: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let base = base.as_ref().to_path_buf();
        fs::create_dir_all(&base)?;
        Ok(Self { base })
    }

    /// Directory holding the JSON files.
    pub fn base(&self) -> &Path {
        &self.base
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, ConfigError> {
        check_key(key)?;
        Ok(self.base.join(format!("{key}.json")))
    }
}

impl ConfigStore for FsConfigStore {
    fn load_raw(&self, key: &str) -> Result<Vec<u8>, ConfigError> {
        match fs::read(self.path_for(key)?) {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(ConfigError::NotFound),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn save_raw(&self, key: &str, data: &[u8]) -> Result<(), ConfigError> {
        let path = self.path_for(key)?;
        // Write then rename so a crash never leaves a half-written file.
        let staged = path.with_extension("json.tmp");
        fs::write(&staged, data)?;
        fs::rename(staged, path)?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use fleet_app_core::config::ConfigService;
    use fleet_app_core::ServiceSettings;

    use super::*;

    #[test]
    fn missing_key_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsConfigStore::at(dir.path()).unwrap();
        assert!(matches!(store.load_raw("absent"), Err(ConfigError::NotFound)));
    }

    #[test]
    fn settings_round_trip_through_files() {
        let dir = tempfile::tempdir().unwrap();
        let config = ConfigService::new(FsConfigStore::at(dir.path().join("nested")).unwrap());

        let mut settings = ServiceSettings::load_or_init(&config).unwrap();
        assert!(dir.path().join("nested/fleet-settings.json").exists());

        settings.max_vehicles = 12;
        config.save(fleet_app_core::settings::SETTINGS_KEY, &settings).unwrap();
        let reloaded = ServiceSettings::load_or_init(&config).unwrap();
        assert_eq!(reloaded.max_vehicles, 12);
    }

    #[test]
    fn keys_stay_inside_the_base() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsConfigStore::at(dir.path()).unwrap();
        assert!(matches!(
            store.save_raw("../escape", b"{}"),
            Err(ConfigError::InvalidKey(_))
        ));
    }
}
