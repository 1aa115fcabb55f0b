// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Config service and storage port.

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

/// Storage port for raw config blobs keyed by logical name.
pub trait ConfigStore {
    /// Load a raw blob. Returns [`ConfigError::NotFound`] when missing.
    fn load_raw(&self, key: &str) -> Result<Vec<u8>, ConfigError>;
    /// Persist a raw blob, replacing any previous value.
    fn save_raw(&self, key: &str, data: &[u8]) -> Result<(), ConfigError>;
}

/// Error type for config operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Key not present in store.
    #[error("[CONFIG_NOT_FOUND] not found")]
    NotFound,
    /// Key is empty or would escape the store's namespace.
    #[error("[CONFIG_INVALID_KEY] invalid config key '{0}'")]
    InvalidKey(String),
    /// I/O error while reading or writing.
    #[error("[CONFIG_IO] {0}")]
    Io(#[from] std::io::Error),
    /// Serialization failure.
    #[error("[CONFIG_SERDE] {0}")]
    Serde(#[from] serde_json::Error),
    /// Catch-all.
    #[error("[CONFIG_OTHER] {0}")]
    Other(String),
}

/// Reject keys that are empty or contain anything but `[A-Za-z0-9_-]`.
pub fn check_key(key: &str) -> Result<(), ConfigError> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(ConfigError::InvalidKey(key.to_owned()))
    }
}

/// Serializes values as JSON and delegates storage to a [`ConfigStore`].
pub struct ConfigService<S> {
    store: S,
}

impl<S> ConfigService<S> {
    /// Create a new service over `store`.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Consume the service and return the inner store.
    pub fn into_inner(self) -> S {
        self.store
    }
}

impl<S> ConfigService<S>
where
    S: ConfigStore,
{
    /// Load and deserialize `key`. `Ok(None)` when missing or empty.
    pub fn load<T>(&self, key: &str) -> Result<Option<T>, ConfigError>
    where
        T: DeserializeOwned,
    {
        check_key(key)?;
        match self.store.load_raw(key) {
            Ok(bytes) if bytes.is_empty() => Ok(None),
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(ConfigError::NotFound) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Serialize and persist `value` under `key`.
    pub fn save<T>(&self, key: &str, value: &T) -> Result<(), ConfigError>
    where
        T: Serialize,
    {
        check_key(key)?;
        let data = serde_json::to_vec_pretty(value)?;
        self.store.save_raw(key, &data)
    }

    /// Load `key`, or persist and return `T::default()` when it is missing.
    pub fn load_or_init<T>(&self, key: &str) -> Result<T, ConfigError>
    where
        T: DeserializeOwned + Serialize + Default,
    {
        if let Some(value) = self.load(key)? {
            return Ok(value);
        }
        let value = T::default();
        self.save(key, &value)?;
        Ok(value)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use std::cell::RefCell;
    use std::collections::BTreeMap;

    use serde::Deserialize;

    use super::*;

    /// In-memory [`ConfigStore`] for tests.
    #[derive(Default)]
    pub(crate) struct MapStore {
        pub(crate) blobs: RefCell<BTreeMap<String, Vec<u8>>>,
    }

    impl ConfigStore for MapStore {
        fn load_raw(&self, key: &str) -> Result<Vec<u8>, ConfigError> {
            self.blobs
                .borrow()
                .get(key)
                .cloned()
                .ok_or(ConfigError::NotFound)
        }

        fn save_raw(&self, key: &str, data: &[u8]) -> Result<(), ConfigError> {
            self.blobs.borrow_mut().insert(key.to_owned(), data.to_vec());
            Ok(())
        }
    }

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Knobs {
        depth: u32,
    }

    #[test]
    fn missing_and_empty_read_as_none() {
        let service = ConfigService::new(MapStore::default());
        assert_eq!(service.load::<Knobs>("knobs").unwrap(), None);
        service.store.save_raw("knobs", b"").unwrap();
        assert_eq!(service.load::<Knobs>("knobs").unwrap(), None);
    }

    #[test]
    fn load_or_init_persists_default_once() {
        let service = ConfigService::new(MapStore::default());
        let knobs: Knobs = service.load_or_init("knobs").unwrap();
        assert_eq!(knobs, Knobs::default());
        assert!(service.store.blobs.borrow().contains_key("knobs"));

        service.save("knobs", &Knobs { depth: 7 }).unwrap();
        let knobs: Knobs = service.load_or_init("knobs").unwrap();
        assert_eq!(knobs.depth, 7);
    }

    #[test]
    fn keys_cannot_escape() {
        let service = ConfigService::new(MapStore::default());
        for key in ["", "../etc", "a/b", "a.b"] {
            assert!(matches!(
                service.save(key, &Knobs::default()),
                Err(ConfigError::InvalidKey(_))
            ));
        }
    }

    #[test]
    fn corrupt_blob_is_a_serde_error() {
        let service = ConfigService::new(MapStore::default());
        service.store.save_raw("knobs", b"{not json").unwrap();
        assert!(matches!(
            service.load::<Knobs>("knobs"),
            Err(ConfigError::Serde(_))
        ));
    }
}
