//! Injected configuration for the encryption engine.
//!
//! The hosting application constructs a [`CryptoConfig`] once at startup
//! and hands it to the engine; there is no ambient global settings object.
//! Legacy secret keys may be registered and cleared at runtime, so those
//! slots are lock-guarded rather than bare fields.

use std::collections::HashMap;
use std::sync::RwLock;

use super::crypto::CacheKey;

/// Package identities of the two cooperating broker applications.
///
/// During app-to-app migration windows each broker may hold the other's
/// legacy cache key, distributed out-of-band.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerIdentities {
    primary: String,
    secondary: String,
}

impl BrokerIdentities {
    /// Creates the cooperating pair.
    pub fn new<P: Into<String>, S: Into<String>>(primary: P, secondary: S) -> Self {
        Self {
            primary: primary.into(),
            secondary: secondary.into(),
        }
    }

    /// Returns the counterpart of `package`, if `package` is one of the pair.
    #[must_use]
    pub fn peer_of(&self, package: &str) -> Option<&str> {
        if package == self.primary {
            Some(&self.secondary)
        } else if package == self.secondary {
            Some(&self.primary)
        } else {
            None
        }
    }
}

/// Configuration injected into the encryption engine at construction.
pub struct CryptoConfig {
    caller_package: String,
    brokers: Option<BrokerIdentities>,
    user_defined_key: RwLock<Option<CacheKey>>,
    broker_legacy_keys: RwLock<HashMap<String, CacheKey>>,
}

impl CryptoConfig {
    /// Creates a configuration for the application identified by
    /// `caller_package`.
    pub fn new<S: Into<String>>(caller_package: S) -> Self {
        Self {
            caller_package: caller_package.into(),
            brokers: None,
            user_defined_key: RwLock::new(None),
            broker_legacy_keys: RwLock::new(HashMap::new()),
        }
    }

    /// Declares the cooperating broker identity pair.
    #[must_use]
    pub fn with_brokers(mut self, brokers: BrokerIdentities) -> Self {
        self.brokers = Some(brokers);
        self
    }

    /// Returns the invoking application's package identity.
    #[must_use]
    pub fn caller_package(&self) -> &str {
        &self.caller_package
    }

    /// Returns the cooperating broker identities, if declared.
    #[must_use]
    pub const fn brokers(&self) -> Option<&BrokerIdentities> {
        self.brokers.as_ref()
    }

    /// Registers the caller-supplied raw cache key (legacy path).
    pub fn set_user_defined_key(&self, key: CacheKey) {
        *self.lock_user_key_mut() = Some(key);
    }

    /// Removes the caller-supplied raw cache key.
    pub fn clear_user_defined_key(&self) {
        *self.lock_user_key_mut() = None;
    }

    /// Returns a copy of the caller-supplied raw cache key, if registered.
    #[must_use]
    pub fn user_defined_key(&self) -> Option<CacheKey> {
        self.user_defined_key
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Registers the legacy cache key held for a broker package.
    pub fn set_broker_legacy_key<S: Into<String>>(&self, package: S, key: CacheKey) {
        self.lock_broker_keys_mut().insert(package.into(), key);
    }

    /// Removes all registered broker legacy keys.
    pub fn clear_broker_legacy_keys(&self) {
        self.lock_broker_keys_mut().clear();
    }

    /// Returns a copy of the legacy key registered for `package`.
    #[must_use]
    pub fn broker_legacy_key(&self, package: &str) -> Option<CacheKey> {
        self.broker_legacy_keys
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(package)
            .cloned()
    }

    fn lock_user_key_mut(&self) -> std::sync::RwLockWriteGuard<'_, Option<CacheKey>> {
        self.user_defined_key
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn lock_broker_keys_mut(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, CacheKey>> {
        self.broker_legacy_keys
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl std::fmt::Debug for CryptoConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptoConfig")
            .field("caller_package", &self.caller_package)
            .field("brokers", &self.brokers)
            .finish_non_exhaustive()
    }
}
