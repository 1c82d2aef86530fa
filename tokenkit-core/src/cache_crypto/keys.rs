//! Key lifecycle management.
//!
//! The manager resolves the active encryption key once, caches it in
//! memory for the process lifetime, and owns every interaction with the
//! key-material store and the secure hardware provider. Any sequence that
//! loads, generates, or deletes key material runs under a single mutex so
//! two callers can never race to regenerate and overwrite the wrapped-key
//! blob; cipher operations themselves are lock-free once a key pair is in
//! hand.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, warn};

use super::config::CryptoConfig;
use super::crypto::{CacheKey, CacheKeyPair};
use super::envelope::KeyVersion;
use super::error::{CryptoError, CryptoResult};
use super::events::{CryptoEvent, EventHub};
use super::format::KEY_PAIR_VALIDITY;
use super::platform::{KeyMaterialStore, SecureHardwareKeyProvider};
use super::resolver::{KeyResolutionPolicy, KeySource};

pub(crate) struct KeyManager {
    store: Arc<dyn KeyMaterialStore>,
    hardware: Arc<dyn SecureHardwareKeyProvider>,
    config: Arc<CryptoConfig>,
    policy: KeyResolutionPolicy,
    events: EventHub,
    active: Mutex<Option<CacheKeyPair>>,
}

impl KeyManager {
    pub(crate) fn new(
        store: Arc<dyn KeyMaterialStore>,
        hardware: Arc<dyn SecureHardwareKeyProvider>,
        config: Arc<CryptoConfig>,
        policy: KeyResolutionPolicy,
        events: EventHub,
    ) -> Self {
        Self {
            store,
            hardware,
            config,
            policy,
            events,
            active: Mutex::new(None),
        }
    }

    /// Returns the key new encryptions are sealed under, resolving and
    /// caching it on first use.
    pub(crate) fn key_for_encryption(&self) -> CryptoResult<CacheKeyPair> {
        let mut active = self.lock_active();
        if let Some(pair) = active.as_ref() {
            return Ok(pair.clone());
        }

        // Caller-supplied keys are the legacy/back-compat path and win
        // over the hardware-backed key when registered.
        let configured = match self.policy {
            KeyResolutionPolicy::Standalone => self.config.user_defined_key(),
            KeyResolutionPolicy::Broker => self
                .config
                .broker_legacy_key(self.config.caller_package()),
        };

        let pair = match configured {
            Some(key) => CacheKeyPair::derive(key, KeyVersion::USER_DEFINED),
            None => self.load_or_generate_hardware_key(&mut active)?,
        };

        self.events.emit(&CryptoEvent::KeyLoaded {
            version: pair.version(),
        });
        *active = Some(pair.clone());
        Ok(pair)
    }

    /// Returns the key for a decryption candidate. Never generates new
    /// material: a fresh key could not decrypt anything that exists.
    pub(crate) fn key_for(&self, source: &KeySource) -> CryptoResult<CacheKeyPair> {
        match source {
            KeySource::UserDefined => self
                .config
                .user_defined_key()
                .map(|key| CacheKeyPair::derive(key, KeyVersion::USER_DEFINED))
                .ok_or_else(|| CryptoError::unavailable("no user-defined key configured")),
            KeySource::PeerLegacy(package) => self
                .config
                .broker_legacy_key(package)
                .map(|key| CacheKeyPair::derive(key, KeyVersion::USER_DEFINED))
                .ok_or_else(|| {
                    CryptoError::unavailable(format!("no legacy key registered for '{package}'"))
                }),
            KeySource::HardwareBacked => self.hardware_key_for_decryption(),
        }
    }

    /// Drops the cached key; the next operation resolves it again.
    pub(crate) fn invalidate(&self) {
        *self.lock_active() = None;
        self.events.emit(&CryptoEvent::KeyInvalidated);
    }

    /// Deletes the hardware-backed key material and clears the cache.
    /// Entries sealed under the deleted key become permanently unreadable.
    pub(crate) fn delete_hardware_key(&self) -> CryptoResult<()> {
        let mut active = self.lock_active();
        self.store.delete_wrapped_key()?;
        self.hardware.delete_key_pair()?;
        *active = None;
        self.events.emit(&CryptoEvent::KeyInvalidated);
        Ok(())
    }

    /// Replaces the hardware-backed key with a freshly generated one.
    pub(crate) fn rotate_hardware_key(&self) -> CryptoResult<()> {
        let mut active = self.lock_active();
        self.store.delete_wrapped_key()?;
        self.hardware.delete_key_pair()?;
        *active = None;
        self.events.emit(&CryptoEvent::KeyInvalidated);
        let pair = self.generate_hardware_key()?;
        *active = Some(pair);
        Ok(())
    }

    fn hardware_key_for_decryption(&self) -> CryptoResult<CacheKeyPair> {
        let mut active = self.lock_active();
        if let Some(pair) = active.as_ref() {
            if pair.version() == KeyVersion::HARDWARE_BACKED {
                return Ok(pair.clone());
            }
        }

        let wrapped = self
            .store
            .read_wrapped_key()?
            .ok_or_else(|| CryptoError::unavailable("no wrapped cache key on this device"))?;
        match self.try_unwrap(&wrapped) {
            Ok(bytes) => {
                let pair =
                    CacheKeyPair::derive(CacheKey::from_bytes(bytes)?, KeyVersion::HARDWARE_BACKED);
                self.events.emit(&CryptoEvent::KeyLoaded {
                    version: pair.version(),
                });
                // Cache only when empty: a configured user key cached for
                // encryption must keep winning there.
                if active.is_none() {
                    *active = Some(pair.clone());
                }
                Ok(pair)
            }
            Err(err) => {
                self.discard_stale_wrapped_key(&mut active, &err);
                Err(err)
            }
        }
    }

    /// Loads the wrapped hardware key, or generates a new one when no
    /// usable key exists. Caller holds the `active` lock.
    fn load_or_generate_hardware_key(
        &self,
        active: &mut Option<CacheKeyPair>,
    ) -> CryptoResult<CacheKeyPair> {
        if let Some(wrapped) = self.store.read_wrapped_key()? {
            match self.try_unwrap(&wrapped) {
                Ok(bytes) => {
                    debug!("loaded hardware-backed cache key");
                    let key = CacheKey::from_bytes(bytes)?;
                    return Ok(CacheKeyPair::derive(key, KeyVersion::HARDWARE_BACKED));
                }
                Err(err) => self.discard_stale_wrapped_key(active, &err),
            }
        }
        self.generate_hardware_key()
    }

    fn generate_hardware_key(&self) -> CryptoResult<CacheKeyPair> {
        self.hardware
            .generate_key_pair(KEY_PAIR_VALIDITY)
            .map_err(|err| CryptoError::key_generation(err.to_string()))?;
        let key = CacheKey::generate();
        let wrapped = self
            .hardware
            .wrap_key(key.as_bytes())
            .map_err(|err| CryptoError::key_generation(err.to_string()))?;
        self.store.write_wrapped_key(&wrapped)?;
        debug!("generated new hardware-backed cache key");
        self.events.emit(&CryptoEvent::KeyGenerated);
        Ok(CacheKeyPair::derive(key, KeyVersion::HARDWARE_BACKED))
    }

    fn try_unwrap(&self, wrapped: &[u8]) -> CryptoResult<Vec<u8>> {
        if !self.hardware.key_pair_exists()? {
            return Err(CryptoError::hardware("wrapping key pair is gone"));
        }
        self.hardware.unwrap_key(wrapped)
    }

    /// The wrapped blob no longer unwraps (hardware key lost, e.g. after a
    /// lock-screen change). The blob is unrecoverable; delete it so the
    /// next encryption generates a fresh key.
    fn discard_stale_wrapped_key(&self, active: &mut Option<CacheKeyPair>, err: &CryptoError) {
        warn!(error = %err, "discarding stale wrapped cache key");
        *active = None;
        if let Err(delete_err) = self.store.delete_wrapped_key() {
            warn!(error = %delete_err, "failed to delete stale wrapped cache key");
        }
        self.events.emit(&CryptoEvent::WrappedKeyDiscarded {
            reason: err.to_string(),
        });
    }

    fn lock_active(&self) -> MutexGuard<'_, Option<CacheKeyPair>> {
        self.active
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl std::fmt::Debug for KeyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyManager")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache_crypto::events::EventSink;
    use crate::cache_crypto::platform::{MemoryKeyStore, SoftwareKeyProvider};

    struct Recorder(std::sync::Mutex<Vec<String>>);

    impl EventSink for Recorder {
        fn on_event(&self, event: &CryptoEvent) {
            self.0
                .lock()
                .expect("recorder lock")
                .push(format!("{event:?}"));
        }
    }

    struct Fixture {
        store: Arc<MemoryKeyStore>,
        hardware: Arc<SoftwareKeyProvider>,
        recorder: Arc<Recorder>,
        manager: KeyManager,
    }

    fn fixture_with(config: CryptoConfig, policy: KeyResolutionPolicy) -> Fixture {
        let store = Arc::new(MemoryKeyStore::new());
        let hardware = Arc::new(SoftwareKeyProvider::new());
        let recorder = Arc::new(Recorder(std::sync::Mutex::new(Vec::new())));
        let manager = KeyManager::new(
            Arc::clone(&store) as Arc<dyn KeyMaterialStore>,
            Arc::clone(&hardware) as Arc<dyn SecureHardwareKeyProvider>,
            Arc::new(config),
            policy,
            EventHub::new(Some(Arc::clone(&recorder) as Arc<dyn EventSink>)),
        );
        Fixture {
            store,
            hardware,
            recorder,
            manager,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(
            CryptoConfig::new("com.example.app"),
            KeyResolutionPolicy::Standalone,
        )
    }

    fn events(fixture: &Fixture) -> Vec<String> {
        fixture.recorder.0.lock().expect("recorder lock").clone()
    }

    #[test]
    fn test_generates_hardware_key_on_first_use() {
        let fixture = fixture();
        assert!(!fixture.hardware.key_pair_exists().expect("exists"));

        let pair = fixture.manager.key_for_encryption().expect("resolve");
        assert_eq!(pair.version(), KeyVersion::HARDWARE_BACKED);
        assert!(fixture.hardware.key_pair_exists().expect("exists"));
        assert!(fixture.store.read_wrapped_key().expect("read").is_some());
        assert!(events(&fixture).iter().any(|e| e.contains("KeyGenerated")));
    }

    #[test]
    fn test_cached_key_skips_store_and_hardware() {
        let fixture = fixture();
        fixture.manager.key_for_encryption().expect("resolve");

        // Remove the persisted wrap; the cached key must keep serving and
        // nothing may be regenerated behind our back.
        fixture.store.delete_wrapped_key().expect("delete");
        let pair = fixture.manager.key_for_encryption().expect("resolve");
        assert_eq!(pair.version(), KeyVersion::HARDWARE_BACKED);
        assert!(fixture.store.read_wrapped_key().expect("read").is_none());
    }

    #[test]
    fn test_standalone_prefers_user_defined_key() {
        let config = CryptoConfig::new("com.example.app");
        config.set_user_defined_key(CacheKey::generate());
        let fixture = fixture_with(config, KeyResolutionPolicy::Standalone);

        let pair = fixture.manager.key_for_encryption().expect("resolve");
        assert_eq!(pair.version(), KeyVersion::USER_DEFINED);
        assert!(fixture.store.read_wrapped_key().expect("read").is_none());
    }

    #[test]
    fn test_broker_prefers_own_legacy_key() {
        let config = CryptoConfig::new("com.example.broker.one");
        config.set_broker_legacy_key("com.example.broker.one", CacheKey::generate());
        let fixture = fixture_with(config, KeyResolutionPolicy::Broker);

        let pair = fixture.manager.key_for_encryption().expect("resolve");
        assert_eq!(pair.version(), KeyVersion::USER_DEFINED);
    }

    #[test]
    fn test_broker_without_legacy_key_falls_back_to_hardware() {
        let config = CryptoConfig::new("com.example.broker.one");
        let fixture = fixture_with(config, KeyResolutionPolicy::Broker);

        let pair = fixture.manager.key_for_encryption().expect("resolve");
        assert_eq!(pair.version(), KeyVersion::HARDWARE_BACKED);
    }

    #[test]
    fn test_stale_wrap_is_discarded_and_regenerated() {
        let fixture = fixture();
        fixture.manager.key_for_encryption().expect("resolve");
        let old_blob = fixture
            .store
            .read_wrapped_key()
            .expect("read")
            .expect("present");

        fixture.hardware.reset_key_pair();
        fixture.manager.invalidate();

        let pair = fixture.manager.key_for_encryption().expect("resolve");
        assert_eq!(pair.version(), KeyVersion::HARDWARE_BACKED);
        let new_blob = fixture
            .store
            .read_wrapped_key()
            .expect("read")
            .expect("present");
        assert_ne!(old_blob, new_blob);
        assert!(events(&fixture)
            .iter()
            .any(|e| e.contains("WrappedKeyDiscarded")));
    }

    #[test]
    fn test_decrypt_candidate_without_user_key_is_unavailable() {
        let fixture = fixture();
        match fixture.manager.key_for(&KeySource::UserDefined) {
            Err(CryptoError::KeyUnavailable(_)) => {}
            Err(err) => panic!("unexpected error: {err}"),
            Ok(_) => panic!("expected error"),
        }
    }

    #[test]
    fn test_decrypt_without_wrapped_blob_is_unavailable() {
        let fixture = fixture();
        match fixture.manager.key_for(&KeySource::HardwareBacked) {
            Err(CryptoError::KeyUnavailable(_)) => {}
            Err(err) => panic!("unexpected error: {err}"),
            Ok(_) => panic!("expected error"),
        }
    }

    #[test]
    fn test_unwrap_failure_during_decrypt_deletes_blob() {
        let fixture = fixture();
        fixture.manager.key_for_encryption().expect("resolve");
        fixture.hardware.reset_key_pair();
        fixture.manager.invalidate();

        match fixture.manager.key_for(&KeySource::HardwareBacked) {
            Err(CryptoError::Hardware(_)) => {}
            Err(err) => panic!("unexpected error: {err}"),
            Ok(_) => panic!("expected error"),
        }
        assert!(fixture.store.read_wrapped_key().expect("read").is_none());
    }

    #[test]
    fn test_delete_hardware_key_clears_everything() {
        let fixture = fixture();
        fixture.manager.key_for_encryption().expect("resolve");

        fixture.manager.delete_hardware_key().expect("delete");
        assert!(fixture.store.read_wrapped_key().expect("read").is_none());
        assert!(!fixture.hardware.key_pair_exists().expect("exists"));
    }

    #[test]
    fn test_rotate_produces_a_new_key() {
        let fixture = fixture();
        fixture.manager.key_for_encryption().expect("resolve");
        let old_blob = fixture
            .store
            .read_wrapped_key()
            .expect("read")
            .expect("present");

        fixture.manager.rotate_hardware_key().expect("rotate");
        let new_blob = fixture
            .store
            .read_wrapped_key()
            .expect("read")
            .expect("present");
        assert_ne!(old_blob, new_blob);
    }
}
