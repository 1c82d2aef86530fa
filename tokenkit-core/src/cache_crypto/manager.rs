//! The cache cipher: seals and opens token-cache entries.
//!
//! One long-lived [`CacheCipher`] is constructed at application or broker
//! startup and passed by reference to consumers; there is no ambient
//! singleton. The broker and standalone flavors differ only in the
//! [`KeyResolutionPolicy`] value supplied at construction.

use std::sync::Arc;

use tracing::debug;

use super::config::CryptoConfig;
use super::crypto;
use super::envelope::{self, EnvelopeKind};
use super::error::{CryptoError, CryptoResult};
use super::events::{CryptoEvent, EventHub, EventSink};
use super::keys::KeyManager;
use super::platform::{KeyMaterialStore, SecureHardwareKeyProvider};
use super::resolver::{self, KeyResolutionPolicy};

/// Seals and opens token-cache entries using envelope encryption.
///
/// Sealing produces a self-describing envelope string; opening classifies
/// the stored value, short-circuits legacy plaintext, and otherwise tries
/// candidate keys in resolver order until one authenticates.
pub struct CacheCipher {
    keys: KeyManager,
    config: Arc<CryptoConfig>,
    events: EventHub,
}

impl std::fmt::Debug for CacheCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheCipher")
            .field("keys", &self.keys)
            .finish_non_exhaustive()
    }
}

impl CacheCipher {
    /// Creates a cipher without an event sink.
    #[must_use]
    pub fn new(
        store: Arc<dyn KeyMaterialStore>,
        hardware: Arc<dyn SecureHardwareKeyProvider>,
        config: Arc<CryptoConfig>,
        policy: KeyResolutionPolicy,
    ) -> Self {
        Self::with_event_sink(store, hardware, config, policy, None)
    }

    /// Creates a cipher that reports engine events to `sink`.
    #[must_use]
    pub fn with_event_sink(
        store: Arc<dyn KeyMaterialStore>,
        hardware: Arc<dyn SecureHardwareKeyProvider>,
        config: Arc<CryptoConfig>,
        policy: KeyResolutionPolicy,
        sink: Option<Arc<dyn EventSink>>,
    ) -> Self {
        let events = EventHub::new(sink);
        let keys = KeyManager::new(store, hardware, Arc::clone(&config), policy, events.clone());
        Self {
            keys,
            config,
            events,
        }
    }

    /// Seals a cache entry into the persisted envelope string.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidInput`] for empty plaintext,
    /// [`CryptoError::KeyGeneration`] if a needed hardware key cannot be
    /// created, and [`CryptoError::EncryptionFailed`] on cipher errors.
    pub fn encrypt(&self, plaintext: &[u8]) -> CryptoResult<String> {
        let pair = self.keys.key_for_encryption()?;
        let (ciphertext, iv, mac) = crypto::encrypt(plaintext, &pair)?;
        Ok(envelope::serialize(pair.version(), &ciphertext, &iv, &mac))
    }

    /// Opens a stored cache value.
    ///
    /// Values that do not classify as envelopes are returned verbatim:
    /// they are legacy plaintext entries written before encryption was
    /// introduced, and no cipher runs for them. For envelopes, candidate
    /// keys are tried strictly in resolver order; per-candidate failures
    /// are expected during key migrations and are swallowed, so only the
    /// exhausted-all-candidates failure surfaces.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::MalformedEnvelope`] for structurally invalid
    /// envelopes and [`CryptoError::AuthenticationFailed`] when no
    /// candidate key authenticates the entry.
    pub fn decrypt(&self, blob: &str) -> CryptoResult<Vec<u8>> {
        let kind = envelope::classify(blob);
        if kind == EnvelopeKind::Unencrypted {
            return Ok(blob.as_bytes().to_vec());
        }

        let parsed = envelope::deserialize(blob)?;
        for source in resolver::candidate_keys(kind, &self.config) {
            let pair = match self.keys.key_for(&source) {
                Ok(pair) => pair,
                Err(err) => {
                    debug!(candidate = ?source, error = %err, "candidate key unavailable");
                    self.events.emit(&CryptoEvent::CandidateRejected {
                        source,
                        reason: err.to_string(),
                    });
                    continue;
                }
            };
            match crypto::decrypt_and_verify(&parsed, &pair) {
                Ok(plaintext) => return Ok(plaintext),
                Err(err) => {
                    debug!(candidate = ?source, error = %err, "candidate key rejected");
                    self.events.emit(&CryptoEvent::CandidateRejected {
                        source,
                        reason: err.to_string(),
                    });
                }
            }
        }
        Err(CryptoError::AuthenticationFailed)
    }

    /// Classifies a stored value without touching any key material.
    #[must_use]
    pub fn classify(&self, blob: &str) -> EnvelopeKind {
        envelope::classify(blob)
    }

    /// Replaces the hardware-backed key with a freshly generated one.
    /// Entries sealed under the previous key become unreadable.
    ///
    /// # Errors
    ///
    /// Returns an error if deletion or regeneration fails.
    pub fn rotate_key(&self) -> CryptoResult<()> {
        self.keys.rotate_hardware_key()
    }

    /// Deletes the hardware-backed key material.
    ///
    /// # Errors
    ///
    /// Returns an error if the store or the hardware provider fails.
    pub fn delete_key(&self) -> CryptoResult<()> {
        self.keys.delete_hardware_key()
    }

    /// Drops the in-memory key cache; the next operation resolves the key
    /// again. Call after mutating the configured keys.
    pub fn invalidate_cached_key(&self) {
        self.keys.invalidate();
    }
}
