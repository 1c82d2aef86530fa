//! In-memory implementations of platform traits for testing.
//!
//! These implementations are NOT secure for production use. They model
//! the contracts the engine relies on — in particular that blobs wrapped
//! under a lost key pair fail to unwrap — without touching real secure
//! hardware.

use std::sync::RwLock;
use std::time::Duration;

use hmac::{Hmac, Mac};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use super::{KeyMaterialStore, SecureHardwareKeyProvider};
use crate::cache_crypto::error::{CryptoError, CryptoResult};

type HmacSha256 = Hmac<Sha256>;

const WRAP_TAG_SIZE: usize = 32;

/// In-memory wrapped-key store backed by an `RwLock`ed slot.
pub struct MemoryKeyStore {
    blob: RwLock<Option<Vec<u8>>>,
}

impl MemoryKeyStore {
    /// Creates an empty store.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            blob: RwLock::new(None),
        }
    }
}

impl Default for MemoryKeyStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyMaterialStore for MemoryKeyStore {
    fn read_wrapped_key(&self) -> CryptoResult<Option<Vec<u8>>> {
        Ok(self
            .blob
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone())
    }

    fn write_wrapped_key(&self, bytes: &[u8]) -> CryptoResult<()> {
        *self
            .blob
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(bytes.to_vec());
        Ok(())
    }

    fn delete_wrapped_key(&self) -> CryptoResult<()> {
        *self
            .blob
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = None;
        Ok(())
    }
}

/// In-memory stand-in for the secure hardware provider.
///
/// **FOR TESTING ONLY** — the "key pair" is a random 32-byte wrapping
/// secret, and wrapping is an authenticated XOR keystream: the output is
/// `HMAC-SHA256(secret, masked) ‖ masked`. Unwrapping a blob produced
/// under a different secret fails tag verification, which is exactly the
/// failure mode of real hardware after a keystore reset.
pub struct SoftwareKeyProvider {
    wrapping_secret: RwLock<Option<[u8; 32]>>,
}

impl SoftwareKeyProvider {
    /// Creates a provider with no key pair.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            wrapping_secret: RwLock::new(None),
        }
    }

    /// Replaces the key pair with a fresh one without going through
    /// [`SecureHardwareKeyProvider::generate_key_pair`], simulating
    /// hardware key loss (e.g. a lock-screen change resetting the
    /// keystore). Previously wrapped blobs stop unwrapping.
    pub fn reset_key_pair(&self) {
        *self
            .wrapping_secret
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(random_secret());
    }

    fn secret(&self) -> CryptoResult<[u8; 32]> {
        self.wrapping_secret
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .ok_or_else(|| CryptoError::hardware("no wrapping key pair"))
    }
}

impl Default for SoftwareKeyProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn random_secret() -> [u8; 32] {
    let mut secret = [0u8; 32];
    OsRng.fill_bytes(&mut secret);
    secret
}

fn keystream(secret: &[u8; 32], len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(len + 32);
    let mut counter = 0u64;
    while out.len() < len {
        let mut hasher = Sha256::new();
        hasher.update(secret);
        hasher.update(counter.to_le_bytes());
        out.extend_from_slice(&hasher.finalize());
        counter += 1;
    }
    out.truncate(len);
    out
}

fn wrap_tag(secret: &[u8; 32], masked: &[u8]) -> [u8; WRAP_TAG_SIZE] {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret)
        .expect("HMAC-SHA256 accepts any key length");
    mac.update(masked);
    let mut out = [0u8; WRAP_TAG_SIZE];
    out.copy_from_slice(&mac.finalize().into_bytes());
    out
}

impl SecureHardwareKeyProvider for SoftwareKeyProvider {
    fn key_pair_exists(&self) -> CryptoResult<bool> {
        Ok(self
            .wrapping_secret
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .is_some())
    }

    fn generate_key_pair(&self, _validity: Duration) -> CryptoResult<()> {
        *self
            .wrapping_secret
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(random_secret());
        Ok(())
    }

    fn wrap_key(&self, symmetric_key: &[u8]) -> CryptoResult<Vec<u8>> {
        let secret = self.secret()?;
        let masked: Vec<u8> = symmetric_key
            .iter()
            .zip(keystream(&secret, symmetric_key.len()))
            .map(|(byte, mask)| byte ^ mask)
            .collect();
        let tag = wrap_tag(&secret, &masked);
        let mut out = Vec::with_capacity(WRAP_TAG_SIZE + masked.len());
        out.extend_from_slice(&tag);
        out.extend_from_slice(&masked);
        Ok(out)
    }

    fn unwrap_key(&self, wrapped: &[u8]) -> CryptoResult<Vec<u8>> {
        let secret = self.secret()?;
        if wrapped.len() < WRAP_TAG_SIZE {
            return Err(CryptoError::hardware("wrapped blob too short"));
        }
        let (tag, masked) = wrapped.split_at(WRAP_TAG_SIZE);
        let expected = wrap_tag(&secret, masked);
        if !bool::from(expected[..].ct_eq(tag)) {
            return Err(CryptoError::hardware(
                "wrapped blob does not match the current key pair",
            ));
        }
        Ok(masked
            .iter()
            .zip(keystream(&secret, masked.len()))
            .map(|(byte, mask)| byte ^ mask)
            .collect())
    }

    fn delete_key_pair(&self) -> CryptoResult<()> {
        *self
            .wrapping_secret
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = None;
        Ok(())
    }
}
