//! Platform interfaces for key material.
//!
//! The engine depends on two platform-provided capabilities:
//!
//! - [`KeyMaterialStore`] — persistence for the wrapped symmetric cache
//!   key (a private file on the device).
//! - [`SecureHardwareKeyProvider`] — the asymmetric wrapping key pair
//!   held in secure hardware.
//!
//! [`FileKeyStore`] is the production store implementation;
//! [`MemoryKeyStore`] and [`SoftwareKeyProvider`] are in-memory doubles
//! for tests.

mod fs;
mod memory;

pub use fs::FileKeyStore;
pub use memory::{MemoryKeyStore, SoftwareKeyProvider};

use std::time::Duration;

use super::error::CryptoResult;

/// Persistence for the wrapped symmetric cache key.
pub trait KeyMaterialStore: Send + Sync {
    /// Reads the wrapped key blob, if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails for reasons other than the blob
    /// being absent.
    fn read_wrapped_key(&self) -> CryptoResult<Option<Vec<u8>>>;

    /// Writes the wrapped key blob atomically, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn write_wrapped_key(&self, bytes: &[u8]) -> CryptoResult<()>;

    /// Deletes the wrapped key blob. Deleting an absent blob is not an
    /// error.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    fn delete_wrapped_key(&self) -> CryptoResult<()>;
}

/// Asymmetric wrapping key pair held in secure hardware.
///
/// The provider owns a single key-pair slot. Platform implementations
/// back the slot with the device keystore (Android Keystore, iOS Secure
/// Enclave); the private half never leaves the hardware, so key loss
/// (e.g. after a lock-screen change) shows up as blobs that no longer
/// unwrap rather than as missing files.
pub trait SecureHardwareKeyProvider: Send + Sync {
    /// Returns whether a wrapping key pair currently exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the hardware cannot be queried.
    fn key_pair_exists(&self) -> CryptoResult<bool>;

    /// Generates a new wrapping key pair valid for `validity`, replacing
    /// any existing pair.
    ///
    /// # Errors
    ///
    /// Returns an error if the hardware refuses or fails to generate.
    fn generate_key_pair(&self, validity: Duration) -> CryptoResult<()>;

    /// Wraps a symmetric key under the current public key.
    ///
    /// # Errors
    ///
    /// Returns an error if no pair exists or the wrap fails.
    fn wrap_key(&self, symmetric_key: &[u8]) -> CryptoResult<Vec<u8>>;

    /// Unwraps a previously wrapped symmetric key.
    ///
    /// # Errors
    ///
    /// Returns an error if no pair exists, the blob was wrapped under a
    /// different (lost) pair, or the blob is corrupt.
    fn unwrap_key(&self, wrapped: &[u8]) -> CryptoResult<Vec<u8>>;

    /// Deletes the wrapping key pair, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    fn delete_key_pair(&self) -> CryptoResult<()>;
}
