//! Error types for the token-cache encryption engine.

use thiserror::Error;

/// Result type for cache encryption operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors raised by the token-cache encryption engine.
///
/// Low-level cipher errors are wrapped into this taxonomy so callers can
/// branch on kind without knowing the underlying crypto crates.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Structurally invalid envelope (too short, bad base64, unsupported
    /// encode-version tag). The value is corrupt; never retried.
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// MAC verification failed for every candidate key. The cached value
    /// is unrecoverable; callers re-acquire credentials instead.
    #[error("authentication failed for all candidate keys")]
    AuthenticationFailed,

    /// Cipher initialization or padding failure.
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    /// Secure hardware was unable to produce a new key pair.
    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    /// Invalid input parameter.
    #[error("invalid input '{parameter}': {reason}")]
    InvalidInput {
        /// Name of the invalid parameter.
        parameter: String,
        /// Description of the issue.
        reason: String,
    },

    /// Errors coming from the key-material store.
    #[error("key store error: {0}")]
    KeyStore(String),

    /// Errors coming from the secure hardware provider.
    #[error("secure hardware error: {0}")]
    Hardware(String),

    /// A candidate key is not configured or not present on this device.
    #[error("no key available: {0}")]
    KeyUnavailable(String),
}

impl CryptoError {
    /// Creates a malformed-envelope error.
    pub fn malformed<S: Into<String>>(context: S) -> Self {
        Self::MalformedEnvelope(context.into())
    }

    /// Creates an encryption-failed error.
    pub fn encryption<S: Into<String>>(context: S) -> Self {
        Self::EncryptionFailed(context.into())
    }

    /// Creates a key-generation error.
    pub fn key_generation<S: Into<String>>(context: S) -> Self {
        Self::KeyGeneration(context.into())
    }

    /// Creates an invalid-input error.
    pub fn invalid_input<P: Into<String>, R: Into<String>>(parameter: P, reason: R) -> Self {
        Self::InvalidInput {
            parameter: parameter.into(),
            reason: reason.into(),
        }
    }

    /// Creates a key-store error.
    pub fn key_store<S: Into<String>>(context: S) -> Self {
        Self::KeyStore(context.into())
    }

    /// Creates a secure-hardware error.
    pub fn hardware<S: Into<String>>(context: S) -> Self {
        Self::Hardware(context.into())
    }

    /// Creates a key-unavailable error.
    pub fn unavailable<S: Into<String>>(context: S) -> Self {
        Self::KeyUnavailable(context.into())
    }
}
