//! Encrypted token-cache storage engine.
//!
//! Everything the SDK caches (access tokens, refresh tokens, id tokens) is
//! protected at rest with envelope encryption: AES-CBC with an explicit
//! HMAC-SHA256 tag, wrapped in a self-describing, versioned string format
//! that stays byte-compatible between cooperating applications that do not
//! share a process.
//!
//! # Architecture
//!
//! - [`envelope`] — the codec for the persisted envelope string, plus the
//!   lenient classifier that keeps pre-encryption plaintext entries
//!   readable.
//! - [`crypto`] — the authenticated cipher engine: AES-CBC + PKCS#7,
//!   encrypt-then-MAC, constant-time verification, SHA-256 MAC-key
//!   derivation.
//! - [`resolver`] — ordered candidate-key resolution for decryption,
//!   including the broker-to-broker legacy key fallback.
//! - [`CryptoConfig`] — injected configuration: caller identity, broker
//!   identities, registered legacy keys.
//! - `keys` — the key lifecycle manager: in-memory caching, wrapped-key
//!   load, hardware-backed generation, rotation, stale-wrap recovery.
//! - [`CacheCipher`] — the facade applications hold.
//!
//! # Platform integration
//!
//! The engine depends on platform capabilities through the traits in
//! [`platform`]: a [`platform::KeyMaterialStore`] for the wrapped-key
//! blob and a [`platform::SecureHardwareKeyProvider`] for the asymmetric
//! wrapping pair in secure hardware.

mod config;
pub mod crypto;
pub mod envelope;
mod error;
mod events;
pub mod format;
mod keys;
mod manager;
pub mod platform;
pub mod resolver;

pub use config::{BrokerIdentities, CryptoConfig};
pub use crypto::{CacheKey, CacheKeyPair, MacKey};
pub use envelope::{Envelope, EnvelopeKind, KeyVersion};
pub use error::{CryptoError, CryptoResult};
pub use events::{CryptoEvent, EventSink};
pub use manager::CacheCipher;
pub use resolver::{KeyResolutionPolicy, KeySource};
