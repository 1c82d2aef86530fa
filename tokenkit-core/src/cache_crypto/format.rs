//! Envelope format constants and layout definitions.
//!
//! This module defines the structural constants of the persisted envelope
//! string:
//!
//! ```text
//! <lenPrefixChar><encodeVersionTag><base64(keyVersionTag ‖ ciphertext ‖ iv ‖ mac)>
//! ```
//!
//! The length prefix encodes `len(encodeVersionTag)` as `'a' + len`, so a
//! reader can skip the header without knowing the tag in advance.

use std::time::Duration;

/// Encode-version tag identifying the outer envelope format.
pub const ENCODE_VERSION: &[u8; 2] = b"E1";

/// Size of the key-version tag in bytes.
pub const KEY_VERSION_SIZE: usize = 4;

/// Size of the AES-CBC initialization vector in bytes (AES block size).
pub const IV_SIZE: usize = 16;

/// Size of the HMAC-SHA256 authentication tag in bytes.
pub const MAC_SIZE: usize = 32;

/// Decoded payload size with an empty ciphertext region.
/// Layout: key_version(4) + iv(16) + mac(32); a valid payload is strictly
/// larger because CBC ciphertext is never empty.
pub const MIN_PAYLOAD_SIZE: usize = KEY_VERSION_SIZE + IV_SIZE + MAC_SIZE;

/// Filename for the wrapped symmetric cache key.
pub const WRAPPED_KEY_FILENAME: &str = "wrapped_cache_key.bin";

/// Validity window requested for the wrapping key pair.
///
/// Effectively permanent: the wrapping pair has no rotation schedule of
/// its own and is only replaced when the secure hardware loses it.
pub const KEY_PAIR_VALIDITY: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);
