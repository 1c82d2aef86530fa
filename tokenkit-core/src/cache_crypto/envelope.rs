//! Envelope codec for sealed cache entries.
//!
//! A sealed entry is stored as a single ASCII string: a one-character
//! length prefix, the encode-version tag, and the base64 payload holding
//! `key_version ‖ ciphertext ‖ iv ‖ mac`. The codec is strict when a blob
//! has already been classified as an envelope ([`deserialize`]) and
//! deliberately lenient when deciding whether a stored value is an
//! envelope at all ([`classify`]): cache entries written before encryption
//! was introduced must keep reading back as plaintext.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

use super::error::{CryptoError, CryptoResult};
use super::format::{ENCODE_VERSION, IV_SIZE, KEY_VERSION_SIZE, MAC_SIZE, MIN_PAYLOAD_SIZE};

/// 4-byte ASCII tag identifying which key generation produced a ciphertext.
///
/// Tags other than the two published constants belong to foreign or future
/// writers; the codec carries them through untouched and classification
/// treats them as unencrypted.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyVersion([u8; KEY_VERSION_SIZE]);

impl KeyVersion {
    /// Ciphertext produced under the hardware-backed cache key.
    pub const HARDWARE_BACKED: Self = Self(*b"A001");

    /// Ciphertext produced under a caller-supplied or legacy broker key.
    pub const USER_DEFINED: Self = Self(*b"U001");

    /// Creates a tag from raw bytes.
    #[must_use]
    pub const fn new(tag: [u8; KEY_VERSION_SIZE]) -> Self {
        Self(tag)
    }

    /// Returns the raw tag bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; KEY_VERSION_SIZE] {
        &self.0
    }

    fn from_slice(bytes: &[u8]) -> Option<Self> {
        let tag: [u8; KEY_VERSION_SIZE] = bytes.try_into().ok()?;
        Some(Self(tag))
    }
}

impl std::fmt::Debug for KeyVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "KeyVersion({})", String::from_utf8_lossy(&self.0))
    }
}

impl std::fmt::Display for KeyVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

/// The decoded parts of a sealed cache entry.
///
/// Constructed transiently during decryption and discarded afterwards.
#[derive(Debug, Clone)]
pub struct Envelope {
    key_version: KeyVersion,
    ciphertext: Vec<u8>,
    iv: [u8; IV_SIZE],
    mac: [u8; MAC_SIZE],
}

impl Envelope {
    /// Returns the key-version tag the writer recorded.
    #[must_use]
    pub const fn key_version(&self) -> KeyVersion {
        self.key_version
    }

    /// Returns the AES-CBC ciphertext.
    #[must_use]
    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    /// Returns the initialization vector.
    #[must_use]
    pub const fn iv(&self) -> &[u8; IV_SIZE] {
        &self.iv
    }

    /// Returns the HMAC-SHA256 tag.
    #[must_use]
    pub const fn mac(&self) -> &[u8; MAC_SIZE] {
        &self.mac
    }
}

/// Classification of a stored cache value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeKind {
    /// Not an envelope; the stored value is legacy plaintext.
    Unencrypted,
    /// Sealed under a caller-supplied or legacy broker key (`U001`).
    UserDefinedKey,
    /// Sealed under the hardware-backed cache key (`A001`).
    HardwareBacked,
}

#[allow(clippy::cast_possible_truncation)]
const fn length_prefix_char() -> char {
    (b'a' + ENCODE_VERSION.len() as u8) as char
}

/// Serializes envelope parts into the persisted string format.
#[must_use]
pub fn serialize(
    key_version: KeyVersion,
    ciphertext: &[u8],
    iv: &[u8; IV_SIZE],
    mac: &[u8; MAC_SIZE],
) -> String {
    let mut raw = Vec::with_capacity(KEY_VERSION_SIZE + ciphertext.len() + IV_SIZE + MAC_SIZE);
    raw.extend_from_slice(key_version.as_bytes());
    raw.extend_from_slice(ciphertext);
    raw.extend_from_slice(iv);
    raw.extend_from_slice(mac);

    let encoded = BASE64.encode(&raw);
    let mut out = String::with_capacity(1 + ENCODE_VERSION.len() + encoded.len());
    out.push(length_prefix_char());
    out.push_str(&String::from_utf8_lossy(ENCODE_VERSION));
    out.push_str(&encoded);
    out
}

/// Parses a stored envelope string into its parts.
///
/// # Errors
///
/// Returns [`CryptoError::MalformedEnvelope`] if the length prefix is zero
/// or negative, the encode-version tag is not the supported constant, the
/// payload is not valid base64, or the decoded payload is too short to
/// hold the key-version tag, IV, and MAC.
pub fn deserialize(blob: &str) -> CryptoResult<Envelope> {
    let bytes = blob.as_bytes();
    let Some((&prefix, rest)) = bytes.split_first() else {
        return Err(CryptoError::malformed("empty input"));
    };
    if prefix <= b'a' {
        return Err(CryptoError::malformed(
            "encode-version length prefix must be positive",
        ));
    }
    let tag_len = usize::from(prefix - b'a');
    if rest.len() < tag_len {
        return Err(CryptoError::malformed("truncated encode-version tag"));
    }
    let (tag, payload) = rest.split_at(tag_len);
    if tag != ENCODE_VERSION {
        return Err(CryptoError::malformed(format!(
            "unsupported encode version '{}'",
            String::from_utf8_lossy(tag)
        )));
    }

    let raw = BASE64
        .decode(payload)
        .map_err(|err| CryptoError::malformed(format!("invalid base64 payload: {err}")))?;
    if raw.len() <= MIN_PAYLOAD_SIZE {
        return Err(CryptoError::malformed(format!(
            "payload too short: {} bytes",
            raw.len()
        )));
    }

    let (head, tail) = raw.split_at(raw.len() - IV_SIZE - MAC_SIZE);
    let (version_bytes, ciphertext) = head.split_at(KEY_VERSION_SIZE);
    let (iv_bytes, mac_bytes) = tail.split_at(IV_SIZE);

    let mut tag = [0u8; KEY_VERSION_SIZE];
    tag.copy_from_slice(version_bytes);
    let key_version = KeyVersion::new(tag);
    let mut iv = [0u8; IV_SIZE];
    iv.copy_from_slice(iv_bytes);
    let mut mac = [0u8; MAC_SIZE];
    mac.copy_from_slice(mac_bytes);

    Ok(Envelope {
        key_version,
        ciphertext: ciphertext.to_vec(),
        iv,
        mac,
    })
}

/// Classifies a stored value by inspecting its key-version tag.
///
/// Any parse failure — missing or undersized header, foreign encode
/// version, invalid base64, unknown key-version tag — classifies the
/// value as [`EnvelopeKind::Unencrypted`]. Legacy plaintext entries
/// predate the envelope format and must stay readable, so garbage and
/// legacy plaintext are indistinguishable here by design of the stored
/// format; see DESIGN.md for the recorded ambiguity.
#[must_use]
pub fn classify(blob: &str) -> EnvelopeKind {
    try_classify(blob).unwrap_or(EnvelopeKind::Unencrypted)
}

fn try_classify(blob: &str) -> Option<EnvelopeKind> {
    let bytes = blob.as_bytes();
    let (&prefix, rest) = bytes.split_first()?;
    let tag_len = usize::from(prefix.checked_sub(b'a')?);
    if tag_len == 0 || rest.len() < tag_len {
        return None;
    }
    let (tag, payload) = rest.split_at(tag_len);
    if tag != ENCODE_VERSION {
        return None;
    }
    let raw = BASE64.decode(payload).ok()?;
    let version = KeyVersion::from_slice(raw.get(..KEY_VERSION_SIZE)?)?;
    if version == KeyVersion::USER_DEFINED {
        Some(EnvelopeKind::UserDefinedKey)
    } else if version == KeyVersion::HARDWARE_BACKED {
        Some(EnvelopeKind::HardwareBacked)
    } else {
        None
    }
}
