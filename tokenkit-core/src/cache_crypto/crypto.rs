//! Authenticated encryption for cache entries.
//!
//! The scheme is encrypt-then-MAC: AES-CBC with PKCS#7 padding, then
//! HMAC-SHA256 computed over `key_version ‖ ciphertext ‖ iv`. The
//! key-version tag is authenticated but not encrypted, so a reader can
//! trust the version claim without hiding it. The MAC key is derived from
//! the encryption key as `SHA-256(key bytes)` and is recomputed whenever a
//! [`CacheKeyPair`] is constructed.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::envelope::{Envelope, KeyVersion};
use super::error::{CryptoError, CryptoResult};
use super::format::{IV_SIZE, MAC_SIZE};

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;
type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;
type HmacSha256 = Hmac<Sha256>;

/// AES key lengths accepted for cache encryption, in bytes.
const KEY_LENGTHS: [usize; 2] = [16, 32];

/// Symmetric cache encryption key (AES-128 or AES-256).
///
/// Key bytes are zeroized on drop and never printed.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct CacheKey(Vec<u8>);

impl CacheKey {
    /// Creates a key from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidInput`] unless the key is 16 or 32
    /// bytes long.
    pub fn from_bytes(bytes: Vec<u8>) -> CryptoResult<Self> {
        if !KEY_LENGTHS.contains(&bytes.len()) {
            return Err(CryptoError::invalid_input(
                "key",
                format!("length must be 16 or 32 bytes, got {}", bytes.len()),
            ));
        }
        Ok(Self(bytes))
    }

    /// Generates a fresh random 256-bit key.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = vec![0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Returns the raw key bytes. Treat this as sensitive material.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// HMAC-SHA256 key derived from a cache encryption key.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MacKey([u8; MAC_SIZE]);

impl MacKey {
    /// Returns the raw key bytes. Treat this as sensitive material.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; MAC_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for MacKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MacKey").field("key", &"[REDACTED]").finish()
    }
}

/// Derives the MAC key from an encryption key.
#[must_use]
pub fn derive_mac_key(key: &CacheKey) -> MacKey {
    let digest = Sha256::digest(key.as_bytes());
    let mut out = [0u8; MAC_SIZE];
    out.copy_from_slice(&digest);
    MacKey(out)
}

/// An encryption key, its derived MAC key, and the key-version tag that
/// stamps ciphertexts produced under it.
#[derive(Clone)]
pub struct CacheKeyPair {
    enc_key: CacheKey,
    mac_key: MacKey,
    version: KeyVersion,
}

impl CacheKeyPair {
    /// Builds a pair for `enc_key`, deriving the MAC key.
    #[must_use]
    pub fn derive(enc_key: CacheKey, version: KeyVersion) -> Self {
        let mac_key = derive_mac_key(&enc_key);
        Self {
            enc_key,
            mac_key,
            version,
        }
    }

    /// Returns the key-version tag for this pair.
    #[must_use]
    pub const fn version(&self) -> KeyVersion {
        self.version
    }
}

impl std::fmt::Debug for CacheKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheKeyPair")
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

fn compute_mac(
    mac_key: &MacKey,
    version: KeyVersion,
    ciphertext: &[u8],
    iv: &[u8; IV_SIZE],
) -> [u8; MAC_SIZE] {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(mac_key.as_bytes())
        .expect("HMAC-SHA256 accepts any key length");
    mac.update(version.as_bytes());
    mac.update(ciphertext);
    mac.update(iv);
    let mut out = [0u8; MAC_SIZE];
    out.copy_from_slice(&mac.finalize().into_bytes());
    out
}

/// Encrypts `plaintext` under `pair`, returning ciphertext, IV, and MAC.
///
/// A fresh random IV is generated on every call.
///
/// # Errors
///
/// Returns [`CryptoError::InvalidInput`] for empty plaintext and
/// [`CryptoError::EncryptionFailed`] on cipher initialization errors.
pub fn encrypt(
    plaintext: &[u8],
    pair: &CacheKeyPair,
) -> CryptoResult<(Vec<u8>, [u8; IV_SIZE], [u8; MAC_SIZE])> {
    if plaintext.is_empty() {
        return Err(CryptoError::invalid_input(
            "plaintext",
            "must not be empty",
        ));
    }

    let mut iv = [0u8; IV_SIZE];
    OsRng.fill_bytes(&mut iv);

    let key = pair.enc_key.as_bytes();
    let ciphertext = match key.len() {
        16 => Aes128CbcEnc::new_from_slices(key, &iv)
            .map_err(|err| CryptoError::encryption(format!("cipher init: {err}")))?
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext),
        32 => Aes256CbcEnc::new_from_slices(key, &iv)
            .map_err(|err| CryptoError::encryption(format!("cipher init: {err}")))?
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext),
        len => {
            return Err(CryptoError::encryption(format!(
                "unsupported key length: {len}"
            )))
        }
    };

    let mac = compute_mac(&pair.mac_key, pair.version, &ciphertext, &iv);
    Ok((ciphertext, iv, mac))
}

/// Verifies the envelope MAC and decrypts the ciphertext.
///
/// The MAC is recomputed over `key_version ‖ ciphertext ‖ iv` and compared
/// against the stored tag in constant time (full-width accumulate, no
/// short-circuit). No AES operation runs before the tag verifies.
///
/// # Errors
///
/// Returns [`CryptoError::AuthenticationFailed`] on MAC mismatch and
/// [`CryptoError::EncryptionFailed`] on cipher or padding errors.
pub fn decrypt_and_verify(envelope: &Envelope, pair: &CacheKeyPair) -> CryptoResult<Vec<u8>> {
    let expected = compute_mac(
        &pair.mac_key,
        envelope.key_version(),
        envelope.ciphertext(),
        envelope.iv(),
    );
    if !bool::from(expected[..].ct_eq(&envelope.mac()[..])) {
        return Err(CryptoError::AuthenticationFailed);
    }

    let key = pair.enc_key.as_bytes();
    let plaintext = match key.len() {
        16 => Aes128CbcDec::new_from_slices(key, envelope.iv())
            .map_err(|err| CryptoError::encryption(format!("cipher init: {err}")))?
            .decrypt_padded_vec_mut::<Pkcs7>(envelope.ciphertext())
            .map_err(|_| CryptoError::encryption("PKCS#7 unpadding failed"))?,
        32 => Aes256CbcDec::new_from_slices(key, envelope.iv())
            .map_err(|err| CryptoError::encryption(format!("cipher init: {err}")))?
            .decrypt_padded_vec_mut::<Pkcs7>(envelope.ciphertext())
            .map_err(|_| CryptoError::encryption("PKCS#7 unpadding failed"))?,
        len => {
            return Err(CryptoError::encryption(format!(
                "unsupported key length: {len}"
            )))
        }
    };

    Ok(plaintext)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache_crypto::envelope;
    use test_case::test_case;

    fn pair_with_key_len(len: usize) -> CacheKeyPair {
        let mut bytes = vec![0u8; len];
        OsRng.fill_bytes(&mut bytes);
        let key = CacheKey::from_bytes(bytes).expect("valid key length");
        CacheKeyPair::derive(key, KeyVersion::HARDWARE_BACKED)
    }

    fn seal(plaintext: &[u8], pair: &CacheKeyPair) -> String {
        let (ciphertext, iv, mac) = encrypt(plaintext, pair).expect("encrypt");
        envelope::serialize(pair.version(), &ciphertext, &iv, &mac)
    }

    #[test_case(16 ; "aes128")]
    #[test_case(32 ; "aes256")]
    fn test_round_trip(key_len: usize) {
        let pair = pair_with_key_len(key_len);
        let blob = seal(b"access token payload", &pair);
        let parsed = envelope::deserialize(&blob).expect("deserialize");
        let plaintext = decrypt_and_verify(&parsed, &pair).expect("decrypt");
        assert_eq!(plaintext, b"access token payload");
    }

    #[test]
    fn test_empty_plaintext_rejected() {
        let pair = pair_with_key_len(32);
        match encrypt(b"", &pair) {
            Err(CryptoError::InvalidInput { parameter, .. }) => {
                assert_eq!(parameter, "plaintext");
            }
            Err(err) => panic!("unexpected error: {err}"),
            Ok(_) => panic!("expected error"),
        }
    }

    #[test]
    fn test_invalid_key_length_rejected() {
        match CacheKey::from_bytes(vec![0u8; 24]) {
            Err(CryptoError::InvalidInput { .. }) => {}
            Err(err) => panic!("unexpected error: {err}"),
            Ok(_) => panic!("expected error"),
        }
    }

    #[test]
    fn test_iv_is_fresh_per_encryption() {
        let pair = pair_with_key_len(32);
        let first = seal(b"same plaintext", &pair);
        let second = seal(b"same plaintext", &pair);
        assert_ne!(first, second);

        let first = envelope::deserialize(&first).expect("deserialize");
        let second = envelope::deserialize(&second).expect("deserialize");
        assert_ne!(first.iv(), second.iv());
        assert_eq!(
            decrypt_and_verify(&first, &pair).expect("decrypt"),
            decrypt_and_verify(&second, &pair).expect("decrypt"),
        );
    }

    fn tampered(blob: &str, pair: &CacheKeyPair, region: &str) -> CryptoResult<Vec<u8>> {
        let parsed = envelope::deserialize(blob).expect("deserialize");
        let mut ciphertext = parsed.ciphertext().to_vec();
        let mut iv = *parsed.iv();
        let mut mac = *parsed.mac();
        match region {
            "ciphertext" => ciphertext[0] ^= 0x01,
            "iv" => iv[0] ^= 0x01,
            "mac" => mac[0] ^= 0x01,
            "version" => {}
            _ => unreachable!(),
        }
        let version = if region == "version" {
            KeyVersion::USER_DEFINED
        } else {
            parsed.key_version()
        };
        let reassembled = envelope::serialize(version, &ciphertext, &iv, &mac);
        let parsed = envelope::deserialize(&reassembled).expect("deserialize");
        decrypt_and_verify(&parsed, pair)
    }

    #[test_case("ciphertext")]
    #[test_case("iv")]
    #[test_case("mac")]
    #[test_case("version")]
    fn test_tampering_fails_authentication(region: &str) {
        let pair = pair_with_key_len(32);
        let blob = seal(b"refresh token payload", &pair);
        match tampered(&blob, &pair, region) {
            Err(CryptoError::AuthenticationFailed) => {}
            Err(err) => panic!("unexpected error: {err}"),
            Ok(_) => panic!("expected error"),
        }
    }

    #[test]
    fn test_wrong_key_fails_authentication() {
        let pair = pair_with_key_len(32);
        let other = pair_with_key_len(32);
        let blob = seal(b"id token payload", &pair);
        let parsed = envelope::deserialize(&blob).expect("deserialize");
        match decrypt_and_verify(&parsed, &other) {
            Err(CryptoError::AuthenticationFailed) => {}
            Err(err) => panic!("unexpected error: {err}"),
            Ok(_) => panic!("expected error"),
        }
    }

    #[test]
    fn test_mac_key_derivation_is_deterministic() {
        let key = CacheKey::generate();
        let first = derive_mac_key(&key);
        let second = derive_mac_key(&key);
        assert_eq!(first.as_bytes(), second.as_bytes());

        let digest = Sha256::digest(key.as_bytes());
        assert_eq!(first.as_bytes().as_slice(), digest.as_slice());
    }

    #[test]
    fn test_debug_redacts_key_material() {
        let key = CacheKey::generate();
        let debug = format!("{key:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains(&hex::encode(key.as_bytes())));
    }
}
