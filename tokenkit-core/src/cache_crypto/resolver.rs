//! Candidate-key resolution for decryption.
//!
//! Given a classified blob and the engine configuration, resolution
//! produces the ordered list of key sources to attempt. Callers try
//! candidates strictly in order and stop at the first authenticated
//! decryption, which bounds worst-case decrypt cost to the candidate
//! count (at most two).

use super::config::CryptoConfig;
use super::envelope::EnvelopeKind;

/// A source a symmetric cache key can be loaded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySource {
    /// The caller-configured raw key.
    UserDefined,
    /// The legacy key registered for a cooperating broker package.
    PeerLegacy(String),
    /// The hardware-wrapped key in the key-material store.
    HardwareBacked,
}

/// How the engine selects its encryption key.
///
/// The broker and standalone flavors of the engine differ only in which
/// key source they prefer when sealing new entries; the preference is
/// data supplied at construction, not subclass behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyResolutionPolicy {
    /// Standalone app: caller-supplied key if configured, else the
    /// hardware-backed key.
    Standalone,
    /// Broker app: the caller's own registered legacy key if present,
    /// else the hardware-backed key.
    Broker,
}

/// Returns candidate key sources for a classified blob, in trial order.
#[must_use]
pub fn candidate_keys(kind: EnvelopeKind, config: &CryptoConfig) -> Vec<KeySource> {
    match kind {
        EnvelopeKind::Unencrypted => Vec::new(),
        EnvelopeKind::HardwareBacked => vec![KeySource::HardwareBacked],
        EnvelopeKind::UserDefinedKey => {
            if config.user_defined_key().is_some() {
                return vec![KeySource::UserDefined];
            }
            let caller = config.caller_package();
            // During app-to-app migration either broker may have produced
            // the blob: self's legacy key first, then the peer's.
            config
                .brokers()
                .and_then(|brokers| brokers.peer_of(caller))
                .map_or_else(Vec::new, |peer| {
                    vec![
                        KeySource::PeerLegacy(caller.to_string()),
                        KeySource::PeerLegacy(peer.to_string()),
                    ]
                })
        }
    }
}
