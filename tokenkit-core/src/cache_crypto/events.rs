//! Best-effort observability hook.
//!
//! Host applications can observe key lifecycle transitions and decryption
//! fallback activity by registering an [`EventSink`]. Sinks observe, they
//! never influence: a sink that panics is contained and the triggering
//! operation completes normally.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use super::envelope::KeyVersion;
use super::resolver::KeySource;

/// Structured events emitted by the encryption engine.
#[derive(Debug, Clone)]
pub enum CryptoEvent {
    /// An encryption key was resolved and cached for the process lifetime.
    KeyLoaded {
        /// Key-version tag of the loaded key.
        version: KeyVersion,
    },
    /// A new hardware-backed key was generated and its wrap persisted.
    KeyGenerated,
    /// The stored wrapped key no longer unwraps and was deleted.
    WrappedKeyDiscarded {
        /// Why the wrapped blob was discarded.
        reason: String,
    },
    /// A decryption candidate was rejected; the next candidate (if any)
    /// will be attempted.
    CandidateRejected {
        /// The rejected candidate.
        source: KeySource,
        /// Why the candidate was rejected.
        reason: String,
    },
    /// The cached key was invalidated by rotation or deletion.
    KeyInvalidated,
}

/// Receiver for [`CryptoEvent`]s.
pub trait EventSink: Send + Sync {
    /// Called with each event. Implementations should return quickly.
    fn on_event(&self, event: &CryptoEvent);
}

/// Shared handle around an optional sink.
#[derive(Clone, Default)]
pub(crate) struct EventHub {
    sink: Option<Arc<dyn EventSink>>,
}

impl EventHub {
    pub(crate) const fn new(sink: Option<Arc<dyn EventSink>>) -> Self {
        Self { sink }
    }

    /// Delivers `event` to the sink, if any. A panicking sink is
    /// contained; delivery failures never reach the calling operation.
    pub(crate) fn emit(&self, event: &CryptoEvent) {
        if let Some(sink) = &self.sink {
            let _ = catch_unwind(AssertUnwindSafe(|| sink.on_event(event)));
        }
    }
}
