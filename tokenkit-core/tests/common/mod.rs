//! Shared helpers for integration tests.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tokenkit_core::cache_crypto::{CryptoEvent, EventSink};
use uuid::Uuid;

/// Initializes tracing output for test debugging; safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Returns a unique temporary directory path for a key store.
pub fn temp_root() -> PathBuf {
    let mut path = std::env::temp_dir();
    path.push(format!("tokenkit-test-{}", Uuid::new_v4()));
    path
}

/// Removes a temporary key store directory.
pub fn cleanup(root: &Path) {
    let _ = std::fs::remove_dir_all(root);
}

/// Event sink that records event debug strings.
pub struct RecordingSink(pub Mutex<Vec<String>>);

impl RecordingSink {
    /// Creates an empty recording sink.
    pub fn new() -> Self {
        Self(Mutex::new(Vec::new()))
    }

    /// Returns a snapshot of recorded event debug strings.
    pub fn events(&self) -> Vec<String> {
        self.0.lock().expect("recorder lock").clone()
    }
}

impl Default for RecordingSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for RecordingSink {
    fn on_event(&self, event: &CryptoEvent) {
        self.0
            .lock()
            .expect("recorder lock")
            .push(format!("{event:?}"));
    }
}
