//! File-backed key-material store.
//!
//! Writes follow write-to-temp, fsync, rename, fsync-directory so readers
//! always see either the old wrapped key or the new one, never a partial
//! write.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use super::KeyMaterialStore;
use crate::cache_crypto::error::{CryptoError, CryptoResult};
use crate::cache_crypto::format::WRAPPED_KEY_FILENAME;

fn io_error<S: Into<String>>(context: S, err: &std::io::Error) -> CryptoError {
    CryptoError::key_store(format!("{}: {err}", context.into()))
}

/// [`KeyMaterialStore`] backed by a private application directory.
#[derive(Debug, Clone)]
pub struct FileKeyStore {
    directory: PathBuf,
}

impl FileKeyStore {
    /// Creates a store rooted at `directory`, creating it if needed.
    ///
    /// The directory must be private to the application; the wrapped key
    /// is not a shared file.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn new<P: AsRef<Path>>(directory: P) -> CryptoResult<Self> {
        let directory = directory.as_ref().to_path_buf();
        fs::create_dir_all(&directory).map_err(|err| {
            io_error(
                format!("failed to create key store directory '{}'", directory.display()),
                &err,
            )
        })?;
        Ok(Self { directory })
    }

    fn blob_path(&self) -> PathBuf {
        self.directory.join(WRAPPED_KEY_FILENAME)
    }

    fn temp_path(&self) -> PathBuf {
        self.directory.join(format!(".{WRAPPED_KEY_FILENAME}.tmp"))
    }

    /// Syncs the directory so a rename or unlink is durable.
    #[cfg(unix)]
    fn sync_directory(&self) -> CryptoResult<()> {
        let dir = File::open(&self.directory).map_err(|err| {
            io_error(
                format!("failed to open directory for sync '{}'", self.directory.display()),
                &err,
            )
        })?;
        dir.sync_all()
            .map_err(|err| io_error("failed to sync directory", &err))
    }

    #[cfg(not(unix))]
    fn sync_directory(&self) -> CryptoResult<()> {
        Ok(())
    }
}

impl KeyMaterialStore for FileKeyStore {
    fn read_wrapped_key(&self) -> CryptoResult<Option<Vec<u8>>> {
        match fs::read(self.blob_path()) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(io_error("failed to read wrapped key", &err)),
        }
    }

    fn write_wrapped_key(&self, bytes: &[u8]) -> CryptoResult<()> {
        let temp = self.temp_path();
        {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&temp)
                .map_err(|err| io_error("failed to open temp file", &err))?;
            file.write_all(bytes)
                .map_err(|err| io_error("failed to write wrapped key", &err))?;
            file.sync_all()
                .map_err(|err| io_error("failed to sync wrapped key", &err))?;
        }
        fs::rename(&temp, self.blob_path())
            .map_err(|err| io_error("failed to rename wrapped key into place", &err))?;
        self.sync_directory()
    }

    fn delete_wrapped_key(&self) -> CryptoResult<()> {
        match fs::remove_file(self.blob_path()) {
            Ok(()) => self.sync_directory(),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(io_error("failed to delete wrapped key", &err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn temp_store() -> (FileKeyStore, PathBuf) {
        let mut path = std::env::temp_dir();
        path.push(format!("tokenkit-keystore-{}", Uuid::new_v4()));
        let store = FileKeyStore::new(&path).expect("create store");
        (store, path)
    }

    fn cleanup(path: &Path) {
        let _ = fs::remove_dir_all(path);
    }

    #[test]
    fn test_read_missing_returns_none() {
        let (store, path) = temp_store();
        assert!(store.read_wrapped_key().expect("read").is_none());
        cleanup(&path);
    }

    #[test]
    fn test_write_read_round_trip() {
        let (store, path) = temp_store();
        store.write_wrapped_key(b"wrapped bytes").expect("write");
        assert_eq!(
            store.read_wrapped_key().expect("read"),
            Some(b"wrapped bytes".to_vec())
        );
        cleanup(&path);
    }

    #[test]
    fn test_write_replaces_previous_blob() {
        let (store, path) = temp_store();
        store.write_wrapped_key(b"first").expect("write");
        store.write_wrapped_key(b"second").expect("write");
        assert_eq!(
            store.read_wrapped_key().expect("read"),
            Some(b"second".to_vec())
        );
        cleanup(&path);
    }

    #[test]
    fn test_delete_is_idempotent() {
        let (store, path) = temp_store();
        store.write_wrapped_key(b"wrapped").expect("write");
        store.delete_wrapped_key().expect("delete");
        assert!(store.read_wrapped_key().expect("read").is_none());
        store.delete_wrapped_key().expect("delete again");
        cleanup(&path);
    }

    #[test]
    fn test_no_temp_file_left_behind() {
        let (store, path) = temp_store();
        store.write_wrapped_key(b"wrapped").expect("write");
        assert!(!store.temp_path().exists());
        cleanup(&path);
    }
}
