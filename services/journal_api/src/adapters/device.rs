//! services/journal_api/src/adapters/device.rs
//!
//! A `DeviceStore` backed by one file per key under a data directory.
//!
//! Writes go to a temp file first and are renamed into place, so a crash mid-write
//! leaves the previous value intact.

use async_trait::async_trait;
use mood_journal_core::ports::{DeviceStore, PortError, PortResult};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Clone, Debug)]
pub struct FileDeviceStore {
    root: PathBuf,
}

impl FileDeviceStore {
    /// Opens the store, creating the data directory if needed.
    pub async fn open(root: impl Into<PathBuf>) -> PortResult<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| io_error(&root, e))?;
        debug!("Device store opened at {:?}", root);
        Ok(Self { root })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(encode_key(key))
    }
}

// Keys contain '/', so anything outside [A-Za-z0-9_-] is hex-escaped. The encoded
// name never contains '.', which keeps it distinct from the `.tmp` sibling.
fn encode_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for b in key.bytes() {
        if b.is_ascii_alphanumeric() || b == b'-' || b == b'_' {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{:02X}", b));
        }
    }
    out
}

fn io_error(path: &Path, e: std::io::Error) -> PortError {
    PortError::Unexpected(format!("{}: {}", path.display(), e))
}

#[async_trait]
impl DeviceStore for FileDeviceStore {
    async fn get(&self, key: &str) -> PortResult<Option<Vec<u8>>> {
        let path = self.path_for(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(&path, e)),
        }
    }

    async fn set(&self, key: &str, value: &[u8]) -> PortResult<()> {
        let path = self.path_for(key);
        let temp_path = path.with_extension("tmp");
        tokio::fs::write(&temp_path, value)
            .await
            .map_err(|e| io_error(&temp_path, e))?;
        tokio::fs::rename(&temp_path, &path)
            .await
            .map_err(|e| io_error(&path, e))
    }

    async fn remove(&self, key: &str) -> PortResult<()> {
        let path = self.path_for(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(&path, e)),
        }
    }
}
