//! Disk cache for the recent-streams snapshot.
//!
//! One file per logged-in account, holding a small versioned envelope
//! `{version, streams}` with the raw payloads of the most recent streams.
//! The cache is an availability optimization, never a source of truth:
//! every failure mode (missing file, corruption, unupgradable version)
//! degrades to an empty snapshot and a deleted file.

use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use cadence_shared::AccountId;

use crate::error::{Result, StoreError};
use crate::legacy;

/// Version of the on-disk stream snapshot. Bump when the payload shape
/// changes, and add a shim in [`crate::legacy`] if the previous version
/// should survive the upgrade.
pub const CACHE_VERSION: u32 = 12;

/// The most recent streams worth persisting between launches.
pub const MAX_CACHED_STREAMS: usize = 50;

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    version: u32,
    streams: Vec<Value>,
}

/// Per-account cache of recent stream payloads.
#[derive(Debug, Clone)]
pub struct StreamCache {
    dir: PathBuf,
}

impl StreamCache {
    /// Opens the cache in the platform cache directory.
    pub fn new() -> Result<Self> {
        let dirs = ProjectDirs::from("io", "cadence", "cadence").ok_or(StoreError::NoCacheDir)?;
        Self::at_dir(dirs.cache_dir())
    }

    /// Opens the cache in an explicit directory. Used by tests and custom
    /// layouts.
    pub fn at_dir(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;
        Ok(Self { dir: dir.to_path_buf() })
    }

    fn path_for(&self, account: AccountId) -> PathBuf {
        self.dir.join(format!("streams_{account}.cache.json"))
    }

    /// Loads the cached stream payloads for `account`.
    ///
    /// Returns an empty list when there is no usable cache. A corrupt or
    /// stale file is removed on the way out; nothing here is fatal.
    pub fn load(&self, account: AccountId) -> Vec<Value> {
        let path = self.path_for(account);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(error) => {
                tracing::warn!(%error, path = %path.display(), "failed to read stream cache");
                return Vec::new();
            }
        };
        let envelope: Envelope = match serde_json::from_slice(&bytes) {
            Ok(envelope) => envelope,
            Err(error) => {
                tracing::warn!(%error, "stream cache is corrupt, discarding");
                self.remove(account);
                return Vec::new();
            }
        };
        if envelope.version == CACHE_VERSION {
            tracing::info!(
                count = envelope.streams.len(),
                "loaded stream cache from disk"
            );
            return envelope.streams;
        }
        match legacy::upgrade(envelope.version, envelope.streams) {
            Some(streams) => {
                tracing::info!(
                    from_version = envelope.version,
                    count = streams.len(),
                    "upgraded stream cache"
                );
                streams
            }
            None => {
                tracing::info!(
                    version = envelope.version,
                    expected = CACHE_VERSION,
                    "stream cache version mismatch, discarding"
                );
                self.remove(account);
                Vec::new()
            }
        }
    }

    /// Writes the snapshot for `account`, bounded to the most recent
    /// [`MAX_CACHED_STREAMS`] entries.
    pub fn save(&self, account: AccountId, streams: &[Value]) -> Result<()> {
        let bounded = &streams[..streams.len().min(MAX_CACHED_STREAMS)];
        let envelope = Envelope {
            version: CACHE_VERSION,
            streams: bounded.to_vec(),
        };
        let bytes = serde_json::to_vec(&envelope)?;
        fs::write(self.path_for(account), bytes)?;
        Ok(())
    }

    /// Fire-and-forget save off the mutation path. A race between two rapid
    /// saves resolves as last write wins; the data is always a derivable
    /// snapshot of in-memory state.
    pub fn save_in_background(&self, account: AccountId, streams: Vec<Value>) {
        let write = {
            let cache = self.clone();
            move || {
                if let Err(error) = cache.save(account, &streams) {
                    tracing::warn!(%error, "failed to save stream cache");
                }
            }
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(write);
            }
            // No runtime, for example during shutdown: save inline.
            Err(_) => write(),
        }
    }

    /// Removes the cache file for `account`, ignoring IO errors.
    pub fn remove(&self, account: AccountId) {
        let path = self.path_for(account);
        if let Err(error) = fs::remove_file(&path) {
            if error.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(%error, path = %path.display(), "failed to remove stream cache");
            }
        }
    }

    /// Whether a cache file exists for `account`.
    pub fn exists(&self, account: AccountId) -> bool {
        self.path_for(account).exists()
    }
}
