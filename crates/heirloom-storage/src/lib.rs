//! On-disk object store for avatars and story media.
//!
//! Objects live at `{media_dir}/{key}`. Avatars (`avatars/...`) are served
//! from a public URL; everything else is only reachable through a URL signed
//! with HMAC-SHA256 that expires after a configurable time.

mod signing;

use std::path::{Component, Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Result, bail};
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::{debug, info, warn};

use heirloom_feed::backend::{BackendError, BackendResult, ObjectStore};

pub use signing::SignatureError;

/// Key prefix of objects served without a signature.
pub const PUBLIC_PREFIX: &str = "avatars/";

pub struct LocalStore {
    dir: PathBuf,
    public_base: String,
    signing_key: signing::HmacSha256,
}

impl LocalStore {
    pub async fn new(dir: PathBuf, public_base: &str, signing_key: &[u8]) -> Result<Self> {
        fs::create_dir_all(&dir).await?;
        info!("Media directory: {}", dir.display());
        Self::with_dir(dir, public_base, signing_key)
    }

    /// Like [`LocalStore::new`] without touching the filesystem.
    pub fn with_dir(dir: PathBuf, public_base: &str, signing_key: &[u8]) -> Result<Self> {
        Ok(Self {
            dir,
            public_base: public_base.trim_end_matches('/').to_string(),
            signing_key: signing::keyed(signing_key)?,
        })
    }

    /// Resolves `key` below the media directory. Keys are relative,
    /// '/'-separated and may not climb out with `..`.
    pub fn object_path(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() || key.contains('\\') {
            bail!("invalid object key '{key}'");
        }
        let rel = Path::new(key);
        if !rel.components().all(|c| matches!(c, Component::Normal(_))) {
            bail!("invalid object key '{key}'");
        }
        Ok(self.dir.join(rel))
    }

    pub fn is_public(key: &str) -> bool {
        key.starts_with(PUBLIC_PREFIX)
    }

    /// Reads an object. Missing objects are `None`.
    pub async fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.object_path(key)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn write(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.object_path(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, bytes).await?;
        debug!(
            "Stored {} ({} bytes, sha256 {})",
            key,
            bytes.len(),
            hex::encode(Sha256::digest(bytes))
        );
        Ok(())
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        let path = self.object_path(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                info!("Deleted object {}", key);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Object {} already gone", key);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Checks a signed download link for `key` at the current time.
    pub fn verify(&self, key: &str, expires: u64, signature: &str) -> Result<(), SignatureError> {
        signing::verify(&self.signing_key, key, expires, signature, unix_now())
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn storage_err(e: anyhow::Error) -> BackendError {
    BackendError::Storage(e.to_string())
}

impl ObjectStore for LocalStore {
    async fn put(&self, key: &str, _content_type: &str, bytes: &[u8]) -> BackendResult<()> {
        self.write(key, bytes).await.map_err(storage_err)
    }

    async fn remove(&self, key: &str) -> BackendResult<()> {
        self.delete(key).await.map_err(storage_err)
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/media/public/{}", self.public_base, key)
    }

    fn signed_url(&self, key: &str, ttl: Duration) -> String {
        let expires = unix_now() + ttl.as_secs();
        let sig = signing::sign(&self.signing_key, key, expires);
        format!("{}/media/signed/{}?expires={}&sig={}", self.public_base, key, expires, sig)
    }
}
