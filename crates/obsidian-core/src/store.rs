//! On-disk layout and atomic-write primitives for the local store.
//!
//! The store owns path construction only; it performs no locking. Single
//! writer per path is guaranteed upstream by task deduplication.

use crate::error::EngineError;
use sha1::{Digest, Sha1};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn versions_dir(&self) -> PathBuf {
        self.root.join("versions")
    }

    pub fn version_dir(&self, id: &str) -> PathBuf {
        self.versions_dir().join(id)
    }

    pub fn detail_path(&self, id: &str) -> PathBuf {
        self.version_dir(id).join(format!("{}.json", id))
    }

    pub fn client_jar_path(&self, id: &str) -> PathBuf {
        self.version_dir(id).join(format!("{}.jar", id))
    }

    pub fn libraries_dir(&self) -> PathBuf {
        self.root.join("libraries")
    }

    pub fn library_path(&self, relative: &str) -> PathBuf {
        self.libraries_dir().join(relative)
    }

    pub fn assets_dir(&self) -> PathBuf {
        self.root.join("assets")
    }

    pub fn asset_index_path(&self, assets_id: &str) -> PathBuf {
        self.assets_dir()
            .join("indexes")
            .join(format!("{}.json", assets_id))
    }

    /// Content-addressed object path: `assets/objects/<hh>/<hash>`.
    pub fn asset_object_path(&self, hash: &str) -> PathBuf {
        let prefix = &hash[..2.min(hash.len())];
        self.assets_dir().join("objects").join(prefix).join(hash)
    }

    /// Per-launch natives staging directory.
    pub fn natives_dir(&self, id: &str) -> PathBuf {
        self.root.join("natives").join(id)
    }

    /// True when `path` exists with exactly the expected length and SHA-1.
    pub async fn exists_with(&self, path: &Path, size: u64, sha1: &str) -> bool {
        let Ok(metadata) = tokio::fs::metadata(path).await else {
            return false;
        };
        if metadata.len() != size {
            return false;
        }
        match hash_file(path).await {
            Ok(computed) => computed.eq_ignore_ascii_case(sha1),
            Err(e) => {
                log::warn!("Failed to hash {:?}: {}", path, e);
                false
            }
        }
    }

    /// Write `bytes` to `path` by way of a `.part` sibling, fsync, then an
    /// atomic rename. The parent directory is fsynced afterwards so the
    /// rename itself is durable.
    pub async fn atomic_write(&self, path: &Path, bytes: &[u8]) -> Result<(), EngineError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| EngineError::io(parent, e))?;
        }

        let tmp = part_path(path);
        let mut file = tokio::fs::File::create(&tmp)
            .await
            .map_err(|e| EngineError::io(&tmp, e))?;
        file.write_all(bytes)
            .await
            .map_err(|e| EngineError::io(&tmp, e))?;
        file.sync_all().await.map_err(|e| EngineError::io(&tmp, e))?;
        drop(file);

        commit(&tmp, path).await
    }

    pub async fn remove_if_exists(&self, path: &Path) -> Result<(), EngineError> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(EngineError::io(path, e)),
        }
    }
}

/// Sibling temp-file name for an in-flight write.
pub fn part_path(path: &Path) -> PathBuf {
    let tmp_name = format!(
        "{}.part",
        path.file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("download")
    );
    path.with_file_name(tmp_name)
}

/// Rename a completed temp file into place and make the rename durable.
pub async fn commit(tmp: &Path, path: &Path) -> Result<(), EngineError> {
    tokio::fs::rename(tmp, path)
        .await
        .map_err(|e| EngineError::io(path, e))?;
    sync_parent_dir(path).await;
    Ok(())
}

async fn sync_parent_dir(path: &Path) {
    #[cfg(unix)]
    {
        if let Some(parent) = path.parent() {
            let parent = parent.to_path_buf();
            let _ = tokio::task::spawn_blocking(move || {
                std::fs::File::open(&parent).and_then(|dir| dir.sync_all())
            })
            .await;
        }
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
}

/// SHA-1 of a byte slice as lowercase hex.
pub fn sha1_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// SHA-1 of a file's content as lowercase hex.
pub async fn hash_file(path: &Path) -> Result<String, std::io::Error> {
    let bytes = tokio::fs::read(path).await?;
    Ok(sha1_hex(&bytes))
}
