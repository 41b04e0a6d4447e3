//! JSON file storage engine
//!
//! Persists the whole namespace as one JSON object mapping
//! `"{table}.{key}"` to `{value, expires_at}`. All writes use atomic
//! temp-file + rename to prevent corruption on crash. A tokio Mutex
//! serializes mutations; the in-memory image is only replaced once the new
//! image is on disk, so a failed write leaves both in their previous state.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::backend::{BackendFuture, KvBackend, StoredItem};
use crate::error::{Error, Result};

type Image = HashMap<String, StoredItem>;

/// File-backed engine that survives process restarts.
pub struct FileBackend {
    path: PathBuf,
    state: Mutex<Image>,
}

impl FileBackend {
    /// Load the store from the given file path.
    ///
    /// If the file doesn't exist, creates it as `{}` (cold start).
    pub async fn load(path: PathBuf) -> Result<Self> {
        let state = if tokio::fs::try_exists(&path)
            .await
            .map_err(|e| Error::Unavailable(format!("checking store file: {e}")))?
        {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Unavailable(format!("reading store file: {e}")))?;
            let image: Image = serde_json::from_str(&contents)
                .map_err(|e| Error::Unavailable(format!("parsing store file: {e}")))?;
            info!(path = %path.display(), entries = image.len(), "loaded credential store");
            image
        } else {
            info!(path = %path.display(), "store file not found, starting with empty store");
            let image = HashMap::new();
            write_atomic(&path, &image).await?;
            image
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply `change` to a copy of the image and persist it.
    ///
    /// `change` returns `(modified, output)`; unmodified images are not
    /// rewritten.
    async fn mutate<R>(&self, change: impl FnOnce(&mut Image) -> (bool, R)) -> Result<R> {
        let mut state = self.state.lock().await;
        let mut next = state.clone();
        let (modified, output) = change(&mut next);
        if modified {
            write_atomic(&self.path, &next).await?;
            *state = next;
        }
        Ok(output)
    }
}

impl KvBackend for FileBackend {
    fn get<'a>(&'a self, key: &'a str) -> BackendFuture<'a, Option<StoredItem>> {
        Box::pin(async move { Ok(self.state.lock().await.get(key).cloned()) })
    }

    fn put<'a>(&'a self, key: &'a str, item: StoredItem) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            self.mutate(|image| {
                image.insert(key.to_string(), item);
                (true, ())
            })
            .await
        })
    }

    fn remove<'a>(&'a self, key: &'a str) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            self.mutate(|image| (image.remove(key).is_some(), ()))
                .await
        })
    }

    fn take<'a>(&'a self, key: &'a str) -> BackendFuture<'a, Option<StoredItem>> {
        Box::pin(async move {
            self.mutate(|image| {
                let taken = image.remove(key);
                (taken.is_some(), taken)
            })
            .await
        })
    }

    fn remove_expired<'a>(&'a self, key: &'a str, now_millis: u64) -> BackendFuture<'a, bool> {
        Box::pin(async move {
            self.mutate(|image| {
                let expired = image
                    .get(key)
                    .is_some_and(|item| item.is_expired(now_millis));
                if expired {
                    image.remove(key);
                }
                (expired, expired)
            })
            .await
        })
    }

    fn keys<'a>(&'a self, prefix: &'a str) -> BackendFuture<'a, Vec<String>> {
        Box::pin(async move {
            let state = self.state.lock().await;
            Ok(state
                .keys()
                .filter(|k| k.starts_with(prefix))
                .cloned()
                .collect())
        })
    }
}

/// Write the image to a file atomically.
///
/// Writes to a temporary file in the same directory, then renames it over
/// the target. Sets file permissions to 0600 (owner read/write only) since
/// the file contains private keys and tokens.
async fn write_atomic(path: &Path, image: &Image) -> Result<()> {
    let json = serde_json::to_string_pretty(image)
        .map_err(|e| Error::Unavailable(format!("serializing store: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Unavailable("store path has no parent directory".into()))?;

    // One temp file per target; several stores may share a directory
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::Unavailable("store path has no file name".into()))?;
    let tmp_path = dir.join(format!(".{file_name}.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Unavailable(format!("writing temp store file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Unavailable(format!("setting store file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Unavailable(format!("renaming temp store file: {e}")))?;

    debug!(path = %path.display(), entries = image.len(), "persisted store");
    Ok(())
}
