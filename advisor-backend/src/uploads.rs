//! Files users attach to chat turns.
//!
//! Each upload is streamed to a fresh, uniquely named file under the upload
//! root. A file that goes over the size limit or whose stream breaks is
//! removed before the error is returned, so the root only ever holds complete
//! uploads. `prune` clears uploads older than the retention window.

use futures_util::{Stream, StreamExt};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// Longest stem or extension kept from a client-supplied name
const MAX_NAME_PART: usize = 64;

#[derive(Debug)]
pub enum UploadError {
    TooLarge { limit: usize },
    /// The request body broke off mid-file
    Stream(String),
    Io(std::io::Error),
}

impl fmt::Display for UploadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadError::TooLarge { limit } => write!(f, "File exceeds the {} byte upload limit", limit),
            UploadError::Stream(e) => write!(f, "Upload interrupted: {}", e),
            UploadError::Io(e) => write!(f, "Failed to store upload: {}", e),
        }
    }
}

impl std::error::Error for UploadError {}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredUpload {
    pub path: PathBuf,
    pub size: usize,
}

pub struct UploadStore {
    root: PathBuf,
    max_file_bytes: usize,
    retention: Duration,
}

impl UploadStore {
    pub fn new(root: PathBuf, max_file_bytes: usize, retention: Duration) -> Self {
        Self {
            root,
            max_file_bytes,
            retention,
        }
    }

    /// Stream `chunks` into a new file named after `original`.
    pub async fn save<S, B, E>(&self, original: &str, mut chunks: S) -> Result<StoredUpload, UploadError>
    where
        S: Stream<Item = Result<B, E>> + Unpin,
        B: AsRef<[u8]>,
        E: fmt::Display,
    {
        let path = self
            .root
            .join(format!("{}-{}", Uuid::new_v4(), stored_file_name(original)));

        match self.write_chunks(&path, &mut chunks).await {
            Ok(size) => Ok(StoredUpload { path, size }),
            Err(e) => {
                log::warn!("[UPLOADS] Discarding partial upload {}: {}", path.display(), e);
                self.discard(&path).await;
                Err(e)
            }
        }
    }

    async fn write_chunks<S, B, E>(&self, path: &Path, chunks: &mut S) -> Result<usize, UploadError>
    where
        S: Stream<Item = Result<B, E>> + Unpin,
        B: AsRef<[u8]>,
        E: fmt::Display,
    {
        let mut file = tokio::fs::File::create(path).await.map_err(UploadError::Io)?;
        let mut size = 0usize;
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk.map_err(|e| UploadError::Stream(e.to_string()))?;
            let data = chunk.as_ref();
            size += data.len();
            if size > self.max_file_bytes {
                return Err(UploadError::TooLarge {
                    limit: self.max_file_bytes,
                });
            }
            file.write_all(data).await.map_err(UploadError::Io)?;
        }
        file.flush().await.map_err(UploadError::Io)?;
        Ok(size)
    }

    /// Remove a stored upload. A file that is already gone is not an error.
    pub async fn discard(&self, path: &Path) {
        match tokio::fs::remove_file(path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => log::warn!("[UPLOADS] Failed to remove {}: {}", path.display(), e),
        }
    }

    /// Delete uploads last modified before the retention window. Returns how
    /// many files were removed.
    pub async fn prune(&self) -> usize {
        let Some(cutoff) = SystemTime::now().checked_sub(self.retention) else {
            return 0;
        };

        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) => {
                log::warn!("[UPLOADS] Cannot read {}: {}", self.root.display(), e);
                return 0;
            }
        };

        let mut removed = 0;
        while let Ok(Some(entry)) = entries.next_entry().await {
            let Ok(meta) = entry.metadata().await else { continue };
            if !meta.is_file() {
                continue;
            }
            let expired = meta.modified().map(|m| m < cutoff).unwrap_or(false);
            if expired && tokio::fs::remove_file(entry.path()).await.is_ok() {
                removed += 1;
            }
        }

        if removed > 0 {
            log::info!("[UPLOADS] Pruned {} expired upload(s)", removed);
        }
        removed
    }
}

/// Keep only the final component of a client-supplied file name, with every
/// character outside `[A-Za-z0-9_-]` in the stem and extension replaced.
pub fn stored_file_name(original: &str) -> String {
    let base = Path::new(original)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(original);
    let (stem, ext) = match base.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (base, None),
    };
    match ext {
        Some(ext) => format!("{}.{}", name_part(stem), name_part(ext)),
        None => name_part(stem),
    }
}

fn name_part(raw: &str) -> String {
    let part: String = raw
        .chars()
        .take(MAX_NAME_PART)
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if part.is_empty() {
        "file".to_string()
    } else {
        part
    }
}
