//! Artifact side channel: the well-known file a runner may leave behind.
//!
//! The slot is namespaced per chat session so turns of different sessions
//! never see each other's artifacts. Sessions are addressed by their
//! [`session_key`], which is distinct for distinct session ids and safe as a
//! single path component and URL segment. The same `exists` / `delete` pair
//! is used for the pre-clear before a turn and the inspection after it.

use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Route prefix the artifacts controller serves slots under
pub const ARTIFACT_URL_PREFIX: &str = "/api/artifacts";

/// Longest key kept as a plain encoding; longer ones are cut and suffixed
/// with a digest of the full session id.
const MAX_KEY_LEN: usize = 64;
const DIGEST_CHARS: usize = 16;

#[derive(Debug, Clone)]
pub struct ArtifactChannel {
    root: PathBuf,
    file_name: String,
}

impl ArtifactChannel {
    pub fn new(root: impl Into<PathBuf>, file_name: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            file_name: file_name.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// The artifact path for a session key.
    pub fn slot(&self, key: &str) -> PathBuf {
        self.root.join(key).join(&self.file_name)
    }

    /// Where clients fetch the artifact of a session key.
    pub fn url(&self, key: &str) -> String {
        format!("{}/{}/{}", ARTIFACT_URL_PREFIX, key, self.file_name)
    }

    /// Make sure the session's directory exists so the runner can write the artifact.
    pub async fn prepare(&self, key: &str) {
        let dir = self.root.join(key);
        if let Err(e) = tokio::fs::create_dir_all(&dir).await {
            log::warn!("[ARTIFACT] Failed to create {}: {}", dir.display(), e);
        }
    }

    /// Whether an artifact is present at `path`. Lookup errors count as absent.
    pub async fn exists(&self, path: &Path) -> bool {
        match tokio::fs::metadata(path).await {
            Ok(meta) => meta.is_file(),
            Err(e) => {
                if e.kind() != ErrorKind::NotFound {
                    log::warn!("[ARTIFACT] Could not inspect {}: {}", path.display(), e);
                }
                false
            }
        }
    }

    /// Remove the artifact at `path`. Missing files are fine; other failures are logged.
    pub async fn delete(&self, path: &Path) {
        match tokio::fs::remove_file(path).await {
            Ok(()) => log::debug!("[ARTIFACT] Removed stale artifact {}", path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => log::warn!("[ARTIFACT] Failed to remove {}: {}", path.display(), e),
        }
    }
}

/// Map a session id to its directory name.
///
/// ASCII letters, digits and `-` pass through; every other byte becomes `_`
/// followed by two hex digits, so different ids never share a key. Keys that
/// would exceed 64 characters keep a prefix plus `~` and a SHA-256 digest.
pub fn session_key(session_id: &str) -> String {
    if session_id.is_empty() {
        return "_".to_string();
    }

    let mut key = String::with_capacity(session_id.len());
    for byte in session_id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' {
            key.push(byte as char);
        } else {
            key.push('_');
            key.push_str(&hex::encode([byte]));
        }
    }
    if key.len() <= MAX_KEY_LEN {
        return key;
    }

    let digest = hex::encode(Sha256::digest(session_id.as_bytes()));
    let keep = MAX_KEY_LEN - DIGEST_CHARS - 1;
    format!("{}~{}", &key[..keep], &digest[..DIGEST_CHARS])
}

/// Whether `key` has the shape [`session_key`] produces.
pub fn is_session_key(key: &str) -> bool {
    !key.is_empty()
        && key.len() <= MAX_KEY_LEN
        && key
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'~'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_slot_is_namespaced_per_session() {
        let channel = ArtifactChannel::new("/tmp/artifacts", "activity_plot.png");
        assert_eq!(
            channel.slot("alice"),
            PathBuf::from("/tmp/artifacts/alice/activity_plot.png")
        );
        assert_ne!(channel.slot("alice"), channel.slot("bob"));
    }

    #[test]
    fn test_session_key_cannot_escape_root() {
        assert_eq!(session_key("../../etc"), "_2e_2e_2f_2e_2e_2fetc");
        assert_eq!(session_key(""), "_");
        let channel = ArtifactChannel::new("/tmp/artifacts", "plot.png");
        assert_eq!(
            channel.slot(&session_key("../x")),
            PathBuf::from("/tmp/artifacts/_2e_2e_2fx/plot.png")
        );
    }

    #[test]
    fn test_similar_session_ids_get_distinct_keys() {
        let ids = ["a.b", "a_b", "a b", "a_2eb", "", "_", "web", "Web"];
        let keys: std::collections::HashSet<String> = ids.iter().map(|id| session_key(id)).collect();
        assert_eq!(keys.len(), ids.len());

        let channel = ArtifactChannel::new("/tmp/artifacts", "activity_plot.png");
        assert_ne!(channel.slot(&session_key("a.b")), channel.slot(&session_key("a_b")));
    }

    #[test]
    fn test_long_session_ids_are_bounded_and_distinct() {
        let long_a = format!("{}a", "x".repeat(100));
        let long_b = format!("{}b", "x".repeat(100));
        let key_a = session_key(&long_a);

        assert_eq!(key_a.len(), 64);
        assert!(key_a.contains('~'));
        assert_ne!(key_a, session_key(&long_b));
        assert!(is_session_key(&key_a));
    }

    #[test]
    fn test_key_shape_check() {
        assert!(is_session_key("alice"));
        assert!(is_session_key(&session_key("user@example.com")));
        assert!(!is_session_key(""));
        assert!(!is_session_key(".."));
        assert!(!is_session_key("a/b"));
    }

    #[test]
    fn test_url_points_at_artifacts_route() {
        let channel = ArtifactChannel::new("/srv/artifacts", "activity_plot.png");
        assert_eq!(
            channel.url(&session_key("a.b")),
            "/api/artifacts/a_2eb/activity_plot.png"
        );
    }

    #[tokio::test]
    async fn test_exists_and_delete() {
        let dir = TempDir::new().unwrap();
        let channel = ArtifactChannel::new(dir.path(), "activity_plot.png");
        channel.prepare("web").await;
        let slot = channel.slot("web");

        assert!(!channel.exists(&slot).await);
        tokio::fs::write(&slot, b"png").await.unwrap();
        assert!(channel.exists(&slot).await);

        channel.delete(&slot).await;
        assert!(!channel.exists(&slot).await);

        // Second delete of a missing file is a no-op
        channel.delete(&slot).await;
    }

    #[tokio::test]
    async fn test_directory_is_not_an_artifact() {
        let dir = TempDir::new().unwrap();
        let channel = ArtifactChannel::new(dir.path(), "activity_plot.png");
        let slot = channel.slot("web");
        tokio::fs::create_dir_all(&slot).await.unwrap();
        assert!(!channel.exists(&slot).await);
    }
}
