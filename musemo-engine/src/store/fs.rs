//! Filesystem-backed artifact store
//!
//! Layout: one directory per track namespace under the store root; object
//! file names are `kind-trackid[-userid].ext`, lower-cased. First-writer-wins
//! is implemented by staging the payload under a unique temporary name and
//! hard-linking it into place; the link call fails with `AlreadyExists` for
//! every writer but the first.

use super::{ArtifactStore, PutOutcome, StoreError};
use crate::types::{ArtifactKind, ArtifactRef};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::debug;
use uuid::Uuid;

/// Artifact store rooted at a local directory
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn namespace_dir(&self, track_id: &str) -> PathBuf {
        self.root.join(track_id.to_lowercase())
    }

    fn object_path(&self, artifact: &ArtifactRef) -> PathBuf {
        self.namespace_dir(&artifact.track_id)
            .join(artifact.object_name())
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn ensure_namespace(&self, track_id: &str) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(self.namespace_dir(track_id)).await?;
        Ok(())
    }

    async fn namespace_exists(&self, track_id: &str) -> Result<bool, StoreError> {
        Ok(tokio::fs::try_exists(self.namespace_dir(track_id)).await?)
    }

    async fn put(&self, artifact: &ArtifactRef, bytes: &[u8]) -> Result<PutOutcome, StoreError> {
        let dir = self.namespace_dir(&artifact.track_id);
        tokio::fs::create_dir_all(&dir).await?;

        let final_path = dir.join(artifact.object_name());
        if tokio::fs::try_exists(&final_path).await? {
            return Ok(PutOutcome::AlreadyPresent);
        }

        // Stage under a unique name, then link into place. The link is the
        // atomic claim on the identity key.
        let staging_path = dir.join(format!(".staging-{}", Uuid::new_v4()));
        tokio::fs::write(&staging_path, bytes).await?;

        let outcome = match tokio::fs::hard_link(&staging_path, &final_path).await {
            Ok(()) => Ok(PutOutcome::Created),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(PutOutcome::AlreadyPresent),
            Err(e) => Err(StoreError::Io(e)),
        };
        let _ = tokio::fs::remove_file(&staging_path).await;

        if let Ok(result) = &outcome {
            debug!(
                object = %artifact.object_name(),
                outcome = ?result,
                "Artifact put"
            );
        }
        outcome
    }

    async fn get(&self, artifact: &ArtifactRef) -> Result<Vec<u8>, StoreError> {
        let path = self.object_path(artifact);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StoreError::NotFound(artifact.object_name()))
            }
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    async fn exists(&self, artifact: &ArtifactRef) -> Result<bool, StoreError> {
        Ok(tokio::fs::try_exists(self.object_path(artifact)).await?)
    }

    async fn list(&self, track_id: &str) -> Result<Vec<ArtifactRef>, StoreError> {
        let track_id = track_id.to_lowercase();
        let dir = self.namespace_dir(&track_id);
        if !tokio::fs::try_exists(&dir).await? {
            return Err(StoreError::NotFound(track_id));
        }

        let mut entries = tokio::fs::read_dir(&dir).await?;
        let mut artifacts = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(artifact) = parse_object_name(&track_id, name) {
                artifacts.push(artifact);
            }
        }
        Ok(artifacts)
    }
}

/// Reverse of [`ArtifactRef::object_name`]; staging files and foreign names
/// yield `None`
fn parse_object_name(track_id: &str, name: &str) -> Option<ArtifactRef> {
    const KINDS: [ArtifactKind; 5] = [
        ArtifactKind::Mp3,
        ArtifactKind::Wav,
        ArtifactKind::Spectrogram,
        ArtifactKind::Features,
        ArtifactKind::Eda,
    ];

    for kind in KINDS {
        let Some(stem) = name.strip_suffix(&format!(".{}", kind.extension())) else {
            continue;
        };
        let prefix = format!("{}-{}", kind.as_str(), track_id);
        if stem == prefix {
            return Some(ArtifactRef::track(track_id, kind));
        }
        if let Some(user) = stem.strip_prefix(&format!("{}-", prefix)) {
            if !user.is_empty() {
                return Some(ArtifactRef::user(track_id, kind, user));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, FsArtifactStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path());
        (dir, store)
    }

    #[tokio::test]
    async fn test_put_then_get_round_trip() {
        let (_dir, store) = store();
        let artifact = ArtifactRef::track("abc", ArtifactKind::Mp3);

        let outcome = store.put(&artifact, b"payload").await.unwrap();
        assert_eq!(outcome, PutOutcome::Created);
        assert_eq!(store.get(&artifact).await.unwrap(), b"payload");
    }

    #[tokio::test]
    async fn test_second_put_is_already_present() {
        let (_dir, store) = store();
        let artifact = ArtifactRef::track("abc", ArtifactKind::Wav);

        assert_eq!(
            store.put(&artifact, b"first").await.unwrap(),
            PutOutcome::Created
        );
        assert_eq!(
            store.put(&artifact, b"second").await.unwrap(),
            PutOutcome::AlreadyPresent
        );
        // First writer wins; payload untouched
        assert_eq!(store.get(&artifact).await.unwrap(), b"first");
    }

    #[tokio::test]
    async fn test_concurrent_writers_single_creation() {
        let (_dir, store) = store();
        let artifact = ArtifactRef::track("abc", ArtifactKind::Spectrogram);

        let (a, b) = tokio::join!(
            store.put(&artifact, b"writer-a"),
            store.put(&artifact, b"writer-b"),
        );
        let outcomes = [a.unwrap(), b.unwrap()];
        let created = outcomes
            .iter()
            .filter(|o| **o == PutOutcome::Created)
            .count();
        assert_eq!(created, 1, "exactly one writer may create");

        let payload = store.get(&artifact).await.unwrap();
        assert!(payload == b"writer-a" || payload == b"writer-b");
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let (_dir, store) = store();
        let artifact = ArtifactRef::track("abc", ArtifactKind::Features);
        assert!(matches!(
            store.get(&artifact).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_ensure_namespace_idempotent() {
        let (_dir, store) = store();
        store.ensure_namespace("abc").await.unwrap();
        store.ensure_namespace("abc").await.unwrap();
        assert!(store.namespace_exists("abc").await.unwrap());
        assert!(!store.namespace_exists("other").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_returns_descriptors() {
        let (_dir, store) = store();
        store
            .put(&ArtifactRef::track("abc", ArtifactKind::Mp3), b"m")
            .await
            .unwrap();
        store
            .put(&ArtifactRef::user("abc", ArtifactKind::Eda, "u1"), b"{}")
            .await
            .unwrap();

        let mut listed = store.list("ABC").await.unwrap();
        listed.sort_by_key(|a| a.object_name());
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0], ArtifactRef::user("abc", ArtifactKind::Eda, "u1"));
        assert_eq!(listed[1], ArtifactRef::track("abc", ArtifactKind::Mp3));
    }

    #[tokio::test]
    async fn test_list_unknown_namespace_is_not_found() {
        let (_dir, store) = store();
        assert!(matches!(
            store.list("ghost").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_parse_object_name_rejects_staging() {
        assert!(parse_object_name("abc", ".staging-123").is_none());
        assert!(parse_object_name("abc", "mp3-other.mp3").is_none());
        assert_eq!(
            parse_object_name("abc", "eda-abc-u1.json"),
            Some(ArtifactRef::user("abc", ArtifactKind::Eda, "u1"))
        );
    }
}
