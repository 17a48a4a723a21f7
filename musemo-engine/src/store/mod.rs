//! Durable artifact storage
//!
//! The store is a capability interface: the orchestrator and the inference
//! engine hold an `Arc<dyn ArtifactStore>` and never construct a concrete
//! client themselves. [`FsArtifactStore`] is the bundled filesystem
//! implementation; tests substitute doubles.
//!
//! Creation is at-most-once per identity key. Concurrent writers for the same
//! key race safely: exactly one observes [`PutOutcome::Created`], every other
//! writer observes [`PutOutcome::AlreadyPresent`]. There is no update and no
//! delete; artifacts are immutable once created.

mod fs;

pub use fs::FsArtifactStore;

use crate::types::ArtifactRef;
use async_trait::async_trait;
use thiserror::Error;

/// Outcome of an idempotent write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// This writer created the artifact
    Created,
    /// The artifact already existed; payload untouched
    AlreadyPresent,
}

/// Store operation error
#[derive(Debug, Error)]
pub enum StoreError {
    /// Artifact or namespace does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Underlying storage I/O failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Keyed, idempotent storage for derived artifacts
///
/// All operations are safe under concurrent invocation, for the same track
/// and across distinct tracks.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Create-or-reuse the isolated namespace for a track. Never errors on
    /// "already exists".
    async fn ensure_namespace(&self, track_id: &str) -> Result<(), StoreError>;

    /// Whether the track namespace exists
    async fn namespace_exists(&self, track_id: &str) -> Result<bool, StoreError>;

    /// Idempotent write; first writer wins
    async fn put(&self, artifact: &ArtifactRef, bytes: &[u8]) -> Result<PutOutcome, StoreError>;

    /// Fetch an artifact payload; `NotFound` if absent
    async fn get(&self, artifact: &ArtifactRef) -> Result<Vec<u8>, StoreError>;

    /// Whether an artifact exists
    async fn exists(&self, artifact: &ArtifactRef) -> Result<bool, StoreError>;

    /// Descriptors of all artifacts in the track namespace
    async fn list(&self, track_id: &str) -> Result<Vec<ArtifactRef>, StoreError>;
}
