//! Append-only storage for validated artifacts.
//!
//! Every accepted artifact gets an [`ArtifactId`] whose order matches
//! creation order. Two backends implement [`ArtifactStore`]:
//! - [`MemoryArtifactStore`] for tests and dry runs
//! - [`FileArtifactStore`], one JSON document per artifact
//!
//! ```rust,ignore
//! use content_forge::storage::{ArtifactStore, FileArtifactStore};
//! use futures::TryStreamExt;
//!
//! let store = FileArtifactStore::new("./out/artifacts");
//! let artifact = store.put(content, provenance).await?;
//! let drafts: Vec<_> = store
//!     .list(Some(TaskKind::DraftGeneration))
//!     .try_collect()
//!     .await?;
//! ```

pub mod artifacts;
pub mod file;
pub mod id;

pub use artifacts::{Artifact, ArtifactStore, MemoryArtifactStore, Provenance, TokenUsage};
pub use file::FileArtifactStore;
pub use id::ArtifactId;

use thiserror::Error;

/// Errors that can occur during artifact storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Failed to read or write to the filesystem.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to serialize or deserialize an artifact document.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// No artifact with this id.
    #[error("Artifact not found: {0}")]
    NotFound(ArtifactId),

    /// The storage directory could not be created.
    #[error("Failed to create storage directory: {0}")]
    DirectoryCreationFailed(String),

    /// A stored document is corrupted or inconsistent.
    #[error("Invalid artifact data: {0}")]
    InvalidData(String),
}
