//! File-backed artifact store.
//!
//! Each artifact is a pretty-printed JSON file named `<id>.json` in a single
//! directory. Writes go to a hidden temp file first and are renamed into
//! place, so a partially written artifact is never listed or loaded.

use async_stream::try_stream;
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::artifacts::{Artifact, ArtifactStore, Provenance};
use super::{ArtifactId, StorageError};
use crate::schema::TaskKind;
use crate::validation::ValidatedContent;

/// Directory of JSON artifact documents.
#[derive(Debug, Clone)]
pub struct FileArtifactStore {
    base_path: PathBuf,
}

impl FileArtifactStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Path of the document for `id`.
    pub fn artifact_path(&self, id: &ArtifactId) -> PathBuf {
        self.base_path.join(format!("{}.json", id))
    }

    fn temp_path(&self, id: &ArtifactId) -> PathBuf {
        self.base_path.join(format!(".{}.json.tmp", id))
    }

    async fn ensure_directory(&self) -> Result<(), StorageError> {
        if !fs::try_exists(&self.base_path).await.unwrap_or(false) {
            fs::create_dir_all(&self.base_path).await.map_err(|e| {
                StorageError::DirectoryCreationFailed(format!(
                    "Failed to create directory {:?}: {}",
                    self.base_path, e
                ))
            })?;
        }
        Ok(())
    }

    /// Ids of all stored artifacts, in creation order.
    pub async fn ids(&self) -> Result<Vec<ArtifactId>, StorageError> {
        if !fs::try_exists(&self.base_path).await.unwrap_or(false) {
            return Ok(Vec::new());
        }

        let mut ids = Vec::new();
        let mut entries = fs::read_dir(&self.base_path).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<ArtifactId>().ok())
            {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }

    async fn load(&self, id: ArtifactId) -> Result<Artifact, StorageError> {
        let contents = match fs::read_to_string(self.artifact_path(&id)).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(id));
            }
            Err(e) => return Err(e.into()),
        };
        let artifact: Artifact = serde_json::from_str(&contents)?;
        if artifact.id != id {
            return Err(StorageError::InvalidData(format!(
                "Artifact ID mismatch: expected {}, got {}",
                id, artifact.id
            )));
        }
        Ok(artifact)
    }

    async fn write_atomically(&self, artifact: &Artifact) -> Result<(), StorageError> {
        let json = serde_json::to_string_pretty(artifact)?;
        let temp = self.temp_path(&artifact.id);

        let written = async {
            let mut file = fs::File::create(&temp).await?;
            file.write_all(json.as_bytes()).await?;
            file.sync_all().await?;
            drop(file);
            fs::rename(&temp, self.artifact_path(&artifact.id)).await
        }
        .await;

        if let Err(e) = written {
            let _ = fs::remove_file(&temp).await;
            return Err(e.into());
        }
        Ok(())
    }
}

#[async_trait]
impl ArtifactStore for FileArtifactStore {
    async fn put(
        &self,
        content: ValidatedContent,
        provenance: Provenance,
    ) -> Result<Artifact, StorageError> {
        self.ensure_directory().await?;
        let artifact = Artifact::new(content, provenance);
        self.write_atomically(&artifact).await?;
        tracing::debug!(
            artifact_id = %artifact.id,
            kind = %artifact.kind,
            path = ?self.artifact_path(&artifact.id),
            "Stored artifact"
        );
        Ok(artifact)
    }

    async fn get(&self, id: ArtifactId) -> Result<Artifact, StorageError> {
        self.load(id).await
    }

    fn list(&self, kind: Option<TaskKind>) -> BoxStream<'_, Result<Artifact, StorageError>> {
        try_stream! {
            for id in self.ids().await? {
                let artifact = match self.load(id).await {
                    Ok(artifact) => artifact,
                    // Deleted between the directory scan and the read.
                    Err(StorageError::NotFound(_)) => continue,
                    Err(e) => Err(e)?,
                };
                if kind.is_none_or(|k| artifact.kind == k) {
                    yield artifact;
                }
            }
        }
        .boxed()
    }

    async fn delete(&self, id: ArtifactId) -> Result<(), StorageError> {
        match fs::remove_file(self.artifact_path(&id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::NotFound(id)),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::artifacts::tests::{content, provenance};
    use futures::TryStreamExt;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_put_get_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = FileArtifactStore::new(dir.path().join("artifacts"));

        let mut prov = provenance("task-1");
        prov.parent = Some(ArtifactId::generate());
        let artifact = store
            .put(content(TaskKind::DraftGeneration, "Draft"), prov)
            .await
            .unwrap();

        assert!(store.artifact_path(&artifact.id).exists());
        let loaded = store.get(artifact.id).await.unwrap();
        assert_eq!(loaded, artifact);
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = FileArtifactStore::new(dir.path());
        let id = ArtifactId::generate();
        assert!(matches!(store.get(id).await, Err(StorageError::NotFound(got)) if got == id));
    }

    #[tokio::test]
    async fn test_list_creation_order_and_filter() {
        let dir = TempDir::new().unwrap();
        let store = FileArtifactStore::new(dir.path());

        let mut ids = Vec::new();
        for i in 0..5 {
            let kind = if i % 2 == 0 {
                TaskKind::BackgroundDiscovery
            } else {
                TaskKind::StructuralPlanning
            };
            let artifact = store
                .put(content(kind, &format!("n{}", i)), provenance("t"))
                .await
                .unwrap();
            ids.push(artifact.id);
        }

        let listed: Vec<Artifact> = store.list(None).try_collect().await.unwrap();
        assert_eq!(listed.iter().map(|a| a.id).collect::<Vec<_>>(), ids);

        let plans: Vec<Artifact> = store
            .list(Some(TaskKind::StructuralPlanning))
            .try_collect()
            .await
            .unwrap();
        assert_eq!(plans.len(), 2);
        assert!(plans.iter().all(|a| a.kind == TaskKind::StructuralPlanning));
    }

    #[tokio::test]
    async fn test_list_empty_or_missing_directory() {
        let dir = TempDir::new().unwrap();
        let store = FileArtifactStore::new(dir.path().join("never-created"));
        let listed: Vec<Artifact> = store.list(None).try_collect().await.unwrap();
        assert!(listed.is_empty());
    }

    #[tokio::test]
    async fn test_temp_and_foreign_files_are_ignored() {
        let dir = TempDir::new().unwrap();
        let store = FileArtifactStore::new(dir.path());
        let artifact = store
            .put(content(TaskKind::DraftGeneration, "kept"), provenance("t"))
            .await
            .unwrap();

        let orphan = ArtifactId::generate();
        std::fs::write(store.temp_path(&orphan), "{\"partial\":").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "hello").unwrap();
        std::fs::write(dir.path().join("not-an-id.json"), "{}").unwrap();

        let listed: Vec<Artifact> = store.list(None).try_collect().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, artifact.id);
    }

    #[tokio::test]
    async fn test_delete() {
        let dir = TempDir::new().unwrap();
        let store = FileArtifactStore::new(dir.path());
        let artifact = store
            .put(content(TaskKind::InterestDiscovery, "q"), provenance("t"))
            .await
            .unwrap();

        store.delete(artifact.id).await.unwrap();
        assert!(!store.artifact_path(&artifact.id).exists());
        assert!(matches!(
            store.delete(artifact.id).await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_write_leaves_no_temp_file() {
        let dir = TempDir::new().unwrap();
        let store = FileArtifactStore::new(dir.path());
        let artifact = Artifact::new(
            content(TaskKind::DraftGeneration, "blocked"),
            provenance("t"),
        );
        // A non-empty directory at the target path makes the final rename fail.
        let target = store.artifact_path(&artifact.id);
        std::fs::create_dir(&target).unwrap();
        std::fs::write(target.join("occupant"), "x").unwrap();

        assert!(matches!(
            store.write_atomically(&artifact).await,
            Err(StorageError::Io(_))
        ));
        assert!(!store.temp_path(&artifact.id).exists());
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_corrupted_document_is_reported() {
        let dir = TempDir::new().unwrap();
        let store = FileArtifactStore::new(dir.path());
        let id = ArtifactId::generate();
        std::fs::write(store.artifact_path(&id), "not json").unwrap();
        assert!(matches!(
            store.get(id).await,
            Err(StorageError::Serialization(_))
        ));
    }
}
