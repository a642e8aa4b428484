//! Artifact records and the store interface.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::RwLock;

use super::{ArtifactId, StorageError};
use crate::llm::Usage;
use crate::pipeline::ModelParams;
use crate::schema::{SchemaRef, TaskKind};
use crate::validation::ValidatedContent;

/// Tokens consumed across every attempt that led to an artifact.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn add(&mut self, usage: &Usage) {
        self.input_tokens += u64::from(usage.prompt_tokens);
        self.output_tokens += u64::from(usage.completion_tokens);
    }

    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

impl std::ops::AddAssign for TokenUsage {
    fn add_assign(&mut self, other: Self) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }
}

/// How an artifact was produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub task_id: String,
    /// Pipeline attempts, including the accepted one.
    pub attempt_count: u32,
    /// Remote calls across all attempts, including transport retries.
    pub transport_calls: u32,
    pub model_params: ModelParams,
    /// sha256 of the base prompt payload.
    pub prompt_fingerprint: String,
    pub usage: TokenUsage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<ArtifactId>,
}

/// An accepted, immutable piece of generated content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: ArtifactId,
    pub kind: TaskKind,
    pub schema: SchemaRef,
    pub content: Map<String, Value>,
    pub provenance: Provenance,
    pub created_at: DateTime<Utc>,
}

impl Artifact {
    /// Seals validated content under a freshly allocated id.
    pub fn new(content: ValidatedContent, provenance: Provenance) -> Self {
        let id = ArtifactId::generate();
        Self {
            id,
            kind: content.kind,
            schema: content.schema,
            content: content.fields,
            provenance,
            created_at: id.created_at(),
        }
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.content.get(field).and_then(Value::as_str)
    }

    /// Content as a JSON object value.
    pub fn content_value(&self) -> Value {
        Value::Object(self.content.clone())
    }
}

/// Append-only mapping from id to artifact.
///
/// Implementations must make `put` atomic: a reader either sees the whole
/// artifact or nothing.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Assigns an id and persists the artifact.
    async fn put(
        &self,
        content: ValidatedContent,
        provenance: Provenance,
    ) -> Result<Artifact, StorageError>;

    async fn get(&self, id: ArtifactId) -> Result<Artifact, StorageError>;

    /// Artifacts in creation order, optionally restricted to one kind.
    fn list(&self, kind: Option<TaskKind>) -> BoxStream<'_, Result<Artifact, StorageError>>;

    /// Administrative removal. Not part of normal pipeline flow.
    async fn delete(&self, id: ArtifactId) -> Result<(), StorageError>;
}

/// In-process store backed by an ordered map.
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    artifacts: RwLock<BTreeMap<ArtifactId, Artifact>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.artifacts
            .read()
            .expect("artifact store lock poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn put(
        &self,
        content: ValidatedContent,
        provenance: Provenance,
    ) -> Result<Artifact, StorageError> {
        // Allocate under the write lock so map order and id order agree.
        let mut artifacts = self.artifacts.write().expect("artifact store lock poisoned");
        let artifact = Artifact::new(content, provenance);
        if artifacts.contains_key(&artifact.id) {
            return Err(StorageError::InvalidData(format!(
                "duplicate artifact id {}",
                artifact.id
            )));
        }
        artifacts.insert(artifact.id, artifact.clone());
        Ok(artifact)
    }

    async fn get(&self, id: ArtifactId) -> Result<Artifact, StorageError> {
        self.artifacts
            .read()
            .expect("artifact store lock poisoned")
            .get(&id)
            .cloned()
            .ok_or(StorageError::NotFound(id))
    }

    fn list(&self, kind: Option<TaskKind>) -> BoxStream<'_, Result<Artifact, StorageError>> {
        let snapshot: Vec<Artifact> = self
            .artifacts
            .read()
            .expect("artifact store lock poisoned")
            .values()
            .filter(|a| kind.is_none_or(|k| a.kind == k))
            .cloned()
            .collect();
        stream::iter(snapshot.into_iter().map(Ok)).boxed()
    }

    async fn delete(&self, id: ArtifactId) -> Result<(), StorageError> {
        self.artifacts
            .write()
            .expect("artifact store lock poisoned")
            .remove(&id)
            .map(|_| ())
            .ok_or(StorageError::NotFound(id))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::schema::SchemaRegistry;
    use futures::TryStreamExt;
    use semver::Version;
    use serde_json::json;

    pub(crate) fn content(kind: TaskKind, title: &str) -> ValidatedContent {
        let mut fields = Map::new();
        fields.insert("title".to_string(), json!(title));
        ValidatedContent {
            kind,
            schema: SchemaRef {
                name: "test_schema".to_string(),
                version: Version::new(1, 0, 0),
            },
            fields,
        }
    }

    pub(crate) fn provenance(task_id: &str) -> Provenance {
        Provenance {
            task_id: task_id.to_string(),
            attempt_count: 1,
            transport_calls: 1,
            model_params: ModelParams::for_kind(TaskKind::DraftGeneration),
            prompt_fingerprint: "ab".repeat(32),
            usage: TokenUsage {
                input_tokens: 120,
                output_tokens: 80,
            },
            parent: None,
        }
    }

    #[test]
    fn test_token_usage_accumulates() {
        let mut usage = TokenUsage::default();
        usage.add(&Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        });
        usage += TokenUsage {
            input_tokens: 1,
            output_tokens: 2,
        };
        assert_eq!(usage.input_tokens, 11);
        assert_eq!(usage.output_tokens, 7);
        assert_eq!(usage.total(), 18);
    }

    #[test]
    fn test_artifact_created_at_matches_id() {
        let artifact = Artifact::new(content(TaskKind::DraftGeneration, "x"), provenance("t"));
        assert_eq!(artifact.created_at, artifact.id.created_at());
        assert_eq!(artifact.get_str("title"), Some("x"));
    }

    #[test]
    fn test_artifact_serde_round_trip() {
        let artifact = Artifact::new(
            content(TaskKind::StructuralPlanning, "plan"),
            provenance("t"),
        );
        let json = serde_json::to_string(&artifact).unwrap();
        let back: Artifact = serde_json::from_str(&json).unwrap();
        assert_eq!(back, artifact);
    }

    #[tokio::test]
    async fn test_memory_put_get_delete() {
        let store = MemoryArtifactStore::new();
        let artifact = store
            .put(content(TaskKind::DraftGeneration, "draft"), provenance("t1"))
            .await
            .unwrap();

        let loaded = store.get(artifact.id).await.unwrap();
        assert_eq!(loaded, artifact);
        assert_eq!(store.len(), 1);

        store.delete(artifact.id).await.unwrap();
        assert!(matches!(
            store.get(artifact.id).await,
            Err(StorageError::NotFound(id)) if id == artifact.id
        ));
        assert!(matches!(
            store.delete(artifact.id).await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_memory_list_in_creation_order_with_filter() {
        let store = MemoryArtifactStore::new();
        let mut created = Vec::new();
        for (i, kind) in [
            TaskKind::BackgroundDiscovery,
            TaskKind::DraftGeneration,
            TaskKind::BackgroundDiscovery,
        ]
        .into_iter()
        .enumerate()
        {
            created.push(
                store
                    .put(content(kind, &format!("item {}", i)), provenance("t"))
                    .await
                    .unwrap(),
            );
        }

        let all: Vec<Artifact> = store.list(None).try_collect().await.unwrap();
        assert_eq!(all, created);

        let background: Vec<Artifact> = store
            .list(Some(TaskKind::BackgroundDiscovery))
            .try_collect()
            .await
            .unwrap();
        assert_eq!(background.len(), 2);
        assert!(background[0].id < background[1].id);
    }

    #[tokio::test]
    async fn test_memory_store_accepts_registry_samples() {
        let registry = SchemaRegistry::builtin().unwrap();
        let store = MemoryArtifactStore::new();
        for kind in registry.kinds() {
            let schema = registry.get(kind).unwrap();
            let fields = match schema.sample_instance() {
                Value::Object(map) => map,
                other => panic!("sample is not an object: {other}"),
            };
            let content = ValidatedContent {
                kind,
                schema: schema.schema_ref(),
                fields,
            };
            store.put(content, provenance("samples")).await.unwrap();
        }
        assert_eq!(store.len(), registry.len());
    }
}
