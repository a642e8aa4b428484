//! Task specifications submitted to the pipeline.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::schema::TaskKind;
use crate::storage::ArtifactId;

/// Default model identifier (OpenRouter naming).
pub const DEFAULT_MODEL: &str = "openai/gpt-4.1";

/// Sampling parameters sent with every request for a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelParams {
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
}

impl ModelParams {
    /// Per-kind defaults: factual stages run cooler, creative stages warmer.
    pub fn for_kind(kind: TaskKind) -> Self {
        let (max_tokens, temperature) = match kind {
            TaskKind::BackgroundDiscovery => (4000, 0.3),
            TaskKind::StructuralPlanning => (3000, 0.4),
            TaskKind::DraftGeneration => (5000, 0.6),
            TaskKind::InterestDiscovery => (4000, 0.7),
        };
        Self {
            model: DEFAULT_MODEL.to_string(),
            temperature,
            max_tokens,
            top_p: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_top_p(mut self, top_p: f64) -> Self {
        self.top_p = Some(top_p);
        self
    }
}

/// A declarative generation request.
///
/// Built once with the `with_*` methods and then handed to the orchestrator
/// by value; nothing in the pipeline mutates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub task_id: String,
    pub kind: TaskKind,
    #[serde(default)]
    pub inputs: BTreeMap<String, Value>,
    pub model_params: ModelParams,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<ArtifactId>,
}

impl TaskSpec {
    /// Creates a task with a fresh id and the kind's default model params.
    pub fn new(kind: TaskKind) -> Self {
        Self {
            task_id: Uuid::new_v4().to_string(),
            kind,
            inputs: BTreeMap::new(),
            model_params: ModelParams::for_kind(kind),
            parent: None,
        }
    }

    pub fn with_task_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = task_id.into();
        self
    }

    pub fn with_input(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.inputs.insert(name.into(), value.into());
        self
    }

    pub fn with_inputs(mut self, inputs: impl IntoIterator<Item = (String, Value)>) -> Self {
        self.inputs.extend(inputs);
        self
    }

    pub fn with_model_params(mut self, params: ModelParams) -> Self {
        self.model_params = params;
        self
    }

    pub fn with_parent(mut self, parent: ArtifactId) -> Self {
        self.parent = Some(parent);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_spec_defaults_per_kind() {
        let task = TaskSpec::new(TaskKind::DraftGeneration);
        assert_eq!(task.model_params.max_tokens, 5000);
        assert!((task.model_params.temperature - 0.6).abs() < f64::EPSILON);
        assert_eq!(task.model_params.model, DEFAULT_MODEL);
        assert!(task.parent.is_none());
        assert!(!task.task_id.is_empty());
    }

    #[test]
    fn test_task_ids_are_distinct() {
        let a = TaskSpec::new(TaskKind::BackgroundDiscovery);
        let b = TaskSpec::new(TaskKind::BackgroundDiscovery);
        assert_ne!(a.task_id, b.task_id);
    }

    #[test]
    fn test_builder_methods() {
        let parent = ArtifactId::generate();
        let task = TaskSpec::new(TaskKind::BackgroundDiscovery)
            .with_task_id("t-1")
            .with_input("topic", "Rust ownership")
            .with_model_params(
                ModelParams::for_kind(TaskKind::BackgroundDiscovery)
                    .with_model("test/model")
                    .with_top_p(0.9),
            )
            .with_parent(parent);
        assert_eq!(task.task_id, "t-1");
        assert_eq!(task.inputs["topic"], Value::from("Rust ownership"));
        assert_eq!(task.model_params.model, "test/model");
        assert_eq!(task.model_params.top_p, Some(0.9));
        assert_eq!(task.parent, Some(parent));
    }

    #[test]
    fn test_task_spec_deserializes_without_optional_parts() {
        let json = r#"{
            "task_id": "abc",
            "kind": "interest_discovery",
            "model_params": {"model": "m", "temperature": 0.5, "max_tokens": 100}
        }"#;
        let task: TaskSpec = serde_json::from_str(json).unwrap();
        assert!(task.inputs.is_empty());
        assert!(task.parent.is_none());
        assert_eq!(task.model_params.top_p, None);
    }
}
