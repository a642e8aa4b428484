//! Turns a task specification into a concrete prompt payload.

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::sync::{Arc, OnceLock};

use super::content::{template_for, OUTPUT_FORMAT_FOOTER, OUTPUT_FORMAT_HEADER};
use crate::error::{FieldViolation, PromptError};
use crate::llm::{GenerationRequest, Message};
use crate::pipeline::{ModelParams, TaskSpec};
use crate::schema::{Schema, SchemaRef, SchemaRegistry, TaskKind};

static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();

fn placeholder_regex() -> &'static Regex {
    PLACEHOLDER.get_or_init(|| {
        Regex::new(r"\{([a-z_][a-z0-9_]*)\}").expect("Invalid regex for template placeholders")
    })
}

/// A fully rendered request for one attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptPayload {
    pub kind: TaskKind,
    pub schema: SchemaRef,
    pub system: String,
    pub user: String,
    /// Resolved inputs (defaults applied) serialized as a JSON object.
    pub inputs: String,
    pub model_params: ModelParams,
}

impl PromptPayload {
    /// SHA-256 over everything that is sent to the model, hex encoded.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.model_params.model.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.system.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.user.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.model_params.temperature.to_le_bytes());
        hasher.update(self.model_params.max_tokens.to_le_bytes());
        if let Some(top_p) = self.model_params.top_p {
            hasher.update(top_p.to_le_bytes());
        }
        hex::encode(hasher.finalize())
    }

    /// Copy of this payload with a different sampling temperature.
    pub fn with_temperature(&self, temperature: f64) -> Self {
        let mut payload = self.clone();
        payload.model_params.temperature = temperature;
        payload
    }

    /// Copy of this payload that tells the model why its previous answer
    /// was rejected.
    pub fn with_feedback(&self, violations: &[FieldViolation]) -> Self {
        if violations.is_empty() {
            return self.clone();
        }
        let mut payload = self.clone();
        payload.user.push_str(
            "\n\n## PREVIOUS ATTEMPT REJECTED\n\nYour previous answer failed validation:\n",
        );
        for violation in violations {
            payload.user.push_str(&format!("- {}\n", violation));
        }
        payload
            .user
            .push_str("\nFix every listed problem and return the complete JSON object again.");
        payload
    }

    /// Converts the payload into a provider request.
    pub fn to_request(&self) -> GenerationRequest {
        let mut request = GenerationRequest::new(
            self.model_params.model.clone(),
            vec![
                Message::system(self.system.clone()),
                Message::user(self.user.clone()),
            ],
        )
        .with_temperature(self.model_params.temperature)
        .with_max_tokens(self.model_params.max_tokens);
        if let Some(top_p) = self.model_params.top_p {
            request = request.with_top_p(top_p);
        }
        request
    }
}

/// Builds prompt payloads from task specs using the schema registry.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    registry: Arc<SchemaRegistry>,
}

impl PromptBuilder {
    pub fn new(registry: Arc<SchemaRegistry>) -> Self {
        Self { registry }
    }

    /// Renders the payload for a task.
    ///
    /// Fails without side effects when required inputs are missing (absent,
    /// null or blank) or when inputs the schema does not declare are present.
    pub fn build(&self, task: &TaskSpec) -> Result<PromptPayload, PromptError> {
        let schema = self.registry.get(task.kind)?;
        let resolved = resolve_inputs(schema, task)?;

        let template = template_for(task.kind);
        let rendered = placeholder_regex().replace_all(template.user, |caps: &Captures| {
            match resolved.get(&caps[1]) {
                Some(value) => render_value(value),
                None => caps[0].to_string(),
            }
        });

        let skeleton = serde_json::to_string_pretty(&schema.skeleton())
            .unwrap_or_else(|_| schema.skeleton().to_string());
        let user = format!(
            "{}\n\n{}\n\nRespond with a single JSON object conforming to schema `{}`, \
             matching this skeleton:\n{}\n\nField requirements:\n{}\n\n{}",
            rendered.trim(),
            OUTPUT_FORMAT_HEADER,
            schema.schema_ref(),
            skeleton,
            schema.describe(),
            OUTPUT_FORMAT_FOOTER
        );

        Ok(PromptPayload {
            kind: task.kind,
            schema: schema.schema_ref(),
            system: template.system.to_string(),
            user,
            inputs: Value::Object(resolved).to_string(),
            model_params: task.model_params.clone(),
        })
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn resolve_inputs(schema: &Schema, task: &TaskSpec) -> Result<Map<String, Value>, PromptError> {
    let unknown: Vec<String> = task
        .inputs
        .keys()
        .filter(|name| schema.input(name).is_none())
        .cloned()
        .collect();

    let mut missing = Vec::new();
    let mut resolved = Map::new();
    for input in &schema.inputs {
        match task.inputs.get(&input.name) {
            Some(value) if !is_blank(value) => {
                resolved.insert(input.name.clone(), value.clone());
            }
            _ if input.required => missing.push(input.name.clone()),
            _ => {
                if let Some(default) = &input.default {
                    resolved.insert(input.name.clone(), default.clone());
                }
            }
        }
    }

    if !missing.is_empty() || !unknown.is_empty() {
        return Err(PromptError::InvalidTaskSpec {
            kind: task.kind.to_string(),
            missing,
            unknown,
        });
    }
    Ok(resolved)
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> PromptBuilder {
        PromptBuilder::new(Arc::new(SchemaRegistry::builtin().unwrap()))
    }

    #[test]
    fn test_build_background_discovery() {
        let task = TaskSpec::new(TaskKind::BackgroundDiscovery).with_input("topic", "Tidal energy");
        let payload = builder().build(&task).unwrap();

        assert_eq!(payload.kind, TaskKind::BackgroundDiscovery);
        assert_eq!(payload.schema.name, "background_brief");
        assert!(payload.user.contains("Topic: Tidal energy"));
        assert!(payload.user.contains("\"core_concepts\""));
        assert!(payload.user.contains("Output ONLY the JSON object"));
        assert!(payload.user.contains("schema `background_brief@1.0.0`"));
        assert!(payload.user.contains("- summary (string, required)"));
        assert_eq!(payload.inputs, r#"{"topic":"Tidal energy"}"#);
    }

    #[test]
    fn test_optional_inputs_use_defaults() {
        let task = TaskSpec::new(TaskKind::StructuralPlanning)
            .with_input("background_research", "Some research");
        let payload = builder().build(&task).unwrap();
        assert!(payload.user.contains("General audience with interest in the topic"));
        assert!(payload.user.contains("Article/Blog Post"));
        assert!(payload.inputs.contains("content_objectives"));
    }

    #[test]
    fn test_null_optional_input_uses_default() {
        let task = TaskSpec::new(TaskKind::StructuralPlanning)
            .with_input("background_research", "Some research")
            .with_input("content_type", Value::Null);
        let payload = builder().build(&task).unwrap();
        assert!(payload.user.contains("Article/Blog Post"));
    }

    #[test]
    fn test_missing_and_unknown_inputs() {
        let task = TaskSpec::new(TaskKind::DraftGeneration)
            .with_input("background_research", "   ")
            .with_input("tone", "witty");
        let err = builder().build(&task).unwrap_err();
        match err {
            PromptError::InvalidTaskSpec {
                missing, unknown, ..
            } => {
                assert_eq!(missing, vec!["background_research", "structural_plan"]);
                assert_eq!(unknown, vec!["tone"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_kind_propagates_registry_error() {
        let registry = SchemaRegistry::from_yaml_str(
            "- name: q\n  version: 1.0.0\n  kind: interest_discovery\n  fields:\n    - name: primary_question\n      type: string\n",
        )
        .unwrap();
        let builder = PromptBuilder::new(Arc::new(registry));
        let err = builder
            .build(&TaskSpec::new(TaskKind::BackgroundDiscovery).with_input("topic", "x"))
            .unwrap_err();
        assert!(matches!(err, PromptError::Registry(_)));
    }

    #[test]
    fn test_structured_inputs_render_as_json() {
        let task = TaskSpec::new(TaskKind::DraftGeneration)
            .with_input("background_research", serde_json::json!({"summary": "facts"}))
            .with_input("structural_plan", "plan");
        let payload = builder().build(&task).unwrap();
        assert!(payload.user.contains("\"summary\": \"facts\""));
    }

    #[test]
    fn test_input_text_with_braces_is_not_reexpanded() {
        let task = TaskSpec::new(TaskKind::StructuralPlanning)
            .with_input("background_research", "literal {target_audience} text");
        let payload = builder().build(&task).unwrap();
        assert!(payload.user.contains("literal {target_audience} text"));
    }

    #[test]
    fn test_fingerprint_is_stable_and_sensitive() {
        let task = TaskSpec::new(TaskKind::BackgroundDiscovery).with_input("topic", "Tides");
        let a = builder().build(&task).unwrap();
        let b = builder().build(&task).unwrap();
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);
        assert_ne!(a.fingerprint(), a.with_temperature(0.1).fingerprint());
    }

    #[test]
    fn test_with_feedback_lists_violations() {
        let task = TaskSpec::new(TaskKind::BackgroundDiscovery).with_input("topic", "Tides");
        let payload = builder().build(&task).unwrap();
        let retried =
            payload.with_feedback(&[FieldViolation::new("summary", "missing required field")]);
        assert!(retried.user.contains("PREVIOUS ATTEMPT REJECTED"));
        assert!(retried.user.contains("summary: missing required field"));
        assert_eq!(payload.with_feedback(&[]), payload);
    }

    #[test]
    fn test_to_request() {
        let task = TaskSpec::new(TaskKind::InterestDiscovery)
            .with_input("field_of_topic", "Nutrition")
            .with_input("keywords", "seed oils");
        let request = builder().build(&task).unwrap().to_request();
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].role, "system");
        assert_eq!(request.messages[1].role, "user");
        assert_eq!(request.max_tokens, Some(4000));
        assert_eq!(request.temperature, Some(0.7));
        assert_eq!(request.top_p, None);
    }
}
