//! Schema data types.
//!
//! A schema is pure data: the declared inputs of a task kind plus the
//! structural contract (fields, types, constraints) its output must satisfy.
//! Enforcement lives in `validation::ArtifactValidator`.

use semver::Version;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::error::RegistryError;

/// The kinds of generation task the studio knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Research brief for a topic.
    BackgroundDiscovery,
    /// Content outline built from background research.
    StructuralPlanning,
    /// Full content draft built from research and a plan.
    DraftGeneration,
    /// Attention-grabbing questions for a field and keywords.
    InterestDiscovery,
}

impl TaskKind {
    /// Returns all task kinds in declaration order.
    pub fn all() -> &'static [TaskKind] {
        &[
            TaskKind::BackgroundDiscovery,
            TaskKind::StructuralPlanning,
            TaskKind::DraftGeneration,
            TaskKind::InterestDiscovery,
        ]
    }

    /// Returns the snake_case identifier used in YAML, CLI and storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::BackgroundDiscovery => "background_discovery",
            TaskKind::StructuralPlanning => "structural_planning",
            TaskKind::DraftGeneration => "draft_generation",
            TaskKind::InterestDiscovery => "interest_discovery",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        TaskKind::all()
            .iter()
            .copied()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| RegistryError::UnknownTaskKind(s.to_string()))
    }
}

/// Name and version pair identifying a schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaRef {
    pub name: String,
    pub version: Version,
}

impl fmt::Display for SchemaRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

/// Primitive type of an output field or of an array's items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Integer => "integer",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Array => "array",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value constraints for a field.
///
/// For array fields `min_items`/`max_items` bound the array length and every
/// other constraint applies to each item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Constraints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_items: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_items: Option<usize>,
}

impl Constraints {
    /// Human-readable constraint list used in prompts and `schemas` output.
    pub fn describe(&self) -> Vec<String> {
        let mut parts = Vec::new();
        match (self.min_length, self.max_length) {
            (Some(min), Some(max)) => parts.push(format!("length {}-{} characters", min, max)),
            (Some(min), None) => parts.push(format!("at least {} characters", min)),
            (None, Some(max)) => parts.push(format!("at most {} characters", max)),
            (None, None) => {}
        }
        if let Some(pattern) = &self.pattern {
            parts.push(format!("must match /{}/", pattern));
        }
        if let Some(choices) = &self.choices {
            parts.push(format!("one of: {}", choices.join(", ")));
        }
        match (self.min, self.max) {
            (Some(min), Some(max)) => parts.push(format!("between {} and {}", min, max)),
            (Some(min), None) => parts.push(format!(">= {}", min)),
            (None, Some(max)) => parts.push(format!("<= {}", max)),
            (None, None) => {}
        }
        match (self.min_items, self.max_items) {
            (Some(min), Some(max)) => parts.push(format!("{}-{} items", min, max)),
            (Some(min), None) => parts.push(format!("at least {} items", min)),
            (None, Some(max)) => parts.push(format!("at most {} items", max)),
            (None, None) => {}
        }
        parts
    }
}

/// A declared task input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_true")]
    pub required: bool,
    /// Value used when an optional input is not supplied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

/// A declared output field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Item type for array fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<FieldType>,
    #[serde(default = "default_true")]
    pub required: bool,
    #[serde(default)]
    pub description: String,
    /// Conforming example value, used when a pattern makes one hard to derive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example: Option<Value>,
    #[serde(flatten)]
    pub constraints: Constraints,
}

/// What the validator does with keys the schema does not declare.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdditionalFields {
    #[default]
    Strip,
    Reject,
}

/// Structural contract for one task kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub name: String,
    pub version: Version,
    pub kind: TaskKind,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub inputs: Vec<InputSpec>,
    pub fields: Vec<FieldSpec>,
    #[serde(default)]
    pub additional_fields: AdditionalFields,
}

fn default_true() -> bool {
    true
}

impl Schema {
    pub fn schema_ref(&self) -> SchemaRef {
        SchemaRef {
            name: self.name.clone(),
            version: self.version.clone(),
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn input(&self, name: &str) -> Option<&InputSpec> {
        self.inputs.iter().find(|i| i.name == name)
    }

    pub fn required_inputs(&self) -> impl Iterator<Item = &InputSpec> {
        self.inputs.iter().filter(|i| i.required)
    }

    /// JSON skeleton of the expected output, with a type placeholder per field.
    pub fn skeleton(&self) -> Value {
        let mut map = Map::new();
        for field in &self.fields {
            let placeholder = match (field.field_type, field.items) {
                (FieldType::Array, Some(items)) => Value::Array(vec![Value::String(format!(
                    "<{}>",
                    items
                ))]),
                (FieldType::Array, None) => Value::Array(Vec::new()),
                (ty, _) => Value::String(format!("<{}>", ty)),
            };
            map.insert(field.name.clone(), placeholder);
        }
        Value::Object(map)
    }

    /// Plain-text description of the output contract: one line per field.
    pub fn describe(&self) -> String {
        let mut lines = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            let ty = match (field.field_type, field.items) {
                (FieldType::Array, Some(items)) => format!("array of {}", items),
                (ty, _) => ty.to_string(),
            };
            let mut line = format!(
                "- {} ({}, {})",
                field.name,
                ty,
                if field.required { "required" } else { "optional" }
            );
            let constraints = field.constraints.describe();
            if !constraints.is_empty() {
                line.push_str(&format!(" [{}]", constraints.join("; ")));
            }
            if !field.description.is_empty() {
                line.push_str(": ");
                line.push_str(&field.description);
            }
            lines.push(line);
        }
        lines.join("\n")
    }

    /// Builds a minimal document that satisfies this schema.
    ///
    /// Only required fields are populated. Fields carrying an `example` use it
    /// verbatim; all others get a value derived from their constraints.
    pub fn sample_instance(&self) -> Value {
        let mut map = Map::new();
        for field in self.fields.iter().filter(|f| f.required) {
            let value = match &field.example {
                Some(example) => example.clone(),
                None => sample_value(field),
            };
            map.insert(field.name.clone(), value);
        }
        Value::Object(map)
    }
}

fn sample_value(field: &FieldSpec) -> Value {
    match field.field_type {
        FieldType::Array => {
            let item_type = field.items.unwrap_or(FieldType::String);
            let mut count = field.constraints.min_items.unwrap_or(1);
            if let Some(max) = field.constraints.max_items {
                count = count.min(max);
            }
            Value::Array(
                (0..count)
                    .map(|i| sample_scalar(item_type, &field.name, i, &field.constraints))
                    .collect(),
            )
        }
        ty => sample_scalar(ty, &field.name, 0, &field.constraints),
    }
}

fn sample_scalar(ty: FieldType, name: &str, index: usize, c: &Constraints) -> Value {
    match ty {
        FieldType::String => {
            if let Some(first) = c.choices.as_ref().and_then(|choices| {
                choices.get(index % choices.len().max(1))
            }) {
                return Value::String(first.clone());
            }
            let mut text = format!("sample {} {}", name.replace('_', " "), index + 1);
            let min = c.min_length.unwrap_or(0);
            while text.chars().count() < min {
                text.push_str(" lorem ipsum");
            }
            if let Some(max) = c.max_length {
                text = text.chars().take(max).collect();
            }
            Value::String(text)
        }
        FieldType::Integer => {
            let value = match (c.min, c.max) {
                (Some(min), _) => min.ceil(),
                (None, Some(max)) if max < 1.0 => max.floor(),
                _ => 1.0,
            };
            Value::from(value as i64)
        }
        FieldType::Number => {
            let value = match (c.min, c.max) {
                (Some(min), _) => min,
                (None, Some(max)) if max < 1.0 => max,
                _ => 1.0,
            };
            serde_json::Number::from_f64(value)
                .map(Value::Number)
                .unwrap_or(Value::Null)
        }
        FieldType::Boolean => Value::Bool(true),
        FieldType::Array => Value::Array(Vec::new()),
    }
}
