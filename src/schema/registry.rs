//! Static registry mapping task kinds to their schemas.

use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::path::Path;

use super::types::{FieldSpec, FieldType, Schema, TaskKind};
use crate::error::RegistryError;

/// Embedded definitions for every built-in task kind.
const BUILTIN_SCHEMAS: &str = include_str!("builtin.yaml");

/// Read-only lookup of schemas by task kind.
///
/// Built once at startup and shared as `Arc<SchemaRegistry>`; it never
/// changes afterwards so no locking is needed.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    schemas: HashMap<TaskKind, Schema>,
}

impl SchemaRegistry {
    /// Loads the embedded built-in schemas.
    pub fn builtin() -> Result<Self, RegistryError> {
        Self::from_yaml_str(BUILTIN_SCHEMAS)
    }

    /// Parses a YAML list of schema definitions.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, RegistryError> {
        let definitions: Vec<Schema> = serde_yaml::from_str(yaml)?;
        Self::from_schemas(definitions)
    }

    /// Reads and parses a YAML file of schema definitions.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&yaml)
    }

    /// Builds a registry from already-parsed schemas, checking each definition.
    pub fn from_schemas(definitions: Vec<Schema>) -> Result<Self, RegistryError> {
        let mut schemas = HashMap::with_capacity(definitions.len());
        for schema in definitions {
            check_definition(&schema)?;
            if schemas.contains_key(&schema.kind) {
                return Err(RegistryError::DuplicateKind(schema.kind.to_string()));
            }
            tracing::debug!(
                kind = %schema.kind,
                schema = %schema.schema_ref(),
                fields = schema.fields.len(),
                "Registered schema"
            );
            schemas.insert(schema.kind, schema);
        }
        Ok(Self { schemas })
    }

    /// Returns the schema for a task kind.
    pub fn get(&self, kind: TaskKind) -> Result<&Schema, RegistryError> {
        self.schemas
            .get(&kind)
            .ok_or_else(|| RegistryError::UnknownTaskKind(kind.to_string()))
    }

    /// Returns the registered task kinds in declaration order.
    pub fn kinds(&self) -> Vec<TaskKind> {
        let mut kinds: Vec<TaskKind> = self.schemas.keys().copied().collect();
        kinds.sort();
        kinds
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

fn invalid(schema: &Schema, message: impl Into<String>) -> RegistryError {
    RegistryError::InvalidDefinition {
        schema: schema.name.clone(),
        message: message.into(),
    }
}

fn check_definition(schema: &Schema) -> Result<(), RegistryError> {
    if schema.name.trim().is_empty() {
        return Err(invalid(schema, "schema name is empty"));
    }
    if schema.fields.is_empty() {
        return Err(invalid(schema, "schema declares no fields"));
    }

    let mut seen = HashSet::new();
    for input in &schema.inputs {
        if !seen.insert(input.name.as_str()) {
            return Err(invalid(
                schema,
                format!("duplicate input '{}'", input.name),
            ));
        }
        if input.required && input.default.is_some() {
            return Err(invalid(
                schema,
                format!("required input '{}' must not declare a default", input.name),
            ));
        }
    }

    let mut seen = HashSet::new();
    for field in &schema.fields {
        if !seen.insert(field.name.as_str()) {
            return Err(invalid(
                schema,
                format!("duplicate field '{}'", field.name),
            ));
        }
        check_field(schema, field)?;
    }
    Ok(())
}

fn check_field(schema: &Schema, field: &FieldSpec) -> Result<(), RegistryError> {
    match (field.field_type, field.items) {
        (FieldType::Array, None) => {
            return Err(invalid(
                schema,
                format!("array field '{}' must declare an item type", field.name),
            ))
        }
        (FieldType::Array, Some(FieldType::Array)) => {
            return Err(invalid(
                schema,
                format!("field '{}': nested arrays are not supported", field.name),
            ))
        }
        (ty, Some(_)) if ty != FieldType::Array => {
            return Err(invalid(
                schema,
                format!("field '{}': only array fields may declare items", field.name),
            ))
        }
        _ => {}
    }

    let c = &field.constraints;
    let range_error = |min: String, max: String| RegistryError::InvalidRange {
        schema: schema.name.clone(),
        field: field.name.clone(),
        min,
        max,
    };
    if let (Some(min), Some(max)) = (c.min_length, c.max_length) {
        if min > max {
            return Err(range_error(min.to_string(), max.to_string()));
        }
    }
    if let (Some(min), Some(max)) = (c.min, c.max) {
        if min > max {
            return Err(range_error(min.to_string(), max.to_string()));
        }
    }
    if let (Some(min), Some(max)) = (c.min_items, c.max_items) {
        if min > max {
            return Err(range_error(min.to_string(), max.to_string()));
        }
    }
    if let Some(choices) = &c.choices {
        if choices.is_empty() {
            return Err(invalid(
                schema,
                format!("field '{}' declares an empty choice list", field.name),
            ));
        }
    }
    if let Some(pattern) = &c.pattern {
        Regex::new(pattern).map_err(|e| RegistryError::InvalidPattern {
            field: field.name.clone(),
            pattern: pattern.clone(),
            message: e.to_string(),
        })?;
    }
    Ok(())
}
