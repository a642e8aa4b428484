//! Checks raw model output against a schema.
//!
//! The validator is the only place schema constraints are enforced. It never
//! repairs content beyond one explicit coercion: a string holding a number is
//! accepted where a number is expected.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::{FieldViolation, ValidationError};
use crate::llm::ModelResponse;
use crate::schema::{
    AdditionalFields, Constraints, FieldSpec, FieldType, Schema, SchemaRef, TaskKind,
};
use crate::utils::{extract_json, JsonExtraction};

/// Root path used for violations that concern the whole document.
pub const ROOT: &str = "$";

/// Model output that passed validation, reduced to the declared fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedContent {
    pub kind: TaskKind,
    pub schema: SchemaRef,
    pub fields: Map<String, Value>,
}

impl ValidatedContent {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.fields.clone())
    }
}

/// Validates model responses; caches compiled field patterns.
#[derive(Debug, Default)]
pub struct ArtifactValidator {
    patterns: RwLock<HashMap<String, Regex>>,
}

impl ArtifactValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `response` and checks it against `schema`.
    ///
    /// All field problems are collected so that a retry prompt can list them
    /// together.
    pub fn validate(
        &self,
        response: &ModelResponse,
        schema: &Schema,
    ) -> Result<ValidatedContent, ValidationError> {
        let violation = |violations: Vec<FieldViolation>| ValidationError::SchemaViolation {
            schema: schema.schema_ref().to_string(),
            violations,
        };

        let document = match extract_json(&response.text) {
            JsonExtraction::Found(value) => value,
            JsonExtraction::Truncated {
                unclosed_braces,
                unclosed_brackets,
                ..
            } => {
                return Err(violation(vec![FieldViolation::new(
                    ROOT,
                    format!(
                        "output truncated ({} unclosed braces, {} unclosed brackets, finish reason '{}')",
                        unclosed_braces, unclosed_brackets, response.finish_reason
                    ),
                )]));
            }
            JsonExtraction::NotFound if response.finish_reason == "length" => {
                return Err(violation(vec![FieldViolation::new(
                    ROOT,
                    "output truncated by the token limit before any JSON was produced",
                )]));
            }
            JsonExtraction::NotFound => {
                return Err(violation(vec![FieldViolation::new(
                    ROOT,
                    "no JSON object found in output",
                )]));
            }
        };

        let Value::Object(mut object) = document else {
            return Err(violation(vec![FieldViolation::new(
                ROOT,
                format!("expected a JSON object, got {}", json_type_name(&document)),
            )]));
        };

        let mut violations = Vec::new();
        let mut fields = Map::new();

        for spec in &schema.fields {
            match object.remove(&spec.name) {
                None | Some(Value::Null) => {
                    if spec.required {
                        violations.push(FieldViolation::new(&spec.name, "missing required field"));
                    }
                }
                Some(value) => {
                    if let Some(checked) = self.check_field(spec, value, &mut violations) {
                        fields.insert(spec.name.clone(), checked);
                    }
                }
            }
        }

        if !object.is_empty() {
            match schema.additional_fields {
                AdditionalFields::Strip => {
                    tracing::debug!(
                        schema = %schema.schema_ref(),
                        extra = ?object.keys().collect::<Vec<_>>(),
                        "Stripping undeclared fields"
                    );
                }
                AdditionalFields::Reject => {
                    for key in object.keys() {
                        violations.push(FieldViolation::new(
                            key,
                            "field is not declared by the schema",
                        ));
                    }
                }
            }
        }

        if !violations.is_empty() {
            return Err(violation(violations));
        }

        Ok(ValidatedContent {
            kind: schema.kind,
            schema: schema.schema_ref(),
            fields,
        })
    }

    fn check_field(
        &self,
        spec: &FieldSpec,
        value: Value,
        violations: &mut Vec<FieldViolation>,
    ) -> Option<Value> {
        if spec.field_type != FieldType::Array {
            return self.check_scalar(
                &spec.name,
                spec.field_type,
                &spec.constraints,
                value,
                violations,
            );
        }

        let Value::Array(items) = value else {
            violations.push(FieldViolation::new(
                &spec.name,
                format!("expected array, got {}", json_type_name(&value)),
            ));
            return None;
        };

        let before = violations.len();
        let c = &spec.constraints;
        if let Some(min) = c.min_items {
            if items.len() < min {
                violations.push(FieldViolation::new(
                    &spec.name,
                    format!("expected at least {} items, got {}", min, items.len()),
                ));
            }
        }
        if let Some(max) = c.max_items {
            if items.len() > max {
                violations.push(FieldViolation::new(
                    &spec.name,
                    format!("expected at most {} items, got {}", max, items.len()),
                ));
            }
        }

        let checked: Vec<Value> = match spec.items {
            Some(item_type) => items
                .into_iter()
                .enumerate()
                .filter_map(|(i, item)| {
                    let path = format!("{}[{}]", spec.name, i);
                    self.check_scalar(&path, item_type, c, item, violations)
                })
                .collect(),
            None => items,
        };

        (violations.len() == before).then_some(Value::Array(checked))
    }

    fn check_scalar(
        &self,
        path: &str,
        field_type: FieldType,
        c: &Constraints,
        value: Value,
        violations: &mut Vec<FieldViolation>,
    ) -> Option<Value> {
        let before = violations.len();
        let value = match field_type {
            FieldType::String => match value {
                Value::String(s) => {
                    self.check_string(path, &s, c, violations);
                    Value::String(s)
                }
                other => return type_mismatch(path, field_type, &other, violations),
            },
            FieldType::Integer => {
                let Some(n) = coerce_integer(&value) else {
                    return type_mismatch(path, field_type, &value, violations);
                };
                check_range(path, n as f64, c, violations);
                Value::from(n)
            }
            FieldType::Number => {
                let Some(n) = coerce_number(&value) else {
                    return type_mismatch(path, field_type, &value, violations);
                };
                check_range(path, n, c, violations);
                match value {
                    Value::Number(original) => Value::Number(original),
                    _ => Value::Number(Number::from_f64(n)?),
                }
            }
            FieldType::Boolean => match value {
                Value::Bool(b) => Value::Bool(b),
                other => return type_mismatch(path, field_type, &other, violations),
            },
            FieldType::Array => match value {
                Value::Array(items) => Value::Array(items),
                other => return type_mismatch(path, field_type, &other, violations),
            },
        };
        (violations.len() == before).then_some(value)
    }

    fn check_string(
        &self,
        path: &str,
        s: &str,
        c: &Constraints,
        violations: &mut Vec<FieldViolation>,
    ) {
        let len = s.chars().count();
        if let Some(min) = c.min_length {
            if len < min {
                violations.push(FieldViolation::new(
                    path,
                    format!("must be at least {} characters, got {}", min, len),
                ));
            }
        }
        if let Some(max) = c.max_length {
            if len > max {
                violations.push(FieldViolation::new(
                    path,
                    format!("must be at most {} characters, got {}", max, len),
                ));
            }
        }
        if let Some(choices) = &c.choices {
            if !choices.iter().any(|choice| choice == s) {
                violations.push(FieldViolation::new(
                    path,
                    format!("'{}' is not one of: {}", s, choices.join(", ")),
                ));
            }
        }
        if let Some(pattern) = &c.pattern {
            match self.matches_pattern(pattern, s) {
                Some(true) => {}
                Some(false) => violations.push(FieldViolation::new(
                    path,
                    format!("must match /{}/", pattern),
                )),
                None => violations.push(FieldViolation::new(
                    path,
                    format!("schema pattern /{}/ does not compile", pattern),
                )),
            }
        }
    }

    fn matches_pattern(&self, pattern: &str, s: &str) -> Option<bool> {
        if let Some(re) = self
            .patterns
            .read()
            .expect("pattern cache lock poisoned")
            .get(pattern)
        {
            return Some(re.is_match(s));
        }
        let re = Regex::new(pattern).ok()?;
        let matched = re.is_match(s);
        self.patterns
            .write()
            .expect("pattern cache lock poisoned")
            .insert(pattern.to_string(), re);
        Some(matched)
    }
}

fn type_mismatch(
    path: &str,
    expected: FieldType,
    value: &Value,
    violations: &mut Vec<FieldViolation>,
) -> Option<Value> {
    violations.push(FieldViolation::new(
        path,
        format!("expected {}, got {}", expected, json_type_name(value)),
    ));
    None
}

fn check_range(path: &str, n: f64, c: &Constraints, violations: &mut Vec<FieldViolation>) {
    if let Some(min) = c.min {
        if n < min {
            violations.push(FieldViolation::new(path, format!("must be >= {}, got {}", min, n)));
        }
    }
    if let Some(max) = c.max {
        if n > max {
            violations.push(FieldViolation::new(path, format!("must be <= {}, got {}", max, n)));
        }
    }
}

fn coerce_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    }
}

/// Integers also accept whole floats (`3.0`) and their string forms.
fn coerce_integer(value: &Value) -> Option<i64> {
    if let Some(i) = value.as_i64() {
        return Some(i);
    }
    if let Value::String(s) = value {
        if let Ok(i) = s.trim().parse::<i64>() {
            return Some(i);
        }
    }
    let n = coerce_number(value)?;
    (n.fract() == 0.0 && n.abs() < i64::MAX as f64).then_some(n as i64)
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
