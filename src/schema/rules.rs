//! Field rule compilation and predicate evaluation
//!
//! Every field compiles into a [`FieldRule`]: presence metadata (required,
//! default) plus an ordered list of [`Predicate`]s. Predicates are evaluated
//! in order and the first failure stops the field. Only nested predicates
//! change the value (they fill defaults inside embedded documents).

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveTime};
use serde_json::Value;

use super::choices::{values, values_equal};
use super::errors::{leaf_name, Violation};
use super::types::{FieldSpec, FieldType, RelationKind, RelationSpec};
use super::validator::{make_path, Validator};

/// Which side of a range a bound limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    Min,
    Max,
}

/// How an embedded field holds its documents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedMode {
    /// A single document
    One,
    /// A list of documents, or a single document
    Many,
    /// A mapping of key -> document
    ManyAsObject,
}

/// One compiled check
#[derive(Debug, Clone)]
pub enum Predicate {
    /// Runtime type must match the declared primitive
    TypeCheck(FieldType),
    /// Numeric bound
    Range { bound: Bound, limit: f64 },
    /// String length bound, in characters
    Length { bound: Bound, limit: f64 },
    /// Value (or every element, for arrays) must be a canonical choice value
    Membership { allowed: Vec<Value>, each_element: bool },
    /// Run a nested validator against the value
    Nested { mode: EmbedMode, validator: Arc<Validator> },
}

/// Compiled rules for one field
#[derive(Debug, Clone)]
pub struct FieldRule {
    pub name: String,
    pub required: bool,
    /// Filled (deep-copied) when the field is absent
    pub default: Option<Value>,
    pub predicates: Vec<Predicate>,
    /// Cleanup: drop the key when its value is one of these
    pub delete_if_value_in: Vec<Value>,
    /// Cleanup: keep only map entries whose key is an existing id of this model
    pub autoclean_model: Option<String>,
}

impl FieldRule {
    fn new(name: &str, required: bool, default: Option<Value>) -> Self {
        Self {
            name: name.to_string(),
            required,
            default,
            predicates: Vec::new(),
            delete_if_value_in: Vec::new(),
            autoclean_model: None,
        }
    }

    /// Nested validator and its embedding mode, if this is an embedded field
    pub fn nested(&self) -> Option<(EmbedMode, &Arc<Validator>)> {
        self.predicates.iter().find_map(|p| match p {
            Predicate::Nested { mode, validator } => Some((*mode, validator)),
            _ => None,
        })
    }

    /// Runs every predicate in order against a present value.
    pub(crate) fn evaluate(&self, value: Value, path: &str) -> Result<Value, Vec<Violation>> {
        let mut value = value;
        for predicate in &self.predicates {
            value = predicate.evaluate(value, path, self.required)?;
        }
        Ok(value)
    }
}

/// Compiles one property.
///
/// `nested` must be the resolved validator when the property type is a
/// reference to another definition; it is ignored otherwise.
pub fn compile_property(field: &str, spec: &FieldSpec, nested: Option<Arc<Validator>>) -> FieldRule {
    let mut rule = FieldRule::new(field, spec.required, spec.default.clone());
    rule.delete_if_value_in = spec.delete_key_if_value_in.clone();

    match &spec.field_type {
        FieldType::Any => {}
        FieldType::Reference(_) => {
            if let Some(validator) = nested {
                rule.predicates = vec![Predicate::Nested {
                    mode: EmbedMode::One,
                    validator,
                }];
            }
            return rule;
        }
        primitive => rule.predicates.push(Predicate::TypeCheck(primitive.clone())),
    }

    if spec.field_type.is_numeric() {
        if let Some(min) = spec.min {
            rule.predicates.push(Predicate::Range { bound: Bound::Min, limit: min });
        }
        if let Some(max) = spec.max {
            rule.predicates.push(Predicate::Range { bound: Bound::Max, limit: max });
        }
    }

    if spec.field_type == FieldType::String {
        if let Some(min) = spec.min {
            rule.predicates.push(Predicate::Length { bound: Bound::Min, limit: min });
        }
        if let Some(max) = spec.max {
            rule.predicates.push(Predicate::Length { bound: Bound::Max, limit: max });
        }
    }

    if let Some(choices) = &spec.choices {
        rule.predicates.push(Predicate::Membership {
            allowed: values(choices).into_iter().cloned().collect(),
            each_element: spec.field_type == FieldType::Array,
        });
    }

    rule
}

/// Compiles one relation. Embedded kinds need their target's validator;
/// storage-only kinds compile to a rule without predicates.
pub fn compile_relation(field: &str, spec: &RelationSpec, nested: Option<Arc<Validator>>) -> FieldRule {
    let mut rule = FieldRule::new(field, spec.required, spec.default.clone());

    let mode = match spec.kind {
        RelationKind::EmbedsOne => EmbedMode::One,
        RelationKind::EmbedsMany => EmbedMode::Many,
        RelationKind::EmbedsManyAsObject => EmbedMode::ManyAsObject,
        RelationKind::BelongsTo | RelationKind::HasOne | RelationKind::HasMany => return rule,
    };

    if let Some(validator) = nested {
        rule.predicates.push(Predicate::Nested { mode, validator });
    }

    if mode == EmbedMode::ManyAsObject {
        rule.autoclean_model = spec
            .key
            .as_ref()
            .and_then(|k| k.autoclean_model())
            .map(str::to_string);
    }

    rule
}

impl Predicate {
    /// Evaluates against a present value. `required` decides whether null
    /// short-circuits to a pass.
    pub(crate) fn evaluate(
        &self,
        value: Value,
        path: &str,
        required: bool,
    ) -> Result<Value, Vec<Violation>> {
        if value.is_null() && !required {
            return Ok(value);
        }

        match self {
            Predicate::TypeCheck(FieldType::GeoPoint) => normalize_geo_point(value, path),
            Predicate::TypeCheck(expected) => {
                check_type(expected, &value, path)?;
                Ok(value)
            }
            Predicate::Range { bound, limit } => {
                let n = value.as_f64().ok_or_else(|| {
                    vec![Violation::type_mismatch(path, "number", json_type_name(&value))]
                })?;
                let ok = match bound {
                    Bound::Min => n >= *limit,
                    Bound::Max => n <= *limit,
                };
                if !ok {
                    let msg = match bound {
                        Bound::Min => format!("Key '{}' error: {} is less than min {}", leaf_name(path), value, limit),
                        Bound::Max => format!("Key '{}' error: {} is greater than max {}", leaf_name(path), value, limit),
                    };
                    return Err(vec![Violation::new(path, msg)]);
                }
                Ok(value)
            }
            Predicate::Length { bound, limit } => {
                let len = value.as_str().map_or(0, |s| s.chars().count()) as f64;
                match bound {
                    Bound::Min if len < *limit => Err(vec![Violation::new(
                        path,
                        format!("Field '{}' value is too small. Required {} chars", leaf_name(path), limit),
                    )]),
                    Bound::Max if len > *limit => Err(vec![Violation::new(
                        path,
                        format!("Field '{}' value is too long. Allowed max {} chars", leaf_name(path), limit),
                    )]),
                    _ => Ok(value),
                }
            }
            Predicate::Membership { allowed, each_element } => {
                let ok = if *each_element {
                    value
                        .as_array()
                        .map_or(value.is_null(), |items| {
                            items.iter().all(|item| contains(allowed, item))
                        })
                } else {
                    contains(allowed, &value)
                };
                if !ok {
                    let rendered = Value::Array(allowed.clone());
                    return Err(vec![Violation::new(
                        path,
                        format!("Key '{}' value not in choices: {}", leaf_name(path), rendered),
                    )]);
                }
                Ok(value)
            }
            Predicate::Nested { mode, validator } => evaluate_nested(*mode, validator, value, path),
        }
    }
}

fn evaluate_nested(
    mode: EmbedMode,
    validator: &Validator,
    value: Value,
    path: &str,
) -> Result<Value, Vec<Violation>> {
    match (mode, value) {
        (EmbedMode::One, doc @ Value::Object(_)) => validator.check_document(doc, path),
        (EmbedMode::Many, Value::Array(items)) => {
            let mut checked = Vec::with_capacity(items.len());
            for (i, item) in items.into_iter().enumerate() {
                let item_path = format!("{}[{}]", path, i);
                checked.push(validator.check_document(item, &item_path)?);
            }
            Ok(Value::Array(checked))
        }
        // A single mapping is accepted where a list is declared.
        (EmbedMode::Many, doc @ Value::Object(_)) => validator.check_document(doc, path),
        (EmbedMode::ManyAsObject, Value::Object(entries)) => {
            let mut checked = serde_json::Map::with_capacity(entries.len());
            let mut violations = Vec::new();
            for (key, item) in entries {
                let item_path = make_path(path, &key);
                match validator.check_document(item, &item_path) {
                    Ok(doc) => {
                        checked.insert(key, doc);
                    }
                    Err(mut errs) => {
                        for v in &mut errs {
                            v.message = format!("Invalid key '{}': {}", key, v.message);
                        }
                        violations.extend(errs);
                    }
                }
            }
            if violations.is_empty() {
                Ok(Value::Object(checked))
            } else {
                Err(violations)
            }
        }
        (EmbedMode::Many, other) => Err(vec![Violation::type_mismatch(
            path,
            "array",
            json_type_name(&other),
        )]),
        (_, other) => Err(vec![Violation::type_mismatch(
            path,
            "object",
            json_type_name(&other),
        )]),
    }
}

fn check_type(expected: &FieldType, value: &Value, path: &str) -> Result<(), Vec<Violation>> {
    let ok = match expected {
        FieldType::String => value.is_string(),
        FieldType::Int => value.is_i64() || value.is_u64(),
        FieldType::Float | FieldType::Number => value.is_number(),
        FieldType::Bool => value.is_boolean(),
        FieldType::Object => value.is_object(),
        FieldType::Array => value.is_array(),
        FieldType::GeoPoint => value.is_object(),
        FieldType::Date => value
            .as_str()
            .is_some_and(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()),
        FieldType::DateTime => value
            .as_str()
            .is_some_and(|s| DateTime::parse_from_rfc3339(s).is_ok()),
        FieldType::Time => value.as_str().is_some_and(|s| {
            NaiveTime::parse_from_str(s, "%H:%M:%S%.f").is_ok()
                || NaiveTime::parse_from_str(s, "%H:%M").is_ok()
        }),
        FieldType::Any | FieldType::Reference(_) => true,
    };

    if ok {
        return Ok(());
    }

    let actual = match (expected, value) {
        (FieldType::Date | FieldType::DateTime | FieldType::Time, Value::String(s)) => {
            format!("'{}'", s)
        }
        _ => json_type_name(value).to_string(),
    };
    Err(vec![Violation::type_mismatch(path, expected.type_name(), &actual)])
}

/// Checks a `{"lat", "lng", "text"?}` point and drops any other key.
fn normalize_geo_point(value: Value, path: &str) -> Result<Value, Vec<Violation>> {
    let mut point = match value {
        Value::Object(point) => point,
        other => {
            return Err(vec![Violation::type_mismatch(path, "GeoPoint", json_type_name(&other))]);
        }
    };

    if !point.contains_key("lat") || !point.contains_key("lng") {
        return Err(vec![Violation::new(
            path,
            "Please provide 'lat' and 'lng' value. Ex.: {'lat': 0.3, 'lng': 32.122}",
        )]);
    }

    for coord in ["lat", "lng"] {
        let v = &point[coord];
        if !v.is_number() {
            return Err(vec![Violation::new(
                path,
                format!("'{}' must be a number, got {}", coord, json_type_name(v)),
            )]);
        }
    }

    if let Some(text) = point.get("text") {
        if !text.is_string() && !text.is_null() {
            return Err(vec![Violation::new(
                path,
                format!("'text' must be a string, got {}", json_type_name(text)),
            )]);
        }
    }

    point.retain(|k, _| matches!(k.as_str(), "lat" | "lng" | "text"));
    Ok(Value::Object(point))
}

fn contains(allowed: &[Value], value: &Value) -> bool {
    allowed.iter().any(|a| values_equal(a, value))
}

/// Returns the JSON type name for error messages.
pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) => {
            if n.is_i64() || n.is_u64() {
                "int"
            } else {
                "float"
            }
        }
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
