//! Compiled document validator
//!
//! Validation of one document:
//! - Fields are evaluated in declared order; the first failing field wins
//! - Absent fields with a default get a deep copy of it
//! - Absent required fields without a default fail
//! - Undeclared keys fail (unless disabled at compile time)
//! - Embedded documents are validated by their own validators
//!
//! Once the whole tree has passed, cleanup runs: blacklisted values are
//! removed and dangling id keys are dropped after asking the entity oracle.
//! The oracle is never queried for a document that failed validation.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use super::cleanup::{self, EntityOracle};
use super::errors::{ValidationError, ValidationResult, Violation};
use super::rules::{json_type_name, FieldRule};
use crate::observability::{log_event_with_fields, Event, MetricsRegistry};

/// Path used for errors about the document root itself
pub const ROOT_PATH: &str = "$root";

/// Validator bound to a single definition.
///
/// Immutable after construction; share it freely behind an `Arc`.
pub struct Validator {
    type_name: String,
    rules: Vec<FieldRule>,
    reject_unknown_keys: bool,
    oracle: Option<Arc<dyn EntityOracle>>,
    metrics: Arc<MetricsRegistry>,
}

impl Validator {
    pub(crate) fn new(
        type_name: impl Into<String>,
        rules: Vec<FieldRule>,
        reject_unknown_keys: bool,
        oracle: Option<Arc<dyn EntityOracle>>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            type_name: type_name.into(),
            rules,
            reject_unknown_keys,
            oracle,
            metrics,
        }
    }

    /// Name of the definition this validator was compiled from
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Compiled rules in evaluation order
    pub fn rules(&self) -> &[FieldRule] {
        &self.rules
    }

    pub fn rule(&self, field: &str) -> Option<&FieldRule> {
        self.rules.iter().find(|r| r.name == field)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|r| r.name.as_str())
    }

    /// Validates, fills defaults and cleans `data`.
    ///
    /// The input is not modified; the cleaned copy is returned.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` carrying the failing field path(s). A failed
    /// or missing entity oracle during cleanup is a validation failure too.
    pub fn validate(&self, data: &Value) -> ValidationResult<Value> {
        let result = self
            .check_document(data.clone(), "")
            .and_then(|mut value| {
                let stats = cleanup::clean_document(self, &mut value, "", self.oracle.as_deref())?;
                self.metrics.add_blacklisted_keys_removed(stats.blacklisted_keys);
                self.metrics.add_dangling_entries_removed(stats.dangling_entries);
                self.metrics.add_oracle_queries(stats.oracle_queries);
                if stats.changed() {
                    let blacklisted = stats.blacklisted_keys.to_string();
                    let dangling = stats.dangling_entries.to_string();
                    log_event_with_fields(
                        Event::CleanupApplied,
                        &[
                            ("type", self.type_name.as_str()),
                            ("blacklisted", blacklisted.as_str()),
                            ("dangling", dangling.as_str()),
                        ],
                    );
                }
                Ok(value)
            });

        match result {
            Ok(value) => {
                self.metrics.increment_documents_validated();
                log_event_with_fields(Event::DocumentValidated, &[("type", self.type_name.as_str())]);
                Ok(value)
            }
            Err(violations) => {
                self.metrics.increment_documents_rejected();
                let err = ValidationError::from_violations(&self.type_name, violations)
                    .unwrap_or_else(|| {
                        ValidationError::new(&self.type_name, Violation::new(ROOT_PATH, "invalid document"))
                    });
                log_event_with_fields(
                    Event::DocumentRejected,
                    &[("type", self.type_name.as_str()), ("field", err.field_path())],
                );
                Err(err)
            }
        }
    }

    /// Structural validation of one document at `prefix`, without cleanup.
    pub(crate) fn check_document(&self, data: Value, prefix: &str) -> Result<Value, Vec<Violation>> {
        let mut doc = match data {
            Value::Object(map) => map,
            other => {
                let path = if prefix.is_empty() { ROOT_PATH } else { prefix };
                return Err(vec![Violation::type_mismatch(path, "object", json_type_name(&other))]);
            }
        };

        for rule in &self.rules {
            let path = make_path(prefix, &rule.name);
            match doc.get_mut(&rule.name) {
                Some(slot) => {
                    let value = std::mem::take(slot);
                    *slot = rule.evaluate(value, &path)?;
                }
                None => {
                    if let Some(default) = &rule.default {
                        // Defaults go through the rule so embedded defaults get filled
                        let filled = rule.evaluate(default.clone(), &path)?;
                        doc.insert(rule.name.clone(), filled);
                    } else if rule.required {
                        return Err(vec![Violation::missing_key(path)]);
                    }
                }
            }
        }

        if self.reject_unknown_keys {
            if let Some(key) = doc.keys().find(|k| self.rule(k).is_none()) {
                return Err(vec![Violation::wrong_key(make_path(prefix, key))]);
            }
        }

        Ok(Value::Object(doc))
    }
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Validator")
            .field("type_name", &self.type_name)
            .field("rules", &self.rules)
            .field("reject_unknown_keys", &self.reject_unknown_keys)
            .field("has_oracle", &self.oracle.is_some())
            .finish()
    }
}

/// Creates a field path from prefix and field name.
pub(crate) fn make_path(prefix: &str, field: &str) -> String {
    if prefix.is_empty() {
        field.to_string()
    } else {
        format!("{}.{}", prefix, field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::compiler::SchemaCompiler;
    use crate::schema::loader::MemorySource;
    use serde_json::json;

    fn compile(source: MemorySource, name: &str) -> Arc<Validator> {
        SchemaCompiler::new(source).get_validator(name).unwrap()
    }

    fn users() -> MemorySource {
        MemorySource::new()
            .with(
                "User",
                json!({"properties": {
                    "name": {"type": "string", "required": true},
                    "age": {"type": "int", "min": 0},
                    "role": {"type": "string", "default": "member", "choices": ["member", "admin"]},
                    "prefs": {"type": "object", "default": {}}
                }}),
            )
            .unwrap()
    }

    #[test]
    fn test_valid_document_passes_and_fills_defaults() {
        let v = compile(users(), "User");
        let out = v.validate(&json!({"name": "Alice"})).unwrap();
        assert_eq!(out, json!({"name": "Alice", "role": "member", "prefs": {}}));
    }

    #[test]
    fn test_input_is_not_mutated() {
        let v = compile(users(), "User");
        let input = json!({"name": "Alice"});
        v.validate(&input).unwrap();
        assert_eq!(input, json!({"name": "Alice"}));
    }

    #[test]
    fn test_missing_required_field() {
        let v = compile(users(), "User");
        let err = v.validate(&json!({})).unwrap_err();
        assert_eq!(err.field_path(), "name");
        assert_eq!(err.message(), "Missing key 'name'");
    }

    #[test]
    fn test_first_failing_field_wins() {
        let v = compile(users(), "User");
        let err = v.validate(&json!({"name": 1, "age": -5})).unwrap_err();
        assert_eq!(err.violations().len(), 1);
        assert_eq!(err.field_path(), "name");
    }

    #[test]
    fn test_unknown_key_rejected() {
        let v = compile(users(), "User");
        let err = v.validate(&json!({"name": "A", "nick": "a"})).unwrap_err();
        assert_eq!(err.field_path(), "nick");
        assert!(err.message().contains("Wrong key"));
    }

    #[test]
    fn test_root_must_be_object() {
        let v = compile(users(), "User");
        let err = v.validate(&json!([1, 2])).unwrap_err();
        assert_eq!(err.field_path(), ROOT_PATH);
    }

    #[test]
    fn test_key_order_preserved() {
        let v = compile(users(), "User");
        let out = v.validate(&json!({"age": 3, "name": "A"})).unwrap();
        let keys: Vec<&String> = out.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["age", "name", "role", "prefs"]);
    }

    #[test]
    fn test_introspection() {
        let v = compile(users(), "User");
        assert_eq!(v.type_name(), "User");
        let names: Vec<&str> = v.field_names().collect();
        assert_eq!(names, vec!["name", "age", "role", "prefs"]);
        assert!(v.rule("name").unwrap().required);
        assert!(format!("{:?}", v).contains("User"));
    }
}
