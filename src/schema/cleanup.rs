//! Post-validation cleanup
//!
//! Runs once per `validate` call, after the whole document tree passed:
//!
//! - `deleteKeyIfValueIn`: a field whose value is blacklisted is removed
//!   from the output entirely
//! - autoclean keys: for `embedsManyAsObject` relations whose key declares
//!   `{"autoclean": true, "type": "model", "model": M}`, only entries whose
//!   key is an integer id that currently exists for `M` are kept
//!
//! Embedded documents are cleaned before the document holding them.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde_json::Value;
use thiserror::Error;

use super::choices::values_equal;
use super::errors::Violation;
use super::rules::EmbedMode;
use super::validator::{make_path, Validator};
use crate::observability::{log_event_with_fields, Event};

/// Errors reported by an entity oracle
#[derive(Debug, Clone, Error)]
pub enum OracleError {
    #[error("entity store unavailable: {0}")]
    Unavailable(String),

    #[error("entity store lookup timed out after {0}ms")]
    Timeout(u64),

    #[error("unknown model: {0}")]
    UnknownModel(String),
}

/// Answers "which of these ids currently exist for this model".
///
/// May block on I/O. Called at most once per autoclean field per validation.
pub trait EntityOracle: Send + Sync {
    fn existing_ids(&self, model: &str, candidates: &[i64]) -> Result<HashSet<i64>, OracleError>;
}

/// In-memory oracle: model name -> set of existing ids
#[derive(Debug, Clone, Default)]
pub struct MemoryOracle {
    entities: HashMap<String, HashSet<i64>>,
}

impl MemoryOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares that `ids` exist for `model`.
    pub fn with_ids(mut self, model: impl Into<String>, ids: impl IntoIterator<Item = i64>) -> Self {
        self.entities.entry(model.into()).or_default().extend(ids);
        self
    }

    pub fn remove(&mut self, model: &str, id: i64) -> bool {
        self.entities.get_mut(model).is_some_and(|ids| ids.remove(&id))
    }
}

impl EntityOracle for MemoryOracle {
    fn existing_ids(&self, model: &str, candidates: &[i64]) -> Result<HashSet<i64>, OracleError> {
        let known = self
            .entities
            .get(model)
            .ok_or_else(|| OracleError::UnknownModel(model.to_string()))?;
        Ok(candidates.iter().copied().filter(|id| known.contains(id)).collect())
    }
}

/// What one cleanup pass removed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupStats {
    pub blacklisted_keys: u64,
    pub dangling_entries: u64,
    pub oracle_queries: u64,
}

impl CleanupStats {
    pub fn changed(&self) -> bool {
        self.blacklisted_keys > 0 || self.dangling_entries > 0
    }

    fn merge(&mut self, other: CleanupStats) {
        self.blacklisted_keys += other.blacklisted_keys;
        self.dangling_entries += other.dangling_entries;
        self.oracle_queries += other.oracle_queries;
    }
}

/// Cleans an already validated document in place.
pub(crate) fn clean_document(
    validator: &Validator,
    value: &mut Value,
    prefix: &str,
    oracle: Option<&dyn EntityOracle>,
) -> Result<CleanupStats, Vec<Violation>> {
    let mut stats = CleanupStats::default();
    let Some(doc) = value.as_object_mut() else {
        return Ok(stats);
    };

    for rule in validator.rules() {
        let path = make_path(prefix, &rule.name);

        if let Some(field_value) = doc.get_mut(&rule.name) {
            if let Some((mode, nested)) = rule.nested() {
                stats.merge(clean_embedded(mode, nested, field_value, &path, oracle)?);
            }
            if let Some(model) = &rule.autoclean_model {
                stats.merge(drop_dangling_keys(model, field_value, &path, oracle)?);
            }
        }

        let blacklisted = !rule.delete_if_value_in.is_empty()
            && doc
                .get(&rule.name)
                .is_some_and(|v| rule.delete_if_value_in.iter().any(|b| values_equal(b, v)));
        if blacklisted {
            doc.retain(|k, _| k != &rule.name);
            stats.blacklisted_keys += 1;
        }
    }

    Ok(stats)
}

fn clean_embedded(
    mode: EmbedMode,
    nested: &Validator,
    value: &mut Value,
    path: &str,
    oracle: Option<&dyn EntityOracle>,
) -> Result<CleanupStats, Vec<Violation>> {
    let mut stats = CleanupStats::default();
    match (mode, value) {
        (EmbedMode::Many, Value::Array(items)) => {
            for (i, item) in items.iter_mut().enumerate() {
                let item_path = format!("{}[{}]", path, i);
                stats.merge(clean_document(nested, item, &item_path, oracle)?);
            }
        }
        (EmbedMode::ManyAsObject, Value::Object(entries)) => {
            for (key, item) in entries.iter_mut() {
                let item_path = make_path(path, key);
                stats.merge(clean_document(nested, item, &item_path, oracle)?);
            }
        }
        (EmbedMode::One | EmbedMode::Many, doc @ Value::Object(_)) => {
            stats.merge(clean_document(nested, doc, path, oracle)?);
        }
        _ => {}
    }
    Ok(stats)
}

fn drop_dangling_keys(
    model: &str,
    value: &mut Value,
    path: &str,
    oracle: Option<&dyn EntityOracle>,
) -> Result<CleanupStats, Vec<Violation>> {
    let mut stats = CleanupStats::default();
    let Some(entries) = value.as_object_mut() else {
        return Ok(stats);
    };
    if entries.is_empty() {
        return Ok(stats);
    }

    let candidates: Vec<i64> = entries
        .keys()
        .filter_map(|k| parse_id(k))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let existing = if candidates.is_empty() {
        HashSet::new()
    } else {
        let oracle = oracle.ok_or_else(|| {
            vec![Violation::new(
                path,
                format!("Can't verify '{}' ids: no entity store configured", model),
            )]
        })?;
        stats.oracle_queries += 1;
        let count = candidates.len().to_string();
        log_event_with_fields(
            Event::OracleQueried,
            &[("model", model), ("candidates", count.as_str())],
        );
        oracle.existing_ids(model, &candidates).map_err(|e| {
            let reason = e.to_string();
            log_event_with_fields(Event::OracleFailed, &[("model", model), ("reason", reason.as_str())]);
            vec![Violation::new(path, format!("Can't verify '{}' ids: {}", model, reason))]
        })?
    };

    let before = entries.len();
    entries.retain(|k, _| parse_id(k).is_some_and(|id| existing.contains(&id)));
    stats.dangling_entries += (before - entries.len()) as u64;
    Ok(stats)
}

fn parse_id(key: &str) -> Option<i64> {
    key.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::compiler::SchemaCompiler;
    use crate::schema::loader::MemorySource;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingOracle {
        inner: MemoryOracle,
        calls: AtomicUsize,
    }

    impl EntityOracle for CountingOracle {
        fn existing_ids(&self, model: &str, candidates: &[i64]) -> Result<HashSet<i64>, OracleError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.existing_ids(model, candidates)
        }
    }

    struct DownOracle;

    impl EntityOracle for DownOracle {
        fn existing_ids(&self, _: &str, _: &[i64]) -> Result<HashSet<i64>, OracleError> {
            Err(OracleError::Timeout(250))
        }
    }

    fn source() -> MemorySource {
        MemorySource::new()
            .with(
                "Holder",
                json!({
                    "properties": {
                        "status": {"type": "string", "deleteKeyIfValueIn": ["draft"]},
                        "count": {"type": "int", "required": true}
                    },
                    "relations": {
                        "byId": {
                            "type": "embedsManyAsObject",
                            "model": "Entry",
                            "key": {"autoclean": true, "type": "model", "model": "Thing"}
                        }
                    }
                }),
            )
            .unwrap()
            .with("Entry", json!({"properties": {"note": {"type": "string"}}}))
            .unwrap()
    }

    #[test]
    fn test_parse_id() {
        assert_eq!(parse_id("12"), Some(12));
        assert_eq!(parse_id(" 7 "), Some(7));
        assert_eq!(parse_id("-3"), Some(-3));
        assert_eq!(parse_id("abc"), None);
        assert_eq!(parse_id("1.5"), None);
    }

    #[test]
    fn test_memory_oracle() {
        let mut oracle = MemoryOracle::new().with_ids("Thing", [1, 2, 3]);
        let found = oracle.existing_ids("Thing", &[2, 3, 9]).unwrap();
        assert_eq!(found, HashSet::from([2, 3]));
        assert!(oracle.remove("Thing", 2));
        assert!(!oracle.remove("Thing", 2));
        assert!(matches!(
            oracle.existing_ids("Other", &[1]),
            Err(OracleError::UnknownModel(_))
        ));
    }

    #[test]
    fn test_dangling_and_non_numeric_keys_dropped() {
        let oracle = Arc::new(MemoryOracle::new().with_ids("Thing", [2]));
        let v = SchemaCompiler::new(source())
            .with_oracle(oracle)
            .get_validator("Holder")
            .unwrap();

        let out = v
            .validate(&json!({"count": 1, "byId": {"1": {}, "2": {"note": "x"}, "abc": {}}}))
            .unwrap();
        assert_eq!(out["byId"], json!({"2": {"note": "x"}}));
    }

    #[test]
    fn test_oracle_not_queried_for_invalid_document() {
        let oracle = Arc::new(CountingOracle {
            inner: MemoryOracle::new().with_ids("Thing", [1]),
            calls: AtomicUsize::new(0),
        });
        let v = SchemaCompiler::new(source())
            .with_oracle(oracle.clone())
            .get_validator("Holder")
            .unwrap();

        // byId is fine but the later sibling fails
        let doc = json!({"byId": {"1": {}}, "count": "nope"});
        assert!(v.validate(&doc).is_err());
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 0);

        v.validate(&json!({"byId": {"1": {}}, "count": 1})).unwrap();
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_oracle_failure_is_validation_failure() {
        let v = SchemaCompiler::new(source())
            .with_oracle(Arc::new(DownOracle))
            .get_validator("Holder")
            .unwrap();
        let err = v.validate(&json!({"count": 1, "byId": {"1": {}}})).unwrap_err();
        assert_eq!(err.field_path(), "byId");
        assert!(err.message().contains("timed out"));
    }

    #[test]
    fn test_missing_oracle_only_matters_with_numeric_keys() {
        let v = SchemaCompiler::new(source()).get_validator("Holder").unwrap();
        let out = v.validate(&json!({"count": 1, "byId": {"x": {}}})).unwrap();
        assert_eq!(out["byId"], json!({}));

        let err = v.validate(&json!({"count": 1, "byId": {"1": {}}})).unwrap_err();
        assert!(err.message().contains("no entity store"));
    }

    #[test]
    fn test_blacklisted_value_removes_key() {
        let v = SchemaCompiler::new(source()).get_validator("Holder").unwrap();
        let out = v.validate(&json!({"status": "draft", "count": 1})).unwrap();
        assert_eq!(out, json!({"count": 1}));

        let out = v.validate(&json!({"status": "live", "count": 1})).unwrap();
        assert_eq!(out["status"], "live");
    }
}
