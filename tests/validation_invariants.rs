//! Validation Invariant Tests
//!
//! - Default filling is idempotent and never shares values between calls
//! - Required fields must be present; required rejects null
//! - Blacklisted values remove their key entirely
//! - Autoclean keeps only ids the entity oracle knows
//! - The oracle is only consulted for documents that passed
//! - Validation is deterministic and never mutates its input

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use modelgen::schema::{
    normalize_choices, Choice, EntityOracle, MemoryOracle, MemorySource, OracleError,
    SchemaCompiler, SchemaErrorCode, Validator, ValidatorCache,
};
use serde_json::{json, Value};

// =============================================================================
// Helper Functions
// =============================================================================

fn compile(definitions: &[(&str, Value)], name: &str) -> Arc<Validator> {
    let mut source = MemorySource::new();
    for (type_name, doc) in definitions {
        source.register(*type_name, doc.clone()).unwrap();
    }
    SchemaCompiler::new(source).get_validator(name).unwrap()
}

fn settings() -> Arc<Validator> {
    compile(
        &[(
            "Settings",
            json!({"properties": {
                "theme": {"type": "string", "default": "light", "choices": ["light", "dark"]},
                "limits": {"type": "object", "default": {"daily": 10}},
                "tags": {"type": "array", "default": []},
                "ratio": {"type": "number", "default": 0.5, "min": 0, "max": 1}
            }}),
        )],
        "Settings",
    )
}

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

fn holder_source() -> MemorySource {
    MemorySource::new()
        .with(
            "Holder",
            json!({
                "properties": {
                    "status": {"type": "string", "deleteKeyIfValueIn": ["draft", "deleted"]},
                    "title": {"type": "string"}
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
        .with(
            "Entry",
            json!({"properties": {
                "note": {"type": "string", "default": ""},
                "mode": {"type": "string", "choices": ["a", "b"], "deleteKeyIfValueIn": ["b"]}
            }}),
        )
        .unwrap()
}

// =============================================================================
// Default Filling Tests
// =============================================================================

/// Validating the output again yields the same output.
#[test]
fn test_default_filling_is_idempotent() {
    let validator = settings();
    let first = validator.validate(&json!({})).unwrap();
    let second = validator.validate(&first).unwrap();
    assert_eq!(first, second);
    assert_eq!(first["theme"], "light");
    assert_eq!(first["limits"], json!({"daily": 10}));
}

/// Mutating one result's default never leaks into the next result.
#[test]
fn test_defaults_are_deep_copies() {
    let validator = settings();
    let mut a = validator.validate(&json!({})).unwrap();
    a["limits"]["daily"] = json!(999);
    a["tags"].as_array_mut().unwrap().push(json!("x"));

    let b = validator.validate(&json!({})).unwrap();
    assert_eq!(b["limits"], json!({"daily": 10}));
    assert_eq!(b["tags"], json!([]));
}

/// A required field with a default is filled but still rejects null.
#[test]
fn test_required_with_default() {
    let validator = compile(
        &[(
            "Doc",
            json!({"properties": {"kind": {"type": "string", "required": true, "default": "plain"}}}),
        )],
        "Doc",
    );
    assert_eq!(validator.validate(&json!({})).unwrap()["kind"], "plain");
    let err = validator.validate(&json!({"kind": null})).unwrap_err();
    assert_eq!(err.field_path(), "kind");
}

/// Optional fields accept null and keep it.
#[test]
fn test_optional_null_is_kept() {
    let validator = settings();
    let out = validator.validate(&json!({"theme": null, "ratio": null})).unwrap();
    assert_eq!(out["theme"], Value::Null);
    assert_eq!(out["ratio"], Value::Null);
}

/// Defaults on embedded relations are filled and checked like given values.
#[test]
fn test_embedded_defaults_are_validated() {
    let validator = compile(
        &[
            (
                "Doc",
                json!({"relations": {
                    "one": {"type": "embedsOne", "model": "Tag", "default": {}},
                    "many": {"type": "embedsMany", "model": "Tag", "default": [{}]}
                }}),
            ),
            (
                "Tag",
                json!({"properties": {
                    "estring": {"type": "string", "default": ""},
                    "eint": {"type": "int", "default": 90}
                }}),
            ),
        ],
        "Doc",
    );

    let first = validator.validate(&json!({})).unwrap();
    assert_eq!(first["one"], json!({"estring": "", "eint": 90}));
    assert_eq!(first["many"], json!([{"estring": "", "eint": 90}]));
    assert_eq!(validator.validate(&first).unwrap(), first);
}

/// A default missing a nested required field is rejected up front.
#[test]
fn test_embedded_default_missing_required_field() {
    let validator = compile(
        &[
            (
                "Doc",
                json!({"relations": {"p": {"type": "embedsOne", "model": "Person", "default": {}}}}),
            ),
            ("Person", json!({"properties": {"name": {"type": "string", "required": true}}})),
        ],
        "Doc",
    );

    let err = validator.validate(&json!({})).unwrap_err();
    assert_eq!(err.field_path(), "p.name");
    assert!(validator.validate(&json!({"p": {"name": "Ada"}})).is_ok());
}

// =============================================================================
// Required Field Tests
// =============================================================================

/// Missing required field names its path.
#[test]
fn test_required_field_absent() {
    let validator = compile(
        &[("User", json!({"properties": {"name": {"type": "string", "required": true}}}))],
        "User",
    );
    let err = validator.validate(&json!({})).unwrap_err();
    assert_eq!(err.code(), SchemaErrorCode::ValidationFailed);
    assert_eq!(err.field_path(), "name");
    assert_eq!(err.violations().len(), 1);
    assert!(err.to_string().contains("MODELGEN_VALIDATION_FAILED"));
}

// =============================================================================
// Predicate Tests
// =============================================================================

/// Choice membership and numeric ranges are enforced.
#[test]
fn test_choices_and_ranges() {
    let validator = settings();
    let err = validator.validate(&json!({"theme": "neon"})).unwrap_err();
    assert_eq!(err.field_path(), "theme");
    assert!(err.message().contains("not in choices"));

    let err = validator.validate(&json!({"ratio": 1.5})).unwrap_err();
    assert!(err.message().contains("greater than max"));
}

/// Choices normalize to (value, label) pairs in declared order.
#[test]
fn test_choice_normalization() {
    assert_eq!(
        normalize_choices(&[json!("a"), json!("b")]).unwrap(),
        vec![Choice::new(json!("a"), json!("a")), Choice::new(json!("b"), json!("b"))]
    );
    assert_eq!(
        normalize_choices(&[json!(["a", "Label A"]), json!(["b", "Label B"])]).unwrap(),
        vec![
            Choice::new(json!("a"), json!("Label A")),
            Choice::new(json!("b"), json!("Label B"))
        ]
    );
}

/// The same input always yields the same result and is left untouched.
#[test]
fn test_validation_is_deterministic() {
    let validator = settings();
    let input = json!({"theme": "dark"});
    let expected = validator.validate(&input).unwrap();
    for _ in 0..50 {
        assert_eq!(validator.validate(&input).unwrap(), expected);
    }
    assert_eq!(input, json!({"theme": "dark"}));
}

// =============================================================================
// Cleanup Tests
// =============================================================================

/// A blacklisted value removes the key, it is not nulled.
#[test]
fn test_blacklist_removes_key() {
    let validator = SchemaCompiler::new(holder_source()).get_validator("Holder").unwrap();
    let out = validator.validate(&json!({"status": "draft", "title": "t"})).unwrap();
    assert!(out.get("status").is_none());
    assert_eq!(out, json!({"title": "t"}));
}

/// Only ids the oracle reports survive.
#[test]
fn test_autoclean_removes_dangling_ids() {
    let oracle = Arc::new(MemoryOracle::new().with_ids("Thing", [2]));
    let compiler = SchemaCompiler::new(holder_source()).with_oracle(oracle);
    let validator = compiler.get_validator("Holder").unwrap();

    let out = validator
        .validate(&json!({"byId": {"1": {"note": "gone"}, "2": {"note": "kept"}}}))
        .unwrap();
    assert_eq!(out["byId"], json!({"2": {"note": "kept"}}));

    let snapshot = compiler.metrics().snapshot();
    assert_eq!(snapshot.dangling_entries_removed, 1);
    assert_eq!(snapshot.oracle_queries, 1);
}

/// Cleanup inside embedded documents runs as well.
#[test]
fn test_cleanup_reaches_embedded_documents() {
    let oracle = Arc::new(MemoryOracle::new().with_ids("Thing", [1, 2]));
    let validator = SchemaCompiler::new(holder_source())
        .with_oracle(oracle)
        .get_validator("Holder")
        .unwrap();

    let out = validator
        .validate(&json!({"byId": {"1": {"mode": "b"}, "2": {"mode": "a"}}}))
        .unwrap();
    assert_eq!(out["byId"]["1"], json!({"note": ""}));
    assert_eq!(out["byId"]["2"], json!({"mode": "a", "note": ""}));
}

/// Every bad key of a mapping relation is reported.
#[test]
fn test_mapping_relation_collects_all_bad_keys() {
    let validator = SchemaCompiler::new(holder_source()).get_validator("Holder").unwrap();
    let err = validator
        .validate(&json!({"byId": {"1": {"mode": "z"}, "2": {"note": 3}}}))
        .unwrap_err();

    assert_eq!(err.violations().len(), 2);
    assert_eq!(err.violations()[0].path, "byId.1.mode");
    assert!(err.violations()[0].message.starts_with("Invalid key '1': "));
    assert_eq!(err.violations()[1].path, "byId.2.note");
}

/// A document failing a later field never reaches the oracle.
#[test]
fn test_oracle_skipped_for_rejected_document() {
    let oracle = Arc::new(CountingOracle {
        inner: MemoryOracle::new().with_ids("Thing", [1]),
        calls: AtomicUsize::new(0),
    });
    let validator = SchemaCompiler::new(holder_source())
        .with_oracle(oracle.clone())
        .get_validator("Holder")
        .unwrap();

    assert!(validator
        .validate(&json!({"byId": {"1": {}}, "title": 42}))
        .is_err());
    assert_eq!(oracle.calls.load(Ordering::SeqCst), 0);
}

/// An unknown model reported by the oracle is a validation failure.
#[test]
fn test_oracle_error_is_validation_error() {
    let oracle = Arc::new(MemoryOracle::new().with_ids("Other", [1]));
    let validator = SchemaCompiler::new(holder_source())
        .with_oracle(oracle)
        .get_validator("Holder")
        .unwrap();

    let err = validator.validate(&json!({"byId": {"1": {}}})).unwrap_err();
    assert_eq!(err.field_path(), "byId");
    assert!(err.message().contains("unknown model: Thing"));
}

// =============================================================================
// Cache Tests
// =============================================================================

/// The cache hands out one validator per name.
#[test]
fn test_cache_reuses_validator() {
    let compiler = SchemaCompiler::new(holder_source());
    let cache = ValidatorCache::new();

    let a = cache.get_or_compile("Holder", &compiler).unwrap();
    let b = cache.get_or_compile("Holder", &compiler).unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(compiler.metrics().snapshot().cache_hits, 1);
}
