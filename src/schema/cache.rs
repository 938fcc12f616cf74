//! Validator cache owned by the calling layer
//!
//! Keyed by canonical type name. The first validator inserted under a name
//! wins; a concurrent compile that finishes later gets the stored one back,
//! so every caller observes a single validator per name.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::compiler::SchemaCompiler;
use super::errors::SchemaResult;
use super::loader::DefinitionSource;
use super::validator::Validator;
use crate::observability::{log_event_with_fields, Event};

#[derive(Debug, Default)]
pub struct ValidatorCache {
    validators: RwLock<HashMap<String, Arc<Validator>>>,
}

impl ValidatorCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, type_name: &str) -> Option<Arc<Validator>> {
        let validators = self.validators.read().unwrap_or_else(|e| e.into_inner());
        validators.get(type_name).cloned()
    }

    /// Stores `validator` unless the name is taken; returns the stored one.
    pub fn insert(&self, type_name: impl Into<String>, validator: Arc<Validator>) -> Arc<Validator> {
        let mut validators = self.validators.write().unwrap_or_else(|e| e.into_inner());
        Arc::clone(validators.entry(type_name.into()).or_insert(validator))
    }

    /// Cached validator for `type_name`, compiling it on first use.
    ///
    /// Compilation happens outside the lock; two racing callers may both
    /// compile but only one result is kept.
    pub fn get_or_compile<S: DefinitionSource>(
        &self,
        type_name: &str,
        compiler: &SchemaCompiler<S>,
    ) -> SchemaResult<Arc<Validator>> {
        let name = compiler.canonical_name(type_name);
        if let Some(hit) = self.get(name) {
            compiler.metrics().increment_cache_hits();
            log_event_with_fields(Event::ValidatorCacheHit, &[("type", name)]);
            return Ok(hit);
        }

        let compiled = compiler.get_validator(name)?;
        Ok(self.insert(name, compiled))
    }

    pub fn contains(&self, type_name: &str) -> bool {
        let validators = self.validators.read().unwrap_or_else(|e| e.into_inner());
        validators.contains_key(type_name)
    }

    pub fn len(&self) -> usize {
        let validators = self.validators.read().unwrap_or_else(|e| e.into_inner());
        validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every cached validator, e.g. after definitions changed on disk.
    pub fn clear(&self) {
        let mut validators = self.validators.write().unwrap_or_else(|e| e.into_inner());
        validators.clear();
    }
}
