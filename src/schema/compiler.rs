//! Schema compiler
//!
//! Turns definitions into [`Validator`]s. Properties compile first, then
//! relations, each in declared order. Embedded relations and reference-typed
//! properties compile their target definition recursively.
//!
//! Compilation is fail-fast: the first error aborts the whole call and no
//! partial validator is returned.
//!
//! Within one `get_validator` call a target embedded from several places is
//! compiled once and shared. Nothing is retained across calls; use
//! [`ValidatorCache`](super::cache::ValidatorCache) for that.

use std::collections::HashMap;
use std::sync::Arc;

use super::cleanup::EntityOracle;
use super::errors::{SchemaError, SchemaErrorCode, SchemaResult};
use super::loader::{DefinitionLoader, DefinitionSource};
use super::rules::{compile_property, compile_relation, FieldRule};
use super::types::{Definition, FieldType};
use super::validator::Validator;
use crate::observability::{log_event_with_fields, Event, MetricsRegistry, ObservationScope};

/// Compile-time switches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompilerOptions {
    /// Fail documents carrying keys that are neither properties nor relations
    pub reject_unknown_keys: bool,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            reject_unknown_keys: true,
        }
    }
}

/// Per-call bookkeeping: definitions being compiled and finished validators.
#[derive(Default)]
struct CompileState {
    stack: Vec<String>,
    compiled: HashMap<String, Arc<Validator>>,
}

/// Compiles definitions fetched from a [`DefinitionSource`].
pub struct SchemaCompiler<S: DefinitionSource> {
    loader: DefinitionLoader<S>,
    options: CompilerOptions,
    oracle: Option<Arc<dyn EntityOracle>>,
    metrics: Arc<MetricsRegistry>,
}

impl<S: DefinitionSource> SchemaCompiler<S> {
    pub fn new(source: S) -> Self {
        Self {
            loader: DefinitionLoader::new(source),
            options: CompilerOptions::default(),
            oracle: None,
            metrics: Arc::new(MetricsRegistry::new()),
        }
    }

    pub fn with_options(mut self, options: CompilerOptions) -> Self {
        self.options = options;
        self
    }

    /// Entity oracle handed to every validator this compiler produces.
    pub fn with_oracle(mut self, oracle: Arc<dyn EntityOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn options(&self) -> CompilerOptions {
        self.options
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    pub fn loader(&self) -> &DefinitionLoader<S> {
        &self.loader
    }

    /// Canonical form of a requested type name
    pub fn canonical_name<'n>(&self, type_name: &'n str) -> &'n str {
        self.loader.canonical_name(type_name)
    }

    /// Loads `type_name` and compiles it with everything it embeds.
    ///
    /// # Errors
    ///
    /// - `DefinitionNotFound` for the requested or any embedded definition
    /// - `MalformedDefinition` / `UnknownFieldType` from parsing
    /// - `CyclicDefinition` if a definition embeds itself, directly or not
    pub fn get_validator(&self, type_name: &str) -> SchemaResult<Arc<Validator>> {
        let name = self.canonical_name(type_name);
        let mut state = CompileState::default();
        self.compile_named(name, &mut state)
    }

    /// Loads one definition without compiling it.
    pub fn load_definition(&self, type_name: &str) -> SchemaResult<Definition> {
        let definition = self.loader.load(self.canonical_name(type_name))?;
        self.metrics.increment_definitions_loaded();
        Ok(definition)
    }

    /// Compiles an already parsed definition. Embedded targets are loaded
    /// from the source.
    pub fn compile_definition(&self, definition: &Definition) -> SchemaResult<Arc<Validator>> {
        let mut state = CompileState::default();
        self.compile_with_state(definition, &mut state)
    }

    fn compile_named(&self, name: &str, state: &mut CompileState) -> SchemaResult<Arc<Validator>> {
        if let Some(done) = state.compiled.get(name) {
            return Ok(Arc::clone(done));
        }
        if state.stack.iter().any(|n| n == name) {
            return Err(SchemaError::cyclic_definition(&state.stack, name));
        }

        let definition = self.load_definition(name)?;
        self.compile_with_state(&definition, state)
    }

    fn compile_with_state(
        &self,
        definition: &Definition,
        state: &mut CompileState,
    ) -> SchemaResult<Arc<Validator>> {
        let name = definition.name();
        let scope = ObservationScope::with_fields("COMPILE", &[("type", name)]);

        state.stack.push(name.to_string());
        let rules = self.compile_fields(definition, state);
        state.stack.pop();

        let rules = match rules {
            Ok(rules) => rules,
            Err(e) => {
                scope.fail(e.code().code());
                return Err(e);
            }
        };

        let field_count = rules.len().to_string();
        let validator = Arc::new(Validator::new(
            name,
            rules,
            self.options.reject_unknown_keys,
            self.oracle.clone(),
            Arc::clone(&self.metrics),
        ));
        state.compiled.insert(name.to_string(), Arc::clone(&validator));

        self.metrics.increment_validators_compiled();
        log_event_with_fields(
            Event::ValidatorCompiled,
            &[("type", name), ("fields", field_count.as_str())],
        );
        scope.complete();
        Ok(validator)
    }

    fn compile_fields(
        &self,
        definition: &Definition,
        state: &mut CompileState,
    ) -> SchemaResult<Vec<FieldRule>> {
        let mut rules = Vec::new();

        for (field, spec) in definition.properties() {
            let nested = match &spec.field_type {
                FieldType::Reference(declared) => {
                    let target = self.canonical_name(declared);
                    Some(self.compile_named(target, state).map_err(|e| {
                        unresolved_reference(definition.name(), field, declared, target, e)
                    })?)
                }
                _ => None,
            };
            rules.push(compile_property(field, spec, nested));
        }

        for (field, spec) in definition.relations() {
            let nested = if spec.kind.is_embedded() {
                let target = self.canonical_name(&spec.model);
                Some(self.compile_named(target, state)?)
            } else {
                None
            };
            rules.push(compile_relation(field, spec, nested));
        }

        Ok(rules)
    }
}

/// A property type that names no loadable definition is an unknown type,
/// not a missing embedded model.
fn unresolved_reference(
    type_name: &str,
    field: &str,
    declared: &str,
    target: &str,
    err: SchemaError,
) -> SchemaError {
    if err.code() == SchemaErrorCode::DefinitionNotFound && err.type_name() == Some(target) {
        SchemaError::unknown_field_type(type_name, field, declared)
    } else {
        err
    }
}
