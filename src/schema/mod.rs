//! Definition compiler and document validator
//!
//! Pipeline:
//!
//! 1. [`DefinitionLoader`] fetches a named definition from a
//!    [`DefinitionSource`] and parses it into a [`Definition`]
//! 2. [`SchemaCompiler`] turns it into an immutable [`Validator`],
//!    compiling embedded definitions recursively
//! 3. [`Validator::validate`] checks a document, fills defaults and
//!    applies cleanup, returning a new document or a [`ValidationError`]
//!
//! Compile errors are [`SchemaError`]s and are always fatal to the compile
//! call. Validation errors never are.

mod cache;
mod choices;
mod cleanup;
mod compiler;
mod errors;
mod loader;
mod rules;
mod types;
mod validator;

pub use cache::ValidatorCache;
pub use choices::{label_for, normalize as normalize_choices, position as choice_position, Choice};
pub use cleanup::{CleanupStats, EntityOracle, MemoryOracle, OracleError};
pub use compiler::{CompilerOptions, SchemaCompiler};
pub use errors::{
    SchemaError, SchemaErrorCode, SchemaResult, Severity, ValidationError, ValidationResult,
    Violation,
};
pub use loader::{
    DefinitionLoader, DefinitionSource, DirectorySource, MemorySource, DEFAULT_EMBEDDED_DIR,
    DEFAULT_EXTENSION,
};
pub use rules::{Bound, EmbedMode, FieldRule, Predicate};
pub use types::{Definition, FieldSpec, FieldType, KeySpec, RelationKind, RelationSpec};
pub use validator::{Validator, ROOT_PATH};
