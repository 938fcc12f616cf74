//! Definition loading
//!
//! - A [`DefinitionSource`] fetches raw definition documents by name
//! - [`DirectorySource`] searches an ordered list of roots on disk and
//!   returns the first match
//! - [`MemorySource`] holds documents registered in-process
//! - [`DefinitionLoader`] turns a fetched document into a [`Definition`]
//!
//! Names are suffix-insensitive: `Tag` and `Tag.json` resolve to the same
//! document.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;

use super::errors::{SchemaError, SchemaResult};
use super::types::Definition;
use crate::observability::{log_event_with_fields, Event};

/// Default definition file extension
pub const DEFAULT_EXTENSION: &str = "json";

/// Default per-root subdirectory holding embedded definitions
pub const DEFAULT_EMBEDDED_DIR: &str = "embedded_models.json";

/// Where raw definition documents come from.
///
/// `Ok(None)` means "not here"; `Err` means a document exists but cannot be
/// read or parsed.
pub trait DefinitionSource: Send + Sync {
    fn fetch(&self, type_name: &str) -> SchemaResult<Option<Value>>;

    /// File extension stripped from requested names
    fn extension(&self) -> &str {
        DEFAULT_EXTENSION
    }
}

impl<S: DefinitionSource + ?Sized> DefinitionSource for std::sync::Arc<S> {
    fn fetch(&self, type_name: &str) -> SchemaResult<Option<Value>> {
        (**self).fetch(type_name)
    }

    fn extension(&self) -> &str {
        (**self).extension()
    }
}

/// Filesystem source searching ordered roots.
///
/// Inside each root, `<root>/<embedded_dir>/<Name>.<ext>` is tried before
/// `<root>/<Name>.<ext>`. The first root holding a match wins.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    roots: Vec<PathBuf>,
    extension: String,
    embedded_dir: Option<String>,
}

impl DirectorySource {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self {
            roots,
            extension: DEFAULT_EXTENSION.to_string(),
            embedded_dir: Some(DEFAULT_EMBEDDED_DIR.to_string()),
        }
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    /// Sets the per-root subdirectory; `None` searches root files only.
    pub fn with_embedded_dir(mut self, embedded_dir: Option<String>) -> Self {
        self.embedded_dir = embedded_dir;
        self
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    fn candidates(&self, type_name: &str) -> Vec<PathBuf> {
        let file_name = format!("{}.{}", type_name, self.extension);
        let mut paths = Vec::with_capacity(self.roots.len() * 2);
        for root in &self.roots {
            if let Some(dir) = &self.embedded_dir {
                paths.push(root.join(dir).join(&file_name));
            }
            paths.push(root.join(&file_name));
        }
        paths
    }

    fn read_document(type_name: &str, path: &Path) -> SchemaResult<Value> {
        let content = fs::read_to_string(path).map_err(|e| {
            SchemaError::malformed_definition(
                type_name,
                format!("Failed to read '{}': {}", path.display(), e),
            )
        })?;

        serde_json::from_str(&content).map_err(|e| {
            SchemaError::malformed_definition(
                type_name,
                format!("Invalid JSON in '{}': {}", path.display(), e),
            )
        })
    }
}

impl DefinitionSource for DirectorySource {
    fn fetch(&self, type_name: &str) -> SchemaResult<Option<Value>> {
        if !is_plain_name(type_name) {
            return Err(SchemaError::malformed_definition(
                type_name,
                "type name must not contain path separators or '..'",
            ));
        }
        for path in self.candidates(type_name) {
            if path.is_file() {
                return Self::read_document(type_name, &path).map(Some);
            }
        }
        Ok(None)
    }

    fn extension(&self) -> &str {
        &self.extension
    }
}

/// In-process source for programmatic registration
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    documents: HashMap<String, Value>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a document. A name can be registered once.
    pub fn register(&mut self, type_name: impl Into<String>, document: Value) -> SchemaResult<()> {
        let name = type_name.into();
        let name = strip_extension(&name, DEFAULT_EXTENSION).to_string();
        if self.documents.contains_key(&name) {
            return Err(SchemaError::malformed_definition(
                name,
                "definition is already registered",
            ));
        }
        self.documents.insert(name, document);
        Ok(())
    }

    /// Builder form of [`register`](Self::register).
    pub fn with(mut self, type_name: impl Into<String>, document: Value) -> SchemaResult<Self> {
        self.register(type_name, document)?;
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

impl DefinitionSource for MemorySource {
    fn fetch(&self, type_name: &str) -> SchemaResult<Option<Value>> {
        Ok(self.documents.get(type_name).cloned())
    }
}

/// Loads and parses definitions from a source.
pub struct DefinitionLoader<S: DefinitionSource> {
    source: S,
}

impl<S: DefinitionSource> DefinitionLoader<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Canonical form of a requested name (extension stripped)
    pub fn canonical_name<'n>(&self, type_name: &'n str) -> &'n str {
        strip_extension(type_name, self.source.extension())
    }

    /// Loads the definition named `type_name`.
    ///
    /// # Errors
    ///
    /// - `DefinitionNotFound` if no location holds the document
    /// - `MalformedDefinition` if the document cannot be read or parsed
    /// - `UnknownFieldType` if a relation declares an unknown kind
    pub fn load(&self, type_name: &str) -> SchemaResult<Definition> {
        let name = self.canonical_name(type_name);

        let document = match self.source.fetch(name)? {
            Some(doc) => doc,
            None => {
                log_event_with_fields(Event::DefinitionNotFound, &[("type", name)]);
                return Err(SchemaError::definition_not_found(name));
            }
        };

        let definition = Definition::from_value(name, &document)?;
        log_event_with_fields(Event::DefinitionLoaded, &[("type", name)]);
        Ok(definition)
    }
}

/// A type name must stay a single file name inside its root.
fn is_plain_name(type_name: &str) -> bool {
    !type_name.is_empty()
        && !type_name.contains(|c: char| c == '/' || c == '\\')
        && !type_name.contains("..")
        && !Path::new(type_name).is_absolute()
}

fn strip_extension<'n>(name: &'n str, extension: &str) -> &'n str {
    name.strip_suffix(extension)
        .and_then(|rest| rest.strip_suffix('.'))
        .filter(|rest| !rest.is_empty())
        .unwrap_or(name)
}
