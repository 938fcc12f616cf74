//! Schema error types
//!
//! Two families of errors leave this module:
//!
//! - [`SchemaError`]: raised while loading and compiling definitions. Always
//!   FATAL to the compile call; no partial validator is ever returned.
//! - [`ValidationError`]: raised by `Validator::validate` for untrusted
//!   input. Always REJECT; the caller renders it to the user.
//!
//! Error codes:
//! - MODELGEN_DEFINITION_NOT_FOUND (FATAL)
//! - MODELGEN_MALFORMED_DEFINITION (FATAL)
//! - MODELGEN_UNKNOWN_FIELD_TYPE (FATAL)
//! - MODELGEN_CYCLIC_DEFINITION (FATAL)
//! - MODELGEN_VALIDATION_FAILED (REJECT)

use std::fmt;

/// Severity levels for schema errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Input rejected, caller may recover
    Reject,
    /// Validator construction aborted
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Reject => write!(f, "REJECT"),
            Severity::Fatal => write!(f, "FATAL"),
        }
    }
}

/// Schema-specific error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaErrorCode {
    /// No search root holds a definition with this name
    DefinitionNotFound,
    /// Definition document exists but has the wrong shape
    MalformedDefinition,
    /// Field declares a type that is neither primitive nor a relation
    UnknownFieldType,
    /// Definition embeds itself, directly or transitively
    CyclicDefinition,
    /// Document violates a compiled validator
    ValidationFailed,
}

impl SchemaErrorCode {
    /// Returns the stable string code
    pub fn code(&self) -> &'static str {
        match self {
            SchemaErrorCode::DefinitionNotFound => "MODELGEN_DEFINITION_NOT_FOUND",
            SchemaErrorCode::MalformedDefinition => "MODELGEN_MALFORMED_DEFINITION",
            SchemaErrorCode::UnknownFieldType => "MODELGEN_UNKNOWN_FIELD_TYPE",
            SchemaErrorCode::CyclicDefinition => "MODELGEN_CYCLIC_DEFINITION",
            SchemaErrorCode::ValidationFailed => "MODELGEN_VALIDATION_FAILED",
        }
    }

    /// Returns the severity level for this error
    pub fn severity(&self) -> Severity {
        match self {
            SchemaErrorCode::ValidationFailed => Severity::Reject,
            _ => Severity::Fatal,
        }
    }
}

impl fmt::Display for SchemaErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Compile-time error with full context
#[derive(Debug, Clone)]
pub struct SchemaError {
    code: SchemaErrorCode,
    message: String,
    type_name: Option<String>,
    field_name: Option<String>,
    declared_type: Option<String>,
}

impl SchemaError {
    fn new(code: SchemaErrorCode, message: String) -> Self {
        Self {
            code,
            message,
            type_name: None,
            field_name: None,
            declared_type: None,
        }
    }

    /// No definition document matches `type_name` in any search root
    pub fn definition_not_found(type_name: impl Into<String>) -> Self {
        let name = type_name.into();
        let mut err = Self::new(
            SchemaErrorCode::DefinitionNotFound,
            format!("Can't find definition '{}' in any search root", name),
        );
        err.type_name = Some(name);
        err
    }

    /// The definition exists but does not have the expected shape
    pub fn malformed_definition(type_name: impl Into<String>, detail: impl Into<String>) -> Self {
        let name = type_name.into();
        let mut err = Self::new(
            SchemaErrorCode::MalformedDefinition,
            format!("Malformed definition '{}': {}", name, detail.into()),
        );
        err.type_name = Some(name);
        err
    }

    /// Same as [`malformed_definition`](Self::malformed_definition) but scoped to a field
    pub fn malformed_field(
        type_name: impl Into<String>,
        field_name: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        let name = type_name.into();
        let field = field_name.into();
        let mut err = Self::new(
            SchemaErrorCode::MalformedDefinition,
            format!("Malformed definition '{}', field '{}': {}", name, field, detail.into()),
        );
        err.type_name = Some(name);
        err.field_name = Some(field);
        err
    }

    /// A field's `type` is not a known primitive nor a relation kind
    pub fn unknown_field_type(
        type_name: impl Into<String>,
        field_name: impl Into<String>,
        declared_type: impl Into<String>,
    ) -> Self {
        let name = type_name.into();
        let field = field_name.into();
        let declared = declared_type.into();
        let mut err = Self::new(
            SchemaErrorCode::UnknownFieldType,
            format!(
                "Definition '{}', field '{}': unknown type '{}'",
                name, field, declared
            ),
        );
        err.type_name = Some(name);
        err.field_name = Some(field);
        err.declared_type = Some(declared);
        err
    }

    /// Compilation re-entered a type already on the compile stack
    pub fn cyclic_definition(chain: &[String], repeated: &str) -> Self {
        let mut path = chain.join(" -> ");
        if !path.is_empty() {
            path.push_str(" -> ");
        }
        path.push_str(repeated);
        let mut err = Self::new(
            SchemaErrorCode::CyclicDefinition,
            format!("Definition '{}' embeds itself: {}", repeated, path),
        );
        err.type_name = Some(repeated.to_string());
        err
    }

    /// Returns the error code
    pub fn code(&self) -> SchemaErrorCode {
        self.code
    }

    /// Returns the severity level
    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the document-type name the error is about
    pub fn type_name(&self) -> Option<&str> {
        self.type_name.as_deref()
    }

    /// Returns the field name if the error is scoped to one field
    pub fn field_name(&self) -> Option<&str> {
        self.field_name.as_deref()
    }

    /// Returns the declared type for `UnknownFieldType`
    pub fn declared_type(&self) -> Option<&str> {
        self.declared_type.as_deref()
    }

    /// Returns whether this is a fatal error
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.code.severity(), self.code.code(), self.message)
    }
}

impl std::error::Error for SchemaError {}

/// Result type for schema operations
pub type SchemaResult<T> = Result<T, SchemaError>;

/// One failed predicate, scoped to a field path (e.g. `outer.inner[2].leaf`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Dotted field path, with `[i]` for sequence elements
    pub path: String,
    /// Human-readable description of the failure
    pub message: String,
}

impl Violation {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn missing_key(path: impl Into<String>) -> Self {
        let path = path.into();
        let message = format!("Missing key '{}'", leaf_name(&path));
        Self { path, message }
    }

    pub fn wrong_key(path: impl Into<String>) -> Self {
        let path = path.into();
        let message = format!("Wrong key '{}'", leaf_name(&path));
        Self { path, message }
    }

    pub fn type_mismatch(path: impl Into<String>, expected: &str, actual: &str) -> Self {
        let path = path.into();
        let message = format!(
            "Key '{}' error: {} should be instance of '{}'",
            leaf_name(&path),
            actual,
            expected
        );
        Self { path, message }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "field '{}': {}", self.path, self.message)
        }
    }
}

/// Returns the last path segment, dropping any trailing `[i]` index.
pub(crate) fn leaf_name(path: &str) -> &str {
    let leaf = path.rsplit('.').next().unwrap_or(path);
    match leaf.find('[') {
        Some(idx) => &leaf[..idx],
        None => leaf,
    }
}

/// Validation failure raised by `Validator::validate`
///
/// Holds at least one violation. Only `embedsManyAsObject` fields report more
/// than one (one per offending key); everything else stops at the first
/// failing field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    type_name: String,
    violations: Vec<Violation>,
}

impl ValidationError {
    pub fn new(type_name: impl Into<String>, violation: Violation) -> Self {
        Self {
            type_name: type_name.into(),
            violations: vec![violation],
        }
    }

    /// Builds an error from several violations; `None` if the list is empty.
    pub fn from_violations(type_name: impl Into<String>, violations: Vec<Violation>) -> Option<Self> {
        if violations.is_empty() {
            return None;
        }
        Some(Self {
            type_name: type_name.into(),
            violations,
        })
    }

    /// Returns the error code
    pub fn code(&self) -> SchemaErrorCode {
        SchemaErrorCode::ValidationFailed
    }

    /// Name of the document type whose validator rejected the input
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// All violations in report order
    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    pub fn first(&self) -> &Violation {
        &self.violations[0]
    }

    /// Field path of the first violation
    pub fn field_path(&self) -> &str {
        &self.first().path
    }

    /// Message of the first violation
    pub fn message(&self) -> &str {
        &self.first().message
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: '{}' rejected: ",
            Severity::Reject,
            SchemaErrorCode::ValidationFailed.code(),
            self.type_name
        )?;
        for (i, violation) in self.violations.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}", violation)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

/// Result type for validation
pub type ValidationResult<T> = Result<T, ValidationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            SchemaErrorCode::DefinitionNotFound.code(),
            "MODELGEN_DEFINITION_NOT_FOUND"
        );
        assert_eq!(
            SchemaErrorCode::MalformedDefinition.code(),
            "MODELGEN_MALFORMED_DEFINITION"
        );
        assert_eq!(
            SchemaErrorCode::UnknownFieldType.code(),
            "MODELGEN_UNKNOWN_FIELD_TYPE"
        );
        assert_eq!(
            SchemaErrorCode::CyclicDefinition.code(),
            "MODELGEN_CYCLIC_DEFINITION"
        );
    }

    #[test]
    fn test_severity_levels() {
        assert_eq!(SchemaErrorCode::DefinitionNotFound.severity(), Severity::Fatal);
        assert_eq!(SchemaErrorCode::CyclicDefinition.severity(), Severity::Fatal);
        assert_eq!(SchemaErrorCode::ValidationFailed.severity(), Severity::Reject);
    }

    #[test]
    fn test_not_found_carries_name() {
        let err = SchemaError::definition_not_found("Tag");
        assert_eq!(err.type_name(), Some("Tag"));
        assert!(err.is_fatal());
        assert!(err.to_string().contains("MODELGEN_DEFINITION_NOT_FOUND"));
    }

    #[test]
    fn test_unknown_field_type_context() {
        let err = SchemaError::unknown_field_type("Post", "body", "text");
        assert_eq!(err.field_name(), Some("body"));
        assert_eq!(err.declared_type(), Some("text"));
        assert!(err.message().contains("'text'"));
    }

    #[test]
    fn test_cyclic_path_rendering() {
        let chain = vec!["A".to_string(), "B".to_string()];
        let err = SchemaError::cyclic_definition(&chain, "A");
        assert!(err.message().contains("A -> B -> A"));
    }

    #[test]
    fn test_violation_messages_name_leaf_key() {
        let v = Violation::type_mismatch("many_embedded[2].many_embedded2", "array", "null");
        assert_eq!(
            v.message,
            "Key 'many_embedded2' error: null should be instance of 'array'"
        );
        assert_eq!(Violation::missing_key("name").message, "Missing key 'name'");
    }

    #[test]
    fn test_validation_error_accessors() {
        let err = ValidationError::new("User", Violation::missing_key("name"));
        assert_eq!(err.field_path(), "name");
        assert_eq!(err.code(), SchemaErrorCode::ValidationFailed);
        assert!(err.to_string().contains("field 'name'"));
    }

    #[test]
    fn test_empty_violation_list_is_not_an_error() {
        assert!(ValidationError::from_violations("User", Vec::new()).is_none());
    }
}
