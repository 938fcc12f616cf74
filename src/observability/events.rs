//! Lifecycle events
//!
//! Events are explicit and typed; each one carries its own severity.

use std::fmt;

use super::logger::Severity;

/// Observable events of the definition -> validator -> document pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// Configuration file loaded
    ConfigLoaded,

    // Definitions
    /// Definition fetched and parsed
    DefinitionLoaded,
    /// No search location holds the requested definition
    DefinitionNotFound,

    // Compilation
    /// Validator built for a definition
    ValidatorCompiled,
    /// Validator served from a cache
    ValidatorCacheHit,

    // Validation
    /// Document passed validation
    DocumentValidated,
    /// Document failed validation
    DocumentRejected,
    /// Cleanup removed keys or entries
    CleanupApplied,

    // Entity oracle
    /// Existence lookup issued
    OracleQueried,
    /// Existence lookup failed
    OracleFailed,
}

impl Event {
    /// Returns the string representation for logging
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::DefinitionLoaded => "DEFINITION_LOADED",
            Event::DefinitionNotFound => "DEFINITION_NOT_FOUND",
            Event::ValidatorCompiled => "VALIDATOR_COMPILED",
            Event::ValidatorCacheHit => "VALIDATOR_CACHE_HIT",
            Event::DocumentValidated => "DOCUMENT_VALIDATED",
            Event::DocumentRejected => "DOCUMENT_REJECTED",
            Event::CleanupApplied => "CLEANUP_APPLIED",
            Event::OracleQueried => "ORACLE_QUERIED",
            Event::OracleFailed => "ORACLE_FAILED",
        }
    }

    /// Severity the event is logged at
    pub fn severity(&self) -> Severity {
        match self {
            Event::DocumentValidated | Event::ValidatorCacheHit | Event::OracleQueried => {
                Severity::Trace
            }
            Event::DefinitionNotFound | Event::DocumentRejected | Event::OracleFailed => {
                Severity::Warn
            }
            _ => Severity::Info,
        }
    }

    /// No pipeline event is fatal; compile failures are reported to the caller.
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
