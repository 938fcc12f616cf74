//! CLI command implementations
//!
//! Both commands load the configuration, build a compiler over the
//! configured search roots and compile the requested definition. The CLI
//! has no entity store: documents touching an autoclean field with numeric
//! keys are rejected.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::observability::{log_event_with_fields, Event, Logger, Severity};
use crate::schema::{
    CompilerOptions, Definition, DefinitionSource, DirectorySource, FieldType, SchemaCompiler,
    DEFAULT_EMBEDDED_DIR, DEFAULT_EXTENSION,
};

use super::args::Command;
use super::errors::{CliError, CliResult};
use super::io::{read_document, write_error, write_response, write_violations};

/// Configuration file structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Ordered definition search roots (required, non-empty)
    pub search_roots: Vec<PathBuf>,

    /// Definition file extension (optional, default "json")
    #[serde(default = "default_extension")]
    pub extension: String,

    /// Per-root subdirectory searched first (optional, default "embedded_models.json")
    #[serde(default = "default_embedded_dir")]
    pub embedded_dir: Option<String>,

    /// Reject undeclared document keys (optional, default true)
    #[serde(default = "default_reject_unknown_keys")]
    pub reject_unknown_keys: bool,

    /// Minimum log severity (optional, default "info")
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_extension() -> String {
    DEFAULT_EXTENSION.to_string()
}
fn default_embedded_dir() -> Option<String> {
    Some(DEFAULT_EMBEDDED_DIR.to_string())
}
fn default_reject_unknown_keys() -> bool {
    true
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> CliResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| CliError::config_error(format!("Failed to read config: {}", e)))?;

        let config: Config = serde_json::from_str(&content)
            .map_err(|e| CliError::config_error(format!("Invalid config JSON: {}", e)))?;

        config.validate()?;

        let shown = path.display().to_string();
        let roots = config.search_roots.len().to_string();
        log_event_with_fields(
            Event::ConfigLoaded,
            &[("path", shown.as_str()), ("roots", roots.as_str())],
        );

        Ok(config)
    }

    fn validate(&self) -> CliResult<()> {
        if self.search_roots.is_empty() {
            return Err(CliError::config_error("search_roots must not be empty"));
        }

        if self.extension.trim().is_empty() {
            return Err(CliError::config_error("extension must not be empty"));
        }

        if self.embedded_dir.as_deref().is_some_and(|d| d.trim().is_empty()) {
            return Err(CliError::config_error(
                "embedded_dir must not be empty; use null to disable it",
            ));
        }

        self.log_severity()?;

        Ok(())
    }

    /// Parsed `log_level`
    pub fn log_severity(&self) -> CliResult<Severity> {
        Severity::parse(&self.log_level).ok_or_else(|| {
            CliError::config_error(format!(
                "Invalid log_level: '{}'. Expected trace, info, warn, error or fatal.",
                self.log_level
            ))
        })
    }

    /// Filesystem definition source over the configured roots
    pub fn definition_source(&self) -> DirectorySource {
        DirectorySource::new(self.search_roots.clone())
            .with_extension(self.extension.clone())
            .with_embedded_dir(self.embedded_dir.clone())
    }

    pub fn compiler_options(&self) -> CompilerOptions {
        CompilerOptions {
            reject_unknown_keys: self.reject_unknown_keys,
        }
    }

    /// Compiler over the configured source, without an entity oracle
    pub fn compiler(&self) -> SchemaCompiler<DirectorySource> {
        SchemaCompiler::new(self.definition_source()).with_options(self.compiler_options())
    }
}

/// Main CLI entry point
///
/// Parses arguments and dispatches to the appropriate command.
/// This is the only function that main.rs should call.
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    run_command(cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Check { config, type_name } => check(&config, &type_name),
        Command::Validate { config, type_name } => validate(&config, &type_name),
    }
}

fn load_config(config_path: &Path) -> CliResult<Config> {
    let config = Config::load(config_path)?;
    Logger::set_min_severity(config.log_severity()?);
    Ok(config)
}

/// Compile a definition and print its field summary
pub fn check(config_path: &Path, type_name: &str) -> CliResult<()> {
    let config = load_config(config_path)?;
    match summarize(&config, type_name) {
        Ok(summary) => write_response(summary),
        Err(err) => {
            write_error(err.code_str(), err.message())?;
            Err(err)
        }
    }
}

/// Validate one document from stdin
///
/// Prints the cleaned document, or the violations and fails.
pub fn validate(config_path: &Path, type_name: &str) -> CliResult<()> {
    let config = load_config(config_path)?;
    let document = read_document()?;

    let validator = match config.compiler().get_validator(type_name) {
        Ok(validator) => validator,
        Err(err) => {
            write_error(err.code().code(), err.message())?;
            return Err(err.into());
        }
    };
    match validator.validate(&document) {
        Ok(cleaned) => write_response(cleaned),
        Err(err) => {
            write_violations(err.code().code(), err.violations())?;
            Err(err.into())
        }
    }
}

/// Compiles `type_name` and describes its fields in declared order.
pub fn summarize(config: &Config, type_name: &str) -> CliResult<Value> {
    describe(&config.compiler(), type_name)
}

/// Summary built from a single load of the definition, so the description
/// and the compiled validator come from the same document.
pub fn describe<S: DefinitionSource>(
    compiler: &SchemaCompiler<S>,
    type_name: &str,
) -> CliResult<Value> {
    let definition = compiler.load_definition(type_name)?;
    let validator = compiler.compile_definition(&definition)?;

    Ok(json!({
        "type": validator.type_name(),
        "fields": describe_fields(&definition),
        "required": definition.required_fields(),
    }))
}

fn describe_fields(definition: &Definition) -> Vec<Value> {
    let choices = definition.choice_fields();
    let mut fields = Vec::new();

    for (name, spec) in definition.properties() {
        let mut entry = json!({
            "name": name,
            "kind": "property",
            "type": spec.field_type.type_name(),
            "required": spec.required,
        });
        if let Some(default) = &spec.default {
            entry["default"] = default.clone();
        }
        if let FieldType::Reference(target) = &spec.field_type {
            entry["embeds"] = json!(target);
        }
        if let Some((_, list)) = choices.iter().find(|(n, _)| *n == name) {
            entry["choices"] = list.iter().map(|c| json!([c.value, c.label])).collect();
        }
        fields.push(entry);
    }

    for (name, spec) in definition.relations() {
        let mut entry = json!({
            "name": name,
            "kind": spec.kind.as_str(),
            "model": spec.model,
            "required": spec.required,
        });
        if let Some(default) = &spec.default {
            entry["default"] = default.clone();
        }
        if let Some(model) = spec.key.as_ref().and_then(|k| k.autoclean_model()) {
            entry["autoclean"] = json!(model);
        }
        fields.push(entry);
    }

    fields
}
