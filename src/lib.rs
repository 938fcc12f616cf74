//! modelgen - declarative model definitions compiled into document validators
//!
//! A definition names a document type's properties and relations. The
//! compiler turns it into an immutable validator that checks documents,
//! fills defaults, validates embedded documents recursively and applies
//! cleanup (blacklisted values, dangling id keys).
//!
//! ```ignore
//! use modelgen::schema::{DirectorySource, SchemaCompiler};
//!
//! let compiler = SchemaCompiler::new(DirectorySource::new(vec!["models".into()]));
//! let validator = compiler.get_validator("Post")?;
//! let cleaned = validator.validate(&document)?;
//! ```

pub mod cli;
pub mod observability;
pub mod schema;
