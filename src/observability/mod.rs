//! Observability
//!
//! - Structured logging (JSON lines on stderr)
//! - Counter metrics
//! - Typed lifecycle events
//!
//! Observability is read-only: nothing here changes what the pipeline
//! returns, and logging failures are swallowed.
//!
//! ```ignore
//! use modelgen::observability::{Logger, Event, MetricsRegistry, ObservationScope};
//!
//! Logger::info("CHECK_COMPLETE", &[("type", "Post")]);
//!
//! let metrics = MetricsRegistry::new();
//! metrics.increment_documents_validated();
//!
//! let scope = ObservationScope::new("COMPILE");
//! scope.complete();
//! ```

mod events;
mod logger;
mod metrics;
mod scope;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use metrics::{MetricsRegistry, MetricsSnapshot};
pub use scope::{ObservationScope, Timer};

/// Log a lifecycle event at its own severity
pub fn log_event(event: Event) {
    Logger::log(event.severity(), event.as_str(), &[]);
}

/// Log a lifecycle event with fields
pub fn log_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    Logger::log(event.severity(), event.as_str(), fields);
}
