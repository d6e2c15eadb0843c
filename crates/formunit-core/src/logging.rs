//! Logging integration for formunit.
//!
//! Provides helpers for configuring [`tracing`]-based logging from
//! [`Settings`](crate::settings::Settings) and for creating per-unit spans.

use crate::settings::Settings;

/// Sets up the global tracing subscriber based on the given settings.
///
/// The log level is read from `settings.log_level` (e.g. "debug", "info", "warn",
/// "error"). In debug mode a pretty, human-readable format is used; otherwise
/// a structured JSON format is used. Installing a second subscriber is a no-op.
pub fn setup_logging(settings: &Settings) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(&settings.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    if settings.debug {
        fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(false)
            .with_file(true)
            .with_line_number(true)
            .pretty()
            .try_init()
            .ok();
    } else {
        fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .json()
            .try_init()
            .ok();
    }
}

/// Creates a tracing span for a form unit.
///
/// Enter this span around work on a unit so that all log entries emitted by
/// its operations carry the unit kind and name.
///
/// # Examples
///
/// ```
/// use formunit_core::logging::unit_span;
///
/// let span = unit_span("field", "email");
/// let _guard = span.enter();
/// tracing::info!("validating");
/// ```
pub fn unit_span(kind: &str, name: &str) -> tracing::Span {
    tracing::info_span!("form_unit", kind = kind, name = name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_logging_twice_is_harmless() {
        let settings = Settings {
            log_level: "not a level ((".to_string(),
            ..Settings::default()
        };
        setup_logging(&settings);
        setup_logging(&Settings::default());
    }

    #[test]
    fn test_unit_span_enter() {
        let span = unit_span("field_list", "emails");
        let _guard = span.enter();
        tracing::debug!("inside span");
    }
}
