//! Settings system for formunit.
//!
//! This module provides the [`Settings`] struct, which holds library-wide
//! defaults (validation triggers, external update policy, logging), and
//! [`LazySettings`], a globally-accessible, configure-once container.
//! Units never require global settings: every default can be overridden at
//! the call site.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// A moment in a unit's lifecycle at which an attached validator runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationTrigger {
    /// At attachment time, on reset and when new values enter the unit.
    Init,
    /// When the touch latch flips.
    Touch,
    /// On every value change.
    Change,
    /// Before every submit. Always active.
    Submit,
}

impl ValidationTrigger {
    /// All triggers, in lifecycle order.
    pub const ALL: [Self; 4] = [Self::Init, Self::Touch, Self::Change, Self::Submit];

    /// The lowercase name used in configuration files.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Touch => "touch",
            Self::Change => "change",
            Self::Submit => "submit",
        }
    }
}

impl fmt::Display for ValidationTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValidationTrigger {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "init" => Ok(Self::Init),
            "touch" => Ok(Self::Touch),
            "change" => Ok(Self::Change),
            "submit" => Ok(Self::Submit),
            other => Err(format!("unknown validation trigger '{other}'")),
        }
    }
}

/// Whether a change of a validator's external dependencies alone
/// re-runs validation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExternalUpdatePolicy {
    /// External changes never trigger validation.
    Never,
    /// Every external change re-validates.
    Always,
    /// External changes re-validate only what has been validated before.
    #[default]
    AfterFirstValidation,
}

impl From<bool> for ExternalUpdatePolicy {
    fn from(value: bool) -> Self {
        if value {
            Self::Always
        } else {
            Self::Never
        }
    }
}

impl FromStr for ExternalUpdatePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "true" | "always" | "1" => Ok(Self::Always),
            "false" | "never" | "0" => Ok(Self::Never),
            "after_first_validation" | "afterfirstvalidation" => Ok(Self::AfterFirstValidation),
            other => Err(format!("unknown external update policy '{other}'")),
        }
    }
}

/// The complete set of library settings.
///
/// # Examples
///
/// ```
/// use formunit_core::settings::{Settings, ValidationTrigger};
///
/// let settings = Settings::default();
/// assert_eq!(settings.validate_on, vec![ValidationTrigger::Submit]);
/// assert_eq!(settings.log_level, "info");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    // ── Core ─────────────────────────────────────────────────────────

    /// Whether debug mode is enabled (pretty logs instead of JSON).
    pub debug: bool,

    // ── Validation ───────────────────────────────────────────────────

    /// Triggers used by validator attachments that do not name their own.
    pub validate_on: Vec<ValidationTrigger>,
    /// Policy used by validator attachments that do not name their own.
    pub update_by_external: ExternalUpdatePolicy,
    /// Initial error flag for units built with `from_settings` constructors.
    pub initial_error_state: bool,

    // ── Logging ──────────────────────────────────────────────────────

    /// The log level (e.g. "info", "debug", "warn").
    pub log_level: String,

    // ── Escape hatch ─────────────────────────────────────────────────

    /// Custom settings that don't fit into the above categories.
    pub extra: HashMap<String, serde_json::Value>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            debug: true,
            validate_on: vec![ValidationTrigger::Submit],
            update_by_external: ExternalUpdatePolicy::AfterFirstValidation,
            initial_error_state: false,
            log_level: "info".to_string(),
            extra: HashMap::new(),
        }
    }
}

/// A lazily-initialized, globally-accessible settings container.
///
/// Call [`configure`](LazySettings::configure) once at startup to set the
/// settings, then use [`get`](LazySettings::get) to access them.
///
/// # Panics
///
/// [`get`](LazySettings::get) panics if settings have not been configured.
/// [`configure`](LazySettings::configure) panics if called more than once.
pub struct LazySettings {
    inner: OnceLock<Settings>,
}

impl Default for LazySettings {
    fn default() -> Self {
        Self::new()
    }
}

impl LazySettings {
    /// Creates a new, unconfigured `LazySettings`.
    pub const fn new() -> Self {
        Self {
            inner: OnceLock::new(),
        }
    }

    /// Configures the global settings. Must be called exactly once.
    ///
    /// # Panics
    ///
    /// Panics if settings have already been configured.
    pub fn configure(&self, settings: Settings) {
        self.inner
            .set(settings)
            .expect("Settings have already been configured");
    }

    /// Returns a reference to the configured settings.
    ///
    /// # Panics
    ///
    /// Panics if settings have not been configured.
    pub fn get(&self) -> &Settings {
        self.inner
            .get()
            .expect("Settings have not been configured. Call SETTINGS.configure() first.")
    }

    /// Returns the configured settings, if any.
    pub fn try_get(&self) -> Option<&Settings> {
        self.inner.get()
    }

    /// Returns `true` if settings have been configured.
    pub fn is_configured(&self) -> bool {
        self.inner.get().is_some()
    }
}

/// The global settings instance.
///
/// Configuring it is optional; see [`settings_or_default`].
pub static SETTINGS: LazySettings = LazySettings::new();

static DEFAULT_SETTINGS: Lazy<Settings> = Lazy::new(Settings::default);

/// Returns the global settings when configured, otherwise the defaults.
pub fn settings_or_default() -> &'static Settings {
    SETTINGS.try_get().unwrap_or(&DEFAULT_SETTINGS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let s = Settings::default();
        assert!(s.debug);
        assert_eq!(s.validate_on, vec![ValidationTrigger::Submit]);
        assert_eq!(s.update_by_external, ExternalUpdatePolicy::AfterFirstValidation);
        assert!(!s.initial_error_state);
        assert_eq!(s.log_level, "info");
        assert!(s.extra.is_empty());
    }

    #[test]
    fn test_trigger_from_str() {
        assert_eq!("init".parse::<ValidationTrigger>(), Ok(ValidationTrigger::Init));
        assert_eq!(" Touch ".parse::<ValidationTrigger>(), Ok(ValidationTrigger::Touch));
        assert!("blur".parse::<ValidationTrigger>().is_err());
        assert_eq!(ValidationTrigger::Change.to_string(), "change");
    }

    #[test]
    fn test_external_policy_from_str_and_bool() {
        assert_eq!("true".parse(), Ok(ExternalUpdatePolicy::Always));
        assert_eq!("false".parse(), Ok(ExternalUpdatePolicy::Never));
        assert_eq!(
            "after_first_validation".parse(),
            Ok(ExternalUpdatePolicy::AfterFirstValidation)
        );
        assert_eq!(ExternalUpdatePolicy::from(true), ExternalUpdatePolicy::Always);
        assert_eq!(ExternalUpdatePolicy::from(false), ExternalUpdatePolicy::Never);
    }

    #[test]
    fn test_settings_serde_names() {
        let json = serde_json::to_value(Settings::default()).unwrap();
        assert_eq!(json["validate_on"][0], "submit");
        assert_eq!(json["update_by_external"], "after_first_validation");
    }

    #[test]
    fn test_lazy_settings_configure_and_get() {
        let lazy = LazySettings::new();
        assert!(!lazy.is_configured());
        assert!(lazy.try_get().is_none());

        let settings = Settings {
            debug: false,
            ..Settings::default()
        };

        lazy.configure(settings);
        assert!(lazy.is_configured());
        assert!(!lazy.get().debug);
    }

    #[test]
    #[should_panic(expected = "already been configured")]
    fn test_lazy_settings_double_configure_panics() {
        let lazy = LazySettings::new();
        lazy.configure(Settings::default());
        lazy.configure(Settings::default());
    }

    #[test]
    #[should_panic(expected = "not been configured")]
    fn test_lazy_settings_get_before_configure_panics() {
        let lazy = LazySettings::new();
        let _ = lazy.get();
    }

    #[test]
    fn test_settings_or_default_falls_back() {
        // The global is never configured in unit tests.
        assert_eq!(settings_or_default().validate_on, vec![ValidationTrigger::Submit]);
    }
}
