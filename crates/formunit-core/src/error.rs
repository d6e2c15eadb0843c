//! Core error types for formunit.
//!
//! Two kinds of failure exist in the library and they never mix:
//!
//! - [`ErrorState`] is domain data. It describes whether a value is invalid
//!   and why, flows through unit state like any other value and is never
//!   returned as an `Err`.
//! - [`FormError`] describes programming and configuration mistakes such as
//!   attaching a second validator to a unit. These are returned from the
//!   operation that detected them.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The validation state of a single value.
///
/// `is_error` and `error_messages` are independent: a value can be invalid
/// without any message (a validator returning `false`).
///
/// # Examples
///
/// ```
/// use formunit_core::error::ErrorState;
///
/// let ok = ErrorState::valid();
/// assert!(!ok.is_error);
///
/// let err = ErrorState::with_messages(["Too short."]);
/// assert!(err.is_error);
/// assert_eq!(err.error_messages, vec!["Too short.".to_string()]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorState {
    /// Whether the value is currently considered invalid.
    pub is_error: bool,
    /// Human-readable reasons, possibly empty even when `is_error` is set.
    pub error_messages: Vec<String>,
}

impl ErrorState {
    /// A valid state with no messages.
    pub const fn valid() -> Self {
        Self {
            is_error: false,
            error_messages: Vec::new(),
        }
    }

    /// The state a unit starts from (and resets to) for the given
    /// `initial_error_state` flag. Messages are always empty.
    pub const fn initial(is_error: bool) -> Self {
        Self {
            is_error,
            error_messages: Vec::new(),
        }
    }

    /// An invalid state without messages.
    pub const fn invalid() -> Self {
        Self::initial(true)
    }

    /// An invalid state carrying the given messages.
    pub fn with_messages<I, S>(messages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            is_error: true,
            error_messages: messages.into_iter().map(Into::into).collect(),
        }
    }
}

impl fmt::Display for ErrorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_error {
            return write!(f, "valid");
        }
        if self.error_messages.is_empty() {
            write!(f, "invalid")
        } else {
            write!(f, "{}", self.error_messages.join("; "))
        }
    }
}

/// The primary error type for formunit.
///
/// Every variant describes a caller bug or a configuration problem. User
/// input never produces a `FormError`; it produces an [`ErrorState`].
#[derive(Error, Debug)]
pub enum FormError {
    // ── Wiring ───────────────────────────────────────────────────────

    /// A validator was attached to a unit that already has one.
    #[error("Validator already attached: {0}")]
    ValidatorAlreadyAttached(String),

    /// The columns of a field-list manager disagree on `with_id`.
    #[error("Mixed id configuration: {0}")]
    MixedIdConfiguration(String),

    /// A field-list manager was built without any column.
    #[error("Field-list manager template has no columns")]
    EmptyTemplate,

    /// A payload or key names a unit that does not exist.
    #[error("Unknown unit: {0}")]
    UnknownUnit(String),

    // ── Serialization ────────────────────────────────────────────────

    /// A type-erased payload could not be converted to or from a unit's value type.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    // ── Configuration ────────────────────────────────────────────────

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    // ── IO ───────────────────────────────────────────────────────────

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl FormError {
    /// Returns `true` for errors raised while wiring units together
    /// (as opposed to reading configuration or converting payloads).
    pub const fn is_wiring_error(&self) -> bool {
        matches!(
            self,
            Self::ValidatorAlreadyAttached(_)
                | Self::MixedIdConfiguration(_)
                | Self::EmptyTemplate
                | Self::UnknownUnit(_)
        )
    }
}

impl From<serde_json::Error> for FormError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

/// A convenience type alias for `Result<T, FormError>`.
pub type FormResult<T> = Result<T, FormError>;
