//! # formunit-core
//!
//! Core types, settings, and error types for the formunit workspace.
//! This crate has no dependency on the reactive substrate and provides the
//! foundation for all other crates.
//!
//! ## Modules
//!
//! - [`error`] - Configuration error types, result alias and the domain [`ErrorState`]
//! - [`settings`] - Library-wide defaults and the global settings container
//! - [`settings_loader`] - Loading settings from TOML, JSON and the environment
//! - [`logging`] - Tracing-based logging integration

pub mod error;
pub mod logging;
pub mod settings;
pub mod settings_loader;

// Re-export the most commonly used types at the crate root.
pub use error::{ErrorState, FormError, FormResult};
pub use settings::{
    settings_or_default, ExternalUpdatePolicy, Settings, ValidationTrigger, SETTINGS,
};
