//! # formunit
//!
//! Reactive form state for Rust: fields, field lists, list managers, groups
//! and validators that can be attached after construction.
//!
//! This is the meta-crate that re-exports all sub-crates for convenient access.
//! You can depend on `formunit` to get everything, or depend on individual
//! crates for finer-grained control.

/// Error types, settings, settings loading and logging setup.
pub use formunit_core as core;

/// Signals, observable stores and batched transactions.
pub use formunit_signals as signals;

/// Fields, field lists, list managers, groups and validators.
#[cfg(feature = "forms")]
pub use formunit_forms as forms;

/// Commonly used types in one import.
pub mod prelude {
    pub use formunit_core::{ErrorState, FormError, FormResult, Settings, ValidationTrigger};
    pub use formunit_signals::{batch, Signal, Store};

    #[cfg(feature = "forms")]
    pub use formunit_forms::{
        attach_validator, ControlledFieldList, Field, FieldGroup, FieldList, FieldListManager,
        FormUnit, ListItem, ValidatorConfig,
    };
}

// Third-party re-exports
pub use serde;
pub use serde_json;
pub use tracing;
pub use tracing_subscriber;
