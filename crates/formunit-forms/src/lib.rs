//! # formunit-forms
//!
//! Reactive form units built on [`formunit_signals`]. Every unit exposes the
//! same lifecycle (`fill`, `refill`, `validate`, `submit`, `reset`), announces
//! submit outcomes through `resolved`/`rejected` signals and publishes
//! aggregate flag stores (`is_error`, `is_dirty`, `is_touched`, `is_loading`,
//! `is_focused`, `is_ready`).
//!
//! ## Modules
//!
//! - [`field`] - A single value with error, dirty, touch, focus and loading state
//! - [`field_list`] - An ordered list of field slots with stable keys
//! - [`controlled_field_list`] - A field list whose slots are created by a manager
//! - [`field_list_core`] - The state and per-slot operations shared by both lists
//! - [`field_list_manager`] - Several controlled lists driven as rows of one table
//! - [`field_group`] - Named units of any kind combined into one unit
//! - [`validator`] - Attaching validators to fields and lists after construction
//! - [`submission`] - Awaiting the next submit outcome of a unit
//! - [`counter`] - Slot key allocation
//! - [`utils`] - Non-mutating array helpers
//! - [`touch`] - Touch latch edge detection
//!
//! ## Usage
//!
//! ```
//! use formunit_forms::{attach_validator, Field, FormUnit, ValidatorConfig};
//!
//! let email = Field::new(String::new());
//! attach_validator(
//!     &email,
//!     ValidatorConfig::new(|value: &String| value.contains('@')),
//! )
//! .unwrap();
//!
//! email.set_value("ada".to_string());
//! assert!(email.submit().is_err());
//! assert!(email.is_error().get());
//!
//! email.set_value("ada@example.com".to_string());
//! assert_eq!(email.submit(), Ok("ada@example.com".to_string()));
//! ```

pub mod controlled_field_list;
pub mod counter;
pub mod field;
pub mod field_group;
pub mod field_list;
pub mod field_list_core;
pub mod field_list_manager;
pub mod submission;
pub mod touch;
pub mod unit;
pub mod utils;
pub mod validator;

// Re-export the most commonly used types at the crate root.
pub use controlled_field_list::ControlledFieldList;
pub use counter::KeyCounter;
pub use field::{Field, FieldConfig, FieldState};
pub use field_group::{FieldGroup, FieldGroupBuilder, GroupError, GroupOutput};
pub use field_list::FieldList;
pub use field_list_core::{
    FieldListConfig, FieldListCore, FieldListState, ListEntry, ListValues, NewSlot, SlotError,
    SlotTouched,
};
pub use field_list_manager::{
    FieldListManager, FieldListManagerBuilder, ManagerRow, RowError, RowInit,
};
pub use submission::{submit_outcome, SubmitOutcome};
pub use unit::{FieldValue, FlagSnapshot, FormUnit, UnitFlags};
pub use validator::{attach_validator, ListItem, Validatable, ValidatorConfig, ValidatorResult};
