//! Validator attachment.
//!
//! A validator is wired into a unit once, after the unit was created, with
//! [`attach_validator`]. From then on the unit runs it according to the
//! configured [`ValidationTrigger`]s before committing state:
//!
//! | Trigger | Field | Field list |
//! |---|---|---|
//! | `Init` | on attach, fill and reset | on attach, fill, new slots and `reset_field` |
//! | `Touch` | when the touch latch flips, and on changes once touched | per slot, likewise |
//! | `Change` | on every `set_value` | per slot on every `set_value` |
//! | `Submit` | before every submit (always on) | whole list before every submit |
//!
//! `validate()` (and `validate_field()` for lists) run the validator
//! regardless of triggers. A validator may also depend on an external
//! [`Store`]; [`ExternalUpdatePolicy`] decides whether changes of that
//! store alone re-run it.
//!
//! # Examples
//!
//! ```
//! use formunit_forms::field::Field;
//! use formunit_forms::validator::{attach_validator, ValidatorConfig};
//! use formunit_forms::FormUnit;
//! use formunit_core::ValidationTrigger;
//!
//! let name = Field::new(String::new());
//! attach_validator(
//!     &name,
//!     ValidatorConfig::new(|value: &String| {
//!         if value.is_empty() { Err("Required.") } else { Ok(()) }
//!     })
//!     .validate_on([ValidationTrigger::Change]),
//! )
//! .unwrap();
//!
//! name.set_value("Ada".to_string());
//! assert!(!name.is_error().get());
//! ```

pub(crate) mod field;
pub(crate) mod field_list;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use formunit_core::{
    settings_or_default, ErrorState, ExternalUpdatePolicy, FormResult, ValidationTrigger,
};
use formunit_signals::Store;

/// What a validator function returns.
///
/// Conversions exist for the common shapes: `true` is valid, `false` is
/// invalid without messages, and strings are invalid with those messages.
/// An empty message list is still invalid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidatorResult {
    Valid,
    Invalid,
    Messages(Vec<String>),
}

impl From<bool> for ValidatorResult {
    fn from(valid: bool) -> Self {
        if valid {
            Self::Valid
        } else {
            Self::Invalid
        }
    }
}

impl From<&str> for ValidatorResult {
    fn from(message: &str) -> Self {
        Self::Messages(vec![message.to_string()])
    }
}

impl From<String> for ValidatorResult {
    fn from(message: String) -> Self {
        Self::Messages(vec![message])
    }
}

impl From<Vec<String>> for ValidatorResult {
    fn from(messages: Vec<String>) -> Self {
        Self::Messages(messages)
    }
}

impl From<Vec<&str>> for ValidatorResult {
    fn from(messages: Vec<&str>) -> Self {
        Self::Messages(messages.into_iter().map(str::to_string).collect())
    }
}

impl<E: Into<String>> From<Result<(), E>> for ValidatorResult {
    fn from(result: Result<(), E>) -> Self {
        match result {
            Ok(()) => Self::Valid,
            Err(message) => Self::Messages(vec![message.into()]),
        }
    }
}

impl From<ValidatorResult> for ErrorState {
    fn from(result: ValidatorResult) -> Self {
        match result {
            ValidatorResult::Valid => Self::valid(),
            ValidatorResult::Invalid => Self::invalid(),
            ValidatorResult::Messages(messages) => Self::with_messages(messages),
        }
    }
}

/// The input a field-list validator receives for one slot.
///
/// `index` is present when an existing slot is validated: on change, touch,
/// `reset_field`, `validate`, submit or an external change. Slots being
/// created by `append`, `prepend`, `insert` or `fill` are validated without
/// one. `id` is present only for lists built with ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListItem<V> {
    pub value: V,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// The resolved trigger set. `Submit` is implied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Strategy {
    pub(crate) init: bool,
    pub(crate) touch: bool,
    pub(crate) change: bool,
}

impl Strategy {
    fn from_triggers(triggers: &[ValidationTrigger]) -> Self {
        triggers
            .iter()
            .fold(Self::default(), |mut strategy, trigger| {
                match trigger {
                    ValidationTrigger::Init => strategy.init = true,
                    ValidationTrigger::Touch => strategy.touch = true,
                    ValidationTrigger::Change => strategy.change = true,
                    ValidationTrigger::Submit => {}
                }
                strategy
            })
    }

    /// Whether a value change on a slot with the given touch state validates.
    pub(crate) const fn validates_change(self, is_touched: bool) -> bool {
        self.change || (self.touch && is_touched)
    }
}

type ValidatorFn<I> = Arc<dyn Fn(&I) -> ValidatorResult + Send + Sync>;
type ExternalSubscribe = Box<dyn FnOnce(Arc<dyn Fn() + Send + Sync>) -> ExternalWatch + Send + Sync>;

/// A watcher registered on an external store, removed again on drop.
pub(crate) struct ExternalWatch {
    unwatch: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl ExternalWatch {
    fn new<E>(store: Store<E>, id: String) -> Self
    where
        E: Clone + PartialEq + Send + Sync + 'static,
    {
        Self {
            unwatch: Some(Box::new(move || {
                store.unwatch(&id);
            })),
        }
    }
}

impl Drop for ExternalWatch {
    fn drop(&mut self) {
        if let Some(unwatch) = self.unwatch.take() {
            unwatch();
        }
    }
}

/// A validator bound to a unit.
pub(crate) struct ActiveValidator<I> {
    validate: ValidatorFn<I>,
    pub(crate) strategy: Strategy,
    pub(crate) policy: ExternalUpdatePolicy,
    /// Held until the validator drops; the unit's external watcher goes with it.
    _watch: Option<ExternalWatch>,
}

impl<I> ActiveValidator<I> {
    pub(crate) fn with_watch(self, watch: ExternalWatch) -> Self {
        Self {
            _watch: Some(watch),
            ..self
        }
    }

    pub(crate) fn run(&self, input: &I) -> ErrorState {
        (self.validate)(input).into()
    }
}

/// Whether a unit validates its lifecycle operations.
pub(crate) enum ValidationMode<I> {
    Unvalidated,
    Validated(Arc<ActiveValidator<I>>),
}

impl<I> Default for ValidationMode<I> {
    fn default() -> Self {
        Self::Unvalidated
    }
}

impl<I> ValidationMode<I> {
    pub(crate) fn active(&self) -> Option<Arc<ActiveValidator<I>>> {
        match self {
            Self::Unvalidated => None,
            Self::Validated(validator) => Some(Arc::clone(validator)),
        }
    }

    pub(crate) const fn is_validated(&self) -> bool {
        matches!(self, Self::Validated(_))
    }
}

/// Configuration for [`attach_validator`].
///
/// Triggers and the external update policy default to the global
/// [`Settings`](formunit_core::Settings).
pub struct ValidatorConfig<I> {
    validator: ValidatorFn<I>,
    external: Option<ExternalSubscribe>,
    validate_on: Option<Vec<ValidationTrigger>>,
    update_by_external: Option<ExternalUpdatePolicy>,
}

impl<I> fmt::Debug for ValidatorConfig<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidatorConfig")
            .field("external", &self.external.is_some())
            .field("validate_on", &self.validate_on)
            .field("update_by_external", &self.update_by_external)
            .finish_non_exhaustive()
    }
}

impl<I: 'static> ValidatorConfig<I> {
    /// A validator that depends on the unit's value only.
    pub fn new<F, R>(validator: F) -> Self
    where
        F: Fn(&I) -> R + Send + Sync + 'static,
        R: Into<ValidatorResult>,
    {
        Self {
            validator: Arc::new(move |input: &I| validator(input).into()),
            external: None,
            validate_on: None,
            update_by_external: None,
        }
    }

    /// A validator that also reads `external`.
    ///
    /// Several stores can be combined into one with
    /// [`Store::combine`] before being passed here.
    pub fn with_external<E, F, R>(external: Store<E>, validator: F) -> Self
    where
        E: Clone + PartialEq + Send + Sync + 'static,
        F: Fn(&I, &E) -> R + Send + Sync + 'static,
        R: Into<ValidatorResult>,
    {
        let source = external.clone();
        let subscribe: ExternalSubscribe = Box::new(move |on_change| {
            let id = external.subscribe(Arc::new(move |_: &E| on_change()));
            ExternalWatch::new(external, id)
        });
        Self {
            validator: Arc::new(move |input: &I| source.with(|ext| validator(input, ext)).into()),
            external: Some(subscribe),
            validate_on: None,
            update_by_external: None,
        }
    }

    /// The triggers that run the validator. `Submit` is always active.
    #[must_use]
    pub fn validate_on(mut self, triggers: impl IntoIterator<Item = ValidationTrigger>) -> Self {
        self.validate_on = Some(triggers.into_iter().collect());
        self
    }

    /// Whether external changes alone re-run the validator.
    #[must_use]
    pub fn update_by_external(mut self, policy: impl Into<ExternalUpdatePolicy>) -> Self {
        self.update_by_external = Some(policy.into());
        self
    }

    /// Splits the config into the bound validator and the external hook.
    pub(crate) fn into_parts(self) -> (ActiveValidator<I>, Option<ExternalSubscribe>) {
        let settings = settings_or_default();
        let triggers = self
            .validate_on
            .unwrap_or_else(|| settings.validate_on.clone());
        let validator = ActiveValidator {
            validate: self.validator,
            strategy: Strategy::from_triggers(&triggers),
            policy: self
                .update_by_external
                .unwrap_or(settings.update_by_external),
            _watch: None,
        };
        let external = match validator.policy {
            ExternalUpdatePolicy::Never => None,
            _ => self.external,
        };
        (validator, external)
    }
}

/// A unit a validator can be attached to.
pub trait Validatable {
    /// What the validator function receives.
    type Input: 'static;

    /// Attaches `config` to this unit.
    ///
    /// # Errors
    ///
    /// Returns [`FormError::ValidatorAlreadyAttached`] if the unit already
    /// has a validator; the existing one stays in place.
    ///
    /// [`FormError::ValidatorAlreadyAttached`]: formunit_core::FormError::ValidatorAlreadyAttached
    fn attach_validator(&self, config: ValidatorConfig<Self::Input>) -> FormResult<()>;
}

/// Attaches a validator to a field, field list or controlled field list.
///
/// # Errors
///
/// Fails when the unit already has a validator.
pub fn attach_validator<U: Validatable>(unit: &U, config: ValidatorConfig<U::Input>) -> FormResult<()> {
    unit.attach_validator(config)
}
