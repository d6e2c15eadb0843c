//! Single-value form units.
//!
//! A [`Field`] owns one value plus its error state and interaction flags.
//! All of it lives in one [`FieldState`] store, and every operation commits
//! a single update inside a [`batch`], so derived stores never observe a
//! half-applied operation.
//!
//! # Examples
//!
//! ```
//! use formunit_forms::field::Field;
//! use formunit_forms::FormUnit;
//!
//! let email = Field::new(String::new());
//! email.set_value("ada@example.com".to_string());
//! assert!(email.is_dirty().get());
//!
//! email.set_focus(true);
//! email.set_focus(false);
//! assert!(email.is_touched().get());
//!
//! assert_eq!(email.submit(), Ok("ada@example.com".to_string()));
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, Weak};

use formunit_core::logging::unit_span;
use formunit_core::{
    settings_or_default, ErrorState, ExternalUpdatePolicy, FormError, FormResult,
};
use formunit_signals::{batch, Signal, Store};

use crate::touch::touch_transition;
use crate::unit::{FieldValue, FlagSnapshot, FormUnit, UnitFlags};
use crate::validator::{ActiveValidator, ValidationMode};

/// Construction options for a [`Field`].
#[derive(Debug, Clone, Default)]
pub struct FieldConfig {
    /// The error flag the field starts from and resets to.
    pub initial_error_state: bool,
    /// A name used in log output.
    pub name: Option<String>,
}

impl FieldConfig {
    /// Defaults taken from the global settings.
    pub fn from_settings() -> Self {
        Self {
            initial_error_state: settings_or_default().initial_error_state,
            name: None,
        }
    }

    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub const fn initial_error_state(mut self, is_error: bool) -> Self {
        self.initial_error_state = is_error;
        self
    }
}

/// The complete observable state of a field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldState<V> {
    pub value: V,
    pub error: ErrorState,
    /// `value != initial_value`.
    pub is_dirty: bool,
    /// Latched on the first blur after a focus; cleared only by reset.
    pub is_touched: bool,
    pub is_focused: bool,
    pub is_loading: bool,
    pub is_disabled: bool,
}

impl<V> FieldState<V> {
    fn initial(value: V, error: ErrorState) -> Self {
        Self {
            value,
            error,
            is_dirty: false,
            is_touched: false,
            is_focused: false,
            is_loading: false,
            is_disabled: false,
        }
    }

    /// The aggregate flags of this state.
    pub const fn flags(&self) -> FlagSnapshot {
        FlagSnapshot {
            is_error: self.error.is_error,
            is_dirty: self.is_dirty,
            is_touched: self.is_touched,
            is_loading: self.is_loading,
            is_focused: self.is_focused,
        }
    }
}

struct FieldInner<V: FieldValue> {
    name: String,
    initial_value: V,
    initial_error_state: bool,
    state: Store<FieldState<V>>,
    value: Store<V>,
    error_messages: Store<Vec<String>>,
    is_disabled: Store<bool>,
    flags: UnitFlags,
    last_filled: RwLock<Option<V>>,
    validation: RwLock<ValidationMode<V>>,
    validated_once: AtomicBool,
    resolved: Signal<V>,
    rejected: Signal<Vec<String>>,
    touched: Signal<()>,
}

/// A reactive single-value unit.
///
/// `Field` is a cheap handle; clones operate on the same field.
pub struct Field<V: FieldValue> {
    inner: Arc<FieldInner<V>>,
}

impl<V: FieldValue> Clone for Field<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V: FieldValue + fmt::Debug> fmt::Debug for Field<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.inner.name)
            .field("state", &self.inner.state.get())
            .field("has_validator", &self.has_validator())
            .finish()
    }
}

impl<V: FieldValue> Field<V> {
    /// Creates a field that starts valid.
    pub fn new(initial_value: V) -> Self {
        Self::with_config(initial_value, FieldConfig::default())
    }

    /// Creates a field using the global settings for its defaults.
    pub fn from_settings(initial_value: V) -> Self {
        Self::with_config(initial_value, FieldConfig::from_settings())
    }

    pub fn with_config(initial_value: V, config: FieldConfig) -> Self {
        let state = Store::new(FieldState::initial(
            initial_value.clone(),
            ErrorState::initial(config.initial_error_state),
        ));
        let flags = UnitFlags::from_snapshot(state.map(FieldState::flags));

        Self {
            inner: Arc::new(FieldInner {
                name: config.name.unwrap_or_else(|| "field".to_string()),
                initial_value,
                initial_error_state: config.initial_error_state,
                value: state.map(|s: &FieldState<V>| s.value.clone()),
                error_messages: state.map(|s: &FieldState<V>| s.error.error_messages.clone()),
                is_disabled: state.map(|s: &FieldState<V>| s.is_disabled),
                state,
                flags,
                last_filled: RwLock::new(None),
                validation: RwLock::new(ValidationMode::Unvalidated),
                validated_once: AtomicBool::new(false),
                resolved: Signal::new(),
                rejected: Signal::new(),
                touched: Signal::new(),
            }),
        }
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn initial_value(&self) -> &V {
        &self.inner.initial_value
    }

    pub fn initial_error_state(&self) -> bool {
        self.inner.initial_error_state
    }

    /// Returns `true` once a validator has been attached.
    pub fn has_validator(&self) -> bool {
        self.inner
            .validation
            .read()
            .expect("validation lock poisoned")
            .is_validated()
    }

    /// The whole field state as one store.
    pub fn state(&self) -> &Store<FieldState<V>> {
        &self.inner.state
    }

    pub fn value(&self) -> &Store<V> {
        &self.inner.value
    }

    pub fn error_messages(&self) -> &Store<Vec<String>> {
        &self.inner.error_messages
    }

    pub fn is_disabled(&self) -> &Store<bool> {
        &self.inner.is_disabled
    }

    /// Fired once each time the touch latch flips on.
    pub fn touched(&self) -> &Signal<()> {
        &self.inner.touched
    }

    // ── Operations ───────────────────────────────────────────────────

    /// Sets the value and recomputes `is_dirty` against the initial value.
    ///
    /// With a validator, the new value is validated on `Change`, or on
    /// `Touch` once the field is touched; otherwise the error state is kept.
    /// Without one, the error state goes back to the initial one.
    pub fn set_value(&self, value: V) {
        batch(|| {
            let error = match self.validator() {
                Some(validator) => {
                    let is_touched = self.inner.state.with(|s| s.is_touched);
                    validator
                        .strategy
                        .validates_change(is_touched)
                        .then(|| self.run_validator(&validator, &value))
                }
                None => Some(ErrorState::initial(self.inner.initial_error_state)),
            };
            self.apply_value(value, error);
        });
    }

    /// Loads `value` and remembers it for [`refill`](Self::refill).
    pub fn fill(&self, value: V) {
        batch(|| {
            *self.inner.last_filled.write().expect("fill lock poisoned") = Some(value.clone());
            let error = match self.validator() {
                Some(validator) if validator.strategy.init => {
                    Some(self.run_validator(&validator, &value))
                }
                Some(_) => None,
                None => Some(ErrorState::initial(self.inner.initial_error_state)),
            };
            self.apply_value(value, error);
        });
        tracing::debug!("Field '{}' filled", self.inner.name);
    }

    /// Fills the field again with the last filled value.
    ///
    /// No-op before the first fill and after a reset.
    pub fn refill(&self) {
        let last = self.inner.last_filled.read().expect("fill lock poisoned").clone();
        match last {
            Some(value) => self.fill(value),
            None => tracing::trace!("Field '{}' has nothing to refill", self.inner.name),
        }
    }

    /// Restores the construction-time state and forgets the last fill.
    ///
    /// The error state returns to `initial_error_state`, unless a validator
    /// with the `Init` trigger is attached, which validates the initial value.
    pub fn reset(&self) {
        batch(|| {
            *self.inner.last_filled.write().expect("fill lock poisoned") = None;
            self.inner.validated_once.store(false, Ordering::SeqCst);
            let error = match self.validator() {
                Some(validator) if validator.strategy.init => {
                    self.run_validator(&validator, &self.inner.initial_value)
                }
                _ => ErrorState::initial(self.inner.initial_error_state),
            };
            self.inner
                .state
                .set(FieldState::initial(self.inner.initial_value.clone(), error));
        });
        tracing::debug!("Field '{}' reset", self.inner.name);
    }

    /// Validates the current value. Inert without a validator.
    pub fn validate(&self) {
        if let Some(validator) = self.validator() {
            batch(|| {
                let value = self.inner.state.with(|s| s.value.clone());
                let error = self.run_validator(&validator, &value);
                self.set_error(error);
            });
        }
    }

    /// Submits the field.
    ///
    /// Without a validator the current error state decides the outcome and
    /// is left untouched. With one, the current value is validated first.
    ///
    /// # Errors
    ///
    /// Returns the error messages when the field is invalid.
    pub fn submit(&self) -> Result<V, Vec<String>> {
        let _span = unit_span("field", &self.inner.name).entered();
        let (value, error) = batch(|| {
            let (value, current) = self.inner.state.with(|s| (s.value.clone(), s.error.clone()));
            let error = match self.validator() {
                Some(validator) => {
                    let error = self.run_validator(&validator, &value);
                    self.set_error(error.clone());
                    error
                }
                None => current,
            };
            (value, error)
        });

        if error.is_error {
            tracing::debug!("Field '{}' rejected: {error}", self.inner.name);
            self.inner.rejected.send(&error.error_messages);
            Err(error.error_messages)
        } else {
            tracing::debug!("Field '{}' resolved", self.inner.name);
            self.inner.resolved.send(&value);
            Ok(value)
        }
    }

    /// Moves focus onto or off the field.
    ///
    /// The first blur after a focus latches `is_touched` and fires
    /// [`touched`](Self::touched). With a `Touch` validator, the value is
    /// validated before that transition commits.
    pub fn set_focus(&self, is_focused: bool) {
        let rising_edge = batch(|| {
            let (prev_touched, was_focused) =
                self.inner.state.with(|s| (s.is_touched, s.is_focused));
            let transition = touch_transition(prev_touched, was_focused, is_focused);

            let error = if transition.rising_edge {
                self.validator()
                    .filter(|validator| validator.strategy.touch)
                    .map(|validator| {
                        let value = self.inner.state.with(|s| s.value.clone());
                        self.run_validator(&validator, &value)
                    })
            } else {
                None
            };

            self.inner.state.update(|s| FieldState {
                is_focused,
                is_touched: transition.is_touched,
                error: error.unwrap_or_else(|| s.error.clone()),
                ..s.clone()
            });
            transition.rising_edge
        });

        if rising_edge {
            tracing::trace!("Field '{}' touched", self.inner.name);
            self.inner.touched.send(&());
        }
    }

    pub fn set_loading(&self, is_loading: bool) {
        batch(|| {
            self.inner.state.update(|s| FieldState {
                is_loading,
                ..s.clone()
            });
        });
    }

    pub fn set_is_disabled(&self, is_disabled: bool) {
        batch(|| {
            self.inner.state.update(|s| FieldState {
                is_disabled,
                ..s.clone()
            });
        });
    }

    /// Replaces the error state. Meant for fields whose errors are managed
    /// by the caller rather than by a validator.
    pub fn set_error(&self, error: ErrorState) {
        batch(|| {
            self.inner.state.update(|s| FieldState {
                error,
                ..s.clone()
            });
        });
    }

    // ── Validator plumbing ───────────────────────────────────────────

    pub(crate) fn install_validator(&self, validator: ActiveValidator<V>) -> FormResult<()> {
        let mut mode = self.inner.validation.write().expect("validation lock poisoned");
        if mode.is_validated() {
            return Err(FormError::ValidatorAlreadyAttached(format!(
                "field '{}'",
                self.inner.name
            )));
        }
        *mode = ValidationMode::Validated(Arc::new(validator));
        Ok(())
    }

    /// Re-validates after a change of the validator's external store.
    pub(crate) fn revalidate_from_external(&self) {
        let Some(validator) = self.validator() else {
            return;
        };
        let should_run = match validator.policy {
            ExternalUpdatePolicy::Never => false,
            ExternalUpdatePolicy::Always => true,
            ExternalUpdatePolicy::AfterFirstValidation => {
                self.inner.validated_once.load(Ordering::SeqCst)
            }
        };
        if should_run {
            tracing::trace!("Field '{}' revalidating on external change", self.inner.name);
            self.validate();
        }
    }

    pub(crate) fn downgrade(&self) -> WeakField<V> {
        WeakField(Arc::downgrade(&self.inner))
    }

    fn validator(&self) -> Option<Arc<ActiveValidator<V>>> {
        self.inner
            .validation
            .read()
            .expect("validation lock poisoned")
            .active()
    }

    fn run_validator(&self, validator: &ActiveValidator<V>, value: &V) -> ErrorState {
        self.inner.validated_once.store(true, Ordering::SeqCst);
        validator.run(value)
    }

    fn apply_value(&self, value: V, error: Option<ErrorState>) {
        let is_dirty = value != self.inner.initial_value;
        self.inner.state.update(|s| FieldState {
            value,
            is_dirty,
            error: error.unwrap_or_else(|| s.error.clone()),
            ..s.clone()
        });
    }
}

/// A non-owning field handle, held by subscriptions the field installs on
/// other stores.
pub(crate) struct WeakField<V: FieldValue>(Weak<FieldInner<V>>);

impl<V: FieldValue> WeakField<V> {
    pub(crate) fn upgrade(&self) -> Option<Field<V>> {
        self.0.upgrade().map(|inner| Field { inner })
    }
}

impl<V: FieldValue> FormUnit for Field<V> {
    type Output = V;
    type FillPayload = V;
    type Error = Vec<String>;

    fn validate(&self) {
        Field::validate(self);
    }

    fn reset(&self) {
        Field::reset(self);
    }

    fn fill(&self, payload: V) -> FormResult<()> {
        Field::fill(self, payload);
        Ok(())
    }

    fn refill(&self) {
        Field::refill(self);
    }

    fn submit(&self) -> Result<V, Vec<String>> {
        Field::submit(self)
    }

    fn resolved(&self) -> &Signal<V> {
        &self.inner.resolved
    }

    fn rejected(&self) -> &Signal<Vec<String>> {
        &self.inner.rejected
    }

    fn flags(&self) -> &UnitFlags {
        &self.inner.flags
    }
}
