//! The slot state machine shared by [`FieldList`](crate::field_list::FieldList)
//! and [`ControlledFieldList`](crate::controlled_field_list::ControlledFieldList).
//!
//! A field list is an ordered collection of slots. Each slot has a value, an
//! error state, interaction flags and a stable key; lists built with ids
//! also carry an optional caller-supplied id per slot. All of it is stored as
//! parallel vectors in a single [`FieldListState`], which every operation
//! replaces in one step, so the vectors always have the same length.
//!
//! Keys are handed in by the facade that owns the [`KeyCounter`]; the core
//! never generates them. Per-slot operations address slots by their current
//! positional index and log a warning (then do nothing) when it is out of
//! range.
//!
//! [`KeyCounter`]: crate::counter::KeyCounter

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, RwLock, Weak};

use serde::{Deserialize, Serialize};

use formunit_core::logging::unit_span;
use formunit_core::{
    settings_or_default, ErrorState, ExternalUpdatePolicy, FormError, FormResult,
};
use formunit_signals::{batch, Signal, Store};

use crate::touch::touch_transition;
use crate::unit::{FieldValue, FlagSnapshot, UnitFlags};
use crate::utils::{fill_array, insert_to_array, remove_by_index, update_array};
use crate::validator::{ActiveValidator, ListItem, ValidationMode};

// ── Payload types ───────────────────────────────────────────────────────

/// A value together with its optional slot id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListEntry<V> {
    pub value: V,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// The values of a whole list, as filled or resolved.
///
/// Lists built with ids resolve with [`ListValues::WithId`], all others
/// with [`ListValues::Plain`]. Both shapes are accepted by `fill`.
///
/// Deserialization tries [`ListValues::WithId`] first: an array whose every
/// element is an object with a `value` key and at most an `id` besides reads
/// as id-carrying entries, even when `V` could hold those objects itself.
/// Any other key makes the array plain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ListValues<V> {
    WithId(Vec<ListEntry<V>>),
    Plain(Vec<V>),
}

impl<V> ListValues<V> {
    pub fn len(&self) -> usize {
        match self {
            Self::WithId(entries) => entries.len(),
            Self::Plain(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_entries(self) -> Vec<ListEntry<V>> {
        match self {
            Self::WithId(entries) => entries,
            Self::Plain(values) => values
                .into_iter()
                .map(|value| ListEntry { value, id: None })
                .collect(),
        }
    }

    /// The values without their ids.
    pub fn into_values(self) -> Vec<V> {
        match self {
            Self::WithId(entries) => entries.into_iter().map(|entry| entry.value).collect(),
            Self::Plain(values) => values,
        }
    }
}

impl<V> From<Vec<V>> for ListValues<V> {
    fn from(values: Vec<V>) -> Self {
        Self::Plain(values)
    }
}

impl<V> From<Vec<ListEntry<V>>> for ListValues<V> {
    fn from(entries: Vec<ListEntry<V>>) -> Self {
        Self::WithId(entries)
    }
}

/// One invalid slot in a rejected list submit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotError {
    /// Positional index at submit time.
    pub index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub error_messages: Vec<String>,
}

/// Payload of a list's `touched` signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotTouched {
    pub index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// A slot to be created by `append`, `prepend` or `insert`.
///
/// A missing value means the list's initial value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSlot<V> {
    pub value: Option<V>,
    pub id: Option<String>,
}

impl<V> NewSlot<V> {
    /// A slot holding the list's initial value.
    pub const fn empty() -> Self {
        Self {
            value: None,
            id: None,
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

impl<V> Default for NewSlot<V> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<V> From<V> for NewSlot<V> {
    fn from(value: V) -> Self {
        Self {
            value: Some(value),
            id: None,
        }
    }
}

/// Where a new slot goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SlotPosition {
    Append,
    Prepend,
    At(isize),
}

impl SlotPosition {
    const fn raw_index(self) -> isize {
        match self {
            Self::Append => isize::MAX,
            Self::Prepend => -1,
            Self::At(index) => index,
        }
    }
}

/// A slot as stored by `fill` and replayed by `refill`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FilledSlot<V> {
    pub(crate) key: usize,
    pub(crate) value: V,
    pub(crate) id: Option<String>,
}

// ── State ───────────────────────────────────────────────────────────────

/// The complete observable state of a field list, as parallel vectors.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldListState<V> {
    pub values: Vec<V>,
    pub errors: Vec<ErrorState>,
    pub is_dirty: Vec<bool>,
    pub is_touched: Vec<bool>,
    pub is_focused: Vec<bool>,
    pub is_loading: Vec<bool>,
    pub is_disabled: Vec<bool>,
    pub keys: Vec<usize>,
    /// Present iff the list was built with ids.
    pub ids: Option<Vec<Option<String>>>,
}

struct SlotInit<V> {
    key: usize,
    value: V,
    error: ErrorState,
    is_dirty: bool,
    id: Option<String>,
}

fn replace<T: Clone + PartialEq>(list: &[T], index: usize, value: T) -> Vec<T> {
    update_array(list, index, Some(value)).into_owned()
}

impl<V: FieldValue> FieldListState<V> {
    fn empty(with_id: bool) -> Self {
        Self {
            values: Vec::new(),
            errors: Vec::new(),
            is_dirty: Vec::new(),
            is_touched: Vec::new(),
            is_focused: Vec::new(),
            is_loading: Vec::new(),
            is_disabled: Vec::new(),
            keys: Vec::new(),
            ids: with_id.then(Vec::new),
        }
    }

    fn filled(slots: &[FilledSlot<V>], errors: Vec<ErrorState>, initial_value: &V, with_id: bool) -> Self {
        let len = slots.len();
        Self {
            values: slots.iter().map(|slot| slot.value.clone()).collect(),
            errors,
            is_dirty: slots.iter().map(|slot| slot.value != *initial_value).collect(),
            is_touched: fill_array(len, false),
            is_focused: fill_array(len, false),
            is_loading: fill_array(len, false),
            is_disabled: fill_array(len, false),
            keys: slots.iter().map(|slot| slot.key).collect(),
            ids: with_id.then(|| slots.iter().map(|slot| slot.id.clone()).collect()),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The id of the slot at `index`, if the list has ids and the slot has one.
    pub fn id(&self, index: usize) -> Option<String> {
        self.ids
            .as_ref()
            .and_then(|ids| ids.get(index).cloned().flatten())
    }

    /// The aggregate flags: any slot with the flag set sets it.
    pub fn flags(&self) -> FlagSnapshot {
        FlagSnapshot {
            is_error: self.errors.iter().any(|error| error.is_error),
            is_dirty: self.is_dirty.contains(&true),
            is_touched: self.is_touched.contains(&true),
            is_loading: self.is_loading.contains(&true),
            is_focused: self.is_focused.contains(&true),
        }
    }

    fn with_inserted(&self, index: isize, slot: SlotInit<V>) -> Self {
        Self {
            values: insert_to_array(&self.values, index, slot.value),
            errors: insert_to_array(&self.errors, index, slot.error),
            is_dirty: insert_to_array(&self.is_dirty, index, slot.is_dirty),
            is_touched: insert_to_array(&self.is_touched, index, false),
            is_focused: insert_to_array(&self.is_focused, index, false),
            is_loading: insert_to_array(&self.is_loading, index, false),
            is_disabled: insert_to_array(&self.is_disabled, index, false),
            keys: insert_to_array(&self.keys, index, slot.key),
            ids: self
                .ids
                .as_ref()
                .map(|ids| insert_to_array(ids, index, slot.id)),
        }
    }

    fn without(&self, index: usize) -> Self {
        Self {
            values: remove_by_index(&self.values, index).into_owned(),
            errors: remove_by_index(&self.errors, index).into_owned(),
            is_dirty: remove_by_index(&self.is_dirty, index).into_owned(),
            is_touched: remove_by_index(&self.is_touched, index).into_owned(),
            is_focused: remove_by_index(&self.is_focused, index).into_owned(),
            is_loading: remove_by_index(&self.is_loading, index).into_owned(),
            is_disabled: remove_by_index(&self.is_disabled, index).into_owned(),
            keys: remove_by_index(&self.keys, index).into_owned(),
            ids: self
                .ids
                .as_ref()
                .map(|ids| remove_by_index(ids, index).into_owned()),
        }
    }

    fn with_slot_reset(&self, index: usize, initial_value: &V, error: ErrorState) -> Self {
        Self {
            values: replace(&self.values, index, initial_value.clone()),
            errors: replace(&self.errors, index, error),
            is_dirty: replace(&self.is_dirty, index, false),
            is_touched: replace(&self.is_touched, index, false),
            is_focused: replace(&self.is_focused, index, false),
            is_loading: replace(&self.is_loading, index, false),
            is_disabled: replace(&self.is_disabled, index, false),
            ..self.clone()
        }
    }
}

/// Construction options for field lists.
#[derive(Debug, Clone, Default)]
pub struct FieldListConfig {
    /// The error flag of newly created slots.
    pub initial_error_state: bool,
    /// Whether slots carry caller-supplied ids.
    pub with_id: bool,
    /// A name used in log output.
    pub name: Option<String>,
}

impl FieldListConfig {
    /// Defaults taken from the global settings.
    pub fn from_settings() -> Self {
        Self {
            initial_error_state: settings_or_default().initial_error_state,
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn with_id(mut self, with_id: bool) -> Self {
        self.with_id = with_id;
        self
    }

    #[must_use]
    pub const fn initial_error_state(mut self, is_error: bool) -> Self {
        self.initial_error_state = is_error;
        self
    }

    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

// ── Core ────────────────────────────────────────────────────────────────

struct SlotSnapshot<V> {
    value: V,
    key: usize,
    id: Option<String>,
    is_touched: bool,
    is_focused: bool,
}

struct ListViews<V: FieldValue> {
    values: Store<Vec<V>>,
    errors: Store<Vec<ErrorState>>,
    keys: Store<Vec<usize>>,
    ids: Option<Store<Vec<Option<String>>>>,
    is_dirty: Store<Vec<bool>>,
    is_touched: Store<Vec<bool>>,
    is_focused: Store<Vec<bool>>,
    is_loading: Store<Vec<bool>>,
    is_disabled: Store<Vec<bool>>,
}

impl<V: FieldValue> ListViews<V> {
    fn derive(state: &Store<FieldListState<V>>, with_id: bool) -> Self {
        Self {
            values: state.map(|s: &FieldListState<V>| s.values.clone()),
            errors: state.map(|s: &FieldListState<V>| s.errors.clone()),
            keys: state.map(|s: &FieldListState<V>| s.keys.clone()),
            ids: with_id
                .then(|| state.map(|s: &FieldListState<V>| s.ids.clone().unwrap_or_default())),
            is_dirty: state.map(|s: &FieldListState<V>| s.is_dirty.clone()),
            is_touched: state.map(|s: &FieldListState<V>| s.is_touched.clone()),
            is_focused: state.map(|s: &FieldListState<V>| s.is_focused.clone()),
            is_loading: state.map(|s: &FieldListState<V>| s.is_loading.clone()),
            is_disabled: state.map(|s: &FieldListState<V>| s.is_disabled.clone()),
        }
    }
}

struct CoreInner<V: FieldValue> {
    name: String,
    initial_value: V,
    initial_error_state: bool,
    with_id: bool,
    state: Store<FieldListState<V>>,
    views: ListViews<V>,
    flags: UnitFlags,
    last_filled: RwLock<Option<Vec<FilledSlot<V>>>>,
    validation: RwLock<ValidationMode<ListItem<V>>>,
    validated_keys: RwLock<HashSet<usize>>,
    resolved: Signal<ListValues<V>>,
    rejected: Signal<Vec<SlotError>>,
    touched: Signal<SlotTouched>,
}

/// The state and per-slot operations of a field list.
///
/// Obtained by dereferencing a [`FieldList`](crate::field_list::FieldList)
/// or a [`ControlledFieldList`](crate::controlled_field_list::ControlledFieldList).
pub struct FieldListCore<V: FieldValue> {
    inner: Arc<CoreInner<V>>,
}

impl<V: FieldValue> Clone for FieldListCore<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V: FieldValue + fmt::Debug> fmt::Debug for FieldListCore<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldListCore")
            .field("name", &self.inner.name)
            .field("with_id", &self.inner.with_id)
            .field("state", &self.inner.state.get())
            .finish_non_exhaustive()
    }
}

impl<V: FieldValue> FieldListCore<V> {
    pub(crate) fn new(initial_value: V, config: FieldListConfig) -> Self {
        let state = Store::new(FieldListState::empty(config.with_id));
        let views = ListViews::derive(&state, config.with_id);
        let flags = UnitFlags::from_snapshot(state.map(FieldListState::flags));

        Self {
            inner: Arc::new(CoreInner {
                name: config.name.unwrap_or_else(|| "field list".to_string()),
                initial_value,
                initial_error_state: config.initial_error_state,
                with_id: config.with_id,
                state,
                views,
                flags,
                last_filled: RwLock::new(None),
                validation: RwLock::new(ValidationMode::Unvalidated),
                validated_keys: RwLock::new(HashSet::new()),
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

    /// The value of new and reset slots, and the reference for `is_dirty`.
    pub fn initial_value(&self) -> &V {
        &self.inner.initial_value
    }

    pub fn initial_error_state(&self) -> bool {
        self.inner.initial_error_state
    }

    pub fn with_id(&self) -> bool {
        self.inner.with_id
    }

    pub fn has_validator(&self) -> bool {
        self.inner
            .validation
            .read()
            .expect("validation lock poisoned")
            .is_validated()
    }

    pub fn len(&self) -> usize {
        self.inner.state.with(FieldListState::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn state(&self) -> &Store<FieldListState<V>> {
        &self.inner.state
    }

    pub fn values(&self) -> &Store<Vec<V>> {
        &self.inner.views.values
    }

    pub fn errors(&self) -> &Store<Vec<ErrorState>> {
        &self.inner.views.errors
    }

    pub fn keys(&self) -> &Store<Vec<usize>> {
        &self.inner.views.keys
    }

    /// Slot ids. `None` for lists built without ids.
    pub fn ids(&self) -> Option<&Store<Vec<Option<String>>>> {
        self.inner.views.ids.as_ref()
    }

    pub fn is_dirty_list(&self) -> &Store<Vec<bool>> {
        &self.inner.views.is_dirty
    }

    pub fn is_touched_list(&self) -> &Store<Vec<bool>> {
        &self.inner.views.is_touched
    }

    pub fn is_focused_list(&self) -> &Store<Vec<bool>> {
        &self.inner.views.is_focused
    }

    pub fn is_loading_list(&self) -> &Store<Vec<bool>> {
        &self.inner.views.is_loading
    }

    pub fn is_disabled_list(&self) -> &Store<Vec<bool>> {
        &self.inner.views.is_disabled
    }

    /// Fired once per slot each time its touch latch flips on.
    pub fn touched(&self) -> &Signal<SlotTouched> {
        &self.inner.touched
    }

    pub fn resolved(&self) -> &Signal<ListValues<V>> {
        &self.inner.resolved
    }

    pub fn rejected(&self) -> &Signal<Vec<SlotError>> {
        &self.inner.rejected
    }

    /// Aggregate flags over all slots.
    pub fn flags(&self) -> &UnitFlags {
        &self.inner.flags
    }

    pub fn is_error(&self) -> &Store<bool> {
        self.inner.flags.is_error()
    }

    pub fn is_dirty(&self) -> &Store<bool> {
        self.inner.flags.is_dirty()
    }

    pub fn is_touched(&self) -> &Store<bool> {
        self.inner.flags.is_touched()
    }

    pub fn is_loading(&self) -> &Store<bool> {
        self.inner.flags.is_loading()
    }

    pub fn is_focused(&self) -> &Store<bool> {
        self.inner.flags.is_focused()
    }

    pub fn is_ready(&self) -> &Store<bool> {
        self.inner.flags.is_ready()
    }

    // ── Per-slot operations ──────────────────────────────────────────

    /// Replaces the value of slot `index` and recomputes its `is_dirty`.
    pub fn set_value(&self, index: usize, value: V) {
        batch(|| {
            let Some(slot) = self.slot(index, "set_value") else {
                return;
            };
            let error = self.validator().and_then(|validator| {
                validator.strategy.validates_change(slot.is_touched).then(|| {
                    let item = ListItem {
                        value: value.clone(),
                        index: Some(index),
                        id: slot.id.clone(),
                    };
                    self.run_validator(&validator, slot.key, &item)
                })
            });

            let is_dirty = value != self.inner.initial_value;
            self.inner.state.update(|s| {
                if index >= s.len() {
                    return s.clone();
                }
                FieldListState {
                    values: replace(&s.values, index, value),
                    is_dirty: replace(&s.is_dirty, index, is_dirty),
                    errors: match error {
                        Some(error) => replace(&s.errors, index, error),
                        None => s.errors.clone(),
                    },
                    ..s.clone()
                }
            });
        });
    }

    /// Moves focus onto or off slot `index`, latching its touch flag on the
    /// first blur after a focus.
    pub fn set_focus(&self, index: usize, is_focused: bool) {
        let touched = batch(|| {
            let slot = self.slot(index, "set_focus")?;
            let transition = touch_transition(slot.is_touched, slot.is_focused, is_focused);

            let error = if transition.rising_edge {
                self.validator()
                    .filter(|validator| validator.strategy.touch)
                    .map(|validator| {
                        let item = ListItem {
                            value: slot.value.clone(),
                            index: Some(index),
                            id: slot.id.clone(),
                        };
                        self.run_validator(&validator, slot.key, &item)
                    })
            } else {
                None
            };

            self.inner.state.update(|s| {
                if index >= s.len() {
                    return s.clone();
                }
                FieldListState {
                    is_focused: replace(&s.is_focused, index, is_focused),
                    is_touched: replace(&s.is_touched, index, transition.is_touched),
                    errors: match error {
                        Some(error) => replace(&s.errors, index, error),
                        None => s.errors.clone(),
                    },
                    ..s.clone()
                }
            });

            transition
                .rising_edge
                .then(|| SlotTouched { index, id: slot.id })
        });

        if let Some(event) = touched {
            tracing::trace!("Field list '{}' slot {index} touched", self.inner.name);
            self.inner.touched.send(&event);
        }
    }

    pub fn set_loading(&self, index: usize, is_loading: bool) {
        batch(|| {
            if self.slot(index, "set_loading").is_none() {
                return;
            }
            self.inner.state.update(|s| FieldListState {
                is_loading: replace(&s.is_loading, index, is_loading),
                ..s.clone()
            });
        });
    }

    pub fn set_is_disabled(&self, index: usize, is_disabled: bool) {
        batch(|| {
            if self.slot(index, "set_is_disabled").is_none() {
                return;
            }
            self.inner.state.update(|s| FieldListState {
                is_disabled: replace(&s.is_disabled, index, is_disabled),
                ..s.clone()
            });
        });
    }

    /// Replaces the error state of slot `index`.
    pub fn set_error(&self, index: usize, error: ErrorState) {
        batch(|| {
            if self.slot(index, "set_error").is_none() {
                return;
            }
            self.inner.state.update(|s| FieldListState {
                errors: replace(&s.errors, index, error),
                ..s.clone()
            });
        });
    }

    /// Restores slot `index` to the initial value with all flags cleared.
    ///
    /// The slot keeps its key and id. With an `Init` validator the initial
    /// value is validated, otherwise the error returns to the initial state.
    pub fn reset_field(&self, index: usize) {
        batch(|| {
            let Some(slot) = self.slot(index, "reset_field") else {
                return;
            };
            let error = match self.validator() {
                Some(validator) if validator.strategy.init => {
                    let item = ListItem {
                        value: self.inner.initial_value.clone(),
                        index: Some(index),
                        id: slot.id,
                    };
                    self.run_validator(&validator, slot.key, &item)
                }
                _ => ErrorState::initial(self.inner.initial_error_state),
            };
            self.inner.state.update(|s| {
                if index >= s.len() {
                    return s.clone();
                }
                s.with_slot_reset(index, &self.inner.initial_value, error)
            });
            self.inner
                .validated_keys
                .write()
                .expect("validated keys lock poisoned")
                .remove(&slot.key);
        });
    }

    /// Validates slot `index`. Inert without a validator.
    pub fn validate_field(&self, index: usize) {
        let Some(validator) = self.validator() else {
            return;
        };
        batch(|| {
            let Some(slot) = self.slot(index, "validate_field") else {
                return;
            };
            let item = ListItem {
                value: slot.value,
                index: Some(index),
                id: slot.id,
            };
            let error = self.run_validator(&validator, slot.key, &item);
            self.inner.state.update(|s| FieldListState {
                errors: replace(&s.errors, index, error),
                ..s.clone()
            });
        });
    }

    // ── Whole-list operations ────────────────────────────────────────

    /// Validates every slot. Inert without a validator.
    pub fn validate(&self) {
        if let Some(validator) = self.validator() {
            batch(|| self.validate_where(&validator, |_| true));
        }
    }

    /// Submits the whole list.
    ///
    /// With a validator every slot is validated first. Without one, the
    /// current error states decide and are left untouched.
    ///
    /// # Errors
    ///
    /// Returns one [`SlotError`] per invalid slot, in positional order.
    pub fn submit(&self) -> Result<ListValues<V>, Vec<SlotError>> {
        let _span = unit_span("field_list", &self.inner.name).entered();
        let outcome = batch(|| {
            let snapshot = self.inner.state.get();
            let errors = match self.validator() {
                Some(validator) => {
                    let errors = self.run_all(&validator, &snapshot, |_| true);
                    self.commit_errors(&snapshot.keys, errors.clone());
                    errors
                }
                None => snapshot.errors.clone(),
            };

            let failed: Vec<SlotError> = errors
                .iter()
                .enumerate()
                .filter(|(_, error)| error.is_error)
                .map(|(index, error)| SlotError {
                    index,
                    id: snapshot.id(index),
                    error_messages: error.error_messages.clone(),
                })
                .collect();

            if failed.is_empty() {
                Ok(self.output_of(snapshot))
            } else {
                Err(failed)
            }
        });

        match &outcome {
            Ok(values) => {
                tracing::debug!(
                    "Field list '{}' resolved with {} slot(s)",
                    self.inner.name,
                    values.len()
                );
                self.inner.resolved.send(values);
            }
            Err(errors) => {
                tracing::debug!(
                    "Field list '{}' rejected: {} invalid slot(s)",
                    self.inner.name,
                    errors.len()
                );
                self.inner.rejected.send(errors);
            }
        }
        outcome
    }

    // ── Lifecycle operations, driven by the facades ──────────────────

    /// Creates a slot with the given key.
    pub(crate) fn insert_slot(
        &self,
        position: SlotPosition,
        key: usize,
        value: Option<V>,
        id: Option<String>,
    ) {
        batch(|| {
            let value = value.unwrap_or_else(|| self.inner.initial_value.clone());
            let id = if self.inner.with_id { id } else { None };

            let error = match self.validator() {
                Some(validator) if validator.strategy.init => {
                    let item = ListItem {
                        value: value.clone(),
                        index: None,
                        id: id.clone(),
                    };
                    self.run_validator(&validator, key, &item)
                }
                _ => ErrorState::initial(self.inner.initial_error_state),
            };

            let slot = SlotInit {
                key,
                is_dirty: value != self.inner.initial_value,
                value,
                error,
                id,
            };
            self.inner
                .state
                .update(|s| s.with_inserted(position.raw_index(), slot));
        });
    }

    /// Removes slot `index`. Keys of the remaining slots are unchanged.
    pub(crate) fn remove_slot(&self, index: usize) {
        batch(|| {
            if self.slot(index, "remove").is_none() {
                return;
            }
            self.inner.state.update(|s| s.without(index));
        });
    }

    /// Replaces every slot and remembers the slots for `refill`.
    pub(crate) fn fill_slots(&self, slots: Vec<FilledSlot<V>>) {
        let count = slots.len();
        batch(|| {
            let slots: Vec<FilledSlot<V>> = slots
                .into_iter()
                .map(|slot| FilledSlot {
                    id: if self.inner.with_id { slot.id } else { None },
                    ..slot
                })
                .collect();

            let errors = match self.validator() {
                Some(validator) if validator.strategy.init => slots
                    .iter()
                    .map(|slot| {
                        let item = ListItem {
                            value: slot.value.clone(),
                            index: None,
                            id: slot.id.clone(),
                        };
                        self.run_validator(&validator, slot.key, &item)
                    })
                    .collect(),
                _ => fill_array(
                    slots.len(),
                    ErrorState::initial(self.inner.initial_error_state),
                ),
            };

            self.inner.state.set(FieldListState::filled(
                &slots,
                errors,
                &self.inner.initial_value,
                self.inner.with_id,
            ));
            *self.inner.last_filled.write().expect("fill lock poisoned") = Some(slots);
        });
        tracing::debug!("Field list '{}' filled with {count} slot(s)", self.inner.name);
    }

    /// Replays the last fill, keys included. Returns `false` when there is
    /// nothing to replay.
    pub(crate) fn refill_slots(&self) -> bool {
        let last = self
            .inner
            .last_filled
            .read()
            .expect("fill lock poisoned")
            .clone();
        match last {
            Some(slots) => {
                self.fill_slots(slots);
                true
            }
            None => {
                tracing::trace!("Field list '{}' has nothing to refill", self.inner.name);
                false
            }
        }
    }

    /// Drops every slot and forgets the last fill.
    pub(crate) fn reset_all(&self) {
        batch(|| {
            *self.inner.last_filled.write().expect("fill lock poisoned") = None;
            self.inner
                .validated_keys
                .write()
                .expect("validated keys lock poisoned")
                .clear();
            self.inner
                .state
                .set(FieldListState::empty(self.inner.with_id));
        });
        tracing::debug!("Field list '{}' reset", self.inner.name);
    }

    // ── Validator plumbing ───────────────────────────────────────────

    pub(crate) fn install_validator(&self, validator: ActiveValidator<ListItem<V>>) -> FormResult<()> {
        let mut mode = self.inner.validation.write().expect("validation lock poisoned");
        if mode.is_validated() {
            return Err(FormError::ValidatorAlreadyAttached(format!(
                "field list '{}'",
                self.inner.name
            )));
        }
        *mode = ValidationMode::Validated(Arc::new(validator));
        Ok(())
    }

    /// Re-validates after a change of the validator's external store.
    ///
    /// Under `AfterFirstValidation` only slots that have been validated
    /// since they were created (or last reset) are re-run.
    pub(crate) fn revalidate_from_external(&self) {
        let Some(validator) = self.validator() else {
            return;
        };
        match validator.policy {
            ExternalUpdatePolicy::Never => {}
            ExternalUpdatePolicy::Always => self.validate(),
            ExternalUpdatePolicy::AfterFirstValidation => {
                let validated = self
                    .inner
                    .validated_keys
                    .read()
                    .expect("validated keys lock poisoned")
                    .clone();
                if !validated.is_empty() {
                    batch(|| self.validate_where(&validator, |key| validated.contains(&key)));
                }
            }
        }
    }

    pub(crate) fn downgrade(&self) -> WeakFieldListCore<V> {
        WeakFieldListCore(Arc::downgrade(&self.inner))
    }

    fn validator(&self) -> Option<Arc<ActiveValidator<ListItem<V>>>> {
        self.inner
            .validation
            .read()
            .expect("validation lock poisoned")
            .active()
    }

    fn run_validator(
        &self,
        validator: &ActiveValidator<ListItem<V>>,
        key: usize,
        item: &ListItem<V>,
    ) -> ErrorState {
        self.inner
            .validated_keys
            .write()
            .expect("validated keys lock poisoned")
            .insert(key);
        validator.run(item)
    }

    fn run_all(
        &self,
        validator: &ActiveValidator<ListItem<V>>,
        snapshot: &FieldListState<V>,
        include: impl Fn(usize) -> bool,
    ) -> Vec<ErrorState> {
        snapshot
            .errors
            .iter()
            .enumerate()
            .map(|(index, current)| {
                let key = snapshot.keys[index];
                if include(key) {
                    let item = ListItem {
                        value: snapshot.values[index].clone(),
                        index: Some(index),
                        id: snapshot.id(index),
                    };
                    self.run_validator(validator, key, &item)
                } else {
                    current.clone()
                }
            })
            .collect()
    }

    fn validate_where(&self, validator: &ActiveValidator<ListItem<V>>, include: impl Fn(usize) -> bool) {
        let snapshot = self.inner.state.get();
        let errors = self.run_all(validator, &snapshot, include);
        self.commit_errors(&snapshot.keys, errors);
    }

    /// Stores `errors` unless the slots changed while they were computed.
    fn commit_errors(&self, keys: &[usize], errors: Vec<ErrorState>) {
        self.inner.state.update(|s| {
            if s.keys != keys {
                tracing::warn!(
                    "Field list '{}' changed during validation; results dropped",
                    self.inner.name
                );
                return s.clone();
            }
            FieldListState {
                errors,
                ..s.clone()
            }
        });
    }

    fn slot(&self, index: usize, operation: &str) -> Option<SlotSnapshot<V>> {
        let slot = self.inner.state.with(|s| {
            (index < s.len()).then(|| SlotSnapshot {
                value: s.values[index].clone(),
                key: s.keys[index],
                id: s.id(index),
                is_touched: s.is_touched[index],
                is_focused: s.is_focused[index],
            })
        });
        if slot.is_none() {
            tracing::warn!(
                "Field list '{}': {operation} ignored, index {index} out of range",
                self.inner.name
            );
        }
        slot
    }

    fn output_of(&self, snapshot: FieldListState<V>) -> ListValues<V> {
        match snapshot.ids {
            Some(ids) if self.inner.with_id => ListValues::WithId(
                snapshot
                    .values
                    .into_iter()
                    .zip(ids)
                    .map(|(value, id)| ListEntry { value, id })
                    .collect(),
            ),
            _ => ListValues::Plain(snapshot.values),
        }
    }
}

/// A non-owning handle, held by subscriptions on external stores.
pub(crate) struct WeakFieldListCore<V: FieldValue>(Weak<CoreInner<V>>);

impl<V: FieldValue> WeakFieldListCore<V> {
    pub(crate) fn upgrade(&self) -> Option<FieldListCore<V>> {
        self.0.upgrade().map(|inner| FieldListCore { inner })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn list_of(values: &[&str]) -> FieldListCore<String> {
        let core = FieldListCore::new(String::new(), FieldListConfig::default());
        for (key, value) in values.iter().enumerate() {
            core.insert_slot(SlotPosition::Append, key, Some((*value).to_string()), None);
        }
        core
    }

    fn assert_in_sync<V: FieldValue>(state: &FieldListState<V>) {
        let len = state.values.len();
        assert_eq!(state.errors.len(), len);
        assert_eq!(state.is_dirty.len(), len);
        assert_eq!(state.is_touched.len(), len);
        assert_eq!(state.is_focused.len(), len);
        assert_eq!(state.is_loading.len(), len);
        assert_eq!(state.is_disabled.len(), len);
        assert_eq!(state.keys.len(), len);
        if let Some(ids) = &state.ids {
            assert_eq!(ids.len(), len);
        }
    }

    #[test]
    fn test_insert_positions() {
        let core = list_of(&["a", "b", "c"]);
        core.insert_slot(SlotPosition::Prepend, 3, Some("p".into()), None);
        core.insert_slot(SlotPosition::At(2), 4, Some("m".into()), None);
        core.insert_slot(SlotPosition::At(-5), 5, Some("n".into()), None);
        core.insert_slot(SlotPosition::At(1000), 6, Some("z".into()), None);

        assert_eq!(core.values().get(), vec!["n", "p", "a", "m", "b", "c", "z"]);
        assert_eq!(core.keys().get(), vec![5, 3, 0, 4, 1, 2, 6]);
        assert_in_sync(&core.state().get());
    }

    #[test]
    fn test_new_slot_defaults_to_initial_value() {
        let core = FieldListCore::new(
            "init".to_string(),
            FieldListConfig::default().initial_error_state(true),
        );
        core.insert_slot(SlotPosition::Append, 0, None, None);
        let state = core.state().get();
        assert_eq!(state.values, vec!["init"]);
        assert_eq!(state.is_dirty, vec![false]);
        assert_eq!(state.errors, vec![ErrorState::invalid()]);
        assert!(core.is_error().get());
    }

    #[test]
    fn test_remove_keeps_other_keys() {
        let core = list_of(&["a", "b", "c"]);
        core.remove_slot(1);
        assert_eq!(core.values().get(), vec!["a", "c"]);
        assert_eq!(core.keys().get(), vec![0, 2]);
        assert_in_sync(&core.state().get());
    }

    #[test]
    fn test_out_of_range_is_noop() {
        let core = list_of(&["a"]);
        let before = core.state().get();
        core.remove_slot(3);
        core.set_value(1, "x".into());
        core.set_focus(5, true);
        core.set_loading(1, true);
        core.set_is_disabled(1, true);
        core.set_error(1, ErrorState::invalid());
        core.reset_field(9);
        assert_eq!(core.state().get(), before);
    }

    #[test]
    fn test_set_value_tracks_dirty_per_slot() {
        let core = list_of(&["", ""]);
        core.set_value(1, "x".into());
        assert_eq!(core.is_dirty_list().get(), vec![false, true]);
        assert!(core.is_dirty().get());
        core.set_value(1, String::new());
        assert!(!core.is_dirty().get());
    }

    #[test]
    fn test_touch_latch_per_slot() {
        let core = list_of(&["a", "b"]);
        let events = Arc::new(Mutex::new(Vec::new()));
        let log = events.clone();
        core.touched().connect(
            "log",
            Arc::new(move |event: &SlotTouched| log.lock().unwrap().push(event.clone())),
        );

        core.set_focus(1, true);
        assert_eq!(core.is_focused_list().get(), vec![false, true]);
        core.set_focus(1, false);
        core.set_focus(1, true);
        core.set_focus(1, false);

        assert_eq!(core.is_touched_list().get(), vec![false, true]);
        assert_eq!(
            *events.lock().unwrap(),
            vec![SlotTouched { index: 1, id: None }]
        );
    }

    #[test]
    fn test_touched_carries_id() {
        let core = FieldListCore::new(0, FieldListConfig::default().with_id(true));
        core.insert_slot(SlotPosition::Append, 0, Some(1), Some("row-1".into()));
        let seen = Arc::new(Mutex::new(None));
        let slot = seen.clone();
        core.touched().connect(
            "log",
            Arc::new(move |event: &SlotTouched| *slot.lock().unwrap() = Some(event.clone())),
        );
        core.set_focus(0, true);
        core.set_focus(0, false);
        assert_eq!(
            seen.lock().unwrap().clone(),
            Some(SlotTouched {
                index: 0,
                id: Some("row-1".into())
            })
        );
    }

    #[test]
    fn test_ids_ignored_without_with_id() {
        let core = FieldListCore::new(0, FieldListConfig::default());
        core.insert_slot(SlotPosition::Append, 0, Some(1), Some("x".into()));
        assert!(core.ids().is_none());
        assert!(core.state().get().ids.is_none());
    }

    #[test]
    fn test_reset_field_keeps_key_and_id() {
        let core = FieldListCore::new(0, FieldListConfig::default().with_id(true));
        core.insert_slot(SlotPosition::Append, 7, Some(3), Some("a".into()));
        core.set_focus(0, true);
        core.set_loading(0, true);
        core.set_error(0, ErrorState::with_messages(["bad"]));

        core.reset_field(0);

        let state = core.state().get();
        assert_eq!(state.values, vec![0]);
        assert_eq!(state.keys, vec![7]);
        assert_eq!(state.ids, Some(vec![Some("a".to_string())]));
        assert_eq!(state.errors, vec![ErrorState::valid()]);
        assert_eq!(state.is_focused, vec![false]);
        assert_eq!(state.is_loading, vec![false]);
    }

    #[test]
    fn test_fill_replaces_and_refill_replays() {
        let core = list_of(&["old"]);
        core.fill_slots(vec![
            FilledSlot { key: 10, value: "a".to_string(), id: None },
            FilledSlot { key: 11, value: "b".to_string(), id: None },
        ]);
        assert_eq!(core.values().get(), vec!["a", "b"]);
        assert_eq!(core.keys().get(), vec![10, 11]);

        core.set_value(0, "changed".into());
        core.remove_slot(1);
        assert!(core.refill_slots());
        assert_eq!(core.values().get(), vec!["a", "b"]);
        assert_eq!(core.keys().get(), vec![10, 11]);
    }

    #[test]
    fn test_refill_after_reset_is_noop() {
        let core = list_of(&[]);
        core.fill_slots(vec![FilledSlot { key: 0, value: "a".to_string(), id: None }]);
        core.reset_all();
        assert!(!core.refill_slots());
        assert!(core.is_empty());
    }

    #[test]
    fn test_submit_without_validator_passes_through() {
        let core = list_of(&["a", "b", "c"]);
        assert_eq!(
            core.submit(),
            Ok(ListValues::Plain(vec!["a".into(), "b".into(), "c".into()]))
        );

        core.set_error(2, ErrorState::with_messages(["bad"]));
        let before = core.state().get();
        assert_eq!(
            core.submit(),
            Err(vec![SlotError {
                index: 2,
                id: None,
                error_messages: vec!["bad".into()],
            }])
        );
        assert_eq!(core.state().get(), before);
    }

    #[test]
    fn test_submit_with_id_resolves_entries() {
        let core = FieldListCore::new(0, FieldListConfig::default().with_id(true));
        core.insert_slot(SlotPosition::Append, 0, Some(1), Some("a".into()));
        core.insert_slot(SlotPosition::Append, 1, Some(2), None);
        assert_eq!(
            core.submit(),
            Ok(ListValues::WithId(vec![
                ListEntry { value: 1, id: Some("a".into()) },
                ListEntry { value: 2, id: None },
            ]))
        );
    }

    #[test]
    fn test_one_notification_per_insert() {
        let core = list_of(&[""]);
        let calls = Arc::new(AtomicUsize::new(0));
        let count = calls.clone();
        core.flags().snapshot().subscribe(Arc::new(move |_: &FlagSnapshot| {
            count.fetch_add(1, Ordering::SeqCst);
        }));
        let values_calls = Arc::new(AtomicUsize::new(0));
        let values_count = values_calls.clone();
        core.values().subscribe(Arc::new(move |_: &Vec<String>| {
            values_count.fetch_add(1, Ordering::SeqCst);
        }));

        core.insert_slot(SlotPosition::Append, 1, Some("dirty".into()), None);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(values_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_flags_any_slot() {
        let core = list_of(&["a", "b"]);
        core.set_loading(0, true);
        assert!(core.is_loading().get());
        assert!(!core.is_ready().get());
        core.set_loading(0, false);
        core.set_error(1, ErrorState::invalid());
        assert!(core.is_error().get());
        assert!(!core.is_ready().get());
        core.remove_slot(1);
        assert!(core.is_ready().get());
    }

    #[test]
    fn test_list_values_prefer_entries_for_value_objects() {
        let entries: ListValues<serde_json::Value> =
            serde_json::from_str(r#"[{"value": 1}, {"value": 2, "id": "b"}]"#).unwrap();
        assert_eq!(
            entries.into_values(),
            vec![serde_json::json!(1), serde_json::json!(2)]
        );

        let plain: ListValues<serde_json::Value> =
            serde_json::from_str(r#"[{"value": 1, "label": "one"}]"#).unwrap();
        assert_eq!(
            plain,
            ListValues::Plain(vec![serde_json::json!({"value": 1, "label": "one"})])
        );
    }

    #[test]
    fn test_list_values_serde_shapes() {
        let plain: ListValues<i32> = serde_json::from_str("[1, 2]").unwrap();
        assert_eq!(plain, ListValues::Plain(vec![1, 2]));

        let with_id: ListValues<i32> =
            serde_json::from_str(r#"[{"value": 1, "id": "a"}, {"value": 2}]"#).unwrap();
        assert_eq!(
            with_id.into_entries(),
            vec![
                ListEntry { value: 1, id: Some("a".into()) },
                ListEntry { value: 2, id: None },
            ]
        );

        let error = SlotError {
            index: 1,
            id: None,
            error_messages: vec!["x".into()],
        };
        assert_eq!(
            serde_json::to_value(&error).unwrap(),
            serde_json::json!({"index": 1, "errorMessages": ["x"]})
        );
    }
}
