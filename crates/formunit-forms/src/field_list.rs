//! Self-managed field lists.
//!
//! A [`FieldList`] owns its own [`KeyCounter`] and exposes the full slot
//! lifecycle: `append`, `prepend`, `insert`, `remove`, `fill`, `refill` and
//! `reset`. Per-slot operations and state come from the shared
//! [`FieldListCore`] through `Deref`.
//!
//! # Examples
//!
//! ```
//! use formunit_forms::field_list::{FieldList, NewSlot};
//!
//! let tags = FieldList::new(String::new());
//! tags.append("rust".to_string());
//! tags.prepend(NewSlot::empty());
//! tags.insert(1, "forms".to_string());
//!
//! assert_eq!(tags.values().get(), vec!["", "forms", "rust"]);
//! assert_eq!(tags.keys().get(), vec![1, 2, 0]);
//!
//! tags.remove(0);
//! assert_eq!(tags.keys().get(), vec![2, 0]);
//! ```

use std::fmt;
use std::ops::Deref;

use formunit_core::FormResult;
use formunit_signals::Signal;

use crate::counter::KeyCounter;
use crate::field_list_core::{FieldListConfig, FieldListCore, FilledSlot, SlotPosition};
use crate::unit::{FieldValue, FormUnit, UnitFlags};

pub use crate::field_list_core::{ListEntry, ListValues, NewSlot, SlotError, SlotTouched};

/// A field list that allocates its own slot keys.
pub struct FieldList<V: FieldValue> {
    core: FieldListCore<V>,
    counter: KeyCounter,
}

impl<V: FieldValue> Clone for FieldList<V> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
            counter: self.counter.clone(),
        }
    }
}

impl<V: FieldValue + fmt::Debug> fmt::Debug for FieldList<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldList")
            .field("core", &self.core)
            .field("next_key", &self.counter.current())
            .finish()
    }
}

impl<V: FieldValue> Deref for FieldList<V> {
    type Target = FieldListCore<V>;

    fn deref(&self) -> &Self::Target {
        &self.core
    }
}

impl<V: FieldValue> FieldList<V> {
    /// Creates an empty list without ids whose slots start valid.
    pub fn new(initial_value: V) -> Self {
        Self::with_config(initial_value, FieldListConfig::default())
    }

    pub fn from_settings(initial_value: V) -> Self {
        Self::with_config(initial_value, FieldListConfig::from_settings())
    }

    pub fn with_config(initial_value: V, config: FieldListConfig) -> Self {
        Self {
            core: FieldListCore::new(initial_value, config),
            counter: KeyCounter::new(),
        }
    }

    /// The key the next created slot will get.
    pub fn next_key(&self) -> usize {
        self.counter.current()
    }

    pub fn append(&self, slot: impl Into<NewSlot<V>>) {
        let slot = slot.into();
        self.core
            .insert_slot(SlotPosition::Append, self.counter.next(), slot.value, slot.id);
    }

    pub fn prepend(&self, slot: impl Into<NewSlot<V>>) {
        let slot = slot.into();
        self.core
            .insert_slot(SlotPosition::Prepend, self.counter.next(), slot.value, slot.id);
    }

    /// Inserts a slot at `index`. Negative indices prepend and indices past
    /// the end append.
    pub fn insert(&self, index: isize, slot: impl Into<NewSlot<V>>) {
        let slot = slot.into();
        self.core
            .insert_slot(SlotPosition::At(index), self.counter.next(), slot.value, slot.id);
    }

    /// Removes the slot at `index`. Out-of-range indices are ignored.
    pub fn remove(&self, index: usize) {
        self.core.remove_slot(index);
    }

    /// Replaces every slot, allocating one fresh key per entry.
    pub fn fill(&self, values: impl Into<ListValues<V>>) {
        let entries = values.into().into_entries();
        let keys = self.counter.reserve(entries.len());
        let slots = keys
            .zip(entries)
            .map(|(key, entry)| FilledSlot {
                key,
                value: entry.value,
                id: entry.id,
            })
            .collect();
        self.core.fill_slots(slots);
    }

    /// Replays the last fill with its original keys.
    pub fn refill(&self) {
        self.core.refill_slots();
    }

    /// Drops every slot and restarts key allocation from zero.
    pub fn reset(&self) {
        self.core.reset_all();
        self.counter.reset();
    }
}

impl<V: FieldValue> FormUnit for FieldList<V> {
    type Output = ListValues<V>;
    type FillPayload = ListValues<V>;
    type Error = Vec<SlotError>;

    fn validate(&self) {
        self.core.validate();
    }

    fn reset(&self) {
        Self::reset(self);
    }

    fn fill(&self, payload: ListValues<V>) -> FormResult<()> {
        Self::fill(self, payload);
        Ok(())
    }

    fn refill(&self) {
        Self::refill(self);
    }

    fn submit(&self) -> Result<ListValues<V>, Vec<SlotError>> {
        self.core.submit()
    }

    fn resolved(&self) -> &Signal<ListValues<V>> {
        self.core.resolved()
    }

    fn rejected(&self) -> &Signal<Vec<SlotError>> {
        self.core.rejected()
    }

    fn flags(&self) -> &UnitFlags {
        self.core.flags()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use formunit_core::ErrorState;

    fn assert_in_sync<V: FieldValue>(list: &FieldList<V>) {
        let state = list.state().get();
        let len = state.len();
        for other in [
            state.errors.len(),
            state.is_dirty.len(),
            state.is_touched.len(),
            state.is_focused.len(),
            state.is_loading.len(),
            state.is_disabled.len(),
            state.keys.len(),
        ] {
            assert_eq!(other, len);
        }
    }

    #[test]
    fn test_keys_are_never_reused() {
        let list = FieldList::new(0);
        list.append(1);
        list.append(2);
        list.remove(0);
        list.append(3);
        list.prepend(4);
        assert_eq!(list.keys().get(), vec![3, 1, 2]);
        assert_eq!(list.values().get(), vec![4, 2, 3]);
        assert_in_sync(&list);
    }

    #[test]
    fn test_insert_clamps_like_append_and_prepend() {
        let clamped = FieldList::new(String::new());
        clamped.fill(vec!["a".to_string(), "b".to_string(), "c".to_string()]);
        clamped.insert(-5, "x".to_string());
        clamped.insert(1000, "y".to_string());

        let explicit = FieldList::new(String::new());
        explicit.fill(vec!["a".to_string(), "b".to_string(), "c".to_string()]);
        explicit.prepend("x".to_string());
        explicit.append("y".to_string());

        assert_eq!(clamped.state().get(), explicit.state().get());
    }

    #[test]
    fn test_fill_advances_counter_by_entry_count() {
        let list = FieldList::new(0);
        list.append(1);
        list.fill(vec![5, 6, 7]);
        assert_eq!(list.keys().get(), vec![1, 2, 3]);
        assert_eq!(list.next_key(), 4);
    }

    #[test]
    fn test_refill_keeps_keys_and_counter() {
        let list = FieldList::new(0);
        list.fill(vec![1, 2]);
        list.set_value(0, 9);
        list.append(3);
        list.refill();
        assert_eq!(list.values().get(), vec![1, 2]);
        assert_eq!(list.keys().get(), vec![0, 1]);
        assert_eq!(list.next_key(), 3);
    }

    #[test]
    fn test_reset_restarts_keys() {
        let list = FieldList::new(0);
        list.fill(vec![1, 2, 3]);
        list.reset();
        assert!(list.is_empty());
        assert_eq!(list.next_key(), 0);
        list.append(4);
        assert_eq!(list.keys().get(), vec![0]);
        list.refill();
        assert_eq!(list.values().get(), vec![4]);
    }

    #[test]
    fn test_fill_with_ids() {
        let list = FieldList::with_config(0, FieldListConfig::default().with_id(true));
        list.fill(vec![
            ListEntry { value: 1, id: Some("a".into()) },
            ListEntry { value: 2, id: None },
        ]);
        assert_eq!(
            list.ids().map(|ids| ids.get()),
            Some(vec![Some("a".to_string()), None])
        );
        assert_eq!(
            FormUnit::submit(&list),
            Ok(ListValues::WithId(vec![
                ListEntry { value: 1, id: Some("a".into()) },
                ListEntry { value: 2, id: None },
            ]))
        );
    }

    #[test]
    fn test_fill_resets_flags_to_initial_state() {
        let list = FieldList::with_config(0, FieldListConfig::default().initial_error_state(true));
        list.append(1);
        list.set_focus(0, true);
        list.fill(vec![0, 1]);
        let state = list.state().get();
        assert_eq!(state.errors, vec![ErrorState::invalid(); 2]);
        assert_eq!(state.is_dirty, vec![false, true]);
        assert_eq!(state.is_focused, vec![false, false]);
    }

    #[test]
    fn test_form_unit_fill_accepts_plain_values() {
        let list = FieldList::new(String::new());
        FormUnit::fill(&list, ListValues::Plain(vec!["a".to_string()])).unwrap();
        assert_eq!(list.values().get(), vec!["a"]);
    }
}
