//! Field lists whose slots are created by an orchestrator.

use std::fmt;
use std::ops::Deref;

use crate::field_list_core::{FieldListConfig, FieldListCore};
use crate::unit::FieldValue;

/// A field list without its own key allocation.
///
/// It has the same state and per-slot operations as a
/// [`FieldList`](crate::field_list::FieldList), but slots are created,
/// removed, filled and reset only by the
/// [`FieldListManager`](crate::field_list_manager::FieldListManager) that
/// owns it, so that sibling columns share one key per row.
pub struct ControlledFieldList<V: FieldValue> {
    core: FieldListCore<V>,
}

impl<V: FieldValue> Clone for ControlledFieldList<V> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
        }
    }
}

impl<V: FieldValue + fmt::Debug> fmt::Debug for ControlledFieldList<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ControlledFieldList").field(&self.core).finish()
    }
}

impl<V: FieldValue> Deref for ControlledFieldList<V> {
    type Target = FieldListCore<V>;

    fn deref(&self) -> &Self::Target {
        &self.core
    }
}

impl<V: FieldValue> ControlledFieldList<V> {
    pub fn new(initial_value: V) -> Self {
        Self::with_config(initial_value, FieldListConfig::default())
    }

    pub fn from_settings(initial_value: V) -> Self {
        Self::with_config(initial_value, FieldListConfig::from_settings())
    }

    pub fn with_config(initial_value: V, config: FieldListConfig) -> Self {
        Self {
            core: FieldListCore::new(initial_value, config),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field_list_core::SlotPosition;

    #[test]
    fn test_starts_empty_with_config() {
        let list = ControlledFieldList::with_config(
            false,
            FieldListConfig::default().with_id(true).named("agree"),
        );
        assert!(list.is_empty());
        assert!(list.with_id());
        assert_eq!(list.name(), "agree");
        assert!(list.is_ready().get());
    }

    #[test]
    fn test_per_slot_operations_after_orchestrated_insert() {
        let list = ControlledFieldList::new(0);
        list.insert_slot(SlotPosition::Append, 40, Some(1), None);
        list.set_value(0, 2);
        list.set_loading(0, true);
        assert_eq!(list.values().get(), vec![2]);
        assert_eq!(list.keys().get(), vec![40]);
        assert!(list.is_loading().get());
        assert!(list.is_dirty().get());
    }

    #[test]
    fn test_clones_share_slots() {
        let list = ControlledFieldList::new(String::new());
        let handle = list.clone();
        handle.insert_slot(SlotPosition::Prepend, 0, None, None);
        assert_eq!(list.len(), 1);
    }
}
