//! Row-oriented coordination of several controlled field lists.
//!
//! A [`FieldListManager`] treats a set of named [`ControlledFieldList`]
//! columns as one table. Every row operation is broadcast to all columns in
//! one batch with the same key (and id), so row `i` of every column always
//! describes the same logical row. Columns may hold different value types;
//! row payloads are JSON objects keyed by column name.
//!
//! # Examples
//!
//! ```
//! use formunit_forms::controlled_field_list::ControlledFieldList;
//! use formunit_forms::field_list_manager::{FieldListManager, RowInit};
//! use serde_json::json;
//!
//! let manager = FieldListManager::builder()
//!     .column("name", ControlledFieldList::new(String::new()))
//!     .column("admin", ControlledFieldList::new(false))
//!     .build()
//!     .unwrap();
//!
//! manager.append(RowInit::from_value(json!({"name": "Ada", "admin": true})).unwrap()).unwrap();
//! manager.append(RowInit::empty()).unwrap();
//!
//! let rows = manager.submit().unwrap();
//! assert_eq!(rows[0].values["name"], json!("Ada"));
//! assert_eq!(rows[1].values["admin"], json!(false));
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use formunit_core::{FormError, FormResult};
use formunit_signals::{batch, Signal, Store};

use crate::controlled_field_list::ControlledFieldList;
use crate::counter::KeyCounter;
use crate::field_list_core::{FilledSlot, SlotError, SlotPosition};
use crate::unit::{to_json, FieldValue, FlagSnapshot, FormUnit, UnitFlags};

// ── Row payloads ────────────────────────────────────────────────────────

/// A row to create. Columns without a value get their initial value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowInit {
    #[serde(default)]
    pub values: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl RowInit {
    /// A row holding every column's initial value.
    pub const fn empty() -> Self {
        Self {
            values: None,
            id: None,
        }
    }

    /// Builds a row from a JSON object of column values.
    ///
    /// # Errors
    ///
    /// Returns [`FormError::SerializationError`] if `value` is not an object.
    pub fn from_value(value: Value) -> FormResult<Self> {
        match value {
            Value::Object(values) => Ok(Self::from(values)),
            other => Err(FormError::SerializationError(format!(
                "row values must be an object, got {other}"
            ))),
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    fn value_of(&self, column: &str) -> Option<Value> {
        self.values
            .as_ref()
            .and_then(|values| values.get(column).cloned())
    }
}

impl From<Map<String, Value>> for RowInit {
    fn from(values: Map<String, Value>) -> Self {
        Self {
            values: Some(values),
            id: None,
        }
    }
}

/// One row of a resolved manager submit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagerRow {
    pub values: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// The errors of one row in a rejected manager submit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowError {
    /// Positional row index at submit time.
    pub index: usize,
    /// Error messages per failing column.
    pub errors: BTreeMap<String, Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

// ── Type-erased columns ─────────────────────────────────────────────────

/// A controlled field list with its value type erased to JSON.
pub(crate) trait ManagedColumn: Send + Sync {
    fn uses_ids(&self) -> bool;
    /// Checks that `value` converts to the column's value type.
    fn accepts(&self, value: &Value) -> FormResult<()>;
    fn insert_json(
        &self,
        position: SlotPosition,
        key: usize,
        value: Option<Value>,
        id: Option<String>,
    ) -> FormResult<()>;
    fn fill_json(&self, slots: Vec<FilledSlot<Option<Value>>>) -> FormResult<()>;
    fn remove_row(&self, index: usize);
    fn reset_row(&self, index: usize);
    fn reset_column(&self);
    fn refill_column(&self);
    fn validate_column(&self);
    fn submit_json(&self) -> Result<Vec<Value>, Vec<SlotError>>;
    fn key_store(&self) -> Store<Vec<usize>>;
    fn id_store(&self) -> Option<Store<Vec<Option<String>>>>;
    fn flag_store(&self) -> Store<FlagSnapshot>;
}

fn decode<V: DeserializeOwned>(value: Option<Value>) -> FormResult<Option<V>> {
    value
        .map(serde_json::from_value)
        .transpose()
        .map_err(FormError::from)
}

impl<V> ManagedColumn for ControlledFieldList<V>
where
    V: FieldValue + Serialize + DeserializeOwned,
{
    fn uses_ids(&self) -> bool {
        self.with_id()
    }

    fn accepts(&self, value: &Value) -> FormResult<()> {
        decode::<V>(Some(value.clone())).map(|_| ())
    }

    fn insert_json(
        &self,
        position: SlotPosition,
        key: usize,
        value: Option<Value>,
        id: Option<String>,
    ) -> FormResult<()> {
        let value = decode(value)?;
        self.insert_slot(position, key, value, id);
        Ok(())
    }

    fn fill_json(&self, slots: Vec<FilledSlot<Option<Value>>>) -> FormResult<()> {
        let slots = slots
            .into_iter()
            .map(|slot| {
                Ok::<_, FormError>(FilledSlot {
                    key: slot.key,
                    value: decode(slot.value)?.unwrap_or_else(|| self.initial_value().clone()),
                    id: slot.id,
                })
            })
            .collect::<FormResult<Vec<_>>>()?;
        self.fill_slots(slots);
        Ok(())
    }

    fn remove_row(&self, index: usize) {
        self.remove_slot(index);
    }

    fn reset_row(&self, index: usize) {
        self.reset_field(index);
    }

    fn reset_column(&self) {
        self.reset_all();
    }

    fn refill_column(&self) {
        self.refill_slots();
    }

    fn validate_column(&self) {
        self.validate();
    }

    fn submit_json(&self) -> Result<Vec<Value>, Vec<SlotError>> {
        self.submit()
            .map(|values| values.into_values().iter().map(to_json).collect())
    }

    fn key_store(&self) -> Store<Vec<usize>> {
        self.keys().clone()
    }

    fn id_store(&self) -> Option<Store<Vec<Option<String>>>> {
        self.ids().cloned()
    }

    fn flag_store(&self) -> Store<FlagSnapshot> {
        self.flags().snapshot().clone()
    }
}

// ── Manager ─────────────────────────────────────────────────────────────

struct Column {
    name: String,
    list: Box<dyn ManagedColumn>,
}

struct ManagerInner {
    columns: Vec<Column>,
    counter: KeyCounter,
    with_id: bool,
    keys: Store<Vec<usize>>,
    ids: Option<Store<Vec<Option<String>>>>,
    flags: UnitFlags,
    resolved: Signal<Vec<ManagerRow>>,
    rejected: Signal<Vec<RowError>>,
}

/// A table of controlled field lists sharing one key counter.
#[derive(Clone)]
pub struct FieldListManager {
    inner: Arc<ManagerInner>,
}

impl fmt::Debug for FieldListManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldListManager")
            .field("columns", &self.column_names())
            .field("with_id", &self.inner.with_id)
            .field("keys", &self.inner.keys.get())
            .finish_non_exhaustive()
    }
}

/// Collects the columns of a [`FieldListManager`].
#[derive(Default)]
pub struct FieldListManagerBuilder {
    columns: Vec<Column>,
}

impl fmt::Debug for FieldListManagerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.columns.iter().map(|c| c.name.as_str()).collect();
        f.debug_struct("FieldListManagerBuilder")
            .field("columns", &names)
            .finish()
    }
}

impl FieldListManagerBuilder {
    /// Adds a column. A later column with the same name replaces the earlier one.
    #[must_use]
    pub fn column<V>(mut self, name: impl Into<String>, list: ControlledFieldList<V>) -> Self
    where
        V: FieldValue + Serialize + DeserializeOwned,
    {
        let name = name.into();
        self.columns.retain(|column| column.name != name);
        self.columns.push(Column {
            name,
            list: Box::new(list),
        });
        self
    }

    /// Builds the manager.
    ///
    /// # Errors
    ///
    /// [`FormError::EmptyTemplate`] without columns, and
    /// [`FormError::MixedIdConfiguration`] when some columns use ids and
    /// others do not.
    pub fn build(self) -> FormResult<FieldListManager> {
        let Some(first) = self.columns.first() else {
            return Err(FormError::EmptyTemplate);
        };

        let (with_ids, without_ids): (Vec<&Column>, Vec<&Column>) =
            self.columns.iter().partition(|column| column.list.uses_ids());
        if !with_ids.is_empty() && !without_ids.is_empty() {
            let names = |columns: &[&Column]| {
                columns
                    .iter()
                    .map(|column| column.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            return Err(FormError::MixedIdConfiguration(format!(
                "columns [{}] use ids, columns [{}] do not",
                names(&with_ids),
                names(&without_ids)
            )));
        }

        let with_id = first.list.uses_ids();
        let keys = first.list.key_store();
        let ids = first.list.id_store();
        let snapshots: Vec<Store<FlagSnapshot>> = self
            .columns
            .iter()
            .map(|column| column.list.flag_store())
            .collect();
        let flags = UnitFlags::from_snapshot(Store::combine_all(&snapshots, |all: &[FlagSnapshot]| {
            FlagSnapshot::any(all)
        }));

        tracing::debug!(
            "Field list manager built with {} column(s)",
            self.columns.len()
        );

        Ok(FieldListManager {
            inner: Arc::new(ManagerInner {
                columns: self.columns,
                counter: KeyCounter::new(),
                with_id,
                keys,
                ids,
                flags,
                resolved: Signal::new(),
                rejected: Signal::new(),
            }),
        })
    }
}

impl FieldListManager {
    pub fn builder() -> FieldListManagerBuilder {
        FieldListManagerBuilder::default()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.inner
            .columns
            .iter()
            .map(|column| column.name.as_str())
            .collect()
    }

    pub fn with_id(&self) -> bool {
        self.inner.with_id
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.inner.keys.with(Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Row keys, shared by every column.
    pub fn keys(&self) -> &Store<Vec<usize>> {
        &self.inner.keys
    }

    /// Row ids. `None` unless the columns use ids.
    pub fn ids(&self) -> Option<&Store<Vec<Option<String>>>> {
        self.inner.ids.as_ref()
    }

    /// The key the next created row will get.
    pub fn next_key(&self) -> usize {
        self.inner.counter.current()
    }

    // ── Row lifecycle ────────────────────────────────────────────────

    pub fn append(&self, row: impl Into<RowInit>) -> FormResult<()> {
        self.insert_row(SlotPosition::Append, row.into())
    }

    pub fn prepend(&self, row: impl Into<RowInit>) -> FormResult<()> {
        self.insert_row(SlotPosition::Prepend, row.into())
    }

    /// Inserts a row at `index`, clamped to the ends of the table.
    pub fn insert(&self, index: isize, row: impl Into<RowInit>) -> FormResult<()> {
        self.insert_row(SlotPosition::At(index), row.into())
    }

    pub fn remove(&self, index: usize) {
        batch(|| {
            for column in &self.inner.columns {
                column.list.remove_row(index);
            }
        });
    }

    /// Resets row `index` in every column.
    pub fn reset_slice(&self, index: usize) {
        batch(|| {
            for column in &self.inner.columns {
                column.list.reset_row(index);
            }
        });
    }

    /// Replaces every row, allocating one fresh key per row.
    ///
    /// # Errors
    ///
    /// Fails without changing anything when a row names an unknown column
    /// or holds a value its column cannot take.
    pub fn fill(&self, rows: Vec<RowInit>) -> FormResult<()> {
        for row in &rows {
            self.check_row(row)?;
        }
        let start = self.inner.counter.reserve(rows.len()).start;

        batch(|| {
            for column in &self.inner.columns {
                let slots = rows
                    .iter()
                    .enumerate()
                    .map(|(offset, row)| FilledSlot {
                        key: start + offset,
                        value: row.value_of(&column.name),
                        id: row.id.clone(),
                    })
                    .collect();
                column.list.fill_json(slots)?;
            }
            Ok::<(), FormError>(())
        })?;

        tracing::debug!("Field list manager filled with {} row(s)", rows.len());
        Ok(())
    }

    /// Replays every column's last fill.
    pub fn refill(&self) {
        batch(|| {
            for column in &self.inner.columns {
                column.list.refill_column();
            }
        });
    }

    /// Drops every row and restarts key allocation from zero.
    pub fn reset(&self) {
        batch(|| {
            for column in &self.inner.columns {
                column.list.reset_column();
            }
        });
        self.inner.counter.reset();
        tracing::debug!("Field list manager reset");
    }

    pub fn validate(&self) {
        batch(|| {
            for column in &self.inner.columns {
                column.list.validate_column();
            }
        });
    }

    /// Submits every column and merges their outcomes row by row.
    ///
    /// # Errors
    ///
    /// When any column rejects, returns one [`RowError`] per row with at
    /// least one failing column, ordered by row index.
    pub fn submit(&self) -> Result<Vec<ManagerRow>, Vec<RowError>> {
        let outcomes: Vec<(&str, Result<Vec<Value>, Vec<SlotError>>)> = batch(|| {
            self.inner
                .columns
                .iter()
                .map(|column| (column.name.as_str(), column.list.submit_json()))
                .collect()
        });

        let outcome = if outcomes.iter().all(|(_, outcome)| outcome.is_ok()) {
            Ok(self.merge_rows(outcomes))
        } else {
            Err(merge_errors(outcomes, self.inner.with_id))
        };

        match &outcome {
            Ok(rows) => {
                tracing::debug!("Field list manager resolved with {} row(s)", rows.len());
                self.inner.resolved.send(rows);
            }
            Err(errors) => {
                tracing::debug!(
                    "Field list manager rejected: {} invalid row(s)",
                    errors.len()
                );
                self.inner.rejected.send(errors);
            }
        }
        outcome
    }

    fn insert_row(&self, position: SlotPosition, row: RowInit) -> FormResult<()> {
        self.check_row(&row)?;
        let key = self.inner.counter.next();
        tracing::trace!("Field list manager inserting row with key {key}");

        batch(|| {
            for column in &self.inner.columns {
                column.list.insert_json(
                    position,
                    key,
                    row.value_of(&column.name),
                    row.id.clone(),
                )?;
            }
            Ok::<(), FormError>(())
        })
    }

    fn check_row(&self, row: &RowInit) -> FormResult<()> {
        let Some(values) = &row.values else {
            return Ok(());
        };
        for (name, value) in values {
            let column = self
                .inner
                .columns
                .iter()
                .find(|column| &column.name == name)
                .ok_or_else(|| FormError::UnknownUnit(format!("column '{name}'")))?;
            column.list.accepts(value).map_err(|e| {
                FormError::SerializationError(format!("column '{name}': {e}"))
            })?;
        }
        Ok(())
    }

    fn merge_rows(&self, outcomes: Vec<(&str, Result<Vec<Value>, Vec<SlotError>>)>) -> Vec<ManagerRow> {
        let ids = self.inner.ids.as_ref().map(Store::get).unwrap_or_default();
        let mut rows: Vec<ManagerRow> = Vec::new();
        for (name, outcome) in outcomes {
            let Ok(values) = outcome else { continue };
            for (index, value) in values.into_iter().enumerate() {
                if rows.len() <= index {
                    rows.push(ManagerRow {
                        values: Map::new(),
                        id: ids.get(index).cloned().flatten(),
                    });
                }
                rows[index].values.insert(name.to_string(), value);
            }
        }
        rows
    }
}

fn merge_errors(outcomes: Vec<(&str, Result<Vec<Value>, Vec<SlotError>>)>, with_id: bool) -> Vec<RowError> {
    let mut rows: BTreeMap<usize, RowError> = BTreeMap::new();
    for (name, outcome) in outcomes {
        let Err(errors) = outcome else { continue };
        for error in errors {
            let row = rows.entry(error.index).or_insert_with(|| RowError {
                index: error.index,
                errors: BTreeMap::new(),
                id: if with_id { error.id.clone() } else { None },
            });
            row.errors.insert(name.to_string(), error.error_messages);
        }
    }
    rows.into_values().collect()
}

impl FormUnit for FieldListManager {
    type Output = Vec<ManagerRow>;
    type FillPayload = Vec<RowInit>;
    type Error = Vec<RowError>;

    fn validate(&self) {
        Self::validate(self);
    }

    fn reset(&self) {
        Self::reset(self);
    }

    fn fill(&self, payload: Vec<RowInit>) -> FormResult<()> {
        Self::fill(self, payload)
    }

    fn refill(&self) {
        Self::refill(self);
    }

    fn submit(&self) -> Result<Vec<ManagerRow>, Vec<RowError>> {
        Self::submit(self)
    }

    fn resolved(&self) -> &Signal<Vec<ManagerRow>> {
        &self.inner.resolved
    }

    fn rejected(&self) -> &Signal<Vec<RowError>> {
        &self.inner.rejected
    }

    fn flags(&self) -> &UnitFlags {
        &self.inner.flags
    }
}
