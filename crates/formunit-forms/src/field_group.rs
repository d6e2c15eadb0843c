//! Named groups of form units.
//!
//! A [`FieldGroup`] combines units of any kind (fields, lists, managers,
//! other groups) under names. It runs in one of three modes:
//!
//! - **all**: every unit takes part in submit.
//! - **picked**: only the units named by a `Store<Vec<String>>` take part.
//!   An empty selection resolves immediately with an empty map.
//! - **one of**: only the unit named by a `Store<String>` takes part, and
//!   the outcome is reported as `{key, result}` / `{key, error}`.
//!
//! `validate`, `refill` and `reset` always reach every unit, whatever the
//! mode. Payloads cross the group boundary as JSON.
//!
//! # Examples
//!
//! ```
//! use formunit_forms::field::Field;
//! use formunit_forms::field_group::{FieldGroup, GroupOutput};
//! use serde_json::json;
//!
//! let name = Field::new("Ada".to_string());
//! let age = Field::new(36);
//! let group = FieldGroup::builder().unit("name", name).unit("age", age).build();
//!
//! let GroupOutput::Values(values) = group.submit().unwrap() else { unreachable!() };
//! assert_eq!(values["name"], json!("Ada"));
//! assert_eq!(values["age"], json!(36));
//! ```

use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use formunit_core::{FormError, FormResult};
use formunit_signals::{batch, Signal, Store};

use crate::unit::{ErasedUnit, FlagSnapshot, FormUnit, UnitFlags};

/// The result of a successful group submit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GroupOutput {
    /// The single participant of a one-of group.
    OneOf { key: String, result: Value },
    /// Results keyed by unit name.
    Values(Map<String, Value>),
}

/// The payload of a failed group submit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GroupError {
    /// The single participant of a one-of group.
    OneOf { key: String, error: Value },
    /// Errors of the failing units, keyed by unit name.
    Errors(Map<String, Value>),
}

enum GroupMode {
    All,
    Picked(Store<Vec<String>>),
    OneOf(Store<String>),
}

impl GroupMode {
    const fn label(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Picked(_) => "picked",
            Self::OneOf(_) => "one of",
        }
    }
}

struct Child {
    name: String,
    unit: Box<dyn ErasedUnit>,
}

/// Collects the units of a [`FieldGroup`].
pub struct FieldGroupBuilder {
    children: Vec<Child>,
    mode: GroupMode,
}

impl Default for FieldGroupBuilder {
    fn default() -> Self {
        Self {
            children: Vec::new(),
            mode: GroupMode::All,
        }
    }
}

impl fmt::Debug for FieldGroupBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.children.iter().map(|c| c.name.as_str()).collect();
        f.debug_struct("FieldGroupBuilder")
            .field("units", &names)
            .field("mode", &self.mode.label())
            .finish()
    }
}

impl FieldGroupBuilder {
    /// Adds a unit under `name`, replacing any unit with that name.
    #[must_use]
    pub fn unit<U>(mut self, name: impl Into<String>, unit: U) -> Self
    where
        U: FormUnit + 'static,
        U::Output: Serialize,
        U::Error: Serialize,
        U::FillPayload: DeserializeOwned,
    {
        let name = name.into();
        self.children.retain(|child| child.name != name);
        self.children.push(Child {
            name,
            unit: Box::new(unit),
        });
        self
    }

    /// Submits only the units whose names `keys` currently holds.
    #[must_use]
    pub fn picked(mut self, keys: Store<Vec<String>>) -> Self {
        self.mode = GroupMode::Picked(keys);
        self
    }

    /// Submits only the unit whose name `key` currently holds.
    #[must_use]
    pub fn one_of(mut self, key: Store<String>) -> Self {
        self.mode = GroupMode::OneOf(key);
        self
    }

    pub fn build(self) -> FieldGroup {
        let names: Vec<String> = self.children.iter().map(|child| child.name.clone()).collect();

        let participants = match &self.mode {
            GroupMode::All => Store::new(names.clone()),
            GroupMode::Picked(keys) => keys.clone(),
            GroupMode::OneOf(key) => key.map(|key: &String| vec![key.clone()]),
        };

        let child_flags: Vec<Store<FlagSnapshot>> = self
            .children
            .iter()
            .map(|child| child.unit.flags().snapshot().clone())
            .collect();
        let snapshots = Store::combine_all(&child_flags, |all: &[FlagSnapshot]| all.to_vec());
        let flags = UnitFlags::from_snapshot(Store::combine(
            &participants,
            &snapshots,
            move |keys: &Vec<String>, snapshots: &Vec<FlagSnapshot>| {
                FlagSnapshot::any(
                    names
                        .iter()
                        .zip(snapshots)
                        .filter(|(name, _)| keys.contains(name))
                        .map(|(_, snapshot)| snapshot),
                )
            },
        ));

        tracing::debug!(
            "Field group built with {} unit(s) in {} mode",
            self.children.len(),
            self.mode.label()
        );

        FieldGroup {
            inner: Arc::new(GroupInner {
                children: self.children,
                mode: self.mode,
                participants,
                flags,
                resolved: Signal::new(),
                rejected: Signal::new(),
            }),
        }
    }
}

struct GroupInner {
    children: Vec<Child>,
    mode: GroupMode,
    participants: Store<Vec<String>>,
    flags: UnitFlags,
    resolved: Signal<GroupOutput>,
    rejected: Signal<GroupError>,
}

/// A named collection of form units acting as one unit.
#[derive(Clone)]
pub struct FieldGroup {
    inner: Arc<GroupInner>,
}

impl fmt::Debug for FieldGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldGroup")
            .field("units", &self.unit_names())
            .field("mode", &self.inner.mode.label())
            .field("participants", &self.inner.participants.get())
            .finish()
    }
}

impl FieldGroup {
    pub fn builder() -> FieldGroupBuilder {
        FieldGroupBuilder::default()
    }

    pub fn unit_names(&self) -> Vec<&str> {
        self.inner
            .children
            .iter()
            .map(|child| child.name.as_str())
            .collect()
    }

    /// The names of the units that currently take part in submit and in
    /// the aggregate flags.
    pub fn participants(&self) -> &Store<Vec<String>> {
        &self.inner.participants
    }

    pub fn validate(&self) {
        batch(|| {
            for child in &self.inner.children {
                child.unit.validate();
            }
        });
    }

    pub fn refill(&self) {
        batch(|| {
            for child in &self.inner.children {
                child.unit.refill();
            }
        });
    }

    pub fn reset(&self) {
        batch(|| {
            for child in &self.inner.children {
                child.unit.reset();
            }
        });
        tracing::debug!("Field group reset");
    }

    /// Fills the units named in `payload`. Units not named are left alone.
    ///
    /// # Errors
    ///
    /// [`FormError::UnknownUnit`] if a name matches no unit (nothing is
    /// filled then), or the error of a unit rejecting its payload.
    pub fn fill(&self, payload: Map<String, Value>) -> FormResult<()> {
        if let Some(unknown) = payload.keys().find(|name| self.child(name).is_none()) {
            return Err(FormError::UnknownUnit(format!("unit '{unknown}'")));
        }
        batch(|| {
            for (name, value) in payload {
                if let Some(child) = self.child(&name) {
                    child.unit.fill_json(value)?;
                }
            }
            Ok::<(), FormError>(())
        })
    }

    /// Submits the participating units.
    ///
    /// The group resolves only if every participant resolves.
    ///
    /// # Errors
    ///
    /// Returns the errors of the failing participants.
    pub fn submit(&self) -> Result<GroupOutput, GroupError> {
        let keys = self.inner.participants.get();
        for key in &keys {
            if self.child(key).is_none() {
                tracing::warn!("Field group: unknown unit '{key}' ignored on submit");
            }
        }

        let (values, errors) = batch(|| {
            let mut values = Map::new();
            let mut errors = Map::new();
            for child in &self.inner.children {
                if !keys.contains(&child.name) {
                    continue;
                }
                match child.unit.submit_json() {
                    Ok(value) => {
                        values.insert(child.name.clone(), value);
                    }
                    Err(error) => {
                        errors.insert(child.name.clone(), error);
                    }
                }
            }
            (values, errors)
        });

        let one_of = matches!(self.inner.mode, GroupMode::OneOf(_));
        let outcome = match (one_of, errors.is_empty()) {
            (true, true) => Ok(values.into_iter().next().map_or_else(
                || GroupOutput::Values(Map::new()),
                |(key, result)| GroupOutput::OneOf { key, result },
            )),
            (false, true) => Ok(GroupOutput::Values(values)),
            (true, false) => Err(errors.into_iter().next().map_or_else(
                || GroupError::Errors(Map::new()),
                |(key, error)| GroupError::OneOf { key, error },
            )),
            (false, false) => Err(GroupError::Errors(errors)),
        };

        match &outcome {
            Ok(output) => {
                tracing::debug!("Field group resolved");
                self.inner.resolved.send(output);
            }
            Err(error) => {
                tracing::debug!("Field group rejected");
                self.inner.rejected.send(error);
            }
        }
        outcome
    }

    fn child(&self, name: &str) -> Option<&Child> {
        self.inner.children.iter().find(|child| child.name == name)
    }
}

impl FormUnit for FieldGroup {
    type Output = GroupOutput;
    type FillPayload = Map<String, Value>;
    type Error = GroupError;

    fn validate(&self) {
        Self::validate(self);
    }

    fn reset(&self) {
        Self::reset(self);
    }

    fn fill(&self, payload: Map<String, Value>) -> FormResult<()> {
        Self::fill(self, payload)
    }

    fn refill(&self) {
        Self::refill(self);
    }

    fn submit(&self) -> Result<GroupOutput, GroupError> {
        Self::submit(self)
    }

    fn resolved(&self) -> &Signal<GroupOutput> {
        &self.inner.resolved
    }

    fn rejected(&self) -> &Signal<GroupError> {
        &self.inner.rejected
    }

    fn flags(&self) -> &UnitFlags {
        &self.inner.flags
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;
    use crate::field::Field;
    use crate::field_list::FieldList;
    use crate::validator::{attach_validator, ValidatorConfig};

    fn required(value: &String) -> Result<(), &'static str> {
        if value.is_empty() {
            Err("Required.")
        } else {
            Ok(())
        }
    }

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected an object, got {other}"),
        }
    }

    #[test]
    fn test_all_mode_collects_every_unit() {
        let name = Field::new("Ada".to_string());
        let tags = FieldList::new(String::new());
        tags.append("math".to_string());
        let group = FieldGroup::builder()
            .unit("name", name)
            .unit("tags", tags)
            .build();

        assert_eq!(
            group.submit(),
            Ok(GroupOutput::Values(object(json!({
                "name": "Ada",
                "tags": ["math"],
            }))))
        );
    }

    #[test]
    fn test_any_failure_rejects_with_failing_units_only() {
        let name = Field::new(String::new());
        attach_validator(&name, ValidatorConfig::new(required)).unwrap();
        let age = Field::new(30);
        let group = FieldGroup::builder().unit("name", name).unit("age", age).build();

        assert_eq!(
            group.submit(),
            Err(GroupError::Errors(object(json!({ "name": ["Required."] }))))
        );
        assert!(group.is_error().get());
    }

    #[test]
    fn test_signals_fire_once_per_submit() {
        let resolved = Arc::new(AtomicUsize::new(0));
        let counter = resolved.clone();
        let group = FieldGroup::builder().unit("a", Field::new(1)).build();
        group.resolved().subscribe(Arc::new(move |_: &GroupOutput| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        group.submit().unwrap();
        group.submit().unwrap();
        assert_eq!(resolved.load(Ordering::SeqCst), 2);
        assert_eq!(group.rejected().receiver_count(), 0);
    }

    #[test]
    fn test_picked_mode_follows_selection() {
        let keys = Store::new(vec!["a".to_string()]);
        let a = Field::new(1);
        let b = Field::new(String::new());
        attach_validator(&b, ValidatorConfig::new(required)).unwrap();
        b.validate();
        let group = FieldGroup::builder()
            .unit("a", a)
            .unit("b", b.clone())
            .picked(keys.clone())
            .build();

        assert!(!group.is_error().get());
        assert_eq!(
            group.submit(),
            Ok(GroupOutput::Values(object(json!({ "a": 1 }))))
        );

        keys.set(vec!["a".to_string(), "b".to_string()]);
        assert!(group.is_error().get());
        assert!(group.submit().is_err());

        b.set_value("x".to_string());
        group.validate();
        assert!(group.is_ready().get());
    }

    #[test]
    fn test_empty_selection_resolves_empty_map() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let field = Field::new(1);
        field.resolved().subscribe(Arc::new(move |_: &i32| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        let group = FieldGroup::builder()
            .unit("a", field)
            .picked(Store::new(Vec::new()))
            .build();

        assert_eq!(group.submit(), Ok(GroupOutput::Values(Map::new())));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_one_of_reports_key_and_result() {
        let active = Store::new("email".to_string());
        let email = Field::new(String::new());
        attach_validator(&email, ValidatorConfig::new(required)).unwrap();
        let phone = Field::new("555".to_string());
        let group = FieldGroup::builder()
            .unit("email", email)
            .unit("phone", phone)
            .one_of(active.clone())
            .build();

        assert_eq!(
            group.submit(),
            Err(GroupError::OneOf {
                key: "email".into(),
                error: json!(["Required."]),
            })
        );

        active.set("phone".to_string());
        assert_eq!(
            group.submit(),
            Ok(GroupOutput::OneOf {
                key: "phone".into(),
                result: json!("555"),
            })
        );
        assert!(!group.is_error().get());
    }

    #[test]
    fn test_unknown_submit_key_is_ignored() {
        let group = FieldGroup::builder()
            .unit("a", Field::new(1))
            .picked(Store::new(vec!["a".to_string(), "ghost".to_string()]))
            .build();
        assert_eq!(
            group.submit(),
            Ok(GroupOutput::Values(object(json!({ "a": 1 }))))
        );
    }

    #[test]
    fn test_fill_touches_only_named_units() {
        let name = Field::new(String::new());
        let age = Field::new(0);
        let group = FieldGroup::builder()
            .unit("name", name.clone())
            .unit("age", age.clone())
            .build();

        group.fill(object(json!({ "age": 40 }))).unwrap();
        assert_eq!(age.value().get(), 40);
        assert_eq!(name.value().get(), "");
        assert!(group.is_dirty().get());

        age.set_value(41);
        group.refill();
        assert_eq!(age.value().get(), 40);

        group.reset();
        assert_eq!(age.value().get(), 0);
        assert!(!group.is_dirty().get());
    }

    #[test]
    fn test_fill_rejects_unknown_unit_before_filling() {
        let age = Field::new(0);
        let group = FieldGroup::builder().unit("age", age.clone()).build();
        let err = group
            .fill(object(json!({ "age": 5, "height": 180 })))
            .unwrap_err();
        assert!(matches!(err, FormError::UnknownUnit(_)));
        assert_eq!(age.value().get(), 0);
    }

    #[test]
    fn test_fill_reports_mistyped_payload() {
        let group = FieldGroup::builder().unit("age", Field::new(0)).build();
        let err = group.fill(object(json!({ "age": "old" }))).unwrap_err();
        assert!(matches!(err, FormError::SerializationError(_)));
    }

    #[test]
    fn test_validate_reaches_units_outside_selection() {
        let hidden = Field::new(String::new());
        attach_validator(&hidden, ValidatorConfig::new(required)).unwrap();
        let group = FieldGroup::builder()
            .unit("shown", Field::new(1))
            .unit("hidden", hidden.clone())
            .picked(Store::new(vec!["shown".to_string()]))
            .build();

        group.validate();
        assert!(hidden.is_error().get());
        assert!(!group.is_error().get());
    }

    #[test]
    fn test_nested_groups() {
        let inner = FieldGroup::builder().unit("city", Field::new("Oslo".to_string())).build();
        let outer = FieldGroup::builder()
            .unit("address", inner)
            .unit("zip", Field::new(150))
            .build();
        assert_eq!(
            outer.submit(),
            Ok(GroupOutput::Values(object(json!({
                "address": { "city": "Oslo" },
                "zip": 150,
            }))))
        );
    }

    #[test]
    fn test_duplicate_name_replaces_unit() {
        let group = FieldGroup::builder()
            .unit("a", Field::new(1))
            .unit("a", Field::new(2))
            .build();
        assert_eq!(group.unit_names(), vec!["a"]);
        assert_eq!(
            group.submit(),
            Ok(GroupOutput::Values(object(json!({ "a": 2 }))))
        );
    }
}
