//! The contract shared by every form unit.
//!
//! Fields, field lists, field-list managers and field groups all implement
//! [`FormUnit`]: they can be validated, reset, filled, refilled and
//! submitted, they announce submit outcomes through `resolved`/`rejected`
//! signals, and they expose the same aggregate flag stores.

use serde::de::DeserializeOwned;
use serde::Serialize;

use formunit_core::FormResult;
use formunit_signals::{Signal, Store};

/// Bounds every value held by a unit must satisfy.
pub trait FieldValue: Clone + PartialEq + Send + Sync + 'static {}

impl<T: Clone + PartialEq + Send + Sync + 'static> FieldValue for T {}

/// The aggregate flags of a unit at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlagSnapshot {
    pub is_error: bool,
    pub is_dirty: bool,
    pub is_touched: bool,
    pub is_loading: bool,
    pub is_focused: bool,
}

impl FlagSnapshot {
    /// `!(is_error || is_loading)`.
    pub const fn is_ready(self) -> bool {
        !(self.is_error || self.is_loading)
    }

    /// Flag-wise OR of two snapshots.
    #[must_use]
    pub const fn merge(self, other: Self) -> Self {
        Self {
            is_error: self.is_error || other.is_error,
            is_dirty: self.is_dirty || other.is_dirty,
            is_touched: self.is_touched || other.is_touched,
            is_loading: self.is_loading || other.is_loading,
            is_focused: self.is_focused || other.is_focused,
        }
    }

    /// OR over any number of snapshots. Empty input yields all-false.
    pub fn any<'a>(snapshots: impl IntoIterator<Item = &'a Self>) -> Self {
        snapshots
            .into_iter()
            .fold(Self::default(), |acc, snapshot| acc.merge(*snapshot))
    }
}

/// Observable aggregate flags of a unit.
///
/// Every flag is derived from one [`FlagSnapshot`] store, so `is_ready`
/// always equals `!(is_error || is_loading)` for the same update.
#[derive(Debug, Clone)]
pub struct UnitFlags {
    snapshot: Store<FlagSnapshot>,
    is_error: Store<bool>,
    is_dirty: Store<bool>,
    is_touched: Store<bool>,
    is_loading: Store<bool>,
    is_focused: Store<bool>,
    is_ready: Store<bool>,
}

impl UnitFlags {
    /// Derives the individual flag stores from a snapshot store.
    pub fn from_snapshot(snapshot: Store<FlagSnapshot>) -> Self {
        Self {
            is_error: snapshot.map(|s: &FlagSnapshot| s.is_error),
            is_dirty: snapshot.map(|s: &FlagSnapshot| s.is_dirty),
            is_touched: snapshot.map(|s: &FlagSnapshot| s.is_touched),
            is_loading: snapshot.map(|s: &FlagSnapshot| s.is_loading),
            is_focused: snapshot.map(|s: &FlagSnapshot| s.is_focused),
            is_ready: snapshot.map(|s: &FlagSnapshot| s.is_ready()),
            snapshot,
        }
    }

    /// All flags at once.
    pub const fn snapshot(&self) -> &Store<FlagSnapshot> {
        &self.snapshot
    }

    pub const fn is_error(&self) -> &Store<bool> {
        &self.is_error
    }

    pub const fn is_dirty(&self) -> &Store<bool> {
        &self.is_dirty
    }

    pub const fn is_touched(&self) -> &Store<bool> {
        &self.is_touched
    }

    pub const fn is_loading(&self) -> &Store<bool> {
        &self.is_loading
    }

    pub const fn is_focused(&self) -> &Store<bool> {
        &self.is_focused
    }

    pub const fn is_ready(&self) -> &Store<bool> {
        &self.is_ready
    }
}

/// The uniform lifecycle contract of a form unit.
///
/// `submit` returns the outcome it just announced on `resolved` or
/// `rejected`, so coordinators can collect child outcomes directly.
pub trait FormUnit: Send + Sync {
    /// Payload of a successful submit.
    type Output: Clone + Send + Sync + 'static;
    /// Payload accepted by `fill`.
    type FillPayload;
    /// Payload of a rejected submit.
    type Error: Clone + Send + Sync + 'static;

    /// Forces a validation pass. Inert for units without a validator.
    fn validate(&self);

    /// Restores the construction-time state.
    fn reset(&self);

    /// Loads new data and remembers it for [`refill`](FormUnit::refill).
    ///
    /// # Errors
    ///
    /// Returns an error when the payload does not fit the unit, which only
    /// happens for type-erased payloads.
    fn fill(&self, payload: Self::FillPayload) -> FormResult<()>;

    /// Replays the last fill, if any happened since the last reset.
    fn refill(&self);

    /// Submits the unit, firing exactly one of `resolved` / `rejected`.
    ///
    /// # Errors
    ///
    /// Returns the rejection payload when the unit is invalid.
    fn submit(&self) -> Result<Self::Output, Self::Error>;

    /// Fired with the output of every successful submit.
    fn resolved(&self) -> &Signal<Self::Output>;

    /// Fired with the error payload of every failed submit.
    fn rejected(&self) -> &Signal<Self::Error>;

    /// The unit's aggregate flags.
    fn flags(&self) -> &UnitFlags;

    fn is_error(&self) -> &Store<bool> {
        self.flags().is_error()
    }

    fn is_dirty(&self) -> &Store<bool> {
        self.flags().is_dirty()
    }

    fn is_touched(&self) -> &Store<bool> {
        self.flags().is_touched()
    }

    fn is_loading(&self) -> &Store<bool> {
        self.flags().is_loading()
    }

    fn is_focused(&self) -> &Store<bool> {
        self.flags().is_focused()
    }

    fn is_ready(&self) -> &Store<bool> {
        self.flags().is_ready()
    }
}

/// A [`FormUnit`] with its payload types erased to JSON, so that units of
/// different value types can live side by side in a group.
pub(crate) trait ErasedUnit: Send + Sync {
    fn validate(&self);
    fn reset(&self);
    fn refill(&self);
    fn fill_json(&self, payload: serde_json::Value) -> FormResult<()>;
    fn submit_json(&self) -> Result<serde_json::Value, serde_json::Value>;
    fn flags(&self) -> &UnitFlags;
}

impl<U> ErasedUnit for U
where
    U: FormUnit,
    U::Output: Serialize,
    U::Error: Serialize,
    U::FillPayload: DeserializeOwned,
{
    fn validate(&self) {
        FormUnit::validate(self);
    }

    fn reset(&self) {
        FormUnit::reset(self);
    }

    fn refill(&self) {
        FormUnit::refill(self);
    }

    fn fill_json(&self, payload: serde_json::Value) -> FormResult<()> {
        let payload: U::FillPayload = serde_json::from_value(payload)?;
        FormUnit::fill(self, payload)
    }

    fn submit_json(&self) -> Result<serde_json::Value, serde_json::Value> {
        match FormUnit::submit(self) {
            Ok(output) => Ok(to_json(&output)),
            Err(error) => Err(to_json(&error)),
        }
    }

    fn flags(&self) -> &UnitFlags {
        FormUnit::flags(self)
    }
}

pub(crate) fn to_json<T: Serialize>(payload: &T) -> serde_json::Value {
    serde_json::to_value(payload).unwrap_or_else(|e| {
        tracing::warn!("Submit payload is not representable as JSON: {e}");
        serde_json::Value::Null
    })
}
