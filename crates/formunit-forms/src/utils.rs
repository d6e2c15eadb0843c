//! Index-based array helpers.
//!
//! All helpers are pure: they never mutate their input. Helpers that can be
//! no-ops return a [`Cow::Borrowed`] of the input in that case, so callers
//! can cheaply tell whether anything changed.

use std::borrow::Cow;

/// Inserts `value` at `index`, clamping to the ends of the list.
///
/// An index `<= 0` prepends and an index `>= len` appends, which is how
/// `append` and `prepend` are expressed as inserts.
///
/// ```
/// use formunit_forms::utils::insert_to_array;
///
/// assert_eq!(insert_to_array(&[1, 2], -5, 0), vec![0, 1, 2]);
/// assert_eq!(insert_to_array(&[1, 2], 1, 9), vec![1, 9, 2]);
/// assert_eq!(insert_to_array(&[1, 2], isize::MAX, 3), vec![1, 2, 3]);
/// ```
pub fn insert_to_array<T: Clone>(list: &[T], index: isize, value: T) -> Vec<T> {
    let position = clamp_insert_index(list.len(), index);
    let mut copy = Vec::with_capacity(list.len() + 1);
    copy.extend_from_slice(&list[..position]);
    copy.push(value);
    copy.extend_from_slice(&list[position..]);
    copy
}

/// The position an insert at `index` lands on in a list of length `len`.
pub fn clamp_insert_index(len: usize, index: isize) -> usize {
    usize::try_from(index).map_or(0, |index| index.min(len))
}

/// Replaces the slot at `index`.
///
/// Returns the input unchanged when `value` is `None`, when `index` is out
/// of range, or when the slot already holds an equal value.
pub fn update_array<T: Clone + PartialEq>(list: &[T], index: usize, value: Option<T>) -> Cow<'_, [T]> {
    match (value, list.get(index)) {
        (Some(value), Some(current)) if *current != value => {
            let mut copy = list.to_vec();
            copy[index] = value;
            Cow::Owned(copy)
        }
        _ => Cow::Borrowed(list),
    }
}

/// Removes the slot at `index`, or returns the input unchanged when out of range.
pub fn remove_by_index<T: Clone>(list: &[T], index: usize) -> Cow<'_, [T]> {
    if index >= list.len() {
        return Cow::Borrowed(list);
    }
    let mut copy = list.to_vec();
    copy.remove(index);
    Cow::Owned(copy)
}

/// A new list of `len` copies of `value`.
pub fn fill_array<T: Clone>(len: usize, value: T) -> Vec<T> {
    vec![value; len]
}
