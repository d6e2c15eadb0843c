//! Awaiting submit outcomes.
//!
//! Units announce submit results through their `resolved` and `rejected`
//! signals. [`submit_outcome`] turns the next announcement into a future,
//! which is convenient when the submit is triggered somewhere else (a
//! button handler, a parent group) and the caller only wants the result.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::unit::FormUnit;

type Outcome<U> = Result<<U as FormUnit>::Output, <U as FormUnit>::Error>;

/// Future returned by [`submit_outcome`].
///
/// Dropping it disconnects its receivers from the unit.
pub struct SubmitOutcome<U: FormUnit + Clone + 'static> {
    unit: U,
    resolved_id: String,
    rejected_id: String,
    receiver: oneshot::Receiver<Outcome<U>>,
}

/// Waits for the next submit of `unit`, whoever triggers it.
///
/// # Examples
///
/// ```
/// use formunit_forms::field::Field;
/// use formunit_forms::submission::submit_outcome;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let email = Field::new("ada@example.com".to_string());
/// let outcome = submit_outcome(&email);
/// let _ = email.submit();
/// assert_eq!(outcome.await, Ok("ada@example.com".to_string()));
/// # }
/// ```
pub fn submit_outcome<U: FormUnit + Clone + 'static>(unit: &U) -> SubmitOutcome<U> {
    let (sender, receiver) = oneshot::channel::<Outcome<U>>();
    let sender = Arc::new(Mutex::new(Some(sender)));

    let on_resolved = Arc::clone(&sender);
    let resolved_id = unit.resolved().subscribe(Arc::new(move |output: &U::Output| {
        let slot = on_resolved.lock().expect("submit outcome lock poisoned").take();
        if let Some(sender) = slot {
            let _ = sender.send(Ok(output.clone()));
        }
    }));

    let rejected_id = unit.rejected().subscribe(Arc::new(move |error: &U::Error| {
        let slot = sender.lock().expect("submit outcome lock poisoned").take();
        if let Some(sender) = slot {
            let _ = sender.send(Err(error.clone()));
        }
    }));

    SubmitOutcome {
        unit: unit.clone(),
        resolved_id,
        rejected_id,
        receiver,
    }
}

impl<U: FormUnit + Clone + Unpin + 'static> Future for SubmitOutcome<U> {
    type Output = Outcome<U>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver).poll(cx).map(|received| {
            received.expect("submit outcome receivers live as long as the future")
        })
    }
}

impl<U: FormUnit + Clone + 'static> Drop for SubmitOutcome<U> {
    fn drop(&mut self) {
        self.unit.resolved().disconnect(&self.resolved_id);
        self.unit.rejected().disconnect(&self.rejected_id);
    }
}

impl<U: FormUnit + Clone + 'static> fmt::Debug for SubmitOutcome<U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubmitOutcome")
            .field("resolved_id", &self.resolved_id)
            .field("rejected_id", &self.rejected_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::Field;
    use crate::field_list::FieldList;
    use crate::field_list_core::SlotError;
    use crate::validator::{attach_validator, ListItem, ValidatorConfig};

    #[tokio::test]
    async fn test_resolves_with_next_submit() {
        let field = Field::new(7);
        let outcome = submit_outcome(&field);
        field.submit().unwrap();
        assert_eq!(outcome.await, Ok(7));
    }

    #[tokio::test]
    async fn test_rejects_with_errors() {
        let list = FieldList::new(String::new());
        list.append(String::new());
        attach_validator(
            &list,
            ValidatorConfig::new(|item: &ListItem<String>| !item.value.is_empty()),
        )
        .unwrap();

        let outcome = submit_outcome(&list);
        assert!(list.submit().is_err());
        let errors = outcome.await.unwrap_err();
        assert_eq!(
            errors,
            vec![SlotError {
                index: 0,
                id: None,
                error_messages: Vec::new(),
            }]
        );
    }

    #[tokio::test]
    async fn test_submit_from_another_task() {
        let field = Field::new("x".to_string());
        let outcome = submit_outcome(&field);
        let handle = field.clone();
        tokio::spawn(async move {
            let _ = handle.submit();
        })
        .await
        .unwrap();
        assert_eq!(outcome.await, Ok("x".to_string()));
    }

    #[tokio::test]
    async fn test_only_first_outcome_is_delivered() {
        let field = Field::new(1);
        let outcome = submit_outcome(&field);
        field.submit().unwrap();
        field.set_value(2);
        field.submit().unwrap();
        assert_eq!(outcome.await, Ok(1));
    }

    #[test]
    fn test_drop_disconnects_receivers() {
        let field = Field::new(1);
        let outcome = submit_outcome(&field);
        assert_eq!(field.resolved().receiver_count(), 1);
        assert_eq!(field.rejected().receiver_count(), 1);
        drop(outcome);
        assert_eq!(field.resolved().receiver_count(), 0);
        assert_eq!(field.rejected().receiver_count(), 0);
    }
}
