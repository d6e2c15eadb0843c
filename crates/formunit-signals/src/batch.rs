//! Batched transactions.
//!
//! Store writes inside [`batch`] are visible immediately, but notifications
//! are deferred until the outermost batch ends. The flush then runs in two
//! phases:
//!
//! 1. Propagation: derived stores recompute from their sources, in rounds,
//!    until nothing changes any more.
//! 2. Delivery: every store that changed notifies its watchers once, with its
//!    final value, and only if that value differs from the one it held when
//!    the batch started.
//!
//! Watchers that write stores during delivery open another cycle of the same
//! flush.

use std::cell::RefCell;
use std::collections::HashSet;

type Notify = Box<dyn FnOnce()>;

#[derive(Default)]
struct BatchState {
    depth: usize,
    /// Stores whose dependents are queued to recompute in the current round.
    queued: HashSet<u64>,
    propagate: Vec<Notify>,
    /// Stores with a pending watcher notification in the current cycle.
    changed: HashSet<u64>,
    deliver: Vec<Notify>,
}

thread_local! {
    static BATCH: RefCell<BatchState> = RefCell::new(BatchState::default());
}

/// Runs `f` as a single transaction and returns its result.
///
/// Batches nest; only the outermost one flushes.
///
/// # Examples
///
/// ```
/// use formunit_signals::{batch, is_batching};
///
/// assert!(!is_batching());
/// let inside = batch(|| is_batching());
/// assert!(inside);
/// ```
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
    let guard = DepthGuard::enter();
    let result = f();
    drop(guard);
    result
}

/// Returns `true` while the current thread is inside a batch or draining one.
pub fn is_batching() -> bool {
    BATCH.with(|cell| cell.borrow().depth > 0)
}

/// Records a change of the store `store_id`.
///
/// `propagate` recomputes the store's dependents and is queued at most once
/// per round. `deliver` notifies the store's watchers and is queued at most
/// once per cycle; the first one queued wins, so it carries the value the
/// store held before the cycle. Outside a batch both run right away.
pub(crate) fn schedule(store_id: u64, propagate: Notify, deliver: Notify) {
    let run_now = BATCH.with(|cell| {
        let mut state = cell.borrow_mut();
        if state.depth == 0 {
            return Some((propagate, deliver));
        }
        if state.queued.insert(store_id) {
            state.propagate.push(propagate);
        }
        if state.changed.insert(store_id) {
            state.deliver.push(deliver);
        }
        None
    });
    if let Some((propagate, deliver)) = run_now {
        propagate();
        deliver();
    }
}

struct DepthGuard;

impl DepthGuard {
    fn enter() -> Self {
        BATCH.with(|cell| cell.borrow_mut().depth += 1);
        Self
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        let outermost = BATCH.with(|cell| {
            let mut state = cell.borrow_mut();
            state.depth -= 1;
            state.depth == 0
        });
        if outermost && !std::thread::panicking() {
            flush();
        }
    }
}

fn flush() {
    // Keep the batch open while draining so cascades coalesce.
    let _open = OpenGuard::enter();
    let mut cycles = 0usize;
    loop {
        let mut rounds = 0usize;
        loop {
            let pending = BATCH.with(|cell| {
                let mut state = cell.borrow_mut();
                state.queued.clear();
                std::mem::take(&mut state.propagate)
            });
            if pending.is_empty() {
                break;
            }
            rounds += 1;
            for notify in pending {
                notify();
            }
        }

        let deliver = BATCH.with(|cell| {
            let mut state = cell.borrow_mut();
            state.changed.clear();
            std::mem::take(&mut state.deliver)
        });
        if deliver.is_empty() {
            break;
        }
        cycles += 1;
        tracing::trace!("batch cycle {cycles}: {rounds} propagation round(s)");
        for notify in deliver {
            notify();
        }
    }
}

struct OpenGuard;

impl OpenGuard {
    fn enter() -> Self {
        BATCH.with(|cell| cell.borrow_mut().depth += 1);
        Self
    }
}

impl Drop for OpenGuard {
    fn drop(&mut self) {
        BATCH.with(|cell| {
            let mut state = cell.borrow_mut();
            state.depth -= 1;
            if std::thread::panicking() {
                state.queued.clear();
                state.propagate.clear();
                state.changed.clear();
                state.deliver.clear();
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    fn noop() -> Notify {
        Box::new(|| {})
    }

    #[test]
    fn test_schedule_outside_batch_runs_immediately() {
        let ran = Rc::new(RefCell::new(Vec::new()));
        let (first, second) = (ran.clone(), ran.clone());
        schedule(
            1,
            Box::new(move || first.borrow_mut().push("propagate")),
            Box::new(move || second.borrow_mut().push("deliver")),
        );
        assert_eq!(*ran.borrow(), vec!["propagate", "deliver"]);
    }

    #[test]
    fn test_schedule_inside_batch_is_deferred_and_deduplicated() {
        let runs = Rc::new(RefCell::new(0));
        batch(|| {
            for _ in 0..3 {
                let runs = runs.clone();
                schedule(7, noop(), Box::new(move || *runs.borrow_mut() += 1));
            }
            assert_eq!(*runs.borrow(), 0);
        });
        assert_eq!(*runs.borrow(), 1);
    }

    #[test]
    fn test_first_delivery_of_a_cycle_wins() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        batch(|| {
            for label in ["first", "second"] {
                let seen = seen.clone();
                schedule(8, noop(), Box::new(move || seen.borrow_mut().push(label)));
            }
        });
        assert_eq!(*seen.borrow(), vec!["first"]);
    }

    #[test]
    fn test_nested_batches_flush_once_at_the_end() {
        let runs = Rc::new(RefCell::new(0));
        batch(|| {
            batch(|| {
                let runs = runs.clone();
                schedule(9, noop(), Box::new(move || *runs.borrow_mut() += 1));
            });
            assert_eq!(*runs.borrow(), 0);
        });
        assert_eq!(*runs.borrow(), 1);
        assert!(!is_batching());
    }

    #[test]
    fn test_propagation_settles_before_delivery() {
        let order = Rc::new(RefCell::new(Vec::new()));
        let outer = order.clone();
        let delivered = order.clone();
        batch(|| {
            schedule(
                11,
                Box::new(move || {
                    outer.borrow_mut().push("propagate 11");
                    let inner = outer.clone();
                    let late = outer.clone();
                    schedule(
                        12,
                        Box::new(move || inner.borrow_mut().push("propagate 12")),
                        Box::new(move || late.borrow_mut().push("deliver 12")),
                    );
                    assert!(is_batching());
                }),
                Box::new(move || delivered.borrow_mut().push("deliver 11")),
            );
        });
        assert_eq!(
            *order.borrow(),
            vec!["propagate 11", "propagate 12", "deliver 11", "deliver 12"]
        );
    }

    #[test]
    fn test_writes_during_delivery_start_another_cycle() {
        let order = Rc::new(RefCell::new(Vec::new()));
        let outer = order.clone();
        batch(|| {
            schedule(
                13,
                noop(),
                Box::new(move || {
                    outer.borrow_mut().push("deliver 13");
                    let inner = outer.clone();
                    schedule(13, noop(), Box::new(move || inner.borrow_mut().push("again 13")));
                }),
            );
        });
        assert_eq!(*order.borrow(), vec!["deliver 13", "again 13"]);
    }
}
