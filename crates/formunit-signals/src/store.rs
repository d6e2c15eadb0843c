//! Observable value containers.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::batch;
use crate::signal::{Signal, SignalReceiver};

static NEXT_STORE_ID: AtomicU64 = AtomicU64::new(0);

struct StoreInner<T: 'static> {
    id: u64,
    value: RwLock<T>,
    /// Recomputes derived stores. Runs during propagation.
    dependents: Signal<T>,
    /// User watchers. Run once per batch, after propagation has settled.
    changed: Signal<T>,
}

/// A shared, observable value.
///
/// `Store` is a cheap handle: clones refer to the same value. Writes that
/// leave the value unchanged (by `PartialEq`) do not notify watchers.
/// Every write runs as a [`batch`](crate::batch()): derived stores settle
/// first, then each changed store notifies once with its final value.
/// A store whose value ends the batch where it started does not notify.
///
/// # Examples
///
/// ```
/// use formunit_signals::Store;
///
/// let count = Store::new(1);
/// let doubled = count.map(|n: &i32| n * 2);
///
/// count.set(4);
/// assert_eq!(doubled.get(), 8);
/// ```
pub struct Store<T: 'static> {
    inner: Arc<StoreInner<T>>,
}

impl<T: 'static> Clone for Store<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug + 'static> fmt::Debug for Store<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = self.inner.value.read().expect("store lock poisoned");
        f.debug_struct("Store")
            .field("id", &self.inner.id)
            .field("value", &*value)
            .finish()
    }
}

impl<T: Default + Clone + PartialEq + Send + Sync + 'static> Default for Store<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: Clone + PartialEq + Send + Sync + 'static> Store<T> {
    /// Creates a store holding `value`.
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                id: NEXT_STORE_ID.fetch_add(1, Ordering::Relaxed),
                value: RwLock::new(value),
                dependents: Signal::new(),
                changed: Signal::new(),
            }),
        }
    }

    /// Returns a clone of the current value.
    pub fn get(&self) -> T {
        self.inner.value.read().expect("store lock poisoned").clone()
    }

    /// Reads the current value through `f` without cloning it.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.value.read().expect("store lock poisoned"))
    }

    /// Replaces the value. Returns `true` if it changed.
    pub fn set(&self, value: T) -> bool {
        self.update(|_| value)
    }

    /// Computes the next value from the current one. Returns `true` if it changed.
    ///
    /// `f` runs under the store's write lock and must not touch this store.
    pub fn update(&self, f: impl FnOnce(&T) -> T) -> bool {
        batch::batch(|| {
            let previous = {
                let mut value = self.inner.value.write().expect("store lock poisoned");
                let next = f(&value);
                if next == *value {
                    None
                } else {
                    Some(std::mem::replace(&mut *value, next))
                }
            };
            let changed = previous.is_some();
            if let Some(previous) = previous {
                self.notify(previous);
            }
            changed
        })
    }

    /// Registers a watcher under `id`, replacing any watcher with that id.
    /// Watchers are called with the new value after each change.
    pub fn watch(&self, id: impl Into<String>, watcher: SignalReceiver<T>) {
        self.inner.changed.connect(id, watcher);
    }

    /// Registers a watcher under a generated id and returns the id.
    pub fn subscribe(&self, watcher: SignalReceiver<T>) -> String {
        self.inner.changed.subscribe(watcher)
    }

    /// Removes the watcher registered under `id`.
    pub fn unwatch(&self, id: &str) -> bool {
        self.inner.changed.disconnect(id)
    }

    /// Number of registered watchers.
    pub fn watcher_count(&self) -> usize {
        self.inner.changed.receiver_count()
    }

    /// Returns `true` if both handles refer to the same store.
    pub fn same_store(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Derives a read-only view of this store.
    ///
    /// The derived store recomputes whenever this store changes and only
    /// notifies its own watchers when the mapped value actually differs.
    pub fn map<U, F>(&self, f: F) -> Store<U>
    where
        U: Clone + PartialEq + Send + Sync + 'static,
        F: Fn(&T) -> U + Send + Sync + 'static,
    {
        let derived = Store::new(self.with(&f));
        let target = derived.clone();
        self.inner.dependents.subscribe(Arc::new(move |value: &T| {
            target.set(f(value));
        }));
        derived
    }

    /// Derives a store from two sources.
    pub fn combine<U, R, F>(left: &Self, right: &Store<U>, f: F) -> Store<R>
    where
        U: Clone + PartialEq + Send + Sync + 'static,
        R: Clone + PartialEq + Send + Sync + 'static,
        F: Fn(&T, &U) -> R + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        let derived = Store::new(left.with(|l| right.with(|r| f(l, r))));

        let target = derived.clone();
        let other = right.clone();
        let compute = Arc::clone(&f);
        left.inner.dependents.subscribe(Arc::new(move |l: &T| {
            target.set(other.with(|r| compute(l, r)));
        }));

        let target = derived.clone();
        let other = left.clone();
        right.inner.dependents.subscribe(Arc::new(move |r: &U| {
            target.set(other.with(|l| f(l, r)));
        }));

        derived
    }

    /// Derives a store from any number of sources of the same type.
    pub fn combine_all<R, F>(sources: &[Self], f: F) -> Store<R>
    where
        R: Clone + PartialEq + Send + Sync + 'static,
        F: Fn(&[T]) -> R + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        let snapshot = |sources: &[Self]| sources.iter().map(Self::get).collect::<Vec<_>>();
        let derived = Store::new(f(&snapshot(sources)));

        for source in sources {
            let target = derived.clone();
            let all: Vec<Self> = sources.to_vec();
            let compute = Arc::clone(&f);
            source.inner.dependents.subscribe(Arc::new(move |_: &T| {
                target.set(compute(&snapshot(&all)));
            }));
        }

        derived
    }

    fn notify(&self, previous: T) {
        let propagate = Arc::downgrade(&self.inner);
        let deliver = Arc::downgrade(&self.inner);
        batch::schedule(
            self.inner.id,
            Box::new(move || {
                if let Some(inner) = propagate.upgrade() {
                    let value = inner.value.read().expect("store lock poisoned").clone();
                    inner.dependents.send(&value);
                }
            }),
            Box::new(move || {
                if let Some(inner) = deliver.upgrade() {
                    let value = inner.value.read().expect("store lock poisoned").clone();
                    if value != previous {
                        inner.changed.send(&value);
                    }
                }
            }),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::batch;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    fn counter<T: 'static>(store: &Store<T>) -> Arc<AtomicUsize>
    where
        T: Clone + PartialEq + Send + Sync,
    {
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        store.subscribe(Arc::new(move |_: &T| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        }));
        count
    }

    #[test]
    fn test_set_notifies_on_change_only() {
        let store = Store::new(1);
        let count = counter(&store);

        assert!(store.set(2));
        assert!(!store.set(2));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(store.get(), 2);
    }

    #[test]
    fn test_update_uses_current_value() {
        let store = Store::new(vec![1, 2]);
        store.update(|v| {
            let mut next = v.clone();
            next.push(3);
            next
        });
        assert_eq!(store.with(Vec::len), 3);
    }

    #[test]
    fn test_watch_receives_new_value() {
        let store = Store::new("a".to_string());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        store.watch(
            "log",
            Arc::new(move |v: &String| seen_clone.lock().unwrap().push(v.clone())),
        );

        store.set("b".into());
        store.set("c".into());
        assert!(store.unwatch("log"));
        store.set("d".into());

        assert_eq!(*seen.lock().unwrap(), vec!["b", "c"]);
    }

    #[test]
    fn test_map_skips_equal_results() {
        let store = Store::new(1);
        let is_even = store.map(|n: &i32| n % 2 == 0);
        let count = counter(&is_even);

        store.set(3);
        assert_eq!(count.load(Ordering::SeqCst), 0);
        store.set(4);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(is_even.get());
    }

    #[test]
    fn test_combine() {
        let a = Store::new(false);
        let b = Store::new(false);
        let either = Store::combine(&a, &b, |a: &bool, b: &bool| *a || *b);

        assert!(!either.get());
        b.set(true);
        assert!(either.get());
        b.set(false);
        a.set(true);
        assert!(either.get());
    }

    #[test]
    fn test_combine_all() {
        let stores = vec![Store::new(1), Store::new(2), Store::new(3)];
        let sum = Store::combine_all(&stores, |values: &[i32]| values.iter().sum::<i32>());
        assert_eq!(sum.get(), 6);
        stores[1].set(10);
        assert_eq!(sum.get(), 14);
    }

    #[test]
    fn test_combine_all_empty() {
        let sum = Store::<i32>::combine_all(&[], |values: &[i32]| values.len());
        assert_eq!(sum.get(), 0);
    }

    #[test]
    fn test_batch_coalesces_derived_updates() {
        let a = Store::new(0);
        let b = Store::new(0);
        let total = Store::combine(&a, &b, |a: &i32, b: &i32| a + b);
        let count = counter(&total);

        batch(|| {
            a.set(1);
            b.set(2);
        });

        assert_eq!(total.get(), 3);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_batch_hides_transient_values() {
        let store = Store::new(0);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        store.subscribe(Arc::new(move |v: &i32| seen_clone.lock().unwrap().push(*v)));

        batch(|| {
            store.set(1);
            store.set(2);
            store.set(3);
        });

        assert_eq!(*seen.lock().unwrap(), vec![3]);
    }

    #[test]
    fn test_batch_skips_values_restored_before_the_end() {
        let store = Store::new(1);
        let count = counter(&store);

        batch(|| {
            store.set(2);
            store.set(1);
        });

        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_sources_at_different_depths_notify_once() {
        let source = Store::new(false);
        let shallow = source.map(|v: &bool| !*v);
        let deep = source.map(|v: &bool| *v).map(|v: &bool| *v);
        let either = Store::combine(&shallow, &deep, |a: &bool, b: &bool| *a || *b);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        either.subscribe(Arc::new(move |v: &bool| log.lock().unwrap().push(*v)));

        source.set(true);
        source.set(false);

        assert!(either.get());
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_derived_watchers_see_settled_sources() {
        let a = Store::new(1);
        let doubled = a.map(|v: &i32| v * 2);
        let observed = Arc::new(Mutex::new(Vec::new()));
        let log = observed.clone();
        let source = a.clone();
        doubled.subscribe(Arc::new(move |d: &i32| {
            log.lock().unwrap().push((source.get(), *d));
        }));

        a.set(5);

        assert_eq!(*observed.lock().unwrap(), vec![(5, 10)]);
    }

    #[test]
    fn test_derived_stores_are_not_watchers() {
        let store = Store::new(0);
        let _doubled = store.map(|v: &i32| v * 2);
        assert_eq!(store.watcher_count(), 0);
    }

    #[test]
    fn test_watcher_may_write_other_store() {
        let source = Store::new(0);
        let mirror = Store::new(0);
        let target = mirror.clone();
        source.subscribe(Arc::new(move |v: &i32| {
            target.set(*v * 10);
        }));

        source.set(2);
        assert_eq!(mirror.get(), 20);
    }

    #[test]
    fn test_clone_shares_value() {
        let a = Store::new(5);
        let b = a.clone();
        b.set(6);
        assert_eq!(a.get(), 6);
        assert!(a.same_store(&b));
        assert!(!a.same_store(&Store::new(6)));
    }
}
