//! # formunit-signals
//!
//! Reactive substrate for formunit. Every form unit is built from three
//! primitives provided here:
//!
//! - [`Signal`] - a one-shot event channel with named receivers
//! - [`Store`] - an observable value container, with derived stores via
//!   [`Store::map`], [`Store::combine`] and [`Store::combine_all`]
//! - [`batch`] - a transaction that coalesces store notifications so that
//!   observers only ever see the state after a whole operation
//!
//! There is no global scheduler: every signal and store is an independent
//! instance, and batching is tracked per thread.
//!
//! ## Usage
//!
//! ```
//! use formunit_signals::{batch, Store};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! let name = Store::new(String::new());
//! let is_empty = name.map(|name: &String| name.is_empty());
//!
//! let notified = Arc::new(AtomicUsize::new(0));
//! let counter = notified.clone();
//! name.watch("count", Arc::new(move |_: &String| {
//!     counter.fetch_add(1, Ordering::SeqCst);
//! }));
//!
//! batch(|| {
//!     name.set("a".to_string());
//!     name.set("ab".to_string());
//! });
//!
//! assert_eq!(notified.load(Ordering::SeqCst), 1);
//! assert!(!is_empty.get());
//! ```

mod batch;
mod signal;
mod store;

pub use batch::{batch, is_batching};
pub use signal::{Signal, SignalReceiver};
pub use store::Store;
