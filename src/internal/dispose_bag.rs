//! Internal disposal bag: the per-scope disposal tracker.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::traits::Dispose;

struct Tracked {
    name: &'static str,
    item: Arc<dyn Dispose>,
}

/// Append-only log of disposable resources, consulted only at close time.
///
/// Items are disposed in LIFO order (last tracked, first disposed).
#[derive(Default)]
pub(crate) struct DisposeBag {
    items: Vec<Tracked>,
}

impl DisposeBag {
    /// Records a disposable resource built by the owning scope.
    pub(crate) fn push(&mut self, name: &'static str, item: Arc<dyn Dispose>) {
        self.items.push(Tracked { name, item });
    }

    /// Check if the bag is empty (no disposers registered).
    pub(crate) fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }

    /// Disposes every item in reverse order, continuing past failures.
    ///
    /// Returns the number of disposers that panicked.
    pub(crate) fn run_all_reverse(&mut self) -> usize {
        let mut failures = 0;
        while let Some(tracked) = self.items.pop() {
            let item = tracked.item;
            if catch_unwind(AssertUnwindSafe(|| item.dispose())).is_err() {
                failures += 1;
                tracing::error!(service = tracked.name, "dispose panicked, continuing teardown");
            }
        }
        failures
    }
}
