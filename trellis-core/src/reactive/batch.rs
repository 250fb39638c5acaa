//! Batch / Notification Scheduler
//!
//! A batch is a synchronous window during which deferred notifications are
//! queued instead of delivered. When the outermost batch closes, the queue
//! is drained once, in the order callbacks were first scheduled.
//!
//! # Rules
//!
//! 1. Nested batches flatten into the outermost one.
//! 2. Scheduling the same subscriber twice within a window queues it once.
//! 3. The batching flag is cleared on every exit path, including a panic in
//!    the batch body, and the queue is still drained afterwards.
//! 4. Each queued callback runs under its own panic guard.
//!
//! Every notify pass in the graph opens a batch, so a single write marks all
//! affected computeds dirty before any effect runs.

use std::cell::{Cell, RefCell};

use indexmap::IndexMap;

use super::subscriber::{Subscriber, SubscriberId};

thread_local! {
    static BATCHING: Cell<bool> = const { Cell::new(false) };
    static PENDING: RefCell<IndexMap<SubscriberId, Subscriber>> = RefCell::new(IndexMap::new());
}

/// Run `f` inside a batch window and return its result.
///
/// Notifications scheduled while `f` runs are delivered once, after `f`
/// returns. Calling `batch` from inside a batch just runs `f`.
pub fn batch<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    if is_batching() {
        return f();
    }

    BATCHING.with(|flag| flag.set(true));
    let _window = BatchWindow;
    f()
}

/// Check whether a batch window is open on this thread.
pub fn is_batching() -> bool {
    BATCHING.with(Cell::get)
}

/// Queue a notification while batching, or deliver it right away.
pub fn schedule_notification(subscriber: Subscriber) {
    if is_batching() {
        PENDING.with(|pending| {
            pending
                .borrow_mut()
                .entry(subscriber.id())
                .or_insert(subscriber);
        });
    } else {
        subscriber.notify_guarded();
    }
}

/// Number of notifications waiting for the current window to close.
pub fn pending_count() -> usize {
    PENDING.with(|pending| pending.borrow().len())
}

/// Closes the batch window when dropped.
struct BatchWindow;

impl Drop for BatchWindow {
    fn drop(&mut self) {
        BATCHING.with(|flag| flag.set(false));
        drain();
    }
}

fn drain() {
    let queued = PENDING.with(|pending| std::mem::take(&mut *pending.borrow_mut()));
    if queued.is_empty() {
        return;
    }

    tracing::trace!(count = queued.len(), "draining batched notifications");
    for subscriber in queued.into_values() {
        subscriber.notify_guarded();
    }
}
