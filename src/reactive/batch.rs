use std::cell::RefCell;
use std::collections::BTreeSet;

use super::{NodeId, Notify};

#[derive(Default)]
struct BatchState {
    depth: usize,
    pending: Vec<Notify>,
    scheduled: BTreeSet<NodeId>,
}

thread_local! {
    static BATCH: RefCell<BatchState> = RefCell::new(BatchState::default());
}

struct DepthGuard;

impl Drop for DepthGuard {
    fn drop(&mut self) {
        BATCH.with(|batch| {
            let mut batch = batch.borrow_mut();
            batch.depth -= 1;
            if batch.depth == 0 {
                batch.pending.clear();
                batch.scheduled.clear();
            }
        });
    }
}

/// Runs `f` as one propagation unit.
///
/// Derived stores recompute while `f` runs; deferred watchers run once, after
/// the outermost batch on this thread finishes. Nested calls join the
/// enclosing batch.
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
    let outermost = BATCH.with(|batch| {
        let mut batch = batch.borrow_mut();
        batch.depth += 1;
        batch.depth == 1
    });
    let _guard = DepthGuard;

    let result = f();
    if outermost {
        flush();
    }
    result
}

/// Queues a store notification. A node is queued at most once per flush round.
pub(crate) fn schedule(node: NodeId, notify: &Notify) {
    let run_now = BATCH.with(|batch| {
        let mut batch = batch.borrow_mut();
        if batch.depth == 0 {
            return true;
        }
        if batch.scheduled.insert(node) {
            batch.pending.push(notify.clone());
        }
        false
    });
    if run_now {
        notify();
    }
}

/// Queues a one-off effect, such as delivering an event payload to a watcher.
pub(crate) fn defer(effect: Notify) {
    let run_now = BATCH.with(|batch| {
        let mut batch = batch.borrow_mut();
        if batch.depth == 0 {
            return true;
        }
        batch.pending.push(effect.clone());
        false
    });
    if run_now {
        effect();
    }
}

// Effects may write stores or emit events again; those land in the queue and
// are picked up by the next round.
fn flush() {
    loop {
        let pending = BATCH.with(|batch| {
            let mut batch = batch.borrow_mut();
            batch.scheduled.clear();
            std::mem::take(&mut batch.pending)
        });
        if pending.is_empty() {
            break;
        }
        for effect in pending {
            effect();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn effects_run_after_outermost_batch() {
        let runs = Arc::new(AtomicUsize::new(0));
        let observed = Arc::new(AtomicUsize::new(usize::MAX));
        batch(|| {
            let counter = runs.clone();
            defer(Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }));
            batch(|| {
                let counter = runs.clone();
                defer(Arc::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                }));
            });
            observed.store(runs.load(Ordering::SeqCst), Ordering::SeqCst);
        });
        assert_eq!(observed.load(Ordering::SeqCst), 0);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn scheduled_node_runs_once_per_round() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let notify: Notify = Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let node = NodeId::next();
        batch(|| {
            schedule(node, &notify);
            schedule(node, &notify);
        });
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn outside_a_batch_effects_run_immediately() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        defer(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }
}
