use std::fmt;
use std::sync::{Arc, RwLock};

use super::batch::{batch, defer};
use super::{NodeId, Subscription, WatcherId, read, write};

type Handler<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct EventNode<T> {
    id: NodeId,
    handlers: RwLock<Vec<(WatcherId, Handler<T>)>>,
    watchers: RwLock<Vec<(WatcherId, Handler<T>)>>,
    // Handler on the source event of a derived event.
    upstream: RwLock<Option<Subscription>>,
}

impl<T> Drop for EventNode<T> {
    fn drop(&mut self) {
        let upstream = match self.upstream.get_mut() {
            Ok(upstream) => upstream.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(upstream) = upstream {
            upstream.unsubscribe();
        }
    }
}

/// A push-only signal carrying a payload.
///
/// Handlers attached with `on` are part of the graph and run synchronously in
/// registration order. Watchers run after the emitting batch settles, once per
/// emission.
pub struct Event<T> {
    node: Arc<EventNode<T>>,
}

impl<T> Clone for Event<T> {
    fn clone(&self) -> Self {
        Self {
            node: self.node.clone(),
        }
    }
}

impl<T> Default for Event<T>
where
    T: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Event<T>
where
    T: Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            node: Arc::new(EventNode {
                id: NodeId::next(),
                handlers: RwLock::new(Vec::new()),
                watchers: RwLock::new(Vec::new()),
                upstream: RwLock::new(None),
            }),
        }
    }

    pub fn id(&self) -> NodeId {
        self.node.id
    }

    pub fn emit(&self, payload: T) {
        batch(|| {
            let handlers = snapshot(&self.node.handlers);
            for handler in handlers {
                handler(&payload);
            }

            let watchers = snapshot(&self.node.watchers);
            if watchers.is_empty() {
                return;
            }
            let payload = Arc::new(payload);
            for watcher in watchers {
                let payload = payload.clone();
                defer(Arc::new(move || watcher(&payload)));
            }
        });
    }

    pub(crate) fn on(&self, handler: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        attach(&self.node, Slot::Handlers, Arc::new(handler))
    }

    pub fn watch(&self, f: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        attach(&self.node, Slot::Watchers, Arc::new(f))
    }

    /// Derived event that fires with `f(payload)` whenever `f` returns `Some`.
    ///
    /// The derived event detaches from `self` once its last handle is dropped.
    pub fn filter_map<U, F>(&self, f: F) -> Event<U>
    where
        U: Send + Sync + 'static,
        F: Fn(&T) -> Option<U> + Send + Sync + 'static,
    {
        let derived = Event::new();
        let target = Arc::downgrade(&derived.node);
        let upstream = self.on(move |payload| {
            let Some(node) = target.upgrade() else {
                return;
            };
            if let Some(mapped) = f(payload) {
                Event { node }.emit(mapped);
            }
        });
        *write(&derived.node.upstream) = Some(upstream);
        derived
    }

    pub fn map<U, F>(&self, f: F) -> Event<U>
    where
        U: Send + Sync + 'static,
        F: Fn(&T) -> U + Send + Sync + 'static,
    {
        self.filter_map(move |payload| Some(f(payload)))
    }
}

impl<T> fmt::Debug for Event<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event").field("id", &self.node.id).finish()
    }
}

fn snapshot<T>(list: &RwLock<Vec<(WatcherId, Handler<T>)>>) -> Vec<Handler<T>> {
    read(list)
        .iter()
        .map(|(_, handler)| handler.clone())
        .collect()
}

#[derive(Clone, Copy)]
enum Slot {
    Handlers,
    Watchers,
}

impl<T> EventNode<T> {
    fn slot(&self, slot: Slot) -> &RwLock<Vec<(WatcherId, Handler<T>)>> {
        match slot {
            Slot::Handlers => &self.handlers,
            Slot::Watchers => &self.watchers,
        }
    }
}

fn attach<T: Send + Sync + 'static>(
    node: &Arc<EventNode<T>>,
    slot: Slot,
    handler: Handler<T>,
) -> Subscription {
    let id = WatcherId::next();
    write(node.slot(slot)).push((id, handler));
    let node = Arc::downgrade(node);
    Subscription::new(move || {
        if let Some(node) = node.upgrade() {
            write(node.slot(slot)).retain(|(handler_id, _)| *handler_id != id);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Store;
    use std::sync::Mutex;

    #[test]
    fn handlers_run_in_registration_order() {
        let event = Event::<u8>::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let first = seen.clone();
        let second = seen.clone();
        let _a = event.on(move |n| first.lock().expect("seen").push(("first", *n)));
        let _b = event.on(move |n| second.lock().expect("seen").push(("second", *n)));
        event.emit(7);
        assert_eq!(
            *seen.lock().expect("seen"),
            vec![("first", 7), ("second", 7)]
        );
    }

    #[test]
    fn watchers_observe_state_written_after_emit() {
        let event = Event::<i32>::new();
        let total = Store::new(0);
        let observed = Arc::new(Mutex::new(Vec::new()));

        let sink = observed.clone();
        let reader = total.clone();
        let _watch = event.watch(move |n| sink.lock().expect("observed").push((*n, reader.get())));
        let writer = total.clone();
        let _handler = event.on(move |n| writer.update(|sum| *sum += *n));

        event.emit(5);
        assert_eq!(*observed.lock().expect("observed"), vec![(5, 5)]);
    }

    #[test]
    fn each_emission_reaches_watchers() {
        let event = Event::<&'static str>::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _watch = event.watch(move |name| sink.lock().expect("seen").push(*name));
        batch(|| {
            event.emit("a");
            event.emit("b");
        });
        assert_eq!(*seen.lock().expect("seen"), vec!["a", "b"]);
    }

    #[test]
    fn filter_map_forwards_matching_payloads() {
        let source = Event::<i32>::new();
        let evens = source.filter_map(|n| (n % 2 == 0).then_some(*n));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _watch = evens.watch(move |n| sink.lock().expect("seen").push(*n));
        for n in 1..=4 {
            source.emit(n);
        }
        assert_eq!(*seen.lock().expect("seen"), vec![2, 4]);
    }

    #[test]
    fn dropped_derived_events_detach_from_their_source() {
        let source = Event::<i32>::new();
        for _ in 0..100 {
            let _ = source.map(|n| n + 1);
        }
        assert!(read(&source.node.handlers).is_empty());

        let kept = source.map(|n| n * 2);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _watch = kept.watch(move |n| sink.lock().expect("seen").push(*n));
        source.emit(3);
        assert_eq!(read(&source.node.handlers).len(), 1);
        assert_eq!(*seen.lock().expect("seen"), vec![6]);

        drop(kept);
        assert!(read(&source.node.handlers).is_empty());
    }
}
