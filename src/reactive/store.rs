use std::fmt;
use std::sync::{Arc, RwLock, Weak};

use super::batch::{batch, schedule};
use super::{NodeId, Notify, Subscription, WatcherId, read, write};

/// Values a [`Store`] can hold.
pub trait StoreValue: Clone + PartialEq + Send + Sync + 'static {}

impl<T> StoreValue for T where T: Clone + PartialEq + Send + Sync + 'static {}

type Watcher<T> = Arc<dyn Fn(&T) + Send + Sync>;
// Returns false once the derived store it feeds has been dropped.
type Dependent = Arc<dyn Fn() -> bool + Send + Sync>;

struct StoreNode<T> {
    id: NodeId,
    value: RwLock<T>,
    // Value watchers last saw, kept only while a notification is pending.
    baseline: RwLock<Option<T>>,
    dependents: RwLock<Vec<Dependent>>,
    watchers: RwLock<Vec<(WatcherId, Watcher<T>)>>,
    notify: Notify,
}

impl<T: StoreValue> StoreNode<T> {
    fn replace(&self, value: T) {
        batch(|| {
            let previous = {
                let mut current = write(&self.value);
                if *current == value {
                    return;
                }
                std::mem::replace(&mut *current, value)
            };
            self.propagate(previous);
        });
    }

    fn propagate(&self, previous: T) {
        let dependents = read(&self.dependents).clone();
        let mut detached = Vec::new();
        for dependent in &dependents {
            if !dependent() {
                detached.push(dependent.clone());
            }
        }
        if !detached.is_empty() {
            write(&self.dependents)
                .retain(|dependent| !detached.iter().any(|dead| Arc::ptr_eq(dead, dependent)));
        }

        if read(&self.watchers).is_empty() {
            return;
        }
        {
            let mut baseline = write(&self.baseline);
            if baseline.is_none() {
                *baseline = Some(previous);
            }
        }
        schedule(self.id, &self.notify);
    }

    fn deliver(&self) {
        let baseline = write(&self.baseline).take();
        let current = read(&self.value).clone();
        if baseline.as_ref() == Some(&current) {
            return;
        }
        let watchers = read(&self.watchers)
            .iter()
            .map(|(_, watcher)| watcher.clone())
            .collect::<Vec<_>>();
        for watcher in watchers {
            watcher(&current);
        }
    }

    fn attach(&self, dependent: Dependent) {
        write(&self.dependents).push(dependent);
    }
}

/// A reactive cell.
///
/// Cloning a `Store` clones the handle; all clones share the value. Stores
/// created by [`Store::map`], [`Store::combine`] and [`Store::combine_all`] are
/// derived: they recompute synchronously whenever a source changes and have no
/// public setter.
pub struct Store<T: StoreValue> {
    node: Arc<StoreNode<T>>,
}

impl<T: StoreValue> Clone for Store<T> {
    fn clone(&self) -> Self {
        Self {
            node: self.node.clone(),
        }
    }
}

impl<T: StoreValue> Store<T> {
    pub(crate) fn new(value: T) -> Self {
        let node = Arc::new_cyclic(|weak: &Weak<StoreNode<T>>| {
            let weak = weak.clone();
            StoreNode {
                id: NodeId::next(),
                value: RwLock::new(value),
                baseline: RwLock::new(None),
                dependents: RwLock::new(Vec::new()),
                watchers: RwLock::new(Vec::new()),
                notify: Arc::new(move || {
                    if let Some(node) = weak.upgrade() {
                        node.deliver();
                    }
                }),
            }
        });
        Self { node }
    }

    pub fn id(&self) -> NodeId {
        self.node.id
    }

    pub fn get(&self) -> T {
        read(&self.node.value).clone()
    }

    /// Reads the value without cloning it.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&read(&self.node.value))
    }

    pub(crate) fn set(&self, value: T) {
        self.node.replace(value);
    }

    pub(crate) fn update(&self, f: impl FnOnce(&mut T)) {
        let mut next = self.get();
        f(&mut next);
        self.set(next);
    }

    pub fn map<U, F>(&self, f: F) -> Store<U>
    where
        U: StoreValue,
        F: Fn(&T) -> U + Send + Sync + 'static,
    {
        let derived = Store::new(self.with(&f));
        let source = Arc::downgrade(&self.node);
        let target = Arc::downgrade(&derived.node);
        self.node.attach(Arc::new(move || {
            let (Some(source), Some(target)) = (source.upgrade(), target.upgrade()) else {
                return false;
            };
            let next = f(&read(&source.value));
            target.replace(next);
            true
        }));
        derived
    }

    pub fn combine<B, U, F>(left: &Store<T>, right: &Store<B>, f: F) -> Store<U>
    where
        B: StoreValue,
        U: StoreValue,
        F: Fn(&T, &B) -> U + Send + Sync + 'static,
    {
        let initial = left.with(|l| right.with(|r| f(l, r)));
        let derived = Store::new(initial);
        let f = Arc::new(f);
        let left_source = Arc::downgrade(&left.node);
        let right_source = Arc::downgrade(&right.node);
        let target = Arc::downgrade(&derived.node);

        let recompute: Dependent = Arc::new(move || {
            let (Some(l), Some(r), Some(target)) = (
                left_source.upgrade(),
                right_source.upgrade(),
                target.upgrade(),
            ) else {
                return false;
            };
            let next = {
                let l = read(&l.value);
                let r = read(&r.value);
                f(&l, &r)
            };
            target.replace(next);
            true
        });
        left.node.attach(recompute.clone());
        right.node.attach(recompute);
        derived
    }

    /// Derives one store from any number of stores of the same type.
    pub fn combine_all<U, F>(stores: &[Store<T>], f: F) -> Store<U>
    where
        U: StoreValue,
        F: Fn(&[T]) -> U + Send + Sync + 'static,
    {
        let initial = f(&stores.iter().map(Store::get).collect::<Vec<_>>());
        let derived = Store::new(initial);
        let f = Arc::new(f);
        let sources = Arc::new(
            stores
                .iter()
                .map(|store| Arc::downgrade(&store.node))
                .collect::<Vec<_>>(),
        );
        let target = Arc::downgrade(&derived.node);

        let recompute: Dependent = Arc::new(move || {
            let Some(target) = target.upgrade() else {
                return false;
            };
            let mut values = Vec::with_capacity(sources.len());
            for source in sources.iter() {
                let Some(source) = source.upgrade() else {
                    return false;
                };
                values.push(read(&source.value).clone());
            }
            target.replace(f(&values));
            true
        });
        for store in stores {
            store.node.attach(recompute.clone());
        }
        derived
    }

    /// Calls `f` with the current value now and after every settled change.
    pub fn watch(&self, f: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        let watcher: Watcher<T> = Arc::new(f);
        let current = self.get();
        watcher(&current);
        self.register(watcher)
    }

    /// Calls `f` after every settled change, but not for the current value.
    pub fn subscribe(&self, f: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        self.register(Arc::new(f))
    }

    fn register(&self, watcher: Watcher<T>) -> Subscription {
        let id = WatcherId::next();
        write(&self.node.watchers).push((id, watcher));
        let node = Arc::downgrade(&self.node);
        Subscription::new(move || {
            if let Some(node) = node.upgrade() {
                write(&node.watchers).retain(|(watcher_id, _)| *watcher_id != id);
            }
        })
    }
}

impl<T: StoreValue + fmt::Debug> fmt::Debug for Store<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("id", &self.node.id)
            .field("value", &*read(&self.node.value))
            .finish()
    }
}
