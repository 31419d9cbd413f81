use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use gpui::SharedString;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use super::config::FormConfig;
use super::field::{FieldGraph, FieldGraphParts, FieldKind, FieldRegistry, FormModel};
use super::path::{FieldLens, FieldName, RootLens};
use super::validation::{ErrorMap, FieldErrors, ValidationError, Validators, wire_validation};
use crate::reactive::{Event, Store, StoreValue, Subscription};

static FORM_ID_ALLOCATOR: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FormId(pub u64);

impl FormId {
    pub fn next() -> Self {
        Self(FORM_ID_ALLOCATOR.fetch_add(1, Ordering::SeqCst))
    }
}

impl Display for FormId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "form-{}", self.0)
    }
}

pub type NameSet = BTreeSet<FieldName>;

#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum FormError {
    #[error("field `{0}` is not present in the form values")]
    UnknownField(FieldName),
    #[error("field `{0}` is declared more than once")]
    DuplicateField(FieldName),
    #[error("a field lens resolved to the form root")]
    EmptyFieldName,
    #[error("patch could not be applied: {0}")]
    InvalidPatch(String),
    #[error("external errors could not be read: {0}")]
    InvalidExternalErrors(String),
    #[error("form state lock poisoned while {0}")]
    StatePoisoned(&'static str),
    #[error("failed to load draft: {0}")]
    DraftLoadFailed(String),
    #[error("failed to save draft: {0}")]
    DraftSaveFailed(String),
    #[error("failed to clear draft: {0}")]
    DraftClearFailed(String),
}

pub type FormResult<T> = Result<T, FormError>;

/// A write of one field value, addressed by the field's lens.
pub struct FieldUpdate<T> {
    name: FieldName,
    apply: Arc<dyn Fn(&mut T) + Send + Sync>,
}

impl<T> FieldUpdate<T> {
    pub fn new<L>(lens: L, value: L::Value) -> Self
    where
        L: FieldLens<T>,
    {
        Self {
            name: lens.name(),
            apply: Arc::new(move |model: &mut T| lens.set(model, value.clone())),
        }
    }

    /// Update addressed by name only, such as an entry of a list field.
    pub(crate) fn from_fn(name: FieldName, apply: impl Fn(&mut T) + Send + Sync + 'static) -> Self {
        Self {
            name,
            apply: Arc::new(apply),
        }
    }

    pub fn name(&self) -> &FieldName {
        &self.name
    }

    pub(crate) fn apply(&self, model: &mut T) {
        (self.apply)(model);
    }
}

impl<T> Clone for FieldUpdate<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            apply: self.apply.clone(),
        }
    }
}

impl<T> std::fmt::Debug for FieldUpdate<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldUpdate")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// A partial values tree, deep-merged into the form values when the
/// [`FormEvents::patch`] event is handled.
pub struct Patch<T> {
    partial: Arc<Value>,
    merge: fn(&T, &Value) -> FormResult<T>,
}

impl<T> Patch<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(partial: Value) -> Self {
        Self {
            partial: Arc::new(partial),
            merge: merge_into::<T>,
        }
    }
}

impl<T> Patch<T> {
    pub fn partial(&self) -> &Value {
        &self.partial
    }

    pub(crate) fn apply(&self, values: &T) -> FormResult<T> {
        (self.merge)(values, &self.partial)
    }
}

impl<T> Clone for Patch<T> {
    fn clone(&self) -> Self {
        Self {
            partial: self.partial.clone(),
            merge: self.merge,
        }
    }
}

impl<T> std::fmt::Debug for Patch<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Patch")
            .field("partial", &self.partial)
            .finish_non_exhaustive()
    }
}

/// Payload of [`FormEvents::rejected`].
#[derive(Clone, Debug, PartialEq)]
pub struct Rejection<T> {
    pub values: T,
    pub errors: ErrorMap,
}

/// Form-level state. `values` is the only store commands write directly;
/// field stores are projections of these.
pub struct FormStores<T: StoreValue> {
    pub values: Store<T>,
    pub initial_values: Store<T>,
    pub focused: Store<Option<FieldName>>,
    pub is_disabled: Store<bool>,
    pub submit_count: Store<u32>,
    pub dirty: Store<NameSet>,
    pub touched: Store<NameSet>,
    pub errors: Store<ErrorMap>,
    pub external_errors: Store<ErrorMap>,
}

impl<T: StoreValue> Clone for FormStores<T> {
    fn clone(&self) -> Self {
        Self {
            values: self.values.clone(),
            initial_values: self.initial_values.clone(),
            focused: self.focused.clone(),
            is_disabled: self.is_disabled.clone(),
            submit_count: self.submit_count.clone(),
            dirty: self.dirty.clone(),
            touched: self.touched.clone(),
            errors: self.errors.clone(),
            external_errors: self.external_errors.clone(),
        }
    }
}

pub struct FormEvents<T: StoreValue> {
    pub submitted: Event<T>,
    pub rejected: Event<Rejection<T>>,
    pub changed: Event<FieldName>,
    pub blur: Event<FieldName>,
    pub focus: Event<FieldName>,
    pub put: Event<T>,
    pub reset: Event<Option<T>>,
    pub patch: Event<Patch<T>>,
    pub set: Event<FieldUpdate<T>>,
    pub change: Event<FieldUpdate<T>>,
    pub submit: Event<()>,
    pub validate: Event<()>,
    pub revalidate: Event<()>,
}

impl<T: StoreValue> Clone for FormEvents<T> {
    fn clone(&self) -> Self {
        Self {
            submitted: self.submitted.clone(),
            rejected: self.rejected.clone(),
            changed: self.changed.clone(),
            blur: self.blur.clone(),
            focus: self.focus.clone(),
            put: self.put.clone(),
            reset: self.reset.clone(),
            patch: self.patch.clone(),
            set: self.set.clone(),
            change: self.change.clone(),
            submit: self.submit.clone(),
            validate: self.validate.clone(),
            revalidate: self.revalidate.clone(),
        }
    }
}

/// Everything a field node or a binding hook needs to reach its form.
pub(crate) struct FormUnits<T: StoreValue> {
    pub(crate) id: FormId,
    pub(crate) config: Arc<FormConfig>,
    pub(crate) stores: FormStores<T>,
    pub(crate) events: FormEvents<T>,
}

impl<T: StoreValue> Clone for FormUnits<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            config: self.config.clone(),
            stores: self.stores.clone(),
            events: self.events.clone(),
        }
    }
}

impl<T: StoreValue> FormUnits<T> {
    fn new(initial: T, config: FormConfig) -> Self {
        Self {
            id: FormId::next(),
            config: Arc::new(config),
            stores: FormStores {
                values: Store::new(initial.clone()),
                initial_values: Store::new(initial),
                focused: Store::new(None),
                is_disabled: Store::new(false),
                submit_count: Store::new(0),
                dirty: Store::new(NameSet::new()),
                touched: Store::new(NameSet::new()),
                errors: Store::new(ErrorMap::new()),
                external_errors: Store::new(ErrorMap::new()),
            },
            events: FormEvents {
                submitted: Event::new(),
                rejected: Event::new(),
                changed: Event::new(),
                blur: Event::new(),
                focus: Event::new(),
                put: Event::new(),
                reset: Event::new(),
                patch: Event::new(),
                set: Event::new(),
                change: Event::new(),
                submit: Event::new(),
                validate: Event::new(),
                revalidate: Event::new(),
            },
        }
    }
}

struct Aggregates {
    is_dirty: Store<bool>,
    is_touched: Store<bool>,
    is_focused: Store<bool>,
    is_valid: Store<bool>,
    is_submitted: Store<bool>,
}

pub(super) struct FormInner<T: FormModel> {
    pub(super) units: FormUnits<T>,
    pub(super) fields: T::Fields<T, RootLens>,
    pub(super) registry: Arc<FieldRegistry>,
    pub(super) validators: Arc<RwLock<Validators<T>>>,
    pub(super) submit_tickets: Arc<AtomicU64>,
    aggregates: Aggregates,
    wiring: Vec<Subscription>,
}

impl<T: FormModel> Drop for FormInner<T> {
    fn drop(&mut self) {
        for subscription in self.wiring.drain(..) {
            subscription.unsubscribe();
        }
    }
}

/// A form over the values model `T`.
///
/// Cheap to clone; clones share the same graph.
pub struct Form<T: FormModel> {
    pub(super) inner: Arc<FormInner<T>>,
}

impl<T: FormModel> Clone for Form<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: FormModel> Form<T> {
    pub fn new(initial: T, config: FormConfig) -> FormResult<Self> {
        let units = FormUnits::new(initial.clone(), config);
        let mut graph = FieldGraph::new(units.clone(), initial);
        let fields = T::build_fields(&mut graph, RootLens)?;
        let FieldGraphParts {
            registry,
            dirty_flags,
            touched_flags,
            focused_flags,
            mut wiring,
        } = graph.finish();

        let aggregates = Aggregates {
            is_dirty: Store::combine_all(&dirty_flags, any_flag),
            is_touched: Store::combine_all(&touched_flags, any_flag),
            is_focused: Store::combine_all(&focused_flags, any_flag),
            is_valid: Store::combine(
                &units.stores.errors,
                &units.stores.external_errors,
                |errors, external| errors.is_empty() && external.is_empty(),
            ),
            is_submitted: units.stores.submit_count.map(|count| *count > 0),
        };

        let registry = Arc::new(registry);
        let validators = Arc::new(RwLock::new(Validators::default()));
        let submit_tickets = Arc::new(AtomicU64::new(0));
        wiring.extend(wire_commands(&units, &registry, &submit_tickets));
        wiring.extend(wire_validation(&units, &validators, &submit_tickets));

        tracing::debug!(form = %units.id, fields = registry.len(), "form created");
        Ok(Self {
            inner: Arc::new(FormInner {
                units,
                fields,
                registry,
                validators,
                submit_tickets,
                aggregates,
                wiring,
            }),
        })
    }

    pub fn id(&self) -> FormId {
        self.inner.units.id
    }

    pub fn config(&self) -> &FormConfig {
        &self.inner.units.config
    }

    /// Field tree mirroring the shape of `T`.
    pub fn fields(&self) -> &T::Fields<T, RootLens> {
        &self.inner.fields
    }

    pub fn field_names(&self) -> impl Iterator<Item = &FieldName> {
        self.inner.registry.names()
    }

    pub fn field_kind(&self, name: &FieldName) -> Option<FieldKind> {
        self.inner.registry.kind(name)
    }

    pub fn stores(&self) -> &FormStores<T> {
        &self.inner.units.stores
    }

    pub fn events(&self) -> &FormEvents<T> {
        &self.inner.units.events
    }

    pub fn values(&self) -> T {
        self.inner.units.stores.values.get()
    }

    pub fn is_dirty(&self) -> &Store<bool> {
        &self.inner.aggregates.is_dirty
    }

    pub fn is_touched(&self) -> &Store<bool> {
        &self.inner.aggregates.is_touched
    }

    pub fn is_focused(&self) -> &Store<bool> {
        &self.inner.aggregates.is_focused
    }

    pub fn is_valid(&self) -> &Store<bool> {
        &self.inner.aggregates.is_valid
    }

    pub fn is_submitted(&self) -> &Store<bool> {
        &self.inner.aggregates.is_submitted
    }

    /// Programmatic write; the field does not become dirty. Entries of list
    /// fields, such as `tags[1]`, are addressable too.
    pub fn set<L>(&self, lens: L, value: L::Value) -> FormResult<()>
    where
        L: FieldLens<T>,
    {
        self.ensure_accepted(&lens.name())?;
        self.events().set.emit(FieldUpdate::new(lens, value));
        Ok(())
    }

    /// User-originated write; marks the field dirty. Changing a list entry
    /// also marks its list dirty.
    pub fn change<L>(&self, lens: L, value: L::Value) -> FormResult<()>
    where
        L: FieldLens<T>,
    {
        self.ensure_accepted(&lens.name())?;
        self.events().change.emit(FieldUpdate::new(lens, value));
        Ok(())
    }

    pub fn put(&self, values: T) {
        self.events().put.emit(values);
    }

    pub fn reset(&self) {
        self.events().reset.emit(None);
    }

    /// Resets to `values`, which also become the new initial snapshot.
    pub fn reset_to(&self, values: T) {
        self.events().reset.emit(Some(values));
    }

    /// Deep-merges `partial` into the current values. Objects merge key by
    /// key; arrays and scalars replace.
    pub fn patch(&self, partial: Value) -> FormResult<()>
    where
        T: Serialize + DeserializeOwned,
    {
        let patch = Patch::new(partial);
        self.stores().values.with(|values| patch.apply(values))?;
        self.events().patch.emit(patch);
        Ok(())
    }

    pub fn submit(&self) {
        self.events().submit.emit(());
    }

    /// Validation pass that counts as a submit attempt without emitting
    /// `submitted` or `rejected`.
    pub fn validate(&self) {
        self.events().validate.emit(());
    }

    /// Replaces the external errors. Names must belong to a declared field or
    /// to an entry of a declared list field.
    pub fn set_external_errors(&self, errors: ErrorMap) -> FormResult<()> {
        if let Some(name) = errors
            .keys()
            .find(|name| !self.inner.registry.accepts(name))
        {
            return Err(FormError::UnknownField(name.clone()));
        }
        self.stores().external_errors.set(errors);
        Ok(())
    }

    /// Replaces the external errors from a tree shaped like the values, e.g.
    /// `{"address": {"city": {"taken": ".."}}, "tags": [null, {"blank": ".."}]}`.
    ///
    /// An object whose members are all strings is one field's rule-to-message
    /// map; keys may also be full names such as `"address.city"`.
    pub fn set_external_errors_tree(&self, tree: Value) -> FormResult<()> {
        let mut errors = ErrorMap::new();
        flatten_errors(&FieldName::root(), tree, &mut errors)?;
        self.set_external_errors(errors)
    }

    pub fn clear_external_errors(&self) {
        self.stores().external_errors.set(ErrorMap::new());
    }

    pub fn set_disabled(&self, disabled: bool) {
        self.stores().is_disabled.set(disabled);
    }

    pub(super) fn ensure_field(&self, name: &FieldName) -> FormResult<()> {
        if self.inner.registry.contains(name) {
            Ok(())
        } else {
            Err(FormError::UnknownField(name.clone()))
        }
    }

    fn ensure_accepted(&self, name: &FieldName) -> FormResult<()> {
        if self.inner.registry.accepts(name) {
            Ok(())
        } else {
            Err(FormError::UnknownField(name.clone()))
        }
    }

    pub(crate) fn units(&self) -> &FormUnits<T> {
        &self.inner.units
    }
}

fn any_flag(flags: &[bool]) -> bool {
    flags.iter().any(|flag| *flag)
}

fn merge_into<T>(values: &T, partial: &Value) -> FormResult<T>
where
    T: Serialize + DeserializeOwned,
{
    let mut merged =
        serde_json::to_value(values).map_err(|error| FormError::InvalidPatch(error.to_string()))?;
    merge_json(&mut merged, partial.clone());
    serde_json::from_value::<T>(merged).map_err(|error| FormError::InvalidPatch(error.to_string()))
}

fn flatten_errors(at: &FieldName, node: Value, out: &mut ErrorMap) -> FormResult<()> {
    match node {
        Value::Null => Ok(()),
        Value::Object(members)
            if !at.is_root() && !members.is_empty() && members.values().all(Value::is_string) =>
        {
            let errors = members
                .into_iter()
                .filter_map(|(rule, message)| match message {
                    Value::String(message) => Some((
                        SharedString::from(rule.clone()),
                        ValidationError::new(rule, message),
                    )),
                    _ => None,
                })
                .collect::<FieldErrors>();
            out.insert(at.clone(), errors);
            Ok(())
        }
        Value::Object(members) => {
            for (key, child) in members {
                flatten_errors(&at.join(&FieldName::from(key)), child, out)?;
            }
            Ok(())
        }
        Value::Array(items) => {
            for (index, child) in items.into_iter().enumerate() {
                flatten_errors(&at.index(index), child, out)?;
            }
            Ok(())
        }
        other => Err(FormError::InvalidExternalErrors(format!(
            "`{at}` holds {other}; expected an object of messages"
        ))),
    }
}

fn merge_json(target: &mut Value, patch: Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (key, value) in patch {
                match target.get_mut(&key) {
                    Some(existing) => merge_json(existing, value),
                    None => {
                        target.insert(key, value);
                    }
                }
            }
        }
        (target, patch) => *target = patch,
    }
}

fn wire_commands<T: StoreValue>(
    units: &FormUnits<T>,
    registry: &Arc<FieldRegistry>,
    tickets: &Arc<AtomicU64>,
) -> Vec<Subscription> {
    let mut wiring = Vec::new();

    {
        let units = units.clone();
        let registry = registry.clone();
        wiring.push(units.events.set.clone().on(move |update: &FieldUpdate<T>| {
            if !registry.accepts(update.name()) {
                tracing::warn!(form = %units.id, field = %update.name(), "ignoring set for undeclared field");
                return;
            }
            units.stores.values.update(|values| update.apply(values));
            tracing::debug!(form = %units.id, field = %update.name(), "field set");
            units.events.changed.emit(update.name().clone());
        }));
    }

    {
        let units = units.clone();
        let registry = registry.clone();
        wiring.push(units.events.change.clone().on(move |update: &FieldUpdate<T>| {
            if !registry.accepts(update.name()) {
                tracing::warn!(form = %units.id, field = %update.name(), "ignoring change for undeclared field");
                return;
            }
            units.stores.values.update(|values| update.apply(values));
            units.stores.dirty.update(|dirty| {
                dirty.insert(update.name().clone());
                dirty.extend(registry.list_of(update.name()).cloned());
            });
            tracing::debug!(form = %units.id, field = %update.name(), "field changed");
            units.events.changed.emit(update.name().clone());
        }));
    }

    {
        let units = units.clone();
        let registry = registry.clone();
        wiring.push(units.events.blur.clone().on(move |name: &FieldName| {
            if !registry.accepts(name) {
                return;
            }
            units.stores.touched.update(|touched| {
                touched.insert(name.clone());
                touched.extend(registry.list_of(name).cloned());
            });
            if units.stores.focused.with(|focused| focused.as_ref() == Some(name)) {
                units.stores.focused.set(None);
            }
        }));
    }

    {
        let units = units.clone();
        let registry = registry.clone();
        wiring.push(units.events.focus.clone().on(move |name: &FieldName| {
            if registry.accepts(name) {
                units.stores.focused.set(Some(name.clone()));
            }
        }));
    }

    {
        let values = units.stores.values.clone();
        wiring.push(units.events.put.on(move |next: &T| values.set(next.clone())));
    }

    {
        let units = units.clone();
        wiring.push(units.events.patch.clone().on(move |patch: &Patch<T>| {
            match units.stores.values.with(|values| patch.apply(values)) {
                Ok(next) => units.stores.values.set(next),
                Err(error) => tracing::warn!(form = %units.id, %error, "ignoring patch"),
            }
        }));
    }

    {
        let units = units.clone();
        let tickets = tickets.clone();
        wiring.push(units.events.reset.clone().on(move |next: &Option<T>| {
            // A submit still awaiting async validators must not apply.
            tickets.fetch_add(1, Ordering::SeqCst);
            let stores = &units.stores;
            if let Some(next) = next {
                stores.initial_values.set(next.clone());
            }
            stores.values.set(stores.initial_values.get());
            stores.dirty.set(NameSet::new());
            stores.touched.set(NameSet::new());
            stores.submit_count.set(0);
            tracing::debug!(form = %units.id, "form reset");
        }));
    }

    wiring
}

pub(crate) fn read_lock<'a, T>(
    lock: &'a RwLock<T>,
    context: &'static str,
) -> FormResult<RwLockReadGuard<'a, T>> {
    lock.read().map_err(|_| FormError::StatePoisoned(context))
}

pub(crate) fn write_lock<'a, T>(
    lock: &'a RwLock<T>,
    context: &'static str,
) -> FormResult<RwLockWriteGuard<'a, T>> {
    lock.write().map_err(|_| FormError::StatePoisoned(context))
}
