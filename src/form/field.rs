use std::collections::BTreeMap;
use std::ops::Deref;

use super::controller::{FieldUpdate, FormError, FormResult, FormUnits};
use super::list::ListField;
use super::path::{FieldLens, FieldName};
use super::validation::FieldErrors;
use crate::reactive::{Event, Store, StoreValue, Subscription};

/// A value shape a form can be built over.
///
/// Implemented by `#[derive(FormModel)]`; `Fields` mirrors the struct with one
/// field node per member, rooted at the lens `P`.
pub trait FormModel: StoreValue {
    type Fields<R, P>: Send + Sync
    where
        R: StoreValue,
        P: FieldLens<R, Value = Self>;

    fn build_fields<R, P>(graph: &mut FieldGraph<R>, at: P) -> FormResult<Self::Fields<R, P>>
    where
        R: StoreValue,
        P: FieldLens<R, Value = Self>;
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FieldKind {
    Leaf,
    List,
    Nested,
}

#[derive(Clone, Debug, Default)]
pub(crate) struct FieldRegistry {
    kinds: BTreeMap<FieldName, FieldKind>,
}

impl FieldRegistry {
    pub(crate) fn contains(&self, name: &FieldName) -> bool {
        self.kinds.contains_key(name)
    }

    pub(crate) fn kind(&self, name: &FieldName) -> Option<FieldKind> {
        self.kinds.get(name).copied()
    }

    /// Declared fields plus entries of declared lists, e.g. `tags[3]`.
    pub(crate) fn accepts(&self, name: &FieldName) -> bool {
        self.contains(name) || self.list_of(name).is_some()
    }

    /// The declared list an undeclared name is an entry of, e.g. `tags` for
    /// `tags[2].label`.
    pub(crate) fn list_of(&self, name: &FieldName) -> Option<&FieldName> {
        if self.contains(name) {
            return None;
        }
        self.kinds
            .iter()
            .find(|(list, kind)| **kind == FieldKind::List && name.index_under(list).is_some())
            .map(|(list, _)| list)
    }

    pub(crate) fn names(&self) -> impl Iterator<Item = &FieldName> {
        self.kinds.keys()
    }

    pub(crate) fn len(&self) -> usize {
        self.kinds.len()
    }
}

pub(crate) struct FieldGraphParts {
    pub(crate) registry: FieldRegistry,
    pub(crate) dirty_flags: Vec<Store<bool>>,
    pub(crate) touched_flags: Vec<Store<bool>>,
    pub(crate) focused_flags: Vec<Store<bool>>,
    pub(crate) wiring: Vec<Subscription>,
}

/// Builds the field nodes of one form. Handed to [`FormModel::build_fields`]
/// while the form is constructed.
pub struct FieldGraph<R: StoreValue> {
    units: FormUnits<R>,
    initial: R,
    registry: FieldRegistry,
    dirty_flags: Vec<Store<bool>>,
    touched_flags: Vec<Store<bool>>,
    focused_flags: Vec<Store<bool>>,
    wiring: Vec<Subscription>,
}

impl<R: StoreValue> FieldGraph<R> {
    pub(crate) fn new(units: FormUnits<R>, initial: R) -> Self {
        Self {
            units,
            initial,
            registry: FieldRegistry::default(),
            dirty_flags: Vec::new(),
            touched_flags: Vec::new(),
            focused_flags: Vec::new(),
            wiring: Vec::new(),
        }
    }

    pub fn field<L>(&mut self, lens: L) -> FormResult<Field<R, L>>
    where
        L: FieldLens<R>,
    {
        self.declare(lens, FieldKind::Leaf)
    }

    pub fn list<L, E>(&mut self, lens: L) -> FormResult<ListField<R, L>>
    where
        L: FieldLens<R, Value = Vec<E>>,
        E: StoreValue,
    {
        Ok(ListField::new(self.declare(lens, FieldKind::List)?))
    }

    /// Declares `lens` as a field of its own and every member of `M` below it.
    pub fn nested<L, M>(&mut self, lens: L) -> FormResult<NestedField<R, L, M::Fields<R, L>>>
    where
        L: FieldLens<R, Value = M>,
        M: FormModel,
    {
        let field = self.declare(lens, FieldKind::Nested)?;
        let fields = M::build_fields(self, lens)?;
        Ok(NestedField { field, fields })
    }

    pub(crate) fn finish(mut self) -> FieldGraphParts {
        FieldGraphParts {
            registry: std::mem::take(&mut self.registry),
            dirty_flags: std::mem::take(&mut self.dirty_flags),
            touched_flags: std::mem::take(&mut self.touched_flags),
            focused_flags: std::mem::take(&mut self.focused_flags),
            wiring: std::mem::take(&mut self.wiring),
        }
    }

    fn declare<L>(&mut self, lens: L, kind: FieldKind) -> FormResult<Field<R, L>>
    where
        L: FieldLens<R>,
    {
        let name = lens.name();
        if name.is_root() {
            return Err(FormError::EmptyFieldName);
        }
        if !lens.is_present(&self.initial) {
            return Err(FormError::UnknownField(name));
        }
        if self.registry.contains(&name) {
            return Err(FormError::DuplicateField(name));
        }
        self.registry.kinds.insert(name.clone(), kind);

        let (field, wiring) = Field::wire(&self.units, lens, name, kind);
        self.dirty_flags.push(field.is_dirty.clone());
        self.touched_flags.push(field.is_touched.clone());
        self.focused_flags.push(field.is_focused.clone());
        self.wiring.extend(wiring);
        Ok(field)
    }
}

// A graph dropped before `finish` belongs to a form that failed to build.
impl<R: StoreValue> Drop for FieldGraph<R> {
    fn drop(&mut self) {
        for subscription in self.wiring.drain(..) {
            subscription.unsubscribe();
        }
    }
}

pub struct FieldEvents<V> {
    /// Writes the value without marking the field dirty.
    pub set: Event<V>,
    /// User edit; writes the value and marks the field dirty.
    pub change: Event<V>,
    /// Fires with the new value after any write to this exact name.
    pub changed: Event<V>,
    pub blur: Event<()>,
    pub focus: Event<()>,
}

impl<V> Clone for FieldEvents<V> {
    fn clone(&self) -> Self {
        Self {
            set: self.set.clone(),
            change: self.change.clone(),
            changed: self.changed.clone(),
            blur: self.blur.clone(),
            focus: self.focus.clone(),
        }
    }
}

/// One path of a form's values.
///
/// All stores are projections of the form stores; the field owns no state of
/// its own.
pub struct Field<R: StoreValue, L: FieldLens<R>> {
    lens: L,
    name: FieldName,
    units: FormUnits<R>,
    value: Store<L::Value>,
    is_dirty: Store<bool>,
    is_touched: Store<bool>,
    is_focused: Store<bool>,
    errors: Store<Option<FieldErrors>>,
    external_errors: Store<Option<FieldErrors>>,
    events: FieldEvents<L::Value>,
}

impl<R: StoreValue, L: FieldLens<R>> Clone for Field<R, L> {
    fn clone(&self) -> Self {
        Self {
            lens: self.lens,
            name: self.name.clone(),
            units: self.units.clone(),
            value: self.value.clone(),
            is_dirty: self.is_dirty.clone(),
            is_touched: self.is_touched.clone(),
            is_focused: self.is_focused.clone(),
            errors: self.errors.clone(),
            external_errors: self.external_errors.clone(),
            events: self.events.clone(),
        }
    }
}

impl<R: StoreValue, L: FieldLens<R>> Field<R, L> {
    fn wire(
        units: &FormUnits<R>,
        lens: L,
        name: FieldName,
        kind: FieldKind,
    ) -> (Self, Vec<Subscription>) {
        let stores = &units.stores;
        let value = stores.values.map(move |values| lens.get(values).clone());
        let is_dirty = {
            let name = name.clone();
            stores.dirty.map(move |dirty| dirty.contains(&name))
        };
        let is_touched = {
            let name = name.clone();
            stores.touched.map(move |touched| touched.contains(&name))
        };
        // A list is focused while one of its entries is.
        let is_focused = {
            let name = name.clone();
            stores.focused.map(move |focused| match focused {
                Some(focused) if kind == FieldKind::List => name.contains(focused),
                Some(focused) => *focused == name,
                None => false,
            })
        };
        let errors = {
            let name = name.clone();
            stores.errors.map(move |errors| errors.get(&name).cloned())
        };
        let external_errors = {
            let name = name.clone();
            stores
                .external_errors
                .map(move |errors| errors.get(&name).cloned())
        };
        let events = FieldEvents {
            set: Event::new(),
            change: Event::new(),
            changed: Event::new(),
            blur: Event::new(),
            focus: Event::new(),
        };

        let mut wiring = Vec::with_capacity(5);
        {
            let set = units.events.set.clone();
            wiring.push(
                events
                    .set
                    .on(move |next: &L::Value| set.emit(FieldUpdate::new(lens, next.clone()))),
            );
        }
        {
            let change = units.events.change.clone();
            wiring.push(
                events
                    .change
                    .on(move |next: &L::Value| change.emit(FieldUpdate::new(lens, next.clone()))),
            );
        }
        {
            let blur = units.events.blur.clone();
            let name = name.clone();
            wiring.push(events.blur.on(move |_| blur.emit(name.clone())));
        }
        {
            let focus = units.events.focus.clone();
            let name = name.clone();
            wiring.push(events.focus.on(move |_| focus.emit(name.clone())));
        }
        {
            let changed = events.changed.clone();
            let value = value.clone();
            let name = name.clone();
            wiring.push(units.events.changed.on(move |changed_name: &FieldName| {
                if *changed_name == name {
                    changed.emit(value.get());
                }
            }));
        }

        let field = Self {
            lens,
            name,
            units: units.clone(),
            value,
            is_dirty,
            is_touched,
            is_focused,
            errors,
            external_errors,
            events,
        };
        (field, wiring)
    }

    pub fn name(&self) -> &FieldName {
        &self.name
    }

    pub fn lens(&self) -> L {
        self.lens
    }

    pub fn get(&self) -> L::Value {
        self.value.get()
    }

    pub fn value(&self) -> &Store<L::Value> {
        &self.value
    }

    pub fn is_dirty(&self) -> &Store<bool> {
        &self.is_dirty
    }

    pub fn is_touched(&self) -> &Store<bool> {
        &self.is_touched
    }

    pub fn is_focused(&self) -> &Store<bool> {
        &self.is_focused
    }

    pub fn errors(&self) -> &Store<Option<FieldErrors>> {
        &self.errors
    }

    pub fn external_errors(&self) -> &Store<Option<FieldErrors>> {
        &self.external_errors
    }

    pub fn events(&self) -> &FieldEvents<L::Value> {
        &self.events
    }

    pub fn set(&self, value: L::Value) {
        self.events.set.emit(value);
    }

    pub fn change(&self, value: L::Value) {
        self.events.change.emit(value);
    }

    pub fn blur(&self) {
        self.events.blur.emit(());
    }

    pub fn focus(&self) {
        self.events.focus.emit(());
    }

    pub(crate) fn units(&self) -> &FormUnits<R> {
        &self.units
    }
}

impl<R, L> std::fmt::Debug for Field<R, L>
where
    R: StoreValue,
    L: FieldLens<R>,
    L::Value: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.name)
            .field("value", &self.value)
            .finish_non_exhaustive()
    }
}

/// A struct-valued field: a field of the whole object that also derefs to
/// the child field tree.
pub struct NestedField<R: StoreValue, L: FieldLens<R>, F> {
    field: Field<R, L>,
    fields: F,
}

impl<R: StoreValue, L: FieldLens<R>, F: Clone> Clone for NestedField<R, L, F> {
    fn clone(&self) -> Self {
        Self {
            field: self.field.clone(),
            fields: self.fields.clone(),
        }
    }
}

impl<R: StoreValue, L: FieldLens<R>, F> NestedField<R, L, F> {
    pub fn field(&self) -> &Field<R, L> {
        &self.field
    }

    pub fn fields(&self) -> &F {
        &self.fields
    }
}

impl<R: StoreValue, L: FieldLens<R>, F> Deref for NestedField<R, L, F> {
    type Target = F;

    fn deref(&self) -> &F {
        &self.fields
    }
}
