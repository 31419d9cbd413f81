use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use gpui::{App, SharedString, Window};

use super::config::{FieldStatus, ValidateOn};
use super::controller::{Form, FormId, FormUnits};
use super::field::{Field, FormModel};
use super::path::{FieldLens, FieldName};
use super::validation::FieldErrors;
use crate::contracts::{Disableable, FieldLike};
use crate::reactive::{StoreValue, Subscription, batch, defer};

pub type Callback<A> = Arc<dyn Fn(A) + Send + Sync>;

type Invalidate = Arc<dyn Fn() + Send + Sync>;

/// Per-render read model of one field.
pub struct FieldBinding<V> {
    pub name: FieldName,
    pub value: V,
    pub dirty: bool,
    pub touched: bool,
    pub focused: bool,
    pub disabled: bool,
    pub errors: Option<FieldErrors>,
    pub external_errors: Option<FieldErrors>,
    /// The form was submitted at least once after the mount validation pass.
    pub submitted: bool,
    pub should_show_validation: bool,
    pub on_change: Callback<V>,
    pub on_blur: Callback<()>,
    pub on_focus: Callback<()>,
}

impl<V: Clone> Clone for FieldBinding<V> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            value: self.value.clone(),
            dirty: self.dirty,
            touched: self.touched,
            focused: self.focused,
            disabled: self.disabled,
            errors: self.errors.clone(),
            external_errors: self.external_errors.clone(),
            submitted: self.submitted,
            should_show_validation: self.should_show_validation,
            on_change: self.on_change.clone(),
            on_blur: self.on_blur.clone(),
            on_focus: self.on_focus.clone(),
        }
    }
}

impl<V: std::fmt::Debug> std::fmt::Debug for FieldBinding<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldBinding")
            .field("name", &self.name)
            .field("value", &self.value)
            .field("dirty", &self.dirty)
            .field("touched", &self.touched)
            .field("focused", &self.focused)
            .field("disabled", &self.disabled)
            .field("errors", &self.errors)
            .field("external_errors", &self.external_errors)
            .field("submitted", &self.submitted)
            .field("should_show_validation", &self.should_show_validation)
            .finish_non_exhaustive()
    }
}

impl<V> FieldBinding<V>
where
    V: Send + Sync + 'static,
{
    /// First message to show, external errors first. `None` while the
    /// visibility policy hides validation.
    pub fn visible_error(&self) -> Option<SharedString> {
        if !self.should_show_validation {
            return None;
        }
        self.external_errors
            .iter()
            .chain(self.errors.iter())
            .flat_map(|errors| errors.values())
            .map(|error| error.message.clone())
            .next()
    }

    pub fn present<C>(&self, component: C) -> C
    where
        C: FieldLike + Disableable,
    {
        let component = component.disabled(self.disabled);
        match self.visible_error() {
            Some(message) => component.error(message),
            None => component,
        }
    }

    pub fn change_listener(&self) -> impl Fn(V, &mut Window, &mut App) + 'static {
        let on_change = self.on_change.clone();
        move |value, _, _| on_change(value)
    }

    pub fn blur_listener(&self) -> impl Fn(&mut Window, &mut App) + 'static {
        let on_blur = self.on_blur.clone();
        move |_, _| on_blur(())
    }

    pub fn focus_listener(&self) -> impl Fn(&mut Window, &mut App) + 'static {
        let on_focus = self.on_focus.clone();
        move |_, _| on_focus(())
    }
}

struct FieldHandlers<V> {
    form: FormId,
    name: FieldName,
    on_change: Callback<V>,
    on_blur: Callback<()>,
    on_focus: Callback<()>,
}

impl<V: StoreValue> FieldHandlers<V> {
    fn new<R, L>(field: &Field<R, L>) -> Self
    where
        R: StoreValue,
        L: FieldLens<R, Value = V>,
    {
        let on_change: Callback<V> = {
            let field = field.clone();
            Arc::new(move |value: V| {
                batch(|| {
                    field.change(value);
                    revalidate_on(field.units(), ValidateOn::Change);
                })
            })
        };
        let on_blur: Callback<()> = {
            let field = field.clone();
            Arc::new(move |()| {
                batch(|| {
                    field.blur();
                    revalidate_on(field.units(), ValidateOn::Blur);
                })
            })
        };
        let on_focus: Callback<()> = {
            let field = field.clone();
            Arc::new(move |()| field.focus())
        };
        Self {
            form: field.units().id,
            name: field.name().clone(),
            on_change,
            on_blur,
            on_focus,
        }
    }
}

fn revalidate_on<R: StoreValue>(units: &FormUnits<R>, trigger: ValidateOn) {
    if units.config.validates_on(trigger) {
        units.events.revalidate.emit(());
    }
}

/// Coalesces every watcher firing of one batch into a single `invalidate`.
fn coalesce(invalidate: Invalidate) -> impl Fn() + Send + Sync + Clone + 'static {
    let queued = Arc::new(AtomicBool::new(false));
    move || {
        if queued.swap(true, Ordering::SeqCst) {
            return;
        }
        let queued = queued.clone();
        let invalidate = invalidate.clone();
        defer(Arc::new(move || {
            queued.store(false, Ordering::SeqCst);
            invalidate();
        }));
    }
}

/// Connects one field to a component.
///
/// `invalidate` runs once after any batch that changed what [`FieldHook::read`]
/// returns; the component re-reads on it.
pub struct FieldHook<R: StoreValue, L: FieldLens<R>> {
    field: Field<R, L>,
    handlers: FieldHandlers<L::Value>,
    invalidate: Invalidate,
    subscriptions: Vec<Subscription>,
}

impl<R: StoreValue, L: FieldLens<R>> FieldHook<R, L> {
    pub fn new(field: &Field<R, L>, invalidate: impl Fn() + Send + Sync + 'static) -> Self {
        let invalidate: Invalidate = Arc::new(invalidate);
        Self {
            field: field.clone(),
            handlers: FieldHandlers::new(field),
            subscriptions: subscribe_field(field, invalidate.clone()),
            invalidate,
        }
    }

    /// Points the hook at another field. Callbacks are kept when the new
    /// field has the same name in the same form.
    pub fn rebind(&mut self, field: &Field<R, L>) {
        for subscription in self.subscriptions.drain(..) {
            subscription.unsubscribe();
        }
        if self.handlers.form != field.units().id || &self.handlers.name != field.name() {
            self.handlers = FieldHandlers::new(field);
        }
        self.field = field.clone();
        self.subscriptions = subscribe_field(field, self.invalidate.clone());
    }

    pub fn field(&self) -> &Field<R, L> {
        &self.field
    }

    pub fn read(&self) -> FieldBinding<L::Value> {
        let field = &self.field;
        let stores = &field.units().stores;
        let config = &field.units().config;
        let dirty = field.is_dirty().get();
        let touched = field.is_touched().get();
        let submitted = stores.submit_count.get() > 1;
        FieldBinding {
            name: field.name().clone(),
            value: field.get(),
            dirty,
            touched,
            focused: field.is_focused().get(),
            disabled: stores.is_disabled.get(),
            errors: field.errors().get(),
            external_errors: field.external_errors().get(),
            submitted,
            should_show_validation: config.should_show_validation(FieldStatus {
                dirty,
                touched,
                submitted,
            }),
            on_change: self.handlers.on_change.clone(),
            on_blur: self.handlers.on_blur.clone(),
            on_focus: self.handlers.on_focus.clone(),
        }
    }
}

impl<R: StoreValue, L: FieldLens<R>> Drop for FieldHook<R, L> {
    fn drop(&mut self) {
        for subscription in self.subscriptions.drain(..) {
            subscription.unsubscribe();
        }
    }
}

fn subscribe_field<R, L>(field: &Field<R, L>, invalidate: Invalidate) -> Vec<Subscription>
where
    R: StoreValue,
    L: FieldLens<R>,
{
    let notify = coalesce(invalidate);
    let stores = &field.units().stores;
    vec![
        field.value().subscribe({
            let notify = notify.clone();
            move |_| notify()
        }),
        field.is_dirty().subscribe({
            let notify = notify.clone();
            move |_| notify()
        }),
        field.is_touched().subscribe({
            let notify = notify.clone();
            move |_| notify()
        }),
        field.is_focused().subscribe({
            let notify = notify.clone();
            move |_| notify()
        }),
        field.errors().subscribe({
            let notify = notify.clone();
            move |_| notify()
        }),
        field.external_errors().subscribe({
            let notify = notify.clone();
            move |_| notify()
        }),
        stores.submit_count.subscribe({
            let notify = notify.clone();
            move |_| notify()
        }),
        stores.is_disabled.subscribe(move |_| notify()),
    ]
}

/// Read model of the whole form.
#[derive(Clone)]
pub struct FormBinding {
    pub submit: Callback<()>,
    pub validate: Callback<()>,
    pub is_submitted: bool,
}

impl std::fmt::Debug for FormBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormBinding")
            .field("is_submitted", &self.is_submitted)
            .finish_non_exhaustive()
    }
}

impl FormBinding {
    pub fn submit_listener(&self) -> impl Fn(&mut Window, &mut App) + 'static {
        let submit = self.submit.clone();
        move |_, _| submit(())
    }
}

/// Connects a form to the component that owns it.
pub struct FormHook<T: FormModel> {
    form: Form<T>,
    submit: Callback<()>,
    validate: Callback<()>,
    subscriptions: Vec<Subscription>,
}

impl<T: FormModel> FormHook<T> {
    /// Runs one validation pass, which counts as a submit attempt, and starts
    /// watching the submitted flag.
    pub fn mount(form: &Form<T>, invalidate: impl Fn() + Send + Sync + 'static) -> Self {
        form.validate();
        let subscription = form.is_submitted().subscribe(move |_| invalidate());
        let submit: Callback<()> = {
            let form = form.clone();
            Arc::new(move |()| form.submit())
        };
        let validate: Callback<()> = {
            let form = form.clone();
            Arc::new(move |()| form.validate())
        };
        tracing::debug!(form = %form.id(), "form mounted");
        Self {
            form: form.clone(),
            submit,
            validate,
            subscriptions: vec![subscription],
        }
    }

    pub fn form(&self) -> &Form<T> {
        &self.form
    }

    pub fn read(&self) -> FormBinding {
        FormBinding {
            submit: self.submit.clone(),
            validate: self.validate.clone(),
            is_submitted: self.form.is_submitted().get(),
        }
    }
}

impl<T: FormModel> Drop for FormHook<T> {
    fn drop(&mut self) {
        for subscription in self.subscriptions.drain(..) {
            subscription.unsubscribe();
        }
    }
}
