use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use futures_timer::Delay;
use gpui::SharedString;
use thiserror::Error;

use super::controller::{Form, FormResult, FormUnits, Rejection, read_lock, write_lock};
use super::field::FormModel;
use super::path::{FieldLens, FieldName};
use crate::reactive::{StoreValue, Subscription, batch};

/// One failed rule.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Error)]
#[error("{message}")]
pub struct ValidationError {
    pub rule: SharedString,
    pub message: SharedString,
}

impl ValidationError {
    pub fn new(rule: impl Into<SharedString>, message: impl Into<SharedString>) -> Self {
        Self {
            rule: rule.into(),
            message: message.into(),
        }
    }
}

/// Failed rules of one field, keyed by rule.
pub type FieldErrors = BTreeMap<SharedString, ValidationError>;

pub type ErrorMap = BTreeMap<FieldName, FieldErrors>;

pub trait FieldValidator<T, L>: Send + Sync
where
    L: FieldLens<T>,
{
    fn validate(&self, model: &T, value: &L::Value) -> Result<(), ValidationError>;
}

impl<T, L, F> FieldValidator<T, L> for F
where
    L: FieldLens<T>,
    F: for<'a> Fn(&'a T, &'a L::Value) -> Result<(), ValidationError> + Send + Sync,
{
    fn validate(&self, model: &T, value: &L::Value) -> Result<(), ValidationError> {
        (self)(model, value)
    }
}

/// Cross-field rule. Returned names need not be declared fields; list
/// entries such as `tags[1]` are common.
pub trait FormValidator<T>: Send + Sync {
    fn validate(&self, model: &T) -> Vec<(FieldName, ValidationError)>;
}

impl<T, F> FormValidator<T> for F
where
    F: Fn(&T) -> Vec<(FieldName, ValidationError)> + Send + Sync,
{
    fn validate(&self, model: &T) -> Vec<(FieldName, ValidationError)> {
        (self)(model)
    }
}

pub type BoxedValidationFuture<'a> =
    Pin<Box<dyn Future<Output = Result<(), ValidationError>> + Send + 'a>>;

pub trait AsyncFieldValidator<T, L>: Send + Sync
where
    L: FieldLens<T>,
{
    type Fut<'a>: Future<Output = Result<(), ValidationError>> + Send + 'a
    where
        Self: 'a,
        T: 'a,
        L::Value: 'a;

    fn validate<'a>(&'a self, model: &'a T, value: &'a L::Value) -> Self::Fut<'a>;
}

impl<T, L, F> AsyncFieldValidator<T, L> for F
where
    L: FieldLens<T>,
    F: for<'a> Fn(&'a T, &'a L::Value) -> BoxedValidationFuture<'a> + Send + Sync,
{
    type Fut<'a>
        = BoxedValidationFuture<'a>
    where
        Self: 'a,
        T: 'a,
        L::Value: 'a;

    fn validate<'a>(&'a self, model: &'a T, value: &'a L::Value) -> Self::Fut<'a> {
        (self)(model, value)
    }
}

/// Result of [`Form::submit_async`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SubmitOutcome {
    Submitted,
    Rejected,
    /// A later submit started before this one finished; nothing was applied.
    Superseded,
}

type SyncFieldValidatorFn<T> =
    Arc<dyn Fn(&T) -> Result<(), ValidationError> + Send + Sync>;
type SyncFormValidatorFn<T> =
    Arc<dyn Fn(&T) -> Vec<(FieldName, ValidationError)> + Send + Sync>;
type AsyncFieldValidatorFn<T> =
    Arc<dyn Fn(T) -> BoxedValidationFuture<'static> + Send + Sync>;

struct AsyncFieldValidatorEntry<T> {
    debounce: Duration,
    validator: AsyncFieldValidatorFn<T>,
}

impl<T> Clone for AsyncFieldValidatorEntry<T> {
    fn clone(&self) -> Self {
        Self {
            debounce: self.debounce,
            validator: self.validator.clone(),
        }
    }
}

pub(crate) struct Validators<T> {
    field: BTreeMap<FieldName, Vec<SyncFieldValidatorFn<T>>>,
    form: Vec<SyncFormValidatorFn<T>>,
    field_async: BTreeMap<FieldName, Vec<AsyncFieldValidatorEntry<T>>>,
}

impl<T> Default for Validators<T> {
    fn default() -> Self {
        Self {
            field: BTreeMap::new(),
            form: Vec::new(),
            field_async: BTreeMap::new(),
        }
    }
}

impl<T> Clone for Validators<T> {
    fn clone(&self) -> Self {
        Self {
            field: self.field.clone(),
            form: self.form.clone(),
            field_async: self.field_async.clone(),
        }
    }
}

impl<T> Validators<T> {
    pub(crate) fn run(&self, model: &T, first_error_only: bool) -> ErrorMap {
        let mut errors = ErrorMap::new();
        for (name, validators) in &self.field {
            for validator in validators {
                if let Err(error) = validator(model) {
                    insert_error(&mut errors, name.clone(), error);
                    if first_error_only {
                        break;
                    }
                }
            }
        }
        for validator in &self.form {
            for (name, error) in validator(model) {
                insert_error(&mut errors, name, error);
            }
        }
        errors
    }
}

fn insert_error(errors: &mut ErrorMap, name: FieldName, error: ValidationError) {
    errors
        .entry(name)
        .or_default()
        .entry(error.rule.clone())
        .or_insert(error);
}

impl<T: FormModel> Form<T> {
    pub fn register_field_validator<L, V>(&self, lens: L, validator: V) -> FormResult<()>
    where
        L: FieldLens<T>,
        V: FieldValidator<T, L> + 'static,
    {
        let name = lens.name();
        self.ensure_field(&name)?;
        let validator = Arc::new(validator);
        let wrapped: SyncFieldValidatorFn<T> =
            Arc::new(move |model: &T| validator.validate(model, lens.get(model)));
        write_lock(&self.inner.validators, "registering field validator")?
            .field
            .entry(name)
            .or_default()
            .push(wrapped);
        Ok(())
    }

    pub fn register_form_validator<V>(&self, validator: V) -> FormResult<()>
    where
        V: FormValidator<T> + 'static,
    {
        let validator = Arc::new(validator);
        let wrapped: SyncFormValidatorFn<T> = Arc::new(move |model: &T| validator.validate(model));
        write_lock(&self.inner.validators, "registering form validator")?
            .form
            .push(wrapped);
        Ok(())
    }

    /// Async validators run only from [`Form::submit_async`].
    pub fn register_async_field_validator<L, V>(&self, lens: L, validator: V) -> FormResult<()>
    where
        L: FieldLens<T>,
        V: AsyncFieldValidator<T, L> + 'static,
    {
        self.register_async_field_validator_with_debounce(lens, 0, validator)
    }

    pub fn register_async_field_validator_with_debounce<L, V>(
        &self,
        lens: L,
        debounce_ms: u64,
        validator: V,
    ) -> FormResult<()>
    where
        L: FieldLens<T>,
        V: AsyncFieldValidator<T, L> + 'static,
    {
        let name = lens.name();
        self.ensure_field(&name)?;
        let validator = Arc::new(validator);
        let wrapped: AsyncFieldValidatorFn<T> = Arc::new(move |model: T| {
            let value = lens.get(&model).clone();
            let validator = validator.clone();
            Box::pin(async move { validator.validate(&model, &value).await })
        });
        write_lock(&self.inner.validators, "registering async field validator")?
            .field_async
            .entry(name)
            .or_default()
            .push(AsyncFieldValidatorEntry {
                debounce: Duration::from_millis(debounce_ms),
                validator: wrapped,
            });
        Ok(())
    }

    /// Runs sync and async validators, then applies the result and emits
    /// `submitted` or `rejected` unless another submit or a reset started
    /// meanwhile.
    pub async fn submit_async(&self) -> FormResult<SubmitOutcome> {
        let units = self.units();
        let tickets = &self.inner.submit_tickets;
        let validators =
            read_lock(&self.inner.validators, "reading validators for submit")?.clone();
        let (ticket, model) = batch(|| {
            let ticket = begin_submit(units, tickets);
            (ticket, units.stores.values.get())
        });

        let first_error_only = units.config.validate_first_error_only;
        let mut errors = validators.run(&model, first_error_only);

        for (name, entries) in validators.field_async {
            for entry in entries {
                if !entry.debounce.is_zero() {
                    Delay::new(entry.debounce).await;
                    if !is_latest(tickets, ticket) {
                        break;
                    }
                }
                if let Err(error) = (entry.validator)(model.clone()).await {
                    insert_error(&mut errors, name.clone(), error);
                    if first_error_only {
                        break;
                    }
                }
            }
        }

        if !is_latest(tickets, ticket) {
            tracing::debug!(form = %units.id, ticket, "async submit superseded");
            return Ok(SubmitOutcome::Superseded);
        }
        Ok(batch(|| finish_submit(units, model, errors)))
    }
}

fn is_latest(tickets: &AtomicU64, ticket: u64) -> bool {
    tickets.load(Ordering::SeqCst) == ticket
}

fn begin_submit<T: StoreValue>(units: &FormUnits<T>, tickets: &AtomicU64) -> u64 {
    let ticket = tickets.fetch_add(1, Ordering::SeqCst) + 1;
    units.stores.submit_count.update(|count| *count += 1);
    units.stores.external_errors.update(|errors| errors.clear());
    ticket
}

fn finish_submit<T: StoreValue>(units: &FormUnits<T>, values: T, errors: ErrorMap) -> SubmitOutcome {
    units.stores.errors.set(errors.clone());
    if errors.is_empty() {
        tracing::debug!(form = %units.id, "form submitted");
        units.events.submitted.emit(values);
        SubmitOutcome::Submitted
    } else {
        tracing::debug!(form = %units.id, fields = errors.len(), "form rejected");
        units.events.rejected.emit(Rejection { values, errors });
        SubmitOutcome::Rejected
    }
}

// Taken before a pass counts as an attempt; a poisoned registry skips the pass.
fn snapshot_validators<T: StoreValue>(
    units: &FormUnits<T>,
    validators: &RwLock<Validators<T>>,
) -> Option<Validators<T>> {
    match read_lock(validators, "running validators") {
        Ok(validators) => Some(validators.clone()),
        Err(error) => {
            tracing::warn!(form = %units.id, %error, "skipping validation");
            None
        }
    }
}

fn run_validators<T: StoreValue>(units: &FormUnits<T>, validators: &Validators<T>) -> ErrorMap {
    let model = units.stores.values.get();
    validators.run(&model, units.config.validate_first_error_only)
}

pub(crate) fn wire_validation<T: StoreValue>(
    units: &FormUnits<T>,
    validators: &Arc<RwLock<Validators<T>>>,
    tickets: &Arc<AtomicU64>,
) -> Vec<Subscription> {
    let mut wiring = Vec::new();

    {
        let units = units.clone();
        let validators = validators.clone();
        let tickets = tickets.clone();
        wiring.push(units.events.submit.clone().on(move |_| {
            let Some(validators) = snapshot_validators(&units, &validators) else {
                return;
            };
            begin_submit(&units, &tickets);
            let errors = run_validators(&units, &validators);
            finish_submit(&units, units.stores.values.get(), errors);
        }));
    }

    {
        let units = units.clone();
        let validators = validators.clone();
        wiring.push(units.events.validate.clone().on(move |_| {
            let Some(validators) = snapshot_validators(&units, &validators) else {
                return;
            };
            units.stores.submit_count.update(|count| *count += 1);
            units.stores.errors.set(run_validators(&units, &validators));
        }));
    }

    {
        let units = units.clone();
        let validators = validators.clone();
        wiring.push(units.events.revalidate.clone().on(move |_| {
            if let Some(validators) = snapshot_validators(&units, &validators) {
                units.stores.errors.set(run_validators(&units, &validators));
            }
        }));
    }

    wiring
}

#[cfg(test)]
mod tests {
    use super::*;

    fn required(rule: &'static str) -> SyncFieldValidatorFn<String> {
        Arc::new(move |value: &String| {
            if value.is_empty() {
                Err(ValidationError::new(rule, "required"))
            } else {
                Ok(())
            }
        })
    }

    #[test]
    fn first_error_only_stops_at_the_first_failing_rule() {
        let mut validators = Validators::<String>::default();
        validators
            .field
            .insert("name".into(), vec![required("required"), required("present")]);

        let all = validators.run(&String::new(), false);
        assert_eq!(all[&FieldName::from("name")].len(), 2);

        let first = validators.run(&String::new(), true);
        let rules = first[&FieldName::from("name")]
            .keys()
            .cloned()
            .collect::<Vec<_>>();
        assert_eq!(rules, vec![SharedString::from("required")]);
    }

    #[test]
    fn passing_fields_have_no_entry() {
        let mut validators = Validators::<String>::default();
        validators.field.insert("name".into(), vec![required("required")]);
        validators.form.push(Arc::new(|value: &String| {
            if value.len() > 3 {
                vec![("name".into(), ValidationError::new("max", "too long"))]
            } else {
                Vec::new()
            }
        }));
        assert!(validators.run(&"ok".to_string(), false).is_empty());
        let errors = validators.run(&"long".to_string(), false);
        let max = errors[&FieldName::from("name")]
            .get(&SharedString::from("max"))
            .expect("max rule");
        assert_eq!(max.message, SharedString::from("too long"));
    }
}
