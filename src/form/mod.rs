mod binding;
mod config;
mod controller;
mod draft;
mod field;
mod list;
mod path;
mod plugin;
mod validation;


pub use binding::{Callback, FieldBinding, FieldHook, FormBinding, FormHook};
pub use config::{FieldStatus, FormConfig, ValidateOn, VisibilityCondition};
pub use controller::{
    FieldUpdate, Form, FormError, FormEvents, FormId, FormResult, FormStores, NameSet, Patch,
    Rejection,
};
pub use draft::{FormDraftStore, InMemoryDraftStore};
pub use field::{Field, FieldEvents, FieldGraph, FieldKind, FormModel, NestedField};
pub use filledout_derive::FormModel;
pub use list::ListField;
pub use path::{Compose, FieldLens, FieldName, RootLens};
pub use plugin::{FormFactory, FormPlugin, NoPlugin};
pub use validation::{
    AsyncFieldValidator, BoxedValidationFuture, ErrorMap, FieldErrors, FieldValidator,
    FormValidator, SubmitOutcome, ValidationError,
};
