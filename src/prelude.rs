pub use crate::contracts::{Disableable, FieldLike};
pub use crate::form::{
    Field, FieldBinding, FieldHook, FieldLens, FieldName, Form, FormBinding, FormConfig,
    FormError, FormFactory, FormHook, FormModel, FormPlugin, FormResult, ListField, NestedField, ValidateOn,
    ValidationError, VisibilityCondition,
};
pub use crate::reactive::{Event, Store, Subscription, batch};
