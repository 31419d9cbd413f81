use gpui::SharedString;

/// Input widgets that render a label, helper text and a validation error.
pub trait FieldLike: Sized {
    fn label(self, value: impl Into<SharedString>) -> Self;
    fn description(self, value: impl Into<SharedString>) -> Self;
    fn error(self, value: impl Into<SharedString>) -> Self;
    fn required(self, value: bool) -> Self;
}

pub trait Disableable: Sized {
    fn disabled(self, value: bool) -> Self;
}
