/// Interaction that re-runs validation.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum ValidateOn {
    Change,
    Blur,
    Submit,
}

/// Condition under which a field's errors are surfaced to the user.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum VisibilityCondition {
    Dirty,
    Touched,
    Submitted,
}

/// Per-field flags the visibility policy is evaluated against.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct FieldStatus {
    pub dirty: bool,
    pub touched: bool,
    pub submitted: bool,
}

impl FieldStatus {
    pub fn satisfies(self, condition: VisibilityCondition) -> bool {
        match condition {
            VisibilityCondition::Dirty => self.dirty,
            VisibilityCondition::Touched => self.touched,
            VisibilityCondition::Submitted => self.submitted,
        }
    }
}

/// Validation triggers and visibility policy, fixed at construction.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FormConfig {
    pub validate_on: Vec<ValidateOn>,
    pub show_validation_on: Vec<VisibilityCondition>,
    pub validate_first_error_only: bool,
}

impl Default for FormConfig {
    fn default() -> Self {
        Self {
            validate_on: vec![ValidateOn::Submit],
            show_validation_on: vec![VisibilityCondition::Touched, VisibilityCondition::Submitted],
            validate_first_error_only: false,
        }
    }
}

impl FormConfig {
    pub fn validate_on(mut self, triggers: impl IntoIterator<Item = ValidateOn>) -> Self {
        self.validate_on = triggers.into_iter().collect();
        self
    }

    pub fn show_validation_on(
        mut self,
        conditions: impl IntoIterator<Item = VisibilityCondition>,
    ) -> Self {
        self.show_validation_on = conditions.into_iter().collect();
        self
    }

    pub fn validate_first_error_only(mut self, value: bool) -> Self {
        self.validate_first_error_only = value;
        self
    }

    pub fn validates_on(&self, trigger: ValidateOn) -> bool {
        self.validate_on.contains(&trigger)
    }

    /// Errors are shown when any configured condition holds.
    pub fn should_show_validation(&self, status: FieldStatus) -> bool {
        self.show_validation_on
            .iter()
            .any(|condition| status.satisfies(*condition))
    }
}
