use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use super::{FieldValue, FormDescriptor, FormState, StepDescriptor, ValidationErrors};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("form `{form}` has no field named `{field}`")]
pub struct UnknownField {
    pub form: &'static str,
    pub field: String,
}

/// Outcome of a navigation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepEvent {
    Moved { from: usize, to: usize },
    /// The active step has errors; nothing moved.
    Blocked,
    /// Retreat requested on the first step.
    Stayed,
    /// The final step is valid; the caller should submit.
    ReadyToSubmit,
}

/// Step controller and field store for one wizard instance.
///
/// The current index always stays within `0..step_count()`. Errors are
/// recomputed from scratch for the active step after every mutation, and
/// reset whenever the active step changes.
#[derive(Debug, Clone)]
pub struct WizardSession {
    descriptor: Arc<FormDescriptor>,
    values: FormState,
    errors: ValidationErrors,
    banner: Option<String>,
    index: usize,
}

impl WizardSession {
    pub fn new(descriptor: Arc<FormDescriptor>) -> Self {
        let values = descriptor.initial_state();
        Self::with_values(descriptor, values)
    }

    pub fn with_values(descriptor: Arc<FormDescriptor>, values: FormState) -> Self {
        Self {
            descriptor,
            values,
            errors: ValidationErrors::new(),
            banner: None,
            index: 0,
        }
    }

    pub fn descriptor(&self) -> &FormDescriptor {
        &self.descriptor
    }

    pub fn values(&self) -> &FormState {
        &self.values
    }

    pub fn errors(&self) -> &ValidationErrors {
        &self.errors
    }

    pub fn banner(&self) -> Option<&str> {
        self.banner.as_deref()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn step_count(&self) -> usize {
        self.descriptor.steps.len()
    }

    pub fn is_last_step(&self) -> bool {
        self.index + 1 >= self.step_count()
    }

    pub fn current_step(&self) -> Option<&StepDescriptor> {
        self.descriptor.steps.get(self.index)
    }

    /// Updates one field and recomputes the active step's errors.
    pub fn set_field(
        &mut self,
        name: &str,
        value: impl Into<FieldValue>,
    ) -> Result<&ValidationErrors, UnknownField> {
        if self.descriptor.field(name).is_none() {
            return Err(UnknownField {
                form: self.descriptor.name,
                field: name.to_string(),
            });
        }
        self.values.set(name, value);
        self.refresh();
        Ok(&self.errors)
    }

    /// Pure validation of step `index` against the current values.
    pub fn validate_step(&self, index: usize) -> ValidationErrors {
        self.descriptor
            .steps
            .get(index)
            .map(|step| step.validate(&self.values))
            .unwrap_or_default()
    }

    pub fn validate(&self) -> ValidationErrors {
        self.validate_step(self.index)
    }

    /// Replaces the stored errors with a fresh validation of the active step.
    pub fn refresh(&mut self) {
        self.errors = self.validate();
        if self.errors.is_empty() {
            self.banner = None;
        }
        debug!(
            form = self.descriptor.name,
            step = self.index,
            errors = self.errors.len(),
            "validated step"
        );
    }

    pub fn advance(&mut self) -> StepEvent {
        self.banner = None;
        self.refresh();
        if !self.errors.is_empty() {
            self.banner = self
                .current_step()
                .and_then(|step| step.banner)
                .map(str::to_string);
            return StepEvent::Blocked;
        }
        if self.is_last_step() {
            return StepEvent::ReadyToSubmit;
        }
        let from = self.index;
        self.index += 1;
        self.errors = ValidationErrors::new();
        StepEvent::Moved { from, to: self.index }
    }

    /// Moves back one step without validation.
    pub fn retreat(&mut self) -> StepEvent {
        self.banner = None;
        self.errors = ValidationErrors::new();
        if self.index == 0 {
            return StepEvent::Stayed;
        }
        let from = self.index;
        self.index -= 1;
        StepEvent::Moved { from, to: self.index }
    }

    /// Records errors produced outside the rule table (remote checks).
    pub fn block_with(&mut self, errors: ValidationErrors) {
        self.banner = self
            .current_step()
            .and_then(|step| step.banner)
            .map(str::to_string);
        self.errors.extend(errors);
    }

    pub fn set_banner(&mut self, message: impl Into<String>) {
        self.banner = Some(message.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forms::{FieldDescriptor, FieldKind, Rule};

    fn two_step_descriptor() -> Arc<FormDescriptor> {
        Arc::new(FormDescriptor::new(
            "test",
            vec![
                StepDescriptor::new(
                    "basics",
                    "Basics",
                    vec![
                        FieldDescriptor::new("name", "Name", FieldKind::Text)
                            .rule(Rule::Required, "Name is required"),
                        FieldDescriptor::new("city", "City", FieldKind::Text)
                            .rule(Rule::Required, "City is required"),
                    ],
                )
                .with_banner("Name and city are required"),
                StepDescriptor::new(
                    "extra",
                    "Extra",
                    vec![FieldDescriptor::new("note", "Note", FieldKind::Text)
                        .rule(Rule::Required, "Note is required")],
                ),
            ],
        ))
    }

    #[test]
    fn advance_blocked_until_step_is_valid() {
        let mut session = WizardSession::new(two_step_descriptor());
        assert_eq!(session.advance(), StepEvent::Blocked);
        assert_eq!(session.index(), 0);
        assert_eq!(session.errors().get("name"), Some("Name is required"));
        assert_eq!(session.banner(), Some("Name and city are required"));

        session.set_field("name", "Asha").unwrap();
        session.set_field("city", "Pune").unwrap();
        assert!(session.errors().is_empty());
        assert_eq!(session.banner(), None);
        assert_eq!(session.advance(), StepEvent::Moved { from: 0, to: 1 });
    }

    #[test]
    fn set_field_recomputes_instead_of_patching() {
        let mut session = WizardSession::new(two_step_descriptor());
        session.set_field("name", "").unwrap();
        assert_eq!(session.errors().len(), 2);
        session.set_field("name", "Asha").unwrap();
        assert_eq!(session.errors().get("name"), None);
        assert_eq!(session.errors().get("city"), Some("City is required"));
    }

    #[test]
    fn errors_from_previous_step_do_not_leak() {
        let mut session = WizardSession::new(two_step_descriptor());
        session.set_field("name", "Asha").unwrap();
        session.set_field("city", "Pune").unwrap();
        session.advance();
        assert!(session.errors().is_empty());
        session.set_field("note", "").unwrap();
        assert_eq!(
            session.errors().iter().collect::<Vec<_>>(),
            vec![("note", "Note is required")]
        );
    }

    #[test]
    fn retreat_is_unconditional_and_clears_banner() {
        let mut session = WizardSession::new(two_step_descriptor());
        session.set_field("name", "Asha").unwrap();
        session.set_field("city", "Pune").unwrap();
        session.advance();
        assert_eq!(session.advance(), StepEvent::Blocked);
        session.set_banner("Upload failed");
        assert_eq!(session.retreat(), StepEvent::Moved { from: 1, to: 0 });
        assert_eq!(session.banner(), None);
        assert!(session.errors().is_empty());
        assert_eq!(session.retreat(), StepEvent::Stayed);
        assert_eq!(session.index(), 0);
    }

    #[test]
    fn last_step_reports_ready_instead_of_overflowing() {
        let mut session = WizardSession::new(two_step_descriptor());
        session.set_field("name", "Asha").unwrap();
        session.set_field("city", "Pune").unwrap();
        session.advance();
        session.set_field("note", "hello").unwrap();
        assert_eq!(session.advance(), StepEvent::ReadyToSubmit);
        assert_eq!(session.index(), 1);
        assert!(session.is_last_step());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let mut session = WizardSession::new(two_step_descriptor());
        let err = session.set_field("nickname", "x").unwrap_err();
        assert_eq!(err.to_string(), "form `test` has no field named `nickname`");
        assert!(session.values().get("nickname").is_none());
    }

    #[test]
    fn block_with_merges_remote_errors() {
        let mut session = WizardSession::new(two_step_descriptor());
        let remote: ValidationErrors = [("name", "Name is taken")].into_iter().collect();
        session.block_with(remote);
        assert_eq!(session.errors().get("name"), Some("Name is taken"));
        assert_eq!(session.banner(), Some("Name and city are required"));
    }
}
