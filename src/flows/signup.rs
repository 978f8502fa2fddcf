use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::backend::User;
use crate::forms::{FieldDescriptor, FieldKind, FormDescriptor, FormState, Rule, StepDescriptor};
use crate::submission::{Commit, Committed, SubmissionError};

use super::{FlowSpec, Route};

pub const MIN_PASSWORD_LENGTH: usize = 8;

static EMAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap_or_else(|err| panic!("invalid email pattern: {err}"))
});

/// Single-step account creation.
pub struct SignupFlow {
    descriptor: Arc<FormDescriptor>,
}

impl SignupFlow {
    pub fn new() -> Self {
        let account = StepDescriptor::new(
            "account",
            "Create your account",
            vec![
                FieldDescriptor::new("email", "Email", FieldKind::Text)
                    .rule(Rule::Required, "Please enter a valid email address")
                    .rule(Rule::Pattern(EMAIL.clone()), "Please enter a valid email address"),
                FieldDescriptor::new("password", "Password", FieldKind::Secret)
                    .rule(Rule::Required, "Password must be at least 8 characters")
                    .rule(
                        Rule::MinLength(MIN_PASSWORD_LENGTH),
                        "Password must be at least 8 characters",
                    ),
            ],
        );
        Self {
            descriptor: Arc::new(FormDescriptor::new("signup", vec![account])),
        }
    }
}

impl Default for SignupFlow {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FlowSpec for SignupFlow {
    fn descriptor(&self) -> Arc<FormDescriptor> {
        self.descriptor.clone()
    }

    fn requires_auth(&self) -> bool {
        false
    }

    fn commit(
        &self,
        values: &FormState,
        _uploads: &[String],
        _user: Option<&User>,
    ) -> Result<Commit, SubmissionError> {
        Ok(Commit::SignUp {
            email: values.text("email").trim().to_string(),
            password: values.text("password").to_string(),
        })
    }

    fn route_after(&self, values: &FormState, _committed: &Committed) -> Route {
        Route::EmailVerification {
            email: values.text("email").trim().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forms::{StepEvent, WizardSession};

    #[test]
    fn rejects_malformed_email_and_short_password() {
        let flow = SignupFlow::new();
        let mut session = WizardSession::new(flow.descriptor());
        session.set_field("email", "asha@uni").unwrap();
        session.set_field("password", "short").unwrap();
        assert_eq!(session.advance(), StepEvent::Blocked);
        assert_eq!(
            session.errors().get("email"),
            Some("Please enter a valid email address")
        );
        assert_eq!(
            session.errors().get("password"),
            Some("Password must be at least 8 characters")
        );
    }

    #[test]
    fn valid_account_is_ready_to_submit() {
        let flow = SignupFlow::new();
        let mut session = WizardSession::new(flow.descriptor());
        session.set_field("email", "asha@uni.edu").unwrap();
        session.set_field("password", "longenough").unwrap();
        assert_eq!(session.advance(), StepEvent::ReadyToSubmit);
    }

    #[test]
    fn routes_to_verification_with_email() {
        let flow = SignupFlow::new();
        let mut values = FormState::new();
        values.set("email", " asha@uni.edu ");
        let user = User {
            id: "u1".into(),
            email: "asha@uni.edu".into(),
        };
        assert_eq!(
            flow.route_after(&values, &Committed::SignedUp(user)),
            Route::EmailVerification {
                email: "asha@uni.edu".into()
            }
        );
    }
}
