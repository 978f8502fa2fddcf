//! Drives a [`Wizard`] from an interactive front end.
//!
//! The runner knows nothing about terminals; every question goes through a
//! [`WizardInteraction`], so tests can script a whole session.

use std::path::PathBuf;

use tracing::debug;

use crate::errors::MarketError;
use crate::flows::{FlowSpec, Route};
use crate::forms::{FieldDescriptor, FieldKind, FieldValue};
use crate::staging::{LocalFile, StagedAsset};
use crate::wizard::{Wizard, WizardEvent};

use super::output::{error_lines, MessageKind};

/// Answer to a single field prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptResponse {
    Value(String),
    /// Keep the current value.
    Keep,
    /// Leave the step's fields and go back one step.
    Back,
    Cancel,
}

/// What to do once a step's fields have been answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepAction {
    Next,
    Back,
    AddImages(Vec<PathBuf>),
    RemoveImage(usize),
    Cancel,
}

pub struct PromptContext<'a> {
    pub step_title: &'a str,
    pub field: &'a FieldDescriptor,
    pub current: Option<String>,
    pub error: Option<&'a str>,
}

pub struct StepContext<'a> {
    pub index: usize,
    pub count: usize,
    pub title: &'a str,
    pub is_last: bool,
    pub accepts_images: bool,
    pub max_images: usize,
    pub staged: &'a [StagedAsset],
}

pub trait WizardInteraction {
    fn prompt_field(&mut self, context: &PromptContext<'_>) -> PromptResponse;

    fn choose_action(&mut self, context: &StepContext<'_>) -> StepAction;

    fn notify(&mut self, kind: MessageKind, message: &str);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliOutcome {
    Completed(Route),
    Cancelled,
}

/// Converts typed text into the value a field of `kind` stores.
pub fn parse_answer(kind: &FieldKind, raw: &str) -> FieldValue {
    match kind {
        FieldKind::Flag => FieldValue::Bool(matches!(
            raw.trim().to_ascii_lowercase().as_str(),
            "y" | "yes" | "true" | "1"
        )),
        _ => FieldValue::Text(raw.to_string()),
    }
}

pub async fn run_wizard<F, I>(
    wizard: &mut Wizard<F>,
    interaction: &mut I,
) -> Result<CliOutcome, MarketError>
where
    F: FlowSpec,
    I: WizardInteraction,
{
    let descriptor = wizard.flow().descriptor();
    'steps: loop {
        let index = wizard.step_index();
        let Some(step) = descriptor.steps.get(index) else {
            return Ok(CliOutcome::Cancelled);
        };

        for field in &step.fields {
            let response = {
                let context = PromptContext {
                    step_title: step.title,
                    field,
                    current: wizard.values().get(field.key).map(|value| value.to_string()),
                    error: wizard.errors().get(field.key),
                };
                interaction.prompt_field(&context)
            };
            match response {
                PromptResponse::Value(raw) => {
                    wizard.set_field(field.key, parse_answer(&field.kind, &raw))?;
                }
                PromptResponse::Keep => {}
                PromptResponse::Back => {
                    wizard.retreat();
                    continue 'steps;
                }
                PromptResponse::Cancel => return Ok(CliOutcome::Cancelled),
            }
        }

        loop {
            let action = {
                let limits = wizard.staging().map(|staging| staging.limits());
                let context = StepContext {
                    index,
                    count: wizard.step_count(),
                    title: step.title,
                    is_last: wizard.is_last_step(),
                    accepts_images: limits.is_some(),
                    max_images: limits.map(|limits| limits.max_count).unwrap_or(0),
                    staged: wizard.staged(),
                };
                interaction.choose_action(&context)
            };
            debug!(step = index, ?action, "step action");
            match action {
                StepAction::Next => match wizard.advance().await {
                    WizardEvent::Submitted(route) => return Ok(CliOutcome::Completed(route)),
                    WizardEvent::Failed(message) => {
                        interaction.notify(MessageKind::Error, &message);
                        continue;
                    }
                    WizardEvent::Blocked => {
                        if let Some(banner) = wizard.banner() {
                            interaction.notify(MessageKind::Warning, banner);
                        }
                        for line in error_lines(wizard.errors()) {
                            interaction.notify(MessageKind::Error, &line);
                        }
                        continue 'steps;
                    }
                    WizardEvent::Moved { .. } | WizardEvent::Stayed | WizardEvent::Ignored => {
                        continue 'steps;
                    }
                },
                StepAction::Back => {
                    wizard.retreat();
                    continue 'steps;
                }
                StepAction::AddImages(paths) => stage_paths(wizard, interaction, paths),
                StepAction::RemoveImage(slot) => {
                    if let Err(err) = wizard.remove_image(slot) {
                        interaction.notify(MessageKind::Error, &err.to_string());
                    }
                }
                StepAction::Cancel => return Ok(CliOutcome::Cancelled),
            }
        }
    }
}

fn stage_paths<F, I>(wizard: &mut Wizard<F>, interaction: &mut I, paths: Vec<PathBuf>)
where
    F: FlowSpec,
    I: WizardInteraction,
{
    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        match LocalFile::from_path(&path) {
            Ok(file) => files.push(file),
            Err(err) => {
                interaction.notify(
                    MessageKind::Error,
                    &format!("Cannot read {}: {}", path.display(), err),
                );
                return;
            }
        }
    }
    let single = wizard
        .staging()
        .map(|staging| staging.limits().max_count == 1)
        .unwrap_or(false);
    let outcome = if single {
        wizard.replace_files(files)
    } else {
        wizard.add_files(files)
    };
    match outcome {
        Ok(previews) => interaction.notify(
            MessageKind::Success,
            &format!("Staged {} image(s)", previews.len()),
        ),
        Err(err) => interaction.notify(MessageKind::Error, &err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Arc;

    use crate::backend::{Backend, MemoryBackend, Operation, User};
    use crate::config::Config;
    use crate::flows::{ListingFlow, SignupFlow};

    struct ScriptedInteraction {
        answers: VecDeque<PromptResponse>,
        actions: VecDeque<StepAction>,
        messages: Vec<(MessageKind, String)>,
    }

    impl ScriptedInteraction {
        fn new(answers: Vec<PromptResponse>, actions: Vec<StepAction>) -> Self {
            Self {
                answers: answers.into(),
                actions: actions.into(),
                messages: Vec::new(),
            }
        }
    }

    impl WizardInteraction for ScriptedInteraction {
        fn prompt_field(&mut self, _context: &PromptContext<'_>) -> PromptResponse {
            self.answers.pop_front().unwrap_or(PromptResponse::Cancel)
        }

        fn choose_action(&mut self, _context: &StepContext<'_>) -> StepAction {
            self.actions.pop_front().unwrap_or(StepAction::Cancel)
        }

        fn notify(&mut self, kind: MessageKind, message: &str) {
            self.messages.push((kind, message.to_string()));
        }
    }

    fn value(text: &str) -> PromptResponse {
        PromptResponse::Value(text.to_string())
    }

    #[test]
    fn flags_accept_yes() {
        assert_eq!(parse_answer(&FieldKind::Flag, "Yes"), FieldValue::Bool(true));
        assert_eq!(parse_answer(&FieldKind::Flag, "no"), FieldValue::Bool(false));
        assert_eq!(
            parse_answer(&FieldKind::Number, "12"),
            FieldValue::Text("12".into())
        );
    }

    #[tokio::test]
    async fn scripted_signup_completes() {
        let memory = Arc::new(MemoryBackend::new());
        let mut wizard = Wizard::start(SignupFlow::new(), Backend::from_shared(memory.clone()))
            .await
            .unwrap();
        let mut interaction = ScriptedInteraction::new(
            vec![value("asha@uni.edu"), value("longenough")],
            vec![StepAction::Next],
        );

        let outcome = run_wizard(&mut wizard, &mut interaction).await.unwrap();
        assert_eq!(
            outcome,
            CliOutcome::Completed(Route::EmailVerification {
                email: "asha@uni.edu".into()
            })
        );
        assert_eq!(memory.count(Operation::SignUp), 1);
    }

    #[tokio::test]
    async fn blocked_step_reports_errors_and_reprompts() {
        let memory = Arc::new(MemoryBackend::new());
        let mut wizard = Wizard::start(SignupFlow::new(), Backend::from_shared(memory))
            .await
            .unwrap();
        let mut interaction = ScriptedInteraction::new(
            vec![value("not-an-email"), value("short")],
            vec![StepAction::Next],
        );

        let outcome = run_wizard(&mut wizard, &mut interaction).await.unwrap();
        assert_eq!(outcome, CliOutcome::Cancelled);
        assert!(interaction.messages.contains(&(
            MessageKind::Error,
            "email: Please enter a valid email address".to_string()
        )));
    }

    #[tokio::test]
    async fn missing_image_path_is_reported() {
        let user = User {
            id: "u1".into(),
            email: "asha@uni.edu".into(),
        };
        let memory = Arc::new(MemoryBackend::with_user(user));
        let mut wizard =
            Wizard::start(ListingFlow::new(&Config::default()), Backend::from_shared(memory))
                .await
                .unwrap();
        let mut interaction = ScriptedInteraction::new(
            vec![PromptResponse::Keep; 8],
            vec![StepAction::AddImages(vec![PathBuf::from("/nonexistent/desk.png")])],
        );

        run_wizard(&mut wizard, &mut interaction).await.unwrap();
        assert!(wizard.staged().is_empty());
        assert!(interaction
            .messages
            .iter()
            .any(|(kind, message)| *kind == MessageKind::Error && message.starts_with("Cannot read")));
    }
}
