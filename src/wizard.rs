//! Generic multi-step wizard shared by every flow.
//!
//! A [`Wizard`] owns one form session, the images staged for it, and the
//! submission state. Navigation validates the active step locally, then
//! remotely, and on the last step hands the collected values to the
//! submission pipeline.

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::backend::{Backend, BackendError, User};
use crate::flows::{FlowSpec, Route};
use crate::forms::{
    FieldValue, FormState, StepDescriptor, StepEvent, UnknownField, ValidationErrors,
    WizardSession,
};
use crate::staging::{
    AssetStaging, LocalFile, PreviewRef, PreviewRegistry, StagedAsset, StagingError,
};
use crate::submission::{
    settle, Committed, SubmissionError, SubmissionState, SubmissionTracker, Submitter,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WizardError {
    #[error("Please sign in to continue")]
    AuthRequired,
    #[error(transparent)]
    UnknownField(#[from] UnknownField),
    #[error(transparent)]
    Staging(#[from] StagingError),
    #[error("this form does not accept images")]
    NoStaging,
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl WizardError {
    /// Route the caller should take instead of showing the form.
    pub fn redirect(&self) -> Option<Route> {
        match self {
            WizardError::AuthRequired => Some(Route::Login),
            _ => None,
        }
    }
}

/// Outcome of a navigation or submit request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WizardEvent {
    Moved { from: usize, to: usize },
    /// Validation failed; errors and banner are set.
    Blocked,
    /// Back pressed on the first step.
    Stayed,
    /// A submission is in flight or already succeeded.
    Ignored,
    Submitted(Route),
    /// The attempt failed; every value and staged image is kept.
    Failed(String),
}

pub struct Wizard<F: FlowSpec> {
    flow: F,
    backend: Backend,
    user: Option<User>,
    session: WizardSession,
    staging: Option<AssetStaging>,
    tracker: SubmissionTracker,
    staging_error: Option<String>,
}

impl<F: FlowSpec> Wizard<F> {
    pub async fn start(flow: F, backend: Backend) -> Result<Self, WizardError> {
        Self::start_with_registry(flow, backend, PreviewRegistry::new()).await
    }

    /// Resolves the signed-in user, applies the auth gate, and loads any
    /// saved values for the flow.
    pub async fn start_with_registry(
        flow: F,
        backend: Backend,
        registry: PreviewRegistry,
    ) -> Result<Self, WizardError> {
        let user = backend.auth.current_user().await?;
        let descriptor = flow.descriptor();
        if flow.requires_auth() && user.is_none() {
            warn!(form = descriptor.name, "no signed-in user; redirecting to login");
            return Err(WizardError::AuthRequired);
        }

        let mut values = descriptor.initial_state();
        match flow.prefill(&backend, user.as_ref()).await {
            Ok(Some(saved)) => {
                debug!(form = descriptor.name, "prefilled saved values");
                for (key, value) in saved.iter() {
                    values.set(key.clone(), value.clone());
                }
            }
            Ok(None) => {}
            Err(err) => warn!(form = descriptor.name, error = %err, "could not load saved values"),
        }

        let staging = flow
            .staging_limits()
            .map(|limits| AssetStaging::new(limits, registry));
        info!(form = descriptor.name, steps = descriptor.steps.len(), "wizard started");
        Ok(Self {
            session: WizardSession::with_values(descriptor, values),
            flow,
            backend,
            user,
            staging,
            tracker: SubmissionTracker::new(),
            staging_error: None,
        })
    }

    pub fn flow(&self) -> &F {
        &self.flow
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn session(&self) -> &WizardSession {
        &self.session
    }

    pub fn values(&self) -> &FormState {
        self.session.values()
    }

    pub fn errors(&self) -> &ValidationErrors {
        self.session.errors()
    }

    pub fn banner(&self) -> Option<&str> {
        self.session.banner()
    }

    pub fn step_index(&self) -> usize {
        self.session.index()
    }

    pub fn step_count(&self) -> usize {
        self.session.step_count()
    }

    pub fn is_last_step(&self) -> bool {
        self.session.is_last_step()
    }

    pub fn current_step(&self) -> Option<&StepDescriptor> {
        self.session.current_step()
    }

    pub fn accepts_images(&self) -> bool {
        self.staging.is_some()
    }

    pub fn staging(&self) -> Option<&AssetStaging> {
        self.staging.as_ref()
    }

    pub fn staged(&self) -> &[StagedAsset] {
        self.staging
            .as_ref()
            .map(AssetStaging::assets)
            .unwrap_or(&[])
    }

    /// Last staging rejection, cleared by the next accepted change.
    pub fn staging_error(&self) -> Option<&str> {
        self.staging_error.as_deref()
    }

    pub fn submission(&self) -> &SubmissionState {
        self.tracker.state()
    }

    pub fn is_submitting(&self) -> bool {
        self.tracker.is_pending()
    }

    pub fn failure_message(&self) -> Option<&str> {
        self.tracker.failure()
    }

    pub fn set_field(
        &mut self,
        name: &str,
        value: impl Into<FieldValue>,
    ) -> Result<&ValidationErrors, WizardError> {
        Ok(self.session.set_field(name, value)?)
    }

    pub fn add_files(&mut self, files: Vec<LocalFile>) -> Result<Vec<PreviewRef>, WizardError> {
        let staging = self.staging.as_mut().ok_or(WizardError::NoStaging)?;
        let outcome = staging.add_files(files);
        self.record_staging(outcome)
    }

    /// Swaps every staged image for `files`, as a single-photo picker does.
    pub fn replace_files(
        &mut self,
        files: Vec<LocalFile>,
    ) -> Result<Vec<PreviewRef>, WizardError> {
        let staging = self.staging.as_mut().ok_or(WizardError::NoStaging)?;
        let outcome = staging.replace_all(files);
        self.record_staging(outcome)
    }

    pub fn remove_image(&mut self, index: usize) -> Result<StagedAsset, WizardError> {
        let staging = self.staging.as_mut().ok_or(WizardError::NoStaging)?;
        let outcome = staging.remove_at(index);
        self.record_staging(outcome)
    }

    fn record_staging<T>(&mut self, outcome: Result<T, StagingError>) -> Result<T, WizardError> {
        match outcome {
            Ok(value) => {
                self.staging_error = None;
                Ok(value)
            }
            Err(err) => {
                self.staging_error = Some(err.to_string());
                Err(err.into())
            }
        }
    }

    /// Validates the active step and moves forward, submitting from the
    /// last step.
    pub async fn advance(&mut self) -> WizardEvent {
        if self.tracker.is_pending() || self.tracker.is_success() {
            return WizardEvent::Ignored;
        }
        if !self.session.validate().is_empty() {
            self.session.advance();
            return WizardEvent::Blocked;
        }
        let remote = match self.session.current_step() {
            Some(step) => {
                self.flow
                    .remote_check(step.name, self.session.values(), &self.backend, self.user.as_ref())
                    .await
            }
            None => ValidationErrors::new(),
        };
        if !remote.is_empty() {
            self.session.refresh();
            self.session.block_with(remote);
            return WizardEvent::Blocked;
        }
        match self.session.advance() {
            StepEvent::Moved { from, to } => WizardEvent::Moved { from, to },
            StepEvent::ReadyToSubmit => self.submit().await,
            StepEvent::Blocked => WizardEvent::Blocked,
            StepEvent::Stayed => WizardEvent::Stayed,
        }
    }

    pub fn retreat(&mut self) -> WizardEvent {
        if self.tracker.is_pending() {
            return WizardEvent::Ignored;
        }
        match self.session.retreat() {
            StepEvent::Moved { from, to } => WizardEvent::Moved { from, to },
            _ => WizardEvent::Stayed,
        }
    }

    /// Runs the submission pipeline once every step validates.
    ///
    /// At most one attempt runs at a time and nothing runs after success.
    pub async fn submit(&mut self) -> WizardEvent {
        if self.tracker.is_pending() || self.tracker.is_success() {
            return WizardEvent::Ignored;
        }
        if !self.session.is_last_step() {
            debug!(step = self.session.index(), "submit requested before the last step");
            return WizardEvent::Blocked;
        }
        // A new attempt drops the previous failure message.
        self.tracker.reset();
        let incomplete = self.validate_all().await;
        if !incomplete.is_empty() {
            self.session.refresh();
            self.session.block_with(incomplete);
            self.session.set_banner(self.flow.incomplete_message());
            return WizardEvent::Blocked;
        }
        if !self.tracker.try_begin() {
            return WizardEvent::Ignored;
        }

        let outcome = run_pipeline(
            &self.flow,
            &self.backend,
            &mut self.tracker,
            self.staging.as_ref(),
            self.session.values(),
            self.user.as_ref(),
        )
        .await;
        settle(&mut self.tracker, &outcome);
        match outcome {
            Ok(committed) => {
                let route = self.flow.route_after(self.session.values(), &committed);
                info!(form = self.session.descriptor().name, ?route, "submission succeeded");
                WizardEvent::Submitted(route)
            }
            Err(err) => WizardEvent::Failed(err.to_string()),
        }
    }

    async fn validate_all(&self) -> ValidationErrors {
        let mut errors = ValidationErrors::new();
        for index in 0..self.session.step_count() {
            errors.extend(self.session.validate_step(index));
        }
        if !errors.is_empty() {
            return errors;
        }
        for step in &self.session.descriptor().steps {
            errors.extend(
                self.flow
                    .remote_check(step.name, self.session.values(), &self.backend, self.user.as_ref())
                    .await,
            );
        }
        errors
    }

    /// Tears the wizard down, revoking every preview it still holds.
    pub fn close(mut self) {
        if let Some(staging) = self.staging.as_mut() {
            staging.clear();
        }
        debug!(form = self.session.descriptor().name, "wizard closed");
    }
}

async fn run_pipeline<F: FlowSpec>(
    flow: &F,
    backend: &Backend,
    tracker: &mut SubmissionTracker,
    staging: Option<&AssetStaging>,
    values: &FormState,
    user: Option<&User>,
) -> Result<Committed, SubmissionError> {
    let mut submitter = Submitter::new(backend, tracker);
    let uploads = match (staging, flow.upload_target(user)) {
        (Some(staging), Some(target)) if !staging.is_empty() => {
            submitter.upload_assets(staging, &target).await?
        }
        _ => Vec::new(),
    };
    let commit = flow.commit(values, &uploads, user)?;
    submitter.commit(commit).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MemoryBackend, Operation};
    use crate::config::Config;
    use crate::flows::{ListingFlow, SignupFlow};
    use std::sync::Arc;

    fn user() -> User {
        User {
            id: "u1".into(),
            email: "asha@uni.edu".into(),
        }
    }

    #[tokio::test]
    async fn listing_without_user_redirects_to_login() {
        let memory = Arc::new(MemoryBackend::new());
        let err = Wizard::start(ListingFlow::new(&Config::default()), Backend::from_shared(memory))
            .await
            .err()
            .unwrap();
        assert_eq!(err, WizardError::AuthRequired);
        assert_eq!(err.redirect(), Some(Route::Login));
    }

    #[tokio::test]
    async fn signup_does_not_need_a_user() {
        let memory = Arc::new(MemoryBackend::new());
        let wizard = Wizard::start(SignupFlow::new(), Backend::from_shared(memory))
            .await
            .unwrap();
        assert!(!wizard.accepts_images());
        assert_eq!(wizard.step_count(), 1);
    }

    #[tokio::test]
    async fn staging_rejection_is_remembered_until_next_change() {
        let memory = Arc::new(MemoryBackend::with_user(user()));
        let mut wizard =
            Wizard::start(ListingFlow::new(&Config::default()), Backend::from_shared(memory))
                .await
                .unwrap();
        let err = wizard
            .add_files(vec![LocalFile::from_bytes("notes.pdf", "application/pdf", vec![1])])
            .unwrap_err();
        assert!(matches!(err, WizardError::Staging(StagingError::NotAnImage { .. })));
        assert_eq!(wizard.staging_error(), Some("Please upload an image file"));

        wizard
            .add_files(vec![LocalFile::from_bytes("a.png", "image/png", vec![1])])
            .unwrap();
        assert_eq!(wizard.staging_error(), None);
        assert_eq!(wizard.staged().len(), 1);
    }

    #[tokio::test]
    async fn submit_before_last_step_is_blocked() {
        let memory = Arc::new(MemoryBackend::with_user(user()));
        let mut wizard = Wizard::start(
            ListingFlow::new(&Config::default()),
            Backend::from_shared(memory.clone()),
        )
        .await
        .unwrap();
        assert_eq!(wizard.submit().await, WizardEvent::Blocked);
        assert_eq!(memory.count(Operation::Insert), 0);
    }

    #[tokio::test]
    async fn close_revokes_previews() {
        let memory = Arc::new(MemoryBackend::with_user(user()));
        let registry = PreviewRegistry::new();
        let mut wizard = Wizard::start_with_registry(
            ListingFlow::new(&Config::default()),
            Backend::from_shared(memory),
            registry.clone(),
        )
        .await
        .unwrap();
        wizard
            .add_files(vec![LocalFile::from_bytes("a.png", "image/png", vec![1])])
            .unwrap();
        assert_eq!(registry.live_count(), 1);
        wizard.close();
        assert_eq!(registry.live_count(), 0);
    }
}
