//! Per-flow configuration plugged into the generic [`crate::wizard::Wizard`].
//!
//! A flow describes its steps and rules, whether it stages images and
//! where they go, and how the collected values become the final write.

pub mod listing;
pub mod profile;
pub mod signup;

use std::sync::Arc;

use async_trait::async_trait;

use crate::backend::{Backend, BackendError, Record, User};
use crate::forms::{FormDescriptor, FormState, ValidationErrors};
use crate::staging::StagingLimits;
use crate::submission::{Commit, Committed, SubmissionError, UploadTarget};

pub use listing::{DeliveryOption, ListingFlow, ListingRecord};
pub use profile::{ProfileFlow, ProfileRecord};
pub use signup::SignupFlow;

/// Where the front end should go next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Login,
    Listings,
    Dashboard,
    EmailVerification { email: String },
}

impl Route {
    pub fn path(&self) -> String {
        match self {
            Route::Login => "/login".to_string(),
            Route::Listings => "/listings".to_string(),
            Route::Dashboard => "/dashboard".to_string(),
            Route::EmailVerification { email } => {
                format!("/email-verification?email={}", encode_query_value(email))
            }
        }
    }
}

/// Percent-encodes everything outside the RFC 3986 unreserved set.
fn encode_query_value(value: &str) -> String {
    let mut encoded = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                encoded.push(byte as char)
            }
            other => encoded.push_str(&format!("%{:02X}", other)),
        }
    }
    encoded
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.path())
    }
}

#[async_trait]
pub trait FlowSpec: Send + Sync {
    /// Descriptor controlling step order and validation.
    fn descriptor(&self) -> Arc<FormDescriptor>;

    /// Whether the flow needs a signed-in user.
    fn requires_auth(&self) -> bool {
        true
    }

    /// Image limits, or `None` when the flow stages no files.
    fn staging_limits(&self) -> Option<StagingLimits> {
        None
    }

    fn upload_target(&self, _user: Option<&User>) -> Option<UploadTarget> {
        None
    }

    /// Banner shown when submit finds an earlier step incomplete.
    fn incomplete_message(&self) -> &'static str {
        "Please complete all required fields correctly"
    }

    /// Values loaded before the first step is shown.
    async fn prefill(
        &self,
        _backend: &Backend,
        _user: Option<&User>,
    ) -> Result<Option<FormState>, BackendError> {
        Ok(None)
    }

    /// Checks that need a collaborator, run once local rules pass.
    async fn remote_check(
        &self,
        _step: &str,
        _values: &FormState,
        _backend: &Backend,
        _user: Option<&User>,
    ) -> ValidationErrors {
        ValidationErrors::new()
    }

    /// Builds the final write from the collected values and uploaded URLs.
    fn commit(
        &self,
        values: &FormState,
        uploads: &[String],
        user: Option<&User>,
    ) -> Result<Commit, SubmissionError>;

    fn route_after(&self, values: &FormState, committed: &Committed) -> Route;
}

/// Splits comma-separated text into trimmed, non-empty entries.
pub fn split_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .collect()
}

/// Trimmed text, or `None` when nothing was entered.
pub fn non_empty(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub(crate) fn to_record<T: serde::Serialize>(value: &T) -> Result<Record, SubmissionError> {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::Object(map)) => Ok(map),
        Ok(_) => Err(SubmissionError::Invalid("record is not an object".into())),
        Err(err) => Err(SubmissionError::Invalid(err.to_string())),
    }
}

pub(crate) fn signed_in(user: Option<&User>) -> Result<&User, SubmissionError> {
    user.ok_or(SubmissionError::AuthRequired)
}
