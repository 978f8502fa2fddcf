use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::backend::{Backend, BackendError, Filter, User};
use crate::config::Config;
use crate::forms::{
    FieldDescriptor, FieldKind, FormDescriptor, FormState, Rule, StepDescriptor, ValidationErrors,
};
use crate::staging::StagingLimits;
use crate::submission::{Commit, Committed, PersistMode, SubmissionError, UploadTarget};

use super::{signed_in, to_record, FlowSpec, Route};

pub const GENDERS: [&str; 4] = ["Male", "Female", "Other", "Prefer not to say"];
pub const BIO_LIMIT: usize = 150;

/// Form key holding the already-saved photo URL; not user-editable.
pub const EXISTING_PHOTO: &str = "profilePhoto";

static USERNAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9_]{3,15}$").unwrap_or_else(|err| panic!("invalid username pattern: {err}"))
});

const USERNAME_TAKEN: &str = "Username is already taken";
const USERNAME_CHECK_FAILED: &str = "Error checking username availability";
const BIO_MESSAGE: &str = "Bio is required and must be 150 characters or less";

/// Row upserted into the profiles table, keyed by `user_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileRecord {
    pub user_id: String,
    pub name: String,
    pub university: String,
    pub profile_photo: String,
    pub username: String,
    pub bio: String,
    pub gender: String,
    pub updated_at: DateTime<Utc>,
}

/// Six-slide profile setup: photo, details, username, gender, bio, review.
pub struct ProfileFlow {
    descriptor: Arc<FormDescriptor>,
    config: Config,
}

impl ProfileFlow {
    pub fn new(config: &Config) -> Self {
        Self {
            descriptor: Arc::new(profile_descriptor()),
            config: config.clone(),
        }
    }

    /// Photo URL to store: a fresh upload, else the saved photo, else the
    /// avatar for the chosen gender.
    pub fn photo_for(&self, values: &FormState, uploads: &[String]) -> String {
        if let Some(url) = uploads.first() {
            return url.clone();
        }
        let existing = values.text(EXISTING_PHOTO).trim();
        if !existing.is_empty() {
            return existing.to_string();
        }
        self.config.default_avatar(values.text("gender")).to_string()
    }
}

fn profile_descriptor() -> FormDescriptor {
    FormDescriptor::new(
        "profile",
        vec![
            StepDescriptor::new("photo", "Profile Photo", Vec::new()),
            StepDescriptor::new(
                "details",
                "Your Details",
                vec![
                    FieldDescriptor::new("name", "Full name", FieldKind::Text)
                        .rule(Rule::Required, "Name is required"),
                    FieldDescriptor::new("university", "University", FieldKind::Text)
                        .rule(Rule::Required, "University is required"),
                ],
            )
            .with_banner("Name and University are required"),
            StepDescriptor::new(
                "username",
                "Choose a Username",
                vec![FieldDescriptor::new("username", "Username", FieldKind::Text)
                    .with_help("3-15 letters, numbers, or underscores")
                    .rule(Rule::Required, "Username is required")
                    .rule(
                        Rule::Pattern(USERNAME.clone()),
                        "Username must be 3-15 characters, using letters, numbers, or underscores",
                    )],
            )
            .with_banner("Please choose a valid, unique username"),
            StepDescriptor::new(
                "gender",
                "Gender",
                vec![
                    FieldDescriptor::new("gender", "Gender", FieldKind::Choice(GENDERS.to_vec()))
                        .rule(Rule::Required, "Gender is required")
                        .rule(Rule::OneOf(GENDERS.to_vec()), "Gender is required"),
                ],
            )
            .with_banner("Gender is required"),
            StepDescriptor::new(
                "bio",
                "About You",
                vec![FieldDescriptor::new("bio", "Bio", FieldKind::LongText)
                    .with_help("Up to 150 characters")
                    .rule(Rule::Required, BIO_MESSAGE)
                    .rule(Rule::MaxLength(BIO_LIMIT), BIO_MESSAGE)],
            )
            .with_banner(BIO_MESSAGE),
            StepDescriptor::new("review", "Review Profile", Vec::new()),
        ],
    )
}

fn column_text(row: &serde_json::Map<String, Value>, column: &str) -> Option<String> {
    match row.get(column) {
        Some(Value::String(text)) if !text.is_empty() => Some(text.clone()),
        _ => None,
    }
}

#[async_trait]
impl FlowSpec for ProfileFlow {
    fn descriptor(&self) -> Arc<FormDescriptor> {
        self.descriptor.clone()
    }

    fn staging_limits(&self) -> Option<StagingLimits> {
        Some(StagingLimits {
            max_count: 1,
            max_bytes: self.config.max_image_bytes,
        })
    }

    fn upload_target(&self, user: Option<&User>) -> Option<UploadTarget> {
        let user = user?;
        Some(UploadTarget {
            bucket: self.config.profile_bucket.clone(),
            key_prefix: format!("{}-", user.id),
        })
    }

    async fn prefill(
        &self,
        backend: &Backend,
        user: Option<&User>,
    ) -> Result<Option<FormState>, BackendError> {
        let Some(user) = user else {
            return Ok(None);
        };
        let rows = backend
            .records
            .select(
                &self.config.profiles_table,
                &Filter::new().eq("user_id", user.id.clone()),
            )
            .await?;
        let Some(row) = rows.first() else {
            debug!(user = %user.id, "no saved profile");
            return Ok(None);
        };
        let mut values = FormState::new();
        for (column, key) in [
            ("name", "name"),
            ("university", "university"),
            ("username", "username"),
            ("bio", "bio"),
            ("gender", "gender"),
            ("profile_photo", EXISTING_PHOTO),
        ] {
            if let Some(text) = column_text(row, column) {
                values.set(key, text);
            }
        }
        Ok(Some(values))
    }

    async fn remote_check(
        &self,
        step: &str,
        values: &FormState,
        backend: &Backend,
        user: Option<&User>,
    ) -> ValidationErrors {
        let mut errors = ValidationErrors::new();
        if step != "username" {
            return errors;
        }
        let mut filter = Filter::new().eq("username", values.text("username").trim());
        if let Some(user) = user {
            filter = filter.neq("user_id", user.id.clone());
        }
        match backend
            .records
            .select(&self.config.profiles_table, &filter)
            .await
        {
            Ok(rows) if rows.is_empty() => {}
            Ok(_) => errors.insert("username", USERNAME_TAKEN),
            Err(err) => {
                warn!(error = %err, "username availability check failed");
                errors.insert("username", USERNAME_CHECK_FAILED);
            }
        }
        errors
    }

    fn commit(
        &self,
        values: &FormState,
        uploads: &[String],
        user: Option<&User>,
    ) -> Result<Commit, SubmissionError> {
        let user = signed_in(user)?;
        let record = ProfileRecord {
            user_id: user.id.clone(),
            name: values.text("name").trim().to_string(),
            university: values.text("university").trim().to_string(),
            profile_photo: self.photo_for(values, uploads),
            username: values.text("username").trim().to_string(),
            bio: values.text("bio").trim().to_string(),
            gender: values.text("gender").to_string(),
            updated_at: Utc::now(),
        };
        Ok(Commit::Record {
            table: self.config.profiles_table.clone(),
            label: "profile",
            mode: PersistMode::Upsert {
                conflict_key: "user_id",
            },
            record: to_record(&record)?,
        })
    }

    fn route_after(&self, _values: &FormState, _committed: &Committed) -> Route {
        Route::Dashboard
    }
}
