//! Staged submission pipeline: resolve staged files, upload them, collect
//! their public URLs, then persist a single record.
//!
//! Stages run strictly one after another and the first failure aborts the
//! rest, so a record is only written once every upload has succeeded.

pub mod tracker;

use chrono::Utc;
use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;

use crate::backend::{Backend, BackendError, Record, RecordRef, SignUpOutcome, User};
use crate::staging::AssetStaging;

pub use tracker::{SubmissionStage, SubmissionState, SubmissionTracker};

/// Any failure during submission, rendered as one user-facing message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmissionError {
    #[error("Failed to fetch image {index}")]
    AssetUnavailable { index: usize },
    #[error("Failed to upload image: {0}")]
    Upload(BackendError),
    #[error("Failed to {verb} {label}: {source}")]
    Persist {
        verb: &'static str,
        label: &'static str,
        source: BackendError,
    },
    #[error("{0}")]
    Auth(BackendError),
    #[error("Not authenticated")]
    AuthRequired,
    #[error("A user with this email already exists")]
    AlreadyRegistered,
    #[error("Could not prepare submission: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistMode {
    Insert,
    Upsert { conflict_key: &'static str },
}

impl PersistMode {
    fn verb(&self) -> &'static str {
        match self {
            PersistMode::Insert => "create",
            PersistMode::Upsert { .. } => "save",
        }
    }
}

/// Final write a flow asks the pipeline to perform.
#[derive(Debug, Clone, PartialEq)]
pub enum Commit {
    Record {
        table: String,
        label: &'static str,
        mode: PersistMode,
        record: Record,
    },
    SignUp {
        email: String,
        password: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Committed {
    Record(RecordRef),
    SignedUp(User),
}

/// Where staged files go and how their object keys start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTarget {
    pub bucket: String,
    pub key_prefix: String,
}

impl UploadTarget {
    /// Collision-resistant key: prefix, millisecond timestamp, random suffix, extension.
    pub fn object_key(&self, extension: &str) -> String {
        let mut suffix = Uuid::new_v4().simple().to_string();
        suffix.truncate(10);
        format!(
            "{}{}-{}.{}",
            self.key_prefix,
            Utc::now().timestamp_millis(),
            suffix,
            extension
        )
    }
}

/// Drives one submission attempt against the injected collaborators.
pub struct Submitter<'a> {
    backend: &'a Backend,
    tracker: &'a mut SubmissionTracker,
}

impl<'a> Submitter<'a> {
    pub fn new(backend: &'a Backend, tracker: &'a mut SubmissionTracker) -> Self {
        Self { backend, tracker }
    }

    /// Uploads every staged file in order and returns their public URLs.
    pub async fn upload_assets(
        &mut self,
        staging: &AssetStaging,
        target: &UploadTarget,
    ) -> Result<Vec<String>, SubmissionError> {
        self.tracker.enter(SubmissionStage::ResolvingAssets);
        let mut resolved = Vec::with_capacity(staging.len());
        for (position, asset) in staging.assets().iter().enumerate() {
            let index = position + 1;
            let file = staging
                .resolve(asset)
                .ok_or(SubmissionError::AssetUnavailable { index })?;
            let bytes = file
                .read_bytes()
                .await
                .map_err(|_| SubmissionError::AssetUnavailable { index })?;
            resolved.push((file, bytes));
        }

        let total = resolved.len();
        let mut urls = Vec::with_capacity(total);
        for (position, (file, bytes)) in resolved.into_iter().enumerate() {
            self.tracker.enter(SubmissionStage::Uploading {
                index: position + 1,
                total,
            });
            let key = target.object_key(&file.extension());
            info!(bucket = %target.bucket, key = %key, "uploading image");
            self.backend
                .storage
                .upload(&target.bucket, &key, bytes, file.content_type())
                .await
                .map_err(SubmissionError::Upload)?;
            let url = self
                .backend
                .storage
                .public_url(&target.bucket, &key)
                .await
                .map_err(SubmissionError::Upload)?;
            urls.push(url);
        }
        Ok(urls)
    }

    pub async fn commit(&mut self, commit: Commit) -> Result<Committed, SubmissionError> {
        self.tracker.enter(SubmissionStage::Persisting);
        match commit {
            Commit::Record {
                table,
                label,
                mode,
                record,
            } => {
                let fallback_key = match mode {
                    PersistMode::Insert => "id",
                    PersistMode::Upsert { conflict_key } => conflict_key,
                };
                let stored = match mode {
                    PersistMode::Insert => self.backend.records.insert(&table, record).await,
                    PersistMode::Upsert { conflict_key } => {
                        self.backend
                            .records
                            .upsert(&table, record, conflict_key)
                            .await
                    }
                }
                .map_err(|source| SubmissionError::Persist {
                    verb: mode.verb(),
                    label,
                    source,
                })?;
                let reference = RecordRef::from_row(&table, &stored, fallback_key);
                info!(table = %reference.table, id = %reference.id, "persisted record");
                Ok(Committed::Record(reference))
            }
            Commit::SignUp { email, password } => {
                match self
                    .backend
                    .auth
                    .sign_up(&email, &password)
                    .await
                    .map_err(SubmissionError::Auth)?
                {
                    SignUpOutcome::Created(user) => {
                        info!(user = %user.id, "account created");
                        Ok(Committed::SignedUp(user))
                    }
                    SignUpOutcome::AlreadyRegistered => Err(SubmissionError::AlreadyRegistered),
                }
            }
        }
    }
}

/// Records the outcome of an attempt on the tracker.
pub fn settle(
    tracker: &mut SubmissionTracker,
    outcome: &Result<Committed, SubmissionError>,
) {
    match outcome {
        Ok(Committed::Record(reference)) => tracker.succeed(reference.clone()),
        Ok(Committed::SignedUp(user)) => tracker.succeed(RecordRef {
            table: "users".into(),
            id: user.id.clone(),
        }),
        Err(err) => {
            error!(error = %err, "submission failed");
            tracker.fail(err.to_string());
        }
    }
}
