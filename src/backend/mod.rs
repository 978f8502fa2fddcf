//! Contracts for the managed backend the wizards talk to.
//!
//! Auth, object storage, and the record store are separate traits so a
//! wizard can be handed any combination of real and substitute clients.
//! Two implementations ship with the crate: [`memory::MemoryBackend`] for
//! tests and [`json_backend::JsonBackend`] for local use.

pub mod json_backend;
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

pub use json_backend::JsonBackend;
pub use memory::{BackendCall, MemoryBackend, Operation};

/// A row as exchanged with the record store.
pub type Record = Map<String, Value>;

/// Failure reported by a collaborator. The message is shown to users verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("{0}")]
    Auth(String),
    #[error("{0}")]
    Storage(String),
    #[error("{0}")]
    Database(String),
}

impl From<crate::errors::MarketError> for BackendError {
    fn from(err: crate::errors::MarketError) -> Self {
        BackendError::Storage(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignUpOutcome {
    Created(User),
    /// The address already has an identity; nothing was created.
    AlreadyRegistered,
}

/// Conjunction of equality and inequality column constraints.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    eq: Vec<(String, Value)>,
    neq: Vec<(String, Value)>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.eq.push((column.into(), value.into()));
        self
    }

    pub fn neq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.neq.push((column.into(), value.into()));
        self
    }

    pub fn matches(&self, record: &Record) -> bool {
        let null = Value::Null;
        self.eq
            .iter()
            .all(|(column, value)| record.get(column).unwrap_or(&null) == value)
            && self
                .neq
                .iter()
                .all(|(column, value)| record.get(column).unwrap_or(&null) != value)
    }
}

#[async_trait]
pub trait AuthClient: Send + Sync {
    async fn current_user(&self) -> Result<Option<User>, BackendError>;
    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpOutcome, BackendError>;
    async fn sign_in(&self, email: &str, password: &str) -> Result<User, BackendError>;
    async fn sign_out(&self) -> Result<(), BackendError>;
}

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), BackendError>;

    /// Durable public reference for an uploaded object.
    async fn public_url(&self, bucket: &str, key: &str) -> Result<String, BackendError>;
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Inserts `record` and returns the stored row, including its `id`.
    async fn insert(&self, table: &str, record: Record) -> Result<Record, BackendError>;

    /// Inserts or replaces the row whose `conflict_key` column matches.
    async fn upsert(
        &self,
        table: &str,
        record: Record,
        conflict_key: &str,
    ) -> Result<Record, BackendError>;

    async fn select(&self, table: &str, filter: &Filter) -> Result<Vec<Record>, BackendError>;
}

/// The collaborator clients handed to a wizard.
#[derive(Clone)]
pub struct Backend {
    pub auth: Arc<dyn AuthClient>,
    pub storage: Arc<dyn ObjectStorage>,
    pub records: Arc<dyn RecordStore>,
}

impl Backend {
    pub fn new(
        auth: Arc<dyn AuthClient>,
        storage: Arc<dyn ObjectStorage>,
        records: Arc<dyn RecordStore>,
    ) -> Self {
        Self {
            auth,
            storage,
            records,
        }
    }

    /// Uses one client for all three contracts.
    pub fn from_shared<T>(client: Arc<T>) -> Self
    where
        T: AuthClient + ObjectStorage + RecordStore + 'static,
    {
        Self {
            auth: client.clone(),
            storage: client.clone(),
            records: client,
        }
    }
}

/// Identifier of a persisted row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordRef {
    pub table: String,
    pub id: String,
}

impl RecordRef {
    /// Reads `id` from a stored row, falling back to `fallback_key`.
    pub fn from_row(table: &str, row: &Record, fallback_key: &str) -> Self {
        let id = row
            .get("id")
            .or_else(|| row.get(fallback_key))
            .map(|value| match value {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            })
            .unwrap_or_default();
        Self {
            table: table.to_string(),
            id,
        }
    }
}
