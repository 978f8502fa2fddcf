use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use super::{
    AuthClient, BackendError, Filter, ObjectStorage, Record, RecordStore, SignUpOutcome, User,
};

const DEFAULT_BASE_URL: &str = "https://storage.invalid/object/public";

/// Collaborator operations that can be observed or made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    SignUp,
    Upload,
    PublicUrl,
    Insert,
    Upsert,
    Select,
}

/// One observed collaborator call, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    SignUp { email: String },
    Upload { bucket: String, key: String, size: usize },
    PublicUrl { bucket: String, key: String },
    Insert { table: String, record: Record },
    Upsert { table: String, record: Record },
    Select { table: String },
}

#[derive(Default)]
struct MemoryState {
    users: Vec<(User, String)>,
    current: Option<User>,
    objects: BTreeMap<(String, String), (Vec<u8>, String)>,
    tables: BTreeMap<String, Vec<Record>>,
    calls: Vec<BackendCall>,
    counts: HashMap<Operation, usize>,
    failures: HashMap<(Operation, usize), String>,
}

/// In-process backend that records every call and fails on request.
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
    base_url: String,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Starts with `user` signed in.
    pub fn with_user(user: User) -> Self {
        let backend = Self::new();
        backend.lock().current = Some(user);
        backend
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Makes the `nth` (1-based) call of `op` fail with `message`.
    pub fn fail_on(&self, op: Operation, nth: usize, message: impl Into<String>) {
        self.lock().failures.insert((op, nth), message.into());
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.lock().calls.clone()
    }

    pub fn count(&self, op: Operation) -> usize {
        self.lock().counts.get(&op).copied().unwrap_or(0)
    }

    pub fn rows(&self, table: &str) -> Vec<Record> {
        self.lock().tables.get(table).cloned().unwrap_or_default()
    }

    pub fn seed_row(&self, table: &str, record: Record) {
        self.lock()
            .tables
            .entry(table.to_string())
            .or_default()
            .push(record);
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.lock()
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .map(|(bytes, _)| bytes.clone())
    }

    fn begin(
        state: &mut MemoryState,
        op: Operation,
        call: BackendCall,
    ) -> Option<String> {
        let counter = state.counts.entry(op).or_insert(0);
        *counter += 1;
        let nth = *counter;
        state.calls.push(call);
        state.failures.remove(&(op, nth))
    }
}

fn with_id(mut record: Record) -> Record {
    if !record.contains_key("id") {
        record.insert("id".into(), Value::String(Uuid::new_v4().to_string()));
    }
    record
}

#[async_trait]
impl AuthClient for MemoryBackend {
    async fn current_user(&self) -> Result<Option<User>, BackendError> {
        Ok(self.lock().current.clone())
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpOutcome, BackendError> {
        let mut state = self.lock();
        let call = BackendCall::SignUp {
            email: email.to_string(),
        };
        if let Some(message) = Self::begin(&mut state, Operation::SignUp, call) {
            return Err(BackendError::Auth(message));
        }
        if state
            .users
            .iter()
            .any(|(user, _)| user.email.eq_ignore_ascii_case(email))
        {
            return Ok(SignUpOutcome::AlreadyRegistered);
        }
        let user = User {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
        };
        state.users.push((user.clone(), password.to_string()));
        Ok(SignUpOutcome::Created(user))
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<User, BackendError> {
        let mut state = self.lock();
        let user = state
            .users
            .iter()
            .find(|(user, secret)| user.email.eq_ignore_ascii_case(email) && secret == password)
            .map(|(user, _)| user.clone())
            .ok_or_else(|| BackendError::Auth("Invalid login credentials".into()))?;
        state.current = Some(user.clone());
        Ok(user)
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        self.lock().current = None;
        Ok(())
    }
}

#[async_trait]
impl ObjectStorage for MemoryBackend {
    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), BackendError> {
        let mut state = self.lock();
        let call = BackendCall::Upload {
            bucket: bucket.to_string(),
            key: key.to_string(),
            size: bytes.len(),
        };
        if let Some(message) = Self::begin(&mut state, Operation::Upload, call) {
            return Err(BackendError::Storage(message));
        }
        let slot = (bucket.to_string(), key.to_string());
        if state.objects.contains_key(&slot) {
            return Err(BackendError::Storage("The resource already exists".into()));
        }
        state
            .objects
            .insert(slot, (bytes, content_type.to_string()));
        Ok(())
    }

    async fn public_url(&self, bucket: &str, key: &str) -> Result<String, BackendError> {
        let mut state = self.lock();
        let call = BackendCall::PublicUrl {
            bucket: bucket.to_string(),
            key: key.to_string(),
        };
        if let Some(message) = Self::begin(&mut state, Operation::PublicUrl, call) {
            return Err(BackendError::Storage(message));
        }
        Ok(format!("{}/{}/{}", self.base_url, bucket, key))
    }
}

#[async_trait]
impl RecordStore for MemoryBackend {
    async fn insert(&self, table: &str, record: Record) -> Result<Record, BackendError> {
        let mut state = self.lock();
        let call = BackendCall::Insert {
            table: table.to_string(),
            record: record.clone(),
        };
        if let Some(message) = Self::begin(&mut state, Operation::Insert, call) {
            return Err(BackendError::Database(message));
        }
        let stored = with_id(record);
        state
            .tables
            .entry(table.to_string())
            .or_default()
            .push(stored.clone());
        Ok(stored)
    }

    async fn upsert(
        &self,
        table: &str,
        record: Record,
        conflict_key: &str,
    ) -> Result<Record, BackendError> {
        let mut state = self.lock();
        let call = BackendCall::Upsert {
            table: table.to_string(),
            record: record.clone(),
        };
        if let Some(message) = Self::begin(&mut state, Operation::Upsert, call) {
            return Err(BackendError::Database(message));
        }
        let key = record.get(conflict_key).cloned().ok_or_else(|| {
            BackendError::Database(format!("missing conflict column `{}`", conflict_key))
        })?;
        let rows = state.tables.entry(table.to_string()).or_default();
        let stored = match rows.iter_mut().find(|row| row.get(conflict_key) == Some(&key)) {
            Some(existing) => {
                let id = existing.get("id").cloned();
                *existing = record;
                if let Some(id) = id {
                    existing.insert("id".into(), id);
                }
                existing.clone()
            }
            None => {
                let stored = with_id(record);
                rows.push(stored.clone());
                stored
            }
        };
        Ok(stored)
    }

    async fn select(&self, table: &str, filter: &Filter) -> Result<Vec<Record>, BackendError> {
        let mut state = self.lock();
        let call = BackendCall::Select {
            table: table.to_string(),
        };
        if let Some(message) = Self::begin(&mut state, Operation::Select, call) {
            return Err(BackendError::Database(message));
        }
        Ok(state
            .tables
            .get(table)
            .map(|rows| rows.iter().filter(|row| filter.matches(row)).cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[tokio::test]
    async fn injected_failure_hits_only_the_nth_call() {
        let backend = MemoryBackend::new();
        backend.fail_on(Operation::Upload, 2, "quota exceeded");
        assert!(backend.upload("item", "a.png", vec![1], "image/png").await.is_ok());
        let err = backend
            .upload("item", "b.png", vec![2], "image/png")
            .await
            .unwrap_err();
        assert_eq!(err, BackendError::Storage("quota exceeded".into()));
        assert!(backend.upload("item", "c.png", vec![3], "image/png").await.is_ok());
        assert_eq!(backend.count(Operation::Upload), 3);
        assert!(backend.object("item", "b.png").is_none());
    }

    #[tokio::test]
    async fn duplicate_sign_up_is_reported() {
        let backend = MemoryBackend::new();
        let first = backend.sign_up("a@uni.edu", "password1").await.unwrap();
        assert!(matches!(first, SignUpOutcome::Created(_)));
        let second = backend.sign_up("A@uni.edu", "password2").await.unwrap();
        assert_eq!(second, SignUpOutcome::AlreadyRegistered);
        assert!(backend.sign_in("a@uni.edu", "password1").await.is_ok());
        assert!(backend.current_user().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn upsert_replaces_matching_row_and_keeps_id() {
        let backend = MemoryBackend::new();
        let first = backend
            .upsert("profiles", record(json!({ "user_id": "u1", "bio": "one" })), "user_id")
            .await
            .unwrap();
        let second = backend
            .upsert("profiles", record(json!({ "user_id": "u1", "bio": "two" })), "user_id")
            .await
            .unwrap();
        assert_eq!(first.get("id"), second.get("id"));
        let rows = backend.rows("profiles");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("bio"), Some(&json!("two")));
    }

    #[tokio::test]
    async fn select_applies_filter() {
        let backend = MemoryBackend::new();
        backend.seed_row("profiles", record(json!({ "username": "asha", "user_id": "u1" })));
        backend.seed_row("profiles", record(json!({ "username": "ravi", "user_id": "u2" })));
        let rows = backend
            .select("profiles", &Filter::new().eq("username", "ravi"))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(backend.calls().len(), 1);
    }
}
