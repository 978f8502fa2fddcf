use std::{
    path::{Component, Path, PathBuf},
    sync::Mutex,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use uuid::Uuid;

use crate::utils::persistence::{ensure_dir, load_json, save_json};

use super::{
    AuthClient, BackendError, Filter, ObjectStorage, Record, RecordStore, SignUpOutcome, User,
};

const OBJECTS_DIR: &str = "objects";
const TABLES_DIR: &str = "tables";
const AUTH_DIR: &str = "auth";
const USERS_FILE: &str = "users.json";
const SESSION_FILE: &str = "session.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredUser {
    id: String,
    email: String,
    salt: String,
    password_hash: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SessionState {
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<User>,
}

/// Local stand-in for the managed backend, persisted as JSON files.
///
/// Objects live under `objects/<bucket>/<key>`, each table is one JSON
/// array under `tables/`, and the signed-in user is kept in
/// `auth/session.json`.
pub struct JsonBackend {
    root: PathBuf,
    objects_dir: PathBuf,
    tables_dir: PathBuf,
    auth_dir: PathBuf,
    // Serializes read-modify-write cycles on table and auth files.
    write_lock: Mutex<()>,
}

impl JsonBackend {
    pub fn new(root: PathBuf) -> Result<Self, BackendError> {
        let objects_dir = root.join(OBJECTS_DIR);
        let tables_dir = root.join(TABLES_DIR);
        let auth_dir = root.join(AUTH_DIR);
        for dir in [&root, &objects_dir, &tables_dir, &auth_dir] {
            ensure_dir(dir)?;
        }
        info!(root = %root.display(), "opened local backend");
        Ok(Self {
            root,
            objects_dir,
            tables_dir,
            auth_dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, BackendError> {
        let mut path = self.objects_dir.join(safe_segment(bucket)?);
        for component in Path::new(key).components() {
            match component {
                Component::Normal(part) => path.push(part),
                _ => {
                    return Err(BackendError::Storage(format!(
                        "invalid object key `{}`",
                        key
                    )))
                }
            }
        }
        Ok(path)
    }

    fn table_path(&self, table: &str) -> Result<PathBuf, BackendError> {
        Ok(self
            .tables_dir
            .join(format!("{}.json", safe_segment(table)?)))
    }

    fn read_table(&self, table: &str) -> Result<Vec<Record>, BackendError> {
        let path = self.table_path(table)?;
        Ok(load_json::<Vec<Record>>(&path)
            .map_err(|err| BackendError::Database(err.to_string()))?
            .unwrap_or_default())
    }

    fn write_table(&self, table: &str, rows: &[Record]) -> Result<(), BackendError> {
        let path = self.table_path(table)?;
        save_json(rows, &path).map_err(|err| BackendError::Database(err.to_string()))
    }

    fn read_users(&self) -> Result<Vec<StoredUser>, BackendError> {
        Ok(load_json(&self.auth_dir.join(USERS_FILE))
            .map_err(|err| BackendError::Auth(err.to_string()))?
            .unwrap_or_default())
    }

    fn write_session(&self, session: &SessionState) -> Result<(), BackendError> {
        save_json(session, &self.auth_dir.join(SESSION_FILE))
            .map_err(|err| BackendError::Auth(err.to_string()))
    }

    fn guard(&self) -> std::sync::MutexGuard<'_, ()> {
        self.write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn safe_segment(name: &str) -> Result<&str, BackendError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_'));
    if valid {
        Ok(name)
    } else {
        Err(BackendError::Storage(format!("invalid name `{}`", name)))
    }
}

fn hash_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[async_trait]
impl AuthClient for JsonBackend {
    async fn current_user(&self) -> Result<Option<User>, BackendError> {
        let session: Option<SessionState> = load_json(&self.auth_dir.join(SESSION_FILE))
            .map_err(|err| BackendError::Auth(err.to_string()))?;
        Ok(session.and_then(|state| state.user))
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpOutcome, BackendError> {
        let _guard = self.guard();
        let mut users = self.read_users()?;
        if users
            .iter()
            .any(|user| user.email.eq_ignore_ascii_case(email))
        {
            return Ok(SignUpOutcome::AlreadyRegistered);
        }
        let salt = Uuid::new_v4().simple().to_string();
        let stored = StoredUser {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            password_hash: hash_password(&salt, password),
            salt,
        };
        let user = User {
            id: stored.id.clone(),
            email: stored.email.clone(),
        };
        users.push(stored);
        save_json(&users, &self.auth_dir.join(USERS_FILE))
            .map_err(|err| BackendError::Auth(err.to_string()))?;
        info!(user = %user.id, "registered user");
        Ok(SignUpOutcome::Created(user))
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<User, BackendError> {
        let _guard = self.guard();
        let user = self
            .read_users()?
            .into_iter()
            .find(|user| {
                user.email.eq_ignore_ascii_case(email)
                    && user.password_hash == hash_password(&user.salt, password)
            })
            .map(|user| User {
                id: user.id,
                email: user.email,
            })
            .ok_or_else(|| BackendError::Auth("Invalid login credentials".into()))?;
        self.write_session(&SessionState {
            user: Some(user.clone()),
        })?;
        Ok(user)
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        let _guard = self.guard();
        self.write_session(&SessionState::default())
    }
}

#[async_trait]
impl ObjectStorage for JsonBackend {
    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), BackendError> {
        let path = self.object_path(bucket, key)?;
        let exists = tokio::fs::try_exists(&path)
            .await
            .map_err(|err| BackendError::Storage(err.to_string()))?;
        if exists {
            return Err(BackendError::Storage("The resource already exists".into()));
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| BackendError::Storage(err.to_string()))?;
        }
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|err| BackendError::Storage(err.to_string()))?;
        debug!(bucket, key, content_type, size = bytes.len(), "stored object");
        Ok(())
    }

    async fn public_url(&self, bucket: &str, key: &str) -> Result<String, BackendError> {
        let path = self.object_path(bucket, key)?;
        Ok(format!("file://{}", path.display()))
    }
}

#[async_trait]
impl RecordStore for JsonBackend {
    async fn insert(&self, table: &str, mut record: Record) -> Result<Record, BackendError> {
        let _guard = self.guard();
        let mut rows = self.read_table(table)?;
        if !record.contains_key("id") {
            record.insert("id".into(), Value::String(Uuid::new_v4().to_string()));
        }
        rows.push(record.clone());
        self.write_table(table, &rows)?;
        Ok(record)
    }

    async fn upsert(
        &self,
        table: &str,
        mut record: Record,
        conflict_key: &str,
    ) -> Result<Record, BackendError> {
        let _guard = self.guard();
        let key = record.get(conflict_key).cloned().ok_or_else(|| {
            BackendError::Database(format!("missing conflict column `{}`", conflict_key))
        })?;
        let mut rows = self.read_table(table)?;
        match rows.iter_mut().find(|row| row.get(conflict_key) == Some(&key)) {
            Some(existing) => {
                if let Some(id) = existing.get("id").cloned() {
                    record.insert("id".into(), id);
                }
                *existing = record.clone();
            }
            None => {
                if !record.contains_key("id") {
                    record.insert("id".into(), Value::String(Uuid::new_v4().to_string()));
                }
                rows.push(record.clone());
            }
        }
        self.write_table(table, &rows)?;
        Ok(record)
    }

    async fn select(&self, table: &str, filter: &Filter) -> Result<Vec<Record>, BackendError> {
        Ok(self
            .read_table(table)?
            .into_iter()
            .filter(|row| filter.matches(row))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[tokio::test]
    async fn objects_land_under_bucket_directory() {
        let temp = TempDir::new().unwrap();
        let backend = JsonBackend::new(temp.path().to_path_buf()).unwrap();
        backend
            .upload("item", "public/a.png", vec![1, 2, 3], "image/png")
            .await
            .unwrap();
        let stored = temp.path().join("objects/item/public/a.png");
        assert_eq!(std::fs::read(&stored).unwrap(), vec![1, 2, 3]);
        let url = backend.public_url("item", "public/a.png").await.unwrap();
        assert!(url.starts_with("file://"));
        assert!(url.ends_with("public/a.png"));
    }

    #[tokio::test]
    async fn existing_object_is_not_overwritten() {
        let temp = TempDir::new().unwrap();
        let backend = JsonBackend::new(temp.path().to_path_buf()).unwrap();
        backend.upload("item", "public/a.png", vec![1], "image/png").await.unwrap();

        let err = backend
            .upload("item", "public/a.png", vec![2], "image/png")
            .await
            .unwrap_err();
        assert_eq!(err, BackendError::Storage("The resource already exists".into()));
    }

    #[tokio::test]
    async fn unreadable_object_path_is_a_storage_error() {
        let temp = TempDir::new().unwrap();
        let backend = JsonBackend::new(temp.path().to_path_buf()).unwrap();
        let blocker = temp.path().join("objects/item/public");
        std::fs::create_dir_all(blocker.parent().unwrap()).unwrap();
        std::fs::write(&blocker, b"not a directory").unwrap();

        let err = backend
            .upload("item", "public/a.png", vec![1], "image/png")
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Storage(message) if message != "The resource already exists"));
        assert_eq!(std::fs::read(&blocker).unwrap(), b"not a directory");
    }

    #[tokio::test]
    async fn traversal_keys_are_refused() {
        let temp = TempDir::new().unwrap();
        let backend = JsonBackend::new(temp.path().to_path_buf()).unwrap();
        let err = backend
            .upload("item", "../escape.png", vec![0], "image/png")
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Storage(_)));
    }

    #[tokio::test]
    async fn tables_survive_reopen() {
        let temp = TempDir::new().unwrap();
        {
            let backend = JsonBackend::new(temp.path().to_path_buf()).unwrap();
            backend
                .insert("listings", record(json!({ "name": "Calculator" })))
                .await
                .unwrap();
        }
        let reopened = JsonBackend::new(temp.path().to_path_buf()).unwrap();
        let rows = reopened.select("listings", &Filter::new()).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].contains_key("id"));
    }

    #[tokio::test]
    async fn session_persists_signed_in_user() {
        let temp = TempDir::new().unwrap();
        let backend = JsonBackend::new(temp.path().to_path_buf()).unwrap();
        backend.sign_up("a@uni.edu", "password1").await.unwrap();
        assert!(backend.sign_in("a@uni.edu", "wrong-pass").await.is_err());
        let user = backend.sign_in("a@uni.edu", "password1").await.unwrap();
        assert_eq!(backend.current_user().await.unwrap(), Some(user));
        backend.sign_out().await.unwrap();
        assert_eq!(backend.current_user().await.unwrap(), None);
    }

    #[tokio::test]
    async fn passwords_are_not_stored_in_clear() {
        let temp = TempDir::new().unwrap();
        let backend = JsonBackend::new(temp.path().to_path_buf()).unwrap();
        backend.sign_up("a@uni.edu", "supersecret").await.unwrap();
        let raw = std::fs::read_to_string(temp.path().join("auth/users.json")).unwrap();
        assert!(!raw.contains("supersecret"));
    }
}
