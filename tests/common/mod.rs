#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use campus_market::{
    backend::{Backend, JsonBackend, MemoryBackend, User},
    config::{Config, ConfigManager},
    staging::LocalFile,
};
use once_cell::sync::Lazy;
use tempfile::TempDir;

/// Holds TempDir guards so temporary folders live for the duration of the test run.
static TEST_DIRS: Lazy<Mutex<Vec<TempDir>>> = Lazy::new(|| Mutex::new(Vec::new()));

pub fn student() -> User {
    User {
        id: "student-1".into(),
        email: "asha@uni.edu".into(),
    }
}

/// In-memory collaborators with `student()` signed in.
pub fn signed_in_backend() -> (Arc<MemoryBackend>, Backend) {
    let memory = Arc::new(MemoryBackend::with_user(student()));
    let backend = Backend::from_shared(memory.clone());
    (memory, backend)
}

pub fn anonymous_backend() -> (Arc<MemoryBackend>, Backend) {
    let memory = Arc::new(MemoryBackend::new());
    let backend = Backend::from_shared(memory.clone());
    (memory, backend)
}

/// Creates a JSON backend and config manager in a unique temporary directory.
pub fn setup_json_env() -> (Arc<JsonBackend>, ConfigManager) {
    let temp = TempDir::new().expect("create temp dir");
    let base = temp.path().to_path_buf();
    TEST_DIRS.lock().expect("lock temp dir registry").push(temp);

    let manager = ConfigManager::with_base_dir(base).expect("create config manager for temp dir");
    let root = manager.backend_root(&Config::default());
    let backend = JsonBackend::new(root).expect("create json backend");
    (Arc::new(backend), manager)
}

pub fn png(name: &str) -> LocalFile {
    LocalFile::from_bytes(name, "image/png", vec![0x89, 0x50, 0x4e, 0x47])
}

pub fn pngs(count: usize) -> Vec<LocalFile> {
    (0..count).map(|i| png(&format!("photo-{}.png", i))).collect()
}
