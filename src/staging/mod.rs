//! Client-side preparation of images before submission.
//!
//! Selected files are checked and given a local preview reference right
//! away; nothing is transmitted until the wizard submits. Preview
//! references live in a [`PreviewRegistry`] and are revoked when their slot
//! is removed, replaced, or the staging area is dropped.

pub mod file;

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::{DEFAULT_MAX_IMAGES, DEFAULT_MAX_IMAGE_BYTES};

pub use file::LocalFile;

const PREVIEW_SCHEME: &str = "blob:campus-market/";

fn image_noun(max: &usize) -> &'static str {
    if *max == 1 {
        "image"
    } else {
        "images"
    }
}

fn megabytes(bytes: &u64) -> u64 {
    bytes / (1024 * 1024)
}

/// File rejected at selection time. Recoverable by choosing other files.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StagingError {
    #[error("Maximum {max} {} allowed", image_noun(.max))]
    TooMany { max: usize },
    #[error("Please upload an image file")]
    NotAnImage { name: String },
    #[error("Image size must be less than {}MB", megabytes(.limit))]
    TooLarge { name: String, size: u64, limit: u64 },
    #[error("No staged image at position {index}")]
    NoSuchSlot { index: usize },
}

/// Locally previewable reference to a staged file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PreviewRef(String);

impl PreviewRef {
    fn generate() -> Self {
        Self(format!("{}{}", PREVIEW_SCHEME, Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PreviewRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Shared table of live preview references, the local analogue of object URLs.
#[derive(Clone, Default)]
pub struct PreviewRegistry {
    entries: Arc<Mutex<HashMap<PreviewRef, LocalFile>>>,
}

impl PreviewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PreviewRef, LocalFile>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn create(&self, file: LocalFile) -> PreviewRef {
        let preview = PreviewRef::generate();
        self.lock().insert(preview.clone(), file);
        preview
    }

    /// Returns the file behind `preview` while it is still live.
    pub fn resolve(&self, preview: &PreviewRef) -> Option<LocalFile> {
        self.lock().get(preview).cloned()
    }

    pub fn revoke(&self, preview: &PreviewRef) -> bool {
        self.lock().remove(preview).is_some()
    }

    pub fn is_live(&self, preview: &PreviewRef) -> bool {
        self.lock().contains_key(preview)
    }

    pub fn live_count(&self) -> usize {
        self.lock().len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StagingLimits {
    pub max_count: usize,
    pub max_bytes: u64,
}

impl Default for StagingLimits {
    fn default() -> Self {
        Self {
            max_count: DEFAULT_MAX_IMAGES,
            max_bytes: DEFAULT_MAX_IMAGE_BYTES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedAsset {
    pub id: Uuid,
    pub preview: PreviewRef,
    pub name: String,
}

/// Ordered, bounded set of staged images owned by one wizard.
pub struct AssetStaging {
    limits: StagingLimits,
    registry: PreviewRegistry,
    assets: Vec<StagedAsset>,
}

impl AssetStaging {
    pub fn new(limits: StagingLimits, registry: PreviewRegistry) -> Self {
        Self {
            limits,
            registry,
            assets: Vec::new(),
        }
    }

    pub fn limits(&self) -> StagingLimits {
        self.limits
    }

    pub fn assets(&self) -> &[StagedAsset] {
        &self.assets
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    pub fn registry(&self) -> &PreviewRegistry {
        &self.registry
    }

    /// Stages a whole batch or nothing.
    ///
    /// The batch is refused with a single [`StagingError::TooMany`] when it
    /// would overflow the limit; otherwise every file is checked and the
    /// first offending file rejects the batch.
    pub fn add_files(&mut self, files: Vec<LocalFile>) -> Result<Vec<PreviewRef>, StagingError> {
        if self.assets.len() + files.len() > self.limits.max_count {
            warn!(
                staged = self.assets.len(),
                batch = files.len(),
                max = self.limits.max_count,
                "rejected image batch"
            );
            return Err(StagingError::TooMany {
                max: self.limits.max_count,
            });
        }
        self.check_batch(&files)?;
        Ok(self.commit(files))
    }

    /// Swaps the staged set for `files`, revoking every replaced preview.
    pub fn replace_all(&mut self, files: Vec<LocalFile>) -> Result<Vec<PreviewRef>, StagingError> {
        if files.len() > self.limits.max_count {
            return Err(StagingError::TooMany {
                max: self.limits.max_count,
            });
        }
        self.check_batch(&files)?;
        self.clear();
        Ok(self.commit(files))
    }

    /// Removes one slot; the remaining slots keep their ids and previews.
    pub fn remove_at(&mut self, index: usize) -> Result<StagedAsset, StagingError> {
        if index >= self.assets.len() {
            return Err(StagingError::NoSuchSlot { index });
        }
        let removed = self.assets.remove(index);
        self.registry.revoke(&removed.preview);
        debug!(slot = %removed.id, "removed staged image");
        Ok(removed)
    }

    pub fn clear(&mut self) {
        for asset in self.assets.drain(..) {
            self.registry.revoke(&asset.preview);
        }
    }

    pub fn resolve(&self, asset: &StagedAsset) -> Option<LocalFile> {
        self.registry.resolve(&asset.preview)
    }

    fn check_batch(&self, files: &[LocalFile]) -> Result<(), StagingError> {
        for file in files {
            if !file.is_image() {
                warn!(file = %file.name(), content_type = %file.content_type(), "rejected non-image");
                return Err(StagingError::NotAnImage {
                    name: file.name().to_string(),
                });
            }
            if file.size() > self.limits.max_bytes {
                warn!(file = %file.name(), size = file.size(), "rejected oversized image");
                return Err(StagingError::TooLarge {
                    name: file.name().to_string(),
                    size: file.size(),
                    limit: self.limits.max_bytes,
                });
            }
        }
        Ok(())
    }

    fn commit(&mut self, files: Vec<LocalFile>) -> Vec<PreviewRef> {
        let mut previews = Vec::with_capacity(files.len());
        for file in files {
            let name = file.name().to_string();
            let preview = self.registry.create(file);
            previews.push(preview.clone());
            self.assets.push(StagedAsset {
                id: Uuid::new_v4(),
                preview,
                name,
            });
        }
        previews
    }
}

impl Drop for AssetStaging {
    fn drop(&mut self) {
        if !self.assets.is_empty() {
            debug!(count = self.assets.len(), "revoking staged previews");
        }
        self.clear();
    }
}
