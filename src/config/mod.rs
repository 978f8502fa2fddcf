use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::{
    errors::{MarketError, Result},
    utils::{
        app_data_dir,
        persistence::{ensure_dir, load_json, save_json},
    },
};

const CONFIG_DIR: &str = "config";
const CONFIG_FILE: &str = "config.json";
const BACKEND_DIR: &str = "backend";

pub const DEFAULT_MAX_IMAGES: usize = 5;
pub const DEFAULT_MAX_IMAGE_BYTES: u64 = 5 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub listing_bucket: String,
    pub profile_bucket: String,
    pub listings_table: String,
    pub profiles_table: String,
    pub max_listing_images: usize,
    pub max_image_bytes: u64,
    pub male_avatar: String,
    pub female_avatar: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend_root: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listing_bucket: "item".into(),
            profile_bucket: "student-market-place-profiles".into(),
            listings_table: "listings".into(),
            profiles_table: "profiles".into(),
            max_listing_images: DEFAULT_MAX_IMAGES,
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
            male_avatar: "/male-avatar.png".into(),
            female_avatar: "/female-avatar.png".into(),
            backend_root: None,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.max_listing_images == 0 {
            return Err(MarketError::ConfigError(
                "max_listing_images must be at least 1".into(),
            ));
        }
        if self.max_image_bytes == 0 {
            return Err(MarketError::ConfigError(
                "max_image_bytes must be greater than zero".into(),
            ));
        }
        for (key, value) in [
            ("listing_bucket", &self.listing_bucket),
            ("profile_bucket", &self.profile_bucket),
            ("listings_table", &self.listings_table),
            ("profiles_table", &self.profiles_table),
        ] {
            if value.trim().is_empty() {
                return Err(MarketError::ConfigError(format!("{} cannot be empty", key)));
            }
        }
        Ok(())
    }

    /// Avatar stored for profiles saved without a custom photo.
    pub fn default_avatar(&self, gender: &str) -> &str {
        if gender == "Male" {
            &self.male_avatar
        } else {
            &self.female_avatar
        }
    }
}

/// Loads and saves [`Config`] under the application data directory.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    base: PathBuf,
    path: PathBuf,
}

impl ConfigManager {
    pub fn new() -> Result<Self> {
        Self::with_base_dir(app_data_dir())
    }

    pub fn with_base_dir(base: PathBuf) -> Result<Self> {
        let config_root = base.join(CONFIG_DIR);
        ensure_dir(&config_root)?;
        Ok(Self {
            path: config_root.join(CONFIG_FILE),
            base,
        })
    }

    pub fn load(&self) -> Result<Config> {
        let config = load_json::<Config>(&self.path)?.unwrap_or_default();
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, config: &Config) -> Result<()> {
        config.validate()?;
        save_json(config, &self.path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory the local backend should use for `config`.
    pub fn backend_root(&self, config: &Config) -> PathBuf {
        config
            .backend_root
            .clone()
            .unwrap_or_else(|| self.base.join(BACKEND_DIR))
    }
}
