//! Run settings
//!
//! Stored as JSON. A missing file is created with defaults so a first run
//! leaves something to edit.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::{AppError, AppResult};

const CURSEFORGE_KEY_PREFIX: &str = "$2a$10$";
const CURSEFORGE_KEY_LEN: usize = 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Required for CurseForge mods, see https://console.curseforge.com
    pub curseforge_api_key: Option<String>,
    /// Where fetched files are kept between runs, per loader and game version
    pub downloads_dir: PathBuf,
    pub instances_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub max_concurrent_mods: usize,
    pub request_timeout_secs: u64,
    pub download_retries: u32,
    pub prune_duplicates: bool,
    pub user_agent: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            curseforge_api_key: None,
            downloads_dir: PathBuf::from("downloads"),
            instances_dir: PathBuf::from("instances"),
            logs_dir: PathBuf::from("logs"),
            max_concurrent_mods: 4,
            request_timeout_secs: 60,
            download_retries: 3,
            prune_duplicates: true,
            user_agent: format!("modsync/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Settings {
    /// Load settings from `path`, writing defaults there first if it does not exist.
    /// Relative folders are resolved against the settings file's directory.
    pub async fn load(path: &Path) -> AppResult<Self> {
        let settings = if path.exists() {
            let content = tokio::fs::read_to_string(path).await.map_err(|e| {
                AppError::Config(format!("Failed to read settings {}: {}", path.display(), e))
            })?;
            serde_json::from_str::<Settings>(&content).map_err(|e| {
                AppError::Config(format!("Invalid settings file {}: {}", path.display(), e))
            })?
        } else {
            let defaults = Settings::default();
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(path, serde_json::to_string_pretty(&defaults)?).await?;
            info!("Created default settings at {}", path.display());
            defaults
        };

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Ok(settings.validated().resolved_against(base))
    }

    /// Drop values that cannot work, with a warning
    pub fn validated(mut self) -> Self {
        if let Some(key) = &self.curseforge_api_key {
            if !is_valid_curseforge_key(key) {
                warn!("Ignoring malformed CurseForge API key; CurseForge mods will be skipped");
                self.curseforge_api_key = None;
            }
        }
        if self.max_concurrent_mods == 0 {
            warn!("max_concurrent_mods must be at least 1, using 1");
            self.max_concurrent_mods = 1;
        }
        self
    }

    pub fn resolved_against(mut self, base: &Path) -> Self {
        for dir in [&mut self.downloads_dir, &mut self.instances_dir, &mut self.logs_dir] {
            if dir.is_relative() {
                *dir = base.join(&*dir);
            }
        }
        self
    }
}

/// CurseForge keys are bcrypt-style strings: 60 characters starting with `$2a$10$`
pub fn is_valid_curseforge_key(key: &str) -> bool {
    key.len() == CURSEFORGE_KEY_LEN && key.starts_with(CURSEFORGE_KEY_PREFIX)
}
