//! Instance definitions
//!
//! Every `*.json` file in the instances folder declares one Minecraft
//! installation: its loader, game version, directory and mod page URLs.

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult};

/// On-disk instance file
#[derive(Debug, Clone, Deserialize)]
pub struct InstanceFile {
    pub enabled: bool,
    pub loader: String,
    /// Numbers are accepted but go through a float, so `1.20` reads as `"1.2"`.
    /// Versions should be quoted.
    #[serde(deserialize_with = "string_or_number")]
    pub version: String,
    pub directory: PathBuf,
    /// Any nesting of lists and maps; every string inside is a mod URL
    #[serde(default)]
    pub mods: Value,
}

/// An enabled instance, ready to sync
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instance {
    pub name: String,
    pub loader: String,
    pub game_version: String,
    pub directory: PathBuf,
    pub mod_urls: Vec<String>,
}

impl Instance {
    pub fn from_file(name: impl Into<String>, file: InstanceFile) -> Self {
        Self {
            name: name.into(),
            loader: file.loader.to_lowercase(),
            game_version: file.version,
            directory: file.directory,
            mod_urls: extract_nested_strings(&file.mods),
        }
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => {
            warn!(
                "Game version {} was written as a number; quote it to keep trailing zeros such as \"1.20\"",
                n
            );
            Ok(n.to_string())
        }
        other => Err(serde::de::Error::custom(format!(
            "expected a version string, got {}",
            other
        ))),
    }
}

/// Every string in a nested list/map structure, first occurrence order, without duplicates
pub fn extract_nested_strings(value: &Value) -> Vec<String> {
    fn walk(value: &Value, out: &mut Vec<String>) {
        match value {
            Value::String(s) => {
                if !out.contains(s) {
                    out.push(s.clone());
                }
            }
            Value::Array(items) => items.iter().for_each(|item| walk(item, out)),
            Value::Object(map) => map.values().for_each(|item| walk(item, out)),
            _ => {}
        }
    }

    let mut out = Vec::new();
    walk(value, &mut out);
    out
}

/// Load every enabled instance from `instances_dir`, creating the folder if needed.
///
/// A malformed instance file is a configuration error and stops the run.
pub async fn load_instances(instances_dir: &Path) -> AppResult<Vec<Instance>> {
    info!("Loading instances from {}", instances_dir.display());
    tokio::fs::create_dir_all(instances_dir).await.map_err(|e| {
        AppError::Io(format!(
            "Failed to create instances directory {}: {}",
            instances_dir.display(),
            e
        ))
    })?;

    let mut paths = Vec::new();
    let mut read_dir = tokio::fs::read_dir(instances_dir).await?;
    while let Some(entry) = read_dir.next_entry().await? {
        let path = entry.path();
        if path.extension().map(|ext| ext == "json").unwrap_or(false) {
            paths.push(path);
        }
    }
    paths.sort();

    let mut instances = Vec::new();
    for path in paths {
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        let content = tokio::fs::read_to_string(&path).await?;
        let file: InstanceFile = serde_json::from_str(&content).map_err(|e| {
            AppError::Instance(format!("Invalid instance file {}: {}", path.display(), e))
        })?;

        if !file.enabled {
            info!("Ignoring disabled instance \"{}\"", name);
            continue;
        }

        let instance = Instance::from_file(name, file);
        info!(
            "Loaded instance \"{}\" ({} {}, {} mod URLs)",
            instance.name,
            instance.loader,
            instance.game_version,
            instance.mod_urls.len()
        );
        debug!("Instance \"{}\" directory: {}", instance.name, instance.directory.display());
        instances.push(instance);
    }

    Ok(instances)
}
