//! Mod synchronization core
//!
//! Turns the mod URLs declared by instances into a minimal set of origin
//! fetches and copies every resolved file into each instance that asked for it.

pub mod distribute;
pub mod engine;
pub mod fetcher;
pub mod integrity;
pub mod plan;
pub mod prune;
pub mod resolver;
pub mod url;

use chrono::{DateTime, Utc};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

pub use engine::{SyncEngine, SyncReport};
pub use plan::SyncPlan;

/// Mod hosting service a URL points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Provider {
    Modrinth,
    CurseForge,
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::Modrinth => write!(f, "modrinth"),
            Provider::CurseForge => write!(f, "curseforge"),
        }
    }
}

/// Which version of a mod a URL asks for
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VersionRequest {
    Latest,
    /// Modrinth version number / id, or CurseForge file id
    Exact(String),
}

impl fmt::Display for VersionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionRequest::Latest => write!(f, "latest"),
            VersionRequest::Exact(token) => write!(f, "{}", token),
        }
    }
}

/// What the URL classifier extracts; the instance supplies loader and game version.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModUrl {
    pub provider: Provider,
    pub identifier: String,
    pub version: VersionRequest,
}

impl ModUrl {
    pub fn into_reference(self, loader: &str, game_version: &str) -> ModReference {
        ModReference {
            provider: self.provider,
            identifier: self.identifier,
            loader: loader.to_lowercase(),
            game_version: game_version.to_string(),
            explicit_version: self.version,
        }
    }
}

/// Cache and dedup key: two instances asking for the same tuple share one fetch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModReference {
    pub provider: Provider,
    pub identifier: String,
    pub loader: String,
    pub game_version: String,
    pub explicit_version: VersionRequest,
}

impl fmt::Display for ModReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}@{} ({} {})",
            self.provider, self.identifier, self.explicit_version, self.loader, self.game_version
        )
    }
}

/// A single downloadable file of a version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub file_name: String,
    /// Absent when the author disabled third-party downloads
    pub download_url: Option<String>,
    pub is_primary: bool,
    pub provider_file_id: Option<String>,
    pub sha1: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedVersion {
    pub version_number: String,
    pub published_at: DateTime<Utc>,
    pub files: Vec<FileRecord>,
    pub primary_file: FileRecord,
}

impl ResolvedVersion {
    /// Build a resolved version, picking its primary file. `None` when `files` is empty.
    pub fn new(
        version_number: String,
        published_at: DateTime<Utc>,
        files: Vec<FileRecord>,
    ) -> Option<Self> {
        let primary_file = fetcher::select_primary_file(&files)?.clone();
        Some(Self {
            version_number,
            published_at,
            files,
            primary_file,
        })
    }
}

/// Downloaded archive, shared read-only between every destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedBytes {
    pub file_name: String,
    pub data: Arc<[u8]>,
}

impl FetchedBytes {
    pub fn new(file_name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            data: Arc::from(data),
        }
    }
}

/// Whether a provider-reported file name is one plain path component.
///
/// Names are joined onto the mods and downloads folders, so separators,
/// `..` and absolute paths are rejected.
pub fn is_plain_file_name(name: &str) -> bool {
    if name.contains(['/', '\\']) {
        return false;
    }
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DistributionTarget {
    pub instance_directory: PathBuf,
}

impl DistributionTarget {
    pub fn new(instance_directory: impl Into<PathBuf>) -> Self {
        Self {
            instance_directory: instance_directory.into(),
        }
    }

    pub fn mods_dir(&self) -> PathBuf {
        self.instance_directory.join("mods")
    }

    pub fn file_path(&self, file_name: &str) -> PathBuf {
        self.mods_dir().join(file_name)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str, primary: bool) -> FileRecord {
        FileRecord {
            file_name: name.to_string(),
            download_url: Some(format!("https://cdn.example.com/{}", name)),
            is_primary: primary,
            provider_file_id: None,
            sha1: None,
        }
    }

    #[test]
    fn test_mod_reference_display() {
        let reference = ModUrl {
            provider: Provider::Modrinth,
            identifier: "sodium".to_string(),
            version: VersionRequest::Latest,
        }
        .into_reference("Fabric", "1.20.1");

        assert_eq!(reference.loader, "fabric");
        assert_eq!(reference.to_string(), "modrinth:sodium@latest (fabric 1.20.1)");
    }

    #[test]
    fn test_mod_reference_equality_covers_whole_tuple() {
        let url = ModUrl {
            provider: Provider::CurseForge,
            identifier: "jei".to_string(),
            version: VersionRequest::Latest,
        };
        let a = url.clone().into_reference("forge", "1.20.1");
        let b = url.clone().into_reference("forge", "1.20.1");
        let c = url.into_reference("forge", "1.19.2");

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_resolved_version_requires_files() {
        assert!(ResolvedVersion::new("1.0".to_string(), Utc::now(), vec![]).is_none());

        let resolved = ResolvedVersion::new(
            "1.0".to_string(),
            Utc::now(),
            vec![file("mod-sources.jar", false), file("mod.jar", true)],
        )
        .unwrap();
        assert_eq!(resolved.primary_file.file_name, "mod.jar");
    }

    #[test]
    fn test_plain_file_names() {
        assert!(is_plain_file_name("sodium-fabric-0.5.3.jar"));
        assert!(is_plain_file_name("..hidden.jar"));

        assert!(!is_plain_file_name(""));
        assert!(!is_plain_file_name("."));
        assert!(!is_plain_file_name(".."));
        assert!(!is_plain_file_name("../../escaped.jar"));
        assert!(!is_plain_file_name("mods/sodium.jar"));
        assert!(!is_plain_file_name("/etc/passwd"));
        assert!(!is_plain_file_name("..\\escaped.jar"));
    }

    #[test]
    fn test_distribution_target_paths() {
        let target = DistributionTarget::new("/games/survival");
        assert_eq!(target.mods_dir(), PathBuf::from("/games/survival/mods"));
        assert_eq!(
            target.file_path("sodium.jar"),
            PathBuf::from("/games/survival/mods/sodium.jar")
        );
    }
}
