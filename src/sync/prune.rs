//! Removal of superseded mod jars
//!
//! Mods are identified by the id in their embedded loader manifest, so two
//! differently named jars of the same mod are recognised as duplicates.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::{debug, info, warn};

use crate::error::PruneError;

const FABRIC_MANIFEST: &str = "fabric.mod.json";
const QUILT_MANIFEST: &str = "quilt.mod.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub mod_id: String,
    pub file_path: PathBuf,
    pub created_at: SystemTime,
}

#[derive(Debug, Default)]
pub struct PruneReport {
    pub deleted: Vec<PathBuf>,
    pub errors: Vec<PruneError>,
}

/// Whether jars of this loader carry a manifest we can read ids from
pub fn supports_loader(loader: &str) -> bool {
    matches!(loader.to_lowercase().as_str(), "fabric" | "quilt")
}

/// Delete all but the newest jar of every mod id in `instance_dir/mods`
pub fn prune_instance(instance_dir: &Path, loader: &str) -> PruneReport {
    let mut report = PruneReport::default();

    if !supports_loader(loader) {
        warn!(
            "Cannot auto-delete old {} mods in \"{}\": only fabric and quilt mods are supported",
            loader,
            instance_dir.display()
        );
        return report;
    }

    let mods_dir = instance_dir.join("mods");
    debug!("Scanning {} for old mods", mods_dir.display());

    let entries = match scan_mods_dir(&mods_dir, loader) {
        Ok(scan) => scan,
        Err(e) => {
            warn!("{}", e);
            report.errors.push(e);
            return report;
        }
    };

    let mut manifests = Vec::new();
    for entry in entries {
        match entry {
            Ok(manifest) => manifests.push(manifest),
            Err(e) => {
                warn!("Skipping jar while pruning: {}", e);
                report.errors.push(e);
            }
        }
    }

    let superseded = plan_prune(manifests);
    if superseded.is_empty() {
        debug!("No old mods to delete in {}", mods_dir.display());
    }

    for entry in superseded {
        match fs::remove_file(&entry.file_path) {
            Ok(()) => {
                info!("Deleted old {} file: \"{}\"", entry.mod_id, entry.file_path.display());
                report.deleted.push(entry.file_path);
            }
            Err(e) => {
                let error = PruneError::Io {
                    path: entry.file_path,
                    message: e.to_string(),
                };
                warn!("Could not delete old {} file: {}", entry.mod_id, error);
                report.errors.push(error);
            }
        }
    }

    report
}

/// Pick the entries to delete: everything but the newest per mod id.
/// Equal timestamps keep the lexicographically last path.
pub fn plan_prune(entries: Vec<ManifestEntry>) -> Vec<ManifestEntry> {
    let mut groups: HashMap<String, Vec<ManifestEntry>> = HashMap::new();
    for entry in entries {
        groups.entry(entry.mod_id.clone()).or_default().push(entry);
    }

    let mut superseded: Vec<ManifestEntry> = groups
        .into_values()
        .filter(|group| group.len() > 1)
        .flat_map(|mut group| {
            group.sort_by(|a, b| {
                a.created_at
                    .cmp(&b.created_at)
                    .then_with(|| a.file_path.cmp(&b.file_path))
            });
            group.pop();
            group
        })
        .collect();

    superseded.sort_by(|a, b| a.file_path.cmp(&b.file_path));
    superseded
}

fn scan_mods_dir(
    mods_dir: &Path,
    loader: &str,
) -> Result<Vec<Result<ManifestEntry, PruneError>>, PruneError> {
    let read_dir = fs::read_dir(mods_dir).map_err(|e| PruneError::Io {
        path: mods_dir.to_path_buf(),
        message: e.to_string(),
    })?;

    let mut entries = Vec::new();
    for dir_entry in read_dir.flatten() {
        let path = dir_entry.path();
        let is_jar = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("jar"))
            .unwrap_or(false);
        if !is_jar || !path.is_file() {
            continue;
        }
        entries.push(read_entry(&path, loader));
    }
    Ok(entries)
}

fn read_entry(path: &Path, loader: &str) -> Result<ManifestEntry, PruneError> {
    let mod_id = read_mod_id(path, loader)?;
    let metadata = fs::metadata(path).map_err(|e| PruneError::Io {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    let created_at = metadata
        .created()
        .or_else(|_| metadata.modified())
        .map_err(|e| PruneError::Io {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    Ok(ManifestEntry {
        mod_id,
        file_path: path.to_path_buf(),
        created_at,
    })
}

/// Read the mod id out of a jar's loader manifest.
///
/// Quilt instances also load Fabric mods, so Quilt falls back to `fabric.mod.json`.
pub fn read_mod_id(path: &Path, loader: &str) -> Result<String, PruneError> {
    let file = File::open(path).map_err(|e| PruneError::Io {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| PruneError::InvalidArchive {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    if loader.eq_ignore_ascii_case("quilt") {
        if let Some(raw) = read_entry_text(&mut archive, path, QUILT_MANIFEST)? {
            let manifest = parse_manifest(&raw, path)?;
            return manifest
                .get("quilt_loader")
                .and_then(|q| q.get("id"))
                .and_then(|id| id.as_str())
                .map(str::to_string)
                .ok_or_else(|| PruneError::InvalidManifest {
                    path: path.to_path_buf(),
                    message: "quilt_loader.id is missing".to_string(),
                });
        }
    }

    let raw = read_entry_text(&mut archive, path, FABRIC_MANIFEST)?.ok_or_else(|| {
        PruneError::MissingManifest {
            path: path.to_path_buf(),
            manifest: FABRIC_MANIFEST.to_string(),
        }
    })?;
    parse_manifest(&raw, path)?
        .get("id")
        .and_then(|id| id.as_str())
        .map(str::to_string)
        .ok_or_else(|| PruneError::InvalidManifest {
            path: path.to_path_buf(),
            message: "id is missing".to_string(),
        })
}

fn read_entry_text(
    archive: &mut zip::ZipArchive<File>,
    path: &Path,
    name: &str,
) -> Result<Option<String>, PruneError> {
    let mut entry = match archive.by_name(name) {
        Ok(entry) => entry,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => {
            return Err(PruneError::InvalidArchive {
                path: path.to_path_buf(),
                message: e.to_string(),
            })
        }
    };

    let mut raw = Vec::new();
    entry
        .read_to_end(&mut raw)
        .map_err(|e| PruneError::InvalidArchive {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
    Ok(Some(String::from_utf8_lossy(&raw).into_owned()))
}

/// Manifests in the wild contain raw newlines and tabs inside strings.
/// Outside strings they are plain whitespace, so blanking them is safe.
fn parse_manifest(raw: &str, path: &Path) -> Result<serde_json::Value, PruneError> {
    let cleaned: String = raw
        .trim_start_matches('\u{feff}')
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();
    serde_json::from_str(&cleaned).map_err(|e| PruneError::InvalidManifest {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::test_support::{fabric_jar, make_jar};
    use std::time::Duration;
    use tempfile::tempdir;

    fn entry(mod_id: &str, path: &str, secs: u64) -> ManifestEntry {
        ManifestEntry {
            mod_id: mod_id.to_string(),
            file_path: PathBuf::from(path),
            created_at: SystemTime::UNIX_EPOCH + Duration::from_secs(secs),
        }
    }

    fn mods_dir(root: &Path) -> PathBuf {
        let dir = root.join("mods");
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_plan_keeps_newest_of_three() {
        let superseded = plan_prune(vec![
            entry("x", "mods/x-2.jar", 200),
            entry("x", "mods/x-3.jar", 300),
            entry("x", "mods/x-1.jar", 100),
        ]);

        let paths: Vec<_> = superseded.iter().map(|e| e.file_path.clone()).collect();
        assert_eq!(paths, vec![PathBuf::from("mods/x-1.jar"), PathBuf::from("mods/x-2.jar")]);
    }

    #[test]
    fn test_plan_distinct_ids_deletes_nothing() {
        let superseded = plan_prune(vec![
            entry("sodium", "mods/sodium.jar", 100),
            entry("lithium", "mods/lithium.jar", 100),
            entry("iris", "mods/iris.jar", 50),
        ]);
        assert!(superseded.is_empty());
    }

    #[test]
    fn test_prune_instance_removes_older_jar() {
        let temp = tempdir().unwrap();
        let mods = mods_dir(temp.path());

        fs::write(mods.join("sodium-0.5.2.jar"), fabric_jar("sodium")).unwrap();
        std::thread::sleep(Duration::from_millis(50));
        fs::write(mods.join("sodium-0.5.3.jar"), fabric_jar("sodium")).unwrap();
        fs::write(mods.join("lithium.jar"), fabric_jar("lithium")).unwrap();

        let report = prune_instance(temp.path(), "fabric");

        assert_eq!(report.deleted, vec![mods.join("sodium-0.5.2.jar")]);
        assert!(report.errors.is_empty());
        assert!(mods.join("sodium-0.5.3.jar").is_file());
        assert!(mods.join("lithium.jar").is_file());
    }

    #[test]
    fn test_bad_jars_do_not_stop_the_scan() {
        let temp = tempdir().unwrap();
        let mods = mods_dir(temp.path());

        fs::write(mods.join("broken.jar"), b"definitely not a zip").unwrap();
        fs::write(mods.join("forge-only.jar"), make_jar(&[("META-INF/mods.toml", "")])).unwrap();
        fs::write(mods.join("notes.txt"), b"ignored").unwrap();
        fs::write(mods.join("sodium.jar"), fabric_jar("sodium")).unwrap();

        let report = prune_instance(temp.path(), "fabric");

        assert!(report.deleted.is_empty());
        assert_eq!(report.errors.len(), 2);
        assert!(report
            .errors
            .iter()
            .any(|e| matches!(e, PruneError::InvalidArchive { .. })));
        assert!(report
            .errors
            .iter()
            .any(|e| matches!(e, PruneError::MissingManifest { .. })));
        assert!(mods.join("sodium.jar").is_file());
    }

    #[test]
    fn test_unsupported_loader_is_skipped() {
        let temp = tempdir().unwrap();
        let mods = mods_dir(temp.path());
        fs::write(mods.join("a.jar"), fabric_jar("same")).unwrap();
        fs::write(mods.join("b.jar"), fabric_jar("same")).unwrap();

        let report = prune_instance(temp.path(), "forge");

        assert!(report.deleted.is_empty());
        assert!(mods.join("a.jar").is_file());
        assert!(mods.join("b.jar").is_file());
    }

    #[test]
    fn test_read_mod_id_lenient_manifest() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("mod.jar");
        let manifest = "{\"id\": \"modmenu\", \"description\": \"line one\nline two\"}";
        fs::write(&path, make_jar(&[(FABRIC_MANIFEST, manifest)])).unwrap();

        assert_eq!(read_mod_id(&path, "fabric").unwrap(), "modmenu");
    }

    #[test]
    fn test_read_mod_id_quilt() {
        let temp = tempdir().unwrap();
        let quilt = temp.path().join("quilt.jar");
        fs::write(
            &quilt,
            make_jar(&[(QUILT_MANIFEST, r#"{"schema_version": 1, "quilt_loader": {"id": "qsl"}}"#)]),
        )
        .unwrap();
        let fabric = temp.path().join("fabric.jar");
        fs::write(&fabric, fabric_jar("sodium")).unwrap();

        assert_eq!(read_mod_id(&quilt, "quilt").unwrap(), "qsl");
        assert_eq!(read_mod_id(&fabric, "quilt").unwrap(), "sodium");
    }
}
