//! Turns a resolved version into bytes

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::integrity::{bytes_are_valid_archive, check_archive_async, ArchiveStatus};
use super::resolver::ModSource;
use super::{is_plain_file_name, FetchedBytes, FileRecord, ModReference, Provider, ResolvedVersion};
use crate::curseforge::fallback_download_url;
use crate::download::client::{sha1_hex, verify_sha1};
use crate::error::FetchError;

/// Pick the canonical file of a version.
///
/// When any file is flagged primary only flagged files are considered; the
/// first remaining candidate wins.
pub fn select_primary_file(files: &[FileRecord]) -> Option<&FileRecord> {
    if files.iter().any(|f| f.is_primary) {
        files.iter().find(|f| f.is_primary)
    } else {
        files.first()
    }
}

/// URL to download `file` from, deriving the CDN location when the provider withheld it
pub fn download_url(provider: Provider, file: &FileRecord) -> Result<String, FetchError> {
    if let Some(url) = &file.download_url {
        return Ok(url.clone());
    }

    match (provider, &file.provider_file_id) {
        (Provider::CurseForge, Some(file_id)) => {
            debug!(
                "Third-party downloads are disabled for {}, using the CDN location",
                file.file_name
            );
            Ok(fallback_download_url(file_id, &file.file_name))
        }
        _ => Err(FetchError::NoDownloadUrl(file.file_name.clone())),
    }
}

/// Downloads primary files, keeping a copy under `downloads_dir/{loader}/{game_version}`.
///
/// An intact copy already in the downloads folder is reused without contacting the provider.
pub struct FileFetcher {
    source: Arc<dyn ModSource>,
    downloads_dir: PathBuf,
}

impl FileFetcher {
    pub fn new(source: Arc<dyn ModSource>, downloads_dir: impl Into<PathBuf>) -> Self {
        Self {
            source,
            downloads_dir: downloads_dir.into(),
        }
    }

    /// Folder holding downloaded files for one loader/game version pair
    pub fn download_folder(&self, loader: &str, game_version: &str) -> PathBuf {
        self.downloads_dir.join(loader).join(game_version)
    }

    pub async fn fetch_file(
        &self,
        reference: &ModReference,
        resolved: &ResolvedVersion,
    ) -> Result<FetchedBytes, FetchError> {
        let file = &resolved.primary_file;
        if !is_plain_file_name(&file.file_name) {
            return Err(FetchError::InvalidFileName(file.file_name.clone()));
        }
        let local_path = self
            .download_folder(&reference.loader, &reference.game_version)
            .join(&file.file_name);

        if let Some(cached) = read_cached(&local_path, file).await {
            debug!("Using downloaded copy {}", local_path.display());
            return Ok(cached);
        }

        let url = download_url(reference.provider, file)?;
        let data = self.source.download(reference.provider, &url).await?;

        if let Some(expected) = &file.sha1 {
            if !verify_sha1(&data, expected) {
                return Err(FetchError::HashMismatch {
                    file_name: file.file_name.clone(),
                    expected: expected.clone(),
                    actual: sha1_hex(&data),
                });
            }
        }

        let fetched = FetchedBytes::new(file.file_name.clone(), data);
        let check = fetched.clone();
        let valid = tokio::task::spawn_blocking(move || bytes_are_valid_archive(&check.data))
            .await
            .unwrap_or(false);
        if !valid {
            return Err(FetchError::CorruptDownload(file.file_name.clone()));
        }

        // The downloads folder is only a cache; a failed write must not fail the fetch
        if let Err(e) = store(&local_path, &fetched).await {
            warn!("Could not save {} to {}: {}", file.file_name, local_path.display(), e);
        } else {
            info!("Downloaded \"{}\" into \"{}\"", file.file_name, local_path.display());
        }

        Ok(fetched)
    }
}

async fn read_cached(path: &Path, file: &FileRecord) -> Option<FetchedBytes> {
    match check_archive_async(path.to_path_buf()).await {
        ArchiveStatus::Valid => {}
        ArchiveStatus::Missing => return None,
        ArchiveStatus::Corrupted => {
            warn!("Downloaded copy {} is corrupted, fetching again", path.display());
            return None;
        }
    }

    let data = tokio::fs::read(path).await.ok()?;
    if let Some(expected) = &file.sha1 {
        if !verify_sha1(&data, expected) {
            debug!("Downloaded copy {} does not match the provider hash", path.display());
            return None;
        }
    }
    Some(FetchedBytes::new(file.file_name.clone(), data))
}

async fn store(path: &Path, fetched: &FetchedBytes) -> Result<(), FetchError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| FetchError::Io(format!("Failed to create {}: {}", parent.display(), e)))?;
    }
    tokio::fs::write(path, &fetched.data[..])
        .await
        .map_err(|e| FetchError::Io(format!("Failed to write {}: {}", path.display(), e)))
}
