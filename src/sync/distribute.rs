//! Fan-out of fetched files into instance mods folders

use futures_util::future::join_all;
use tracing::{info, warn};

use super::integrity::{check_archive_async, ArchiveStatus};
use super::{is_plain_file_name, DistributionTarget, FetchedBytes};
use crate::error::DistributionError;

/// What happened at one destination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistributionOutcome {
    /// An intact copy was already there
    AlreadyPresent,
    Written,
    /// A corrupted copy was removed and replaced
    Repaired,
}

#[derive(Debug, Clone)]
pub struct TargetResult {
    pub target: DistributionTarget,
    pub result: Result<DistributionOutcome, DistributionError>,
}

/// Whether `target` already holds an intact copy of `file_name`
pub async fn is_installed(target: &DistributionTarget, file_name: &str) -> bool {
    check_archive_async(target.file_path(file_name)).await == ArchiveStatus::Valid
}

/// Copy `fetched` into every target concurrently.
///
/// Every target is attempted; a failure is logged and reported for that target only.
pub async fn distribute<'a, I>(fetched: &FetchedBytes, targets: I) -> Vec<TargetResult>
where
    I: IntoIterator<Item = &'a DistributionTarget>,
{
    let writes = targets.into_iter().map(|target| async move {
        let result = distribute_to(fetched, target).await;
        match &result {
            Ok(DistributionOutcome::AlreadyPresent) => {}
            Ok(_) => info!(
                "Copied \"{}\" into \"{}\"",
                fetched.file_name,
                target.mods_dir().display()
            ),
            Err(e) => warn!("Could not copy \"{}\": {}", fetched.file_name, e),
        }
        TargetResult {
            target: target.clone(),
            result,
        }
    });

    join_all(writes).await
}

/// Place one file into one target
pub async fn distribute_to(
    fetched: &FetchedBytes,
    target: &DistributionTarget,
) -> Result<DistributionOutcome, DistributionError> {
    if !is_plain_file_name(&fetched.file_name) {
        return Err(DistributionError::InvalidFileName(fetched.file_name.clone()));
    }

    let mods_dir = target.mods_dir();
    if !mods_dir.is_dir() {
        return Err(DistributionError::DirectoryNotFound(mods_dir));
    }

    let path = target.file_path(&fetched.file_name);
    let repaired = match check_archive_async(path.clone()).await {
        ArchiveStatus::Valid => return Ok(DistributionOutcome::AlreadyPresent),
        ArchiveStatus::Missing => false,
        ArchiveStatus::Corrupted => {
            info!("\"{}\" is corrupted, replacing it", path.display());
            tokio::fs::remove_file(&path)
                .await
                .map_err(|e| DistributionError::Remove {
                    path: path.clone(),
                    message: e.to_string(),
                })?;
            true
        }
    };

    tokio::fs::write(&path, &fetched.data[..])
        .await
        .map_err(|e| DistributionError::Write {
            path: path.clone(),
            message: e.to_string(),
        })?;

    Ok(if repaired {
        DistributionOutcome::Repaired
    } else {
        DistributionOutcome::Written
    })
}
