//! Archive integrity checks
//!
//! Reading every entry to the end makes the zip reader verify each CRC32, which
//! catches truncated downloads and interrupted writes.

use std::fs::File;
use std::io::{self, Cursor, Read, Seek};
use std::path::{Path, PathBuf};

use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveStatus {
    Missing,
    Valid,
    Corrupted,
}

/// Check the archive at `path`
pub fn check_archive(path: &Path) -> ArchiveStatus {
    if !path.is_file() {
        return ArchiveStatus::Missing;
    }

    debug!("Verifying integrity of {}", path.display());
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) => {
            debug!("Could not open {}: {}", path.display(), e);
            return ArchiveStatus::Corrupted;
        }
    };

    if archive_is_readable(file) {
        ArchiveStatus::Valid
    } else {
        debug!("Could not verify integrity of {}, probably corrupted", path.display());
        ArchiveStatus::Corrupted
    }
}

/// Check an archive already held in memory
pub fn bytes_are_valid_archive(data: &[u8]) -> bool {
    archive_is_readable(Cursor::new(data))
}

/// [`check_archive`] on the blocking pool
pub async fn check_archive_async(path: PathBuf) -> ArchiveStatus {
    tokio::task::spawn_blocking(move || check_archive(&path))
        .await
        .unwrap_or(ArchiveStatus::Corrupted)
}

fn archive_is_readable<R: Read + Seek>(reader: R) -> bool {
    let mut archive = match zip::ZipArchive::new(reader) {
        Ok(a) => a,
        Err(_) => return false,
    };

    for i in 0..archive.len() {
        let mut entry = match archive.by_index(i) {
            Ok(e) => e,
            Err(_) => return false,
        };
        if io::copy(&mut entry, &mut io::sink()).is_err() {
            return false;
        }
    }

    true
}
