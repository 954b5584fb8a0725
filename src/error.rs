use std::path::PathBuf;
use thiserror::Error;

/// Fatal, configuration-level errors. Anything here ends the run.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("IO error: {0}")]
    Io(String),

    #[error("HTTP request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Instance error: {0}")]
    Instance(String),
}

pub type AppResult<T> = Result<T, AppError>;

/// A mod URL that cannot be turned into a [`crate::sync::ModReference`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClassifyError {
    #[error("Mod manager cannot parse URLs from \"{host}\": {url}")]
    UnsupportedProvider { host: String, url: String },

    #[error("Unsupported Modrinth page \"{url}\": only mod, plugin and datapack pages are supported")]
    UnsupportedPageKind { url: String },

    #[error("URL \"{url}\" is not for a Minecraft mod")]
    NotMinecraftMod { url: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("No version of \"{identifier}\" for {loader} {game_version}")]
    NoCompatibleVersion {
        identifier: String,
        loader: String,
        game_version: String,
    },

    #[error("Version \"{version}\" of \"{identifier}\" not found for {loader}")]
    VersionNotFound {
        identifier: String,
        version: String,
        loader: String,
    },

    #[error("Could not find mod \"{0}\"")]
    ModNotFound(String),

    #[error("Version \"{version}\" of \"{identifier}\" has no files")]
    NoFiles { identifier: String, version: String },

    #[error("A valid CurseForge API key is required to resolve \"{0}\"")]
    MissingApiKey(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("\"{0}\" has no download URL and no file id to derive one from")]
    NoDownloadUrl(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Download returned status {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Hash mismatch for \"{file_name}\": expected {expected}, got {actual}")]
    HashMismatch {
        file_name: String,
        expected: String,
        actual: String,
    },

    #[error("Downloaded \"{0}\" is not a readable archive")]
    CorruptDownload(String),

    #[error("Refusing file name \"{0}\": it must be a single plain file name")]
    InvalidFileName(String),

    #[error("IO error: {0}")]
    Io(String),
}

/// Outcome of a failed lookup in the fetch cache: either stage can fail.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Fetch(#[from] FetchError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DistributionError {
    #[error("The mods directory \"{}\" cannot be found", .0.display())]
    DirectoryNotFound(PathBuf),

    #[error("Refusing to write \"{0}\" outside the mods directory")]
    InvalidFileName(String),

    #[error("Could not write \"{}\": {message}", path.display())]
    Write { path: PathBuf, message: String },

    #[error("Could not remove corrupted \"{}\": {message}", path.display())]
    Remove { path: PathBuf, message: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PruneError {
    #[error("\"{}\" is not a valid archive: {message}", path.display())]
    InvalidArchive { path: PathBuf, message: String },

    #[error("\"{}\" has no {manifest}", path.display())]
    MissingManifest { path: PathBuf, manifest: String },

    #[error("Could not read mod id from \"{}\": {message}", path.display())]
    InvalidManifest { path: PathBuf, message: String },

    #[error("IO error on \"{}\": {message}", path.display())]
    Io { path: PathBuf, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_error_display() {
        let error = ResolveError::NoCompatibleVersion {
            identifier: "sodium".to_string(),
            loader: "fabric".to_string(),
            game_version: "1.20.1".to_string(),
        };
        assert_eq!(error.to_string(), "No version of \"sodium\" for fabric 1.20.1");
    }

    #[test]
    fn test_sync_error_is_transparent() {
        let error: SyncError = FetchError::Network("timed out".to_string()).into();
        assert_eq!(error.to_string(), "Network error: timed out");
    }

    #[test]
    fn test_distribution_error_display() {
        let error = DistributionError::DirectoryNotFound(PathBuf::from("/srv/mc/mods"));
        assert_eq!(
            error.to_string(),
            "The mods directory \"/srv/mc/mods\" cannot be found"
        );
    }
}
