// Modrinth API client for listing mod versions
// API Documentation: https://docs.modrinth.com/api-spec

use serde::Deserialize;

use crate::sync::FileRecord;

const MODRINTH_API_BASE: &str = "https://api.modrinth.com/v2";

/// Version information for a project
#[derive(Debug, Clone, Deserialize)]
pub struct Version {
    pub id: String,
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub name: String,
    pub version_number: String,
    #[serde(default)]
    pub game_versions: Vec<String>,
    #[serde(default)]
    pub version_type: String,  // release, beta, alpha
    #[serde(default)]
    pub loaders: Vec<String>,
    pub files: Vec<VersionFile>,
    pub date_published: String,
}

/// File information within a version
#[derive(Debug, Clone, Deserialize)]
pub struct VersionFile {
    #[serde(default)]
    pub hashes: FileHashes,
    pub url: Option<String>,
    pub filename: String,
    #[serde(default)]
    pub primary: bool,
    #[serde(default)]
    pub size: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileHashes {
    pub sha1: Option<String>,
    pub sha512: Option<String>,
}

impl From<&VersionFile> for FileRecord {
    fn from(f: &VersionFile) -> Self {
        Self {
            file_name: f.filename.clone(),
            download_url: f.url.clone(),
            is_primary: f.primary,
            provider_file_id: None,
            sha1: f.hashes.sha1.clone(),
        }
    }
}

/// Client for interacting with the Modrinth API
pub struct ModrinthClient<'a> {
    http_client: &'a reqwest::Client,
}

impl<'a> ModrinthClient<'a> {
    pub fn new(http_client: &'a reqwest::Client) -> Self {
        Self { http_client }
    }

    /// Get all versions of a project, optionally filtered server-side
    pub async fn get_project_versions(
        &self,
        project_id: &str,
        loaders: Option<&[&str]>,
        game_versions: Option<&[&str]>,
    ) -> Result<Vec<Version>, ModrinthError> {
        let url = project_versions_url(project_id, loaders, game_versions)?;

        let response = self.http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| ModrinthError::Network(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ModrinthError::NotFound(project_id.to_string()));
        }
        if !response.status().is_success() {
            return Err(ModrinthError::Api(format!("API returned status {}", response.status())));
        }

        response
            .json::<Vec<Version>>()
            .await
            .map_err(|e| ModrinthError::Parse(e.to_string()))
    }
}

fn project_versions_url(
    project_id: &str,
    loaders: Option<&[&str]>,
    game_versions: Option<&[&str]>,
) -> Result<String, ModrinthError> {
    let mut url = format!(
        "{}/project/{}/version",
        MODRINTH_API_BASE,
        urlencoding::encode(project_id)
    );

    let mut params = Vec::new();
    if let Some(loaders) = loaders {
        let loaders_json = serde_json::to_string(loaders)
            .map_err(|e| ModrinthError::Parse(format!("Failed to serialize loaders: {}", e)))?;
        params.push(format!("loaders={}", urlencoding::encode(&loaders_json)));
    }
    if let Some(versions) = game_versions {
        let versions_json = serde_json::to_string(versions)
            .map_err(|e| ModrinthError::Parse(format!("Failed to serialize versions: {}", e)))?;
        params.push(format!("game_versions={}", urlencoding::encode(&versions_json)));
    }

    if !params.is_empty() {
        url.push('?');
        url.push_str(&params.join("&"));
    }

    Ok(url)
}

/// Errors that can occur when using the Modrinth API
#[derive(Debug, Clone)]
pub enum ModrinthError {
    Network(String),
    NotFound(String),
    Api(String),
    Parse(String),
}

impl std::fmt::Display for ModrinthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Network(msg) => write!(f, "Network error: {}", msg),
            Self::NotFound(slug) => write!(f, "Project not found: {}", slug),
            Self::Api(msg) => write!(f, "API error: {}", msg),
            Self::Parse(msg) => write!(f, "Parse error: {}", msg),
        }
    }
}

impl std::error::Error for ModrinthError {}
