//! CurseForge API client
//! API: https://docs.curseforge.com/rest-api/

use serde::Deserialize;
use thiserror::Error;

use crate::sync::FileRecord;

const CURSEFORGE_API_BASE: &str = "https://api.curseforge.com/v1";
const CURSEFORGE_CDN_BASE: &str = "https://edge.forgecdn.net/files";
pub const CURSEFORGE_MINECRAFT_GAME_ID: u32 = 432;
pub const CURSEFORGE_MOD_CLASS_ID: u32 = 6;

/// `hashes[].algo` value for SHA-1
const HASH_ALGO_SHA1: u32 = 1;

/// CurseForge `modLoaderType` codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModLoaderType {
    Forge = 1,
    Fabric = 4,
    Quilt = 5,
    NeoForge = 6,
}

impl ModLoaderType {
    pub fn from_loader(loader: &str) -> Option<Self> {
        match loader.to_lowercase().as_str() {
            "forge" => Some(Self::Forge),
            "fabric" => Some(Self::Fabric),
            "quilt" => Some(Self::Quilt),
            "neoforge" => Some(Self::NeoForge),
            _ => None,
        }
    }

    pub fn code(self) -> u32 {
        self as u32
    }
}

#[derive(Debug, Deserialize)]
struct CurseForgeApiResponse<T> {
    data: T,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurseForgeMod {
    pub id: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurseForgeFile {
    pub id: u64,
    #[serde(default)]
    pub display_name: String,
    pub file_name: String,
    pub file_date: String,
    #[serde(default)]
    pub download_url: Option<String>,
    #[serde(default)]
    pub game_versions: Vec<String>,
    #[serde(default)]
    pub hashes: Vec<CurseForgeFileHash>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CurseForgeFileHash {
    pub value: String,
    pub algo: u32,
}

impl CurseForgeFile {
    pub fn sha1(&self) -> Option<&str> {
        self.hashes
            .iter()
            .find(|h| h.algo == HASH_ALGO_SHA1)
            .map(|h| h.value.as_str())
    }

    /// Label used when logging and reporting the resolved version
    pub fn version_label(&self) -> String {
        if self.display_name.is_empty() {
            self.id.to_string()
        } else {
            self.display_name.clone()
        }
    }
}

impl From<&CurseForgeFile> for FileRecord {
    fn from(f: &CurseForgeFile) -> Self {
        Self {
            file_name: f.file_name.clone(),
            download_url: f.download_url.clone(),
            // CurseForge files are standalone; each one is its own primary artifact
            is_primary: true,
            provider_file_id: Some(f.id.to_string()),
            sha1: f.sha1().map(str::to_string),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CurseForgeError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

/// Client for the CurseForge core API. Every request carries the API key.
pub struct CurseForgeClient<'a> {
    http_client: &'a reqwest::Client,
    api_key: &'a str,
}

impl<'a> CurseForgeClient<'a> {
    pub fn new(http_client: &'a reqwest::Client, api_key: &'a str) -> Self {
        Self {
            http_client,
            api_key,
        }
    }

    /// Look a Minecraft mod up by its page slug
    pub async fn search_by_slug(&self, slug: &str) -> Result<Vec<CurseForgeMod>, CurseForgeError> {
        let url = format!(
            "{}/mods/search?gameId={}&classId={}&slug={}",
            CURSEFORGE_API_BASE,
            CURSEFORGE_MINECRAFT_GAME_ID,
            CURSEFORGE_MOD_CLASS_ID,
            urlencoding::encode(slug)
        );
        self.get_data(&url).await
    }

    /// List files of a mod for a game version, optionally narrowed to one loader
    pub async fn get_mod_files(
        &self,
        mod_id: u64,
        game_version: &str,
        loader: Option<ModLoaderType>,
    ) -> Result<Vec<CurseForgeFile>, CurseForgeError> {
        self.get_data(&mod_files_url(mod_id, game_version, loader)).await
    }

    /// Get one file by id
    pub async fn get_mod_file(
        &self,
        mod_id: u64,
        file_id: &str,
    ) -> Result<CurseForgeFile, CurseForgeError> {
        let url = format!(
            "{}/mods/{}/files/{}",
            CURSEFORGE_API_BASE,
            mod_id,
            urlencoding::encode(file_id)
        );
        self.get_data(&url).await
    }

    async fn get_data<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, CurseForgeError> {
        let response = self
            .http_client
            .get(url)
            .header("Accept", "application/json")
            .header("x-api-key", self.api_key)
            .send()
            .await
            .map_err(|e| CurseForgeError::Network(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(CurseForgeError::NotFound(url.to_string()));
        }
        if !response.status().is_success() {
            return Err(CurseForgeError::Api(format!(
                "API returned status {}",
                response.status()
            )));
        }

        response
            .json::<CurseForgeApiResponse<T>>()
            .await
            .map(|r| r.data)
            .map_err(|e| CurseForgeError::Parse(e.to_string()))
    }
}

fn mod_files_url(mod_id: u64, game_version: &str, loader: Option<ModLoaderType>) -> String {
    let mut url = format!(
        "{}/mods/{}/files?gameVersion={}",
        CURSEFORGE_API_BASE,
        mod_id,
        urlencoding::encode(game_version)
    );
    if let Some(loader) = loader {
        url.push_str(&format!("&modLoaderType={}", loader.code()));
    }
    url
}

/// CDN location of a file whose author disabled API downloads.
///
/// The CDN shards by the decimal file id: its first four digits, then the next three.
pub fn fallback_download_url(file_id: &str, file_name: &str) -> String {
    let (first, rest) = file_id.split_at(file_id.len().min(4));
    let second = &rest[..rest.len().min(3)];
    format!("{}/{}/{}/{}", CURSEFORGE_CDN_BASE, first, second, file_name)
}
