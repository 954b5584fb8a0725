//! Version resolution against Modrinth and CurseForge

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::{debug, warn};

use super::{FileRecord, ModReference, Provider, ResolvedVersion, VersionRequest};
use crate::curseforge::{CurseForgeClient, CurseForgeError, CurseForgeFile, ModLoaderType};
use crate::download::client::{download_bytes_with_retry, RetryConfig};
use crate::error::{FetchError, ResolveError};
use crate::modrinth::{ModrinthClient, ModrinthError, Version};

/// Where mod versions are looked up and downloaded from.
///
/// The engine only talks to providers through this trait.
#[async_trait]
pub trait ModSource: Send + Sync {
    /// Pick exactly one version for `reference`
    async fn resolve(&self, reference: &ModReference) -> Result<ResolvedVersion, ResolveError>;

    /// Fetch the bytes behind a resolved download URL
    async fn download(&self, provider: Provider, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// [`ModSource`] backed by the public provider APIs
pub struct HttpModSource {
    http_client: reqwest::Client,
    curseforge_api_key: Option<String>,
    retry: RetryConfig,
}

impl HttpModSource {
    pub fn new(
        http_client: reqwest::Client,
        curseforge_api_key: Option<String>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            http_client,
            curseforge_api_key,
            retry,
        }
    }

    async fn resolve_modrinth(&self, reference: &ModReference) -> Result<ResolvedVersion, ResolveError> {
        let client = ModrinthClient::new(&self.http_client);
        let (loader, game_version) = modrinth_filters(reference);
        let loaders = [loader];
        let game_versions = game_version.map(|v| [v]);

        let versions = client
            .get_project_versions(
                &reference.identifier,
                Some(&loaders[..]),
                game_versions.as_ref().map(|v| &v[..]),
            )
            .await
            .map_err(|e| match e {
                ModrinthError::NotFound(slug) => ResolveError::ModNotFound(slug),
                ModrinthError::Network(msg) => ResolveError::Network(msg),
                ModrinthError::Api(msg) => ResolveError::Api(msg),
                ModrinthError::Parse(msg) => ResolveError::Parse(msg),
            })?;

        debug!("Modrinth returned {} candidate versions for {}", versions.len(), reference);
        select_modrinth_version(reference, versions)
    }

    async fn resolve_curseforge(&self, reference: &ModReference) -> Result<ResolvedVersion, ResolveError> {
        let api_key = self
            .curseforge_api_key
            .as_deref()
            .ok_or_else(|| ResolveError::MissingApiKey(reference.identifier.clone()))?;
        let client = CurseForgeClient::new(&self.http_client, api_key);

        let mod_id = client
            .search_by_slug(&reference.identifier)
            .await
            .map_err(curseforge_error)?
            .first()
            .map(|m| m.id)
            .ok_or_else(|| ResolveError::ModNotFound(reference.identifier.clone()))?;

        let file = match &reference.explicit_version {
            VersionRequest::Latest => {
                let files = client
                    .get_mod_files(mod_id, &reference.game_version, curseforge_loader_filter(reference))
                    .await
                    .map_err(curseforge_error)?;
                select_curseforge_file(reference, files)?
            }
            VersionRequest::Exact(file_id) => client
                .get_mod_file(mod_id, file_id)
                .await
                .map_err(|e| match e {
                    CurseForgeError::NotFound(_) => ResolveError::VersionNotFound {
                        identifier: reference.identifier.clone(),
                        version: file_id.clone(),
                        loader: reference.loader.clone(),
                    },
                    other => curseforge_error(other),
                })?,
        };

        curseforge_resolved(reference, &file)
    }
}

#[async_trait]
impl ModSource for HttpModSource {
    async fn resolve(&self, reference: &ModReference) -> Result<ResolvedVersion, ResolveError> {
        match reference.provider {
            Provider::Modrinth => self.resolve_modrinth(reference).await,
            Provider::CurseForge => self.resolve_curseforge(reference).await,
        }
    }

    async fn download(&self, provider: Provider, url: &str) -> Result<Vec<u8>, FetchError> {
        debug!("Downloading {} from {}", url, provider);
        download_bytes_with_retry(&self.http_client, url, self.retry).await
    }
}

fn curseforge_error(error: CurseForgeError) -> ResolveError {
    match error {
        CurseForgeError::NotFound(what) => ResolveError::ModNotFound(what),
        CurseForgeError::Network(msg) => ResolveError::Network(msg),
        CurseForgeError::Api(msg) => ResolveError::Api(msg),
        CurseForgeError::Parse(msg) => ResolveError::Parse(msg),
    }
}

/// Server-side filters for a Modrinth version listing: `(loader, game_version)`.
///
/// The API cannot filter by version number, so exact requests only filter by loader
/// and are matched locally.
pub fn modrinth_filters(reference: &ModReference) -> (&str, Option<&str>) {
    let game_version = match reference.explicit_version {
        VersionRequest::Latest => Some(reference.game_version.as_str()),
        VersionRequest::Exact(_) => None,
    };
    (reference.loader.as_str(), game_version)
}

/// `modLoaderType` to list CurseForge files with, `None` for loaders CurseForge has no code for
pub fn curseforge_loader_filter(reference: &ModReference) -> Option<ModLoaderType> {
    let loader = ModLoaderType::from_loader(&reference.loader);
    if loader.is_none() {
        warn!(
            "CurseForge has no loader code for \"{}\", listing {} files without a loader filter",
            reference.loader, reference.identifier
        );
    }
    loader
}

/// Parse a provider publish timestamp.
///
/// Accepts RFC 3339 and bare `YYYY-MM-DDTHH:MM:SS[.fff]` timestamps followed by a
/// non-numeric offset marker, which are taken as UTC.
pub fn parse_published(raw: &str) -> Result<DateTime<Utc>, ResolveError> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }

    let trimmed = raw.trim_end_matches(|c: char| !c.is_ascii_digit());
    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| ResolveError::Parse(format!("Invalid publish date \"{}\": {}", raw, e)))
}

/// Most recently published item; ties keep the earliest in input order.
pub fn latest_by<T>(items: impl IntoIterator<Item = (DateTime<Utc>, T)>) -> Option<T> {
    let mut best: Option<(DateTime<Utc>, T)> = None;
    for (published, item) in items {
        match &best {
            Some((best_published, _)) if published <= *best_published => {}
            _ => best = Some((published, item)),
        }
    }
    best.map(|(_, item)| item)
}

/// Choose among the versions Modrinth returned for `reference`
pub fn select_modrinth_version(
    reference: &ModReference,
    versions: Vec<Version>,
) -> Result<ResolvedVersion, ResolveError> {
    if versions.is_empty() {
        return Err(no_compatible_version(reference));
    }

    let candidates = match &reference.explicit_version {
        VersionRequest::Latest => versions,
        VersionRequest::Exact(token) => {
            let matching: Vec<Version> = versions
                .into_iter()
                .filter(|v| &v.version_number == token || &v.id == token)
                .collect();
            if matching.is_empty() {
                return Err(ResolveError::VersionNotFound {
                    identifier: reference.identifier.clone(),
                    version: token.clone(),
                    loader: reference.loader.clone(),
                });
            }
            matching
        }
    };

    let dated = candidates
        .into_iter()
        .map(|v| parse_published(&v.date_published).map(|published| (published, v)))
        .collect::<Result<Vec<_>, _>>()?;

    let (published_at, version) = latest_by(dated.into_iter().map(|(p, v)| (p, (p, v))))
        .ok_or_else(|| no_compatible_version(reference))?;

    let files: Vec<FileRecord> = version.files.iter().map(FileRecord::from).collect();
    ResolvedVersion::new(version.version_number.clone(), published_at, files).ok_or_else(|| {
        ResolveError::NoFiles {
            identifier: reference.identifier.clone(),
            version: version.version_number.clone(),
        }
    })
}

/// Choose the newest CurseForge file built for the reference's game version
pub fn select_curseforge_file(
    reference: &ModReference,
    files: Vec<CurseForgeFile>,
) -> Result<CurseForgeFile, ResolveError> {
    let dated = files
        .into_iter()
        .filter(|f| f.game_versions.iter().any(|v| v == &reference.game_version))
        .map(|f| parse_published(&f.file_date).map(|published| (published, f)))
        .collect::<Result<Vec<_>, _>>()?;

    latest_by(dated).ok_or_else(|| no_compatible_version(reference))
}

fn curseforge_resolved(
    reference: &ModReference,
    file: &CurseForgeFile,
) -> Result<ResolvedVersion, ResolveError> {
    let published_at = parse_published(&file.file_date)?;
    ResolvedVersion::new(file.version_label(), published_at, vec![FileRecord::from(file)])
        .ok_or_else(|| ResolveError::NoFiles {
            identifier: reference.identifier.clone(),
            version: file.version_label(),
        })
}

fn no_compatible_version(reference: &ModReference) -> ResolveError {
    ResolveError::NoCompatibleVersion {
        identifier: reference.identifier.clone(),
        loader: reference.loader.clone(),
        game_version: reference.game_version.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modrinth::{FileHashes, VersionFile};
    use chrono::TimeZone;

    fn reference(version: VersionRequest) -> ModReference {
        ModReference {
            provider: Provider::Modrinth,
            identifier: "sodium".to_string(),
            loader: "fabric".to_string(),
            game_version: "1.20.1".to_string(),
            explicit_version: version,
        }
    }

    fn modrinth_version(id: &str, number: &str, published: &str) -> Version {
        Version {
            id: id.to_string(),
            project_id: "AANobbMI".to_string(),
            name: number.to_string(),
            version_number: number.to_string(),
            game_versions: vec!["1.20.1".to_string()],
            version_type: "release".to_string(),
            loaders: vec!["fabric".to_string()],
            files: vec![VersionFile {
                hashes: FileHashes::default(),
                url: Some(format!("https://cdn.modrinth.com/{}.jar", number)),
                filename: format!("sodium-{}.jar", number),
                primary: true,
                size: 10,
            }],
            date_published: published.to_string(),
        }
    }

    fn curseforge_file(id: u64, date: &str, game_versions: &[&str]) -> CurseForgeFile {
        CurseForgeFile {
            id,
            display_name: format!("jei-{}", id),
            file_name: format!("jei-{}.jar", id),
            file_date: date.to_string(),
            download_url: None,
            game_versions: game_versions.iter().map(|v| v.to_string()).collect(),
            hashes: vec![],
        }
    }

    #[test]
    fn test_parse_published_formats() {
        let expected = Utc.with_ymd_and_hms(2023, 10, 1, 12, 0, 0).unwrap();
        assert_eq!(parse_published("2023-10-01T12:00:00Z").unwrap(), expected);
        assert_eq!(parse_published("2023-10-01T14:00:00+02:00").unwrap(), expected);
        assert_eq!(parse_published("2023-10-01T12:00:00").unwrap(), expected);
        assert!(parse_published("2023-10-01T12:00:00.442339Z").unwrap() > expected);
        assert!(matches!(parse_published("yesterday"), Err(ResolveError::Parse(_))));
    }

    #[test]
    fn test_latest_is_max_timestamp_regardless_of_order() {
        let mut versions = vec![
            modrinth_version("a", "0.5.1", "2023-06-01T00:00:00Z"),
            modrinth_version("b", "0.5.3", "2023-09-20T22:02:58.442339Z"),
            modrinth_version("c", "0.5.2", "2023-07-15T00:00:00Z"),
        ];

        for _ in 0..versions.len() {
            let resolved =
                select_modrinth_version(&reference(VersionRequest::Latest), versions.clone()).unwrap();
            assert_eq!(resolved.version_number, "0.5.3");
            versions.rotate_left(1);
        }
    }

    #[test]
    fn test_latest_tie_keeps_first() {
        let versions = vec![
            modrinth_version("a", "first", "2023-06-01T00:00:00Z"),
            modrinth_version("b", "second", "2023-06-01T00:00:00Z"),
        ];
        let resolved = select_modrinth_version(&reference(VersionRequest::Latest), versions).unwrap();
        assert_eq!(resolved.version_number, "first");
    }

    #[test]
    fn test_empty_list_is_no_compatible_version() {
        let error = select_modrinth_version(&reference(VersionRequest::Latest), vec![]).unwrap_err();
        assert!(matches!(error, ResolveError::NoCompatibleVersion { .. }));
    }

    #[test]
    fn test_exact_version_by_number_or_id() {
        let versions = vec![
            modrinth_version("IZskON6d", "0.5.3", "2023-09-20T00:00:00Z"),
            modrinth_version("rAfhHfow", "0.5.2", "2023-07-15T00:00:00Z"),
        ];

        let by_number = select_modrinth_version(
            &reference(VersionRequest::Exact("0.5.2".to_string())),
            versions.clone(),
        )
        .unwrap();
        assert_eq!(by_number.primary_file.file_name, "sodium-0.5.2.jar");

        let by_id = select_modrinth_version(
            &reference(VersionRequest::Exact("IZskON6d".to_string())),
            versions.clone(),
        )
        .unwrap();
        assert_eq!(by_id.version_number, "0.5.3");

        let missing = select_modrinth_version(
            &reference(VersionRequest::Exact("9.9.9".to_string())),
            versions,
        )
        .unwrap_err();
        assert!(matches!(missing, ResolveError::VersionNotFound { .. }));
    }

    #[test]
    fn test_version_without_files() {
        let mut version = modrinth_version("a", "1.0", "2023-06-01T00:00:00Z");
        version.files.clear();
        let error = select_modrinth_version(&reference(VersionRequest::Latest), vec![version]).unwrap_err();
        assert!(matches!(error, ResolveError::NoFiles { .. }));
    }

    #[test]
    fn test_curseforge_selection_filters_game_version() {
        let files = vec![
            curseforge_file(4000001, "2023-09-01T00:00:00Z", &["1.20.2", "Forge"]),
            curseforge_file(4000002, "2023-08-01T00:00:00Z", &["1.20.1", "Forge"]),
            curseforge_file(4000003, "2023-07-01T00:00:00Z", &["1.20.1", "Forge"]),
        ];

        let file = select_curseforge_file(&reference(VersionRequest::Latest), files).unwrap();
        assert_eq!(file.id, 4000002);
    }

    #[test]
    fn test_curseforge_selection_empty() {
        let files = vec![curseforge_file(1, "2023-09-01T00:00:00Z", &["1.19.2"])];
        let error = select_curseforge_file(&reference(VersionRequest::Latest), files).unwrap_err();
        assert!(matches!(error, ResolveError::NoCompatibleVersion { .. }));
    }

    #[test]
    fn test_curseforge_resolved_keeps_file_id() {
        let file = curseforge_file(123456789, "2023-09-01T00:00:00Z", &["1.20.1"]);
        let resolved = curseforge_resolved(&reference(VersionRequest::Latest), &file).unwrap();

        assert_eq!(resolved.primary_file.provider_file_id.as_deref(), Some("123456789"));
        assert_eq!(resolved.primary_file.download_url, None);
        assert_eq!(resolved.version_number, "jei-123456789");
    }

    #[test]
    fn test_modrinth_filters_latest_uses_game_version() {
        let latest = reference(VersionRequest::Latest);
        assert_eq!(modrinth_filters(&latest), ("fabric", Some("1.20.1")));
    }

    #[test]
    fn test_modrinth_filters_exact_uses_loader_only() {
        let exact = reference(VersionRequest::Exact("0.5.3".to_string()));
        assert_eq!(modrinth_filters(&exact), ("fabric", None));
    }

    #[test]
    fn test_curseforge_loader_filter() {
        let mut forge = reference(VersionRequest::Latest);
        forge.provider = Provider::CurseForge;
        forge.loader = "forge".to_string();
        assert_eq!(curseforge_loader_filter(&forge), Some(ModLoaderType::Forge));

        let mut unknown = forge.clone();
        unknown.loader = "liteloader".to_string();
        assert_eq!(curseforge_loader_filter(&unknown), None);
    }

    #[tokio::test]
    async fn test_curseforge_without_api_key() {
        let source = HttpModSource::new(reqwest::Client::new(), None, RetryConfig::none());
        let mut jei = reference(VersionRequest::Latest);
        jei.provider = Provider::CurseForge;
        jei.identifier = "jei".to_string();

        assert_eq!(
            source.resolve(&jei).await,
            Err(ResolveError::MissingApiKey("jei".to_string()))
        );
    }
}
