//! Mod page URL classification

use reqwest::Url;

use super::{ModUrl, Provider, VersionRequest};
use crate::error::ClassifyError;

const MODRINTH_HOST: &str = "modrinth.com";
const CURSEFORGE_HOST: &str = "curseforge.com";

/// Modrinth page kinds that resolve to installable jars/zips
const MODRINTH_PAGE_KINDS: [&str; 3] = ["mod", "plugin", "datapack"];

/// Classify a mod page URL.
///
/// Returns `Ok(None)` for entries without a host (empty strings, commented-out
/// or otherwise non-URL text in a mod list); those are skipped silently.
pub fn classify(raw: &str) -> Result<Option<ModUrl>, ClassifyError> {
    let url = match Url::parse(raw.trim()) {
        Ok(url) => url,
        Err(_) => return Ok(None),
    };

    let host = match url.host_str() {
        Some(host) if !host.is_empty() => host,
        _ => return Ok(None),
    };
    let host = host.strip_prefix("www.").unwrap_or(host);

    let segments: Vec<&str> = url
        .path_segments()
        .map(|segments| segments.filter(|s| !s.is_empty()).collect())
        .unwrap_or_default();

    match host {
        MODRINTH_HOST => classify_modrinth(raw, &segments).map(Some),
        CURSEFORGE_HOST => classify_curseforge(raw, &segments).map(Some),
        _ => Err(ClassifyError::UnsupportedProvider {
            host: host.to_string(),
            url: raw.to_string(),
        }),
    }
}

fn classify_modrinth(raw: &str, segments: &[&str]) -> Result<ModUrl, ClassifyError> {
    let unsupported = || ClassifyError::UnsupportedPageKind {
        url: raw.to_string(),
    };

    let (kind, slug, version) = match segments {
        [kind, slug] => (*kind, *slug, VersionRequest::Latest),
        [kind, slug, "version", version] => {
            (*kind, *slug, VersionRequest::Exact(version.to_string()))
        }
        _ => return Err(unsupported()),
    };

    if !MODRINTH_PAGE_KINDS.contains(&kind) {
        return Err(unsupported());
    }

    Ok(ModUrl {
        provider: Provider::Modrinth,
        identifier: slug.to_string(),
        version,
    })
}

fn classify_curseforge(raw: &str, segments: &[&str]) -> Result<ModUrl, ClassifyError> {
    let (slug, version) = match segments {
        ["minecraft", "mc-mods", slug] => (*slug, VersionRequest::Latest),
        ["minecraft", "mc-mods", slug, "files", file_id] => {
            (*slug, VersionRequest::Exact(file_id.to_string()))
        }
        // Any other tab of a mod page still names the mod
        ["minecraft", "mc-mods", slug, ..] => (*slug, VersionRequest::Latest),
        _ => {
            return Err(ClassifyError::NotMinecraftMod {
                url: raw.to_string(),
            })
        }
    };

    Ok(ModUrl {
        provider: Provider::CurseForge,
        identifier: slug.to_string(),
        version,
    })
}
