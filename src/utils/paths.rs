use directories::ProjectDirs;
use std::path::PathBuf;

/// Environment variable overriding the settings file location
pub const CONFIG_ENV: &str = "MODSYNC_CONFIG";

/// Get the application data directory
pub fn get_data_dir() -> anyhow::Result<PathBuf> {
    let proj_dirs = ProjectDirs::from("com", "kaizen", "modsync")
        .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;

    Ok(proj_dirs.data_dir().to_path_buf())
}

/// Get the default settings file
pub fn get_default_config_path() -> anyhow::Result<PathBuf> {
    Ok(get_data_dir()?.join("settings.json"))
}

/// Settings file to use: an explicit argument, then `MODSYNC_CONFIG`, then the data directory
pub fn resolve_config_path(arg: Option<String>) -> anyhow::Result<PathBuf> {
    if let Some(path) = arg.filter(|p| !p.is_empty()) {
        return Ok(PathBuf::from(path));
    }
    match std::env::var(CONFIG_ENV) {
        Ok(path) if !path.is_empty() => Ok(PathBuf::from(path)),
        _ => get_default_config_path(),
    }
}
