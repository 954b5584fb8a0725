use std::process::ExitCode;

use modsync::config::Settings;
use modsync::utils::paths::resolve_config_path;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    let settings = match load_settings().await {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("modsync: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    // Dropping the guard flushes the log file, so it lives until we return
    let _guard = match modsync::init_logging(&settings.logs_dir) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("modsync: logging to {} is unavailable: {:#}", settings.logs_dir.display(), e);
            None
        }
    };

    match modsync::run(&settings).await {
        Ok(report) if report.failed().next().is_none() => ExitCode::SUCCESS,
        Ok(_) => {
            info!("Some mods could not be updated, see above");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Sync aborted: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn load_settings() -> anyhow::Result<Settings> {
    let config_path = resolve_config_path(std::env::args().nth(1))?;
    Ok(Settings::load(&config_path).await?)
}
