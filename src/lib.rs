pub mod cache;
pub mod config;
pub mod curseforge;
pub mod download;
pub mod error;
pub mod instance;
pub mod modrinth;
pub mod sync;
pub mod utils;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use config::Settings;
use download::client::RetryConfig;
use error::AppResult;
use sync::engine::EngineOptions;
use sync::resolver::HttpModSource;
use sync::{SyncEngine, SyncReport};

const LOG_FILE: &str = "latest.log";

/// Initialize the logging system with file and console output.
///
/// `latest.log` only holds the current run. The returned guard flushes the
/// file writer when dropped, so keep it alive until the end of `main`.
pub fn init_logging(logs_dir: &Path) -> anyhow::Result<WorkerGuard> {
    std::fs::create_dir_all(logs_dir)?;
    let log_file = std::fs::File::create(logs_dir.join(LOG_FILE))?;
    let (non_blocking, guard) = tracing_appender::non_blocking(log_file);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,hyper=warn,reqwest=warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(false))
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(true),
        )
        .try_init()?;

    Ok(guard)
}

/// Shared HTTP client for every provider call of a run
pub fn build_http_client(settings: &Settings) -> AppResult<reqwest::Client> {
    let client = reqwest::Client::builder()
        .user_agent(&settings.user_agent)
        .connect_timeout(Duration::from_secs(15))
        .timeout(Duration::from_secs(settings.request_timeout_secs))
        .build()?;
    Ok(client)
}

/// Engine talking to the real providers, configured from `settings`
pub fn build_engine(settings: &Settings) -> AppResult<SyncEngine> {
    let retry = RetryConfig {
        max_retries: settings.download_retries,
        ..RetryConfig::default()
    };
    let source = HttpModSource::new(
        build_http_client(settings)?,
        settings.curseforge_api_key.clone(),
        retry,
    );

    Ok(SyncEngine::new(
        Arc::new(source),
        EngineOptions {
            downloads_dir: settings.downloads_dir.clone(),
            max_concurrent_mods: settings.max_concurrent_mods,
            prune_duplicates: settings.prune_duplicates,
        },
    ))
}

/// Load instances and sync them once
pub async fn run(settings: &Settings) -> AppResult<SyncReport> {
    if settings.curseforge_api_key.is_none() {
        info!("No CurseForge API key configured, CurseForge mods will be skipped");
    }

    let instances = instance::load_instances(&settings.instances_dir).await?;
    if instances.is_empty() {
        info!(
            "No enabled instances in {}, nothing to do",
            settings.instances_dir.display()
        );
        return Ok(SyncReport::default());
    }

    let engine = build_engine(settings)?;
    let report = engine.run(&instances).await?;
    report.log_summary();
    Ok(report)
}
