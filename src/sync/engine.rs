//! Sync engine
//!
//! Drives one run: classify every instance's URLs, resolve and fetch each
//! unique mod once, copy it into every instance that wants it, then prune
//! superseded jars.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use futures_util::{stream, StreamExt};
use tracing::{debug, info, warn};

use super::distribute::{distribute, is_installed, DistributionOutcome, TargetResult};
use super::fetcher::FileFetcher;
use super::plan::SyncPlan;
use super::prune::{prune_instance, PruneReport};
use super::resolver::ModSource;
use super::{is_plain_file_name, DistributionTarget, ModReference};
use crate::cache::FetchCache;
use crate::error::{AppError, AppResult, FetchError, SyncError};
use crate::instance::Instance;

/// Knobs of a run, usually taken from [`crate::config::Settings`]
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub downloads_dir: PathBuf,
    pub max_concurrent_mods: usize,
    pub prune_duplicates: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModStatus {
    /// Every target already had the resolved file
    UpToDate { file_name: String },
    /// The file was fetched and copied into at least one target
    Distributed { file_name: String },
    Failed { error: SyncError },
}

#[derive(Debug, Clone)]
pub struct ModReport {
    pub reference: ModReference,
    pub status: ModStatus,
    pub targets: Vec<TargetResult>,
}

impl ModReport {
    fn failed(reference: &ModReference, error: SyncError) -> Self {
        Self {
            reference: reference.clone(),
            status: ModStatus::Failed { error },
            targets: Vec::new(),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, ModStatus::Failed { .. })
    }
}

#[derive(Debug)]
pub struct InstancePruneReport {
    pub instance: String,
    pub report: PruneReport,
}

/// Outcome of a whole run
#[derive(Debug, Default)]
pub struct SyncReport {
    pub mods: Vec<ModReport>,
    pub rejected_urls: usize,
    pub pruned: Vec<InstancePruneReport>,
}

impl SyncReport {
    pub fn failed(&self) -> impl Iterator<Item = &ModReport> {
        self.mods.iter().filter(|m| m.is_failed())
    }

    /// Number of files written or repaired across all instances
    pub fn files_written(&self) -> usize {
        self.mods
            .iter()
            .flat_map(|m| &m.targets)
            .filter(|t| {
                matches!(
                    t.result,
                    Ok(DistributionOutcome::Written) | Ok(DistributionOutcome::Repaired)
                )
            })
            .count()
    }

    pub fn target_errors(&self) -> usize {
        self.mods
            .iter()
            .flat_map(|m| &m.targets)
            .filter(|t| t.result.is_err())
            .count()
    }

    pub fn files_pruned(&self) -> usize {
        self.pruned.iter().map(|p| p.report.deleted.len()).sum()
    }

    pub fn log_summary(&self) {
        info!(
            "Sync finished: {} mods, {} failed, {} files written, {} copy errors, {} URLs rejected, {} old files deleted",
            self.mods.len(),
            self.failed().count(),
            self.files_written(),
            self.target_errors(),
            self.rejected_urls,
            self.files_pruned()
        );
        for report in self.failed() {
            if let ModStatus::Failed { error } = &report.status {
                warn!("Not updated: {}: {}", report.reference, error);
            }
        }
    }
}

pub struct SyncEngine {
    source: Arc<dyn ModSource>,
    fetcher: FileFetcher,
    cache: FetchCache,
    options: EngineOptions,
}

impl SyncEngine {
    pub fn new(source: Arc<dyn ModSource>, options: EngineOptions) -> Self {
        Self {
            fetcher: FileFetcher::new(Arc::clone(&source), options.downloads_dir.clone()),
            source,
            cache: FetchCache::new(),
            options,
        }
    }

    pub fn cache(&self) -> &FetchCache {
        &self.cache
    }

    /// Sync every instance. Only setup failures are returned as errors;
    /// per-mod and per-target problems end up in the report.
    pub async fn run(&self, instances: &[Instance]) -> AppResult<SyncReport> {
        let plan = SyncPlan::from_instances(instances);
        info!(
            "Syncing {} unique mods across {} instances",
            plan.len(),
            instances.len()
        );

        self.prepare_download_folders(&plan).await?;

        let rejected_urls = plan.rejected().len();
        let mods = self.sync_plan(plan).await;

        let pruned = if self.options.prune_duplicates {
            self.prune(instances).await
        } else {
            debug!("Duplicate pruning is disabled");
            Vec::new()
        };

        Ok(SyncReport {
            mods,
            rejected_urls,
            pruned,
        })
    }

    /// Create `downloads_dir/{loader}/{game_version}` for every pair in the plan
    pub async fn prepare_download_folders(&self, plan: &SyncPlan) -> AppResult<()> {
        for (loader, game_version) in plan.loader_versions() {
            let folder = self.fetcher.download_folder(&loader, &game_version);
            tokio::fs::create_dir_all(&folder).await.map_err(|e| {
                AppError::Io(format!(
                    "Failed to create downloads folder {}: {}",
                    folder.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Sync every mod of the plan, at most `max_concurrent_mods` at a time.
    /// Reports come back sorted by reference.
    pub async fn sync_plan(&self, plan: SyncPlan) -> Vec<ModReport> {
        let limit = self.options.max_concurrent_mods.max(1);
        let mut reports: Vec<ModReport> = stream::iter(plan)
            .map(move |(reference, targets)| async move { self.sync_mod(&reference, &targets).await })
            .buffer_unordered(limit)
            .collect()
            .await;

        reports.sort_by(|a, b| a.reference.cmp(&b.reference));
        reports
    }

    /// Bring one mod up to date in every target.
    ///
    /// The provider is only asked for bytes when some target lacks an intact copy.
    pub async fn sync_mod(
        &self,
        reference: &ModReference,
        targets: &BTreeSet<DistributionTarget>,
    ) -> ModReport {
        let resolved = match self
            .cache
            .resolve_with(reference, || self.source.resolve(reference))
            .await
        {
            Ok(resolved) => resolved,
            Err(e) => {
                warn!("Could not resolve {}: {}", reference, e);
                return ModReport::failed(reference, e.into());
            }
        };

        let file_name = resolved.primary_file.file_name.clone();
        if !is_plain_file_name(&file_name) {
            let error = FetchError::InvalidFileName(file_name);
            warn!("Skipping {}: {}", reference, error);
            return ModReport::failed(reference, error.into());
        }
        debug!("{} resolved to {} ({})", reference, resolved.version_number, file_name);

        let mut present = Vec::new();
        let mut pending = Vec::new();
        for target in targets {
            if is_installed(target, &file_name).await {
                present.push(target);
            } else {
                pending.push(target);
            }
        }

        let mut results: Vec<TargetResult> = present
            .into_iter()
            .map(|target| TargetResult {
                target: target.clone(),
                result: Ok(DistributionOutcome::AlreadyPresent),
            })
            .collect();

        if pending.is_empty() {
            info!("\"{}\" is up to date", file_name);
            return ModReport {
                reference: reference.clone(),
                status: ModStatus::UpToDate { file_name },
                targets: results,
            };
        }

        let fetched = match self
            .cache
            .get_or_fetch(reference, || async {
                self.fetcher
                    .fetch_file(reference, &resolved)
                    .await
                    .map_err(SyncError::from)
            })
            .await
        {
            Ok(fetched) => fetched,
            Err(e) => {
                warn!("Could not download {}: {}", reference, e);
                return ModReport {
                    reference: reference.clone(),
                    status: ModStatus::Failed { error: e },
                    targets: results,
                };
            }
        };

        results.extend(distribute(&fetched, pending).await);
        ModReport {
            reference: reference.clone(),
            status: ModStatus::Distributed { file_name },
            targets: results,
        }
    }

    /// Delete superseded jars in every instance.
    /// Instances whose loader has no readable mod ids are left alone with a warning.
    pub async fn prune(&self, instances: &[Instance]) -> Vec<InstancePruneReport> {
        let mut reports = Vec::new();

        for instance in instances {
            info!("Deleting old mods from instance \"{}\"", instance.name);
            let directory = instance.directory.clone();
            let loader = instance.loader.clone();
            let report = match tokio::task::spawn_blocking(move || prune_instance(&directory, &loader)).await {
                Ok(report) => report,
                Err(e) => {
                    warn!("Pruning \"{}\" did not finish: {}", instance.name, e);
                    continue;
                }
            };

            reports.push(InstancePruneReport {
                instance: instance.name.clone(),
                report,
            });
        }

        reports
    }
}
