//! Grouping of instance mod lists into unique references

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

use super::url::classify;
use super::{DistributionTarget, ModReference};
use crate::error::ClassifyError;
use crate::instance::Instance;

/// Every unique [`ModReference`] of a run and the instances that want it
#[derive(Debug, Default)]
pub struct SyncPlan {
    mods: BTreeMap<ModReference, BTreeSet<DistributionTarget>>,
    rejected: Vec<(String, ClassifyError)>,
}

impl SyncPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify every URL of every instance. Rejected URLs are logged and remembered.
    pub fn from_instances(instances: &[Instance]) -> Self {
        let mut plan = Self::new();

        for instance in instances {
            let target = DistributionTarget::new(&instance.directory);
            for raw in &instance.mod_urls {
                match classify(raw) {
                    Ok(Some(url)) => {
                        let reference = url.into_reference(&instance.loader, &instance.game_version);
                        plan.add(reference, target.clone());
                    }
                    Ok(None) => debug!("Ignoring non-URL entry \"{}\" in {}", raw, instance.name),
                    Err(e) => {
                        warn!("Skipping mod in instance \"{}\": {}", instance.name, e);
                        plan.rejected.push((raw.clone(), e));
                    }
                }
            }
        }

        plan
    }

    pub fn add(&mut self, reference: ModReference, target: DistributionTarget) {
        self.mods.entry(reference).or_default().insert(target);
    }

    pub fn len(&self) -> usize {
        self.mods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mods.is_empty()
    }

    pub fn rejected(&self) -> &[(String, ClassifyError)] {
        &self.rejected
    }

    pub fn targets(&self, reference: &ModReference) -> Option<&BTreeSet<DistributionTarget>> {
        self.mods.get(reference)
    }

    /// Distinct `(loader, game_version)` pairs, one downloads folder each
    pub fn loader_versions(&self) -> BTreeSet<(String, String)> {
        self.mods
            .keys()
            .map(|r| (r.loader.clone(), r.game_version.clone()))
            .collect()
    }
}

impl IntoIterator for SyncPlan {
    type Item = (ModReference, BTreeSet<DistributionTarget>);
    type IntoIter = std::collections::btree_map::IntoIter<ModReference, BTreeSet<DistributionTarget>>;

    fn into_iter(self) -> Self::IntoIter {
        self.mods.into_iter()
    }
}
