//! Difference between what the forum announced and what is published.

use std::collections::BTreeMap;

use crate::config::ConfigProvider;
use crate::state::CatalogEntry;

/// An app that is newly available
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Addition {
    pub display_name: String,
    pub version: String,
    pub url: String,
    pub asset_name: String,
}

/// An app with a new version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Update {
    pub display_name: String,
    pub old_version: String,
    pub new_version: String,
    pub url: String,
    pub asset_name: String,
}

/// An app that is no longer published
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Removal {
    pub display_name: String,
    pub old_version: String,
}

/// Per-run delta keyed by app id. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub added: BTreeMap<String, Addition>,
    pub updated: BTreeMap<String, Update>,
    pub removed: BTreeMap<String, Removal>,
}

impl ChangeSet {
    /// Compare the announced versions against the current catalog.
    pub fn between(
        online: &BTreeMap<String, String>,
        catalog: &BTreeMap<String, CatalogEntry>,
        config: &dyn ConfigProvider,
    ) -> Self {
        let mut changes = ChangeSet::default();

        for (app_id, entry) in catalog {
            match online.get(app_id) {
                None => {
                    changes.added.insert(
                        app_id.clone(),
                        Addition {
                            display_name: entry.display_name.clone(),
                            version: entry.version.clone(),
                            url: entry.url.clone(),
                            asset_name: entry.asset_name.clone(),
                        },
                    );
                }
                Some(old) if *old != entry.version => {
                    changes.updated.insert(
                        app_id.clone(),
                        Update {
                            display_name: entry.display_name.clone(),
                            old_version: old.clone(),
                            new_version: entry.version.clone(),
                            url: entry.url.clone(),
                            asset_name: entry.asset_name.clone(),
                        },
                    );
                }
                Some(_) => {}
            }
        }

        for (app_id, old) in online {
            if !catalog.contains_key(app_id) {
                changes.removed.insert(
                    app_id.clone(),
                    Removal {
                        display_name: config.display_name(app_id),
                        old_version: old.clone(),
                    },
                );
            }
        }

        changes
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }

    /// Apps that were added or updated
    pub fn touched(&self) -> usize {
        self.added.len() + self.updated.len()
    }

    /// Bring an announced-version map up to date with this change set.
    pub fn apply_to(&self, online: &mut BTreeMap<String, String>) {
        for (app_id, addition) in &self.added {
            online.insert(app_id.clone(), addition.version.clone());
        }
        for (app_id, update) in &self.updated {
            online.insert(app_id.clone(), update.new_version.clone());
        }
        for app_id in self.removed.keys() {
            online.remove(app_id);
        }
    }
}
