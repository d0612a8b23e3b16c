//! In-memory source and artifact repositories

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use super::failure::{FailureConfig, FailureInjector, Op};
use super::lock;
use crate::clients::{
    ArtifactRepositoryClient, AssetRef, ClientError, NewRelease, ReleaseRef,
    SourceRepositoryClient, UpstreamRelease,
};

#[derive(Debug, Default)]
struct SourceState {
    /// Most recent first
    releases: Vec<UpstreamRelease>,
    assets: HashMap<(u64, String), Vec<u8>>,
}

/// Upstream repository backed by memory. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MockSource {
    state: Arc<Mutex<SourceState>>,
    failures: Arc<Mutex<FailureInjector>>,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish an upstream release. It becomes the most recent one.
    pub fn publish(&self, id: u64, tag: &str, body: &str, asset: Option<(&str, Vec<u8>)>) {
        let mut state = lock(&self.state);
        let assets = match asset {
            Some((name, bytes)) => {
                state.assets.insert((id, name.to_string()), bytes);
                vec![AssetRef {
                    id: id * 100,
                    name: name.to_string(),
                }]
            }
            None => Vec::new(),
        };
        state.releases.insert(
            0,
            UpstreamRelease {
                id,
                tag_name: tag.to_string(),
                body: body.to_string(),
                assets,
                published_at: None,
            },
        );
    }

    pub fn inject_failure(&self, op: Op, config: FailureConfig) {
        lock(&self.failures).inject(op, config);
    }

    pub fn clear_failures(&self) {
        lock(&self.failures).clear();
    }

    pub fn calls(&self, op: Op) -> u32 {
        lock(&self.failures).calls(op)
    }

    fn check(&self, op: Op) -> Result<(), ClientError> {
        match lock(&self.failures).check(op) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl SourceRepositoryClient for MockSource {
    fn list_releases(&self, _repo: &str) -> Result<Vec<UpstreamRelease>, ClientError> {
        self.check(Op::ListReleases)?;
        Ok(lock(&self.state).releases.clone())
    }

    fn fetch_asset(
        &self,
        _repo: &str,
        release_id: u64,
        asset_name: &str,
    ) -> Result<Vec<u8>, ClientError> {
        self.check(Op::FetchAsset)?;
        lock(&self.state)
            .assets
            .get(&(release_id, asset_name.to_string()))
            .cloned()
            .ok_or_else(|| {
                ClientError::NotFound(format!("asset {} on release {}", asset_name, release_id))
            })
    }
}

/// A release held by [`MockArtifacts`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRelease {
    pub release: ReleaseRef,
    pub asset_name: String,
    pub artifact: Vec<u8>,
}

/// Downstream repository backed by memory. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MockArtifacts {
    releases: Arc<Mutex<BTreeMap<String, StoredRelease>>>,
    failures: Arc<Mutex<FailureInjector>>,
}

impl MockArtifacts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a release that already exists downstream.
    pub fn seed(&self, release: ReleaseRef, asset_name: &str, artifact: Vec<u8>) {
        lock(&self.releases).insert(
            release.tag.clone(),
            StoredRelease {
                release,
                asset_name: asset_name.to_string(),
                artifact,
            },
        );
    }

    pub fn release(&self, tag: &str) -> Option<StoredRelease> {
        lock(&self.releases).get(tag).cloned()
    }

    pub fn release_count(&self) -> usize {
        lock(&self.releases).len()
    }

    pub fn inject_failure(&self, op: Op, config: FailureConfig) {
        lock(&self.failures).inject(op, config);
    }

    pub fn clear_failures(&self) {
        lock(&self.failures).clear();
    }

    pub fn calls(&self, op: Op) -> u32 {
        lock(&self.failures).calls(op)
    }

    fn check(&self, op: Op) -> Result<(), ClientError> {
        match lock(&self.failures).check(op) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl ArtifactRepositoryClient for MockArtifacts {
    fn create_release(
        &self,
        repo: &str,
        release: &NewRelease<'_>,
    ) -> Result<ReleaseRef, ClientError> {
        self.check(Op::CreateRelease)?;
        let mut releases = lock(&self.releases);
        if releases.contains_key(release.tag) {
            return Err(ClientError::Protocol(format!(
                "release {} already exists",
                release.tag
            )));
        }
        let created = ReleaseRef {
            tag: release.tag.to_string(),
            title: release.title.to_string(),
            url: format!("https://github.com/{}/releases/tag/{}", repo, release.tag),
            notes: release.notes.to_string(),
        };
        releases.insert(
            release.tag.to_string(),
            StoredRelease {
                release: created.clone(),
                asset_name: release.asset_name.to_string(),
                artifact: release.artifact.to_vec(),
            },
        );
        Ok(created)
    }

    fn mark_outdated(&self, _repo: &str, tag: &str, new_title: &str) -> Result<(), ClientError> {
        self.check(Op::MarkOutdated)?;
        match lock(&self.releases).get_mut(tag) {
            Some(stored) => {
                stored.release.title = new_title.to_string();
                Ok(())
            }
            None => Err(ClientError::NotFound(format!("release {}", tag))),
        }
    }

    fn find_release(&self, _repo: &str, tag: &str) -> Result<Option<ReleaseRef>, ClientError> {
        self.check(Op::FindRelease)?;
        Ok(lock(&self.releases).get(tag).map(|s| s.release.clone()))
    }
}
