//! Patch pipeline
//!
//! Turns upstream releases into downstream releases carrying the unlocked
//! asset:
//! - `discover`: list upstream releases, parse their bodies, queue new ones
//! - `process_pending`: download, patch and publish everything queued
//!
//! The ledger is only told about a release once the downstream release is
//! confirmed to exist, so an interrupted run leaves the release queued and
//! the next run picks it up (reconciling with the downstream repository if
//! the release was in fact created).

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

use bitbot_cipher::{patch_blob, CipherKey};

use crate::clients::{ArtifactRepositoryClient, NewRelease, ReleaseRef, SourceRepositoryClient};
use crate::config::{BotConfig, ConfigProvider};
use crate::error::{BotError, BotResult};
use crate::release::ReleaseBody;
use crate::retry::RetryPolicy;
use crate::state::{
    CatalogEntry, CatalogUpdate, LedgerError, PendingRelease, ReleaseLedger, ReleaseStage,
    ReleaseTrace,
};
use crate::template::fill;

/// Prefix for the title of a superseded downstream release
pub const OUTDATED_TITLE_PREFIX: &str = "[OUTDATED]";

/// Outcome of one discovery pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryReport {
    /// Releases listed by the source repository
    pub discovered: usize,
    pub enqueued: usize,
    /// Already processed or queued by an earlier run
    pub already_known: usize,
    /// Bodies that could not be parsed; marked processed
    pub parse_failed: usize,
    pub traces: Vec<ReleaseTrace>,
}

/// Outcome of one pass over the pending queue
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessReport {
    pub published: usize,
    /// Found already published downstream and recorded without re-uploading
    pub reconciled: usize,
    /// Left queued for the next run
    pub failed_retryable: usize,
    /// Feature flags flipped from false to true across all assets
    pub features_unlocked: usize,
    pub traces: Vec<ReleaseTrace>,
}

/// Per-release workflow from upstream release to downstream release
pub struct PatchOrchestrator<'a> {
    config: &'a BotConfig,
    source: &'a dyn SourceRepositoryClient,
    artifacts: &'a dyn ArtifactRepositoryClient,
    retry: RetryPolicy,
    key: CipherKey,
}

impl<'a> PatchOrchestrator<'a> {
    pub fn new(
        config: &'a BotConfig,
        source: &'a dyn SourceRepositoryClient,
        artifacts: &'a dyn ArtifactRepositoryClient,
        retry: RetryPolicy,
    ) -> BotResult<Self> {
        let key = CipherKey::derive(config.cipher_key())?;
        Ok(Self {
            config,
            source,
            artifacts,
            retry,
            key,
        })
    }

    /// Queue every upstream release the ledger has not seen.
    ///
    /// Releases are visited oldest first so the queue follows publication
    /// order. A body that does not parse is marked processed and never
    /// looked at again.
    pub fn discover(&self, ledger: &mut ReleaseLedger) -> BotResult<DiscoveryReport> {
        let repo = &self.config.github.source_repo;
        let releases = self
            .retry
            .run("list_releases", || self.source.list_releases(repo))?;

        let mut report = DiscoveryReport {
            discovered: releases.len(),
            ..DiscoveryReport::default()
        };

        for release in releases.iter().rev() {
            if ledger.is_processed(release.id) || ledger.is_pending(release.id) {
                report.already_known += 1;
                continue;
            }

            let mut trace = ReleaseTrace::new(release.id, ReleaseStage::Discovered);

            let body = match ReleaseBody::parse(&release.body) {
                Ok(body) => body,
                Err(e) => {
                    warn!(release_id = release.id, tag = %release.tag_name, error = %e, "rejecting unparseable release");
                    ledger.mark_processed(release.id)?;
                    step(&mut trace, ReleaseStage::Rejected);
                    trace.error = Some(BotError::Parse(e.to_string()).to_string());
                    report.parse_failed += 1;
                    report.traces.push(trace);
                    continue;
                }
            };
            step(&mut trace, ReleaseStage::Parsed);

            let pending = self.pending_release(release.id, &body);
            trace.tag = Some(pending.tag.clone());

            match ledger.enqueue(pending) {
                Ok(()) => {
                    info!(release_id = release.id, app_id = %body.app, version = %body.version, "queued release");
                    step(&mut trace, ReleaseStage::Queued);
                    report.enqueued += 1;
                    report.traces.push(trace);
                }
                Err(LedgerError::DuplicateQueueEntry(_)) | Err(LedgerError::AlreadyProcessed(_)) => {
                    report.already_known += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }

        info!(
            discovered = report.discovered,
            enqueued = report.enqueued,
            parse_failed = report.parse_failed,
            "discovery finished"
        );
        Ok(report)
    }

    fn pending_release(&self, release_id: u64, body: &ReleaseBody) -> PendingRelease {
        let display_name = self.config.display_name(&body.app);
        let tag = fill(
            &self.config.release.tag_format,
            &[
                ("app_id", &body.app),
                ("version", &body.version),
                ("display_name", &display_name),
            ],
        );
        let asset_name = body
            .asset_name_or(&self.config.github.asset_file_name)
            .to_string();
        PendingRelease::new(
            release_id,
            body.app.clone(),
            display_name,
            body.version.clone(),
            tag,
            asset_name,
        )
    }

    /// Publish every queued release.
    ///
    /// A failing release stays queued and the rest of the batch continues.
    /// Errors that need an operator (state storage, credentials) stop the
    /// run.
    pub fn process_pending(&self, ledger: &mut ReleaseLedger) -> BotResult<ProcessReport> {
        let mut report = ProcessReport::default();

        for pending in ledger.drain_pending() {
            let mut trace = ReleaseTrace::new(pending.release_id, ReleaseStage::Queued);
            trace.tag = Some(pending.tag.clone());

            let workdir = tempfile::Builder::new()
                .prefix(&format!("bitbot-{}-", pending.release_id))
                .tempdir()?;

            let result = self.process_one(&pending, ledger, &mut trace, workdir.path());

            // Removes the scratch files; dropping the guard does the same
            // if anything above unwinds.
            if let Err(e) = workdir.close() {
                warn!(release_id = pending.release_id, error = %e, "failed to remove scratch directory");
            }
            step(&mut trace, ReleaseStage::CleanedUp);

            match result {
                Ok(outcome) => {
                    step(&mut trace, ReleaseStage::Succeeded);
                    match outcome {
                        Outcome::Published { unlocked } => {
                            report.published += 1;
                            report.features_unlocked += unlocked;
                        }
                        Outcome::Reconciled => report.reconciled += 1,
                    }
                }
                Err(e) if e.aborts_run() => return Err(e),
                Err(e) => {
                    warn!(
                        release_id = pending.release_id,
                        tag = %pending.tag,
                        error = %e,
                        "release left queued for the next run"
                    );
                    step(&mut trace, ReleaseStage::FailedRetryable);
                    trace.error = Some(e.to_string());
                    report.failed_retryable += 1;
                }
            }
            report.traces.push(trace);
        }

        info!(
            published = report.published,
            reconciled = report.reconciled,
            failed = report.failed_retryable,
            "release processing finished"
        );
        Ok(report)
    }

    fn process_one(
        &self,
        pending: &PendingRelease,
        ledger: &mut ReleaseLedger,
        trace: &mut ReleaseTrace,
        workdir: &Path,
    ) -> BotResult<Outcome> {
        let bot_repo = &self.config.github.bot_repo;

        if let Some(existing) = self.retry.run("find_release", || {
            self.artifacts.find_release(bot_repo, &pending.tag)
        })? {
            info!(release_id = pending.release_id, tag = %pending.tag, "release already exists downstream");
            let sha256 = ReleaseBody::parse(&existing.notes)
                .ok()
                .and_then(|b| b.sha256)
                .unwrap_or_default();
            step(trace, ReleaseStage::Published);
            self.commit(pending, ledger, &existing, sha256)?;
            return Ok(Outcome::Reconciled);
        }

        let raw = self.retry.run("fetch_asset", || {
            self.source.fetch_asset(
                &self.config.github.source_repo,
                pending.release_id,
                &pending.asset_name,
            )
        })?;
        fs::write(workdir.join(format!("{}.upstream", pending.asset_name)), &raw)?;
        step(trace, ReleaseStage::Downloaded);

        let (patched, unlocked) = patch_blob(&String::from_utf8_lossy(&raw), &self.key)?;
        fs::write(workdir.join(&pending.asset_name), patched.as_bytes())?;
        let sha256 = hex::encode(Sha256::digest(patched.as_bytes()));
        debug!(release_id = pending.release_id, unlocked, %sha256, "patched asset");
        step(trace, ReleaseStage::Patched);

        let notes = ReleaseBody {
            app: pending.app_id.clone(),
            version: pending.version.clone(),
            asset_name: Some(pending.asset_name.clone()),
            sha256: Some(sha256.clone()),
        }
        .to_string();
        let title = self.release_title(&pending.app_id, &pending.display_name, &pending.version);
        let new_release = NewRelease {
            tag: &pending.tag,
            title: &title,
            notes: &notes,
            asset_name: &pending.asset_name,
            artifact: patched.as_bytes(),
        };

        let created = match self.retry.run("create_release", || {
            self.artifacts.create_release(bot_repo, &new_release)
        }) {
            Ok(created) => created,
            // The create may have landed even though the call failed.
            Err(err) => match self.retry.run("find_release", || {
                self.artifacts.find_release(bot_repo, &pending.tag)
            })? {
                Some(found) => {
                    warn!(tag = %pending.tag, error = %err, "create_release failed but the release exists");
                    found
                }
                None => return Err(err.into()),
            },
        };
        info!(release_id = pending.release_id, tag = %created.tag, url = %created.url, "published release");
        step(trace, ReleaseStage::Published);

        self.commit(pending, ledger, &created, sha256)?;
        Ok(Outcome::Published { unlocked })
    }

    /// Record a published release and retire the one it replaces.
    fn commit(
        &self,
        pending: &PendingRelease,
        ledger: &mut ReleaseLedger,
        release: &ReleaseRef,
        sha256: String,
    ) -> BotResult<()> {
        let entry = CatalogEntry {
            display_name: pending.display_name.clone(),
            version: pending.version.clone(),
            tag: pending.tag.clone(),
            sha256,
            url: release.url.clone(),
            asset_name: pending.asset_name.clone(),
        };
        match ledger.complete_release(pending.release_id, &pending.app_id, entry)? {
            CatalogUpdate::Inserted => {}
            CatalogUpdate::Replaced(previous) => {
                if previous.tag != pending.tag {
                    self.retire(&pending.app_id, &previous.display_name, &previous.version, &previous.tag);
                }
            }
            // Published after a newer version went out; it is outdated on arrival.
            CatalogUpdate::KeptNewer => {
                info!(
                    release_id = pending.release_id,
                    app_id = %pending.app_id,
                    version = %pending.version,
                    "a newer version is already published; catalog unchanged"
                );
                self.retire(&pending.app_id, &pending.display_name, &pending.version, &pending.tag);
            }
        }
        Ok(())
    }

    /// Retitle a superseded downstream release. Failures are logged only.
    fn retire(&self, app_id: &str, display_name: &str, version: &str, tag: &str) {
        let old_title = self.release_title(app_id, display_name, version);
        let new_title = format!("{} {}", OUTDATED_TITLE_PREFIX, old_title);
        let bot_repo = &self.config.github.bot_repo;
        match self.retry.run("mark_outdated", || {
            self.artifacts.mark_outdated(bot_repo, tag, &new_title)
        }) {
            Ok(()) => info!(tag = %tag, "marked release outdated"),
            Err(e) => warn!(tag = %tag, error = %e, "failed to mark release outdated"),
        }
    }

    fn release_title(&self, app_id: &str, display_name: &str, version: &str) -> String {
        fill(
            &self.config.release.title_format,
            &[
                ("app_id", app_id),
                ("display_name", display_name),
                ("version", version),
            ],
        )
    }
}

enum Outcome {
    Published { unlocked: usize },
    Reconciled,
}

/// Advance a trace along a transition the pipeline always takes in order.
fn step(trace: &mut ReleaseTrace, stage: ReleaseStage) {
    if let Err(e) = trace.advance(stage) {
        warn!(release_id = trace.release_id, error = %e, "unexpected release stage transition");
    }
}
