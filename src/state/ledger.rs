//! Release ledger: the dedup and queue authority for upstream releases.
//!
//! A release id is either pending (queued, not yet published downstream),
//! processed (terminal), or unknown. It is never both pending and processed.
//! The processed set only grows; the pending queue only shrinks through
//! explicit removal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{check_schema, now_utc, read_json, write_json_atomic, StateError};

/// Schema version for ledger.json
pub const SCHEMA_VERSION: u32 = 1;

/// Schema identifier
pub const SCHEMA_ID: &str = "bitbot/release_ledger@1";

/// A queued upstream release
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingRelease {
    pub release_id: u64,
    pub app_id: String,
    pub display_name: String,
    pub version: String,
    /// Downstream tag the release will be published under
    pub tag: String,
    pub asset_name: String,
}

impl PendingRelease {
    pub fn new(
        release_id: u64,
        app_id: impl Into<String>,
        display_name: impl Into<String>,
        version: impl Into<String>,
        tag: impl Into<String>,
        asset_name: impl Into<String>,
    ) -> Self {
        Self {
            release_id,
            app_id: app_id.into(),
            display_name: display_name.into(),
            version: version.into(),
            tag: tag.into(),
            asset_name: asset_name.into(),
        }
    }
}

/// What the downstream repository currently offers for one app
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub display_name: String,
    pub version: String,
    pub tag: String,
    /// SHA-256 of the patched artifact
    pub sha256: String,
    pub url: String,
    /// File name the patched asset was published under
    #[serde(default)]
    pub asset_name: String,
}

/// How [`ReleaseLedger::complete_release`] changed the catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogUpdate {
    /// First release recorded for the app
    Inserted,
    /// The entry was replaced; holds the entry it replaced
    Replaced(CatalogEntry),
    /// The catalog already offers a newer version; nothing was replaced
    KeptNewer,
}

/// Ledger errors
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("release {0} is already queued")]
    DuplicateQueueEntry(u64),

    #[error("release {0} is already processed")]
    AlreadyProcessed(u64),

    #[error(transparent)]
    Storage(#[from] StateError),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LedgerData {
    schema_version: u32,
    schema_id: String,
    processed: BTreeSet<u64>,
    pending: Vec<PendingRelease>,
    published: BTreeMap<String, CatalogEntry>,
    updated_at: DateTime<Utc>,
}

impl Default for LedgerData {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            schema_id: SCHEMA_ID.to_string(),
            processed: BTreeSet::new(),
            pending: Vec::new(),
            published: BTreeMap::new(),
            updated_at: now_utc(),
        }
    }
}

/// Durable release ledger.
///
/// Every mutation is persisted before it returns when the ledger is backed
/// by a file.
#[derive(Debug, Clone)]
pub struct ReleaseLedger {
    path: Option<PathBuf>,
    data: LedgerData,
}

impl ReleaseLedger {
    /// Open the ledger at `path`, starting empty if the file does not exist.
    pub fn open(path: &Path) -> Result<Self, LedgerError> {
        let data = match read_json::<LedgerData>(path)? {
            Some(data) => {
                check_schema(path, &data.schema_id, SCHEMA_ID)?;
                data
            }
            None => LedgerData::default(),
        };

        debug!(
            path = %path.display(),
            processed = data.processed.len(),
            pending = data.pending.len(),
            "opened release ledger"
        );

        Ok(Self {
            path: Some(path.to_path_buf()),
            data,
        })
    }

    /// A ledger that is never written to disk
    pub fn in_memory() -> Self {
        Self {
            path: None,
            data: LedgerData::default(),
        }
    }

    /// Stop persisting further changes (used for dry runs).
    pub fn detached(mut self) -> Self {
        self.path = None;
        self
    }

    pub fn is_processed(&self, release_id: u64) -> bool {
        self.data.processed.contains(&release_id)
    }

    pub fn is_pending(&self, release_id: u64) -> bool {
        self.data.pending.iter().any(|p| p.release_id == release_id)
    }

    /// Queue a release.
    ///
    /// Fails with [`LedgerError::DuplicateQueueEntry`] if the id is already
    /// queued and [`LedgerError::AlreadyProcessed`] if it is terminal.
    pub fn enqueue(&mut self, entry: PendingRelease) -> Result<(), LedgerError> {
        if self.is_processed(entry.release_id) {
            return Err(LedgerError::AlreadyProcessed(entry.release_id));
        }
        if self.is_pending(entry.release_id) {
            return Err(LedgerError::DuplicateQueueEntry(entry.release_id));
        }

        self.data.pending.push(entry);
        self.persist()
    }

    /// Mark a release as processed. Marking an already processed id is a
    /// no-op. Any pending entry for the id is dropped.
    pub fn mark_processed(&mut self, release_id: u64) -> Result<(), LedgerError> {
        let was_pending = self.is_pending(release_id);
        if !self.data.processed.insert(release_id) && !was_pending {
            return Ok(());
        }
        self.data.pending.retain(|p| p.release_id != release_id);
        self.persist()
    }

    /// Pending entries in enqueue order. Entries stay queued until removed.
    pub fn drain_pending(&self) -> Vec<PendingRelease> {
        self.data.pending.clone()
    }

    /// Remove a release from the queue. Returns whether it was queued.
    pub fn remove_pending(&mut self, release_id: u64) -> Result<bool, LedgerError> {
        let before = self.data.pending.len();
        self.data.pending.retain(|p| p.release_id != release_id);
        if self.data.pending.len() == before {
            return Ok(false);
        }
        self.persist()?;
        Ok(true)
    }

    /// Commit a successful publication in a single write: dequeue the
    /// release, mark it processed and record it in the catalog.
    ///
    /// The catalog only moves forward. A release older than the version
    /// already catalogued for the app (one that failed on an earlier run and
    /// succeeded after a newer one) is still marked processed but leaves the
    /// catalog alone. Re-recording the same version replaces the entry.
    pub fn complete_release(
        &mut self,
        release_id: u64,
        app_id: &str,
        entry: CatalogEntry,
    ) -> Result<CatalogUpdate, LedgerError> {
        self.data.pending.retain(|p| p.release_id != release_id);
        self.data.processed.insert(release_id);

        let update = match self.data.published.get(app_id) {
            Some(current) if compare_versions(&entry.version, &current.version).is_lt() => {
                debug!(
                    release_id,
                    app_id,
                    version = %entry.version,
                    current = %current.version,
                    "catalog already holds a newer version"
                );
                CatalogUpdate::KeptNewer
            }
            _ => match self.data.published.insert(app_id.to_string(), entry) {
                Some(previous) => CatalogUpdate::Replaced(previous),
                None => CatalogUpdate::Inserted,
            },
        };
        self.persist()?;
        Ok(update)
    }

    /// Published catalog, keyed by app id
    pub fn catalog(&self) -> &BTreeMap<String, CatalogEntry> {
        &self.data.published
    }

    pub fn processed_count(&self) -> usize {
        self.data.processed.len()
    }

    pub fn pending_count(&self) -> usize {
        self.data.pending.len()
    }

    fn persist(&mut self) -> Result<(), LedgerError> {
        self.data.updated_at = now_utc();
        if let Some(path) = &self.path {
            write_json_atomic(path, &self.data)?;
        }
        Ok(())
    }
}

/// Order two version strings component by component.
///
/// Components are split on anything that is not an ASCII letter or digit.
/// Leading digits compare numerically and any remainder compares as text,
/// so `3.21` is newer than `3.3` and `1.0b` is newer than `1.0a`. Missing
/// components count as `0`.
pub fn compare_versions(left: &str, right: &str) -> Ordering {
    let split = |v: &str| -> Vec<String> {
        v.split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|part| !part.is_empty())
            .map(str::to_string)
            .collect()
    };
    let (left, right) = (split(left), split(right));

    for i in 0..left.len().max(right.len()) {
        let a = left.get(i).map(String::as_str).unwrap_or("0");
        let b = right.get(i).map(String::as_str).unwrap_or("0");
        let ord = compare_component(a, b);
        if ord.is_ne() {
            return ord;
        }
    }
    Ordering::Equal
}

fn compare_component(a: &str, b: &str) -> Ordering {
    let digits = |s: &str| s.len() - s.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    let (a_num, a_rest) = a.split_at(digits(a));
    let (b_num, b_rest) = b.split_at(digits(b));
    let (a_num, b_num) = (
        a_num.trim_start_matches('0'),
        b_num.trim_start_matches('0'),
    );
    a_num
        .len()
        .cmp(&b_num.len())
        .then_with(|| a_num.cmp(b_num))
        .then_with(|| a_rest.cmp(b_rest))
}
