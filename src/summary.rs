//! Run summary (summary.json)
//!
//! One per invocation, written to the state directory so the outcome of the
//! last run can be inspected without reading logs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::BotError;
use crate::pipeline::{DiscoveryReport, ProcessReport};
use crate::publish::{CheckOutcome, PublicationDecision};
use crate::state::{write_json_atomic, ReleaseTrace, StateError, SUMMARY_FILE};

/// Schema version for summary.json
pub const RUN_SUMMARY_SCHEMA_VERSION: u32 = 1;

/// Schema identifier for summary.json
pub const RUN_SUMMARY_SCHEMA_ID: &str = "bitbot/run_summary@1";

/// Exit code for a run where some releases or posts failed but the run
/// itself completed
pub const EXIT_PARTIAL: i32 = 1;

/// Aggregated run status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    /// Completed, with work left for the next run
    Partial,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub schema_version: u32,
    pub schema_id: String,
    pub run_id: String,
    pub created_at: DateTime<Utc>,

    /// CLI command that produced this run
    pub command: String,
    pub dry_run: bool,

    pub status: Status,
    pub exit_code: i32,

    pub releases_discovered: usize,
    pub releases_enqueued: usize,
    pub releases_parse_failed: usize,
    pub releases_published: usize,
    pub releases_reconciled: usize,
    pub releases_failed_retryable: usize,
    pub features_unlocked: usize,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub publication: Option<PublicationDecision>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<CheckOutcome>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub traces: Vec<ReleaseTrace>,

    /// Error that ended the run early
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub duration_ms: u64,
    pub human_summary: String,
}

impl RunSummary {
    pub fn new(command: &str, dry_run: bool) -> Self {
        Self {
            schema_version: RUN_SUMMARY_SCHEMA_VERSION,
            schema_id: RUN_SUMMARY_SCHEMA_ID.to_string(),
            run_id: ulid::Ulid::new().to_string(),
            created_at: Utc::now(),
            command: command.to_string(),
            dry_run,
            status: Status::Success,
            exit_code: 0,
            releases_discovered: 0,
            releases_enqueued: 0,
            releases_parse_failed: 0,
            releases_published: 0,
            releases_reconciled: 0,
            releases_failed_retryable: 0,
            features_unlocked: 0,
            publication: None,
            feedback: None,
            traces: Vec::new(),
            error: None,
            duration_ms: 0,
            human_summary: String::new(),
        }
    }

    pub fn record_discovery(&mut self, report: DiscoveryReport) {
        self.releases_discovered += report.discovered;
        self.releases_enqueued += report.enqueued;
        self.releases_parse_failed += report.parse_failed;
        self.traces.extend(report.traces);
    }

    pub fn record_processing(&mut self, report: ProcessReport) {
        self.releases_published += report.published;
        self.releases_reconciled += report.reconciled;
        self.releases_failed_retryable += report.failed_retryable;
        self.features_unlocked += report.features_unlocked;
        self.traces.extend(report.traces);
    }

    pub fn record_publication(&mut self, decision: PublicationDecision) {
        self.publication = Some(decision);
    }

    pub fn record_feedback(&mut self, outcome: CheckOutcome) {
        self.feedback = Some(outcome);
    }

    /// Settle status and exit code once the run is over.
    pub fn finish(&mut self, error: Option<&BotError>, duration_ms: u64) {
        self.duration_ms = duration_ms;
        let outdated_failed = matches!(
            self.publication,
            Some(PublicationDecision::CreateNew { outdated_failed, .. }) if outdated_failed > 0
        );

        (self.status, self.exit_code) = match error {
            Some(err) => {
                self.error = Some(err.to_string());
                (Status::Failed, err.exit_code())
            }
            None if self.releases_failed_retryable > 0 || outdated_failed => {
                (Status::Partial, EXIT_PARTIAL)
            }
            None => (Status::Success, 0),
        };
        self.human_summary = self.generate_human_summary();
    }

    fn generate_human_summary(&self) -> String {
        let mut parts = Vec::new();
        if self.releases_discovered > 0 || self.releases_enqueued > 0 {
            parts.push(format!(
                "{} discovered, {} queued",
                self.releases_discovered, self.releases_enqueued
            ));
        }
        if self.releases_parse_failed > 0 {
            parts.push(format!("{} rejected", self.releases_parse_failed));
        }
        let processed = self.releases_published + self.releases_reconciled;
        if processed > 0 || self.releases_failed_retryable > 0 {
            parts.push(format!(
                "{} published, {} left queued",
                processed, self.releases_failed_retryable
            ));
        }
        match &self.publication {
            Some(PublicationDecision::NoAction) => parts.push("forum up to date".to_string()),
            Some(PublicationDecision::UpdateExisting { post_id }) => {
                parts.push(format!("updated post {}", post_id))
            }
            Some(PublicationDecision::CreateNew { post_id, .. }) => {
                parts.push(format!("created post {}", post_id))
            }
            None => {}
        }
        if let Some(CheckOutcome::Checked { status, score, .. }) = &self.feedback {
            parts.push(format!("feedback {:?} (score {})", status, score).to_lowercase());
        }

        let verdict = match self.status {
            Status::Success => "Run succeeded",
            Status::Partial => "Run partially succeeded",
            Status::Failed => "Run failed",
        };
        let mut summary = if parts.is_empty() {
            format!("{}: nothing to do", verdict)
        } else {
            format!("{}: {}", verdict, parts.join("; "))
        };
        if self.dry_run {
            summary.push_str(" (dry run)");
        }
        summary
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Write to `summary.json` in `state_dir`.
    pub fn write_to_dir(&self, state_dir: &Path) -> Result<(), StateError> {
        write_json_atomic(&state_dir.join(SUMMARY_FILE), self)
    }
}
