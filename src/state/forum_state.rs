//! Forum post state.
//!
//! Owned by the publication state machine. Only persisted after the forum
//! has confirmed a write.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::{check_schema, read_json, write_json_atomic, StateError};

/// Schema version for forum_state.json
pub const SCHEMA_VERSION: u32 = 1;

/// Schema identifier
pub const SCHEMA_ID: &str = "bitbot/forum_state@1";

/// What the forum currently shows
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForumPostState {
    pub schema_version: u32,
    pub schema_id: String,

    /// Post that rolling updates edit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_post_id: Option<String>,

    /// App id to last announced version
    #[serde(default)]
    pub online: BTreeMap<String, String>,

    /// Every post this bot has created or edited, oldest first
    #[serde(default)]
    pub post_history: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_check_timestamp: Option<DateTime<Utc>>,

    /// Comment check interval; zero until the first check
    #[serde(default)]
    pub current_interval_seconds: u64,

    #[serde(default)]
    pub last_comment_count: u64,

    #[serde(skip)]
    path: Option<PathBuf>,
}

impl Default for ForumPostState {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            schema_id: SCHEMA_ID.to_string(),
            active_post_id: None,
            online: BTreeMap::new(),
            post_history: Vec::new(),
            last_check_timestamp: None,
            current_interval_seconds: 0,
            last_comment_count: 0,
            path: None,
        }
    }
}

impl ForumPostState {
    /// Load from `path`, starting empty if the file does not exist.
    pub fn open(path: &Path) -> Result<Self, StateError> {
        let mut state = match read_json::<Self>(path)? {
            Some(state) => {
                check_schema(path, &state.schema_id, SCHEMA_ID)?;
                state
            }
            None => Self::default(),
        };
        state.path = Some(path.to_path_buf());
        Ok(state)
    }

    /// Stop persisting further changes (used for dry runs).
    pub fn detached(mut self) -> Self {
        self.path = None;
        self
    }

    /// Write to the backing file, if any.
    pub fn persist(&self) -> Result<(), StateError> {
        if let Some(path) = &self.path {
            write_json_atomic(path, self)?;
        }
        Ok(())
    }

    /// Append `post_id` to the history unless it is already there.
    pub fn record_post(&mut self, post_id: &str) {
        if !self.post_history.iter().any(|p| p == post_id) {
            self.post_history.push(post_id.to_string());
        }
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
