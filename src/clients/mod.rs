//! External collaborators
//!
//! The core talks to GitHub and the forum only through these traits:
//! - `SourceRepositoryClient`: upstream releases and their raw assets
//! - `ArtifactRepositoryClient`: downstream releases carrying patched assets
//! - `ForumClient`: the announcement thread
//!
//! Production implementations live in `gh` (GitHub CLI) and `reddit`
//! (Reddit OAuth API); in-memory ones live in `crate::mock`.

pub mod gh;
pub mod reddit;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

pub use gh::GhCli;
pub use reddit::{RedditClient, RedditCredentials};

/// Collaborator errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// Network failure, timeout, rate limit or server error
    #[error("transient failure: {0}")]
    Transient(String),

    #[error("authentication or permission failure: {0}")]
    Auth(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Unexpected response shape or a rejected request
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl ClientError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ClientError::Transient(_))
    }
}

/// An asset attached to an upstream release
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRef {
    pub id: u64,
    pub name: String,
}

/// An upstream release, as listed by the source repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamRelease {
    /// Stable numeric id; the dedup key
    pub id: u64,
    pub tag_name: String,
    /// GitHub sends `null` for releases created without notes
    #[serde(default, deserialize_with = "null_as_empty")]
    pub body: String,
    #[serde(default)]
    pub assets: Vec<AssetRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// A downstream release to create
#[derive(Debug, Clone, Copy)]
pub struct NewRelease<'a> {
    pub tag: &'a str,
    pub title: &'a str,
    pub notes: &'a str,
    /// File name the artifact is attached under
    pub asset_name: &'a str,
    pub artifact: &'a [u8],
}

/// A downstream release that exists
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseRef {
    pub tag: String,
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub notes: String,
}

/// A submitted forum post
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostRef {
    pub id: String,
    pub url: String,
}

/// Current state of a forum post
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostSnapshot {
    pub exists: bool,
    /// Removed by moderators or the platform
    pub removed: bool,
    pub body: String,
}

impl PostSnapshot {
    pub fn missing() -> Self {
        Self {
            exists: false,
            removed: false,
            body: String::new(),
        }
    }

    /// Exists and has not been removed
    pub fn is_live(&self) -> bool {
        self.exists && !self.removed
    }
}

/// A comment on a forum post
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    pub id: String,
    pub author: String,
    pub body: String,
}

/// Upstream repository publishing raw assets
pub trait SourceRepositoryClient {
    /// Recent releases, most recent first
    fn list_releases(&self, repo: &str) -> Result<Vec<UpstreamRelease>, ClientError>;

    fn fetch_asset(
        &self,
        repo: &str,
        release_id: u64,
        asset_name: &str,
    ) -> Result<Vec<u8>, ClientError>;
}

/// Downstream repository receiving patched assets
pub trait ArtifactRepositoryClient {
    fn create_release(&self, repo: &str, release: &NewRelease<'_>)
        -> Result<ReleaseRef, ClientError>;

    /// Retitle an existing release to flag it as superseded.
    fn mark_outdated(&self, repo: &str, tag: &str, new_title: &str) -> Result<(), ClientError>;

    /// Look up a release by tag; `Ok(None)` if there is none.
    fn find_release(&self, repo: &str, tag: &str) -> Result<Option<ReleaseRef>, ClientError>;
}

/// Forum announcing the releases
pub trait ForumClient {
    fn submit_post(&self, subreddit: &str, title: &str, body: &str)
        -> Result<PostRef, ClientError>;

    fn edit_post(&self, post_id: &str, body: &str) -> Result<(), ClientError>;

    /// A post that does not exist is reported through
    /// [`PostSnapshot::exists`], not as an error.
    fn get_post(&self, post_id: &str) -> Result<PostSnapshot, ClientError>;

    fn get_comments(&self, post_id: &str) -> Result<Vec<Comment>, ClientError>;
}

/// Classify an HTTP status code
pub(crate) fn classify_status(status: u16, context: &str) -> ClientError {
    let message = format!("{} (HTTP {})", context, status);
    match status {
        401 | 403 => ClientError::Auth(message),
        404 | 410 => ClientError::NotFound(message),
        408 | 429 | 500..=599 => ClientError::Transient(message),
        _ => ClientError::Protocol(message),
    }
}
