//! Publication state machine
//!
//! Decides whether a run edits the active forum post, submits a new one, or
//! does nothing, then carries the decision out. Forum state is only changed
//! and persisted after the forum has confirmed the write, so a run that
//! fails part way repeats the same decision next time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use super::changeset::ChangeSet;
use super::render::{apply_banner, render_body, render_title};
use super::validate::validate_post;
use crate::clients::{ClientError, ForumClient};
use crate::config::{BotConfig, ConfigProvider, PostMode};
use crate::error::BotResult;
use crate::retry::RetryPolicy;
use crate::state::{CatalogEntry, ForumPostState};

/// What a publication run did
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PublicationDecision {
    /// Nothing changed since the last announcement
    NoAction,
    /// The active post was edited in place
    UpdateExisting { post_id: String },
    /// A new post was submitted and older ones marked outdated
    CreateNew {
        post_id: String,
        url: String,
        outdated_marked: usize,
        outdated_failed: usize,
    },
}

pub struct PublicationStateMachine<'a> {
    config: &'a BotConfig,
    forum: &'a dyn ForumClient,
    retry: RetryPolicy,
}

impl<'a> PublicationStateMachine<'a> {
    pub fn new(config: &'a BotConfig, forum: &'a dyn ForumClient, retry: RetryPolicy) -> Self {
        Self {
            config,
            forum,
            retry,
        }
    }

    /// Announce the difference between `state.online` and `catalog`.
    pub fn publish(
        &self,
        catalog: &BTreeMap<String, CatalogEntry>,
        state: &mut ForumPostState,
        now: DateTime<Utc>,
    ) -> BotResult<PublicationDecision> {
        let changes = ChangeSet::between(&state.online, catalog, self.config);
        if changes.is_empty() {
            info!("forum is up to date");
            return Ok(PublicationDecision::NoAction);
        }

        let title = render_title(&self.config.titles, &changes, now.date_naive());
        let body = render_body(self.config, &changes, catalog, now);
        let report = validate_post(&title, &body, &self.config.safety)?.into_result()?;
        for warning in report.warnings() {
            warn!(%warning, "post validation warning");
        }

        if let Some(post_id) = self.reusable_post(state)? {
            self.call("edit_post", || self.forum.edit_post(&post_id, &body))?;
            info!(post_id = %post_id, changes = changes.touched(), "updated active post");

            changes.apply_to(&mut state.online);
            state.record_post(&post_id);
            state.persist()?;
            return Ok(PublicationDecision::UpdateExisting { post_id });
        }

        // A submit that times out may still have gone through, so it is
        // attempted once.
        let post = RetryPolicy::immediate(1).run("submit_post", || {
            self.forum
                .submit_post(&self.config.reddit.subreddit, &title, &body)
        })?;
        info!(post_id = %post.id, url = %post.url, %title, "submitted new post");

        changes.apply_to(&mut state.online);
        state.active_post_id = Some(post.id.clone());
        state.record_post(&post.id);
        state.last_check_timestamp = None;
        state.current_interval_seconds = 0;
        state.last_comment_count = 0;
        state.persist()?;

        let (outdated_marked, outdated_failed) = self.mark_outdated(state, &post.id, &post.url);

        Ok(PublicationDecision::CreateNew {
            post_id: post.id,
            url: post.url,
            outdated_marked,
            outdated_failed,
        })
    }

    /// The active post, if rolling updates are on and it is still live.
    ///
    /// A post whose state cannot be determined is an error rather than a
    /// reason to submit another one.
    fn reusable_post(&self, state: &ForumPostState) -> BotResult<Option<String>> {
        if self.config.post_mode() != PostMode::RollingUpdate {
            return Ok(None);
        }
        let Some(post_id) = state.active_post_id.as_deref() else {
            return Ok(None);
        };

        let snapshot = self.call("get_post", || self.forum.get_post(post_id))?;
        if snapshot.is_live() {
            Ok(Some(post_id.to_string()))
        } else {
            warn!(
                post_id,
                exists = snapshot.exists,
                removed = snapshot.removed,
                "active post is gone, submitting a new one"
            );
            Ok(None)
        }
    }

    /// Banner every earlier post. Failures are logged and counted; the new
    /// post is already live and state already saved.
    fn mark_outdated(&self, state: &ForumPostState, new_id: &str, new_url: &str) -> (usize, usize) {
        let mut marked = 0;
        let mut failed = 0;

        for post_id in state.post_history.iter().filter(|id| *id != new_id) {
            match self.mark_one_outdated(post_id, new_url) {
                Ok(true) => marked += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(post_id = %post_id, error = %e, "failed to mark post outdated");
                    failed += 1;
                }
            }
        }

        if marked > 0 || failed > 0 {
            info!(marked, failed, "outdated pass finished");
        }
        (marked, failed)
    }

    fn mark_one_outdated(&self, post_id: &str, new_url: &str) -> BotResult<bool> {
        let snapshot = self.call("get_post", || self.forum.get_post(post_id))?;
        if !snapshot.is_live() {
            debug!(post_id, "skipping outdated marking for missing or removed post");
            return Ok(false);
        }

        match apply_banner(&snapshot.body, self.config, new_url)? {
            Some(body) => {
                self.call("edit_post", || self.forum.edit_post(post_id, &body))?;
                debug!(post_id, "marked post outdated");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn call<T>(
        &self,
        label: &str,
        op: impl FnMut() -> Result<T, ClientError>,
    ) -> Result<T, ClientError> {
        self.retry.run(label, op)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{OutdatedMode, OUTDATED_SIGNATURE};
    use crate::mock::{FailureConfig, MockForum, Op};

    fn config() -> BotConfig {
        let mut config = BotConfig::default();
        config.github.bot_repo = "me/bot".to_string();
        config.reddit.subreddit = "bitlifemods".to_string();
        config
    }

    fn catalog(version: &str) -> BTreeMap<String, CatalogEntry> {
        BTreeMap::from([(
            "bitlife".to_string(),
            CatalogEntry {
                display_name: "BitLife".to_string(),
                version: version.to_string(),
                tag: format!("bitlife-v{}", version),
                sha256: "00".repeat(32),
                url: format!("https://github.com/me/bot/releases/tag/bitlife-v{}", version),
                asset_name: "MonetizationVars".to_string(),
            },
        )])
    }

    #[test]
    fn test_first_publication_creates_post() {
        let config = config();
        let forum = MockForum::new();
        let machine = PublicationStateMachine::new(&config, &forum, RetryPolicy::immediate(3));
        let mut state = ForumPostState::default();

        let decision = machine.publish(&catalog("3.21"), &mut state, Utc::now()).unwrap();

        let post_id = match decision {
            PublicationDecision::CreateNew { post_id, .. } => post_id,
            other => panic!("expected a new post, got {:?}", other),
        };
        assert_eq!(state.active_post_id.as_deref(), Some(post_id.as_str()));
        assert_eq!(state.online["bitlife"], "3.21");
        assert_eq!(forum.post(&post_id).unwrap().title, "[BitBot] New: BitLife v3.21");
    }

    #[test]
    fn test_new_post_mode_always_submits() {
        let mut config = config();
        config.reddit.post_mode = PostMode::NewPost;
        let forum = MockForum::new();
        forum.seed_post("old", "# Old post body");
        let machine = PublicationStateMachine::new(&config, &forum, RetryPolicy::immediate(3));

        let mut state = ForumPostState::default();
        state.active_post_id = Some("old".to_string());
        state.record_post("old");
        state.online.insert("bitlife".to_string(), "3.20".to_string());

        let decision = machine.publish(&catalog("3.21"), &mut state, Utc::now()).unwrap();

        assert!(matches!(
            decision,
            PublicationDecision::CreateNew { outdated_marked: 1, .. }
        ));
        assert_eq!(forum.calls(Op::SubmitPost), 1);
        assert!(forum.post("old").unwrap().body.starts_with(OUTDATED_SIGNATURE));
    }

    #[test]
    fn test_submit_failure_leaves_state_untouched() {
        let config = config();
        let forum = MockForum::new();
        forum.inject_failure(Op::SubmitPost, FailureConfig::transient("503"));
        let machine = PublicationStateMachine::new(&config, &forum, RetryPolicy::immediate(3));

        let mut state = ForumPostState::default();
        let before = state.clone();
        let err = machine
            .publish(&catalog("3.21"), &mut state, Utc::now())
            .unwrap_err();

        assert!(err.is_retryable());
        assert_eq!(state, before);
        // Never retried, so never duplicated.
        assert_eq!(forum.calls(Op::SubmitPost), 1);
    }

    #[test]
    fn test_unknown_post_state_is_an_error() {
        let config = config();
        let forum = MockForum::new();
        forum.seed_post("p0", "body");
        forum.inject_failure(Op::GetPost, FailureConfig::transient("timeout"));
        let machine = PublicationStateMachine::new(&config, &forum, RetryPolicy::immediate(2));

        let mut state = ForumPostState::default();
        state.active_post_id = Some("p0".to_string());

        assert!(machine
            .publish(&catalog("3.21"), &mut state, Utc::now())
            .is_err());
        assert_eq!(forum.calls(Op::GetPost), 2);
        assert_eq!(forum.calls(Op::SubmitPost), 0);
    }

    #[test]
    fn test_outdated_failures_are_not_fatal() {
        let mut config = config();
        config.reddit.outdated_mode = OutdatedMode::Overwrite;
        let forum = MockForum::new();
        forum.seed_post("a", "# Post A");
        forum.remove_post("a");
        let machine = PublicationStateMachine::new(&config, &forum, RetryPolicy::immediate(1));

        let mut state = ForumPostState::default();
        state.active_post_id = Some("a".to_string());
        state.record_post("a");
        state.record_post("b");

        let decision = machine.publish(&catalog("3.21"), &mut state, Utc::now()).unwrap();

        // "a" is removed and skipped; "b" no longer exists and is skipped too.
        assert!(matches!(
            decision,
            PublicationDecision::CreateNew {
                outdated_marked: 0,
                outdated_failed: 0,
                ..
            }
        ));
        assert_eq!(forum.post("a").unwrap().body, "# Post A");
    }

    #[test]
    fn test_validation_failure_blocks_write() {
        let mut config = config();
        config.templates.post = "{{changelog}} {{not_a_placeholder}}".to_string();
        let forum = MockForum::new();
        let machine = PublicationStateMachine::new(&config, &forum, RetryPolicy::immediate(1));

        let mut state = ForumPostState::default();
        let err = machine
            .publish(&catalog("3.21"), &mut state, Utc::now())
            .unwrap_err();

        assert_eq!(err.exit_code(), 7);
        assert_eq!(forum.calls(Op::SubmitPost), 0);
        assert!(state.online.is_empty());
    }
}
