//! Comment feedback on the active post.
//!
//! Readers report whether the patched files work. Each comment scores -1 if
//! it mentions a broken keyword, otherwise +1 if it mentions a working one.
//! The net score moves the post's status line once it reaches the
//! threshold. Checks back off while the thread is quiet.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::clients::{Comment, ForumClient};
use crate::config::{BotConfig, FeedbackSettings, TimingSettings};
use crate::error::BotResult;
use crate::retry::RetryPolicy;
use crate::state::ForumPostState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackStatus {
    Working,
    Broken,
    Unknown,
}

/// Result of one `check`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CheckOutcome {
    NoActivePost,
    NotDue { next_check: DateTime<Utc> },
    Checked {
        comments: u64,
        score: i64,
        status: FeedbackStatus,
        body_updated: bool,
        next_interval_seconds: u64,
    },
}

fn mentions(body: &str, keywords: &[String]) -> bool {
    keywords
        .iter()
        .any(|k| !k.is_empty() && body.contains(&k.to_lowercase()))
}

/// Net score and the status it implies
pub fn score_comments(comments: &[Comment], feedback: &FeedbackSettings) -> (i64, FeedbackStatus) {
    let score = comments
        .iter()
        .map(|c| {
            let body = c.body.to_lowercase();
            if mentions(&body, &feedback.broken_keywords) {
                -1
            } else if mentions(&body, &feedback.working_keywords) {
                1
            } else {
                0
            }
        })
        .sum::<i64>();

    let threshold = i64::from(feedback.threshold);
    let status = if score >= threshold {
        FeedbackStatus::Working
    } else if score <= -threshold {
        FeedbackStatus::Broken
    } else {
        FeedbackStatus::Unknown
    };
    (score, status)
}

/// Replace the first line starting with `prefix` by `prefix label`.
///
/// `None` if the body has no status line or it already reads that way.
pub fn set_status_line(body: &str, prefix: &str, label: &str) -> Option<String> {
    let wanted = format!("{} {}", prefix, label);
    let mut replaced = false;
    let lines: Vec<&str> = body
        .split('\n')
        .map(|line| {
            if !replaced && line.trim_start().starts_with(prefix) {
                replaced = true;
                wanted.as_str()
            } else {
                line
            }
        })
        .collect();

    let updated = lines.join("\n");
    (replaced && updated != body).then_some(updated)
}

/// Seconds until the next check after seeing `comment_count` comments.
pub fn next_interval(state: &ForumPostState, comment_count: u64, timing: &TimingSettings) -> u64 {
    if comment_count > state.last_comment_count || state.current_interval_seconds == 0 {
        timing.first_check
    } else {
        state
            .current_interval_seconds
            .saturating_add(timing.increase_by)
            .min(timing.max_wait)
    }
}

pub struct CommentChecker<'a> {
    config: &'a BotConfig,
    forum: &'a dyn ForumClient,
    retry: RetryPolicy,
}

impl<'a> CommentChecker<'a> {
    pub fn new(config: &'a BotConfig, forum: &'a dyn ForumClient, retry: RetryPolicy) -> Self {
        Self {
            config,
            forum,
            retry,
        }
    }

    pub fn check(&self, state: &mut ForumPostState, now: DateTime<Utc>) -> BotResult<CheckOutcome> {
        let Some(post_id) = state.active_post_id.clone() else {
            return Ok(CheckOutcome::NoActivePost);
        };

        if let Some(last) = state.last_check_timestamp {
            // A stored interval beyond today's limit waits only up to that limit.
            let wait = state.current_interval_seconds.min(self.config.timing.max_wait);
            let next_check = i64::try_from(wait)
                .ok()
                .and_then(Duration::try_seconds)
                .and_then(|wait| last.checked_add_signed(wait))
                .unwrap_or(DateTime::<Utc>::MAX_UTC);
            if now < next_check {
                debug!(post_id = %post_id, %next_check, "comment check not due");
                return Ok(CheckOutcome::NotDue { next_check });
            }
        }

        let comments = self
            .retry
            .run("get_comments", || self.forum.get_comments(&post_id))?;
        let (score, status) = score_comments(&comments, &self.config.feedback);

        let feedback = &self.config.feedback;
        let label = match status {
            FeedbackStatus::Working => &feedback.working_label,
            FeedbackStatus::Broken => &feedback.broken_label,
            FeedbackStatus::Unknown => &feedback.unknown_label,
        };

        let snapshot = self
            .retry
            .run("get_post", || self.forum.get_post(&post_id))?;
        let mut body_updated = false;
        if snapshot.is_live() {
            if let Some(body) = set_status_line(&snapshot.body, &feedback.status_prefix, label) {
                self.retry
                    .run("edit_post", || self.forum.edit_post(&post_id, &body))?;
                body_updated = true;
                info!(post_id = %post_id, ?status, score, "updated post status");
            }
        }

        let count = comments.len() as u64;
        let interval = next_interval(state, count, &self.config.timing);
        state.last_comment_count = count;
        state.current_interval_seconds = interval;
        state.last_check_timestamp = Some(now);
        state.persist()?;

        Ok(CheckOutcome::Checked {
            comments: count,
            score,
            status,
            body_updated,
            next_interval_seconds: interval,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockForum;

    fn comment(body: &str) -> Comment {
        Comment {
            id: String::new(),
            author: "reader".to_string(),
            body: body.to_string(),
        }
    }

    #[test]
    fn test_scoring() {
        let feedback = FeedbackSettings::default();

        let (score, status) = score_comments(
            &[comment("Works great"), comment("working for me, thanks")],
            &feedback,
        );
        assert_eq!(score, 2);
        assert_eq!(status, FeedbackStatus::Working);

        // "not working" contains "working" but counts as broken.
        let (score, status) = score_comments(
            &[comment("not working"), comment("game crashes"), comment("hello")],
            &feedback,
        );
        assert_eq!(score, -2);
        assert_eq!(status, FeedbackStatus::Broken);

        let (_, status) = score_comments(&[comment("works")], &feedback);
        assert_eq!(status, FeedbackStatus::Unknown);
    }

    #[test]
    fn test_status_line_only_updated_when_different() {
        let body = "# Title\n\n**Status:** Unknown\n\nfooter";
        let updated = set_status_line(body, "**Status:**", "Working ✅").unwrap();
        assert_eq!(updated, "# Title\n\n**Status:** Working ✅\n\nfooter");

        assert!(set_status_line(&updated, "**Status:**", "Working ✅").is_none());
        assert!(set_status_line("no status here", "**Status:**", "Working ✅").is_none());
    }

    #[test]
    fn test_interval_schedule() {
        let timing = TimingSettings {
            first_check: 900,
            max_wait: 2_000,
            increase_by: 900,
        };
        let mut state = ForumPostState::default();

        assert_eq!(next_interval(&state, 0, &timing), 900);

        state.current_interval_seconds = 900;
        assert_eq!(next_interval(&state, 0, &timing), 1_800);

        state.current_interval_seconds = 1_800;
        assert_eq!(next_interval(&state, 0, &timing), 2_000);

        // New comments reset the schedule.
        state.last_comment_count = 3;
        assert_eq!(next_interval(&state, 4, &timing), 900);
    }

    #[test]
    fn test_check_updates_status_and_schedule() {
        let config = BotConfig::default();
        let forum = MockForum::new();
        forum.seed_post("p1", "intro\n**Status:** Unknown\nend");
        forum.add_comment("p1", "a", "works!");
        forum.add_comment("p1", "b", "Worked on iOS, thank you");

        let mut state = ForumPostState::default();
        state.active_post_id = Some("p1".to_string());

        let checker = CommentChecker::new(&config, &forum, RetryPolicy::immediate(1));
        let now = Utc::now();
        let outcome = checker.check(&mut state, now).unwrap();

        assert_eq!(
            outcome,
            CheckOutcome::Checked {
                comments: 2,
                score: 2,
                status: FeedbackStatus::Working,
                body_updated: true,
                next_interval_seconds: 900,
            }
        );
        assert!(forum.post("p1").unwrap().body.contains("**Status:** Working ✅"));
        assert_eq!(state.last_check_timestamp, Some(now));

        // Immediately again: not due.
        let outcome = checker.check(&mut state, now + Duration::seconds(60)).unwrap();
        assert!(matches!(outcome, CheckOutcome::NotDue { .. }));
    }

    #[test]
    fn test_oversized_stored_interval_does_not_overflow() {
        let config = BotConfig::default();
        let forum = MockForum::new();
        forum.seed_post("p1", "**Status:** Unknown");
        let checker = CommentChecker::new(&config, &forum, RetryPolicy::immediate(1));

        let last = Utc::now();
        let mut state = ForumPostState::default();
        state.active_post_id = Some("p1".to_string());
        state.last_check_timestamp = Some(last);
        state.current_interval_seconds = u64::MAX;

        let outcome = checker.check(&mut state, last + Duration::seconds(60)).unwrap();
        let max_wait = i64::try_from(config.timing.max_wait).unwrap();
        assert_eq!(
            outcome,
            CheckOutcome::NotDue {
                next_check: last + Duration::seconds(max_wait)
            }
        );

        // A timestamp at the end of time is never due.
        state.last_check_timestamp = Some(DateTime::<Utc>::MAX_UTC);
        let outcome = checker.check(&mut state, last).unwrap();
        assert!(matches!(outcome, CheckOutcome::NotDue { .. }));
    }

    #[test]
    fn test_no_active_post() {
        let config = BotConfig::default();
        let forum = MockForum::new();
        let checker = CommentChecker::new(&config, &forum, RetryPolicy::immediate(1));
        let mut state = ForumPostState::default();
        assert_eq!(
            checker.check(&mut state, Utc::now()).unwrap(),
            CheckOutcome::NoActivePost
        );
    }
}
