//! Typed view of the merged configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

use super::defaults::OUTDATED_SIGNATURE;
use super::ConfigError;
use crate::release::is_plain_file_name;

/// Upper bound for every `timing.*` value: 30 days.
pub const MAX_CHECK_WAIT_SECONDS: u64 = 30 * 24 * 60 * 60;

/// How new changes reach the forum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostMode {
    /// Edit one long-lived post in place
    RollingUpdate,
    /// Submit a new post per batch of changes
    NewPost,
}

/// How superseded posts are marked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutdatedMode {
    /// Put a banner above the existing body
    Inject,
    /// Replace the whole body
    Overwrite,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GithubSettings {
    /// Upstream repository (`owner/name`) publishing raw assets
    pub source_repo: String,
    /// Downstream repository receiving patched assets
    pub bot_repo: String,
    pub asset_file_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CipherSettings {
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedditSettings {
    pub subreddit: String,
    pub bot_name: String,
    pub creator: String,
    pub user_agent: String,
    pub post_mode: PostMode,
    pub outdated_mode: OutdatedMode,
    /// Download portal; the downstream releases page when empty
    pub pages_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TitleTemplates {
    pub added_only: String,
    pub updated_only_single: String,
    pub updated_only_multi: String,
    pub mixed_single_update: String,
    pub mixed_multi_update: String,
    pub generic: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChangelogTemplates {
    pub added: String,
    pub updated: String,
    pub removed: String,
    pub no_changes: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableTemplates {
    pub header: String,
    pub divider: String,
    pub line: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostTemplates {
    pub post: String,
    pub outdated_banner: String,
    pub outdated_overwrite: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReleaseFormat {
    pub tag_format: String,
    pub title_format: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppEntry {
    pub id: String,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutSettings {
    /// Upper bound for one outbound call
    pub call_seconds: u64,
}

impl TimeoutSettings {
    pub fn call(&self) -> Duration {
        Duration::from_secs(self.call_seconds)
    }
}

/// Comment check schedule, in seconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingSettings {
    pub first_check: u64,
    pub max_wait: u64,
    pub increase_by: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedbackSettings {
    pub working_keywords: Vec<String>,
    pub broken_keywords: Vec<String>,
    /// Net score needed to call a post working or broken
    pub threshold: u32,
    pub working_label: String,
    pub broken_label: String,
    pub unknown_label: String,
    /// Body line starting with this prefix carries the status
    pub status_prefix: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetySettings {
    pub title_min_length: usize,
    pub title_max_length: usize,
    pub body_min_length: usize,
    pub body_max_length: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    pub state_dir: PathBuf,
}

/// Complete bot configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    pub github: GithubSettings,
    pub cipher: CipherSettings,
    pub reddit: RedditSettings,
    pub titles: TitleTemplates,
    pub changelog: ChangelogTemplates,
    pub table: TableTemplates,
    pub templates: PostTemplates,
    pub release: ReleaseFormat,
    pub apps: Vec<AppEntry>,
    pub retry: RetrySettings,
    pub timeouts: TimeoutSettings,
    pub timing: TimingSettings,
    pub feedback: FeedbackSettings,
    pub safety: SafetySettings,
    pub paths: PathSettings,
}

impl BotConfig {
    /// Check value bounds that hold for every command.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cipher.key.trim().is_empty() {
            return Err(invalid("cipher.key must not be empty"));
        }

        if self.retry.max_attempts == 0 || self.retry.max_attempts > 10 {
            return Err(invalid("retry.max_attempts must be in [1, 10]"));
        }
        if self.retry.initial_delay_ms > self.retry.max_delay_ms {
            return Err(invalid(
                "retry.initial_delay_ms must not exceed retry.max_delay_ms",
            ));
        }

        if self.timeouts.call_seconds == 0 || self.timeouts.call_seconds > 600 {
            return Err(invalid("timeouts.call_seconds must be in (0, 600]"));
        }

        if self.timing.max_wait > MAX_CHECK_WAIT_SECONDS
            || self.timing.increase_by > MAX_CHECK_WAIT_SECONDS
        {
            return Err(ConfigError::ValidationError(format!(
                "timing values must not exceed {} seconds",
                MAX_CHECK_WAIT_SECONDS
            )));
        }
        if self.timing.first_check > self.timing.max_wait {
            return Err(invalid("timing.first_check must not exceed timing.max_wait"));
        }

        if self.safety.title_min_length > self.safety.title_max_length
            || self.safety.body_min_length > self.safety.body_max_length
        {
            return Err(invalid("safety minimum lengths must not exceed maximums"));
        }

        let mut seen = BTreeSet::new();
        for app in &self.apps {
            if app.id.is_empty() || app.id != app.id.to_lowercase() {
                return Err(ConfigError::ValidationError(format!(
                    "app id {:?} must be non-empty and lowercase",
                    app.id
                )));
            }
            if !seen.insert(app.id.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "app id {:?} is listed twice",
                    app.id
                )));
            }
        }

        if !is_plain_file_name(&self.github.asset_file_name) {
            return Err(invalid("github.asset_file_name must be a plain file name"));
        }

        // The banner block runs from the signature to the first `---` line,
        // so a banner must open with the signature and carry no such line.
        let banner = &self.templates.outdated_banner;
        if !banner.starts_with(OUTDATED_SIGNATURE) {
            return Err(ConfigError::ValidationError(format!(
                "templates.outdated_banner must start with {:?}",
                OUTDATED_SIGNATURE
            )));
        }
        if banner.lines().any(|line| line.trim_end() == "---") {
            return Err(invalid(
                "templates.outdated_banner must not contain a `---` line",
            ));
        }

        if !self.release.tag_format.contains("{{version}}") {
            return Err(invalid("release.tag_format must contain {{version}}"));
        }

        Ok(())
    }

    /// Check the settings needed to reach GitHub and the forum.
    pub fn require_remote(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("github.source_repo", &self.github.source_repo),
            ("github.bot_repo", &self.github.bot_repo),
            ("reddit.subreddit", &self.reddit.subreddit),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "{} must be set",
                    name
                )));
            }
        }
        Ok(())
    }

    /// Download portal URL shown in posts
    pub fn pages_url(&self) -> String {
        if self.reddit.pages_url.is_empty() {
            format!("https://github.com/{}/releases", self.github.bot_repo)
        } else {
            self.reddit.pages_url.clone()
        }
    }
}

fn invalid(message: &str) -> ConfigError {
    ConfigError::ValidationError(message.to_string())
}

/// Settings the core components read.
pub trait ConfigProvider {
    /// Source string the cipher key is derived from
    fn cipher_key(&self) -> &str;

    fn post_mode(&self) -> PostMode;

    fn titles(&self) -> &TitleTemplates;

    fn changelog_templates(&self) -> &ChangelogTemplates;

    /// Display name for an app id, falling back to the id itself.
    fn display_name(&self, app_id: &str) -> String;
}

impl ConfigProvider for BotConfig {
    fn cipher_key(&self) -> &str {
        &self.cipher.key
    }

    fn post_mode(&self) -> PostMode {
        self.reddit.post_mode
    }

    fn titles(&self) -> &TitleTemplates {
        &self.titles
    }

    fn changelog_templates(&self) -> &ChangelogTemplates {
        &self.changelog
    }

    fn display_name(&self, app_id: &str) -> String {
        self.apps
            .iter()
            .find(|a| a.id == app_id)
            .map(|a| a.display_name.clone())
            .unwrap_or_else(|| app_id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_apps(apps: &[(&str, &str)]) -> BotConfig {
        BotConfig {
            apps: apps
                .iter()
                .map(|(id, name)| AppEntry {
                    id: id.to_string(),
                    display_name: name.to_string(),
                })
                .collect(),
            ..BotConfig::default()
        }
    }

    #[test]
    fn test_defaults_validate() {
        BotConfig::default().validate().unwrap();
    }

    #[test]
    fn test_defaults_are_not_remote_ready() {
        let err = BotConfig::default().require_remote().unwrap_err();
        assert!(err.to_string().contains("github.source_repo"));
    }

    #[test]
    fn test_display_name_lookup_and_fallback() {
        let config = with_apps(&[("bitlife", "BitLife")]);
        assert_eq!(config.display_name("bitlife"), "BitLife");
        assert_eq!(config.display_name("unknown"), "unknown");
    }

    #[test]
    fn test_duplicate_app_ids_rejected() {
        let config = with_apps(&[("a", "A"), ("a", "Also A")]);
        assert!(config.validate().unwrap_err().to_string().contains("twice"));
    }

    #[test]
    fn test_uppercase_app_id_rejected() {
        let config = with_apps(&[("BitLife", "BitLife")]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_retry_bounds() {
        let mut config = BotConfig::default();
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());

        config.retry.max_attempts = 3;
        config.retry.initial_delay_ms = 20_000;
        config.retry.max_delay_ms = 10_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_timing_upper_bound() {
        let mut config = BotConfig::default();
        config.timing.first_check = u64::MAX / 2;
        config.timing.max_wait = u64::MAX / 2;
        assert!(config.validate().is_err());

        config.timing.first_check = 600;
        config.timing.max_wait = MAX_CHECK_WAIT_SECONDS;
        config.validate().unwrap();
    }

    #[test]
    fn test_outdated_banner_shape() {
        let mut config = BotConfig::default();
        config.templates.outdated_banner =
            format!("{}\n\n---\nSee {{{{latest_post_url}}}}", OUTDATED_SIGNATURE);
        assert!(config.validate().is_err());

        config.templates.outdated_banner = "Outdated, see {{latest_post_url}}".to_string();
        assert!(config.validate().is_err());

        config.templates.outdated_banner =
            format!("{}\n\nSee {{{{latest_post_url}}}}", OUTDATED_SIGNATURE);
        config.validate().unwrap();
    }

    #[test]
    fn test_asset_file_name_must_be_plain() {
        let mut config = BotConfig::default();
        config.github.asset_file_name = "../MonetizationVars".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_pages_url_fallback() {
        let mut config = BotConfig::default();
        config.github.bot_repo = "me/bot".to_string();
        assert_eq!(config.pages_url(), "https://github.com/me/bot/releases");

        config.reddit.pages_url = "https://me.example/bot".to_string();
        assert_eq!(config.pages_url(), "https://me.example/bot");
    }

    #[test]
    fn test_post_mode_serde_names() {
        let mode: PostMode = serde_json::from_str("\"rolling_update\"").unwrap();
        assert_eq!(mode, PostMode::RollingUpdate);
        let mode: OutdatedMode = serde_json::from_str("\"overwrite\"").unwrap();
        assert_eq!(mode, OutdatedMode::Overwrite);
    }
}
