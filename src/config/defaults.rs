//! Built-in defaults (lowest precedence layer)

use serde_json::Value;
use std::path::PathBuf;

use super::settings::{
    BotConfig, ChangelogTemplates, CipherSettings, FeedbackSettings, GithubSettings,
    OutdatedMode, PathSettings, PostMode, PostTemplates, RedditSettings, ReleaseFormat,
    RetrySettings, SafetySettings, TableTemplates, TimeoutSettings, TimingSettings,
    TitleTemplates,
};
use super::ConfigError;

/// First line of every outdated banner; used to find an existing one.
pub const OUTDATED_SIGNATURE: &str = "## ⚠️ Outdated Post";

const POST_TEMPLATE: &str = "\
# {{bot_name}}: unlocked {{asset_name}} files

{{changelog}}

## Available apps ({{app_count}})

{{available_list}}

**Status:** Unknown

Downloads: {{pages_url}}

*Maintained by u/{{creator}} | source: https://github.com/{{bot_repo}} | updated {{update_timestamp}}*";

const OUTDATED_BANNER: &str = "\
## ⚠️ Outdated Post

This post is no longer updated. Current versions are in [the latest post]({{latest_post_url}}).";

const OUTDATED_OVERWRITE: &str = "\
## ⚠️ Outdated Post

This post has been replaced. See [the latest post]({{latest_post_url}}) for current downloads.";

/// Built-in defaults as a JSON layer
pub struct BuiltinDefaults;

impl BuiltinDefaults {
    /// Convert to JSON Value for merging
    pub fn to_value() -> Result<Value, ConfigError> {
        serde_json::to_value(BotConfig::default())
            .map_err(|e| ConfigError::ParseError(format!("defaults: {}", e)))
    }
}

impl Default for GithubSettings {
    fn default() -> Self {
        Self {
            source_repo: String::new(),
            bot_repo: String::new(),
            asset_file_name: "MonetizationVars".to_string(),
        }
    }
}

impl Default for CipherSettings {
    fn default() -> Self {
        Self {
            key: bitbot_cipher::DEFAULT_CIPHER_KEY.to_string(),
        }
    }
}

impl Default for RedditSettings {
    fn default() -> Self {
        Self {
            subreddit: String::new(),
            bot_name: "BitBot".to_string(),
            creator: String::new(),
            user_agent: format!("bitbot/{}", env!("CARGO_PKG_VERSION")),
            post_mode: PostMode::RollingUpdate,
            outdated_mode: OutdatedMode::Inject,
            pages_url: String::new(),
        }
    }
}

impl Default for TitleTemplates {
    fn default() -> Self {
        Self {
            added_only: "[BitBot] New: {{added_list}}".to_string(),
            updated_only_single: "[BitBot] Updated: {{updated_list}}".to_string(),
            updated_only_multi: "[BitBot] Updates: {{updated_list}}".to_string(),
            mixed_single_update: "[BitBot] New: {{added_list}} | Updated: {{updated_list}}"
                .to_string(),
            mixed_multi_update: "[BitBot] New: {{added_list}} | Updates: {{updated_list}}"
                .to_string(),
            generic: "[BitBot] MonetizationVars updates for {{date}}".to_string(),
        }
    }
}

impl Default for ChangelogTemplates {
    fn default() -> Self {
        Self {
            added: "- Added **{{display_name}}** v{{version}}: [{{asset_name}}]({{download_url}})"
                .to_string(),
            updated: "- Updated **{{display_name}}** v{{old_version}} → v{{new_version}}: [{{asset_name}}]({{download_url}})"
                .to_string(),
            removed: "- Removed **{{display_name}}** (was v{{old_version}})".to_string(),
            no_changes: "No new updates in this version.".to_string(),
        }
    }
}

impl Default for TableTemplates {
    fn default() -> Self {
        Self {
            header: "| App | Asset | Version |".to_string(),
            divider: "|---|---|---:|".to_string(),
            line: "| {{display_name}} | {{asset_name}} | v{{version}} |".to_string(),
        }
    }
}

impl Default for PostTemplates {
    fn default() -> Self {
        Self {
            post: POST_TEMPLATE.to_string(),
            outdated_banner: OUTDATED_BANNER.to_string(),
            outdated_overwrite: OUTDATED_OVERWRITE.to_string(),
        }
    }
}

impl Default for ReleaseFormat {
    fn default() -> Self {
        Self {
            tag_format: "{{app_id}}-v{{version}}".to_string(),
            title_format: "{{display_name}} v{{version}}".to_string(),
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1_000,
            max_delay_ms: 10_000,
        }
    }
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self { call_seconds: 60 }
    }
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            first_check: 900,
            max_wait: 21_600,
            increase_by: 900,
        }
    }
}

impl Default for FeedbackSettings {
    fn default() -> Self {
        let words =
            |list: &[&str]| -> Vec<String> { list.iter().map(|s| s.to_string()).collect() };
        Self {
            working_keywords: words(&["works", "working", "worked", "thank"]),
            broken_keywords: words(&["broken", "not working", "doesn't work", "crash", "banned"]),
            threshold: 2,
            working_label: "Working ✅".to_string(),
            broken_label: "Broken ❌".to_string(),
            unknown_label: "Unknown".to_string(),
            status_prefix: "**Status:**".to_string(),
        }
    }
}

impl Default for SafetySettings {
    fn default() -> Self {
        Self {
            title_min_length: 10,
            title_max_length: 300,
            body_min_length: 50,
            body_max_length: 40_000,
        }
    }
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from("state"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BotConfig::default();
        assert_eq!(config.cipher.key, "com.wtfapps.apollo16");
        assert_eq!(config.github.asset_file_name, "MonetizationVars");
        assert_eq!(config.reddit.post_mode, PostMode::RollingUpdate);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.table.divider, "|---|---|---:|");
    }

    #[test]
    fn test_to_value() {
        let value = BuiltinDefaults::to_value().unwrap();
        assert_eq!(value["reddit"]["post_mode"], "rolling_update");
        assert_eq!(value["release"]["tag_format"], "{{app_id}}-v{{version}}");
        assert_eq!(value["timeouts"]["call_seconds"], 60);
    }

    #[test]
    fn test_banners_start_with_signature() {
        let templates = PostTemplates::default();
        assert!(templates.outdated_banner.starts_with(OUTDATED_SIGNATURE));
        assert!(templates.outdated_overwrite.starts_with(OUTDATED_SIGNATURE));
    }
}
