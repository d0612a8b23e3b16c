//! Configuration
//!
//! Three layers, later layers win:
//! 1. Built-in defaults
//! 2. Operator config file (`bitbot.toml`)
//! 3. `--set key.path=value` flags
//!
//! Credentials never come from here; clients read them from the environment.

mod defaults;
mod effective;
mod merge;
mod settings;

pub use defaults::{BuiltinDefaults, OUTDATED_SIGNATURE};
pub use effective::{ConfigError, ConfigOrigin, ConfigSource, EffectiveConfig};
pub use merge::{deep_merge, merge_layers, parse_override};
pub use settings::{
    AppEntry, BotConfig, ChangelogTemplates, ConfigProvider, FeedbackSettings, GithubSettings,
    OutdatedMode, PostMode, PostTemplates, RedditSettings, ReleaseFormat, RetrySettings,
    SafetySettings, TableTemplates, TimingSettings, TitleTemplates,
};
