//! BitBot - release watcher, asset patcher and forum announcer
//!
//! Watches an upstream repository for new releases of game asset files,
//! unlocks their feature flags, republishes them to a downstream repository
//! and keeps one forum post announcing what is available.

pub mod clients;
pub mod config;
pub mod error;
pub mod mock;
pub mod pipeline;
pub mod publish;
pub mod release;
pub mod retry;
pub mod state;
pub mod summary;
pub mod template;

pub use bitbot_cipher as cipher;

pub use clients::{ArtifactRepositoryClient, ClientError, ForumClient, SourceRepositoryClient};
pub use config::{BotConfig, ConfigProvider, EffectiveConfig};
pub use error::{BotError, BotResult};
pub use pipeline::{DiscoveryReport, PatchOrchestrator, ProcessReport};
pub use publish::{CheckOutcome, CommentChecker, PublicationDecision, PublicationStateMachine};
pub use retry::RetryPolicy;
pub use state::{ForumPostState, ReleaseLedger};
pub use summary::RunSummary;
