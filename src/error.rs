//! Top-level error taxonomy.
//!
//! Every fallible operation in the crate ends up as a [`BotError`]. The
//! variants separate failures that should be retried on the next run from
//! failures that need an operator.

use std::io;

use bitbot_cipher::CipherError;
use thiserror::Error;

use crate::clients::ClientError;
use crate::config::ConfigError;
use crate::state::{LedgerError, StateError};

/// Errors surfaced to the caller of a run.
#[derive(Debug, Error)]
pub enum BotError {
    /// A release body could not be parsed. Permanent.
    #[error("parse error: {0}")]
    Parse(String),

    /// Network or rate-limit failure after retries were exhausted.
    #[error("transient API error: {0}")]
    TransientApi(String),

    /// A collaborator rejected the request in a way retrying will not fix.
    #[error("API error: {0}")]
    Api(String),

    /// An asset file had no decodable lines.
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    /// Durable state could not be read or written.
    #[error("state error: {0}")]
    State(#[from] StateError),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("permission or auth error: {0}")]
    PermissionOrAuth(String),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("cipher error: {0}")]
    Cipher(CipherError),

    /// A rendered post failed validation and was not sent.
    #[error("validation error: {0}")]
    Validation(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl BotError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            BotError::Config(_) => 2,
            BotError::State(_) | BotError::Ledger(_) | BotError::Io(_) => 3,
            BotError::PermissionOrAuth(_) => 4,
            BotError::TransientApi(_) | BotError::Api(_) => 5,
            BotError::Parse(_) | BotError::DecryptionFailed(_) | BotError::Cipher(_) => 6,
            BotError::Validation(_) => 7,
        }
    }

    /// Whether a later run may succeed without operator action.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BotError::TransientApi(_))
    }

    /// Whether the whole run must stop rather than move on to the next
    /// release.
    pub fn aborts_run(&self) -> bool {
        matches!(
            self,
            BotError::State(_)
                | BotError::Ledger(_)
                | BotError::Io(_)
                | BotError::Config(_)
                | BotError::PermissionOrAuth(_)
        )
    }
}

impl From<ClientError> for BotError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Transient(msg) => BotError::TransientApi(msg),
            ClientError::Auth(msg) => BotError::PermissionOrAuth(msg),
            other => BotError::Api(other.to_string()),
        }
    }
}

impl From<CipherError> for BotError {
    fn from(err: CipherError) -> Self {
        match err {
            CipherError::DecryptionFailed { .. } => BotError::DecryptionFailed(err.to_string()),
            other => BotError::Cipher(other),
        }
    }
}

/// Result type for bot operations
pub type BotResult<T> = Result<T, BotError>;
