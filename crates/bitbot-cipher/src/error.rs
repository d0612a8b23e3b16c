//! Error types for the asset codec.

/// Errors produced while deriving keys or transcoding asset files.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CipherError {
    /// The key has no a-z characters, so substitution would be a no-op.
    #[error("invalid cipher key: substitution leaves {0:?} unchanged")]
    InvalidKey(String),

    /// No line of the asset file could be decoded.
    #[error("decryption failed: no decodable entries ({skipped} malformed lines)")]
    DecryptionFailed { skipped: usize },

    /// A value that is neither a string nor a boolean.
    #[error("unsupported value type for feature {feature:?}: {found}")]
    UnsupportedValueType { feature: String, found: String },

    /// The input is not a structure the codec understands.
    #[error("invalid encoding: {0}")]
    InvalidEncoding(String),
}
