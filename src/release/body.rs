//! Parser and renderer for structured release bodies.

use std::fmt;
use std::path::{Component, Path};

/// Parsed release description
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseBody {
    /// Lowercased application id
    pub app: String,
    pub version: String,
    pub asset_name: Option<String>,
    pub sha256: Option<String>,
}

/// Why a body is not a complete release description
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReleaseParseError {
    #[error("release body is empty")]
    Empty,

    #[error("release body is missing required key `{0}`")]
    MissingField(&'static str),

    #[error("asset name {0:?} is not a plain file name")]
    InvalidAssetName(String),
}

/// Whether `name` is a single ordinary path component, so joining it onto a
/// directory cannot leave that directory.
pub fn is_plain_file_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    ) && !name.contains(['/', '\\'])
}

impl ReleaseBody {
    /// Parse a body of `key: value` lines.
    ///
    /// Keys are matched case-insensitively and unknown keys are ignored.
    /// The first occurrence of a key wins and empty values count as absent.
    /// A body is complete iff it names both `app` and `version`.
    pub fn parse(body: &str) -> Result<Self, ReleaseParseError> {
        if body.trim().is_empty() {
            return Err(ReleaseParseError::Empty);
        }

        let mut app = None;
        let mut version = None;
        let mut asset_name = None;
        let mut sha256 = None;

        for line in body.lines() {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            let slot = match key.trim().to_lowercase().as_str() {
                "app" => &mut app,
                "version" => &mut version,
                "asset_name" => &mut asset_name,
                "sha256" => &mut sha256,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value.to_string());
            }
        }

        let app = app.ok_or(ReleaseParseError::MissingField("app"))?;
        let version = version.ok_or(ReleaseParseError::MissingField("version"))?;
        if let Some(name) = asset_name.as_deref().filter(|n| !is_plain_file_name(n)) {
            return Err(ReleaseParseError::InvalidAssetName(name.to_string()));
        }

        Ok(Self {
            app: app.to_lowercase(),
            version,
            asset_name,
            sha256,
        })
    }

    /// Asset name, or `default` when the body does not name one.
    pub fn asset_name_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.asset_name.as_deref().unwrap_or(default)
    }
}

impl fmt::Display for ReleaseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "app: {}\nversion: {}", self.app, self.version)?;
        if let Some(asset) = &self.asset_name {
            write!(f, "\nasset_name: {}", asset)?;
        }
        if let Some(sha) = &self.sha256 {
            write!(f, "\nsha256: {}", sha)?;
        }
        Ok(())
    }
}
