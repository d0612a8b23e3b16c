//! Release description wire format.
//!
//! Upstream release bodies and the notes this bot writes on downstream
//! releases share one format: `key: value` lines with the keys `app`,
//! `version`, `asset_name` and `sha256`.

mod body;

pub use body::{is_plain_file_name, ReleaseBody, ReleaseParseError};
