//! Shared helpers for integration tests
//!
//! - Temporary state directories with real ledger and forum state files
//! - A canned, remote-ready configuration
//! - Encrypted sample asset files

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::PathBuf;

use bitbot::cipher::{encrypt, CipherKey, FeatureMap, FeatureValue};
use bitbot::config::AppEntry;
use bitbot::state::{CatalogEntry, ForumPostState, FORUM_STATE_FILE, LEDGER_FILE};
use bitbot::{BotConfig, ReleaseLedger};
use tempfile::TempDir;

/// Config pointing at fake repositories, with two registered apps
pub fn config() -> BotConfig {
    let mut config = BotConfig::default();
    config.github.source_repo = "upstream/assets".to_string();
    config.github.bot_repo = "bitbot/releases".to_string();
    config.reddit.subreddit = "bitlifemods".to_string();
    config.reddit.creator = "maintainer".to_string();
    config.apps = vec![
        AppEntry {
            id: "bitlife".to_string(),
            display_name: "BitLife".to_string(),
        },
        AppEntry {
            id: "doglife".to_string(),
            display_name: "DogLife".to_string(),
        },
    ];
    config
}

pub fn cipher_key(config: &BotConfig) -> CipherKey {
    CipherKey::derive(&config.cipher.key).unwrap()
}

/// Encode `features` the way the upstream app ships them.
pub fn encrypted_asset(config: &BotConfig, features: &[(&str, FeatureValue)]) -> Vec<u8> {
    let map: FeatureMap = features.iter().cloned().collect();
    encrypt(&map, &cipher_key(config)).unwrap().into_bytes()
}

/// Asset with a single locked feature
pub fn locked_asset(config: &BotConfig) -> Vec<u8> {
    encrypted_asset(config, &[("NoAds", FeatureValue::Bool(false))])
}

/// Release body in the wire format
pub fn release_body(app: &str, version: &str) -> String {
    format!("app: {}\nversion: {}\nasset_name: MonetizationVars", app, version)
}

pub fn catalog_entry(config: &BotConfig, app_id: &str, display_name: &str, version: &str) -> CatalogEntry {
    let tag = format!("{}-v{}", app_id, version);
    CatalogEntry {
        display_name: display_name.to_string(),
        version: version.to_string(),
        url: format!("https://github.com/{}/releases/tag/{}", config.github.bot_repo, tag),
        tag,
        sha256: "ab".repeat(32),
        asset_name: config.github.asset_file_name.clone(),
    }
}

pub fn catalog(entries: &[(&str, CatalogEntry)]) -> BTreeMap<String, CatalogEntry> {
    entries
        .iter()
        .map(|(id, entry)| (id.to_string(), entry.clone()))
        .collect()
}

/// A state directory that is removed when dropped
pub struct StateDir {
    dir: TempDir,
}

impl StateDir {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.dir.path().join(LEDGER_FILE)
    }

    pub fn forum_path(&self) -> PathBuf {
        self.dir.path().join(FORUM_STATE_FILE)
    }

    pub fn ledger(&self) -> ReleaseLedger {
        ReleaseLedger::open(&self.ledger_path()).unwrap()
    }

    pub fn forum_state(&self) -> ForumPostState {
        ForumPostState::open(&self.forum_path()).unwrap()
    }
}
