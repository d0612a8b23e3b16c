//! Post titles, changelogs, app tables, bodies and outdated banners.

use chrono::{DateTime, NaiveDate, Utc};
use regex_lite::Regex;
use std::collections::BTreeMap;

use super::changeset::ChangeSet;
use crate::config::{
    BotConfig, ChangelogTemplates, OutdatedMode, TableTemplates, TitleTemplates,
    OUTDATED_SIGNATURE,
};
use crate::error::{BotError, BotResult};
use crate::state::CatalogEntry;
use crate::template::fill;

/// Titles name each app when at most this many were added or updated.
pub const MAX_TITLED_CHANGES: usize = 3;

/// `Name vX, Name vY`
fn app_list<'a>(apps: impl Iterator<Item = (&'a str, &'a str)>) -> String {
    apps.map(|(name, version)| format!("{} v{}", name, version))
        .collect::<Vec<_>>()
        .join(", ")
}

/// A row's own asset name, or `fallback` for rows recorded without one.
fn row_asset<'a>(row: &'a str, fallback: &'a str) -> &'a str {
    if row.is_empty() {
        fallback
    } else {
        row
    }
}

/// Title for a post announcing `changes`.
///
/// Removal-only change sets, and those touching more than
/// [`MAX_TITLED_CHANGES`] apps, get the dated generic title.
pub fn render_title(titles: &TitleTemplates, changes: &ChangeSet, today: NaiveDate) -> String {
    let added = changes.added.len();
    let updated = changes.updated.len();

    let added_list = app_list(
        changes
            .added
            .values()
            .map(|a| (a.display_name.as_str(), a.version.as_str())),
    );
    let updated_list = app_list(
        changes
            .updated
            .values()
            .map(|u| (u.display_name.as_str(), u.new_version.as_str())),
    );

    let template = match (added, updated) {
        _ if changes.touched() > MAX_TITLED_CHANGES => None,
        (0, 0) => None,
        (_, 0) => Some(&titles.added_only),
        (0, 1) => Some(&titles.updated_only_single),
        (0, _) => Some(&titles.updated_only_multi),
        (_, 1) => Some(&titles.mixed_single_update),
        (_, _) => Some(&titles.mixed_multi_update),
    };

    match template {
        Some(template) => fill(
            template,
            &[("added_list", &added_list), ("updated_list", &updated_list)],
        ),
        None => {
            let date = today.format("%Y-%m-%d").to_string();
            fill(&titles.generic, &[("date", &date)])
        }
    }
}

/// Changelog with `### Added`, `### Updated` and `### Removed` sections.
///
/// `asset_name` fills rows that carry no asset name of their own.
pub fn render_changelog(
    templates: &ChangelogTemplates,
    changes: &ChangeSet,
    asset_name: &str,
) -> String {
    let mut sections = Vec::new();

    if !changes.added.is_empty() {
        let mut lines = vec!["### Added".to_string()];
        lines.extend(changes.added.values().map(|a| {
            fill(
                &templates.added,
                &[
                    ("display_name", &a.display_name),
                    ("version", &a.version),
                    ("asset_name", row_asset(&a.asset_name, asset_name)),
                    ("download_url", &a.url),
                ],
            )
        }));
        sections.push(lines.join("\n"));
    }

    if !changes.updated.is_empty() {
        let mut lines = vec!["### Updated".to_string()];
        lines.extend(changes.updated.values().map(|u| {
            fill(
                &templates.updated,
                &[
                    ("display_name", &u.display_name),
                    ("old_version", &u.old_version),
                    ("new_version", &u.new_version),
                    ("asset_name", row_asset(&u.asset_name, asset_name)),
                    ("download_url", &u.url),
                ],
            )
        }));
        sections.push(lines.join("\n"));
    }

    if !changes.removed.is_empty() {
        let mut lines = vec!["### Removed".to_string()];
        lines.extend(changes.removed.values().map(|r| {
            fill(
                &templates.removed,
                &[
                    ("display_name", &r.display_name),
                    ("old_version", &r.old_version),
                    ("asset_name", asset_name),
                ],
            )
        }));
        sections.push(lines.join("\n"));
    }

    if sections.is_empty() {
        templates.no_changes.clone()
    } else {
        sections.join("\n\n")
    }
}

/// Markdown table of every published app, sorted by display name.
pub fn render_table(
    table: &TableTemplates,
    catalog: &BTreeMap<String, CatalogEntry>,
    asset_name: &str,
) -> String {
    let mut entries: Vec<(&String, &CatalogEntry)> = catalog.iter().collect();
    entries.sort_by(|a, b| {
        a.1.display_name
            .to_lowercase()
            .cmp(&b.1.display_name.to_lowercase())
            .then_with(|| a.0.cmp(b.0))
    });

    let mut lines = vec![table.header.clone(), table.divider.clone()];
    lines.extend(entries.into_iter().map(|(_, entry)| {
        fill(
            &table.line,
            &[
                ("display_name", &entry.display_name),
                ("asset_name", row_asset(&entry.asset_name, asset_name)),
                ("version", &entry.version),
            ],
        )
    }));
    lines.join("\n")
}

/// Full post body.
pub fn render_body(
    config: &BotConfig,
    changes: &ChangeSet,
    catalog: &BTreeMap<String, CatalogEntry>,
    now: DateTime<Utc>,
) -> String {
    let asset_name = config.github.asset_file_name.as_str();
    let changelog = render_changelog(&config.changelog, changes, asset_name);
    let table = render_table(&config.table, catalog, asset_name);
    let app_count = catalog.len().to_string();
    let pages_url = config.pages_url();
    let timestamp = now.format("%Y-%m-%d %H:%M UTC").to_string();

    fill(
        &config.templates.post,
        &[
            ("changelog", &changelog),
            ("available_list", &table),
            ("app_count", &app_count),
            ("bot_name", &config.reddit.bot_name),
            ("bot_repo", &config.github.bot_repo),
            ("asset_name", asset_name),
            ("creator", &config.reddit.creator),
            ("pages_url", &pages_url),
            ("update_timestamp", &timestamp),
        ],
    )
}

/// Body for an older post once `latest_url` supersedes it.
///
/// Inject mode puts the banner above the existing body, replacing an earlier
/// banner block (signature through the first `---` line) in place. Overwrite
/// mode replaces the whole body. Returns `None` when the body would not
/// change.
pub fn apply_banner(
    body: &str,
    config: &BotConfig,
    latest_url: &str,
) -> BotResult<Option<String>> {
    let values = [("latest_post_url", latest_url)];

    let updated = match config.reddit.outdated_mode {
        OutdatedMode::Overwrite => fill(&config.templates.outdated_overwrite, &values),
        OutdatedMode::Inject => {
            let banner = fill(&config.templates.outdated_banner, &values);
            let block = Regex::new(&format!(
                r"(?ms)\A{}.*?^---[ \t]*$",
                regex_lite::escape(OUTDATED_SIGNATURE)
            ))
            .map_err(|e| BotError::Validation(format!("banner pattern: {}", e)))?;

            match block.find(body) {
                Some(found) => format!("{}\n\n---{}", banner, &body[found.end()..]),
                None => format!("{}\n\n---\n\n{}", banner, body),
            }
        }
    };

    Ok((updated != body).then_some(updated))
}
