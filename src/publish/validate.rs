//! Checks a rendered post before it is sent to the forum.

use regex_lite::Regex;

use crate::config::SafetySettings;
use crate::error::{BotError, BotResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub severity: Severity,
    pub message: String,
}

/// Issues found in one post
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    fn error(&mut self, message: impl Into<String>) {
        self.issues.push(ValidationIssue {
            severity: Severity::Error,
            message: message.into(),
        });
    }

    fn warning(&mut self, message: impl Into<String>) {
        self.issues.push(ValidationIssue {
            severity: Severity::Warning,
            message: message.into(),
        });
    }

    pub fn has_errors(&self) -> bool {
        self.issues.iter().any(|i| i.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &str> {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Warning)
            .map(|i| i.message.as_str())
    }

    /// Fail with every error message joined, or pass through.
    pub fn into_result(self) -> BotResult<Self> {
        if !self.has_errors() {
            return Ok(self);
        }
        let errors: Vec<&str> = self
            .issues
            .iter()
            .filter(|i| i.severity == Severity::Error)
            .map(|i| i.message.as_str())
            .collect();
        Err(BotError::Validation(errors.join("; ")))
    }
}

fn pattern(re: &str) -> BotResult<Regex> {
    Regex::new(re).map_err(|e| BotError::Validation(format!("pattern {}: {}", re, e)))
}

/// Validate a title and body against the safety limits.
pub fn validate_post(
    title: &str,
    body: &str,
    limits: &SafetySettings,
) -> BotResult<ValidationReport> {
    let mut report = ValidationReport::default();

    let title_len = title.chars().count();
    if title_len > limits.title_max_length {
        report.error(format!(
            "title too long: {}/{} chars",
            title_len, limits.title_max_length
        ));
    }
    if title_len < limits.title_min_length {
        report.warning("title seems too short");
    }
    if title.contains("{{") || title.contains("}}") {
        report.error("unresolved placeholder in title");
    }

    let body_len = body.chars().count();
    if body.trim().chars().count() < limits.body_min_length {
        report.error("post body too short or empty");
    }
    if body_len > limits.body_max_length {
        report.error(format!(
            "body too long: {}/{} chars",
            body_len, limits.body_max_length
        ));
    }

    let placeholders: Vec<&str> = pattern(r"\{\{[^}]+\}\}")?
        .find_iter(body)
        .map(|m| m.as_str())
        .take(3)
        .collect();
    if !placeholders.is_empty() {
        report.error(format!(
            "unresolved placeholders: {}",
            placeholders.join(", ")
        ));
    }

    if pattern(r"\[[^\]]*\]\(\s*\)")?.is_match(body) {
        report.error("link with an empty URL");
    }
    if pattern(r"\[\s*\]\([^)]+\)")?.is_match(body) {
        report.warning("link with empty text");
    }
    if !pattern(r"v?\d+\.\d+")?.is_match(body) {
        report.warning("no version numbers in post");
    }
    if !body.to_lowercase().contains("http") {
        report.warning("no URLs in post");
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> SafetySettings {
        SafetySettings::default()
    }

    const GOOD_BODY: &str = "## Changes\n\n- Added **BitLife** v3.21: \
        [MonetizationVars](https://github.com/me/bot/releases/tag/bitlife-v3.21)";

    #[test]
    fn test_valid_post() {
        let report = validate_post("[BitBot] New: BitLife v3.21", GOOD_BODY, &limits()).unwrap();
        assert!(!report.has_errors());
        assert_eq!(report.warnings().count(), 0);
        assert!(report.into_result().is_ok());
    }

    #[test]
    fn test_unresolved_placeholders_are_errors() {
        let body = format!("{} {{{{pages_url}}}}", GOOD_BODY);
        let report = validate_post("[BitBot] {{date}} update", &body, &limits()).unwrap();
        assert!(report.has_errors());

        let err = report.into_result().unwrap_err();
        assert_eq!(err.exit_code(), 7);
        assert!(err.to_string().contains("{{pages_url}}"));
    }

    #[test]
    fn test_length_bounds() {
        let long_title = "x".repeat(301);
        assert!(validate_post(&long_title, GOOD_BODY, &limits())
            .unwrap()
            .has_errors());
        assert!(validate_post("A fine title", "too short", &limits())
            .unwrap()
            .has_errors());

        let short_title = validate_post("Hi", GOOD_BODY, &limits()).unwrap();
        assert!(!short_title.has_errors());
        assert_eq!(short_title.warnings().count(), 1);
    }

    #[test]
    fn test_empty_link_url_is_error() {
        let body = format!("{}\n[download]()", GOOD_BODY);
        assert!(validate_post("A fine title", &body, &limits())
            .unwrap()
            .has_errors());
    }
}
