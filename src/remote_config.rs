//! Mirror push targets in a repository's persisted git configuration
//!
//! The first `url = ...git` assignment is normalized to scp-like form and gains two `pushurl` lines below it:
//! one pointing back at the fetch URL and one pointing at the same repository on the
//! other provider. A single `git push` then updates both providers.

use anyhow::{Context, Result};
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;
use tracing::debug;

/// What happened to a configuration file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RewriteOutcome {
    /// Two push URLs were inserted after the first remote URL
    Rewritten { fetch: String, mirror: String },
    /// The file already carries push URLs, nothing was changed
    AlreadyConfigured,
    /// No remote URL line was found, nothing was changed
    NoMatch,
}

fn url_line_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\s*url\s*=\s*.*[:/].*\.git\s*$").expect("url line pattern is valid")
    })
}

fn pushurl_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\s*pushurl\s*=").expect("pushurl pattern is valid"))
}

/// Normalize a remote URL into the scp-like form the providers are identified by.
///
/// `ssh://git@host/acme/foo.git` becomes `git@host:acme/foo.git`. URLs of other schemes
/// are returned unchanged apart from surrounding whitespace.
pub fn normalize_remote_url(raw: &str) -> String {
    let url = raw.trim();
    let url = url.strip_prefix("ssh://").unwrap_or(url);

    if url.contains("://") || url.matches('/').count() < 2 {
        return url.to_string();
    }

    // host/owner/repo.git: the first slash separates the host from the path
    match url.split_once('/') {
        Some((host, path)) if !host.contains(':') => format!("{}:{}", host, path),
        _ => url.to_string(),
    }
}

/// Rewrite configuration text, returning the new text when anything changed
pub fn rewrite_remote_config_text(
    content: &str,
    original_link: &str,
    new_link: &str,
) -> (Option<String>, RewriteOutcome) {
    if content.lines().any(|line| pushurl_pattern().is_match(line)) {
        return (None, RewriteOutcome::AlreadyConfigured);
    }

    let Some(index) = content.lines().position(|line| url_line_pattern().is_match(line)) else {
        return (None, RewriteOutcome::NoMatch);
    };

    let mut lines: Vec<String> = content.lines().map(str::to_string).collect();
    let url_line = &lines[index];
    let indent: String = url_line.chars().take_while(|c| c.is_whitespace()).collect();
    let value = url_line
        .split_once('=')
        .map(|(_, value)| value)
        .unwrap_or_default();

    let fetch = normalize_remote_url(value);
    let mirror = fetch.replace(original_link, new_link);

    if fetch != value.trim() {
        lines[index] = format!("{}url = {}", indent, fetch);
    }
    lines.insert(index + 1, format!("{}pushurl = {}", indent, fetch));
    lines.insert(index + 2, format!("{}pushurl = {}", indent, mirror));

    let mut rewritten = lines.join("\n");
    if content.ends_with('\n') {
        rewritten.push('\n');
    }

    (Some(rewritten), RewriteOutcome::Rewritten { fetch, mirror })
}

/// Rewrite the configuration file at `path` in place
pub fn rewrite_remote_config(path: &Path, original_link: &str, new_link: &str) -> Result<RewriteOutcome> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read git config: {}", path.display()))?;

    let (rewritten, outcome) = rewrite_remote_config_text(&content, original_link, new_link);
    let Some(rewritten) = rewritten else {
        debug!("{}: {:?}", path.display(), outcome);
        return Ok(outcome);
    };

    // Write the whole buffer next to the original and swap it in
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "config".to_string());
    let temp_path = path.with_file_name(format!(".{}.repomirror.tmp", file_name));

    std::fs::write(&temp_path, rewritten)
        .with_context(|| format!("Failed to write git config: {}", temp_path.display()))?;
    if let Err(e) = std::fs::rename(&temp_path, path) {
        let _ = std::fs::remove_file(&temp_path);
        return Err(e).with_context(|| format!("Failed to replace git config: {}", path.display()));
    }

    debug!("Added mirror push URLs to {}", path.display());
    Ok(outcome)
}
