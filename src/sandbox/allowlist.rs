// ABOUTME: Persistent allowlist of trusted command patterns layered over a built-in default set.
// ABOUTME: Custom entries are matched before defaults; patterns are word-bounded prefixes, globs, or regexes.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use glob::Pattern;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::analysis::command_segments;
use super::error::{Result, SandboxError};
use super::store::{StoreLock, load_or_default, save_atomic};

/// Where an allowlist entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntrySource {
    /// Built-in, read-only.
    Default,
    /// Added by the user.
    Custom,
}

/// A trusted command pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowlistEntry {
    /// Word-bounded prefix, glob, or `^`-anchored regex.
    pub pattern: String,
    /// Human-readable reason the pattern is trusted.
    #[serde(default)]
    pub description: String,
    /// Whether a match lets a safe or normal command run without approval.
    pub auto_approve: bool,
    pub source: EntrySource,
    /// When a custom entry was added. Always `None` for defaults.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub added_at: Option<DateTime<Utc>>,
}

/// The entry that matched a command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowlistMatch {
    /// The pattern of the entry that matched.
    pub pattern: String,
    pub description: String,
    /// Copied from the entry; policy only relaxes on auto-approving matches.
    pub auto_approve: bool,
    pub source: EntrySource,
}

impl From<&AllowlistEntry> for AllowlistMatch {
    fn from(entry: &AllowlistEntry) -> Self {
        Self {
            pattern: entry.pattern.clone(),
            description: entry.description.clone(),
            auto_approve: entry.auto_approve,
            source: entry.source,
        }
    }
}

/// Both halves of the allowlist, for display.
#[derive(Debug, Clone, Serialize)]
pub struct AllowlistListing {
    pub defaults: Vec<AllowlistEntry>,
    pub custom: Vec<AllowlistEntry>,
}

/// On-disk format. Defaults are compiled in and never written.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct AllowlistFile {
    version: u32,
    #[serde(default)]
    custom: Vec<AllowlistEntry>,
}

impl Default for AllowlistFile {
    fn default() -> Self {
        Self {
            version: 1,
            custom: Vec::new(),
        }
    }
}

/// Built-in entries: (pattern, description, auto_approve).
const DEFAULT_ENTRIES: &[(&str, &str, bool)] = &[
    ("ls", "List directory contents", true),
    ("pwd", "Print working directory", true),
    ("echo", "Print text", true),
    ("whoami", "Show current user", true),
    ("date", "Show date and time", true),
    ("which", "Locate a command", true),
    ("git status", "Show working tree status", true),
    ("git diff", "Show changes", true),
    ("git log", "Show commit history", true),
    ("git show", "Show a commit", true),
    ("cargo build", "Build a Rust project", true),
    ("cargo test", "Run Rust tests", true),
    ("cargo check", "Type-check a Rust project", true),
    ("npm test", "Run npm tests", true),
    ("npm run", "Run an npm script", false),
    ("make", "Run make targets", false),
];

/// The read-only default entries.
pub fn default_entries() -> Vec<AllowlistEntry> {
    DEFAULT_ENTRIES
        .iter()
        .map(|(pattern, description, auto_approve)| AllowlistEntry {
            pattern: pattern.to_string(),
            description: description.to_string(),
            auto_approve: *auto_approve,
            source: EntrySource::Default,
            added_at: None,
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PatternKind {
    Regex,
    Glob,
    Prefix,
}

fn pattern_kind(pattern: &str) -> PatternKind {
    if pattern.starts_with('^') {
        PatternKind::Regex
    } else if pattern.contains(&['*', '?', '['][..]) {
        PatternKind::Glob
    } else {
        PatternKind::Prefix
    }
}

/// Check a pattern against an already-trimmed command.
///
/// Prefixes must end at a word boundary: `ls` matches `ls -la` but not `lsblk`.
pub fn pattern_matches(pattern: &str, command: &str) -> bool {
    match pattern_kind(pattern) {
        PatternKind::Regex => Regex::new(pattern)
            .map(|re| re.is_match(command))
            .unwrap_or(false),
        PatternKind::Glob => Pattern::new(pattern)
            .map(|p| p.matches(command))
            .unwrap_or(false),
        PatternKind::Prefix => {
            command == pattern
                || (command.starts_with(pattern)
                    && (pattern.ends_with(char::is_whitespace)
                        || command[pattern.len()..].starts_with(char::is_whitespace)))
        }
    }
}

fn match_compound<'a>(
    entries: &'a [AllowlistEntry],
    command: &str,
    segments: &[String],
) -> Option<&'a AllowlistEntry> {
    let whole_line = entries.iter().find(|e| {
        pattern_kind(&e.pattern) == PatternKind::Regex && pattern_matches(&e.pattern, command)
    });
    if whole_line.is_some() {
        return whole_line;
    }

    let mut first = None;
    for segment in segments {
        let Some(entry) = entries
            .iter()
            .find(|e| e.auto_approve && pattern_matches(&e.pattern, segment))
        else {
            debug!(segment = %segment, "compound command segment not allowlisted");
            return None;
        };
        first.get_or_insert(entry);
    }
    first
}

fn validate_pattern(pattern: &str) -> Result<()> {
    if pattern.trim().is_empty() {
        return Err(SandboxError::InvalidArgument(
            "allowlist pattern must not be empty".to_string(),
        ));
    }
    match pattern_kind(pattern) {
        PatternKind::Regex => Regex::new(pattern)
            .map(|_| ())
            .map_err(|e| SandboxError::InvalidArgument(format!("invalid regex {pattern}: {e}"))),
        PatternKind::Glob => Pattern::new(pattern)
            .map(|_| ())
            .map_err(|e| SandboxError::InvalidArgument(format!("invalid glob {pattern}: {e}"))),
        PatternKind::Prefix => Ok(()),
    }
}

/// JSON-backed allowlist store. Every call re-reads the file, so concurrent
/// processes observe each other's changes.
#[derive(Debug, Clone)]
pub struct AllowlistStore {
    path: PathBuf,
}

impl AllowlistStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> AllowlistFile {
        load_or_default(&self.path)
    }

    /// Find the first entry matching a command: custom entries first, then defaults.
    ///
    /// A chained or piped command line matches a regex entry written against
    /// the whole line, or else only when every segment matches an
    /// auto-approving entry. In that case the first segment's entry is returned.
    pub fn test(&self, command: &str) -> Option<AllowlistMatch> {
        let command = command.trim();
        if command.is_empty() {
            return None;
        }
        let mut entries = self.load().custom;
        entries.extend(default_entries());

        let segments = command_segments(command);
        let found = if segments.len() > 1 {
            match_compound(&entries, command, &segments)
        } else {
            entries.iter().find(|e| pattern_matches(&e.pattern, command))
        }
        .map(AllowlistMatch::from);
        if let Some(m) = &found {
            debug!(pattern = %m.pattern, source = ?m.source, "allowlist match");
        }
        found
    }

    /// Add a custom entry.
    ///
    /// A pattern identical to a default entry is already satisfied: the default
    /// is returned and nothing is written.
    pub fn add(&self, pattern: &str, description: &str, auto_approve: bool) -> Result<AllowlistEntry> {
        validate_pattern(pattern)?;

        let _lock = StoreLock::acquire(&self.path)?;
        let mut file = self.load();
        if file.custom.iter().any(|e| e.pattern == pattern) {
            return Err(SandboxError::DuplicatePattern(pattern.to_string()));
        }
        if let Some(default) = default_entries().into_iter().find(|e| e.pattern == pattern) {
            return Ok(default);
        }

        let entry = AllowlistEntry {
            pattern: pattern.to_string(),
            description: description.to_string(),
            auto_approve,
            source: EntrySource::Custom,
            added_at: Some(Utc::now()),
        };
        file.custom.push(entry.clone());
        save_atomic(&self.path, &file)?;
        Ok(entry)
    }

    /// Remove a custom entry. Defaults cannot be removed.
    pub fn remove(&self, pattern: &str) -> Result<AllowlistEntry> {
        let _lock = StoreLock::acquire(&self.path)?;
        let mut file = self.load();
        let Some(index) = file.custom.iter().position(|e| e.pattern == pattern) else {
            return Err(SandboxError::not_found("allowlist pattern", pattern));
        };
        let removed = file.custom.remove(index);
        save_atomic(&self.path, &file)?;
        Ok(removed)
    }

    pub fn list(&self) -> AllowlistListing {
        AllowlistListing {
            defaults: default_entries(),
            custom: self.load().custom,
        }
    }

    /// Discard every custom entry, leaving only the defaults. Returns how many
    /// were discarded. Storage problems are logged, never returned.
    pub fn reset(&self) -> usize {
        let _lock = match StoreLock::acquire(&self.path) {
            Ok(lock) => Some(lock),
            Err(e) => {
                warn!(error = %e, "could not lock allowlist for reset; resetting anyway");
                None
            }
        };
        let removed = self.load().custom.len();
        if let Err(e) = save_atomic(&self.path, &AllowlistFile::default()) {
            warn!(error = %e, "failed to write reset allowlist");
        }
        removed
    }
}
