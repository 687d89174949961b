// ABOUTME: Configuration loading for sandclaw.
// ABOUTME: Reads ~/.sandclaw/config.toml (or SANDCLAW_CONFIG), then SANDCLAW_* environment overrides.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

use crate::sandbox::SecurityLevel;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sandbox: SandboxConfig,
    pub storage: StorageConfig,
}

/// Policy and execution settings handed to the sandbox.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    pub security_level: SecurityLevel,
    pub auto_approve_safe: bool,
    pub block_critical: bool,
    pub default_timeout_ms: u64,
    /// Working directory for commands that do not name one.
    pub cwd: PathBuf,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            security_level: SecurityLevel::Normal,
            auto_approve_safe: true,
            block_critical: true,
            default_timeout_ms: 30_000,
            cwd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }
}

/// Where the allowlist, queue, and audit files live.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub home: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            home: default_home(),
        }
    }
}

impl StorageConfig {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }

    pub fn allowlist_path(&self) -> PathBuf {
        self.home.join("allowlist.json")
    }

    pub fn queue_path(&self) -> PathBuf {
        self.home.join("queue.json")
    }

    pub fn audit_dir(&self) -> PathBuf {
        self.home.join("audit")
    }
}

fn default_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".sandclaw")
}

impl Config {
    /// Load config from the config file, falling back to defaults, then apply
    /// environment overrides.
    pub fn load() -> anyhow::Result<Self> {
        let mut config = match Self::config_path() {
            path if path.exists() => Self::from_file(&path)?,
            _ => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))
    }

    /// Path to the config file.
    pub fn config_path() -> PathBuf {
        std::env::var_os("SANDCLAW_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|| default_home().join("config.toml"))
    }

    /// Apply `SANDCLAW_*` overrides read through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<()> {
        if let Some(level) = lookup("SANDCLAW_SECURITY_LEVEL") {
            self.sandbox.security_level = level
                .parse()
                .map_err(|e: String| anyhow::anyhow!("SANDCLAW_SECURITY_LEVEL: {e}"))?;
        }
        if let Some(value) = lookup("SANDCLAW_AUTO_APPROVE_SAFE") {
            self.sandbox.auto_approve_safe = parse_bool("SANDCLAW_AUTO_APPROVE_SAFE", &value)?;
        }
        if let Some(value) = lookup("SANDCLAW_BLOCK_CRITICAL") {
            self.sandbox.block_critical = parse_bool("SANDCLAW_BLOCK_CRITICAL", &value)?;
        }
        if let Some(value) = lookup("SANDCLAW_TIMEOUT_MS") {
            self.sandbox.default_timeout_ms = value
                .trim()
                .parse()
                .with_context(|| format!("SANDCLAW_TIMEOUT_MS: invalid number {value:?}"))?;
        }
        if let Some(cwd) = lookup("SANDCLAW_CWD") {
            self.sandbox.cwd = PathBuf::from(cwd);
        }
        if let Some(home) = lookup("SANDCLAW_HOME") {
            self.storage.home = PathBuf::from(home);
        }
        Ok(())
    }
}

fn parse_bool(key: &str, value: &str) -> anyhow::Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("{key}: expected a boolean, got {other:?}"),
    }
}
