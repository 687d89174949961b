// ABOUTME: Core types for the command sandbox.
// ABOUTME: RiskLevel, SuggestedAction, SecurityLevel, CommandContext, and RiskAssessment.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::allowlist::AllowlistMatch;

/// Coarse classification of a command's potential for harm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Safe,
    Normal,
    Dangerous,
    Critical,
}

impl RiskLevel {
    /// Map a 0..=100 score onto its fixed band.
    pub fn from_score(score: u8) -> Self {
        match score {
            0..=19 => RiskLevel::Safe,
            20..=49 => RiskLevel::Normal,
            50..=79 => RiskLevel::Dangerous,
            _ => RiskLevel::Critical,
        }
    }

    /// The action the classifier suggests for this level before any policy applies.
    pub fn default_action(self) -> SuggestedAction {
        match self {
            RiskLevel::Safe | RiskLevel::Normal => SuggestedAction::Execute,
            RiskLevel::Dangerous => SuggestedAction::Queue,
            RiskLevel::Critical => SuggestedAction::Block,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RiskLevel::Safe => "safe",
            RiskLevel::Normal => "normal",
            RiskLevel::Dangerous => "dangerous",
            RiskLevel::Critical => "critical",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for RiskLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "safe" => Ok(RiskLevel::Safe),
            "normal" => Ok(RiskLevel::Normal),
            "dangerous" => Ok(RiskLevel::Dangerous),
            "critical" => Ok(RiskLevel::Critical),
            other => Err(format!("unknown risk level: {other}")),
        }
    }
}

/// What the sandbox intends to do with a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestedAction {
    /// Run it now.
    Execute,
    /// Hold it in the approval queue.
    Queue,
    /// Refuse it.
    Block,
}

impl fmt::Display for SuggestedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            SuggestedAction::Execute => "execute",
            SuggestedAction::Queue => "queue",
            SuggestedAction::Block => "block",
        })
    }
}

/// How restrictive the approval policy is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityLevel {
    /// Only critical commands need approval.
    Permissive,
    /// Dangerous and critical commands need approval.
    #[default]
    Normal,
    /// Everything above safe needs approval.
    Strict,
    /// Block everything that is not auto-approved by the allowlist.
    Deny,
}

impl fmt::Display for SecurityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            SecurityLevel::Permissive => "permissive",
            SecurityLevel::Normal => "normal",
            SecurityLevel::Strict => "strict",
            SecurityLevel::Deny => "deny",
        })
    }
}

impl FromStr for SecurityLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "permissive" => Ok(SecurityLevel::Permissive),
            "normal" => Ok(SecurityLevel::Normal),
            "strict" => Ok(SecurityLevel::Strict),
            "deny" => Ok(SecurityLevel::Deny),
            other => Err(format!("unknown security level: {other}")),
        }
    }
}

/// Where and by whom a command was submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandContext {
    pub cwd: String,
    pub user: String,
    pub timestamp: DateTime<Utc>,
}

impl CommandContext {
    pub fn new(cwd: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            cwd: cwd.into(),
            user: user.into(),
            timestamp: Utc::now(),
        }
    }

    /// Context for the current OS user in the given directory.
    pub fn current(cwd: &Path) -> Self {
        Self::new(cwd.to_string_lossy(), current_user())
    }
}

/// Best-effort name of the user running this process.
pub fn current_user() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}

/// Record of how the raw classification was adjusted by allowlist and policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reconciliation {
    pub raw_risk_level: RiskLevel,
    pub raw_suggested_action: SuggestedAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowlist: Option<AllowlistMatch>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

/// The classifier's verdict on a command, optionally reconciled against policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub command: String,
    pub risk_level: RiskLevel,
    pub risk_score: u8,
    pub risk_reasons: Vec<String>,
    /// Detector ids, parallel to `risk_reasons`.
    #[serde(default)]
    pub matched_detectors: Vec<String>,
    pub suggested_action: SuggestedAction,
    pub requires_approval: bool,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub safe_alternatives: Vec<String>,
    pub context: CommandContext,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reconciliation: Option<Reconciliation>,
}

impl RiskAssessment {
    /// Whether an allowlist entry matched during reconciliation.
    pub fn allowlisted(&self) -> bool {
        self.reconciliation
            .as_ref()
            .is_some_and(|r| r.allowlist.is_some())
    }

    /// The level the classifier produced before reconciliation.
    pub fn raw_risk_level(&self) -> RiskLevel {
        self.reconciliation
            .as_ref()
            .map(|r| r.raw_risk_level)
            .unwrap_or(self.risk_level)
    }
}
