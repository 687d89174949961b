// ABOUTME: Persistent approval queue: commands held for human sign-off and their lifecycle.
// ABOUTME: pending -> approved|rejected, approved -> executed|failed; every change is locked and atomic.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use super::error::{Result, SandboxError};
use super::store::{StoreLock, load_or_default, save_atomic};
use super::types::{CommandContext, RiskAssessment, RiskLevel};

/// Lifecycle state of a queued command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    Pending,
    Approved,
    Rejected,
    Executed,
    Failed,
}

impl QueueStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            QueueStatus::Rejected | QueueStatus::Executed | QueueStatus::Failed
        )
    }

    /// The only legal edges of the lifecycle.
    pub fn can_transition_to(self, next: QueueStatus) -> bool {
        matches!(
            (self, next),
            (QueueStatus::Pending, QueueStatus::Approved)
                | (QueueStatus::Pending, QueueStatus::Rejected)
                | (QueueStatus::Approved, QueueStatus::Executed)
                | (QueueStatus::Approved, QueueStatus::Failed)
        )
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            QueueStatus::Pending => "pending",
            QueueStatus::Approved => "approved",
            QueueStatus::Rejected => "rejected",
            QueueStatus::Executed => "executed",
            QueueStatus::Failed => "failed",
        })
    }
}

impl FromStr for QueueStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(QueueStatus::Pending),
            "approved" => Ok(QueueStatus::Approved),
            "rejected" => Ok(QueueStatus::Rejected),
            "executed" => Ok(QueueStatus::Executed),
            "failed" => Ok(QueueStatus::Failed),
            other => Err(format!("unknown queue status: {other}")),
        }
    }
}

/// Outcome of running an approved entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    /// Exit code 0 and no timeout.
    pub success: bool,
    /// `None` when the command failed to start.
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    #[serde(default)]
    pub timed_out: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub finished_at: DateTime<Utc>,
}

/// A command waiting for, or past, human review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    /// `cmd_` followed by 12 hex digits.
    pub id: String,
    /// The command exactly as submitted.
    pub command: String,
    /// Reconciled level at the time the command was queued.
    pub risk_level: RiskLevel,
    pub risk_score: u8,
    pub risk_reasons: Vec<String>,
    /// Directory and user the command will run as once approved.
    pub context: CommandContext,
    pub status: QueueStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<DateTime<Utc>>,
    /// Who signed off; required for approval.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<String>,
    /// Free-form note left by the approver.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejected_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejected_by: Option<String>,
    /// Why the command was rejected; required for rejection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// When a runner claimed this approved entry. See `claim_for_run`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_started_at: Option<DateTime<Utc>>,
    /// Set once the approved command has run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ExecutionSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct QueueFile {
    version: u32,
    #[serde(default)]
    entries: Vec<QueueEntry>,
}

impl Default for QueueFile {
    fn default() -> Self {
        Self {
            version: 1,
            entries: Vec::new(),
        }
    }
}

/// Selection for `ApprovalQueue::list`. `status: None` means every status.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueueFilter {
    pub status: Option<QueueStatus>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClearSummary {
    pub removed: usize,
    pub remaining: usize,
}

/// Count of entries per risk level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskBreakdown {
    pub safe: usize,
    pub normal: usize,
    pub dangerous: usize,
    pub critical: usize,
}

impl RiskBreakdown {
    pub fn record(&mut self, level: RiskLevel) {
        match level {
            RiskLevel::Safe => self.safe += 1,
            RiskLevel::Normal => self.normal += 1,
            RiskLevel::Dangerous => self.dangerous += 1,
            RiskLevel::Critical => self.critical += 1,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub total: usize,
    pub pending: usize,
    pub approved: usize,
    pub rejected: usize,
    pub executed: usize,
    pub failed: usize,
    /// Only pending entries are counted here.
    pub risk_breakdown: RiskBreakdown,
}

/// JSON-backed approval queue.
#[derive(Debug, Clone)]
pub struct ApprovalQueue {
    path: PathBuf,
}

impl ApprovalQueue {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> QueueFile {
        load_or_default(&self.path)
    }

    /// Queue an assessed command as `pending` and persist it immediately.
    pub fn add(&self, assessment: &RiskAssessment) -> Result<QueueEntry> {
        let _lock = StoreLock::acquire(&self.path)?;
        let mut file = self.load();

        let id = loop {
            let candidate = format!("cmd_{}", &Uuid::new_v4().simple().to_string()[..12]);
            if !file.entries.iter().any(|e| e.id == candidate) {
                break candidate;
            }
        };

        let entry = QueueEntry {
            id,
            command: assessment.command.clone(),
            risk_level: assessment.risk_level,
            risk_score: assessment.risk_score,
            risk_reasons: assessment.risk_reasons.clone(),
            context: assessment.context.clone(),
            status: QueueStatus::Pending,
            created_at: Utc::now(),
            approved_at: None,
            approved_by: None,
            notes: None,
            rejected_at: None,
            rejected_by: None,
            reason: None,
            run_started_at: None,
            result: None,
        };
        file.entries.push(entry.clone());
        save_atomic(&self.path, &file)?;
        debug!(id = %entry.id, risk = %entry.risk_level, "queued command");
        Ok(entry)
    }

    /// Entries newest-first, optionally filtered by status and truncated.
    pub fn list(&self, filter: QueueFilter) -> Vec<QueueEntry> {
        let mut entries: Vec<QueueEntry> = self
            .load()
            .entries
            .into_iter()
            .filter(|e| filter.status.is_none_or(|s| e.status == s))
            .collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = filter.limit {
            entries.truncate(limit);
        }
        entries
    }

    pub fn get(&self, id: &str) -> Result<QueueEntry> {
        self.load()
            .entries
            .into_iter()
            .find(|e| e.id == id)
            .ok_or_else(|| SandboxError::not_found("queue entry", id))
    }

    pub fn approve(&self, id: &str, approved_by: &str, notes: Option<&str>) -> Result<QueueEntry> {
        if approved_by.trim().is_empty() {
            return Err(SandboxError::InvalidArgument(
                "approved_by is required to approve a command".to_string(),
            ));
        }
        self.transition(id, QueueStatus::Approved, |entry| {
            entry.approved_at = Some(Utc::now());
            entry.approved_by = Some(approved_by.to_string());
            entry.notes = notes.map(str::to_string);
        })
    }

    pub fn reject(&self, id: &str, rejected_by: &str, reason: &str) -> Result<QueueEntry> {
        if reason.trim().is_empty() {
            return Err(SandboxError::InvalidArgument(
                "a reason is required to reject a command".to_string(),
            ));
        }
        self.transition(id, QueueStatus::Rejected, |entry| {
            entry.rejected_at = Some(Utc::now());
            entry.rejected_by = Some(rejected_by.to_string()).filter(|s| !s.trim().is_empty());
            entry.reason = Some(reason.to_string());
        })
    }

    /// Claim an approved entry before running it, so two runners cannot both
    /// execute it.
    ///
    /// A claim younger than `lease_ms` makes later callers fail with
    /// `AlreadyRunning`. An older claim is treated as abandoned by a crashed
    /// runner and is taken over.
    pub fn claim_for_run(&self, id: &str, lease_ms: u64) -> Result<QueueEntry> {
        let _lock = StoreLock::acquire(&self.path)?;
        let mut file = self.load();
        let entry = file
            .entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| SandboxError::not_found("queue entry", id))?;

        if entry.status != QueueStatus::Approved {
            return Err(SandboxError::InvalidTransition {
                id: id.to_string(),
                from: entry.status,
                to: QueueStatus::Executed,
            });
        }
        let now = Utc::now();
        if let Some(started) = entry.run_started_at {
            let lease = Duration::try_milliseconds(i64::try_from(lease_ms).unwrap_or(i64::MAX));
            let held = lease
                .and_then(|lease| started.checked_add_signed(lease))
                .is_none_or(|until| now < until);
            if held {
                return Err(SandboxError::AlreadyRunning(id.to_string()));
            }
            warn!(id, %started, "taking over an abandoned run claim");
        }
        entry.run_started_at = Some(now);
        let claimed = entry.clone();

        save_atomic(&self.path, &file)?;
        debug!(id, "queue entry claimed for run");
        Ok(claimed)
    }

    pub fn mark_executed(&self, id: &str, summary: ExecutionSummary) -> Result<QueueEntry> {
        self.transition(id, QueueStatus::Executed, |entry| entry.result = Some(summary))
    }

    pub fn mark_failed(&self, id: &str, summary: ExecutionSummary) -> Result<QueueEntry> {
        self.transition(id, QueueStatus::Failed, |entry| entry.result = Some(summary))
    }

    fn transition(
        &self,
        id: &str,
        to: QueueStatus,
        apply: impl FnOnce(&mut QueueEntry),
    ) -> Result<QueueEntry> {
        let _lock = StoreLock::acquire(&self.path)?;
        let mut file = self.load();
        let entry = file
            .entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| SandboxError::not_found("queue entry", id))?;

        if !entry.status.can_transition_to(to) {
            return Err(SandboxError::InvalidTransition {
                id: id.to_string(),
                from: entry.status,
                to,
            });
        }
        entry.status = to;
        apply(entry);
        let updated = entry.clone();

        save_atomic(&self.path, &file)?;
        debug!(id, status = %to, "queue entry transitioned");
        Ok(updated)
    }

    /// Purge rejected, executed, and failed entries created more than `days` ago.
    /// Pending and approved entries are kept regardless of age.
    pub fn clear_older_than(&self, days: u32) -> Result<ClearSummary> {
        let cutoff = Duration::try_days(i64::from(days))
            .and_then(|age| Utc::now().checked_sub_signed(age))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let _lock = StoreLock::acquire(&self.path)?;
        let mut file = self.load();

        let before = file.entries.len();
        file.entries
            .retain(|e| !(e.status.is_terminal() && e.created_at < cutoff));
        let removed = before - file.entries.len();

        if removed > 0 {
            save_atomic(&self.path, &file)?;
        }
        Ok(ClearSummary {
            removed,
            remaining: file.entries.len(),
        })
    }

    pub fn stats(&self) -> QueueStats {
        let mut stats = QueueStats::default();
        for entry in self.load().entries {
            stats.total += 1;
            match entry.status {
                QueueStatus::Pending => {
                    stats.pending += 1;
                    stats.risk_breakdown.record(entry.risk_level);
                }
                QueueStatus::Approved => stats.approved += 1,
                QueueStatus::Rejected => stats.rejected += 1,
                QueueStatus::Executed => stats.executed += 1,
                QueueStatus::Failed => stats.failed += 1,
            }
        }
        stats
    }
}
