// ABOUTME: Sandbox orchestrator: ties classifier, allowlist, policy, queue, auditor, and runner together.
// ABOUTME: check() reconciles a command; execute() previews, blocks, queues, or runs it and records the outcome.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{SandboxConfig, StorageConfig};

use super::allowlist::AllowlistStore;
use super::analysis::allowlist_pattern;
use super::audit::{Auditor, ExecutionRecord, ExecutionStatus, excerpt};
use super::classifier::classify;
use super::error::{Result, SandboxError};
use super::policy::reconcile;
use super::queue::{ApprovalQueue, ExecutionSummary, QueueEntry};
use super::runner::{CommandRunner, ShellRunner};
use super::types::{CommandContext, RiskAssessment, SuggestedAction, current_user};

/// How long a run claim outlasts the command timeout.
const RUN_CLAIM_MARGIN_MS: u64 = 60_000;

/// A request to run a command through the sandbox.
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    pub command: String,
    /// Defaults to the configured working directory.
    pub cwd: Option<PathBuf>,
    /// Defaults to the configured timeout.
    pub timeout_ms: Option<u64>,
    pub dry_run: bool,
    /// A named approver lets blocked and approval-gated commands run.
    pub approved_by: Option<String>,
    /// When false, commands that need approval run anyway instead of being queued.
    pub require_approval: bool,
    /// Queue entry to report the outcome to.
    pub queue_id: Option<String>,
    /// Defaults to the current OS user.
    pub user: Option<String>,
}

impl ExecuteOptions {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            cwd: None,
            timeout_ms: None,
            dry_run: false,
            approved_by: None,
            require_approval: true,
            queue_id: None,
            user: None,
        }
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn approved_by(mut self, approved_by: impl Into<String>) -> Self {
        self.approved_by = Some(approved_by.into());
        self
    }

    pub fn require_approval(mut self, require_approval: bool) -> Self {
        self.require_approval = require_approval;
        self
    }

    pub fn queue_id(mut self, queue_id: impl Into<String>) -> Self {
        self.queue_id = Some(queue_id.into());
        self
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    fn approver(&self) -> Option<&str> {
        self.approved_by
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// Outcome of `Sandbox::execute`. Blocking and queueing are outcomes, not errors.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub blocked: bool,
    pub queued: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_id: Option<String>,
    pub dry_run: bool,
    pub would_execute: bool,
    pub would_queue: bool,
    pub would_block: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
    pub timed_out: bool,
    pub truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub assessment: RiskAssessment,
}

impl ExecutionResult {
    fn new(assessment: RiskAssessment) -> Self {
        Self {
            success: false,
            blocked: false,
            queued: false,
            queue_id: None,
            dry_run: false,
            would_execute: false,
            would_queue: false,
            would_block: false,
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            duration_ms: 0,
            timed_out: false,
            truncated: false,
            error: None,
            assessment,
        }
    }
}

/// Result of approving a queue entry.
#[derive(Debug, Clone, Serialize)]
pub struct Approval {
    pub entry: QueueEntry,
    /// Allowlist pattern added when the approval was remembered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remembered: Option<String>,
}

/// What `execute` will do with an assessed command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disposition {
    Block,
    Queue,
    Run,
}

fn disposition(assessment: &RiskAssessment, options: &ExecuteOptions) -> Disposition {
    let approved = options.approver().is_some();
    if assessment.suggested_action == SuggestedAction::Block && !approved {
        Disposition::Block
    } else if assessment.requires_approval && !approved && options.require_approval {
        Disposition::Queue
    } else {
        Disposition::Run
    }
}

/// The sandbox: every command goes through `check`, and `execute` acts on the verdict.
pub struct Sandbox {
    config: SandboxConfig,
    allowlist: AllowlistStore,
    queue: ApprovalQueue,
    auditor: Auditor,
    runner: Box<dyn CommandRunner>,
}

impl Sandbox {
    /// A sandbox that runs commands through the host shell.
    pub fn new(config: SandboxConfig, storage: &StorageConfig) -> Self {
        Self::with_runner(config, storage, ShellRunner)
    }

    /// A sandbox with a custom runner, useful for testing.
    pub fn with_runner(
        config: SandboxConfig,
        storage: &StorageConfig,
        runner: impl CommandRunner + 'static,
    ) -> Self {
        Self {
            config,
            allowlist: AllowlistStore::new(storage.allowlist_path()),
            queue: ApprovalQueue::new(storage.queue_path()),
            auditor: Auditor::new(storage.audit_dir()),
            runner: Box::new(runner),
        }
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    pub fn allowlist(&self) -> &AllowlistStore {
        &self.allowlist
    }

    pub fn queue(&self) -> &ApprovalQueue {
        &self.queue
    }

    pub fn auditor(&self) -> &Auditor {
        &self.auditor
    }

    /// Classify a command, reconcile it against the allowlist and policy, and
    /// record the classification.
    pub fn check(&self, command: &str, context: &CommandContext) -> RiskAssessment {
        let raw = classify(command, context);
        let allowlisted = self.allowlist.test(command.trim());
        let assessment = reconcile(raw, allowlisted, &self.config);
        debug!(
            command,
            risk = %assessment.risk_level,
            score = assessment.risk_score,
            action = %assessment.suggested_action,
            requires_approval = assessment.requires_approval,
            "command checked"
        );
        self.auditor.log_classification(&assessment);
        assessment
    }

    /// Preview, block, queue, or run a command.
    pub async fn execute(&self, options: ExecuteOptions) -> ExecutionResult {
        let cwd = options
            .cwd
            .clone()
            .unwrap_or_else(|| self.config.cwd.clone());
        let user = options.user.clone().unwrap_or_else(current_user);
        let context = CommandContext::new(cwd.to_string_lossy(), user);

        let assessment = self.check(&options.command, &context);
        let disposition = disposition(&assessment, &options);
        let mut result = ExecutionResult::new(assessment);

        if options.dry_run {
            result.dry_run = true;
            result.success = true;
            result.would_block = disposition == Disposition::Block;
            result.would_queue = disposition == Disposition::Queue;
            result.would_execute = disposition == Disposition::Run;
            return result;
        }

        match disposition {
            Disposition::Block => {
                info!(command = %options.command, "command blocked");
                let mut record =
                    ExecutionRecord::new(&result.assessment, cwd.to_string_lossy(), ExecutionStatus::Blocked);
                record.queue_id = options.queue_id.clone();
                self.auditor.log_execution(record);
                result.blocked = true;
                result.error = Some(format!(
                    "blocked: {} command ({})",
                    result.assessment.risk_level,
                    result.assessment.risk_reasons.join("; ")
                ));
                result
            }
            Disposition::Queue => {
                match self.queue.add(&result.assessment) {
                    Ok(entry) => {
                        info!(command = %options.command, id = %entry.id, "command queued for approval");
                        self.auditor.log_queue_entry(&entry);
                        result.queued = true;
                        result.queue_id = Some(entry.id);
                    }
                    Err(e) => {
                        warn!(command = %options.command, error = %e, "failed to queue command");
                        result.error = Some(format!("failed to queue command: {e}"));
                    }
                }
                result
            }
            Disposition::Run => self.run(result, &cwd, &options).await,
        }
    }

    async fn run(
        &self,
        mut result: ExecutionResult,
        cwd: &Path,
        options: &ExecuteOptions,
    ) -> ExecutionResult {
        let timeout_ms = options.timeout_ms.unwrap_or(self.config.default_timeout_ms);
        let started = Instant::now();
        let mut record =
            ExecutionRecord::new(&result.assessment, cwd.to_string_lossy(), ExecutionStatus::Failed);
        record.approved_by = options.approver().map(str::to_string);
        record.queue_id = options.queue_id.clone();

        match self
            .runner
            .run(&options.command, cwd, Duration::from_millis(timeout_ms))
            .await
        {
            Ok(output) => {
                result.success = output.success();
                result.exit_code = Some(output.exit_code);
                result.duration_ms = output.duration.as_millis() as u64;
                result.timed_out = output.timed_out;
                result.truncated = output.truncated;
                if output.timed_out {
                    result.error = Some(format!("command timed out after {timeout_ms} ms"));
                }
                result.stdout = output.stdout;
                result.stderr = output.stderr;
            }
            Err(e) => {
                warn!(command = %options.command, error = %e, "failed to start command");
                result.duration_ms = started.elapsed().as_millis() as u64;
                result.error = Some(format!("failed to start command: {e}"));
            }
        }
        debug!(
            command = %options.command,
            exit_code = ?result.exit_code,
            duration_ms = result.duration_ms,
            "command finished"
        );

        if result.success {
            record.status = ExecutionStatus::Success;
        }
        record.exit_code = result.exit_code;
        record.stdout = excerpt(&result.stdout);
        record.stderr = excerpt(&result.stderr);
        record.duration_ms = result.duration_ms;
        record.timed_out = result.timed_out;
        record.error = result.error.clone();
        self.auditor.log_execution(record);

        if let Some(id) = &options.queue_id {
            self.report_to_queue(id, &result);
        }
        result
    }

    fn report_to_queue(&self, id: &str, result: &ExecutionResult) {
        let summary = ExecutionSummary {
            success: result.success,
            exit_code: result.exit_code,
            duration_ms: result.duration_ms,
            stdout: excerpt(&result.stdout),
            stderr: excerpt(&result.stderr),
            timed_out: result.timed_out,
            error: result.error.clone(),
            finished_at: Utc::now(),
        };
        let outcome = if result.success {
            self.queue.mark_executed(id, summary)
        } else {
            self.queue.mark_failed(id, summary)
        };
        if let Err(e) = outcome {
            warn!(id, error = %e, "failed to record outcome on queue entry");
        }
    }

    /// Run an approved queue entry with its original directory and approver.
    ///
    /// The entry is claimed under the queue lock first, so a second concurrent
    /// `run_queued` for the same id fails with `AlreadyRunning` instead of
    /// running the command again. A claim outlives the run by
    /// `RUN_CLAIM_MARGIN_MS`; after that a crashed runner's claim is taken over.
    pub async fn run_queued(&self, id: &str) -> Result<ExecutionResult> {
        let lease_ms = self
            .config
            .default_timeout_ms
            .saturating_add(RUN_CLAIM_MARGIN_MS);
        let entry = self.queue.claim_for_run(id, lease_ms)?;
        let approver = entry.approved_by.unwrap_or_else(|| "unknown".to_string());
        let options = ExecuteOptions::new(entry.command)
            .cwd(entry.context.cwd)
            .user(entry.context.user)
            .approved_by(approver)
            .queue_id(id);
        Ok(self.execute(options).await)
    }

    /// Approve a queue entry. With `remember`, an auto-approving allowlist
    /// pattern derived from the command is added as well.
    pub fn approve(
        &self,
        id: &str,
        approved_by: &str,
        notes: Option<&str>,
        remember: bool,
    ) -> Result<Approval> {
        let entry = self.queue.approve(id, approved_by, notes)?;
        let remembered = if remember {
            self.remember(&entry)
        } else {
            None
        };
        Ok(Approval { entry, remembered })
    }

    fn remember(&self, entry: &QueueEntry) -> Option<String> {
        let Some(pattern) = allowlist_pattern(&entry.command) else {
            debug!(id = %entry.id, "compound command; not adding to allowlist");
            return None;
        };
        let description = format!("Approved from queue entry {}", entry.id);
        let auto_approve = match self.allowlist.add(&pattern, &description, true) {
            // A default entry with the same pattern comes back unchanged.
            Ok(added) => added.auto_approve,
            Err(SandboxError::DuplicatePattern(_)) => self
                .allowlist
                .list()
                .custom
                .iter()
                .any(|e| e.pattern == pattern && e.auto_approve),
            Err(e) => {
                warn!(pattern = %pattern, error = %e, "failed to remember approval");
                return None;
            }
        };
        if !auto_approve {
            info!(pattern = %pattern, "pattern is allowlisted without auto-approve; left unchanged");
            return None;
        }
        Some(pattern)
    }

    pub fn reject(&self, id: &str, rejected_by: &str, reason: &str) -> Result<QueueEntry> {
        self.queue.reject(id, rejected_by, reason)
    }
}
