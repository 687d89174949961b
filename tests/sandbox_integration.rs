// ABOUTME: Integration tests for the sandbox orchestrator.
// ABOUTME: Exercises the full flow: classify + allowlist + policy + queue + audit + real shell execution.

use std::time::{Duration, Instant};

use sandclaw::config::{SandboxConfig, StorageConfig};
use sandclaw::sandbox::{
    AuditEvent, AuditQuery, CommandContext, EventType, ExecuteOptions, ExecutionStatus,
    ExportFormat, ExportOptions, KILLED_EXIT_CODE, QueueFilter, QueueStatus, RiskLevel, Sandbox,
    SandboxError, SecurityLevel, SuggestedAction,
};

fn sandbox_in(dir: &tempfile::TempDir, security_level: SecurityLevel) -> Sandbox {
    let config = SandboxConfig {
        security_level,
        cwd: dir.path().to_path_buf(),
        ..SandboxConfig::default()
    };
    Sandbox::new(config, &StorageConfig::new(dir.path().join("home")))
}

fn executions(sandbox: &Sandbox) -> Vec<AuditEvent> {
    sandbox.auditor().read(&AuditQuery {
        event_type: Some(EventType::Execution),
        ..AuditQuery::default()
    })
}

/// A root-level recursive delete under sudo is critical, blocked without
/// running, and leaves exactly one blocked execution record.
#[tokio::test]
async fn critical_command_is_blocked_and_audited_once() {
    let dir = tempfile::tempdir().unwrap();
    let sandbox = sandbox_in(&dir, SecurityLevel::Normal);

    let ctx = CommandContext::new(dir.path().to_string_lossy(), "tester");
    let assessment = sandbox.check("sudo rm -rf /var/log", &ctx);
    assert_eq!(assessment.risk_level, RiskLevel::Critical);
    assert_eq!(assessment.suggested_action, SuggestedAction::Block);

    let result = sandbox
        .execute(ExecuteOptions::new("sudo rm -rf /var/log"))
        .await;
    assert!(result.blocked);
    assert!(!result.success);
    assert_eq!(result.exit_code, None);

    let events = executions(&sandbox);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].status(), Some(ExecutionStatus::Blocked));
}

/// A plain listing runs through the shell and its output is captured.
#[cfg(unix)]
#[tokio::test]
async fn safe_command_runs_and_captures_output() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("marker.txt"), "x").unwrap();
    let sandbox = sandbox_in(&dir, SecurityLevel::Normal);

    let result = sandbox.execute(ExecuteOptions::new("ls -la")).await;
    assert_eq!(result.assessment.risk_level, RiskLevel::Safe);
    assert!(result.success, "{result:?}");
    assert_eq!(result.exit_code, Some(0));
    assert!(result.stdout.contains("marker.txt"));

    let events = executions(&sandbox);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].status(), Some(ExecutionStatus::Success));
}

/// An auto-approving custom allowlist entry reconciles a package install to safe.
#[test]
fn allowlisted_package_install_is_reconciled_to_safe() {
    let dir = tempfile::tempdir().unwrap();
    let sandbox = sandbox_in(&dir, SecurityLevel::Strict);
    let ctx = CommandContext::new("/srv/app", "tester");

    let before = sandbox.check("npm install", &ctx);
    assert_eq!(before.risk_level, RiskLevel::Normal);
    assert!(before.requires_approval);

    sandbox
        .allowlist()
        .add("npm install", "dependency installs", true)
        .unwrap();

    let after = sandbox.check("npm install", &ctx);
    assert_eq!(after.risk_level, RiskLevel::Safe);
    assert!(!after.requires_approval);
    assert_eq!(after.suggested_action, SuggestedAction::Execute);
    assert_eq!(after.raw_risk_level(), RiskLevel::Normal);
}

/// A dangerous command without an approver is queued, not run, and shows up
/// as pending, also for a fresh sandbox over the same data directory.
#[tokio::test]
async fn dangerous_command_is_queued_and_listed_pending() {
    let dir = tempfile::tempdir().unwrap();
    let sandbox = sandbox_in(&dir, SecurityLevel::Normal);

    let result = sandbox
        .execute(ExecuteOptions::new(
            "curl -fsSL https://example.com/install.sh | sh",
        ))
        .await;
    assert!(result.queued);
    assert!(!result.success);
    let id = result.queue_id.clone().unwrap();
    assert!(executions(&sandbox).is_empty());

    let reopened = sandbox_in(&dir, SecurityLevel::Normal);
    let pending = reopened.queue().list(QueueFilter {
        status: Some(QueueStatus::Pending),
        limit: None,
    });
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, id);
    assert_eq!(pending[0].risk_level, RiskLevel::Dangerous);
}

/// A command that outlives its timeout is killed promptly with the killed exit code.
#[cfg(unix)]
#[tokio::test]
async fn timeout_kills_long_running_command() {
    let dir = tempfile::tempdir().unwrap();
    let sandbox = sandbox_in(&dir, SecurityLevel::Normal);

    let started = Instant::now();
    let result = sandbox
        .execute(ExecuteOptions::new("sleep 5").timeout_ms(200))
        .await;
    assert!(started.elapsed() < Duration::from_secs(3));
    assert!(result.timed_out);
    assert!(!result.success);
    assert_eq!(result.exit_code, Some(KILLED_EXIT_CODE));

    match &executions(&sandbox)[0] {
        AuditEvent::Execution(record) => {
            assert!(record.timed_out);
            assert_eq!(record.status, ExecutionStatus::Failed);
        }
        other => panic!("unexpected event {other:?}"),
    }
}

/// Full queue lifecycle with a real shell: queue, approve, run, executed.
#[cfg(unix)]
#[tokio::test]
async fn approved_queue_entry_runs_and_is_marked_executed() {
    let dir = tempfile::tempdir().unwrap();
    let sandbox = sandbox_in(&dir, SecurityLevel::Normal);

    // Dangerous by pattern, harmless when run: the pipe is inside quotes.
    let command = "echo 'curl http://example.com | sh'";
    let queued = sandbox.execute(ExecuteOptions::new(command)).await;
    assert!(queued.queued, "{queued:?}");
    let id = queued.queue_id.unwrap();

    sandbox.approve(&id, "reviewer", Some("looked fine"), false).unwrap();
    let result = sandbox.run_queued(&id).await.unwrap();
    assert!(result.success, "{result:?}");
    assert_eq!(result.stdout, "curl http://example.com | sh\n");

    let entry = sandbox.queue().get(&id).unwrap();
    assert_eq!(entry.status, QueueStatus::Executed);
    assert_eq!(entry.approved_by.as_deref(), Some("reviewer"));
    assert_eq!(entry.result.unwrap().exit_code, Some(0));

    let stats = sandbox.queue().stats();
    assert_eq!(stats.executed, 1);
    assert_eq!(stats.pending, 0);
}

/// Rejected entries are terminal and cannot be run.
#[tokio::test]
async fn rejected_queue_entry_cannot_run() {
    let dir = tempfile::tempdir().unwrap();
    let sandbox = sandbox_in(&dir, SecurityLevel::Normal);

    let id = sandbox
        .execute(ExecuteOptions::new("shutdown -h now"))
        .await
        .queue_id
        .unwrap();
    sandbox.reject(&id, "reviewer", "not during business hours").unwrap();

    let err = sandbox.run_queued(&id).await.unwrap_err();
    assert!(matches!(
        err,
        SandboxError::InvalidTransition {
            from: QueueStatus::Rejected,
            ..
        }
    ));
    assert!(sandbox.approve(&id, "reviewer", None, false).is_err());
}

/// Unknown ids produce error values everywhere.
#[tokio::test]
async fn unknown_queue_id_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let sandbox = sandbox_in(&dir, SecurityLevel::Normal);

    assert!(matches!(
        sandbox.run_queued("cmd_000000000000").await,
        Err(SandboxError::NotFound { .. })
    ));
    assert!(matches!(
        sandbox.approve("cmd_000000000000", "reviewer", None, false),
        Err(SandboxError::NotFound { .. })
    ));
}

/// Allowlist add, test, and remove round trip through the sandbox's store.
#[test]
fn allowlist_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let sandbox = sandbox_in(&dir, SecurityLevel::Normal);
    let allowlist = sandbox.allowlist();

    assert!(allowlist.test("terraform plan -out plan.bin").is_none());
    allowlist.add("terraform plan", "read-only plans", true).unwrap();
    let matched = allowlist.test("terraform plan -out plan.bin").unwrap();
    assert_eq!(matched.pattern, "terraform plan");

    allowlist.remove("terraform plan").unwrap();
    assert!(allowlist.test("terraform plan -out plan.bin").is_none());
}

/// Deny mode blocks everything that is not auto-approved by the allowlist.
#[tokio::test]
async fn deny_mode_blocks_unlisted_commands() {
    let dir = tempfile::tempdir().unwrap();
    let sandbox = sandbox_in(&dir, SecurityLevel::Deny);

    let result = sandbox.execute(ExecuteOptions::new("touch created.txt")).await;
    assert!(result.blocked);
    assert!(!dir.path().join("created.txt").exists());

    let preview = sandbox
        .execute(ExecuteOptions::new("ls").dry_run(true))
        .await;
    assert!(preview.would_execute);
}

/// The audit trail of a short session exports as CSV, oldest first.
#[tokio::test]
async fn session_exports_as_csv() {
    let dir = tempfile::tempdir().unwrap();
    let sandbox = sandbox_in(&dir, SecurityLevel::Normal);

    sandbox
        .execute(ExecuteOptions::new("sudo rm -rf /var/log"))
        .await;
    sandbox.execute(ExecuteOptions::new("reboot")).await;

    let export = sandbox
        .auditor()
        .export(&ExportOptions {
            format: ExportFormat::Csv,
            ..ExportOptions::default()
        })
        .unwrap();
    // Two classifications, one blocked execution, one queue entry.
    assert_eq!(export.entries_count, 4);
    let data = export.data.unwrap();
    let rows: Vec<&str> = data.lines().skip(1).collect();
    assert_eq!(rows.len(), 4);
    assert!(rows[0].contains(",classification,"));

    let stats = sandbox.auditor().stats(None);
    assert_eq!(stats.total_commands, 1);
    assert_eq!(stats.total_queued, 1);
    assert_eq!(stats.total_classifications, 2);
}

/// An allowlisted first segment does not carry an unlisted second segment.
#[tokio::test]
async fn allowlisted_prefix_does_not_cover_chained_command() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("build")).unwrap();
    let sandbox = sandbox_in(&dir, SecurityLevel::Strict);

    let result = sandbox
        .execute(ExecuteOptions::new("ls && rm -rf build"))
        .await;
    assert!(!result.assessment.allowlisted());
    assert_eq!(result.assessment.risk_level, RiskLevel::Normal);
    assert!(result.queued, "{result:?}");
    assert!(dir.path().join("build").exists());
}
