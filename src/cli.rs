// ABOUTME: Command-line surface for sandclaw: check, exec, queue, allowlist, and audit subcommands.
// ABOUTME: Each handler prints a human or JSON report and returns the process exit code.

use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Local, Utc};
use clap::{ArgAction, Parser, Subcommand};
use serde::Serialize;

use crate::config::Config;
use crate::sandbox::{
    AuditEvent, AuditQuery, CommandContext, EventType, ExecuteOptions, ExecutionResult,
    ExecutionStatus, ExportFormat, ExportOptions, QueueEntry, QueueFilter, QueueStatus,
    RiskAssessment, RiskLevel, Sandbox, SecurityLevel, current_user, parse_time_bound,
};

/// Exit code for usage and runtime errors.
pub const EXIT_ERROR: i32 = 1;
/// Exit code for a critical (check) or blocked (exec) command.
pub const EXIT_BLOCKED: i32 = 2;
/// Exit code for a dangerous (check) or queued (exec) command.
pub const EXIT_QUEUED: i32 = 3;

#[derive(Debug, Parser)]
#[command(name = "sandclaw")]
#[command(about = "Classify, gate, queue, and audit shell commands")]
#[command(version)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    /// Data directory (default ~/.sandclaw)
    #[arg(long, global = true)]
    pub home: Option<PathBuf>,

    /// Override the configured security level
    #[arg(long, global = true)]
    pub security_level: Option<SecurityLevel>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Classify a command without running it
    Check {
        /// Working directory recorded with the check
        #[arg(long)]
        cwd: Option<PathBuf>,
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
    /// Run a command through the sandbox
    Exec {
        #[arg(long)]
        cwd: Option<PathBuf>,
        /// Kill the command after this many milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
        /// Show what would happen without doing it
        #[arg(long)]
        dry_run: bool,
        /// Name of the person approving this run
        #[arg(long)]
        approved_by: Option<String>,
        /// Run approval-gated commands instead of queueing them
        #[arg(long)]
        no_queue: bool,
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
    /// Inspect and resolve the approval queue
    Queue {
        #[command(subcommand)]
        command: QueueCommands,
    },
    /// Manage allowlist patterns
    Allowlist {
        #[command(subcommand)]
        command: AllowlistCommands,
    },
    /// Query the audit trail
    Audit {
        #[command(subcommand)]
        command: AuditCommands,
    },
}

#[derive(Debug, Subcommand)]
pub enum QueueCommands {
    /// List queue entries, newest first
    List {
        /// Only entries in this status, or `all`
        #[arg(long)]
        status: Option<StatusFilter>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Show one entry
    Show { id: String },
    /// Approve a pending entry
    Approve {
        id: String,
        /// Approver name (default: current user)
        #[arg(long)]
        by: Option<String>,
        #[arg(long)]
        notes: Option<String>,
        /// Also allowlist this kind of command
        #[arg(long)]
        always: bool,
    },
    /// Reject a pending entry
    Reject {
        id: String,
        #[arg(long)]
        reason: String,
        #[arg(long)]
        by: Option<String>,
    },
    /// Run an approved entry
    Run { id: String },
    /// Purge finished entries older than the given age
    Clear {
        #[arg(long, default_value_t = 30)]
        older_than_days: u32,
    },
    /// Queue counts
    Stats,
}

#[derive(Debug, Subcommand)]
pub enum AllowlistCommands {
    /// Show default and custom patterns
    List,
    /// Add a custom pattern
    Add {
        pattern: String,
        #[arg(long, default_value = "")]
        description: String,
        /// Match without auto-approving
        #[arg(long)]
        no_auto_approve: bool,
    },
    /// Remove a custom pattern
    Remove { pattern: String },
    /// Discard all custom patterns
    Reset,
    /// Show which pattern, if any, matches a command
    Test {
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
}

#[derive(Debug, Subcommand)]
pub enum AuditCommands {
    /// Show recent events, newest first
    Show {
        #[arg(long, default_value_t = 20)]
        limit: usize,
        #[arg(long)]
        risk_level: Option<RiskLevel>,
        /// RFC 3339, YYYY-MM-DD, or an age like 12h / 7d
        #[arg(long, value_parser = parse_time)]
        since: Option<DateTime<Utc>>,
        #[arg(long, value_parser = parse_time)]
        until: Option<DateTime<Utc>>,
        /// Case-insensitive regex over the command
        #[arg(long)]
        pattern: Option<String>,
        #[arg(long)]
        status: Option<ExecutionStatus>,
        #[arg(long = "type")]
        event_type: Option<EventType>,
    },
    /// Summary counts
    Stats {
        #[arg(long, value_parser = parse_time)]
        since: Option<DateTime<Utc>>,
    },
    /// Export events as json, jsonl, or csv
    Export {
        #[arg(long, default_value = "json")]
        format: ExportFormat,
        #[arg(long, value_parser = parse_time)]
        since: Option<DateTime<Utc>>,
        #[arg(long, value_parser = parse_time)]
        until: Option<DateTime<Utc>>,
        /// Write to this file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// List daily audit files
    Files,
}

/// `queue list --status` value: one status, or `all`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFilter {
    All,
    Only(QueueStatus),
}

impl StatusFilter {
    fn status(self) -> Option<QueueStatus> {
        match self {
            StatusFilter::All => None,
            StatusFilter::Only(status) => Some(status),
        }
    }
}

impl FromStr for StatusFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") {
            Ok(StatusFilter::All)
        } else {
            s.parse().map(StatusFilter::Only)
        }
    }
}

fn parse_time(s: &str) -> Result<DateTime<Utc>, String> {
    parse_time_bound(s).map_err(|e| e.to_string())
}

impl Cli {
    /// Apply global flags on top of file and environment configuration.
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(home) = &self.home {
            config.storage.home = home.clone();
        }
        if let Some(level) = self.security_level {
            config.sandbox.security_level = level;
        }
    }
}

/// `check` exit code for a reconciled risk level.
pub fn check_exit_code(level: RiskLevel) -> i32 {
    match level {
        RiskLevel::Safe | RiskLevel::Normal => 0,
        RiskLevel::Critical => EXIT_BLOCKED,
        RiskLevel::Dangerous => EXIT_QUEUED,
    }
}

/// `exec` exit code: the command's own code when it ran.
pub fn exec_exit_code(result: &ExecutionResult) -> i32 {
    if result.blocked || result.would_block {
        EXIT_BLOCKED
    } else if result.queued || result.would_queue {
        EXIT_QUEUED
    } else if result.dry_run {
        0
    } else {
        result.exit_code.unwrap_or(EXIT_ERROR)
    }
}

/// Dispatch a parsed command line. Returns the process exit code.
pub async fn run(cli: Cli, config: Config) -> anyhow::Result<i32> {
    let sandbox = Sandbox::new(config.sandbox, &config.storage);
    let json = cli.json;

    match cli.command {
        Commands::Check { cwd, command } => {
            let cwd = cwd.unwrap_or_else(|| sandbox.config().cwd.clone());
            let assessment = sandbox.check(&command.join(" "), &CommandContext::current(&cwd));
            if json {
                print_json(&assessment)?;
            } else {
                print_assessment(&assessment);
            }
            Ok(check_exit_code(assessment.risk_level))
        }
        Commands::Exec {
            cwd,
            timeout_ms,
            dry_run,
            approved_by,
            no_queue,
            command,
        } => {
            let mut options = ExecuteOptions::new(command.join(" "))
                .dry_run(dry_run)
                .require_approval(!no_queue);
            options.cwd = cwd;
            options.timeout_ms = timeout_ms;
            options.approved_by = approved_by;

            let result = sandbox.execute(options).await;
            if json {
                print_json(&result)?;
            } else {
                print_execution(&result);
            }
            Ok(exec_exit_code(&result))
        }
        Commands::Queue { command } => run_queue(&sandbox, command, json).await,
        Commands::Allowlist { command } => run_allowlist(&sandbox, command, json),
        Commands::Audit { command } => run_audit(&sandbox, command, json),
    }
}

async fn run_queue(sandbox: &Sandbox, command: QueueCommands, json: bool) -> anyhow::Result<i32> {
    let queue = sandbox.queue();
    match command {
        QueueCommands::List { status, limit } => {
            let entries = queue.list(QueueFilter {
                status: status.and_then(StatusFilter::status),
                limit,
            });
            if json {
                print_json(&entries)?;
            } else if entries.is_empty() {
                println!("Queue is empty.");
            } else {
                for entry in &entries {
                    print_queue_row(entry);
                }
            }
        }
        QueueCommands::Show { id } => {
            let entry = queue.get(&id)?;
            if json {
                print_json(&entry)?;
            } else {
                print_queue_entry(&entry);
            }
        }
        QueueCommands::Approve {
            id,
            by,
            notes,
            always,
        } => {
            let by = by.unwrap_or_else(current_user);
            let approval = sandbox.approve(&id, &by, notes.as_deref(), always)?;
            if json {
                print_json(&approval)?;
            } else {
                println!("Approved {} by {by}", approval.entry.id);
                if let Some(pattern) = &approval.remembered {
                    println!("Allowlisted pattern: {pattern}");
                }
                println!("Run it with: sandclaw queue run {}", approval.entry.id);
            }
        }
        QueueCommands::Reject { id, reason, by } => {
            let by = by.unwrap_or_else(current_user);
            let entry = sandbox.reject(&id, &by, &reason)?;
            if json {
                print_json(&entry)?;
            } else {
                println!("Rejected {}: {reason}", entry.id);
            }
        }
        QueueCommands::Run { id } => {
            let result = sandbox.run_queued(&id).await?;
            if json {
                print_json(&result)?;
            } else {
                print_execution(&result);
            }
            return Ok(exec_exit_code(&result));
        }
        QueueCommands::Clear { older_than_days } => {
            let summary = queue.clear_older_than(older_than_days)?;
            if json {
                print_json(&summary)?;
            } else {
                println!(
                    "Removed {} entries; {} remaining",
                    summary.removed, summary.remaining
                );
            }
        }
        QueueCommands::Stats => {
            let stats = queue.stats();
            if json {
                print_json(&stats)?;
            } else {
                println!("Total:    {}", stats.total);
                println!("Pending:  {}", stats.pending);
                println!("Approved: {}", stats.approved);
                println!("Rejected: {}", stats.rejected);
                println!("Executed: {}", stats.executed);
                println!("Failed:   {}", stats.failed);
                let b = stats.risk_breakdown;
                println!(
                    "Pending by risk: safe {}, normal {}, dangerous {}, critical {}",
                    b.safe, b.normal, b.dangerous, b.critical
                );
            }
        }
    }
    Ok(0)
}

fn run_allowlist(sandbox: &Sandbox, command: AllowlistCommands, json: bool) -> anyhow::Result<i32> {
    let allowlist = sandbox.allowlist();
    match command {
        AllowlistCommands::List => {
            let listing = allowlist.list();
            if json {
                print_json(&listing)?;
            } else {
                println!("Custom:");
                if listing.custom.is_empty() {
                    println!("  (none)");
                }
                for entry in &listing.custom {
                    println!("  {:<24} auto={:<5} {}", entry.pattern, entry.auto_approve, entry.description);
                }
                println!("Defaults:");
                for entry in &listing.defaults {
                    println!("  {:<24} auto={:<5} {}", entry.pattern, entry.auto_approve, entry.description);
                }
            }
        }
        AllowlistCommands::Add {
            pattern,
            description,
            no_auto_approve,
        } => {
            let entry = allowlist.add(&pattern, &description, !no_auto_approve)?;
            if json {
                print_json(&entry)?;
            } else {
                println!("Added {} ({:?})", entry.pattern, entry.source);
            }
        }
        AllowlistCommands::Remove { pattern } => {
            let entry = allowlist.remove(&pattern)?;
            if json {
                print_json(&entry)?;
            } else {
                println!("Removed {}", entry.pattern);
            }
        }
        AllowlistCommands::Reset => {
            let removed = allowlist.reset();
            if json {
                print_json(&serde_json::json!({ "removed": removed }))?;
            } else {
                println!("Removed {removed} custom patterns");
            }
        }
        AllowlistCommands::Test { command } => {
            let matched = allowlist.test(command.join(" ").trim());
            if json {
                print_json(&serde_json::json!({ "matched": matched.is_some(), "entry": matched }))?;
            } else {
                match &matched {
                    Some(m) => println!(
                        "Matched {} ({:?}, auto_approve={})",
                        m.pattern, m.source, m.auto_approve
                    ),
                    None => println!("No match"),
                }
            }
            return Ok(if matched.is_some() { 0 } else { EXIT_ERROR });
        }
    }
    Ok(0)
}

fn run_audit(sandbox: &Sandbox, command: AuditCommands, json: bool) -> anyhow::Result<i32> {
    let auditor = sandbox.auditor();
    match command {
        AuditCommands::Show {
            limit,
            risk_level,
            since,
            until,
            pattern,
            status,
            event_type,
        } => {
            let events = auditor.read(&AuditQuery {
                limit: Some(limit),
                risk_level,
                since,
                until,
                command_pattern: pattern,
                status,
                event_type,
            });
            if json {
                print_json(&events)?;
            } else if events.is_empty() {
                println!("No audit events.");
            } else {
                for event in &events {
                    print_audit_row(event);
                }
            }
        }
        AuditCommands::Stats { since } => {
            let stats = auditor.stats(since);
            if json {
                print_json(&stats)?;
            } else {
                println!("Commands executed: {}", stats.total_commands);
                println!("Classifications:   {}", stats.total_classifications);
                println!("Queued:            {}", stats.total_queued);
                for (level, count) in &stats.by_risk_level {
                    println!("  {level:<10} {count}");
                }
                for (status, count) in &stats.by_status {
                    println!("  {status:<10} {count}");
                }
                if let (Some(first), Some(last)) = (stats.time_range.earliest, stats.time_range.latest) {
                    println!("From {} to {}", local(first), local(last));
                }
            }
        }
        AuditCommands::Export {
            format,
            since,
            until,
            output,
        } => {
            let summary = auditor.export(&ExportOptions {
                format,
                since,
                until,
                output,
            })?;
            match (&summary.data, json) {
                (Some(data), false) => print!("{data}"),
                _ if json => print_json(&summary)?,
                _ => {
                    if let Some(path) = &summary.output_file {
                        println!("Exported {} events to {}", summary.entries_count, path.display());
                    }
                }
            }
        }
        AuditCommands::Files => {
            let files = auditor.list_files()?;
            if json {
                print_json(&files)?;
            } else {
                for file in &files {
                    println!("{}  {:>10} bytes  modified {}", file.date, file.size_bytes, local(file.modified));
                }
            }
        }
    }
    Ok(0)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn local(ts: DateTime<Utc>) -> String {
    ts.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string()
}

fn print_list(title: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    println!("{title}:");
    for item in items {
        println!("  - {item}");
    }
}

fn print_assessment(a: &RiskAssessment) {
    println!("Command: {}", a.command);
    println!("Risk:    {} (score {})", a.risk_level, a.risk_score);
    let gate = if a.requires_approval { ", approval required" } else { "" };
    println!("Action:  {}{gate}", a.suggested_action);
    if let Some(m) = a.reconciliation.as_ref().and_then(|r| r.allowlist.as_ref()) {
        println!("Allowlist: {} ({:?})", m.pattern, m.source);
    }
    print_list("Reasons", &a.risk_reasons);
    print_list("Recommendations", &a.recommendations);
    print_list("Safer alternatives", &a.safe_alternatives);
}

fn print_execution(result: &ExecutionResult) {
    if result.dry_run {
        print_assessment(&result.assessment);
        let verdict = if result.would_block {
            "would be blocked"
        } else if result.would_queue {
            "would be queued for approval"
        } else {
            "would run"
        };
        println!("Dry run: {verdict}");
        return;
    }
    if result.blocked {
        eprintln!(
            "Blocked {} command: {}",
            result.assessment.risk_level,
            result.assessment.risk_reasons.join("; ")
        );
        print_list("Safer alternatives", &result.assessment.safe_alternatives);
        return;
    }
    if result.queued {
        if let Some(id) = &result.queue_id {
            eprintln!("Queued for approval as {id}");
            eprintln!("Approve with: sandclaw queue approve {id}");
        }
        return;
    }

    print!("{}", result.stdout);
    eprint!("{}", result.stderr);
    if let Some(error) = &result.error {
        eprintln!("sandclaw: {error}");
    }
}

fn print_queue_row(entry: &QueueEntry) {
    println!(
        "{}  {:<8}  {:<9}  {}  {}",
        entry.id,
        entry.status,
        entry.risk_level,
        local(entry.created_at),
        entry.command
    );
}

fn print_queue_entry(entry: &QueueEntry) {
    println!("ID:       {}", entry.id);
    println!("Command:  {}", entry.command);
    println!("Status:   {}", entry.status);
    println!("Risk:     {} (score {})", entry.risk_level, entry.risk_score);
    println!("Cwd:      {}", entry.context.cwd);
    println!("User:     {}", entry.context.user);
    println!("Created:  {}", local(entry.created_at));
    if let (Some(by), Some(at)) = (&entry.approved_by, entry.approved_at) {
        println!("Approved: {} by {by}", local(at));
    }
    if let Some(notes) = &entry.notes {
        println!("Notes:    {notes}");
    }
    if let Some(at) = entry.rejected_at {
        let by = entry.rejected_by.as_deref().unwrap_or("unknown");
        println!("Rejected: {} by {by}", local(at));
    }
    if let Some(reason) = &entry.reason {
        println!("Reason:   {reason}");
    }
    if let Some(result) = &entry.result {
        let code = result
            .exit_code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("Result:   exit {code} in {} ms", result.duration_ms);
    }
    print_list("Reasons", &entry.risk_reasons);
}

fn print_audit_row(event: &AuditEvent) {
    let status = event.status().map(|s| s.to_string()).unwrap_or_default();
    println!(
        "{}  {:<14}  {:<9}  {:<7}  {}",
        local(event.timestamp()),
        event.event_type(),
        event.risk_level(),
        status,
        event.command()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::{SuggestedAction, classify};

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn check_collects_trailing_words() {
        let cli = parse(&["sandclaw", "check", "rm", "-rf", "/tmp/x"]);
        match cli.command {
            Commands::Check { command, .. } => assert_eq!(command.join(" "), "rm -rf /tmp/x"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn exec_flags_parse() {
        let cli = parse(&[
            "sandclaw",
            "--json",
            "exec",
            "--timeout-ms",
            "500",
            "--dry-run",
            "--approved-by",
            "alice",
            "sleep",
            "5",
        ]);
        assert!(cli.json);
        match cli.command {
            Commands::Exec {
                timeout_ms,
                dry_run,
                approved_by,
                no_queue,
                command,
                ..
            } => {
                assert_eq!(timeout_ms, Some(500));
                assert!(dry_run);
                assert_eq!(approved_by.as_deref(), Some("alice"));
                assert!(!no_queue);
                assert_eq!(command, vec!["sleep", "5"]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn enum_values_parse_from_strings() {
        let cli = parse(&["sandclaw", "--security-level", "strict", "queue", "list", "--status", "pending"]);
        assert_eq!(cli.security_level, Some(SecurityLevel::Strict));
        match cli.command {
            Commands::Queue {
                command: QueueCommands::List { status, .. },
            } => assert_eq!(status, Some(StatusFilter::Only(QueueStatus::Pending))),
            other => panic!("unexpected {other:?}"),
        }

        let cli = parse(&["sandclaw", "queue", "list", "--status", "ALL"]);
        match cli.command {
            Commands::Queue {
                command: QueueCommands::List { status, .. },
            } => {
                assert_eq!(status, Some(StatusFilter::All));
                assert_eq!(status.and_then(StatusFilter::status), None);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(Cli::try_parse_from(["sandclaw", "queue", "list", "--status", "done"]).is_err());

        let cli = parse(&["sandclaw", "audit", "export", "--format", "csv", "--since", "7d"]);
        match cli.command {
            Commands::Audit {
                command: AuditCommands::Export { format, since, .. },
            } => {
                assert_eq!(format, ExportFormat::Csv);
                assert!(since.is_some());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn bad_values_are_rejected() {
        assert!(Cli::try_parse_from(["sandclaw", "--security-level", "lax", "queue", "stats"]).is_err());
        assert!(Cli::try_parse_from(["sandclaw", "audit", "show", "--since", "someday"]).is_err());
        assert!(Cli::try_parse_from(["sandclaw", "check"]).is_err());
        assert!(Cli::try_parse_from(["sandclaw", "queue", "reject", "cmd_1"]).is_err());
    }

    #[test]
    fn overrides_apply_to_config() {
        let cli = parse(&["sandclaw", "--home", "/tmp/sc", "--security-level", "deny", "queue", "stats"]);
        let mut config = Config::default();
        cli.apply_overrides(&mut config);
        assert_eq!(config.storage.home, PathBuf::from("/tmp/sc"));
        assert_eq!(config.sandbox.security_level, SecurityLevel::Deny);
    }

    #[test]
    fn check_exit_codes() {
        assert_eq!(check_exit_code(RiskLevel::Safe), 0);
        assert_eq!(check_exit_code(RiskLevel::Normal), 0);
        assert_eq!(check_exit_code(RiskLevel::Dangerous), EXIT_QUEUED);
        assert_eq!(check_exit_code(RiskLevel::Critical), EXIT_BLOCKED);
    }

    fn result() -> ExecutionResult {
        let assessment = classify("ls", &CommandContext::new("/tmp", "dev"));
        assert_eq!(assessment.suggested_action, SuggestedAction::Execute);
        ExecutionResult {
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

    #[test]
    fn exec_exit_codes() {
        let ran = ExecutionResult {
            exit_code: Some(7),
            ..result()
        };
        assert_eq!(exec_exit_code(&ran), 7);

        let blocked = ExecutionResult {
            blocked: true,
            ..result()
        };
        assert_eq!(exec_exit_code(&blocked), EXIT_BLOCKED);

        let queued = ExecutionResult {
            queued: true,
            ..result()
        };
        assert_eq!(exec_exit_code(&queued), EXIT_QUEUED);

        let spawn_failed = ExecutionResult {
            error: Some("failed to start command".to_string()),
            ..result()
        };
        assert_eq!(exec_exit_code(&spawn_failed), EXIT_ERROR);

        let preview = ExecutionResult {
            dry_run: true,
            would_execute: true,
            ..result()
        };
        assert_eq!(exec_exit_code(&preview), 0);
    }
}
