// ABOUTME: Append-only audit trail: one JSONL file per local day under the audit directory.
// ABOUTME: Logging never fails the caller; reading, stats, and export tolerate torn or corrupt lines.

use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Duration, Local, NaiveDate, TimeZone, Utc};
use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::error::{Result, SandboxError};
use super::queue::QueueEntry;
use super::types::{RiskAssessment, RiskLevel, SuggestedAction};

/// Longest stdout/stderr excerpt kept in an execution record, in bytes.
pub const EXCERPT_LIMIT: usize = 4096;

/// A single audit record. Serialized with an explicit `type` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    Classification(ClassificationRecord),
    QueueEntry(QueueRecord),
    Execution(ExecutionRecord),
}

/// Written by every `check`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationRecord {
    pub timestamp: DateTime<Utc>,
    pub command: String,
    /// Level after allowlist and policy reconciliation.
    pub risk_level: RiskLevel,
    /// Raw classifier score, 0 to 100.
    pub risk_score: u8,
    /// One entry per matched detector, in table order.
    pub risk_reasons: Vec<String>,
    pub suggested_action: SuggestedAction,
    pub requires_approval: bool,
    /// Directory the command was submitted from.
    pub cwd: String,
    /// OS user that submitted the command.
    pub user: String,
    /// An allowlist entry matched during reconciliation.
    #[serde(default)]
    pub allowlisted: bool,
    /// Present when reconciliation changed the classifier's level.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_risk_level: Option<RiskLevel>,
}

/// Written when a command is held for approval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueRecord {
    pub timestamp: DateTime<Utc>,
    /// Id of the queue entry that was created.
    pub queue_id: String,
    pub command: String,
    pub risk_level: RiskLevel,
    pub risk_score: u8,
    pub risk_reasons: Vec<String>,
    pub cwd: String,
    pub user: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Success,
    Failed,
    Blocked,
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            ExecutionStatus::Success => "success",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Blocked => "blocked",
        })
    }
}

impl FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "success" => Ok(ExecutionStatus::Success),
            "failed" => Ok(ExecutionStatus::Failed),
            "blocked" => Ok(ExecutionStatus::Blocked),
            other => Err(format!("unknown execution status: {other}")),
        }
    }
}

/// Written when a command runs or is blocked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub timestamp: DateTime<Utc>,
    pub command: String,
    pub risk_level: RiskLevel,
    pub risk_score: u8,
    /// Directory the command ran in (or would have, when blocked).
    pub cwd: String,
    pub status: ExecutionStatus,
    /// `None` when blocked or when the command failed to start.
    #[serde(default)]
    pub exit_code: Option<i32>,
    /// Excerpt of at most `EXCERPT_LIMIT` bytes.
    #[serde(default)]
    pub stdout: String,
    /// Excerpt of at most `EXCERPT_LIMIT` bytes.
    #[serde(default)]
    pub stderr: String,
    #[serde(default)]
    pub duration_ms: u64,
    /// Approver that let a gated command run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<String>,
    /// Queue entry this run belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_id: Option<String>,
    /// Killed after exceeding its timeout.
    #[serde(default)]
    pub timed_out: bool,
    /// Spawn failure or timeout message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionRecord {
    /// A record with no output yet, stamped now.
    pub fn new(assessment: &RiskAssessment, cwd: impl Into<String>, status: ExecutionStatus) -> Self {
        Self {
            timestamp: Utc::now(),
            command: assessment.command.clone(),
            risk_level: assessment.risk_level,
            risk_score: assessment.risk_score,
            cwd: cwd.into(),
            status,
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            duration_ms: 0,
            approved_by: None,
            queue_id: None,
            timed_out: false,
            error: None,
        }
    }
}

/// Discriminant of `AuditEvent`, used for filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Classification,
    QueueEntry,
    Execution,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            EventType::Classification => "classification",
            EventType::QueueEntry => "queue_entry",
            EventType::Execution => "execution",
        })
    }
}

impl FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "classification" => Ok(EventType::Classification),
            "queue_entry" | "queue" => Ok(EventType::QueueEntry),
            "execution" => Ok(EventType::Execution),
            other => Err(format!("unknown event type: {other}")),
        }
    }
}

impl AuditEvent {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            AuditEvent::Classification(r) => r.timestamp,
            AuditEvent::QueueEntry(r) => r.timestamp,
            AuditEvent::Execution(r) => r.timestamp,
        }
    }

    pub fn event_type(&self) -> EventType {
        match self {
            AuditEvent::Classification(_) => EventType::Classification,
            AuditEvent::QueueEntry(_) => EventType::QueueEntry,
            AuditEvent::Execution(_) => EventType::Execution,
        }
    }

    pub fn command(&self) -> &str {
        match self {
            AuditEvent::Classification(r) => &r.command,
            AuditEvent::QueueEntry(r) => &r.command,
            AuditEvent::Execution(r) => &r.command,
        }
    }

    pub fn risk_level(&self) -> RiskLevel {
        match self {
            AuditEvent::Classification(r) => r.risk_level,
            AuditEvent::QueueEntry(r) => r.risk_level,
            AuditEvent::Execution(r) => r.risk_level,
        }
    }

    /// Execution status; `None` for non-execution events.
    pub fn status(&self) -> Option<ExecutionStatus> {
        match self {
            AuditEvent::Execution(r) => Some(r.status),
            _ => None,
        }
    }
}

/// Filters for `Auditor::read`. All set fields must match.
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    pub limit: Option<usize>,
    pub risk_level: Option<RiskLevel>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    /// Case-insensitive regex; falls back to a substring match if it does not compile.
    pub command_pattern: Option<String>,
    /// Only execution events carry a status, so setting this excludes the others.
    pub status: Option<ExecutionStatus>,
    pub event_type: Option<EventType>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TimeRange {
    pub earliest: Option<DateTime<Utc>>,
    pub latest: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuditStats {
    /// Number of execution events.
    pub total_commands: usize,
    pub total_classifications: usize,
    pub total_queued: usize,
    /// Counted over classification events.
    pub by_risk_level: BTreeMap<RiskLevel, usize>,
    /// Counted over execution events.
    pub by_status: BTreeMap<ExecutionStatus, usize>,
    pub time_range: TimeRange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Json,
    Jsonl,
    Csv,
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "jsonl" | "ndjson" => Ok(ExportFormat::Jsonl),
            "csv" => Ok(ExportFormat::Csv),
            other => Err(format!("unknown export format: {other}")),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExportOptions {
    pub format: ExportFormat,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    /// Write here instead of returning the data inline.
    pub output: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    pub entries_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditFileInfo {
    pub date: NaiveDate,
    pub size_bytes: u64,
    pub modified: DateTime<Utc>,
}

/// Writes and queries the daily audit files in one directory.
#[derive(Debug, Clone)]
pub struct Auditor {
    dir: PathBuf,
}

impl Auditor {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_for(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!("audit-{}.jsonl", date.format("%Y-%m-%d")))
    }

    pub fn log_classification(&self, assessment: &RiskAssessment) {
        let raw = assessment.raw_risk_level();
        self.record(&AuditEvent::Classification(ClassificationRecord {
            timestamp: Utc::now(),
            command: assessment.command.clone(),
            risk_level: assessment.risk_level,
            risk_score: assessment.risk_score,
            risk_reasons: assessment.risk_reasons.clone(),
            suggested_action: assessment.suggested_action,
            requires_approval: assessment.requires_approval,
            cwd: assessment.context.cwd.clone(),
            user: assessment.context.user.clone(),
            allowlisted: assessment.allowlisted(),
            raw_risk_level: (raw != assessment.risk_level).then_some(raw),
        }));
    }

    pub fn log_queue_entry(&self, entry: &QueueEntry) {
        self.record(&AuditEvent::QueueEntry(QueueRecord {
            timestamp: Utc::now(),
            queue_id: entry.id.clone(),
            command: entry.command.clone(),
            risk_level: entry.risk_level,
            risk_score: entry.risk_score,
            risk_reasons: entry.risk_reasons.clone(),
            cwd: entry.context.cwd.clone(),
            user: entry.context.user.clone(),
        }));
    }

    pub fn log_execution(&self, record: ExecutionRecord) {
        self.record(&AuditEvent::Execution(record));
    }

    fn record(&self, event: &AuditEvent) {
        if let Err(e) = self.append(event) {
            warn!(
                dir = %self.dir.display(),
                event = %event.event_type(),
                error = %e,
                "failed to write audit event"
            );
        }
    }

    fn append(&self, event: &AuditEvent) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let date = event.timestamp().with_timezone(&Local).date_naive();
        let mut line = serde_json::to_string(event)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(self.file_for(date))?;
        if ends_mid_line(&mut file)? {
            line.insert(0, '\n');
        }
        file.write_all(line.as_bytes())
    }

    /// Audit files with their dates, oldest first. A missing directory has none.
    fn dated_files(&self) -> Vec<(NaiveDate, PathBuf)> {
        let Ok(read_dir) = fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        let mut files: Vec<(NaiveDate, PathBuf)> = read_dir
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name();
                let stem = name
                    .to_str()?
                    .strip_prefix("audit-")?
                    .strip_suffix(".jsonl")?;
                let date = NaiveDate::parse_from_str(stem, "%Y-%m-%d").ok()?;
                Some((date, entry.path()))
            })
            .collect();
        files.sort_by_key(|(date, _)| *date);
        files
    }

    /// Every parsable event within the bounds, oldest first.
    fn load_events(
        &self,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> Vec<AuditEvent> {
        let first_day = since.map(|t| t.with_timezone(&Local).date_naive());
        let last_day = until.map(|t| t.with_timezone(&Local).date_naive());

        let mut events = Vec::new();
        for (date, path) in self.dated_files() {
            if first_day.is_some_and(|d| date < d) || last_day.is_some_and(|d| date > d) {
                continue;
            }
            let content = match fs::read_to_string(&path) {
                Ok(content) => content,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable audit file");
                    continue;
                }
            };
            for (lineno, line) in content.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<AuditEvent>(line) {
                    Ok(event) => events.push(event),
                    Err(e) => debug!(
                        path = %path.display(),
                        line = lineno + 1,
                        error = %e,
                        "skipping unparsable audit line"
                    ),
                }
            }
        }

        events.retain(|e| {
            let ts = e.timestamp();
            since.is_none_or(|s| ts >= s) && until.is_none_or(|u| ts <= u)
        });
        events.sort_by_key(|e| e.timestamp());
        events
    }

    /// Matching events, newest first.
    pub fn read(&self, query: &AuditQuery) -> Vec<AuditEvent> {
        let matcher = query.command_pattern.as_deref().map(CommandMatcher::new);

        let mut events: Vec<AuditEvent> = self
            .load_events(query.since, query.until)
            .into_iter()
            .filter(|e| query.event_type.is_none_or(|t| e.event_type() == t))
            .filter(|e| query.risk_level.is_none_or(|l| e.risk_level() == l))
            .filter(|e| query.status.is_none_or(|s| e.status() == Some(s)))
            .filter(|e| matcher.as_ref().is_none_or(|m| m.matches(e.command())))
            .collect();

        events.reverse();
        if let Some(limit) = query.limit {
            events.truncate(limit);
        }
        events
    }

    pub fn stats(&self, since: Option<DateTime<Utc>>) -> AuditStats {
        let events = self.load_events(since, None);
        let mut stats = AuditStats {
            time_range: TimeRange {
                earliest: events.first().map(AuditEvent::timestamp),
                latest: events.last().map(AuditEvent::timestamp),
            },
            ..AuditStats::default()
        };

        for event in &events {
            match event {
                AuditEvent::Classification(r) => {
                    stats.total_classifications += 1;
                    *stats.by_risk_level.entry(r.risk_level).or_default() += 1;
                }
                AuditEvent::QueueEntry(_) => stats.total_queued += 1,
                AuditEvent::Execution(r) => {
                    stats.total_commands += 1;
                    *stats.by_status.entry(r.status).or_default() += 1;
                }
            }
        }
        stats
    }

    /// Export events oldest-first, to a file or inline.
    pub fn export(&self, options: &ExportOptions) -> Result<ExportSummary> {
        let events = self.load_events(options.since, options.until);
        let data = match options.format {
            ExportFormat::Json => serde_json::to_string_pretty(&events)?,
            ExportFormat::Jsonl => {
                let mut out = String::new();
                for event in &events {
                    out.push_str(&serde_json::to_string(event)?);
                    out.push('\n');
                }
                out
            }
            ExportFormat::Csv => to_csv(&events)?,
        };

        match &options.output {
            Some(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    fs::create_dir_all(parent)?;
                }
                fs::write(path, data)?;
                Ok(ExportSummary {
                    output_file: Some(path.clone()),
                    data: None,
                    entries_count: events.len(),
                })
            }
            None => Ok(ExportSummary {
                output_file: None,
                data: Some(data),
                entries_count: events.len(),
            }),
        }
    }

    /// Audit files, newest first.
    pub fn list_files(&self) -> Result<Vec<AuditFileInfo>> {
        let mut files = Vec::new();
        for (date, path) in self.dated_files().into_iter().rev() {
            let meta = fs::metadata(&path)?;
            files.push(AuditFileInfo {
                date,
                size_bytes: meta.len(),
                modified: meta.modified().map(DateTime::<Utc>::from)?,
            });
        }
        Ok(files)
    }
}

/// True when a torn append left the file without a trailing newline.
fn ends_mid_line(file: &mut File) -> io::Result<bool> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(false);
    }
    file.seek(SeekFrom::Start(len - 1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}

enum CommandMatcher {
    Regex(regex::Regex),
    Substring(String),
}

impl CommandMatcher {
    fn new(pattern: &str) -> Self {
        match RegexBuilder::new(pattern).case_insensitive(true).build() {
            Ok(re) => CommandMatcher::Regex(re),
            Err(_) => CommandMatcher::Substring(pattern.to_lowercase()),
        }
    }

    fn matches(&self, command: &str) -> bool {
        match self {
            CommandMatcher::Regex(re) => re.is_match(command),
            CommandMatcher::Substring(needle) => command.to_lowercase().contains(needle.as_str()),
        }
    }
}

const CSV_HEADER: [&str; 12] = [
    "timestamp",
    "type",
    "command",
    "risk_level",
    "risk_score",
    "status",
    "exit_code",
    "duration_ms",
    "approved_by",
    "queue_id",
    "cwd",
    "user",
];

fn to_csv(events: &[AuditEvent]) -> Result<String> {
    let export_err = |e: csv::Error| SandboxError::Export(e.to_string());

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(CSV_HEADER).map_err(export_err)?;
    for event in events {
        let (score, status, exit_code, duration, approved_by, queue_id, cwd, user) = match event {
            AuditEvent::Classification(r) => (
                r.risk_score,
                String::new(),
                String::new(),
                String::new(),
                String::new(),
                String::new(),
                r.cwd.as_str(),
                r.user.as_str(),
            ),
            AuditEvent::QueueEntry(r) => (
                r.risk_score,
                String::new(),
                String::new(),
                String::new(),
                String::new(),
                r.queue_id.clone(),
                r.cwd.as_str(),
                r.user.as_str(),
            ),
            AuditEvent::Execution(r) => (
                r.risk_score,
                r.status.to_string(),
                r.exit_code.map(|c| c.to_string()).unwrap_or_default(),
                r.duration_ms.to_string(),
                r.approved_by.clone().unwrap_or_default(),
                r.queue_id.clone().unwrap_or_default(),
                r.cwd.as_str(),
                "",
            ),
        };
        writer
            .write_record([
                event.timestamp().to_rfc3339().as_str(),
                event.event_type().to_string().as_str(),
                event.command(),
                event.risk_level().as_str(),
                score.to_string().as_str(),
                status.as_str(),
                exit_code.as_str(),
                duration.as_str(),
                approved_by.as_str(),
                queue_id.as_str(),
                cwd,
                user,
            ])
            .map_err(export_err)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| SandboxError::Export(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| SandboxError::Export(e.to_string()))
}

/// Truncate command output to `EXCERPT_LIMIT` bytes on a char boundary.
pub fn excerpt(text: &str) -> String {
    if text.len() <= EXCERPT_LIMIT {
        return text.to_string();
    }
    let mut end = EXCERPT_LIMIT;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}\n...[truncated]", &text[..end])
}

/// Parse a time bound: RFC 3339, `YYYY-MM-DD` (local midnight), or a relative
/// age such as `30m`, `12h`, `7d`, `2w`.
pub fn parse_time_bound(input: &str) -> Result<DateTime<Utc>> {
    let input = input.trim();
    let invalid = || SandboxError::InvalidArgument(format!("unrecognized time: {input}"));

    if let Ok(ts) = DateTime::parse_from_rfc3339(input) {
        return Ok(ts.with_timezone(&Utc));
    }

    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        let midnight = date.and_hms_opt(0, 0, 0).ok_or_else(invalid)?;
        return Local
            .from_local_datetime(&midnight)
            .earliest()
            .map(|t| t.with_timezone(&Utc))
            .ok_or_else(invalid);
    }

    let split = input.len().saturating_sub(1);
    let (amount, unit) = (input.get(..split).ok_or_else(invalid)?, input.get(split..));
    let amount: i64 = amount.parse().map_err(|_| invalid())?;
    let age = match unit {
        Some("m") => Duration::try_minutes(amount),
        Some("h") => Duration::try_hours(amount),
        Some("d") => Duration::try_days(amount),
        Some("w") => Duration::try_weeks(amount),
        _ => None,
    }
    .ok_or_else(invalid)?;
    Utc::now().checked_sub_signed(age).ok_or_else(invalid)
}
