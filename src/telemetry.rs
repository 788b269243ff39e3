use std::collections::{BTreeSet, HashMap};
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::config::{AppConfig, AppPaths};

pub fn unix_ms_now() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
}

/// One JSONL line. `team` and `agent` are set for events raised inside a
/// group chat and left out for command-level events.
#[derive(Debug, Serialize)]
struct TelemetryRecord<'a> {
    ts_unix_ms: u128,
    event: &'a str,
    run_id: &'a str,
    command: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    team: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    agent: Option<&'a str>,
    #[serde(flatten)]
    fields: Map<String, Value>,
}

/// Appends run events to a JSONL file. Clones share one file handle, opened on
/// the first write.
#[derive(Debug, Clone)]
pub struct TelemetrySink {
    pub enabled: bool,
    pub path: PathBuf,
    pub run_id: String,
    pub command: String,
    file: Arc<Mutex<Option<File>>>,
}

impl TelemetrySink {
    pub fn new(cfg: &AppConfig, paths: &AppPaths, command: impl Into<String>) -> Self {
        Self::with_path(cfg.telemetry.enabled, paths.telemetry_path(cfg), command)
    }

    pub fn with_path(enabled: bool, path: PathBuf, command: impl Into<String>) -> Self {
        Self {
            enabled,
            path,
            run_id: format!("run-{}-{}", unix_ms_now(), std::process::id()),
            command: command.into(),
            file: Arc::new(Mutex::new(None)),
        }
    }

    pub fn disabled() -> Self {
        Self::with_path(false, PathBuf::new(), "")
    }

    /// Records a command-level event.
    pub fn emit(&self, event: &str, payload: Value) {
        self.record(event, None, None, payload);
    }

    /// Records an event raised by `agent`, optionally inside `team`.
    pub fn emit_agent(&self, event: &str, team: Option<&str>, agent: &str, payload: Value) {
        self.record(event, team, Some(agent), payload);
    }

    fn record(&self, event: &str, team: Option<&str>, agent: Option<&str>, payload: Value) {
        if !self.enabled {
            return;
        }
        let fields = match payload {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        let record = TelemetryRecord {
            ts_unix_ms: unix_ms_now(),
            event,
            run_id: &self.run_id,
            command: &self.command,
            team,
            agent,
            fields,
        };
        if let Err(err) = self.write_record(&record) {
            tracing::warn!(
                event,
                path = %self.path.display(),
                error = %err,
                "telemetry write failed"
            );
        }
    }

    fn write_record(&self, record: &TelemetryRecord<'_>) -> Result<()> {
        let mut line = serde_json::to_vec(record)
            .with_context(|| format!("failed to serialize telemetry event '{}'", record.event))?;
        line.push(b'\n');

        let mut file = self.file.lock().unwrap_or_else(|e| e.into_inner());
        if file.is_none() {
            *file = Some(open_append(&self.path)?);
        }
        if let Some(handle) = file.as_mut() {
            handle
                .write_all(&line)
                .with_context(|| format!("failed to append to '{}'", self.path.display()))?;
        }
        Ok(())
    }
}

fn open_append(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create telemetry directory '{}'", parent.display()))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open telemetry path '{}'", path.display()))
}

#[derive(Debug, Default)]
pub struct TelemetrySummary {
    pub total_lines: usize,
    pub parsed_events: usize,
    pub parse_errors: usize,
    pub unique_runs: BTreeSet<String>,
    pub command_counts: HashMap<String, usize>,
    pub speaker_counts: HashMap<String, usize>,
    pub command_completed: usize,
    pub command_failed: usize,
    pub tool_requested: usize,
    pub tool_succeeded: usize,
    pub tool_failed: usize,
    pub team_completed: usize,
    pub last_event_ts_unix_ms: Option<u128>,
}

/// Summarises the most recent `limit` lines of a telemetry file.
pub fn summarize_telemetry_lines(lines: Vec<String>, limit: usize) -> TelemetrySummary {
    let mut summary = TelemetrySummary::default();
    let max_events = limit.max(1);
    summary.total_lines = lines.len();

    for line in lines.into_iter().rev().take(max_events) {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let parsed = match serde_json::from_str::<Value>(line) {
            Ok(value) => value,
            Err(_) => {
                summary.parse_errors += 1;
                continue;
            }
        };

        summary.parsed_events += 1;

        if let Some(run_id) = parsed.get("run_id").and_then(Value::as_str)
            && !run_id.is_empty()
        {
            summary.unique_runs.insert(run_id.to_string());
        }

        if let Some(command) = parsed.get("command").and_then(Value::as_str)
            && !command.is_empty()
        {
            *summary
                .command_counts
                .entry(command.to_string())
                .or_insert(0) += 1;
        }

        if let Some(ts) = parsed.get("ts_unix_ms").and_then(Value::as_u64) {
            let ts_u128 = ts as u128;
            summary.last_event_ts_unix_ms = Some(
                summary
                    .last_event_ts_unix_ms
                    .map(|existing| existing.max(ts_u128))
                    .unwrap_or(ts_u128),
            );
        }

        match parsed
            .get("event")
            .and_then(Value::as_str)
            .unwrap_or_default()
        {
            "command.completed" => summary.command_completed += 1,
            "command.failed" => summary.command_failed += 1,
            "tool.requested" => summary.tool_requested += 1,
            "tool.succeeded" => summary.tool_succeeded += 1,
            "tool.failed" => summary.tool_failed += 1,
            "team.completed" => summary.team_completed += 1,
            "speaker.selected" => {
                if let Some(speaker) = parsed.get("agent").and_then(Value::as_str) {
                    *summary
                        .speaker_counts
                        .entry(speaker.to_string())
                        .or_insert(0) += 1;
                }
            }
            _ => {}
        }
    }

    summary
}

fn top_counts(counts: &HashMap<String, usize>) -> Vec<(&String, &usize)> {
    let mut sorted = counts.iter().collect::<Vec<_>>();
    sorted.sort_by_key(|(name, count)| (std::cmp::Reverse(**count), (*name).clone()));
    sorted
}

pub fn run_telemetry_report(path: &Path, limit: usize) -> Result<()> {
    if !path.exists() {
        println!("No telemetry file found at '{}'.", path.display());
        return Ok(());
    }

    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open telemetry file '{}'", path.display()))?;
    let reader = io::BufReader::new(file);
    let lines = reader
        .lines()
        .collect::<std::result::Result<Vec<String>, std::io::Error>>()
        .with_context(|| format!("failed to read telemetry file '{}'", path.display()))?;

    let summary = summarize_telemetry_lines(lines, limit);

    println!("Telemetry report");
    println!("Path: {}", path.display());
    println!("Lines in file: {}", summary.total_lines);
    println!(
        "Events analyzed: {} (parse_errors={})",
        summary.parsed_events, summary.parse_errors
    );
    println!("Unique runs: {}", summary.unique_runs.len());
    println!(
        "Command outcomes: completed={} failed={}",
        summary.command_completed, summary.command_failed
    );
    println!("Team runs completed: {}", summary.team_completed);
    println!(
        "Tool lifecycle: requested={} succeeded={} failed={}",
        summary.tool_requested, summary.tool_succeeded, summary.tool_failed
    );

    let commands = top_counts(&summary.command_counts);
    if !commands.is_empty() {
        println!("Top commands:");
        for (name, count) in commands.into_iter().take(5) {
            println!("- {}: {}", name, count);
        }
    }

    let speakers = top_counts(&summary.speaker_counts);
    if !speakers.is_empty() {
        println!("Most selected speakers:");
        for (name, count) in speakers.into_iter().take(5) {
            println!("- {}: {}", name, count);
        }
    }

    if let Some(last_ts) = summary.last_event_ts_unix_ms {
        println!("Last event ts_unix_ms: {last_ts}");
    }

    Ok(())
}
