//! Structured logging for the dashboard pipeline.
//!
//! Every record is one JSON line carrying a timestamp, a run id, a sequence
//! number, a level and a domain. Records are written to stderr and, when
//! `BATCHVIEW_LOG_DIR` is set, appended to `<dir>/<run_id>/events.jsonl`.
//!
//! Filters:
//! - `LOG_LEVEL`: minimum level (`trace` .. `fatal`, default `info`)
//! - `LOG_DOMAINS`: comma-separated domains or `all`
//! - `PROFILE_SAMPLE`: fraction of [`ProfileScope`]s that report

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fs::{create_dir_all, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::Instant;

// =============================================================================
// Log Levels
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
    Fatal = 5,
}

impl Level {
    pub fn from_env() -> Self {
        match std::env::var("LOG_LEVEL").as_deref() {
            Ok("trace") => Level::Trace,
            Ok("debug") => Level::Debug,
            Ok("info") => Level::Info,
            Ok("warn") => Level::Warn,
            Ok("error") => Level::Error,
            Ok("fatal") => Level::Fatal,
            _ => Level::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Fatal => "fatal",
        }
    }
}

// =============================================================================
// Log Domains
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Registry, // Folder scans, upload listings
    Cache,    // Upload merge/clear
    Loader,   // Decode, memo hits
    Filter,   // Time windows, down-sampling
    Chart,    // Axis resolution, chart specs
    Session,  // Selection, mode switches
    Render,   // One interaction pass
    Profile,  // Timings
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Registry => "registry",
            Domain::Cache => "cache",
            Domain::Loader => "loader",
            Domain::Filter => "filter",
            Domain::Chart => "chart",
            Domain::Session => "session",
            Domain::Render => "render",
            Domain::Profile => "profile",
        }
    }

    pub fn is_enabled(&self) -> bool {
        match std::env::var("LOG_DOMAINS").as_deref() {
            Ok("all") | Err(_) => true,
            Ok(domains) => domains.split(',').any(|d| d.trim() == self.as_str()),
        }
    }
}

// =============================================================================
// Run context
// =============================================================================

static LOG_SEQ: AtomicU64 = AtomicU64::new(0);
static PROFILE_SEQ: AtomicU64 = AtomicU64::new(0);
static RUN_CONTEXT: OnceLock<RunContext> = OnceLock::new();

fn next_seq() -> u64 {
    LOG_SEQ.fetch_add(1, Ordering::SeqCst)
}

#[derive(Debug)]
struct RunContext {
    run_id: String,
    events: Option<Mutex<BufWriter<File>>>,
}

fn ensure_run_context() -> &'static RunContext {
    RUN_CONTEXT.get_or_init(|| {
        let run_id = std::env::var("RUN_ID")
            .unwrap_or_else(|_| format!("r-{}-{}", ts_epoch_ms(), process::id()));
        let events = std::env::var("BATCHVIEW_LOG_DIR")
            .ok()
            .and_then(|base| open_events_file(PathBuf::from(base).join(&run_id)));
        RunContext {
            run_id,
            events: events.map(|f| Mutex::new(BufWriter::new(f))),
        }
    })
}

fn open_events_file(run_dir: PathBuf) -> Option<File> {
    if let Err(err) = create_dir_all(&run_dir) {
        eprintln!("[log] failed to create run dir {}: {}", run_dir.display(), err);
        return None;
    }
    match File::create(run_dir.join("events.jsonl")) {
        Ok(file) => Some(file),
        Err(err) => {
            eprintln!("[log] failed to create events log: {}", err);
            None
        }
    }
}

fn split_fields(mut fields: Map<String, Value>) -> (Map<String, Value>, Map<String, Value>) {
    let mut top = Map::new();
    for key in ["dataset", "session", "msg"] {
        if let Some(value) = fields.remove(key) {
            top.insert(key.to_string(), value);
        }
    }
    (top, fields)
}

fn write_line(writer: &Mutex<BufWriter<File>>, line: &str) {
    if let Ok(mut w) = writer.lock() {
        let _ = writeln!(w, "{}", line);
        let _ = w.flush();
    }
}

// =============================================================================
// Core logging functions
// =============================================================================

/// RFC3339 timestamp with milliseconds
pub fn ts_now() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

pub fn ts_epoch_ms() -> u64 {
    Utc::now().timestamp_millis() as u64
}

/// Emit a structured log entry
pub fn log(level: Level, domain: Domain, event: &str, fields: Map<String, Value>) {
    let min_level = Level::from_env();
    if level < min_level || !domain.is_enabled() {
        return;
    }
    emit_record(level, domain.as_str(), event, fields);
}

pub fn info(domain: Domain, event: &str, fields: Map<String, Value>) {
    log(Level::Info, domain, event, fields);
}

pub fn debug(domain: Domain, event: &str, fields: Map<String, Value>) {
    log(Level::Debug, domain, event, fields);
}

pub fn warn(domain: Domain, event: &str, fields: Map<String, Value>) {
    log(Level::Warn, domain, event, fields);
}

fn build_record(level: Level, component: &str, event: &str, fields: Map<String, Value>) -> Value {
    let ctx = ensure_run_context();
    let (mut top, data) = split_fields(fields);

    let msg = top.remove("msg").unwrap_or(Value::String(String::new()));
    let mut entry = Map::new();
    entry.insert("ts".to_string(), json!(ts_now()));
    entry.insert("run_id".to_string(), json!(ctx.run_id.clone()));
    entry.insert("seq".to_string(), json!(next_seq()));
    entry.insert("lvl".to_string(), json!(level.as_str().to_uppercase()));
    entry.insert("component".to_string(), json!(component));
    entry.insert("event".to_string(), json!(event));
    entry.insert("msg".to_string(), msg);
    for (k, v) in top {
        entry.insert(k, v);
    }
    entry.insert("data".to_string(), Value::Object(data));
    Value::Object(entry)
}

fn emit_record(level: Level, component: &str, event: &str, fields: Map<String, Value>) {
    let line = build_record(level, component, event, fields).to_string();
    if let Some(events) = &ensure_run_context().events {
        write_line(events, &line);
    }
    eprintln!("{}", line);
}

// =============================================================================
// Domain-Specific Logging Helpers
// =============================================================================

pub fn log_folder_scan(folder: &str, status: &str, matches: usize) {
    log(
        Level::Debug,
        Domain::Registry,
        "folder_scan",
        obj(&[
            ("folder", v_str(folder)),
            ("status", v_str(status)),
            ("matches", json!(matches)),
        ]),
    );
}

pub fn log_cache_merge(added: usize, replaced: usize, count: usize, total_bytes: u64) {
    log(
        Level::Info,
        Domain::Cache,
        "merge",
        obj(&[
            ("added", json!(added)),
            ("replaced", json!(replaced)),
            ("count", json!(count)),
            ("total_bytes", json!(total_bytes)),
        ]),
    );
}

pub fn log_decode(dataset: &str, key: &str, rows: usize, columns: usize, indexed: bool) {
    log(
        Level::Info,
        Domain::Loader,
        "decoded",
        obj(&[
            ("dataset", v_str(dataset)),
            ("key", v_str(key)),
            ("rows", json!(rows)),
            ("columns", json!(columns)),
            ("datetime_index", Value::Bool(indexed)),
        ]),
    );
}

pub fn log_decode_failure(dataset: &str, reason: &str) {
    log(
        Level::Warn,
        Domain::Loader,
        "decode_failed",
        obj(&[("dataset", v_str(dataset)), ("reason", v_str(reason))]),
    );
}

pub fn log_window(dataset: &str, rows: usize, total_rows: usize, full_range: bool) {
    log(
        Level::Debug,
        Domain::Filter,
        "window_applied",
        obj(&[
            ("dataset", v_str(dataset)),
            ("rows", json!(rows)),
            ("total_rows", json!(total_rows)),
            ("full_range", Value::Bool(full_range)),
        ]),
    );
}

pub fn log_pruned(reason: &str, removed: &[String]) {
    if removed.is_empty() {
        return;
    }
    log(
        Level::Info,
        Domain::Session,
        "selection_pruned",
        obj(&[
            ("reason", v_str(reason)),
            (
                "removed",
                Value::Array(removed.iter().map(|s| v_str(s)).collect()),
            ),
        ]),
    );
}

// =============================================================================
// Utility Functions
// =============================================================================

pub fn obj(pairs: &[(&str, Value)]) -> Map<String, Value> {
    let mut map = Map::new();
    for (k, v) in pairs {
        map.insert((*k).to_string(), v.clone());
    }
    map
}

pub fn v_str(s: &str) -> Value {
    Value::String(s.to_string())
}

pub fn v_num(n: f64) -> Value {
    json!(n)
}

// =============================================================================
// Profiling Scope
// =============================================================================

/// Profiling scope that emits structured timing on drop.
pub struct ProfileScope {
    label: &'static str,
    context: Option<Map<String, Value>>,
    started: Instant,
    enabled: bool,
}

impl ProfileScope {
    pub fn with_context(label: &'static str, fields: &[(&str, Value)]) -> Self {
        let enabled = Self::should_sample();
        Self {
            label,
            context: if enabled { Some(obj(fields)) } else { None },
            started: Instant::now(),
            enabled,
        }
    }

    fn should_sample() -> bool {
        std::env::var("PROFILE_SAMPLE")
            .ok()
            .and_then(|v| v.parse::<f64>().ok())
            .map(|p| {
                if p >= 1.0 {
                    true
                } else if p <= 0.0 {
                    false
                } else {
                    let seq = PROFILE_SEQ.fetch_add(1, Ordering::SeqCst);
                    let bucket = (seq % 10_000) as f64 / 10_000.0;
                    bucket < p
                }
            })
            .unwrap_or(true)
    }
}

impl Drop for ProfileScope {
    fn drop(&mut self) {
        if !self.enabled {
            return;
        }
        let elapsed_ms = self.started.elapsed().as_secs_f64() * 1000.0;
        let mut fields = self.context.take().unwrap_or_default();
        fields.insert("label".to_string(), v_str(self.label));
        fields.insert("elapsed_ms".to_string(), v_num(elapsed_ms));
        log(Level::Trace, Domain::Profile, "profile", fields);
    }
}

// =============================================================================
// Tests
// =============================================================================
