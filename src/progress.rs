//! Load progress reporting.
//!
//! Reports the sync controller's phases during `stash list` so users see
//! the fast first page arrive and the full set follow. Progress is emitted
//! on **stderr** so stdout remains parseable for scripts.

use std::io::Write;

/// A single progress event for a load.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoadProgressEvent {
    /// The bounded newest-first fetch was issued.
    InitialLoading { limit: usize },
    /// The bounded fetch landed; `n` records are visible.
    InitialLoaded { n: usize },
    /// The unbounded fetch was issued.
    BackgroundLoading,
    /// The full set landed.
    FullyLoaded { total: usize },
    /// A fetch failed without invalidating the session.
    Failed { phase: &'static str, message: String },
}

/// Reports load progress. Implementations write to stderr (human or JSON).
pub trait LoadProgressReporter: Send + Sync {
    fn report(&self, event: LoadProgressEvent);
}

/// Human-friendly progress on stderr: "load  full  1,234 records".
pub struct StderrProgress;

impl LoadProgressReporter for StderrProgress {
    fn report(&self, event: LoadProgressEvent) {
        let line = match &event {
            LoadProgressEvent::InitialLoading { limit } => {
                format!("load  newest {}...\n", limit)
            }
            LoadProgressEvent::InitialLoaded { n } => {
                format!("load  first page  {} records\n", format_number(*n as u64))
            }
            LoadProgressEvent::BackgroundLoading => "load  fetching everything...\n".to_string(),
            LoadProgressEvent::FullyLoaded { total } => {
                format!("load  full  {} records\n", format_number(*total as u64))
            }
            LoadProgressEvent::Failed { phase, message } => {
                format!("load  {} failed: {}\n", phase, message)
            }
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl LoadProgressReporter for JsonProgress {
    fn report(&self, event: LoadProgressEvent) {
        let obj = match &event {
            LoadProgressEvent::InitialLoading { limit } => serde_json::json!({
                "event": "progress",
                "phase": "initial_loading",
                "limit": limit
            }),
            LoadProgressEvent::InitialLoaded { n } => serde_json::json!({
                "event": "progress",
                "phase": "initial_loaded",
                "n": n
            }),
            LoadProgressEvent::BackgroundLoading => serde_json::json!({
                "event": "progress",
                "phase": "background_loading"
            }),
            LoadProgressEvent::FullyLoaded { total } => serde_json::json!({
                "event": "progress",
                "phase": "fully_loaded",
                "total": total
            }),
            LoadProgressEvent::Failed { phase, message } => serde_json::json!({
                "event": "error",
                "phase": phase,
                "message": message
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl LoadProgressReporter for NoProgress {
    fn report(&self, _event: LoadProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    /// Parses `--progress`; `None` picks [`default_for_tty`](Self::default_for_tty).
    pub fn from_flag(flag: Option<&str>) -> anyhow::Result<Self> {
        match flag {
            None => Ok(Self::default_for_tty()),
            Some("off") => Ok(ProgressMode::Off),
            Some("human") => Ok(ProgressMode::Human),
            Some("json") => Ok(ProgressMode::Json),
            Some(other) => anyhow::bail!(
                "Unknown progress mode: '{}'. Must be off, human, or json.",
                other
            ),
        }
    }

    pub fn reporter(&self) -> Box<dyn LoadProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
