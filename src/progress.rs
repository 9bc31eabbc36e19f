//! Stage progress reporting.
//!
//! Reports observable progress while a stage works through its items so
//! users see how much is left. Progress is emitted on **stderr** so stdout
//! remains parseable for scripts.

use std::io::Write;
use std::str::FromStr;

/// A single progress event for a stage.
#[derive(Clone, Debug)]
pub enum StageProgressEvent {
    /// The stage is still discovering its inputs. Total unknown.
    Discovering { stage: String },
    /// `done` of `total` items finished, `failed` of them unsuccessfully.
    Processing {
        stage: String,
        done: u64,
        failed: u64,
        total: u64,
    },
}

/// Reports stage progress. Implementations write to stderr (human or JSON).
pub trait StageProgressReporter: Send + Sync {
    /// Emit a progress event. Called from pool workers, possibly concurrently.
    fn report(&self, event: StageProgressEvent);
}

/// Human-friendly progress on stderr: "extract  processing  1,234 / 5,000 items (2 failed)".
pub struct StderrProgress;

impl StageProgressReporter for StderrProgress {
    fn report(&self, event: StageProgressEvent) {
        let line = match &event {
            StageProgressEvent::Discovering { stage } => format!("{}  discovering...\n", stage),
            StageProgressEvent::Processing {
                stage,
                done,
                failed,
                total,
            } => {
                let mut line = format!(
                    "{}  processing  {} / {} items",
                    stage,
                    group_digits(*done),
                    group_digits(*total)
                );
                if *failed > 0 {
                    line.push_str(&format!(" ({} failed)", group_digits(*failed)));
                }
                line.push('\n');
                line
            }
        };
        let mut err = std::io::stderr().lock();
        let _ = err.write_all(line.as_bytes());
        let _ = err.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl StageProgressReporter for JsonProgress {
    fn report(&self, event: StageProgressEvent) {
        let obj = match &event {
            StageProgressEvent::Discovering { stage } => serde_json::json!({
                "event": "progress",
                "stage": stage,
                "phase": "discovering"
            }),
            StageProgressEvent::Processing {
                stage,
                done,
                failed,
                total,
            } => serde_json::json!({
                "event": "progress",
                "stage": stage,
                "phase": "processing",
                "done": done,
                "failed": failed,
                "total": total
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut err = std::io::stderr().lock();
            let _ = writeln!(err, "{}", line);
            let _ = err.flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl StageProgressReporter for NoProgress {
    fn report(&self, _event: StageProgressEvent) {}
}

/// `1234567` → `1,234,567`.
fn group_digits(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
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

    /// Build a reporter for this mode.
    pub fn reporter(&self) -> Box<dyn StageProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

impl FromStr for ProgressMode {
    type Err = String;

    /// `auto` resolves against the terminal at parse time.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(ProgressMode::default_for_tty()),
            "human" => Ok(ProgressMode::Human),
            "json" => Ok(ProgressMode::Json),
            "off" | "none" => Ok(ProgressMode::Off),
            other => Err(format!(
                "unknown progress mode '{}'. Expected auto, human, json or off",
                other
            )),
        }
    }
}
