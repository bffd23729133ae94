//! Mining progress reporting.
//!
//! Reports observable progress during `cmine mine` so users see which note
//! is being processed and how many are left. Progress goes to **stderr** so
//! stdout stays parseable for scripts.

use std::io::Write;

/// A single progress event for a mining run.
#[derive(Clone, Debug, PartialEq)]
pub enum MineProgressEvent {
    /// Walking the notes directory. Total unknown.
    Scanning { root: String },
    /// `n` of `total` notes have been through extraction.
    Extracting {
        n: u64,
        total: u64,
        path: String,
        concepts: u64,
    },
    /// Rebuilding the similarity network.
    Weaving { concepts: u64 },
}

/// Receives progress events from the mining pipeline.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: MineProgressEvent);
}

/// Human-friendly lines: "mine  extracting  12 / 1,024 notes  til/rust.md (+2)".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: MineProgressEvent) {
        let line = match &event {
            MineProgressEvent::Scanning { root } => format!("mine  scanning {}...\n", root),
            MineProgressEvent::Extracting {
                n,
                total,
                path,
                concepts,
            } => format!(
                "mine  extracting  {} / {} notes  {} (+{})\n",
                format_number(*n),
                format_number(*total),
                path,
                concepts
            ),
            MineProgressEvent::Weaving { concepts } => {
                format!("mine  weaving {} concepts...\n", format_number(*concepts))
            }
        };
        let mut err = std::io::stderr().lock();
        let _ = err.write_all(line.as_bytes());
        let _ = err.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl JsonProgress {
    fn to_json(event: &MineProgressEvent) -> serde_json::Value {
        match event {
            MineProgressEvent::Scanning { root } => serde_json::json!({
                "event": "progress",
                "phase": "scanning",
                "root": root
            }),
            MineProgressEvent::Extracting {
                n,
                total,
                path,
                concepts,
            } => serde_json::json!({
                "event": "progress",
                "phase": "extracting",
                "n": n,
                "total": total,
                "path": path,
                "concepts": concepts
            }),
            MineProgressEvent::Weaving { concepts } => serde_json::json!({
                "event": "progress",
                "phase": "weaving",
                "concepts": concepts
            }),
        }
    }
}

impl ProgressReporter for JsonProgress {
    fn report(&self, event: MineProgressEvent) {
        if let Ok(line) = serde_json::to_string(&Self::to_json(&event)) {
            let mut err = std::io::stderr().lock();
            let _ = writeln!(err, "{}", line);
            let _ = err.flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: MineProgressEvent) {}
}

pub(crate) fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_number_comma() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }

    #[test]
    fn json_events_carry_phase() {
        let v = JsonProgress::to_json(&MineProgressEvent::Extracting {
            n: 1,
            total: 3,
            path: "a.md".into(),
            concepts: 2,
        });
        assert_eq!(v["phase"], "extracting");
        assert_eq!(v["total"], 3);
        assert_eq!(v["path"], "a.md");
    }
}
