//! Ingest progress reporting.
//!
//! The pipeline reports what it is doing as [`IngestProgressEvent`]s. The CLI
//! writes them to **stderr** (human lines or JSON lines) so stdout stays
//! parseable; the HTTP trigger forwards them to the client through a channel.

use std::io::Write;

use serde::Serialize;
use tokio::sync::mpsc;

use crate::path::Level;

/// A single progress event for an ingest run.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum IngestProgressEvent {
    /// Lettercodes chosen for this run.
    Selected { lettercodes: Vec<String>, live: bool },
    LevelStarted { lettercode: String, level: Level },
    /// A level is done: `documents` canonicalized, `failed` refused by the index.
    LevelFinished {
        lettercode: String,
        level: Level,
        documents: u64,
        failed: u64,
    },
    /// Backpressure pause before the next level.
    Pausing {
        lettercode: String,
        level: Level,
        seconds: u64,
    },
    Finished {
        lettercodes: usize,
        documents: u64,
        failed: u64,
        cancelled: bool,
    },
}

/// Reports ingest progress. Called from the pipeline's controlling task.
pub trait IngestProgressReporter: Send + Sync {
    fn report(&self, event: IngestProgressEvent);
}

/// Human-friendly progress on stderr: "ingest ADM  Piece  12,345 documents".
pub struct StderrProgress;

impl IngestProgressReporter for StderrProgress {
    fn report(&self, event: IngestProgressEvent) {
        let line = match &event {
            IngestProgressEvent::Selected { lettercodes, live } => format!(
                "ingest  {} lettercode(s){}\n",
                format_number(lettercodes.len() as u64),
                if *live { "" } else { "  (dry run)" }
            ),
            IngestProgressEvent::LevelStarted { lettercode, level } => {
                format!("ingest {}  {}  ...\n", lettercode, level)
            }
            IngestProgressEvent::LevelFinished {
                lettercode,
                level,
                documents,
                failed,
            } => {
                if *failed > 0 {
                    format!(
                        "ingest {}  {}  {} documents, {} failed\n",
                        lettercode,
                        level,
                        format_number(*documents),
                        format_number(*failed)
                    )
                } else {
                    format!(
                        "ingest {}  {}  {} documents\n",
                        lettercode,
                        level,
                        format_number(*documents)
                    )
                }
            }
            IngestProgressEvent::Pausing {
                lettercode,
                level,
                seconds,
            } => format!("ingest {}  {}  pausing {}s\n", lettercode, level, seconds),
            IngestProgressEvent::Finished {
                lettercodes,
                documents,
                failed,
                cancelled,
            } => format!(
                "ingest {}  {} lettercode(s), {} documents, {} failed\n",
                if *cancelled { "cancelled" } else { "done" },
                lettercodes,
                format_number(*documents),
                format_number(*failed)
            ),
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl IngestProgressReporter for JsonProgress {
    fn report(&self, event: IngestProgressEvent) {
        if let Ok(line) = serde_json::to_string(&event) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl IngestProgressReporter for NoProgress {
    fn report(&self, _event: IngestProgressEvent) {}
}

/// Forwards events to a channel. A closed receiver drops events silently.
pub struct ChannelProgress {
    tx: mpsc::UnboundedSender<IngestProgressEvent>,
}

impl ChannelProgress {
    pub fn new(tx: mpsc::UnboundedSender<IngestProgressEvent>) -> Self {
        Self { tx }
    }
}

impl IngestProgressReporter for ChannelProgress {
    fn report(&self, event: IngestProgressEvent) {
        let _ = self.tx.send(event);
    }
}

pub fn format_number(n: u64) -> String {
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

    pub fn reporter(&self) -> Box<dyn IngestProgressReporter> {
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
    fn events_serialize_with_tag() {
        let event = IngestProgressEvent::LevelFinished {
            lettercode: "ADM".to_string(),
            level: Level::Piece,
            documents: 10,
            failed: 0,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "level_finished");
        assert_eq!(json["level"], "Piece");
        assert_eq!(json["documents"], 10);
    }

    #[test]
    fn channel_reporter_forwards_and_tolerates_closed_receiver() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let reporter = ChannelProgress::new(tx);
        reporter.report(IngestProgressEvent::LevelStarted {
            lettercode: "AB".to_string(),
            level: Level::Item,
        });
        assert!(matches!(
            rx.try_recv(),
            Ok(IngestProgressEvent::LevelStarted { .. })
        ));
        drop(rx);
        reporter.report(IngestProgressEvent::LevelStarted {
            lettercode: "AB".to_string(),
            level: Level::Item,
        });
    }
}
