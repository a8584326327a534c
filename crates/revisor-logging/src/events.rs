use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

/// Structured log events for one revision run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LogEvent {
    RevisionStarted {
        request_id: String,
        question: String,
        language: String,
    },
    RoleStarted {
        request_id: String,
        step: usize,
        role: String,
        target: String,
    },
    RoleCompleted {
        request_id: String,
        step: usize,
        role: String,
        summary: String,
        duration_secs: f64,
    },
    RoleRetried {
        request_id: String,
        role: String,
        attempt: u32,
        reason: String,
    },
    ScoreRecorded {
        request_id: String,
        target: String,
        dimension: String,
        score: u8,
    },
    AggregateComputed {
        request_id: String,
        target: String,
        semantic: u8,
        contextual: u8,
        aggregate: u8,
    },
    RevisionCapReached {
        request_id: String,
        revisions: u32,
    },
    RevisionCompleted {
        request_id: String,
        outcome: String,
        revisions: u32,
        previous_score: Option<u8>,
        new_score: Option<u8>,
        justification: Option<String>,
        /// Absent when the backend does not report usage
        #[serde(default, skip_serializing_if = "Option::is_none")]
        prompt_tokens: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        completion_tokens: Option<u64>,
        duration_secs: f64,
    },
    RevisionFailed {
        request_id: String,
        error: String,
        duration_secs: f64,
    },
}

impl LogEvent {
    /// Add a timestamp to serialize with the event
    fn with_timestamp(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or_default();
        if let Some(obj) = value.as_object_mut() {
            obj.insert(
                "timestamp".to_string(),
                serde_json::Value::String(chrono::Utc::now().to_rfc3339()),
            );
        }
        value
    }

    fn request_id(&self) -> &str {
        match self {
            LogEvent::RevisionStarted { request_id, .. }
            | LogEvent::RoleStarted { request_id, .. }
            | LogEvent::RoleCompleted { request_id, .. }
            | LogEvent::RoleRetried { request_id, .. }
            | LogEvent::ScoreRecorded { request_id, .. }
            | LogEvent::AggregateComputed { request_id, .. }
            | LogEvent::RevisionCapReached { request_id, .. }
            | LogEvent::RevisionCompleted { request_id, .. }
            | LogEvent::RevisionFailed { request_id, .. } => request_id,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable format with colors and visual structure
    #[default]
    Pretty,
    /// JSON lines format for machine consumption
    Json,
    /// Compact single-line format
    Compact,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            "compact" => Ok(LogFormat::Compact),
            _ => Err(format!("Unknown log format: {}", s)),
        }
    }
}

/// Logger for revision events - handles both console output and file logging
pub struct Logger {
    format: LogFormat,
    console: bool,
    file_writer: Option<Mutex<File>>,
}

impl Logger {
    pub fn new(format: LogFormat) -> Self {
        Self {
            format,
            console: true,
            file_writer: None,
        }
    }

    /// A logger that drops every event
    pub fn silent() -> Self {
        Self {
            format: LogFormat::Compact,
            console: false,
            file_writer: None,
        }
    }

    /// Create a logger with file output in addition to console
    pub fn with_file(format: LogFormat, log_path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)?;

        Ok(Self {
            format,
            console: true,
            file_writer: Some(Mutex::new(file)),
        })
    }

    pub fn log(&self, event: &LogEvent) {
        // File output is always JSON
        if let Some(ref writer) = self.file_writer {
            if let Ok(mut file) = writer.lock() {
                let json = event.with_timestamp();
                let _ = writeln!(file, "{}", json);
            }
        }

        if !self.console {
            return;
        }

        match self.format {
            LogFormat::Json => self.log_json(event),
            LogFormat::Pretty => self.log_pretty(event),
            LogFormat::Compact => self.log_compact(event),
        }
    }

    fn log_json(&self, event: &LogEvent) {
        let _ = writeln!(std::io::stderr(), "{}", event.with_timestamp());
    }

    fn log_pretty(&self, event: &LogEvent) {
        let mut stderr = std::io::stderr();
        let tag = format!("[{}]", short_id(event.request_id())).dimmed();
        match event {
            LogEvent::RevisionStarted {
                question, language, ..
            } => {
                let _ = writeln!(stderr);
                let _ = writeln!(
                    stderr,
                    "{} {} {}",
                    tag,
                    "REVISION".bright_blue().bold(),
                    format!("({})", language).dimmed()
                );
                let _ = writeln!(stderr, "{}   {}", tag, truncate(question, 100).dimmed());
            }
            LogEvent::RoleStarted {
                step, role, target, ..
            } => {
                let _ = writeln!(
                    stderr,
                    "{}   {} {} {}",
                    tag,
                    format!("{:>2}", step + 1).dimmed(),
                    role.to_uppercase().bright_cyan().bold(),
                    format!("[{}]", target).dimmed()
                );
            }
            LogEvent::RoleCompleted {
                summary,
                duration_secs,
                ..
            } => {
                let _ = writeln!(
                    stderr,
                    "{}      {} {} {}",
                    tag,
                    "✓".bright_green(),
                    summary,
                    format!("({:.1}s)", duration_secs).dimmed()
                );
            }
            LogEvent::RoleRetried {
                role,
                attempt,
                reason,
                ..
            } => {
                let _ = writeln!(
                    stderr,
                    "{}      {} {} attempt {} failed: {}",
                    tag,
                    "↻".bright_yellow(),
                    role,
                    attempt,
                    truncate(reason, 120).yellow()
                );
            }
            LogEvent::ScoreRecorded {
                target,
                dimension,
                score,
                ..
            } => {
                let _ = writeln!(
                    stderr,
                    "{}      {} {} {}: {}/5",
                    tag,
                    "•".dimmed(),
                    target,
                    dimension,
                    score
                );
            }
            LogEvent::AggregateComputed {
                target,
                semantic,
                contextual,
                aggregate,
                ..
            } => {
                let _ = writeln!(
                    stderr,
                    "{}      {} {} score {}/10 (semantic {}, contextual {})",
                    tag,
                    "Σ".bright_magenta(),
                    target,
                    aggregate.to_string().bold(),
                    semantic,
                    contextual
                );
            }
            LogEvent::RevisionCapReached { revisions, .. } => {
                let _ = writeln!(
                    stderr,
                    "{}   {} Revision cap reached after {} rewrite(s)",
                    tag,
                    "⚠".bright_yellow(),
                    revisions
                );
            }
            LogEvent::RevisionCompleted {
                outcome,
                revisions,
                prompt_tokens,
                completion_tokens,
                duration_secs,
                ..
            } => {
                let styled = if outcome == "do_not_answer" {
                    format!("→ {}", outcome).bright_yellow()
                } else {
                    format!("✓ {}", outcome).bright_green()
                };
                let tokens = match (prompt_tokens, completion_tokens) {
                    (Some(p), Some(c)) => format!(", {} tokens", p + c),
                    _ => String::new(),
                };
                let _ = writeln!(
                    stderr,
                    "{}   {} {}",
                    tag,
                    styled.bold(),
                    format!("({} revision(s){}, {:.1}s)", revisions, tokens, duration_secs)
                        .dimmed()
                );
            }
            LogEvent::RevisionFailed { error, .. } => {
                let _ = writeln!(
                    stderr,
                    "{}   {} {}",
                    tag,
                    "✗ Failed:".bright_red().bold(),
                    error.bright_red()
                );
            }
        }
    }

    fn log_compact(&self, event: &LogEvent) {
        let mut stderr = std::io::stderr();
        let timestamp = chrono::Utc::now().format("%H:%M:%S");
        let id = short_id(event.request_id());
        let msg = match event {
            LogEvent::RevisionStarted { language, .. } => {
                format!("[{}] {} revision:start {}", timestamp, id, language)
            }
            LogEvent::RoleStarted { step, role, .. } => {
                format!("[{}] {} {}:start:{}", timestamp, id, role, step + 1)
            }
            LogEvent::RoleCompleted {
                step,
                role,
                summary,
                duration_secs,
                ..
            } => format!(
                "[{}] {} {}:done:{} {} {:.1}s",
                timestamp,
                id,
                role,
                step + 1,
                summary,
                duration_secs
            ),
            LogEvent::RoleRetried { role, attempt, .. } => {
                format!("[{}] {} {}:retry:{}", timestamp, id, role, attempt)
            }
            LogEvent::ScoreRecorded {
                target,
                dimension,
                score,
                ..
            } => format!(
                "[{}] {} score:{}:{} {}",
                timestamp, id, target, dimension, score
            ),
            LogEvent::AggregateComputed {
                target, aggregate, ..
            } => format!("[{}] {} score:{} {}", timestamp, id, target, aggregate),
            LogEvent::RevisionCapReached { revisions, .. } => {
                format!("[{}] {} revision:cap:{}", timestamp, id, revisions)
            }
            LogEvent::RevisionCompleted {
                outcome,
                revisions,
                duration_secs,
                ..
            } => format!(
                "[{}] {} revision:done {} revisions={} {:.1}s",
                timestamp, id, outcome, revisions, duration_secs
            ),
            LogEvent::RevisionFailed { error, .. } => {
                format!("[{}] {} revision:error {}", timestamp, id, error)
            }
        };
        let _ = writeln!(stderr, "{}", msg);
    }
}

fn short_id(request_id: &str) -> &str {
    request_id.get(..8).unwrap_or(request_id)
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() > max_chars {
        let head: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", head)
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_with_tag() {
        let event = LogEvent::AggregateComputed {
            request_id: "abc".into(),
            target: "original".into(),
            semantic: 2,
            contextual: 2,
            aggregate: 4,
        };
        let json = event.with_timestamp();
        assert_eq!(json["event"], "aggregate_computed");
        assert_eq!(json["aggregate"], 4);
        assert!(json["timestamp"].is_string());
    }

    #[test]
    fn test_file_logger_appends_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("revisor.jsonl");
        let logger = Logger::with_file(LogFormat::Compact, &path).unwrap();

        logger.log(&LogEvent::RevisionCapReached {
            request_id: "req-1".into(),
            revisions: 2,
        });
        logger.log(&LogEvent::RevisionFailed {
            request_id: "req-1".into(),
            error: "cycle limit".into(),
            duration_secs: 1.0,
        });

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["event"], "revision_cap_reached");
    }

    #[test]
    fn test_completed_event_token_fields() {
        let completed = |prompt_tokens, completion_tokens| LogEvent::RevisionCompleted {
            request_id: "req-2".into(),
            outcome: "revised".into(),
            revisions: 1,
            previous_score: Some(4),
            new_score: Some(9),
            justification: Some("grounded".into()),
            prompt_tokens,
            completion_tokens,
            duration_secs: 2.5,
        };

        let json = serde_json::to_value(completed(Some(1800), Some(240))).unwrap();
        assert_eq!(json["prompt_tokens"], 1800);
        assert_eq!(json["completion_tokens"], 240);

        let json = serde_json::to_value(completed(None, None)).unwrap();
        assert!(json.get("prompt_tokens").is_none());
    }

    #[test]
    fn test_truncate_is_char_safe() {
        assert_eq!(truncate("ação", 10), "ação");
        assert_eq!(truncate("áéíóúáéíóú", 5), "áé...");
        assert_eq!(short_id("1234567890"), "12345678");
        assert_eq!(short_id("ab"), "ab");
    }
}
