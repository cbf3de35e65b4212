#![warn(missing_docs)]
//! # flowlens-ui
//!
//! ## Purpose
//! Presentation-side model for `flowlens`: parses user intents and projects
//! session snapshots into display-ready text.
//!
//! ## Responsibilities
//! - Parse one line of user input into a [`UserIntent`].
//! - Project a [`SessionSnapshot`] into a [`SessionView`] with a headline,
//!   status flags, and the suggestion or guide body.
//! - Search and order history records for browsing.
//!
//! ## Data flow
//! Input line -> [`parse_intent`] -> controller call -> published snapshot ->
//! [`SessionView::project`] -> [`SessionView::render`].
//!
//! ## Ownership and lifetimes
//! Views own their strings so the driver can keep one while the next
//! snapshot arrives.
//!
//! ## Error model
//! Only intent parsing can fail, with [`IntentError`].
//!
//! ## Security and privacy notes
//! Views never include image payloads.

use std::fmt::Write as _;

use flowlens_core::{Guide, HistoryRecord};
use flowlens_session::{SessionSnapshot, SessionState};
use thiserror::Error;

/// One user action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserIntent {
    /// Start capture, optionally with auto-scan on.
    StartCapture {
        /// Whether auto-scan starts enabled.
        auto_scan: bool,
    },
    /// Run a manual scan.
    Scan,
    /// Turn auto-scan on or off.
    SetAutoScan(bool),
    /// Generate a guide for a suggestion id.
    Select(String),
    /// Leave the guide view.
    Back,
    /// Stop capture.
    Stop,
    /// Open history.
    OpenHistory,
    /// Close history.
    CloseHistory,
    /// Open the n-th (1-based) record of the last history listing.
    OpenRecord(usize),
    /// Filter the history listing.
    Find(String),
    /// Delete all history.
    ClearHistory,
    /// Reset the session.
    Reset,
    /// Show the command list.
    Help,
    /// Exit.
    Quit,
}

/// Parses one input line.
///
/// # Errors
/// Returns [`IntentError`] for empty input, unknown commands, and commands
/// with missing or malformed arguments.
pub fn parse_intent(line: &str) -> Result<UserIntent, IntentError> {
    let trimmed = line.trim();
    let (command, argument) = match trimmed.split_once(char::is_whitespace) {
        Some((command, rest)) => (command, rest.trim()),
        None => (trimmed, ""),
    };

    let intent = match command.to_ascii_lowercase().as_str() {
        "" => return Err(IntentError::Empty),
        "start" => UserIntent::StartCapture { auto_scan: false },
        "auto-start" => UserIntent::StartCapture { auto_scan: true },
        "scan" => UserIntent::Scan,
        "auto" => match argument.to_ascii_lowercase().as_str() {
            "on" => UserIntent::SetAutoScan(true),
            "off" => UserIntent::SetAutoScan(false),
            _ => return Err(IntentError::InvalidArgument("auto expects `on` or `off`")),
        },
        "select" => UserIntent::Select(required(argument, "select")?.to_string()),
        "back" => UserIntent::Back,
        "stop" => UserIntent::Stop,
        "history" => UserIntent::OpenHistory,
        "close" => UserIntent::CloseHistory,
        "open" => {
            let index = required(argument, "open")?
                .parse::<usize>()
                .ok()
                .filter(|index| *index > 0)
                .ok_or(IntentError::InvalidArgument("open expects a record number from 1"))?;
            UserIntent::OpenRecord(index)
        }
        "find" => UserIntent::Find(argument.to_string()),
        "clear-history" => UserIntent::ClearHistory,
        "reset" => UserIntent::Reset,
        "help" | "?" => UserIntent::Help,
        "quit" | "exit" => UserIntent::Quit,
        other => return Err(IntentError::Unknown(other.to_string())),
    };
    Ok(intent)
}

fn required<'a>(argument: &'a str, command: &'static str) -> Result<&'a str, IntentError> {
    if argument.is_empty() {
        return Err(IntentError::MissingArgument(command));
    }
    Ok(argument)
}

/// Command list shown by `help`.
pub const HELP_TEXT: &str = "\
commands:
  start | auto-start      begin screen capture (auto-start also enables auto-scan)
  scan                    analyze the current screen now
  auto on|off             toggle periodic background scans
  select <id>             generate a guide for a suggestion
  back                    leave the guide view
  stop                    stop screen capture
  history | close         open or close saved guides
  find <text>             filter saved guides
  open <n>                view saved guide number n
  clear-history           delete every saved guide
  reset                   start over
  quit                    exit";

/// Display-ready projection of one snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionView {
    /// One-line summary of the current state.
    pub headline: String,
    /// Short status tags such as `live`, `paused`, `auto-scan`.
    pub badges: Vec<String>,
    /// Error to show, if any.
    pub error: Option<String>,
    /// Main body lines.
    pub body: Vec<String>,
}

impl SessionView {
    /// Projects a snapshot.
    pub fn project(snapshot: &SessionSnapshot) -> Self {
        let headline = match snapshot.state {
            SessionState::Idle => "Ready. Start capture to look for automations.".to_string(),
            SessionState::Capturing => "Watching your screen. Scan when ready.".to_string(),
            SessionState::Analyzing => "Analyzing your screen...".to_string(),
            SessionState::Suggesting if snapshot.suggestions.is_empty() => {
                "No automation opportunities found yet.".to_string()
            }
            SessionState::Suggesting => {
                format!("{} automation opportunities found.", snapshot.suggestions.len())
            }
            SessionState::GeneratingGuide => "Writing your guide...".to_string(),
            SessionState::ViewingGuide => snapshot
                .selected_guide
                .as_ref()
                .map(|guide| guide.title.clone())
                .unwrap_or_else(|| "Guide".to_string()),
            SessionState::History => "Saved guides".to_string(),
        };

        let mut badges = Vec::new();
        if let Some(label) = &snapshot.source_label {
            badges.push(format!("live: {label}"));
        }
        if snapshot.paused {
            badges.push("paused".to_string());
        }
        if snapshot.auto_scan_enabled {
            badges.push("auto-scan".to_string());
        }
        if snapshot.auto_scan_in_progress {
            badges.push("scanning in background".to_string());
        }

        let body = match snapshot.state {
            SessionState::Suggesting | SessionState::GeneratingGuide => snapshot
                .suggestions
                .iter()
                .map(|suggestion| {
                    format!(
                        "[{}] {} ({}, saves {}) via {}",
                        suggestion.id,
                        suggestion.title,
                        suggestion.relevance_score,
                        suggestion.estimated_time_savings,
                        if suggestion.tools.is_empty() {
                            "any tool".to_string()
                        } else {
                            suggestion.tools.join(", ")
                        }
                    )
                })
                .collect(),
            SessionState::ViewingGuide => snapshot
                .selected_guide
                .as_ref()
                .map(guide_lines)
                .unwrap_or_default(),
            _ => Vec::new(),
        };

        Self {
            headline,
            badges,
            error: snapshot.last_error.clone(),
            body,
        }
    }

    /// Renders the view as plain text.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&self.headline);
        if !self.badges.is_empty() {
            let _ = write!(out, "  [{}]", self.badges.join(" | "));
        }
        out.push('\n');
        if let Some(error) = &self.error {
            let _ = writeln!(out, "! {error}");
        }
        for line in &self.body {
            let _ = writeln!(out, "  {line}");
        }
        out
    }
}

/// Formats a guide as numbered lines.
pub fn guide_lines(guide: &Guide) -> Vec<String> {
    let mut lines = Vec::new();
    if !guide.prerequisites.is_empty() {
        lines.push(format!("Before you start: {}", guide.prerequisites.join("; ")));
    }
    for step in &guide.steps {
        lines.push(format!("{}. {}", step.step_number, step.instruction));
        if let Some(selector) = &step.selector_description {
            lines.push(format!("   look for: {selector}"));
        }
        if let Some(code) = &step.code_snippet {
            for code_line in code.lines() {
                lines.push(format!("   | {code_line}"));
            }
        }
        if let Some(tip) = &step.tip {
            lines.push(format!("   tip: {tip}"));
        }
    }
    lines
}

/// Filters history by a case-insensitive query and orders it newest first.
///
/// The query matches the guide title, prerequisites, and step instructions.
/// A blank query keeps every record.
pub fn filter_history(records: &[HistoryRecord], query: &str) -> Vec<HistoryRecord> {
    let needle = query.trim().to_lowercase();
    let mut matches: Vec<HistoryRecord> = records
        .iter()
        .filter(|record| needle.is_empty() || record_matches(record, &needle))
        .cloned()
        .collect();
    matches.sort_by(|left, right| right.timestamp_ms.cmp(&left.timestamp_ms));
    matches
}

fn record_matches(record: &HistoryRecord, needle: &str) -> bool {
    let guide = &record.guide;
    guide.title.to_lowercase().contains(needle)
        || guide
            .prerequisites
            .iter()
            .any(|item| item.to_lowercase().contains(needle))
        || guide
            .steps
            .iter()
            .any(|step| step.instruction.to_lowercase().contains(needle))
}

/// Renders a numbered history listing for `open <n>`.
pub fn render_history(records: &[HistoryRecord]) -> String {
    if records.is_empty() {
        return "  (no saved guides)\n".to_string();
    }

    let mut out = String::new();
    for (index, record) in records.iter().enumerate() {
        let _ = writeln!(
            out,
            "  {}. {} ({} steps)",
            index + 1,
            record.guide.title,
            record.guide.steps.len()
        );
    }
    out
}

/// Intent parsing errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntentError {
    /// Blank line.
    #[error("no command entered")]
    Empty,
    /// Unrecognized command word.
    #[error("unknown command `{0}`; type `help`")]
    Unknown(String),
    /// Command needs an argument.
    #[error("`{0}` needs an argument")]
    MissingArgument(&'static str),
    /// Argument could not be used.
    #[error("{0}")]
    InvalidArgument(&'static str),
}

#[cfg(test)]
mod tests {
    //! Unit tests for view projection.

    use super::*;

    #[test]
    fn paused_suggestions_show_badge_and_cards() {
        let snapshot = SessionSnapshot {
            state: SessionState::Suggesting,
            paused: true,
            suggestions: vec![flowlens_core::Suggestion {
                id: "a".to_string(),
                title: "Export weekly report".to_string(),
                estimated_time_savings: "20 minutes".to_string(),
                tools: vec!["Python".to_string()],
                description: String::new(),
                relevance_score: 88,
            }],
            ..SessionSnapshot::default()
        };

        let view = SessionView::project(&snapshot);
        assert_eq!(view.headline, "1 automation opportunities found.");
        assert_eq!(view.badges, vec!["paused".to_string()]);
        assert!(view.body[0].contains("Export weekly report"));
        assert!(view.render().contains("[paused]"));
    }
}
