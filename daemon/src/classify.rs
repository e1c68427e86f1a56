//! Log line classification
//!
//! Normalizes raw child-process output into leveled log records. The level
//! heuristic is advisory, used for observer-facing coloring only — control
//! decisions never depend on it.

use std::sync::LazyLock;

use regex::Regex;

use crate::hub::{LogLevel, LogRecord};

/// CSI / OSC / single-char ANSI escape sequences.
static ANSI_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x1b(?:\[[0-9;?]*[ -/]*[@-~]|\][^\x07\x1b]*(?:\x07|\x1b\\)?|[@-_])")
        .expect("ansi regex to compile")
});

/// Build-tool timing suffix, e.g. "built in 243ms" or "ready in 1.2s".
static TIMING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"in \d+(?:\.\d+)?\s?m?s\b").expect("timing regex to compile"));

const ERROR_KEYWORDS: &[&str] = &[
    "error",
    "failed",
    "exception",
    "fatal",
    "cannot find",
    "module not found",
    "enoent",
];

const WARN_KEYWORDS: &[&str] = &["warn", "deprecated", "conflict"];

const SUCCESS_KEYWORDS: &[&str] = &["ready", "compiled", "success", "✓", "✔", "hmr update"];

/// Strip ANSI escape sequences, carriage returns and other control
/// characters from a raw output line. Idempotent.
pub fn strip_ansi(raw: &str) -> String {
    let stripped = ANSI_RE.replace_all(raw, "");
    stripped
        .chars()
        .filter(|c| !c.is_control() || *c == '\t')
        .collect()
}

/// Classify one raw line of process output.
///
/// Returns `None` for lines that carry no information: empty after
/// normalization, or a single spinner-frame glyph.
pub fn classify(project_id: &str, raw: &str) -> Option<LogRecord> {
    let message = strip_ansi(raw);
    let message = message.trim();
    if message.is_empty() {
        return None;
    }

    // Spinner frames arrive as lone glyphs (⠋, ⠙, |, /, ...).
    let mut chars = message.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        if !c.is_alphanumeric() {
            return None;
        }
    }

    Some(LogRecord::new(
        project_id,
        detect_level(message),
        message.to_string(),
    ))
}

/// Keyword heuristic, evaluated error → warn → success → info.
pub fn detect_level(message: &str) -> LogLevel {
    let lower = message.to_lowercase();

    if ERROR_KEYWORDS.iter().any(|k| lower.contains(k)) {
        return LogLevel::Error;
    }
    if WARN_KEYWORDS.iter().any(|k| lower.contains(k)) {
        return LogLevel::Warn;
    }
    if SUCCESS_KEYWORDS.iter().any(|k| lower.contains(k))
        || (lower.contains("server") && lower.contains("running"))
        || (lower.contains("local") && lower.contains("http"))
        || TIMING_RE.is_match(&lower)
    {
        return LogLevel::Success;
    }
    LogLevel::Info
}
