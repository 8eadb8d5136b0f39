// Terminal output: engine messages on stderr, run summary table

use tagsync_recon::{EventSink, Progress, RunResult, Severity};

use crate::util::pad_right;

const SHEET_WIDTH: usize = 24;
const RESULT_WIDTH: usize = 36;

/// Prints engine messages to stderr, one line each, prefixed by severity.
#[derive(Debug, Default)]
pub struct ConsoleSink {
    /// Only warnings and errors
    pub quiet: bool,
}

impl ConsoleSink {
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }
}

impl EventSink for ConsoleSink {
    fn record(&self, message: &str, severity: Severity) {
        log::trace!("[{severity}] {message}");
        if self.quiet && !matches!(severity, Severity::Warning | Severity::Error) {
            return;
        }
        eprintln!("{}", format_event(message, severity));
    }
}

pub fn format_event(message: &str, severity: Severity) -> String {
    match severity {
        Severity::Header => format!("=== {message} ==="),
        Severity::Info => format!("    {message}"),
        Severity::Success => format!("[ok] {message}"),
        Severity::Warning => format!("[!!] {message}"),
        Severity::Error => format!("[xx] {message}"),
    }
}

/// Stage notifications go to the debug log.
#[derive(Debug, Default)]
pub struct LogProgress;

impl Progress for LogProgress {
    fn notify(&self, stage: &str) {
        log::debug!("stage: {stage}");
    }
}

// ============================================================================
// Summary
// ============================================================================

pub fn render_summary(result: &RunResult) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{} | {} | Status\n",
        pad_right("Sheet Name", SHEET_WIDTH),
        pad_right("Result", RESULT_WIDTH)
    ));
    out.push_str(&format!(
        "{}-+-{}-+-{}\n",
        "-".repeat(SHEET_WIDTH),
        "-".repeat(RESULT_WIDTH),
        "-".repeat(9)
    ));
    for outcome in &result.sheet_outcomes {
        out.push_str(&format!(
            "{} | {} | {}\n",
            pad_right(&outcome.sheet, SHEET_WIDTH),
            pad_right(&outcome.description, RESULT_WIDTH),
            outcome.status
        ));
    }
    if result.sheet_outcomes.is_empty() {
        out.push_str("(no allowed sheets found)\n");
    }

    out.push('\n');
    out.push_str(&format!(
        "Sheets: {}  Changes detected: {}  Records updated: {}  Validation errors: {}\n",
        result.sheet_outcomes.len(),
        result.total_detected,
        result.total_committed,
        result.validation_errors.len()
    ));
    if let Some(path) = &result.report_path {
        out.push_str(&format!("Error report: {}\n", path.display()));
    }
    out
}
