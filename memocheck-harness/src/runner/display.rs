//! Colored terminal display for run reports.
//!
//! Provides colorized output for TTY stderr. Falls back to plain text when
//! stderr is not a terminal or `NO_COLOR` is set.

use std::io::{IsTerminal, Write};

use super::outcome::{CaseStatus, OperationOutcome};
use super::report::RunReport;

// ---------------------------------------------------------------------------
// ANSI escape helpers
// ---------------------------------------------------------------------------

mod ansi {
    pub const RESET: &str = "\x1b[0m";
    pub const DIM: &str = "\x1b[2m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const BOLD_RED: &str = "\x1b[1;31m";
    pub const BOLD_GREEN: &str = "\x1b[1;32m";
    pub const BOLD_YELLOW: &str = "\x1b[1;33m";
    pub const BOLD_CYAN: &str = "\x1b[1;36m";
}

/// Whether to emit ANSI color codes.
fn use_color() -> bool {
    std::io::stderr().is_terminal() && std::env::var_os("NO_COLOR").is_none()
}

/// Format a duration as a human-readable string.
fn fmt_duration(d: std::time::Duration) -> String {
    let total_ms = d.as_millis();
    if total_ms < 1000 {
        format!("{}ms", total_ms)
    } else if total_ms < 60_000 {
        format!("{:.2}s", d.as_secs_f64())
    } else {
        let mins = d.as_secs() / 60;
        let secs = d.as_secs() % 60;
        format!("{}m {:02}s", mins, secs)
    }
}

const RULE_WIDTH: usize = 56;

/// Print a section header like: `━━━ Title ━━━━━━━━━━━━━━━━━━━━━━`
fn section_header(w: &mut impl Write, title: &str, color: bool, style: &str) {
    let prefix = "━━━ ";
    let content_len = prefix.chars().count() + title.len() + 1;
    let trail = RULE_WIDTH.saturating_sub(content_len).max(3);
    let rule = "━".repeat(trail);

    if color {
        let _ = writeln!(w, "\n{style}{prefix}{title} {rule}{}", ansi::RESET);
    } else {
        let _ = writeln!(w, "\n{prefix}{title} {rule}");
    }
}

fn status_icon(status: CaseStatus, color: bool) -> &'static str {
    match (status, color) {
        (CaseStatus::Passed, true) => "\x1b[32m✓\x1b[0m",
        (CaseStatus::Failed, true) => "\x1b[1;31m✗\x1b[0m",
        (CaseStatus::Errored, true) => "\x1b[1;31m!\x1b[0m",
        (CaseStatus::SetupError, true) => "\x1b[33m○\x1b[0m",
        (CaseStatus::Passed, false) => "✓",
        (CaseStatus::Failed, false) => "✗",
        (CaseStatus::Errored, false) => "!",
        (CaseStatus::SetupError, false) => "○",
    }
}

/// Print the run report to stderr with colors if supported.
pub fn eprint_report(report: &RunReport) {
    let color = use_color();
    let mut w = std::io::stderr().lock();
    write_report(&mut w, report, color);
}

/// Render the report without colors.
pub fn render_plain(report: &RunReport) -> String {
    let mut buf = Vec::new();
    write_report(&mut buf, report, false);
    String::from_utf8_lossy(&buf).into_owned()
}

fn write_report(w: &mut impl Write, report: &RunReport, color: bool) {
    section_header(w, "Memo Harness Report", color, ansi::BOLD_CYAN);

    let (icon, style) = if report.is_success() {
        ("✓", ansi::BOLD_GREEN)
    } else {
        ("✗", ansi::BOLD_RED)
    };
    let summary = format!(
        "{} cases   {} passed   {} failed   {} errored   {} setup errors   {} skipped",
        report.cases.len(),
        report.passed(),
        report.failed(),
        report.errored(),
        report.setup_errors(),
        report.skipped.len(),
    );
    if color {
        let _ = writeln!(w, "  {summary}   {style}{icon}{}", ansi::RESET);
    } else {
        let _ = writeln!(w, "  {summary}   {icon}");
    }
    let _ = writeln!(w, "  Wall Time    {}", fmt_duration(report.wall_time));

    section_header(w, "Cases", color, ansi::BOLD_CYAN);
    for case in &report.cases {
        let status = case.status();
        let _ = writeln!(
            w,
            "  {}  {:<48} {}",
            status_icon(status, color),
            case.name,
            fmt_duration(case.duration)
        );
        for op in case.operations.iter().filter(|op| !op.outcome.is_pass()) {
            let detail = match &op.outcome {
                OperationOutcome::Failed(failure) => failure.to_string(),
                OperationOutcome::Errored(reason) | OperationOutcome::SetupFailed(reason) => {
                    reason.clone()
                }
                OperationOutcome::Passed => continue,
            };
            if color {
                let _ = writeln!(w, "       {}{}{}  {}", ansi::DIM, op.name, ansi::RESET, detail);
            } else {
                let _ = writeln!(w, "       {}  {}", op.name, detail);
            }
        }
    }

    let warnings: Vec<_> = report.teardown_warnings().collect();
    if !warnings.is_empty() {
        section_header(w, "Teardown Warnings", color, ansi::BOLD_YELLOW);
        for warning in warnings {
            if color {
                let _ = writeln!(w, "  {}○{}  {}", ansi::YELLOW, ansi::RESET, warning);
            } else {
                let _ = writeln!(w, "  ○  {warning}");
            }
        }
    }

    if !report.skipped.is_empty() {
        section_header(w, "Skipped", color, ansi::BOLD_YELLOW);
        for skipped in &report.skipped {
            let _ = writeln!(w, "  -  {skipped}");
        }
    }

    let _ = writeln!(w);
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_fmt_duration() {
        assert_eq!(fmt_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(fmt_duration(Duration::from_millis(1500)), "1.50s");
        assert_eq!(fmt_duration(Duration::from_secs(75)), "1m 15s");
    }

    #[test]
    fn test_plain_render_has_no_escapes() {
        let out = render_plain(&RunReport::default());
        assert!(out.contains("Memo Harness Report"));
        assert!(!out.contains('\x1b'));
    }
}
