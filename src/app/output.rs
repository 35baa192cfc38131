//! CLI output formatting: guidance and the end-of-run summary.

use std::collections::BTreeMap;
use std::path::Path;

use bulkfetch_core::download::CheckpointStatus;
use bulkfetch_core::failure::FailureCategory;
use bulkfetch_core::{BatchReport, ErrorRecord, ProgressStore};
use tracing::{info, warn};

/// Message when no input was provided at all.
pub(crate) const NO_INPUT_GUIDANCE: &str =
    "No targets provided. Pass URLs as arguments, a manifest with --input, or pipe one via stdin.";

/// Message when stdin was piped but empty.
pub(crate) const EMPTY_STDIN_GUIDANCE: &str =
    "Received empty stdin input. Pipe one URL (or `FILENAME URL`) per line.";

pub(crate) const INPUT_EXAMPLE: &str = "Example: bulkfetch -o downloads https://example.com/a.zip";

/// Returns terminal width from COLUMNS, or 80 if unset/invalid.
pub(crate) fn terminal_width() -> usize {
    std::env::var("COLUMNS")
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .filter(|width| *width >= 20)
        .unwrap_or(80)
}

/// Truncates text to at most `width` chars, appending an ellipsis if truncated.
pub(crate) fn truncate_to_width(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    match width {
        0 => String::new(),
        1 => "…".to_string(),
        _ => {
            let mut output: String = text.chars().take(width - 1).collect();
            output.push('…');
            output
        }
    }
}

/// Prints quick-start guidance to stdout.
pub(crate) fn print_quick_start_guidance(empty_stdin: bool) {
    let width = terminal_width().min(80);
    let headline = if empty_stdin {
        EMPTY_STDIN_GUIDANCE
    } else {
        NO_INPUT_GUIDANCE
    };
    println!("{}", truncate_to_width(headline, width));
    println!("{}", truncate_to_width(INPUT_EXAMPLE, width));
}

pub(crate) fn print_completion_summary(
    report: &BatchReport,
    output_dir: &Path,
    store: &ProgressStore,
    total_targets: usize,
) {
    let stats = &report.stats;
    info!(
        completed = stats.completed(),
        skipped = stats.skipped(),
        failed = stats.failed(),
        retried = stats.retried(),
        total_targets,
        output_dir = %output_dir.display(),
        "Download Summary"
    );

    match &report.checkpoint {
        CheckpointStatus::Saved => info!(
            remaining = report.snapshot.remaining().len(),
            path = %store.path().display(),
            "Progress saved"
        ),
        CheckpointStatus::Cleared => info!("All targets done, progress file cleared"),
        CheckpointStatus::Failed(error) => warn!(error = %error, "Progress file not updated"),
        CheckpointStatus::Untouched => {}
    }

    if report.paused {
        warn!(
            remaining = report.snapshot.remaining().len(),
            "Paused. Run again to resume."
        );
    }

    for line in render_failure_summary_lines(&report.errors, terminal_width()) {
        println!("{line}");
    }
}

/// Groups failures by category with what/fix hints, then lists the files.
pub(crate) fn render_failure_summary_lines(records: &[ErrorRecord], width: usize) -> Vec<String> {
    if records.is_empty() {
        return Vec::new();
    }

    let mut grouped: BTreeMap<FailureCategory, Vec<&ErrorRecord>> = BTreeMap::new();
    for record in records {
        grouped
            .entry(record.descriptor().category)
            .or_default()
            .push(record);
    }

    let mut lines = vec![truncate_to_width("Failure summary by category:", width)];
    for (category, group) in &grouped {
        let header = format!("- {}: {}", category.label(), group.len());
        lines.push(truncate_to_width(&header, width));

        let mut seen_hints = Vec::new();
        for record in group {
            let descriptor = record.descriptor();
            if seen_hints.contains(&descriptor.what) {
                continue;
            }
            seen_hints.push(descriptor.what);
            lines.push(truncate_to_width(&format!("  What: {}", descriptor.what), width));
            lines.push(truncate_to_width(&format!("  Fix: {}", descriptor.fix), width));
        }
        for record in group {
            let entry = format!(
                "  {} ({} attempt{}): {}",
                record.filename,
                record.attempts_made,
                if record.attempts_made == 1 { "" } else { "s" },
                record.message
            );
            lines.push(truncate_to_width(&entry, width));
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use bulkfetch_core::{DownloadError, ErrorAggregator};

    use super::*;

    #[test]
    fn test_truncate_to_width() {
        assert_eq!(truncate_to_width("hello", 10), "hello");
        assert_eq!(truncate_to_width("hello world", 6), "hello…");
        assert_eq!(truncate_to_width("hello", 1), "…");
        assert_eq!(truncate_to_width("hello", 0), "");
    }

    #[test]
    fn test_failure_summary_empty() {
        assert!(render_failure_summary_lines(&[], 80).is_empty());
    }

    #[test]
    fn test_failure_summary_groups_by_category() {
        let errors = ErrorAggregator::new();
        let now = Instant::now();
        errors.record("a.zip", 1, &DownloadError::http_status("https://h/a.zip", 404), now);
        errors.record("b.zip", 5, &DownloadError::timeout("https://h/b.zip"), now);
        errors.record("c.zip", 1, &DownloadError::http_status("https://h/c.zip", 410), now);

        let lines = render_failure_summary_lines(&errors.report(), 200);
        assert_eq!(lines[0], "Failure summary by category:");
        assert!(lines.iter().any(|l| l == "- Source: 2"));
        assert!(lines.iter().any(|l| l == "- Network: 1"));
        let not_found_hints = lines
            .iter()
            .filter(|l| l.contains("File not found on server"))
            .count();
        assert_eq!(not_found_hints, 1);
        assert!(lines.iter().any(|l| l.starts_with("  b.zip (5 attempts)")));
        assert!(lines.iter().any(|l| l.starts_with("  a.zip (1 attempt)")));
    }

    #[test]
    fn test_failure_summary_respects_width() {
        let errors = ErrorAggregator::new();
        errors.record(
            "a-very-long-file-name-that-does-not-fit.zip",
            2,
            &DownloadError::timeout("https://h/x"),
            Instant::now(),
        );
        for line in render_failure_summary_lines(&errors.report(), 24) {
            assert!(line.chars().count() <= 24, "{line}");
        }
    }
}
