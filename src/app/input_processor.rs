//! Target list assembly from positional URLs, a manifest file, or stdin.

use std::io::{self, IsTerminal, Read};
use std::path::Path;

use anyhow::{Context, Result};
use bulkfetch_core::{DownloadTarget, TargetError};
use regex::Regex;
use tracing::{info, warn};

use crate::cli::Args;

/// A manifest line that could not be turned into a target.
#[derive(Debug)]
pub(crate) struct SkippedLine {
    pub(crate) line_no: usize,
    pub(crate) reason: String,
}

/// Targets read from input, before filtering.
#[derive(Debug, Default)]
pub(crate) struct ParsedInput {
    pub(crate) targets: Vec<DownloadTarget>,
    pub(crate) skipped: Vec<SkippedLine>,
    /// stdin was piped but held no targets.
    pub(crate) piped_stdin_was_empty: bool,
}

/// Reads targets from positional URLs and `--input`, falling back to piped stdin
/// when neither is given. Runs before logging is set up, so nothing is logged here.
pub(crate) fn process_input(args: &Args) -> Result<ParsedInput> {
    let mut parsed = ParsedInput::default();

    for (index, url) in args.urls.iter().enumerate() {
        match DownloadTarget::from_url(url.as_str()) {
            Ok(target) => parsed.targets.push(target),
            Err(error) => parsed.skipped.push(SkippedLine {
                line_no: index + 1,
                reason: error.to_string(),
            }),
        }
    }

    if let Some(path) = &args.input {
        let manifest = read_manifest(path)?;
        parsed.targets.extend(manifest.targets);
        parsed.skipped.extend(manifest.skipped);
    }

    if args.urls.is_empty() && args.input.is_none() && !io::stdin().is_terminal() {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read targets from stdin")?;
        let manifest = parse_manifest(&buffer);
        parsed.piped_stdin_was_empty = manifest.targets.is_empty() && manifest.skipped.is_empty();
        parsed.targets.extend(manifest.targets);
        parsed.skipped.extend(manifest.skipped);
    }

    Ok(parsed)
}

pub(crate) fn log_skipped_lines(parsed: &ParsedInput) {
    for skipped in &parsed.skipped {
        warn!(line = skipped.line_no, reason = %skipped.reason, "Skipped unusable input line");
    }
    if !parsed.targets.is_empty() {
        info!(
            targets = parsed.targets.len(),
            skipped = parsed.skipped.len(),
            "Parsed input"
        );
    }
}

fn read_manifest(path: &Path) -> Result<ParsedInput> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read manifest '{}'", path.display()))?;
    Ok(parse_manifest(&raw))
}

/// Parses manifest lines: `URL`, `FILENAME URL` or `FILENAME URL SIZE`.
///
/// Blank lines and `#` comments are ignored.
pub(crate) fn parse_manifest(raw: &str) -> ParsedInput {
    let mut parsed = ParsedInput::default();
    for (index, raw_line) in raw.lines().enumerate() {
        let line = raw_line.split('#').next().unwrap_or_default().trim();
        if line.is_empty() {
            continue;
        }
        match parse_manifest_line(line) {
            Ok(target) => parsed.targets.push(target),
            Err(reason) => parsed.skipped.push(SkippedLine {
                line_no: index + 1,
                reason,
            }),
        }
    }
    parsed
}

fn parse_manifest_line(line: &str) -> Result<DownloadTarget, String> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    let target = match fields.as_slice() {
        [url] => DownloadTarget::from_url(*url),
        [filename, url] => DownloadTarget::new(*filename, *url),
        [filename, url, size] => {
            let size = size
                .parse::<u64>()
                .map_err(|_| format!("invalid size {size:?}"))?;
            DownloadTarget::new(*filename, *url).map(|t| t.with_expected_size(size))
        }
        _ => return Err(format!("expected 1 to 3 fields, found {}", fields.len())),
    };
    target.map_err(|error: TargetError| error.to_string())
}

/// Filename filter from `--filter` and `--extension`.
#[derive(Debug, Default)]
pub(crate) struct TargetFilter {
    pattern: Option<Regex>,
    extension: Option<String>,
}

impl TargetFilter {
    /// The regex is anchored at the start of the filename.
    pub(crate) fn new(pattern: Option<&str>, extension: Option<&str>) -> Result<Self> {
        let pattern = pattern
            .map(|raw| {
                Regex::new(&format!("^(?:{raw})"))
                    .with_context(|| format!("Invalid --filter pattern {raw:?}"))
            })
            .transpose()?;
        let extension = extension
            .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
            .filter(|ext| !ext.is_empty());
        Ok(Self { pattern, extension })
    }

    pub(crate) fn matches(&self, filename: &str) -> bool {
        if let Some(pattern) = &self.pattern
            && !pattern.is_match(filename)
        {
            return false;
        }
        match &self.extension {
            Some(wanted) => Path::new(filename)
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case(wanted)),
            None => true,
        }
    }

    pub(crate) fn apply(&self, targets: Vec<DownloadTarget>) -> Vec<DownloadTarget> {
        let before = targets.len();
        let kept: Vec<DownloadTarget> = targets
            .into_iter()
            .filter(|target| self.matches(&target.filename))
            .collect();
        if kept.len() != before {
            info!(kept = kept.len(), dropped = before - kept.len(), "Filtered targets");
        }
        kept
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_manifest_line_forms() {
        let parsed = parse_manifest(
            "# exported list\n\
             https://h.example/files/a.zip\n\
             \n\
             b.bin https://h.example/dl?id=2   # renamed\n\
             c.iso https://h.example/c 4096\n",
        );
        assert!(parsed.skipped.is_empty());
        assert_eq!(parsed.targets.len(), 3);
        assert_eq!(parsed.targets[0].filename, "a.zip");
        assert_eq!(parsed.targets[1].filename, "b.bin");
        assert_eq!(parsed.targets[1].source_url, "https://h.example/dl?id=2");
        assert_eq!(parsed.targets[2].expected_size, Some(4096));
    }

    #[test]
    fn test_parse_manifest_reports_bad_lines_with_numbers() {
        let parsed = parse_manifest(
            "not-a-url\n\
             ../evil https://h.example/x\n\
             a https://h.example/a notanumber\n\
             a b c d\n\
             https://h.example/ok.txt\n",
        );
        assert_eq!(parsed.targets.len(), 1);
        let lines: Vec<usize> = parsed.skipped.iter().map(|s| s.line_no).collect();
        assert_eq!(lines, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_filter_is_anchored_at_start() {
        let filter = TargetFilter::new(Some("doc-\\d+"), None).unwrap();
        assert!(filter.matches("doc-12.pdf"));
        assert!(!filter.matches("old-doc-12.pdf"));
    }

    #[test]
    fn test_filter_alternation_stays_anchored() {
        let filter = TargetFilter::new(Some("a|b"), None).unwrap();
        assert!(filter.matches("b.txt"));
        assert!(!filter.matches("xb.txt"));
    }

    #[test]
    fn test_filter_extension_case_insensitive() {
        let filter = TargetFilter::new(None, Some(".PDF")).unwrap();
        assert!(filter.matches("report.pdf"));
        assert!(filter.matches("REPORT.Pdf"));
        assert!(!filter.matches("report.pdf.zip"));
        assert!(!filter.matches("pdf"));
    }

    #[test]
    fn test_filter_invalid_regex_is_error() {
        let err = TargetFilter::new(Some("(unclosed"), None).unwrap_err();
        assert!(err.to_string().contains("--filter"));
    }

    #[test]
    fn test_filter_apply_keeps_order() {
        let targets = vec![
            DownloadTarget::from_url("https://h.example/z.pdf").unwrap(),
            DownloadTarget::from_url("https://h.example/y.txt").unwrap(),
            DownloadTarget::from_url("https://h.example/x.pdf").unwrap(),
        ];
        let kept = TargetFilter::new(None, Some("pdf")).unwrap().apply(targets);
        let names: Vec<&str> = kept.iter().map(|t| t.filename.as_str()).collect();
        assert_eq!(names, vec!["z.pdf", "x.pdf"]);
    }

    #[test]
    fn test_process_input_reads_manifest_file() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("list.txt");
        std::fs::write(&manifest, "https://h.example/a.zip\nb.zip https://h.example/b\n").unwrap();
        let args = <Args as clap::Parser>::try_parse_from([
            "bulkfetch",
            "https://h.example/first.zip",
            "-i",
            manifest.to_str().unwrap(),
        ])
        .unwrap();
        let parsed = process_input(&args).unwrap();
        let names: Vec<&str> = parsed.targets.iter().map(|t| t.filename.as_str()).collect();
        assert_eq!(names, vec!["first.zip", "a.zip", "b.zip"]);
    }

    #[test]
    fn test_process_input_missing_manifest_is_error() {
        let args =
            <Args as clap::Parser>::try_parse_from(["bulkfetch", "-i", "/nonexistent/list.txt"])
                .unwrap();
        let err = process_input(&args).unwrap_err();
        assert!(err.to_string().contains("Failed to read manifest"));
    }
}
