use std::fs::File;
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use bulkfetch_core::LocalFile;
use bulkfetch_core::download::Prompter;
use tracing::warn;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

pub(crate) fn no_color_env_requested() -> bool {
    std::env::var_os("NO_COLOR").is_some_and(|value| !value.is_empty())
}

pub(crate) fn is_dumb_terminal() -> bool {
    std::env::var("TERM")
        .map(|value| value.eq_ignore_ascii_case("dumb"))
        .unwrap_or(false)
}

pub(crate) fn should_disable_color(no_color_env: bool, dumb_terminal: bool) -> bool {
    no_color_env || dumb_terminal
}

pub(crate) fn is_no_color_requested() -> bool {
    should_disable_color(no_color_env_requested(), is_dumb_terminal())
}

pub(crate) fn should_use_progress(
    stderr_is_terminal: bool,
    quiet: bool,
    dumb_terminal: bool,
) -> bool {
    stderr_is_terminal && !quiet && !dumb_terminal
}

/// `download_log_<YYYYmmdd_HHMMSS>.txt` inside `output_dir`.
pub(crate) fn log_file_path(output_dir: &Path) -> PathBuf {
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    output_dir.join(format!("download_log_{stamp}.txt"))
}

/// Creates the output directory and the run's log file in it.
pub(crate) fn create_log_file(output_dir: &Path) -> Result<(PathBuf, File)> {
    std::fs::create_dir_all(output_dir).with_context(|| {
        format!("Failed to create output directory '{}'", output_dir.display())
    })?;
    let path = log_file_path(output_dir);
    let file = File::create(&path)
        .with_context(|| format!("Failed to create log file '{}'", path.display()))?;
    Ok((path, file))
}

/// Installs the stderr subscriber and, when given, a plain-text file layer.
pub(crate) fn init_tracing(
    default_level: &str,
    force_cli_level: bool,
    no_color: bool,
    log_file: Option<(File, &str)>,
) {
    let filter = if force_cli_level {
        EnvFilter::new(default_level)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
    };
    let stderr_layer = fmt::layer()
        .with_writer(io::stderr)
        .with_ansi(!no_color)
        .with_filter(filter);
    let file_layer = log_file.map(|(file, level)| {
        fmt::layer()
            .with_writer(Mutex::new(file))
            .with_ansi(false)
            .with_target(false)
            .with_filter(EnvFilter::new(level))
    });
    let _ = tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init();
}

/// Asks on stderr and reads the answer from stdin. Declines when stdin is not interactive.
pub(crate) struct TerminalPrompter {
    interactive: bool,
}

impl TerminalPrompter {
    pub(crate) fn new() -> Self {
        Self {
            interactive: io::stdin().is_terminal(),
        }
    }
}

impl Prompter for TerminalPrompter {
    fn confirm_overwrite(&mut self, filename: &str, local: &LocalFile) -> bool {
        if !self.interactive {
            warn!(filename, "stdin is not a terminal, keeping existing file");
            return false;
        }
        let mut stderr = io::stderr().lock();
        let _ = write!(
            stderr,
            "{filename} already exists ({} bytes). Overwrite? [y/N] ",
            local.size_bytes
        );
        let _ = stderr.flush();
        drop(stderr);

        let mut answer = String::new();
        match io::stdin().lock().read_line(&mut answer) {
            Ok(_) => is_yes(&answer),
            Err(error) => {
                warn!(filename, error = %error, "could not read answer, keeping existing file");
                false
            }
        }
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
