use std::time::Duration;

use anyhow::{Result, bail};
use bulkfetch_core::config::megabytes_per_sec;
use bulkfetch_core::{Configuration, OverwritePolicy};
use clap::{ArgMatches, CommandFactory, FromArgMatches, parser::ValueSource};

use crate::app::file_config::FileConfig;
use crate::cli::Args;

/// Which settings were typed on the command line (and therefore beat the config file).
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct CliValueSources {
    pub(crate) output_dir: bool,
    pub(crate) workers: bool,
    pub(crate) retry: bool,
    pub(crate) throttle: bool,
    pub(crate) no_smart_check: bool,
    pub(crate) extension: bool,
    pub(crate) timeout: bool,
    pub(crate) no_log_file: bool,
    pub(crate) verbose: bool,
    pub(crate) quiet: bool,
}

pub(crate) fn parse_cli_with_sources() -> (Args, CliValueSources) {
    let matches = Args::command().get_matches();
    let args = Args::from_arg_matches(&matches).unwrap_or_else(|err| err.exit());
    let sources = sources_from_matches(&matches);
    (args, sources)
}

pub(crate) fn sources_from_matches(matches: &ArgMatches) -> CliValueSources {
    CliValueSources {
        output_dir: is_commandline_value(matches, "output_dir"),
        workers: is_commandline_value(matches, "workers"),
        retry: is_commandline_value(matches, "retry"),
        throttle: is_commandline_value(matches, "throttle"),
        no_smart_check: is_commandline_value(matches, "no_smart_check"),
        extension: is_commandline_value(matches, "extension"),
        timeout: is_commandline_value(matches, "timeout"),
        no_log_file: is_commandline_value(matches, "no_log_file"),
        verbose: is_commandline_value(matches, "verbose"),
        quiet: is_commandline_value(matches, "quiet"),
    }
}

fn is_commandline_value(matches: &ArgMatches, id: &str) -> bool {
    matches.value_source(id) == Some(ValueSource::CommandLine)
}

/// Fills every setting not given on the command line from the config file.
pub(crate) fn apply_config_defaults(
    mut args: Args,
    cli_sources: &CliValueSources,
    file_config: Option<&FileConfig>,
) -> Result<Args> {
    if let Some(file_config) = file_config {
        if !cli_sources.output_dir
            && args.output_dir.is_none()
            && let Some(output_dir) = &file_config.output_dir
        {
            args.output_dir = Some(output_dir.clone());
        }

        if !cli_sources.workers
            && let Some(workers) = file_config.workers
        {
            args.workers = workers;
        }

        if !cli_sources.retry
            && let Some(retry) = file_config.retry
        {
            args.retry = retry;
        }

        if !cli_sources.throttle
            && let Some(throttle) = file_config.throttle
        {
            args.throttle = throttle;
        }

        if !cli_sources.no_smart_check
            && let Some(smart_check) = file_config.smart_check
        {
            args.no_smart_check = !smart_check;
        }

        if !cli_sources.extension
            && args.extension.is_none()
            && let Some(extension) = &file_config.extension
        {
            args.extension = Some(extension.clone());
        }

        if !cli_sources.timeout
            && let Some(timeout) = file_config.timeout_secs
        {
            args.timeout = timeout;
        }

        if !cli_sources.no_log_file
            && let Some(log_file) = file_config.log_file
        {
            args.no_log_file = !log_file;
        }
    }

    if !(1..=100).contains(&args.workers) {
        bail!(
            "Invalid effective workers value: {}. Expected range: 1..=100",
            args.workers
        );
    }
    if !(args.throttle.is_finite() && args.throttle >= 0.0) {
        bail!(
            "Invalid effective throttle value: {}. Expected a non-negative number of MB/s",
            args.throttle
        );
    }

    Ok(args)
}

/// Builds the engine configuration from fully resolved arguments.
pub(crate) fn build_configuration(args: &Args) -> Configuration {
    let overwrite_policy = if args.force {
        OverwritePolicy::ForceOverwrite
    } else if args.no_skip_existing {
        OverwritePolicy::PromptUser
    } else {
        OverwritePolicy::SkipExisting
    };

    Configuration {
        max_retries: u32::from(args.retry),
        concurrency: usize::from(args.workers),
        throttle_bytes_per_sec: megabytes_per_sec(args.throttle),
        overwrite_policy,
        smart_size_check: !args.no_smart_check,
        max_files: args
            .max_files
            .map(|n| usize::try_from(n).unwrap_or(usize::MAX)),
        request_timeout: Duration::from_secs(args.timeout),
        pause_after: args.pause.then_some(1),
        pause_grace: args.pause_grace.map(Duration::from_secs),
        cleanup_partials: args.cleanup,
        ..Configuration::default()
    }
}

pub(crate) fn resolve_default_log_level(args: &Args) -> &'static str {
    if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

pub(crate) fn should_force_cli_log_level(cli_sources: &CliValueSources) -> bool {
    cli_sources.verbose || cli_sources.quiet
}
