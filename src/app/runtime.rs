use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use bulkfetch_core::download::{Admissions, resolve_prompts};
use bulkfetch_core::{
    DownloadEngine, HttpClient, Inventory, OverwritePolicy, PauseSignal, ProgressStore,
    TransferObserver,
};
use tracing::{debug, info, warn};

use crate::ProcessExit;
use crate::app::input_processor::{self, TargetFilter};
use crate::app::{config_manager, config_runtime, exit_handler, output, progress_manager, terminal};

pub(crate) async fn run_bulkfetch() -> Result<ProcessExit> {
    let (args, cli_sources) = config_runtime::parse_cli_with_sources();
    let resolved = config_manager::resolve_config(args, &cli_sources)?;
    let args = resolved.args;
    let configuration = resolved.configuration;
    let output_dir = args
        .output_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from("."));

    let parsed = input_processor::process_input(&args)?;

    let default_level = config_runtime::resolve_default_log_level(&args);
    let force_cli_log_level = config_runtime::should_force_cli_log_level(&cli_sources);
    let no_color = terminal::is_no_color_requested();

    if parsed.targets.is_empty() {
        terminal::init_tracing(default_level, force_cli_log_level, no_color, None);
        input_processor::log_skipped_lines(&parsed);
        if parsed.skipped.is_empty() {
            output::print_quick_start_guidance(parsed.piped_stdin_was_empty);
        } else {
            info!("No valid targets found in input");
        }
        return Ok(ProcessExit::Success);
    }

    let (log_file, log_file_error) = if args.no_log_file {
        (None, None)
    } else {
        match terminal::create_log_file(&output_dir) {
            Ok(created) => (Some(created), None),
            Err(error) => (None, Some(error)),
        }
    };
    let file_level = if args.verbose > 0 { default_level } else { "info" };
    let (log_path, log_layer) = match log_file {
        Some((path, file)) => (Some(path), Some((file, file_level))),
        None => (None, None),
    };
    terminal::init_tracing(default_level, force_cli_log_level, no_color, log_layer);

    debug!(?args, "CLI arguments parsed");
    info!(version = env!("CARGO_PKG_VERSION"), "bulkfetch starting");
    if let Some(path) = &log_path {
        info!(path = %path.display(), "Logging to file");
    }
    if let Some(error) = log_file_error {
        warn!(error = %format!("{error:#}"), "Log file disabled");
    }
    input_processor::log_skipped_lines(&parsed);

    let filter = TargetFilter::new(args.filter.as_deref(), args.extension.as_deref())?;
    let targets = filter.apply(parsed.targets);
    if targets.is_empty() {
        info!("No targets left after filtering");
        return Ok(ProcessExit::Success);
    }

    let client = HttpClient::new(configuration.request_timeout)
        .context("Failed to build HTTP client")?;
    let inventory = Arc::new(Inventory::scan_or_empty(
        &output_dir,
        args.extension.as_deref(),
    ));
    info!(
        local_files = inventory.len(),
        output_dir = %output_dir.display(),
        "Local inventory scanned"
    );

    let store = ProgressStore::in_dir(&output_dir);
    let mut engine = DownloadEngine::new(configuration, client.clone())?;
    let plan = engine.plan(targets, &store).await;
    let total_targets = plan.targets.len();
    let pending = plan.pending();

    let admissions = if engine.config().overwrite_policy == OverwritePolicy::PromptUser {
        let mut prompter = terminal::TerminalPrompter::new();
        resolve_prompts(&pending, engine.config(), &inventory, &client, &mut prompter).await
    } else {
        Admissions::none()
    };

    let interrupted = Arc::new(AtomicBool::new(false));
    let interrupted_signal = Arc::clone(&interrupted);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing in-flight downloads");
            interrupted_signal.store(true, Ordering::SeqCst);
        }
    });
    let pause = PauseSignal::from_flag(Arc::clone(&interrupted));

    let use_progress = terminal::should_use_progress(
        io::stderr().is_terminal(),
        args.quiet,
        terminal::is_dumb_terminal(),
    );
    let progress =
        use_progress.then(|| Arc::new(progress_manager::ProgressManager::new(pending.len())));
    if let Some(progress) = &progress {
        engine = engine.with_observer(Arc::clone(progress) as Arc<dyn TransferObserver>);
    }

    let report = engine
        .run(plan.targets, &output_dir, inventory, admissions, &store, &pause)
        .await?;

    if let Some(progress) = &progress {
        progress.finish();
    }

    output::print_completion_summary(&report, &output_dir, &store, total_targets);

    Ok(exit_handler::outcome_for_report(&report))
}
