//! Exit code logic for the bulkfetch process.

use bulkfetch_core::BatchReport;

use crate::ProcessExit;

/// Maps succeeded (completed or skipped) and failed counts to the process exit outcome.
pub(crate) fn determine_exit_outcome(succeeded: usize, failed: usize) -> ProcessExit {
    if failed == 0 {
        ProcessExit::Success
    } else if succeeded > 0 {
        ProcessExit::Partial
    } else {
        ProcessExit::Failure
    }
}

/// A paused batch with targets left over is partial regardless of failures.
pub(crate) fn outcome_for_report(report: &BatchReport) -> ProcessExit {
    let succeeded = report.stats.completed() + report.stats.skipped();
    let failed = report.stats.failed();
    if report.paused && !report.snapshot.remaining().is_empty() && failed == 0 {
        return ProcessExit::Partial;
    }
    determine_exit_outcome(succeeded, failed)
}
