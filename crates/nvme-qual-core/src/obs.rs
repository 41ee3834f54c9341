//! Structured lifecycle events for qualification runs.
//!
//! All events carry an `event` field (`qual.*`) so log pipelines can
//! filter on them. Set `RUST_LOG` to adjust verbosity.

use crate::runner::CommandOutcome;
use tracing::{info, warn};

/// Span tagged with the run id and device path. Attach it to the run future
/// with `tracing::Instrument` so every event inside carries both fields.
pub fn run_span(run_id: &str, device: &str) -> tracing::Span {
    tracing::info_span!("qual.run", run_id = %run_id, device = %device)
}

/// Emit event: run started against a device.
pub fn emit_run_started(run_id: &str, device: &str, device_type: &str) {
    info!(
        event = "qual.run_started",
        run_id = %run_id,
        device = %device,
        device_type = %device_type,
    );
}

/// Emit event: precondition evaluated.
pub fn emit_precondition_checked(namespace_size: Option<u64>, passed: bool) {
    if passed {
        info!(
            event = "qual.precondition_checked",
            namespace_size = namespace_size.unwrap_or(0),
            passed = passed,
        );
    } else {
        warn!(
            event = "qual.precondition_checked",
            namespace_size = namespace_size.unwrap_or(0),
            passed = passed,
        );
    }
}

/// Emit event: one step finished, successfully or not.
pub fn emit_step_finished(position: usize, total: usize, outcome: &CommandOutcome) {
    let elapsed_ms = outcome.elapsed.as_millis() as u64;
    if outcome.passed() {
        info!(
            event = "qual.step_finished",
            step = %outcome.step,
            position = position,
            total = total,
            elapsed_ms = elapsed_ms,
            "[{}/{}] {} completed successfully",
            position,
            total,
            outcome.step,
        );
    } else {
        warn!(
            event = "qual.step_finished",
            step = %outcome.step,
            position = position,
            total = total,
            elapsed_ms = elapsed_ms,
            error_kind = ?outcome.error_kind,
            "[{}/{}] {} failed: {}",
            position,
            total,
            outcome.step,
            outcome.detail,
        );
    }
}

/// Emit event: verdict produced.
pub fn emit_verdict_evaluated(run_id: &str, passed: bool, reasons: usize) {
    info!(
        event = "qual.verdict_evaluated",
        run_id = %run_id,
        passed = passed,
        reasons = reasons,
    );
}

/// Emit event: run finished with its final state.
pub fn emit_run_finished(run_id: &str, state: &str, duration_ms: u64, steps_executed: usize) {
    info!(
        event = "qual.run_finished",
        run_id = %run_id,
        state = %state,
        duration_ms = duration_ms,
        steps_executed = steps_executed,
    );
}
