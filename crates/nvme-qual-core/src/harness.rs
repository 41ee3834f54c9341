//! Qualification run orchestration.
//!
//! A run is: precondition check, the eight-step plan, then the verdict.
//! The harness owns the run id, the run-scoped span and the report; the
//! sequencer and evaluator stay unaware of both.

use crate::config::HarnessConfig;
use crate::criteria::{CriteriaEvaluator, Evaluation};
use crate::obs;
use crate::parse::{
    count_error_log_entries, parse_controller_identity, parse_device_list, parse_firmware_log,
};
use crate::profile::DeviceType;
use crate::report::{compute_plan_digest, RunReport, REPORT_SCHEMA_VERSION};
use crate::runner::{CommandOutcome, CommandRunner, DeviceQuery};
use crate::sequencer::{Sequencer, SequencerState};
use crate::step::CommandStep;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Instrument};
use uuid::Uuid;

/// Parameters of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub device: String,
    pub device_type: DeviceType,
    /// Per-query budget, precondition included.
    pub timeout: Duration,
    pub inter_step_delay: Duration,
    pub quid: String,
    pub description: String,
}

impl RunRequest {
    pub fn new(device: impl Into<String>, device_type: DeviceType) -> Self {
        Self {
            device: device.into(),
            device_type,
            timeout: device_type.profile().command_timeout,
            inter_step_delay: Duration::ZERO,
            quid: String::new(),
            description: String::new(),
        }
    }

    pub fn from_config(config: &HarnessConfig) -> Self {
        Self {
            device: config.device.clone(),
            device_type: config.device_type,
            timeout: config.command_timeout(),
            inter_step_delay: config.inter_step_delay(),
            quid: config.quid.clone(),
            description: config.description.clone(),
        }
    }
}

/// Runs qualifications against whatever backend reaches the device.
#[derive(Clone)]
pub struct QualificationHarness {
    query: Arc<dyn DeviceQuery>,
}

impl QualificationHarness {
    pub fn new(query: Arc<dyn DeviceQuery>) -> Self {
        Self { query }
    }

    /// Execute a full run and return its report.
    pub async fn run(&self, request: &RunRequest) -> RunReport {
        let run_id = Uuid::new_v4();
        let span = obs::run_span(&run_id.to_string(), &request.device);
        self.execute(run_id, request).instrument(span).await
    }

    /// Execute one step on its own. No precondition, no verdict.
    pub async fn run_step(
        &self,
        device: &str,
        step: CommandStep,
        timeout: Duration,
    ) -> CommandOutcome {
        let runner = CommandRunner::new(self.query.clone(), device);
        let outcome = runner.run(step, timeout).await;
        obs::emit_step_finished(step.position(), CommandStep::ALL.len(), &outcome);
        outcome
    }

    async fn execute(&self, run_id: Uuid, request: &RunRequest) -> RunReport {
        let run_id_str = run_id.to_string();
        let started_at = Utc::now();
        obs::emit_run_started(&run_id_str, &request.device, request.device_type.name());

        let profile = request.device_type.profile();
        info!(
            device_type = %request.device_type,
            product = profile.product,
            interface = profile.interface,
            timeout_ms = request.timeout.as_millis() as u64,
            "Active device profile"
        );

        let runner = CommandRunner::new(self.query.clone(), request.device.clone());
        let result = Sequencer::new(runner, request.timeout)
            .with_inter_step_delay(request.inter_step_delay)
            .run()
            .await;

        let evaluation = match &result.state {
            SequencerState::Aborted { reason } => Evaluation::aborted(reason),
            _ => CriteriaEvaluator::new(profile).evaluate_detailed(&result.outcomes),
        };
        obs::emit_verdict_evaluated(
            &run_id_str,
            evaluation.verdict.overall_pass,
            evaluation.verdict.failure_reasons.len(),
        );

        let duration_ms = result.duration.as_millis() as u64;
        obs::emit_run_finished(
            &run_id_str,
            result.state.name(),
            duration_ms,
            result.outcomes.len(),
        );

        let passed_output = |step: CommandStep| {
            result
                .outcomes
                .iter()
                .find(|o| o.step == step && o.passed())
                .map(|o| o.raw_output.as_str())
        };
        let controller = passed_output(CommandStep::NvmeIdCtrl).map(parse_controller_identity);
        let firmware = passed_output(CommandStep::NvmeFwLog).map(parse_firmware_log);
        let device_listed = passed_output(CommandStep::NvmeList)
            .map(|out| listed(&parse_device_list(out), &request.device));
        let error_log_entries =
            passed_output(CommandStep::NvmeErrorLog).map(count_error_log_entries);

        RunReport {
            schema_version: REPORT_SCHEMA_VERSION.to_string(),
            run_id,
            quid: request.quid.clone(),
            description: request.description.clone(),
            device: request.device.clone(),
            device_type: request.device_type,
            started_at,
            finished_at: Utc::now(),
            duration_ms,
            final_state: result.state,
            plan_digest: compute_plan_digest(&CommandStep::ALL),
            precondition: result.precondition,
            outcomes: result.outcomes,
            verdict: evaluation.verdict,
            reasons: evaluation.reasons,
            details: evaluation.details,
            controller,
            firmware,
            device_listed,
            error_log_entries,
        }
    }
}

/// `nvme list` shows namespaces (`/dev/nvme0n1`); a controller node
/// (`/dev/nvme0`) counts as listed when one of its namespaces is.
fn listed(nodes: &[String], device: &str) -> bool {
    nodes.iter().any(|node| {
        node == device
            || node
                .strip_prefix(device)
                .is_some_and(|rest| rest.starts_with('n'))
    })
}
