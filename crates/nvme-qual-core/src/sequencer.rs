//! Ordered execution of the command plan.
//!
//! ```text
//! NotStarted -> PreconditionChecked -> Running(1..8) -> Completed
//!      \
//!       -> Aborted (namespace 1 reports size 0 or cannot be queried)
//! ```
//!
//! Steps run strictly one after another. A failed step is recorded and
//! the next step still runs; only the precondition can stop a run.

use crate::criteria::NAMESPACE_NOT_INITIALIZED;
use crate::obs;
use crate::parse::parse_namespace_size;
use crate::runner::{CommandOutcome, CommandRunner, ErrorKind};
use crate::step::{CommandStep, QueryKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SequencerState {
    NotStarted,
    PreconditionChecked,
    Running { step: CommandStep },
    Completed,
    Aborted { reason: String },
}

impl SequencerState {
    pub fn name(&self) -> &'static str {
        match self {
            SequencerState::NotStarted => "not_started",
            SequencerState::PreconditionChecked => "precondition_checked",
            SequencerState::Running { .. } => "running",
            SequencerState::Completed => "completed",
            SequencerState::Aborted { .. } => "aborted",
        }
    }
}

impl fmt::Display for SequencerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SequencerState::Running { step } => write!(f, "running({})", step),
            SequencerState::Aborted { reason } => write!(f, "aborted({})", reason),
            other => f.write_str(other.name()),
        }
    }
}

/// What the precondition query saw.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PreconditionReport {
    pub namespace_size: Option<u64>,
    pub passed: bool,
    pub error_kind: ErrorKind,
    #[serde(with = "crate::runner::duration_ms")]
    pub elapsed: Duration,
    pub detail: String,
}

/// Final state and records of one sequencer run.
#[derive(Debug, Clone)]
pub struct SequenceResult {
    pub state: SequencerState,
    pub precondition: Option<PreconditionReport>,
    pub outcomes: Vec<CommandOutcome>,
    pub duration: Duration,
}

impl SequenceResult {
    pub fn is_completed(&self) -> bool {
        self.state == SequencerState::Completed
    }

    /// Number of steps that passed.
    pub fn passed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.passed()).count()
    }

    /// Number of steps that failed.
    pub fn failed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.passed()).count()
    }
}

/// Runs the fixed plan once against the runner's device.
pub struct Sequencer {
    runner: CommandRunner,
    timeout: Duration,
    inter_step_delay: Duration,
    state: SequencerState,
    precondition: Option<PreconditionReport>,
    outcomes: Vec<CommandOutcome>,
}

impl Sequencer {
    pub fn new(runner: CommandRunner, timeout: Duration) -> Self {
        Self {
            runner,
            timeout,
            inter_step_delay: Duration::ZERO,
            state: SequencerState::NotStarted,
            precondition: None,
            outcomes: Vec::with_capacity(CommandStep::ALL.len()),
        }
    }

    /// Pause between consecutive steps.
    pub fn with_inter_step_delay(mut self, delay: Duration) -> Self {
        self.inter_step_delay = delay;
        self
    }

    /// Execute the precondition and, if it holds, all eight steps.
    pub async fn run(mut self) -> SequenceResult {
        let start = Instant::now();
        info!(device = %self.runner.device(), "Starting NVMe information command sequence");

        if self.check_precondition().await {
            self.run_steps().await;
        }

        SequenceResult {
            state: self.state,
            precondition: self.precondition,
            outcomes: self.outcomes,
            duration: start.elapsed(),
        }
    }

    async fn check_precondition(&mut self) -> bool {
        info!("Validating namespace 1 initialization");
        let attempt = self
            .runner
            .attempt(QueryKind::NamespaceSize, self.timeout)
            .await;

        let namespace_size = if attempt.success {
            parse_namespace_size(&attempt.stdout)
        } else {
            None
        };
        let passed = namespace_size.is_some_and(|size| size > 0);
        obs::emit_precondition_checked(namespace_size, passed);

        self.precondition = Some(PreconditionReport {
            namespace_size,
            passed,
            error_kind: attempt.error_kind,
            elapsed: attempt.elapsed,
            detail: attempt.detail,
        });

        self.state = if passed {
            SequencerState::PreconditionChecked
        } else {
            SequencerState::Aborted {
                reason: NAMESPACE_NOT_INITIALIZED.to_string(),
            }
        };
        passed
    }

    async fn run_steps(&mut self) {
        let total = CommandStep::ALL.len();

        for (i, step) in CommandStep::ALL.into_iter().enumerate() {
            let position = i + 1;
            self.state = SequencerState::Running { step };
            info!("[{}/{}] Executing {}: {}", position, total, step, step.description());

            let outcome = self.runner.run(step, self.timeout).await;
            obs::emit_step_finished(position, total, &outcome);
            self.outcomes.push(outcome);

            if position < total && !self.inter_step_delay.is_zero() {
                tokio::time::sleep(self.inter_step_delay).await;
            }
        }

        self.state = SequencerState::Completed;
    }
}
