//! Single device-query execution with a hard time budget.

use crate::step::{CommandStep, QueryKind};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, error, warn};

/// Completion status, stdout and stderr of one external query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryOutput {
    pub status_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Backend that performs the actual device query.
///
/// Implementations only map a [`QueryKind`] to whatever mechanism reaches
/// the device. A backend may report its own timeout by returning an
/// `io::Error` of kind `TimedOut`; the runner also enforces the budget.
#[async_trait]
pub trait DeviceQuery: Send + Sync {
    async fn query(&self, kind: QueryKind, device: &str) -> std::io::Result<QueryOutput>;
}

/// nvme-cli backed query.
#[derive(Debug, Clone)]
pub struct NvmeCli {
    binary: String,
}

impl NvmeCli {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Full command line for a query, for logs and dry runs.
    pub fn command_line(&self, kind: QueryKind, device: &str) -> String {
        let mut parts = vec![self.binary.clone()];
        parts.extend(kind.nvme_args(device));
        parts.join(" ")
    }
}

impl Default for NvmeCli {
    fn default() -> Self {
        Self::new("nvme")
    }
}

#[async_trait]
impl DeviceQuery for NvmeCli {
    async fn query(&self, kind: QueryKind, device: &str) -> std::io::Result<QueryOutput> {
        // kill_on_drop reaps the child when the runner's timeout drops this future
        let child = Command::new(&self.binary)
            .args(kind.nvme_args(device))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let output = child.wait_with_output().await?;

        Ok(QueryOutput {
            status_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

/// How a step failed, if it did.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    None,
    Timeout,
    ResponseFailure,
}

/// Result of one step. Read-only once recorded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandOutcome {
    pub step: CommandStep,

    /// Whether the query completed with status 0 inside its budget.
    pub success: bool,

    /// Captured stdout. Empty after a timeout.
    pub raw_output: String,

    pub error_kind: ErrorKind,

    /// Wall-clock time spent on the query.
    #[serde(with = "duration_ms")]
    pub elapsed: Duration,

    /// Completion status; `None` when the query never completed.
    pub exit_code: Option<i32>,

    /// Failure description (stderr, spawn error, timeout budget).
    pub detail: String,
}

impl CommandOutcome {
    pub fn passed(&self) -> bool {
        self.success && self.error_kind == ErrorKind::None
    }
}

/// Outcome of an arbitrary query, before it is attributed to a step.
#[derive(Debug, Clone)]
pub struct QueryAttempt {
    pub success: bool,
    pub stdout: String,
    pub error_kind: ErrorKind,
    pub elapsed: Duration,
    pub exit_code: Option<i32>,
    pub detail: String,
}

/// Executes one query per call against a fixed device path.
#[derive(Clone)]
pub struct CommandRunner {
    query: Arc<dyn DeviceQuery>,
    device: String,
}

impl CommandRunner {
    pub fn new(query: Arc<dyn DeviceQuery>, device: impl Into<String>) -> Self {
        Self {
            query,
            device: device.into(),
        }
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    /// Execute a single plan step. Never fails: every problem is recorded
    /// in the returned outcome. No retries.
    pub async fn run(&self, step: CommandStep, timeout: Duration) -> CommandOutcome {
        let attempt = self.attempt(QueryKind::Step(step), timeout).await;
        CommandOutcome {
            step,
            success: attempt.success,
            raw_output: attempt.stdout,
            error_kind: attempt.error_kind,
            elapsed: attempt.elapsed,
            exit_code: attempt.exit_code,
            detail: attempt.detail,
        }
    }

    /// Execute any query kind under `timeout`.
    pub async fn attempt(&self, kind: QueryKind, timeout: Duration) -> QueryAttempt {
        let start = Instant::now();
        debug!(query = %kind, device = %self.device, "Executing query");

        let result = tokio::time::timeout(timeout, self.query.query(kind, &self.device)).await;
        let elapsed = start.elapsed();

        match result {
            Ok(Ok(output)) if output.status_code == 0 => QueryAttempt {
                success: true,
                stdout: output.stdout,
                error_kind: ErrorKind::None,
                elapsed,
                exit_code: Some(0),
                detail: String::new(),
            },
            Ok(Ok(output)) => {
                let mut detail = format!("Command failed with return code {}", output.status_code);
                let stderr = output.stderr.trim();
                if !stderr.is_empty() {
                    detail.push_str(": ");
                    detail.push_str(stderr);
                }
                warn!(query = %kind, exit_code = output.status_code, "{}", detail);
                QueryAttempt {
                    success: false,
                    stdout: output.stdout,
                    error_kind: ErrorKind::ResponseFailure,
                    elapsed,
                    exit_code: Some(output.status_code),
                    detail,
                }
            }
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::TimedOut => {
                error!(query = %kind, error = %e, "Query reported timeout");
                timed_out(elapsed, format!("Query timed out: {}", e))
            }
            Ok(Err(e)) => {
                let detail = format!("Query could not be executed: {}", e);
                warn!(query = %kind, error = %e, "Query execution error");
                QueryAttempt {
                    success: false,
                    stdout: String::new(),
                    error_kind: ErrorKind::ResponseFailure,
                    elapsed,
                    exit_code: None,
                    detail,
                }
            }
            Err(_) => {
                error!(
                    query = %kind,
                    timeout_ms = timeout.as_millis() as u64,
                    "Query timed out"
                );
                timed_out(
                    elapsed,
                    format!("Command timed out after {:.1} seconds", timeout.as_secs_f64()),
                )
            }
        }
    }
}

fn timed_out(elapsed: Duration, detail: String) -> QueryAttempt {
    QueryAttempt {
        success: false,
        stdout: String::new(),
        error_kind: ErrorKind::Timeout,
        elapsed,
        exit_code: None,
        detail,
    }
}

/// Serialize a `Duration` as integer milliseconds.
pub mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{ScriptedDevice, ScriptedResponse};

    fn runner_for(device: ScriptedDevice) -> CommandRunner {
        CommandRunner::new(Arc::new(device), "/dev/nvme0n1")
    }

    #[tokio::test]
    async fn test_successful_query() {
        let device = ScriptedDevice::new()
            .with(CommandStep::NvmeList, ScriptedResponse::ok("/dev/nvme0n1 ...\n"));
        let outcome = runner_for(device)
            .run(CommandStep::NvmeList, Duration::from_secs(5))
            .await;

        assert!(outcome.passed());
        assert_eq!(outcome.error_kind, ErrorKind::None);
        assert_eq!(outcome.exit_code, Some(0));
        assert!(outcome.raw_output.contains("/dev/nvme0n1"));
    }

    #[tokio::test]
    async fn test_non_zero_status_is_response_failure() {
        let device = ScriptedDevice::new().with(
            CommandStep::NvmeFwLog,
            ScriptedResponse::status(22, "", "Invalid argument"),
        );
        let outcome = runner_for(device)
            .run(CommandStep::NvmeFwLog, Duration::from_secs(5))
            .await;

        assert!(!outcome.success);
        assert_eq!(outcome.error_kind, ErrorKind::ResponseFailure);
        assert_eq!(outcome.exit_code, Some(22));
        assert!(outcome.detail.contains("Invalid argument"));
    }

    #[tokio::test]
    async fn test_hang_is_timeout() {
        let device = ScriptedDevice::new().with(CommandStep::NvmeShowRegs, ScriptedResponse::Hang);
        let outcome = runner_for(device)
            .run(CommandStep::NvmeShowRegs, Duration::from_millis(20))
            .await;

        assert!(!outcome.success);
        assert_eq!(outcome.error_kind, ErrorKind::Timeout);
        assert!(outcome.raw_output.is_empty());
        assert_eq!(outcome.exit_code, None);
    }

    #[tokio::test]
    async fn test_backend_reported_timeout() {
        let device = ScriptedDevice::new().with(
            CommandStep::NvmeSmartLog,
            ScriptedResponse::Error(std::io::ErrorKind::TimedOut),
        );
        let outcome = runner_for(device)
            .run(CommandStep::NvmeSmartLog, Duration::from_secs(5))
            .await;
        assert_eq!(outcome.error_kind, ErrorKind::Timeout);
    }

    #[tokio::test]
    async fn test_spawn_error_is_captured_not_raised() {
        let device = ScriptedDevice::new().with(
            CommandStep::NvmeIdCtrl,
            ScriptedResponse::Error(std::io::ErrorKind::NotFound),
        );
        let outcome = runner_for(device)
            .run(CommandStep::NvmeIdCtrl, Duration::from_secs(5))
            .await;
        assert_eq!(outcome.error_kind, ErrorKind::ResponseFailure);
        assert_eq!(outcome.exit_code, None);
        assert!(outcome.detail.contains("could not be executed"));
    }

    #[tokio::test]
    async fn test_missing_binary_is_response_failure() {
        let cli = NvmeCli::new("/nonexistent/nvme-binary");
        let runner = CommandRunner::new(Arc::new(cli), "/dev/nvme0n1");
        let outcome = runner
            .run(CommandStep::NvmeList, Duration::from_secs(5))
            .await;
        assert_eq!(outcome.error_kind, ErrorKind::ResponseFailure);
    }

    #[test]
    fn test_command_line_rendering() {
        let cli = NvmeCli::default();
        assert_eq!(
            cli.command_line(QueryKind::Step(CommandStep::NvmeSmartLog), "/dev/nvme1n1"),
            "nvme smart-log /dev/nvme1n1"
        );
        assert_eq!(
            cli.command_line(QueryKind::NamespaceSize, "/dev/nvme1n1"),
            "nvme id-ns /dev/nvme1n1 -n 1"
        );
    }

    #[test]
    fn test_outcome_serializes_elapsed_as_millis() {
        let outcome = CommandOutcome {
            step: CommandStep::NvmeList,
            success: true,
            raw_output: String::new(),
            error_kind: ErrorKind::None,
            elapsed: Duration::from_millis(1500),
            exit_code: Some(0),
            detail: String::new(),
        };
        let json = serde_json::to_value(&outcome).expect("serialize");
        assert_eq!(json["elapsed"], 1500);
        assert_eq!(json["error_kind"], "none");
        assert_eq!(json["step"], "nvme_list");
    }
}
