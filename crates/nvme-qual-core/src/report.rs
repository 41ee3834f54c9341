//! Run report and the artifacts written from it.

use crate::criteria::{FailureReason, RuleDetails, RuleFamily, Verdict};
use crate::parse::{ControllerIdentity, FirmwareLog};
use crate::profile::DeviceType;
use crate::runner::CommandOutcome;
use crate::sequencer::{PreconditionReport, SequencerState};
use crate::step::CommandStep;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const REPORT_SCHEMA_VERSION: &str = "1.0";

/// Test suite and case names the test data system files results under.
pub const TDS_TEST_SUITE: &str = "linux_nvme_01";
pub const TDS_TEST_CASE: &str = "nvme_information_cmd";

const STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Everything known about one qualification run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunReport {
    pub schema_version: String,
    pub run_id: Uuid,
    pub quid: String,
    pub description: String,
    pub device: String,
    pub device_type: DeviceType,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub final_state: SequencerState,
    /// SHA-256 over the ordered step names of the executed plan.
    pub plan_digest: String,
    pub precondition: Option<PreconditionReport>,
    pub outcomes: Vec<CommandOutcome>,
    pub verdict: Verdict,
    pub reasons: Vec<FailureReason>,
    pub details: RuleDetails,
    pub controller: Option<ControllerIdentity>,
    pub firmware: Option<FirmwareLog>,
    /// Whether `nvme list` showed the target device.
    pub device_listed: Option<bool>,
    /// Entries printed by `nvme error-log`.
    pub error_log_entries: Option<usize>,
}

impl RunReport {
    pub fn passed(&self) -> bool {
        self.verdict.overall_pass
    }

    /// Timestamp used in artifact file names.
    pub fn artifact_stamp(&self) -> String {
        self.started_at.format(STAMP_FORMAT).to_string()
    }

    pub fn status(&self) -> &'static str {
        if self.passed() {
            "PASS"
        } else {
            "FAIL"
        }
    }
}

/// Path of the run log, `nvme_qual_<timestamp>.log`, stamped with the
/// current time.
pub fn new_log_file_path(output_dir: &Path) -> PathBuf {
    output_dir.join(format!("nvme_qual_{}.log", Utc::now().format(STAMP_FORMAT)))
}

/// Deterministic digest of the ordered step names.
pub fn compute_plan_digest(steps: &[CommandStep]) -> String {
    let mut hasher = Sha256::new();
    for step in steps {
        hasher.update(step.name().as_bytes());
        hasher.update(b"\0");
    }
    hex::encode(hasher.finalize())
}

/// Paths of the artifacts written for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub results_json: PathBuf,
    pub summary_md: PathBuf,
    pub summary_csv: PathBuf,
    pub tds_json: PathBuf,
    pub raw_outputs: Vec<PathBuf>,
}

/// Write the JSON results, markdown and CSV summaries, (optionally) raw
/// step outputs, and last the TDS record listing them, into `output_dir`,
/// creating it if needed. `log_file` is listed as a deliverable when set.
pub fn write_artifacts(
    output_dir: &Path,
    report: &RunReport,
    save_raw_outputs: bool,
    log_file: Option<&Path>,
) -> Result<ArtifactPaths> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("create output dir {:?}", output_dir))?;

    let stamp = report.artifact_stamp();
    let results_json = output_dir.join(format!("nvme_qual_results_{}.json", stamp));
    let summary_md = output_dir.join(format!("nvme_qual_summary_{}.md", stamp));
    let summary_csv = output_dir.join(format!("nvme_qual_summary_{}.csv", stamp));
    let tds_json = output_dir.join(format!("tds_integration_{}.json", stamp));

    write_results_json(&results_json, report)?;
    write_summary_md(&summary_md, report)?;
    write_summary_csv(&summary_csv, report)?;

    let raw_outputs = if save_raw_outputs {
        write_raw_outputs(&output_dir.join("raw"), &report.outcomes)?
    } else {
        Vec::new()
    };

    let deliverables = TdsDeliverables {
        log_files: log_file.map(Path::to_path_buf).into_iter().collect(),
        result_files: vec![results_json.clone(), summary_md.clone(), summary_csv.clone()],
        raw_outputs_available: !raw_outputs.is_empty(),
    };
    write_tds_json(&tds_json, &TdsRecord::new(report, deliverables))?;

    Ok(ArtifactPaths {
        results_json,
        summary_md,
        summary_csv,
        tds_json,
        raw_outputs,
    })
}

/// Write the report as pretty JSON.
pub fn write_results_json(path: &Path, report: &RunReport) -> Result<()> {
    let content = serde_json::to_string_pretty(report).context("serialize run report")?;
    std::fs::write(path, content).with_context(|| format!("write {:?}", path))?;
    Ok(())
}

/// Write one `<step>.txt` per outcome. Failed steps get their error
/// detail appended after the captured output.
pub fn write_raw_outputs(dir: &Path, outcomes: &[CommandOutcome]) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir).with_context(|| format!("create raw dir {:?}", dir))?;

    let mut written = Vec::with_capacity(outcomes.len());
    for outcome in outcomes {
        let path = dir.join(format!("{}.txt", outcome.step.name()));
        let mut content = outcome.raw_output.clone();
        if !outcome.passed() {
            if !content.is_empty() && !content.ends_with('\n') {
                content.push('\n');
            }
            content.push_str(&format!("# error: {}\n", outcome.detail));
        }
        std::fs::write(&path, content).with_context(|| format!("write {:?}", path))?;
        written.push(path);
    }
    Ok(written)
}

/// Render the markdown summary.
pub fn render_summary_md(report: &RunReport) -> String {
    let mut out = String::new();
    let verdict = report.status();

    out.push_str("# NVMe Qualification Summary\n\n");
    out.push_str(&format!(
        "- run id: `{}`\n- quid: {}\n- description: {}\n- device: `{}`\n- device type: {}\n- started: {}\n- finished: {}\n- duration: {} ms\n- final state: {}\n- plan digest: `{}`\n\n",
        report.run_id,
        report.quid,
        report.description,
        report.device,
        report.device_type,
        report.started_at.to_rfc3339(),
        report.finished_at.to_rfc3339(),
        report.duration_ms,
        report.final_state,
        report.plan_digest,
    ));

    out.push_str(&format!("## Verdict: {}\n\n", verdict));
    if report.verdict.failure_reasons.is_empty() {
        out.push_str("No failure reasons.\n\n");
    } else {
        for reason in &report.verdict.failure_reasons {
            out.push_str(&format!("- `{}`\n", reason));
        }
        out.push('\n');
    }

    if let Some(pre) = &report.precondition {
        out.push_str("## Precondition\n");
        out.push_str(&format!(
            "- namespace 1 size: {}\n- passed: {}\n\n",
            pre.namespace_size
                .map(|n| n.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            pre.passed
        ));
    }

    if !report.outcomes.is_empty() {
        out.push_str("## Commands\n");
        out.push_str("| # | step | result | elapsed (ms) | detail |\n");
        out.push_str("|---|------|--------|--------------|--------|\n");
        for outcome in &report.outcomes {
            out.push_str(&format!(
                "| {} | {} | {} | {} | {} |\n",
                outcome.step.position(),
                outcome.step,
                if outcome.passed() { "ok" } else { "failed" },
                outcome.elapsed.as_millis(),
                outcome.detail.replace('|', "\\|"),
            ));
        }
        out.push('\n');

        let stats = &report.details.commands;
        out.push_str(&format!(
            "- executed: {}\n- passed: {}\n- failed: {}\n- timed out: {}\n\n",
            stats.total, stats.passed, stats.failed, stats.timed_out
        ));
    }

    if report.device_listed.is_some() || report.error_log_entries.is_some() {
        out.push_str("## Inventory\n");
        if let Some(listed) = report.device_listed {
            out.push_str(&format!("- listed by nvme list: {}\n", listed));
        }
        if let Some(entries) = report.error_log_entries {
            out.push_str(&format!("- error log entries: {}\n", entries));
        }
        out.push('\n');
    }

    if let Some(controller) = &report.controller {
        out.push_str("## Controller\n");
        let field = |v: &Option<String>| v.clone().unwrap_or_else(|| "-".to_string());
        out.push_str(&format!(
            "- model: {}\n- serial: {}\n- firmware: {}\n",
            field(&controller.model),
            field(&controller.serial),
            field(&controller.firmware_revision)
        ));
        if let Some(slot) = report.firmware.as_ref().and_then(|fw| fw.active_slot) {
            out.push_str(&format!("- active firmware slot: {}\n", slot));
        }
        out.push('\n');
    }

    out
}

/// Write the markdown summary.
pub fn write_summary_md(path: &Path, report: &RunReport) -> Result<()> {
    let md = render_summary_md(report);
    std::fs::write(path, md).with_context(|| format!("write {:?}", path))?;
    Ok(())
}

const CSV_COLUMNS: [&str; 18] = [
    "timestamp",
    "run_id",
    "device",
    "device_type",
    "quid",
    "overall_status",
    "duration_ms",
    "commands_executed",
    "commands_passed",
    "commands_failed",
    "commands_timed_out",
    "failure_count",
    "failure_reasons",
    "smart_media_errors",
    "smart_critical_warning",
    "pcie_width",
    "pcie_speed",
    "pcie_validation",
];

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn opt<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Render the one-row CSV summary used for batch collection. Reasons are
/// joined with `; `; fields with no data are left empty.
pub fn render_summary_csv(report: &RunReport) -> String {
    let details = &report.details;
    let pcie_validation = details.pcie.data_available
        && !report.reasons.iter().any(|r| r.family == RuleFamily::Pcie);

    let row = [
        report.finished_at.to_rfc3339(),
        report.run_id.to_string(),
        report.device.clone(),
        report.device_type.to_string(),
        report.quid.clone(),
        report.status().to_string(),
        report.duration_ms.to_string(),
        details.commands.total.to_string(),
        details.commands.passed.to_string(),
        details.commands.failed.to_string(),
        details.commands.timed_out.to_string(),
        report.verdict.failure_reasons.len().to_string(),
        report.verdict.failure_reasons.join("; "),
        opt(details.smart.media_errors),
        opt(details.smart.critical_warning.map(|cw| cw.has_critical())),
        opt(details.pcie.actual_width),
        opt(details.pcie.actual_speed),
        pcie_validation.to_string(),
    ];

    let row: Vec<String> = row.iter().map(|v| csv_field(v)).collect();
    format!("{}\n{}\n", CSV_COLUMNS.join(","), row.join(","))
}

/// Write the CSV summary.
pub fn write_summary_csv(path: &Path, report: &RunReport) -> Result<()> {
    let csv = render_summary_csv(report);
    std::fs::write(path, csv).with_context(|| format!("write {:?}", path))?;
    Ok(())
}

/// Result record in the test data system (TDS) intake format.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TdsRecord {
    pub qualification_id: String,
    pub test_suite: String,
    pub test_case: String,
    pub device_under_test: TdsDevice,
    pub execution_info: TdsExecution,
    pub test_verdict: TdsVerdict,
    pub metrics: TdsMetrics,
    pub deliverables: TdsDeliverables,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TdsDevice {
    pub device_path: String,
    pub device_type: DeviceType,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TdsExecution {
    pub run_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_seconds: f64,
    pub final_state: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TdsVerdict {
    /// `PASS` or `FAIL`.
    pub overall_result: String,
    pub pass_criteria_met: bool,
    pub failure_reasons: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TdsMetrics {
    pub commands_total: usize,
    pub commands_passed: usize,
    pub commands_failed: usize,
    pub commands_timed_out: usize,
    /// Passed over executed, 0 when nothing ran.
    pub success_rate_percent: f64,
}

/// Files produced by the run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TdsDeliverables {
    pub log_files: Vec<PathBuf>,
    pub result_files: Vec<PathBuf>,
    pub raw_outputs_available: bool,
}

impl TdsRecord {
    pub fn new(report: &RunReport, deliverables: TdsDeliverables) -> Self {
        let stats = &report.details.commands;
        let success_rate_percent = if stats.total == 0 {
            0.0
        } else {
            stats.passed as f64 / stats.total as f64 * 100.0
        };

        Self {
            qualification_id: report.quid.clone(),
            test_suite: TDS_TEST_SUITE.to_string(),
            test_case: TDS_TEST_CASE.to_string(),
            device_under_test: TdsDevice {
                device_path: report.device.clone(),
                device_type: report.device_type,
                description: report.description.clone(),
            },
            execution_info: TdsExecution {
                run_id: report.run_id,
                start_time: report.started_at,
                end_time: report.finished_at,
                duration_seconds: report.duration_ms as f64 / 1000.0,
                final_state: report.final_state.name().to_string(),
            },
            test_verdict: TdsVerdict {
                overall_result: report.status().to_string(),
                pass_criteria_met: report.passed(),
                failure_reasons: report.verdict.failure_reasons.clone(),
            },
            metrics: TdsMetrics {
                commands_total: stats.total,
                commands_passed: stats.passed,
                commands_failed: stats.failed,
                commands_timed_out: stats.timed_out,
                success_rate_percent,
            },
            deliverables,
        }
    }
}

/// Write the TDS record as pretty JSON.
pub fn write_tds_json(path: &Path, record: &TdsRecord) -> Result<()> {
    let content = serde_json::to_string_pretty(record).context("serialize TDS record")?;
    std::fs::write(path, content).with_context(|| format!("write {:?}", path))?;
    Ok(())
}
