//! Pass/fail criteria evaluation.
//!
//! Four independent rule families contribute failure reason codes:
//!
//! 1. SMART (smart-log): critical warning bits other than thermal, media
//!    errors, wear level and spare capacity.
//! 2. PCIe link (show-regs): width must match exactly, speed must be at
//!    least the expected generation.
//! 3. Command health (all steps): any timeout or response failure.
//! 4. Firmware health (show-regs): CSTS.CFS set, controller not ready.
//!
//! Every family runs on every evaluation and reasons accumulate in that
//! order. The evaluator never fails: missing or malformed data becomes an
//! explicit reason code.

use crate::decode::{
    link_speed_label, ControllerStatus, CriticalWarning, DecodeOutOfRange, PcieLinkStatus,
};
use crate::parse::{parse_registers, parse_smart_log, Field};
use crate::profile::DeviceTypeProfile;
use crate::runner::{CommandOutcome, ErrorKind};
use crate::step::CommandStep;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub const NAMESPACE_NOT_INITIALIZED: &str = "NAMESPACE_NOT_INITIALIZED";
pub const INCOMPLETE_RUN: &str = "INCOMPLETE_RUN";

/// Final pass/fail decision for one run. Terminal once produced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Verdict {
    /// True exactly when `failure_reasons` is empty.
    pub overall_pass: bool,

    /// Reason codes in rule order, without duplicates.
    pub failure_reasons: Vec<String>,
}

impl Verdict {
    fn from_reasons(reasons: &[FailureReason]) -> Self {
        let mut codes: Vec<String> = Vec::with_capacity(reasons.len());
        for reason in reasons {
            if !codes.contains(&reason.code) {
                codes.push(reason.code.clone());
            }
        }
        Self {
            overall_pass: codes.is_empty(),
            failure_reasons: codes,
        }
    }

    /// Verdict for a run stopped by its precondition.
    pub fn aborted(reason: &str) -> Self {
        Self {
            overall_pass: false,
            failure_reasons: vec![reason.to_string()],
        }
    }
}

/// Which rule family produced a reason.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RuleFamily {
    Precondition,
    Completeness,
    Smart,
    Pcie,
    Command,
    Firmware,
}

/// Error taxonomy a reason falls under.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    PreconditionFailure,
    IncompleteRun,
    StepTimeout,
    StepResponseFailure,
    DataUnavailable,
    DecodeOutOfRange,
    RuleViolation,
}

/// One itemized reason with its provenance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FailureReason {
    pub code: String,
    pub family: RuleFamily,
    pub class: FailureClass,
}

impl FailureReason {
    fn new(code: impl Into<String>, family: RuleFamily, class: FailureClass) -> Self {
        Self {
            code: code.into(),
            family,
            class,
        }
    }

    pub fn precondition(code: &str) -> Self {
        Self::new(code, RuleFamily::Precondition, FailureClass::PreconditionFailure)
    }
}

/// SMART rule findings from the smart-log step.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SmartDetail {
    /// The smart-log step passed and its output was parsed.
    pub data_available: bool,
    /// Critical warning value as printed, before the range check.
    pub critical_warning_raw: Option<u64>,
    /// Decoded warning bits, when the raw value fit in one byte.
    pub critical_warning: Option<CriticalWarning>,
    /// Temperature threshold bit set; logged, never a failure.
    pub thermal_warning: bool,
    pub media_errors: Option<u64>,
    /// Wear level in percent.
    pub percent_used: Option<u64>,
    /// Available spare in percent.
    pub available_spare: Option<u64>,
    /// Spare threshold in percent.
    pub spare_threshold: Option<u64>,
    pub temperature: Option<u64>,
}

/// PCIe link findings from the show-regs step.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PcieDetail {
    /// The show-regs step passed and its output was parsed.
    pub data_available: bool,
    /// Lane count required by the device profile.
    pub expected_width: u8,
    /// Minimum link generation required by the device profile.
    pub expected_speed: u8,
    /// Negotiated lane count decoded from LNKSTA.
    pub actual_width: Option<u8>,
    /// Negotiated generation decoded from LNKSTA.
    pub actual_speed: Option<u8>,
}

/// Per-step execution counts across the plan.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandStats {
    /// Outcomes evaluated.
    pub total: usize,
    pub passed: usize,
    /// Failed outcomes, timeouts included.
    pub failed: usize,
    pub timed_out: usize,
    /// Failed steps in plan order.
    pub failed_steps: Vec<CommandStep>,
}

/// Controller health findings from the show-regs step.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FirmwareDetail {
    /// The show-regs step passed and its output was parsed.
    pub data_available: bool,
    /// Raw CSTS register value.
    pub csts: Option<u64>,
    /// CSTS.RDY
    pub controller_ready: Option<bool>,
    /// CSTS.CFS
    pub fatal_error: Option<bool>,
    /// CC.EN; reported only, never a failure.
    pub controller_enabled: Option<bool>,
}

/// Per-family findings backing a verdict.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuleDetails {
    pub smart: SmartDetail,
    pub pcie: PcieDetail,
    pub commands: CommandStats,
    pub firmware: FirmwareDetail,
}

/// Verdict plus the itemized reasons and details behind it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Evaluation {
    pub verdict: Verdict,
    pub reasons: Vec<FailureReason>,
    pub details: RuleDetails,
}

impl Evaluation {
    /// Evaluation for a run that never reached its first step.
    pub fn aborted(reason: &str) -> Self {
        Self {
            verdict: Verdict::aborted(reason),
            reasons: vec![FailureReason::precondition(reason)],
            details: RuleDetails::default(),
        }
    }
}

/// Stateless evaluator bound to the active device profile.
#[derive(Debug, Clone)]
pub struct CriteriaEvaluator {
    profile: DeviceTypeProfile,
}

impl CriteriaEvaluator {
    pub fn new(profile: DeviceTypeProfile) -> Self {
        Self { profile }
    }

    pub fn profile(&self) -> &DeviceTypeProfile {
        &self.profile
    }

    /// Evaluate the outcome set and return only the verdict.
    pub fn evaluate(&self, outcomes: &[CommandOutcome]) -> Verdict {
        self.evaluate_detailed(outcomes).verdict
    }

    /// Evaluate all rule families over the outcome set.
    ///
    /// An outcome set that does not hold exactly one record per plan step
    /// yields an incomplete-run verdict and no rule runs.
    pub fn evaluate_detailed(&self, outcomes: &[CommandOutcome]) -> Evaluation {
        info!("Starting pass/fail criteria analysis");

        let incomplete = completeness_reasons(outcomes);
        if !incomplete.is_empty() {
            warn!(outcomes = outcomes.len(), "Outcome set is incomplete");
            return Evaluation {
                verdict: Verdict::from_reasons(&incomplete),
                reasons: incomplete,
                details: RuleDetails::default(),
            };
        }

        let find = |step: CommandStep| outcomes.iter().find(|o| o.step == step);
        let show_regs = find(CommandStep::NvmeShowRegs);

        let mut reasons = Vec::new();
        let smart = smart_rule(find(CommandStep::NvmeSmartLog), &self.profile, &mut reasons);
        let pcie = pcie_rule(show_regs, &self.profile, &mut reasons);
        let commands = command_rule(outcomes, &mut reasons);
        let firmware = firmware_rule(show_regs, &mut reasons);

        let verdict = Verdict::from_reasons(&reasons);
        for reason in &verdict.failure_reasons {
            warn!(reason = %reason, "Failure reason");
        }
        info!(
            passed = verdict.overall_pass,
            reasons = verdict.failure_reasons.len(),
            "Criteria analysis complete"
        );

        Evaluation {
            verdict,
            reasons,
            details: RuleDetails {
                smart,
                pcie,
                commands,
                firmware,
            },
        }
    }
}

fn completeness_reasons(outcomes: &[CommandOutcome]) -> Vec<FailureReason> {
    let missing: Vec<CommandStep> = CommandStep::ALL
        .iter()
        .copied()
        .filter(|step| !outcomes.iter().any(|o| o.step == *step))
        .collect();

    if missing.is_empty() && outcomes.len() == CommandStep::ALL.len() {
        return Vec::new();
    }

    let mut reasons = vec![FailureReason::new(
        INCOMPLETE_RUN,
        RuleFamily::Completeness,
        FailureClass::IncompleteRun,
    )];
    if missing.is_empty() {
        reasons.push(FailureReason::new(
            format!("UNEXPECTED_OUTCOME_COUNT_{}", outcomes.len()),
            RuleFamily::Completeness,
            FailureClass::IncompleteRun,
        ));
    }
    for step in missing {
        reasons.push(FailureReason::new(
            format!("COMMAND_{}_MISSING", step.reason_tag()),
            RuleFamily::Completeness,
            FailureClass::IncompleteRun,
        ));
    }
    reasons
}

fn smart_rule(
    outcome: Option<&CommandOutcome>,
    profile: &DeviceTypeProfile,
    reasons: &mut Vec<FailureReason>,
) -> SmartDetail {
    let mut push = |code: String, class: FailureClass| {
        reasons.push(FailureReason::new(code, RuleFamily::Smart, class));
    };

    let mut detail = SmartDetail::default();
    let Some(outcome) = outcome.filter(|o| o.passed()) else {
        push("SMART_DATA_UNAVAILABLE".to_string(), FailureClass::DataUnavailable);
        return detail;
    };
    detail.data_available = true;

    let fields = parse_smart_log(&outcome.raw_output);
    detail.critical_warning_raw = fields.critical_warning.value();
    detail.media_errors = fields.media_errors.value();
    detail.percent_used = fields.percent_used.value();
    detail.available_spare = fields.available_spare.value();
    detail.spare_threshold = fields.spare_threshold.value();
    detail.temperature = fields.temperature.value();

    let critical_warning = match fields.critical_warning {
        Field::Absent => None,
        Field::Invalid => Some(Err(None)),
        Field::Value(raw) => Some(CriticalWarning::try_from_raw(raw).map_err(Some)),
    };
    match critical_warning {
        None => push(
            "SMART_CRITICAL_WARNING_NOT_FOUND".to_string(),
            FailureClass::DataUnavailable,
        ),
        Some(Err(e)) => {
            warn!(error = ?e, "SMART critical warning undecodable");
            push(
                "SMART_CRITICAL_WARNING_UNDECODABLE".to_string(),
                FailureClass::DecodeOutOfRange,
            );
        }
        Some(Ok(cw)) => {
            detail.critical_warning = Some(cw);
            detail.thermal_warning = cw.temperature_threshold;
            if cw.temperature_threshold {
                warn!("SMART thermal warning detected (allowed)");
            }
            let flags = [
                (cw.available_spare_low, "SMART_AVAILABLE_SPARE_LOW"),
                (cw.nvm_subsystem_degraded, "SMART_NVM_SUBSYSTEM_DEGRADED"),
                (cw.media_read_only, "SMART_MEDIA_READ_ONLY"),
                (cw.volatile_backup_failed, "SMART_VOLATILE_BACKUP_FAILED"),
            ];
            for (set, code) in flags {
                if set {
                    push(code.to_string(), FailureClass::RuleViolation);
                }
            }
        }
    }

    match fields.media_errors {
        Field::Absent => push(
            "SMART_MEDIA_ERRORS_NOT_FOUND".to_string(),
            FailureClass::DataUnavailable,
        ),
        Field::Invalid => push(
            "SMART_MEDIA_ERRORS_UNDECODABLE".to_string(),
            FailureClass::DecodeOutOfRange,
        ),
        Field::Value(0) => {}
        Field::Value(n) => {
            push(format!("SMART_MEDIA_ERRORS_{}", n), FailureClass::RuleViolation)
        }
    }

    if let Some(used) = detail.percent_used {
        if used >= u64::from(profile.smart.max_percent_used) {
            push("SMART_HIGH_WEAR_LEVEL".to_string(), FailureClass::RuleViolation);
        }
    }

    if let (Some(spare), Some(threshold)) = (detail.available_spare, detail.spare_threshold) {
        if spare < threshold {
            push(
                "SMART_SPARE_BELOW_THRESHOLD".to_string(),
                FailureClass::RuleViolation,
            );
        }
    }

    detail
}

fn pcie_rule(
    outcome: Option<&CommandOutcome>,
    profile: &DeviceTypeProfile,
    reasons: &mut Vec<FailureReason>,
) -> PcieDetail {
    let mut push = |code: String, class: FailureClass| {
        reasons.push(FailureReason::new(code, RuleFamily::Pcie, class));
    };

    let mut detail = PcieDetail {
        expected_width: profile.link_width,
        expected_speed: profile.link_speed,
        ..PcieDetail::default()
    };
    let Some(outcome) = outcome.filter(|o| o.passed()) else {
        push(
            "PCIE_REGISTER_DATA_UNAVAILABLE".to_string(),
            FailureClass::DataUnavailable,
        );
        return detail;
    };
    detail.data_available = true;

    let link: Result<PcieLinkStatus, Option<DecodeOutOfRange>> =
        match parse_registers(&outcome.raw_output).lnksta {
            Field::Value(raw) => PcieLinkStatus::try_from_raw(raw).map_err(Some),
            Field::Invalid => Err(None),
            Field::Absent => {
                warn!("PCIe LNKSTA register not found in register dump");
                push(
                    "PCIE_LNKSTA_REGISTER_NOT_FOUND".to_string(),
                    FailureClass::DataUnavailable,
                );
                return detail;
            }
        };

    let link = match link {
        Ok(link) => link,
        Err(e) => {
            warn!(error = ?e, "PCIe link status undecodable");
            push("PCIE_LNKSTA_UNDECODABLE".to_string(), FailureClass::DecodeOutOfRange);
            return detail;
        }
    };
    detail.actual_width = Some(link.link_width);
    detail.actual_speed = Some(link.link_speed);

    if link.link_width != profile.link_width {
        push(
            format!(
                "PCIE_LINK_WIDTH_MISMATCH_EXPECTED_x{}_ACTUAL_x{}",
                profile.link_width, link.link_width
            ),
            FailureClass::RuleViolation,
        );
    }

    // Higher-than-expected speed passes.
    if link.link_speed < profile.link_speed {
        push(
            format!(
                "PCIE_LINK_SPEED_BELOW_EXPECTED_{}_ACTUAL_{}",
                link_speed_label(profile.link_speed),
                link_speed_label(link.link_speed)
            ),
            FailureClass::RuleViolation,
        );
    }

    detail
}

fn command_rule(outcomes: &[CommandOutcome], reasons: &mut Vec<FailureReason>) -> CommandStats {
    let mut stats = CommandStats::default();

    for step in CommandStep::ALL {
        for outcome in outcomes.iter().filter(|o| o.step == step) {
            stats.total += 1;
            if outcome.passed() {
                stats.passed += 1;
                continue;
            }
            stats.failed += 1;
            stats.failed_steps.push(step);

            let (suffix, class) = match outcome.error_kind {
                ErrorKind::Timeout => {
                    stats.timed_out += 1;
                    ("TIMEOUT", FailureClass::StepTimeout)
                }
                // A failed outcome without a recorded kind counts as a response failure.
                ErrorKind::ResponseFailure | ErrorKind::None => {
                    ("RESPONSE_FAILURE", FailureClass::StepResponseFailure)
                }
            };
            reasons.push(FailureReason::new(
                format!("COMMAND_{}_{}", step.reason_tag(), suffix),
                RuleFamily::Command,
                class,
            ));
        }
    }

    stats
}

fn firmware_rule(
    outcome: Option<&CommandOutcome>,
    reasons: &mut Vec<FailureReason>,
) -> FirmwareDetail {
    let mut push = |code: &str, class: FailureClass| {
        reasons.push(FailureReason::new(code, RuleFamily::Firmware, class));
    };

    let mut detail = FirmwareDetail::default();
    let Some(outcome) = outcome.filter(|o| o.passed()) else {
        push("FIRMWARE_HEALTH_DATA_UNAVAILABLE", FailureClass::DataUnavailable);
        return detail;
    };
    detail.data_available = true;

    let regs = parse_registers(&outcome.raw_output);
    detail.csts = regs.csts.value();
    detail.controller_enabled = regs.cc.value().map(|cc| cc & 0x01 != 0);
    if detail.controller_enabled == Some(false) {
        warn!("Controller not enabled (CC.EN=0)");
    }

    let status = match regs.csts {
        Field::Value(raw) => ControllerStatus::try_from_raw(raw).map_err(Some),
        Field::Invalid => Err(None),
        Field::Absent => {
            push("FIRMWARE_CSTS_REGISTER_NOT_FOUND", FailureClass::DataUnavailable);
            return detail;
        }
    };

    match status {
        Ok(status) => {
            detail.controller_ready = Some(status.ready);
            detail.fatal_error = Some(status.fatal_error);
            if status.fatal_error {
                push("FIRMWARE_FATAL_ERROR_CSTS_CFS", FailureClass::RuleViolation);
            }
            if !status.ready {
                push("FIRMWARE_CONTROLLER_NOT_READY", FailureClass::RuleViolation);
            }
        }
        Err(e) => {
            warn!(error = ?e, "Controller status undecodable");
            push("FIRMWARE_CSTS_UNDECODABLE", FailureClass::DecodeOutOfRange);
        }
    }

    detail
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::DeviceType;
    use std::time::Duration;

    fn outcome(step: CommandStep, raw_output: &str) -> CommandOutcome {
        CommandOutcome {
            step,
            success: true,
            raw_output: raw_output.to_string(),
            error_kind: ErrorKind::None,
            elapsed: Duration::from_millis(10),
            exit_code: Some(0),
            detail: String::new(),
        }
    }

    fn failed(step: CommandStep, error_kind: ErrorKind) -> CommandOutcome {
        CommandOutcome {
            step,
            success: false,
            raw_output: String::new(),
            error_kind,
            elapsed: Duration::from_millis(10),
            exit_code: None,
            detail: "failed".to_string(),
        }
    }

    fn outcomes(smart_log: &str, show_regs: &str) -> Vec<CommandOutcome> {
        CommandStep::ALL
            .iter()
            .map(|&step| match step {
                CommandStep::NvmeSmartLog => outcome(step, smart_log),
                CommandStep::NvmeShowRegs => outcome(step, show_regs),
                _ => outcome(step, ""),
            })
            .collect()
    }

    fn smart(cw: u8, media_errors: u64) -> String {
        format!("critical_warning : {:#x}\nmedia_errors : {}\n", cw, media_errors)
    }

    fn regs(width: u16, speed: u16, csts: u32) -> String {
        format!("cc : 0x460001\ncsts : {:#x}\nlnksta : {:#x}\n", csts, (width << 4) | speed)
    }

    fn bravo() -> CriteriaEvaluator {
        CriteriaEvaluator::new(DeviceType::Bravo.profile())
    }

    #[test]
    fn test_clean_run_passes() {
        let verdict = bravo().evaluate(&outcomes(&smart(0, 0), &regs(4, 3, 1)));
        assert!(verdict.overall_pass);
        assert!(verdict.failure_reasons.is_empty());
    }

    #[test]
    fn test_thermal_only_never_fails() {
        let verdict = bravo().evaluate(&outcomes(&smart(0x02, 0), &regs(4, 3, 1)));
        assert!(verdict.overall_pass);
    }

    #[test]
    fn test_every_critical_bit_fails() {
        for byte in 0u8..=0xFF {
            let verdict = bravo().evaluate(&outcomes(&smart(byte, 0), &regs(4, 3, 1)));
            let smart_reasons = verdict
                .failure_reasons
                .iter()
                .filter(|r| r.starts_with("SMART_"))
                .count();
            if byte & 0x1D != 0 {
                assert!(smart_reasons >= 1, "byte {:#04x} should fail", byte);
            } else {
                assert_eq!(smart_reasons, 0, "byte {:#04x} should pass", byte);
            }
        }
    }

    #[test]
    fn test_critical_bits_have_named_reasons() {
        let verdict = bravo().evaluate(&outcomes(&smart(0x1D, 0), &regs(4, 3, 1)));
        assert_eq!(
            verdict.failure_reasons,
            vec![
                "SMART_AVAILABLE_SPARE_LOW",
                "SMART_NVM_SUBSYSTEM_DEGRADED",
                "SMART_MEDIA_READ_ONLY",
                "SMART_VOLATILE_BACKUP_FAILED",
            ]
        );
    }

    #[test]
    fn test_media_errors_single_reason_regardless_of_warning() {
        for media_errors in [1u64, 2, 17, 100_000] {
            for cw in [0x00u8, 0x02, 0x1F] {
                let verdict =
                    bravo().evaluate(&outcomes(&smart(cw, media_errors), &regs(4, 3, 1)));
                let media: Vec<&String> = verdict
                    .failure_reasons
                    .iter()
                    .filter(|r| r.starts_with("SMART_MEDIA_ERRORS_"))
                    .collect();
                assert_eq!(media, vec![&format!("SMART_MEDIA_ERRORS_{}", media_errors)]);
            }
        }
    }

    #[test]
    fn test_width_mismatch_reason() {
        let verdict = bravo().evaluate(&outcomes(&smart(0, 0), &regs(2, 3, 1)));
        assert_eq!(
            verdict.failure_reasons,
            vec!["PCIE_LINK_WIDTH_MISMATCH_EXPECTED_x4_ACTUAL_x2"]
        );
    }

    #[test]
    fn test_higher_speed_passes_lower_fails() {
        let verdict = bravo().evaluate(&outcomes(&smart(0, 0), &regs(4, 4, 1)));
        assert!(verdict.overall_pass);

        let verdict = bravo().evaluate(&outcomes(&smart(0, 0), &regs(4, 2, 1)));
        assert_eq!(
            verdict.failure_reasons,
            vec!["PCIE_LINK_SPEED_BELOW_EXPECTED_Gen3_ACTUAL_Gen2"]
        );
    }

    #[test]
    fn test_fatal_status_fails() {
        let verdict = bravo().evaluate(&outcomes(&smart(0, 0), &regs(4, 3, 0x3)));
        assert_eq!(verdict.failure_reasons, vec!["FIRMWARE_FATAL_ERROR_CSTS_CFS"]);
    }

    #[test]
    fn test_controller_not_ready_fails() {
        let verdict = bravo().evaluate(&outcomes(&smart(0, 0), &regs(4, 3, 0x0)));
        assert_eq!(verdict.failure_reasons, vec!["FIRMWARE_CONTROLLER_NOT_READY"]);
    }

    #[test]
    fn test_all_families_accumulate() {
        let mut set = outcomes(&smart(0x04, 3), &regs(2, 1, 0x3));
        set[0] = failed(CommandStep::NvmeList, ErrorKind::ResponseFailure);
        let eval = bravo().evaluate_detailed(&set);
        let families: Vec<RuleFamily> = eval.reasons.iter().map(|r| r.family).collect();
        assert!(families.contains(&RuleFamily::Smart));
        assert!(families.contains(&RuleFamily::Pcie));
        assert!(families.contains(&RuleFamily::Command));
        assert!(families.contains(&RuleFamily::Firmware));
        assert!(eval
            .verdict
            .failure_reasons
            .contains(&"COMMAND_NVME_LIST_RESPONSE_FAILURE".to_string()));
    }

    #[test]
    fn test_show_regs_timeout_reports_unavailable_data() {
        let mut set = outcomes(&smart(0, 0), "");
        set[4] = failed(CommandStep::NvmeShowRegs, ErrorKind::Timeout);
        let eval = bravo().evaluate_detailed(&set);
        assert_eq!(
            eval.verdict.failure_reasons,
            vec![
                "PCIE_REGISTER_DATA_UNAVAILABLE",
                "COMMAND_NVME_SHOW_REGS_TIMEOUT",
                "FIRMWARE_HEALTH_DATA_UNAVAILABLE",
            ]
        );
        assert_eq!(eval.details.commands.timed_out, 1);
        assert!(!eval.details.pcie.data_available);
    }

    #[test]
    fn test_missing_fields_reported() {
        let verdict = bravo().evaluate(&outcomes("temperature : 30 C\n", "cc : 0x1\n"));
        assert_eq!(
            verdict.failure_reasons,
            vec![
                "SMART_CRITICAL_WARNING_NOT_FOUND",
                "SMART_MEDIA_ERRORS_NOT_FOUND",
                "PCIE_LNKSTA_REGISTER_NOT_FOUND",
                "FIRMWARE_CSTS_REGISTER_NOT_FOUND",
            ]
        );
    }

    #[test]
    fn test_out_of_range_values_are_undecodable() {
        let verdict = bravo().evaluate(&outcomes(
            "critical_warning : 0x1ff\nmedia_errors : 0\n",
            "csts : 0x1ffffffff\nlnksta : 0x10043\n",
        ));
        assert_eq!(
            verdict.failure_reasons,
            vec![
                "SMART_CRITICAL_WARNING_UNDECODABLE",
                "PCIE_LNKSTA_UNDECODABLE",
                "FIRMWARE_CSTS_UNDECODABLE",
            ]
        );
    }

    #[test]
    fn test_unprefixed_registers_read_as_hex() {
        let eval = bravo().evaluate_detailed(&outcomes(
            &smart(0, 0),
            "cc : 460001\ncsts : 1d\nlnksta : 43\n",
        ));
        assert!(eval.verdict.overall_pass, "{:?}", eval.verdict.failure_reasons);
        assert_eq!(eval.details.firmware.csts, Some(0x1d));
        assert_eq!(eval.details.pcie.actual_width, Some(4));
        assert_eq!(eval.details.pcie.actual_speed, Some(3));
    }

    #[test]
    fn test_malformed_values_are_undecodable_not_missing() {
        let verdict = bravo().evaluate(&outcomes(
            "critical_warning : 0x1ffffffffffffffffff\nmedia_errors : 7x\n",
            "csts : 1z\nlnksta : 0xq\n",
        ));
        assert_eq!(
            verdict.failure_reasons,
            vec![
                "SMART_CRITICAL_WARNING_UNDECODABLE",
                "SMART_MEDIA_ERRORS_UNDECODABLE",
                "PCIE_LNKSTA_UNDECODABLE",
                "FIRMWARE_CSTS_UNDECODABLE",
            ]
        );
    }

    #[test]
    fn test_wear_and_spare_limits() {
        let log = "critical_warning : 0\nmedia_errors : 0\npercent_used : 80%\navail_spare : 5%\nspare_thresh : 10%\n";
        let verdict = bravo().evaluate(&outcomes(log, &regs(4, 3, 1)));
        assert_eq!(
            verdict.failure_reasons,
            vec!["SMART_HIGH_WEAR_LEVEL", "SMART_SPARE_BELOW_THRESHOLD"]
        );

        // compete tolerates more wear
        let compete = CriteriaEvaluator::new(DeviceType::Compete.profile());
        let log = "critical_warning : 0\nmedia_errors : 0\npercent_used : 80%\n";
        let verdict = compete.evaluate(&outcomes(log, &regs(16, 4, 1)));
        assert!(verdict.overall_pass);
    }

    #[test]
    fn test_incomplete_outcome_set() {
        let mut set = outcomes(&smart(0, 0), &regs(4, 3, 1));
        set.truncate(6);
        let verdict = bravo().evaluate(&set);
        assert!(!verdict.overall_pass);
        assert_eq!(
            verdict.failure_reasons,
            vec![
                "INCOMPLETE_RUN",
                "COMMAND_NVME_SMART_LOG_MISSING",
                "COMMAND_NVME_ERROR_LOG_MISSING",
            ]
        );
    }

    #[test]
    fn test_empty_outcome_set_never_passes() {
        let verdict = bravo().evaluate(&[]);
        assert!(!verdict.overall_pass);
        assert_eq!(verdict.failure_reasons[0], INCOMPLETE_RUN);
        assert_eq!(verdict.failure_reasons.len(), 9);
    }

    #[test]
    fn test_duplicate_outcomes_are_incomplete() {
        let mut set = outcomes(&smart(0, 0), &regs(4, 3, 1));
        set.push(outcome(CommandStep::NvmeList, ""));
        let verdict = bravo().evaluate(&set);
        assert_eq!(
            verdict.failure_reasons,
            vec!["INCOMPLETE_RUN", "UNEXPECTED_OUTCOME_COUNT_9"]
        );
    }

    #[test]
    fn test_evaluation_is_idempotent() {
        let mut set = outcomes(&smart(0x0A, 4), &regs(8, 2, 0x2));
        set[6] = failed(CommandStep::NvmeSmartLog, ErrorKind::Timeout);
        let evaluator = bravo();
        let first = serde_json::to_vec(&evaluator.evaluate(&set)).expect("serialize");
        let second = serde_json::to_vec(&evaluator.evaluate(&set)).expect("serialize");
        assert_eq!(first, second);
    }

    #[test]
    fn test_aborted_verdict() {
        let eval = Evaluation::aborted(NAMESPACE_NOT_INITIALIZED);
        assert!(!eval.verdict.overall_pass);
        assert_eq!(eval.verdict.failure_reasons, vec![NAMESPACE_NOT_INITIALIZED]);
        assert_eq!(eval.reasons[0].class, FailureClass::PreconditionFailure);
    }
}
