//! The fixed information-command plan.

use crate::error::QualError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The eight device queries of a qualification run, in plan order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum CommandStep {
    /// nvme list
    NvmeList,

    /// nvme id-ctrl <dev>
    NvmeIdCtrl,

    /// nvme id-ns <dev> -n 1
    NvmeIdNs,

    /// nvme ns-descs <dev> -n 1
    NvmeNsDescs,

    /// nvme show-regs <dev>
    NvmeShowRegs,

    /// nvme fw-log <dev>
    NvmeFwLog,

    /// nvme smart-log <dev>
    NvmeSmartLog,

    /// nvme error-log <dev> -e 10
    NvmeErrorLog,
}

impl CommandStep {
    /// Plan order. Never reordered.
    pub const ALL: [CommandStep; 8] = [
        CommandStep::NvmeList,
        CommandStep::NvmeIdCtrl,
        CommandStep::NvmeIdNs,
        CommandStep::NvmeNsDescs,
        CommandStep::NvmeShowRegs,
        CommandStep::NvmeFwLog,
        CommandStep::NvmeSmartLog,
        CommandStep::NvmeErrorLog,
    ];

    /// Get the step name as a string.
    pub fn name(&self) -> &'static str {
        match self {
            CommandStep::NvmeList => "nvme_list",
            CommandStep::NvmeIdCtrl => "nvme_id_ctrl",
            CommandStep::NvmeIdNs => "nvme_id_ns",
            CommandStep::NvmeNsDescs => "nvme_ns_descs",
            CommandStep::NvmeShowRegs => "nvme_show_regs",
            CommandStep::NvmeFwLog => "nvme_fw_log",
            CommandStep::NvmeSmartLog => "nvme_smart_log",
            CommandStep::NvmeErrorLog => "nvme_error_log",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            CommandStep::NvmeList => "List all NVMe devices",
            CommandStep::NvmeIdCtrl => "Get controller identification",
            CommandStep::NvmeIdNs => "Get namespace identification",
            CommandStep::NvmeNsDescs => "Get namespace descriptors",
            CommandStep::NvmeShowRegs => "Display controller registers",
            CommandStep::NvmeFwLog => "Get firmware log information",
            CommandStep::NvmeSmartLog => "Get SMART/health information",
            CommandStep::NvmeErrorLog => "Get error log entries",
        }
    }

    /// 1-based position in the plan.
    pub fn position(&self) -> usize {
        CommandStep::ALL
            .iter()
            .position(|s| s == self)
            .map(|i| i + 1)
            .unwrap_or(0)
    }

    /// Upper-cased name used inside failure reason codes.
    pub fn reason_tag(&self) -> String {
        self.name().to_ascii_uppercase()
    }

    /// nvme-cli arguments (without the executable) for this step.
    pub fn nvme_args(&self, device: &str) -> Vec<String> {
        let dev = device.to_string();
        match self {
            CommandStep::NvmeList => vec!["list".to_string()],
            CommandStep::NvmeIdCtrl => vec!["id-ctrl".to_string(), dev],
            CommandStep::NvmeIdNs => {
                vec!["id-ns".to_string(), dev, "-n".to_string(), "1".to_string()]
            }
            CommandStep::NvmeNsDescs => {
                vec!["ns-descs".to_string(), dev, "-n".to_string(), "1".to_string()]
            }
            CommandStep::NvmeShowRegs => vec!["show-regs".to_string(), dev],
            CommandStep::NvmeFwLog => vec!["fw-log".to_string(), dev],
            CommandStep::NvmeSmartLog => vec!["smart-log".to_string(), dev],
            CommandStep::NvmeErrorLog => {
                vec!["error-log".to_string(), dev, "-e".to_string(), "10".to_string()]
            }
        }
    }
}

/// What a single device query asks for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum QueryKind {
    /// Reported size of namespace 1 (precondition).
    NamespaceSize,

    /// One step of the plan.
    Step(CommandStep),
}

impl QueryKind {
    pub fn nvme_args(&self, device: &str) -> Vec<String> {
        match self {
            QueryKind::NamespaceSize => CommandStep::NvmeIdNs.nvme_args(device),
            QueryKind::Step(step) => step.nvme_args(device),
        }
    }
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryKind::NamespaceSize => f.write_str("namespace_size"),
            QueryKind::Step(step) => f.write_str(step.name()),
        }
    }
}

impl From<CommandStep> for QueryKind {
    fn from(step: CommandStep) -> Self {
        QueryKind::Step(step)
    }
}

impl fmt::Display for CommandStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CommandStep {
    type Err = QualError;

    /// Accepts `nvme_smart_log`, `smart_log`, or `smart-log`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        CommandStep::ALL
            .iter()
            .copied()
            .find(|step| {
                step.name() == normalized
                    || step.name().strip_prefix("nvme_") == Some(normalized.as_str())
            })
            .ok_or_else(|| QualError::UnknownStep(s.to_string()))
    }
}
