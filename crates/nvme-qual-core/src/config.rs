//! Harness configuration loaded from YAML.

use crate::error::{QualError, Result};
use crate::profile::{DeviceType, DeviceTypeProfile};
use crate::telemetry::level_from_name;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

/// Longest per-step budget a config may request, in seconds.
pub const MAX_COMMAND_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    #[default]
    Prod,
    /// Verbose logging.
    Debug,
    /// Print the plan without touching the device.
    Dryrun,
}

impl RunMode {
    pub fn name(&self) -> &'static str {
        match self {
            RunMode::Prod => "prod",
            RunMode::Debug => "debug",
            RunMode::Dryrun => "dryrun",
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RunMode {
    type Err = QualError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "prod" => Ok(RunMode::Prod),
            "debug" => Ok(RunMode::Debug),
            "dryrun" => Ok(RunMode::Dryrun),
            _ => Err(QualError::UnknownRunMode(s.to_string())),
        }
    }
}

/// Harness settings. Unknown keys are ignored so older config files
/// still load.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HarnessConfig {
    /// Target device node.
    pub device: String,
    pub device_type: DeviceType,
    pub runmode: RunMode,
    pub description: String,
    /// Qualification id carried into reports.
    pub quid: String,
    /// Per-step budget in seconds; the device profile decides when unset.
    pub command_timeout: Option<u64>,
    pub log_level: String,
    pub output_dir: PathBuf,
    pub save_raw_outputs: bool,
    pub inter_step_delay_ms: u64,
    pub nvme_binary: String,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            device: "/dev/nvme0n1".to_string(),
            device_type: DeviceType::Bravo,
            runmode: RunMode::Prod,
            description: "linux_nvme_information_cmd test".to_string(),
            quid: "nvme_info_qual_2024".to_string(),
            command_timeout: None,
            log_level: "INFO".to_string(),
            output_dir: PathBuf::from("./logs"),
            save_raw_outputs: true,
            inter_step_delay_ms: 500,
            nvme_binary: "nvme".to_string(),
        }
    }
}

impl HarnessConfig {
    /// Load from `path`, falling back to defaults when the file is absent.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!(path = %path.display(), "Configuration file not found, using defaults");
            let config = Self::default();
            config.validate()?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(path)?;
        let config = Self::from_yaml(&content)?;
        debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Parse and validate a YAML document. An empty document yields defaults.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = if content.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(content)?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.device.starts_with("/dev/nvme") {
            return Err(QualError::InvalidConfig(format!(
                "invalid device path: {}",
                self.device
            )));
        }

        if let Some(timeout) = self.command_timeout {
            if timeout == 0 || timeout > MAX_COMMAND_TIMEOUT_SECS {
                return Err(QualError::InvalidConfig(format!(
                    "invalid command_timeout: {}. Must be between 1 and {} seconds",
                    timeout, MAX_COMMAND_TIMEOUT_SECS
                )));
            }
        }

        if level_from_name(&self.log_level).is_none() {
            return Err(QualError::InvalidConfig(format!(
                "invalid log_level: {}. Must be one of: DEBUG, INFO, WARNING, ERROR",
                self.log_level
            )));
        }

        if self.nvme_binary.trim().is_empty() {
            return Err(QualError::InvalidConfig(
                "nvme_binary must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    pub fn profile(&self) -> DeviceTypeProfile {
        self.device_type.profile()
    }

    /// Per-step budget: the configured override, else the profile's value.
    pub fn command_timeout(&self) -> Duration {
        self.command_timeout
            .map(Duration::from_secs)
            .unwrap_or_else(|| self.profile().command_timeout)
    }

    pub fn inter_step_delay(&self) -> Duration {
        Duration::from_millis(self.inter_step_delay_ms)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Write a sample configuration file.
    pub fn write_sample(path: &Path) -> Result<()> {
        let sample = Self {
            description: "NVMe Information Command Test".to_string(),
            quid: "nvme_info_qualification_2024".to_string(),
            command_timeout: Some(30),
            ..Self::default()
        };
        std::fs::write(path, sample.to_yaml()?)?;
        Ok(())
    }
}
