//! Error types for the qualification harness.
//!
//! Device-side failures (timeouts, non-zero exit status, undecodable
//! registers) are never errors here: they travel as data inside
//! [`CommandOutcome`](crate::runner::CommandOutcome) and the verdict.
//! These variants cover the harness's own plumbing.

use thiserror::Error;

/// Errors produced by configuration and artifact handling.
#[derive(Debug, Error)]
pub enum QualError {
    /// Configuration value failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Device type string is not one of the known profiles.
    #[error("unknown device type '{0}' (expected one of: bravo, delta, echo, compete)")]
    UnknownDeviceType(String),

    /// Run mode string is not recognised.
    #[error("unknown run mode '{0}' (expected one of: prod, debug, dryrun)")]
    UnknownRunMode(String),

    /// Step name does not match any step in the command plan.
    #[error("unknown command step '{0}'")]
    UnknownStep(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type for harness operations.
pub type Result<T> = std::result::Result<T, QualError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_device_type_lists_valid_choices() {
        let err = QualError::UnknownDeviceType("foxtrot".to_string());
        let msg = err.to_string();
        assert!(msg.contains("foxtrot"));
        assert!(msg.contains("compete"));
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: QualError = io.into();
        assert!(err.to_string().starts_with("io error"));
    }
}
