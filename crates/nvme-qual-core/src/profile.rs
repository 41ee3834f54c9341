//! Device-type profiles.
//!
//! The set of device types is closed; a profile can only be obtained from
//! a [`DeviceType`], so free-form type strings never reach the evaluator.

use crate::error::QualError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Bravo,
    Delta,
    Echo,
    Compete,
}

impl DeviceType {
    pub const ALL: [DeviceType; 4] = [
        DeviceType::Bravo,
        DeviceType::Delta,
        DeviceType::Echo,
        DeviceType::Compete,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            DeviceType::Bravo => "bravo",
            DeviceType::Delta => "delta",
            DeviceType::Echo => "echo",
            DeviceType::Compete => "compete",
        }
    }

    /// The expectations for this device type.
    pub fn profile(&self) -> DeviceTypeProfile {
        match self {
            DeviceType::Bravo => DeviceTypeProfile {
                device_type: *self,
                product: "Bravo Series Enterprise SSD",
                interface: "PCIe Gen3 x4",
                link_width: 4,
                link_speed: 3,
                namespace_count: 1,
                command_timeout: Duration::from_secs(30),
                smart: SmartThresholds {
                    max_temperature: 70,
                    min_available_spare: 10,
                    max_percent_used: 80,
                },
            },
            DeviceType::Delta => DeviceTypeProfile {
                device_type: *self,
                product: "Delta Series High-Performance SSD",
                interface: "PCIe Gen4 x8",
                link_width: 8,
                link_speed: 4,
                namespace_count: 1,
                command_timeout: Duration::from_secs(25),
                smart: SmartThresholds {
                    max_temperature: 75,
                    min_available_spare: 10,
                    max_percent_used: 85,
                },
            },
            DeviceType::Echo => DeviceTypeProfile {
                device_type: *self,
                product: "Echo Series Multi-Namespace SSD",
                interface: "PCIe Gen4 x4",
                link_width: 4,
                link_speed: 4,
                namespace_count: 2,
                command_timeout: Duration::from_secs(35),
                smart: SmartThresholds {
                    max_temperature: 80,
                    min_available_spare: 15,
                    max_percent_used: 90,
                },
            },
            DeviceType::Compete => DeviceTypeProfile {
                device_type: *self,
                product: "Compete Series Flagship SSD",
                interface: "PCIe Gen4 x16",
                link_width: 16,
                link_speed: 4,
                namespace_count: 4,
                command_timeout: Duration::from_secs(20),
                smart: SmartThresholds {
                    max_temperature: 85,
                    min_available_spare: 20,
                    max_percent_used: 95,
                },
            },
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DeviceType {
    type Err = QualError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bravo" => Ok(DeviceType::Bravo),
            "delta" => Ok(DeviceType::Delta),
            "echo" => Ok(DeviceType::Echo),
            "compete" => Ok(DeviceType::Compete),
            _ => Err(QualError::UnknownDeviceType(s.to_string())),
        }
    }
}

/// SMART health limits for a device type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SmartThresholds {
    /// Degrees Celsius; reported only, the thermal bit never fails a run.
    pub max_temperature: u32,
    pub min_available_spare: u32,
    /// Wear level at or above which the run fails.
    pub max_percent_used: u32,
}

/// Expectations for one device type. Immutable once selected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceTypeProfile {
    pub device_type: DeviceType,
    pub product: &'static str,
    pub interface: &'static str,
    /// Expected negotiated lane count; must match exactly.
    pub link_width: u8,
    /// Minimum link speed generation; higher speeds pass.
    pub link_speed: u8,
    pub namespace_count: u32,
    #[serde(with = "crate::runner::duration_ms")]
    pub command_timeout: Duration,
    pub smart: SmartThresholds,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_table() {
        let bravo = DeviceType::Bravo.profile();
        assert_eq!((bravo.link_width, bravo.link_speed), (4, 3));
        assert_eq!(bravo.command_timeout, Duration::from_secs(30));

        let delta = DeviceType::Delta.profile();
        assert_eq!((delta.link_width, delta.link_speed), (8, 4));
        assert_eq!(delta.command_timeout, Duration::from_secs(25));

        let echo = DeviceType::Echo.profile();
        assert_eq!((echo.link_width, echo.link_speed), (4, 4));
        assert_eq!(echo.namespace_count, 2);

        let compete = DeviceType::Compete.profile();
        assert_eq!((compete.link_width, compete.link_speed), (16, 4));
        assert_eq!(compete.command_timeout, Duration::from_secs(20));
    }

    #[test]
    fn test_device_type_parse() {
        assert_eq!("Echo".parse::<DeviceType>().unwrap(), DeviceType::Echo);
        assert!(matches!(
            "foxtrot".parse::<DeviceType>(),
            Err(QualError::UnknownDeviceType(_))
        ));
    }

    #[test]
    fn test_device_type_serde_lowercase() {
        let json = serde_json::to_string(&DeviceType::Compete).expect("serialize");
        assert_eq!(json, "\"compete\"");
        let back: DeviceType = serde_json::from_str("\"delta\"").expect("deserialize");
        assert_eq!(back, DeviceType::Delta);
    }
}
