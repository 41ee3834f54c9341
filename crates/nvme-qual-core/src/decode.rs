//! Register and log-page bit-field decoders.
//!
//! Every decoder is a pure function over an integer. Bit positions are
//! documented once, here:
//!
//! | Source | Bits | Field |
//! |---|---|---|
//! | SMART critical warning (LID 0x02, byte 0) | 0 | available spare below threshold |
//! | | 1 | temperature threshold crossed (thermal) |
//! | | 2 | NVM subsystem reliability degraded |
//! | | 3 | media placed in read-only mode |
//! | | 4 | volatile memory backup failed |
//! | | 5..7 | reserved, ignored |
//! | PCIe Link Status (LNKSTA, 16 bit) | 3:0 | current link speed (1 = Gen1 ...) |
//! | | 9:4 | negotiated link width (lanes) |
//! | Controller Status (CSTS) | 0 | RDY, controller ready |
//! | | 1 | CFS, controller fatal status |

use serde::{Deserialize, Serialize};
use thiserror::Error;

const CW_AVAILABLE_SPARE_LOW: u8 = 1 << 0;
const CW_TEMPERATURE_THRESHOLD: u8 = 1 << 1;
const CW_NVM_SUBSYSTEM_DEGRADED: u8 = 1 << 2;
const CW_MEDIA_READ_ONLY: u8 = 1 << 3;
const CW_VOLATILE_BACKUP_FAILED: u8 = 1 << 4;

const LNKSTA_SPEED_MASK: u16 = 0x0F;
const LNKSTA_WIDTH_SHIFT: u16 = 4;
const LNKSTA_WIDTH_MASK: u16 = 0x3F;

const CSTS_RDY: u32 = 1 << 0;
const CSTS_CFS: u32 = 1 << 1;

/// A raw value that does not fit the register it was attributed to.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field} value {value:#x} does not fit in {bits} bits")]
pub struct DecodeOutOfRange {
    pub field: &'static str,
    pub value: u64,
    pub bits: u32,
}

fn check_width(field: &'static str, value: u64, bits: u32) -> Result<(), DecodeOutOfRange> {
    if bits < 64 && value >> bits != 0 {
        return Err(DecodeOutOfRange { field, value, bits });
    }
    Ok(())
}

/// Decoded SMART critical warning byte.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriticalWarning {
    pub available_spare_low: bool,
    pub temperature_threshold: bool,
    pub nvm_subsystem_degraded: bool,
    pub media_read_only: bool,
    pub volatile_backup_failed: bool,
}

impl CriticalWarning {
    /// Decode from a raw value reported by the SMART log, rejecting
    /// anything wider than one byte.
    pub fn try_from_raw(raw: u64) -> Result<Self, DecodeOutOfRange> {
        check_width("critical_warning", raw, 8)?;
        Ok(decode_smart_critical_warning(raw as u8))
    }

    /// True when any bit other than the thermal bit is set.
    pub fn has_critical(&self) -> bool {
        self.available_spare_low
            || self.nvm_subsystem_degraded
            || self.media_read_only
            || self.volatile_backup_failed
    }
}

/// Decode the SMART critical warning byte (bits 0..4; 5..7 ignored).
pub fn decode_smart_critical_warning(byte: u8) -> CriticalWarning {
    CriticalWarning {
        available_spare_low: byte & CW_AVAILABLE_SPARE_LOW != 0,
        temperature_threshold: byte & CW_TEMPERATURE_THRESHOLD != 0,
        nvm_subsystem_degraded: byte & CW_NVM_SUBSYSTEM_DEGRADED != 0,
        media_read_only: byte & CW_MEDIA_READ_ONLY != 0,
        volatile_backup_failed: byte & CW_VOLATILE_BACKUP_FAILED != 0,
    }
}

/// Decoded PCIe link status register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PcieLinkStatus {
    /// Negotiated lane count, bits 9:4.
    pub link_width: u8,
    /// Link speed generation code, bits 3:0.
    pub link_speed: u8,
}

impl PcieLinkStatus {
    pub fn try_from_raw(raw: u64) -> Result<Self, DecodeOutOfRange> {
        check_width("lnksta", raw, 16)?;
        Ok(decode_pcie_link_status(raw as u16))
    }
}

/// Decode the 16-bit PCIe Link Status register.
pub fn decode_pcie_link_status(reg: u16) -> PcieLinkStatus {
    PcieLinkStatus {
        link_width: ((reg >> LNKSTA_WIDTH_SHIFT) & LNKSTA_WIDTH_MASK) as u8,
        link_speed: (reg & LNKSTA_SPEED_MASK) as u8,
    }
}

/// Decoded controller status register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerStatus {
    pub ready: bool,
    pub fatal_error: bool,
}

impl ControllerStatus {
    pub fn try_from_raw(raw: u64) -> Result<Self, DecodeOutOfRange> {
        check_width("csts", raw, 32)?;
        Ok(decode_controller_status(raw as u32))
    }
}

/// Decode the controller status register (CSTS).
pub fn decode_controller_status(reg: u32) -> ControllerStatus {
    ControllerStatus {
        ready: reg & CSTS_RDY != 0,
        fatal_error: reg & CSTS_CFS != 0,
    }
}

/// Human label for a PCIe speed code, e.g. `3` -> `Gen3`.
pub fn link_speed_label(speed: u8) -> String {
    format!("Gen{}", speed)
}
