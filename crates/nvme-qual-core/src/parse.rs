//! Field extraction from nvme-cli text output.
//!
//! nvme-cli prints one `key : value` pair per line. Register dumps and
//! `nsze` are hex, with or without the `0x` prefix. SMART counters are
//! decimal (`1,024`, `41 C`, `3%`) unless prefixed with `0x`. The value
//! must be one whole token: `1d` in a decimal field, `0x1g` or a number
//! wider than 64 bits is [`Field::Invalid`], never a truncated read.
//! Range checks against register widths happen in [`crate::decode`].

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

/// A numeric field as it appeared in the output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    /// Key not printed.
    #[default]
    Absent,
    Value(u64),
    /// Key printed with a value that is not a number of the expected form.
    Invalid,
}

impl Field {
    pub fn value(self) -> Option<u64> {
        match self {
            Field::Value(v) => Some(v),
            Field::Absent | Field::Invalid => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Radix {
    Hex,
    /// Decimal, or hex when prefixed with `0x`.
    Auto,
}

fn raw_value(output: &str, key: &str) -> Option<String> {
    let pattern = format!(r"^[ \t]*{}[ \t]*:(.*)$", regex::escape(key));
    let re = RegexBuilder::new(&pattern)
        .case_insensitive(true)
        .multi_line(true)
        .build()
        .ok()?;
    let value = re.captures(output)?.get(1)?.as_str().trim().to_string();
    Some(value)
}

fn numeric_field(output: &str, keys: &[&str], radix: Radix) -> Field {
    keys.iter()
        .find_map(|key| raw_value(output, key))
        .map_or(Field::Absent, |raw| parse_value(&raw, radix))
}

fn text_field(output: &str, key: &str) -> Option<String> {
    raw_value(output, key).filter(|v| !v.is_empty())
}

fn parse_value(raw: &str, radix: Radix) -> Field {
    let token = raw.split_whitespace().next().unwrap_or_default();
    let token = token.strip_suffix('%').unwrap_or(token);

    if let Some(hex) = token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
    {
        return parse_hex(hex);
    }
    match radix {
        Radix::Hex => parse_hex(token),
        Radix::Auto => parse_decimal(token),
    }
}

fn parse_hex(digits: &str) -> Field {
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Field::Invalid;
    }
    u64::from_str_radix(digits, 16).map_or(Field::Invalid, Field::Value)
}

fn parse_decimal(token: &str) -> Field {
    let grouped = token.starts_with(|c: char| c.is_ascii_digit())
        && token.chars().all(|c| c.is_ascii_digit() || c == ',');
    if !grouped {
        return Field::Invalid;
    }
    token
        .replace(',', "")
        .parse()
        .map_or(Field::Invalid, Field::Value)
}

/// Namespace size (`nsze`) from `nvme id-ns` output. A missing or
/// malformed value reads as `None`.
pub fn parse_namespace_size(output: &str) -> Option<u64> {
    numeric_field(output, &["nsze"], Radix::Hex).value()
}

/// Values of interest from the SMART / health log page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmartLogFields {
    /// Raw critical warning value; must fit in one byte.
    pub critical_warning: Field,
    pub media_errors: Field,
    pub percent_used: Field,
    pub available_spare: Field,
    pub spare_threshold: Field,
    pub temperature: Field,
    pub num_err_log_entries: Field,
}

pub fn parse_smart_log(output: &str) -> SmartLogFields {
    let field = |keys: &[&str]| numeric_field(output, keys, Radix::Auto);
    SmartLogFields {
        critical_warning: field(&["critical_warning"]),
        media_errors: field(&["media_errors"]),
        percent_used: field(&["percent_used", "percentage_used"]),
        available_spare: field(&["avail_spare", "available_spare"]),
        spare_threshold: field(&["spare_thresh", "available_spare_threshold"]),
        temperature: field(&["temperature"]),
        num_err_log_entries: field(&["num_err_log_entries"]),
    }
}

/// Controller and PCIe registers from `nvme show-regs`, all hex.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterFields {
    pub cap: Field,
    pub vs: Field,
    pub cc: Field,
    pub csts: Field,
    pub lnksta: Field,
    pub lnkcap: Field,
}

pub fn parse_registers(output: &str) -> RegisterFields {
    let register = |key: &str| numeric_field(output, &[key], Radix::Hex);
    RegisterFields {
        cap: register("cap"),
        vs: register("vs"),
        cc: register("cc"),
        csts: register("csts"),
        lnksta: register("lnksta"),
        lnkcap: register("lnkcap"),
    }
}

/// Identity strings from `nvme id-ctrl`, used in report headers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerIdentity {
    pub vid: Option<u64>,
    pub model: Option<String>,
    pub serial: Option<String>,
    pub firmware_revision: Option<String>,
}

pub fn parse_controller_identity(output: &str) -> ControllerIdentity {
    ControllerIdentity {
        vid: numeric_field(output, &["vid"], Radix::Hex).value(),
        model: text_field(output, "mn"),
        serial: text_field(output, "sn"),
        firmware_revision: text_field(output, "fr"),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirmwareSlot {
    pub slot: u8,
    pub status: String,
    pub version: String,
    pub active: bool,
}

/// Firmware slot information from `nvme fw-log`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirmwareLog {
    pub slots: Vec<FirmwareSlot>,
    pub active_slot: Option<u8>,
}

pub fn parse_firmware_log(output: &str) -> FirmwareLog {
    let mut log = FirmwareLog::default();
    let Ok(re) = Regex::new(r"frs(\d+)\s*\(([^)]*)\)\s*:\s*([A-Za-z0-9._-]+)") else {
        return log;
    };
    for caps in re.captures_iter(output) {
        let Ok(slot) = caps[1].parse::<u8>() else {
            continue;
        };
        let status = caps[2].trim().to_string();
        let active = status.contains("Active");
        if active {
            log.active_slot = Some(slot);
        }
        log.slots.push(FirmwareSlot {
            slot,
            status,
            version: caps[3].to_string(),
            active,
        });
    }
    log
}

/// Device nodes listed by `nvme list`.
pub fn parse_device_list(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .filter(|node| node.starts_with("/dev/"))
        .map(str::to_string)
        .collect()
}

/// Number of entries printed by `nvme error-log`.
pub fn count_error_log_entries(output: &str) -> usize {
    Regex::new(r"Error Log Entry\s*\d+\s*:")
        .map(|re| re.find_iter(output).count())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SMART_LOG: &str = "\
Smart Log for NVME device:nvme0 namespace-id:ffffffff
critical_warning                    : 0x2
temperature                         : 41 C
available_spare                     : 100%
available_spare_threshold           : 10%
percentage_used                     : 3%
data_units_read                     : 1,234,567
media_errors                        : 0
num_err_log_entries                 : 12
";

    #[test]
    fn test_parse_smart_log_current_nvme_cli_names() {
        let smart = parse_smart_log(SMART_LOG);
        assert_eq!(smart.critical_warning, Field::Value(0x2));
        assert_eq!(smart.temperature, Field::Value(41));
        assert_eq!(smart.available_spare, Field::Value(100));
        assert_eq!(smart.spare_threshold, Field::Value(10));
        assert_eq!(smart.percent_used, Field::Value(3));
        assert_eq!(smart.media_errors, Field::Value(0));
        assert_eq!(smart.num_err_log_entries, Field::Value(12));
    }

    #[test]
    fn test_parse_smart_log_legacy_names() {
        let out = "critical_warning : 0\navail_spare : 95%\nspare_thresh : 5%\npercent_used : 91%\nmedia_errors : 7\n";
        let smart = parse_smart_log(out);
        assert_eq!(smart.critical_warning, Field::Value(0));
        assert_eq!(smart.available_spare, Field::Value(95));
        assert_eq!(smart.spare_threshold, Field::Value(5));
        assert_eq!(smart.percent_used, Field::Value(91));
        assert_eq!(smart.media_errors, Field::Value(7));
    }

    #[test]
    fn test_missing_field_is_absent() {
        let smart = parse_smart_log("temperature : 30 C\n");
        assert_eq!(smart.critical_warning, Field::Absent);
        assert_eq!(smart.media_errors, Field::Absent);
    }

    #[test]
    fn test_parse_registers() {
        let out = "cap     : 0x4028033fff\nvs      : 0x10300\ncc      : 0x460001\ncsts    : 0x1\nlnksta  : 0x1043\n";
        let regs = parse_registers(out);
        assert_eq!(regs.cap, Field::Value(0x4028033fff));
        assert_eq!(regs.cc, Field::Value(0x460001));
        assert_eq!(regs.csts, Field::Value(0x1));
        assert_eq!(regs.lnksta, Field::Value(0x1043));
        assert_eq!(regs.lnkcap, Field::Absent);
    }

    #[test]
    fn test_register_keys_do_not_match_suffixes() {
        let regs = parse_registers("ncap : 0x10\n");
        assert_eq!(regs.cap, Field::Absent);
    }

    #[test]
    fn test_registers_without_prefix_are_hex() {
        let regs = parse_registers("csts : 1d\nlnksta : 43\ncc : 460001\n");
        assert_eq!(regs.csts, Field::Value(0x1d));
        assert_eq!(regs.lnksta, Field::Value(0x43));
        assert_eq!(regs.cc, Field::Value(0x460001));
    }

    #[test]
    fn test_malformed_register_is_invalid() {
        let regs = parse_registers("csts : 1z\nlnksta : 0x\ncc :\n");
        assert_eq!(regs.csts, Field::Invalid);
        assert_eq!(regs.lnksta, Field::Invalid);
        assert_eq!(regs.cc, Field::Invalid);
    }

    #[test]
    fn test_empty_value_does_not_borrow_next_line() {
        let regs = parse_registers("csts :\nlnksta : 0x43\n");
        assert_eq!(regs.csts, Field::Invalid);
        assert_eq!(regs.lnksta, Field::Value(0x43));
    }

    #[test]
    fn test_oversized_value_is_invalid_not_absent() {
        let smart = parse_smart_log("critical_warning : 0x1ffffffffffffffffff\n");
        assert_eq!(smart.critical_warning, Field::Invalid);
        let smart = parse_smart_log("media_errors : 99999999999999999999999\n");
        assert_eq!(smart.media_errors, Field::Invalid);
    }

    #[test]
    fn test_decimal_field_rejects_trailing_garbage() {
        let smart = parse_smart_log("critical_warning : 1d\nmedia_errors : 12abc\n");
        assert_eq!(smart.critical_warning, Field::Invalid);
        assert_eq!(smart.media_errors, Field::Invalid);
    }

    #[test]
    fn test_parse_namespace_size() {
        assert_eq!(parse_namespace_size("nsze    : 0x1d1c0beb0\n"), Some(0x1d1c0beb0));
        assert_eq!(parse_namespace_size("nsze : 0\n"), Some(0));
        assert_eq!(parse_namespace_size("ncap : 0x10\n"), None);
        assert_eq!(parse_namespace_size("nsze : 1000\n"), Some(0x1000));
        assert_eq!(parse_namespace_size("nsze : 12q\n"), None);
    }

    #[test]
    fn test_parse_controller_identity() {
        let out = "vid       : 0x144d\nsn        : S4EWNX0N123456\nmn        : Samsung SSD 980 PRO 1TB\nfr        : 5B2QGXA7\n";
        let id = parse_controller_identity(out);
        assert_eq!(id.vid, Some(0x144d));
        assert_eq!(id.serial.as_deref(), Some("S4EWNX0N123456"));
        assert_eq!(id.model.as_deref(), Some("Samsung SSD 980 PRO 1TB"));
        assert_eq!(id.firmware_revision.as_deref(), Some("5B2QGXA7"));
    }

    #[test]
    fn test_parse_firmware_log() {
        let out = "frs1 (Active) : 5B2QGXA7\nfrs2 (Inactive) : 4A1QGXA7\n";
        let fw = parse_firmware_log(out);
        assert_eq!(fw.slots.len(), 2);
        assert_eq!(fw.active_slot, Some(1));
        assert!(fw.slots[0].active);
        assert_eq!(fw.slots[1].version, "4A1QGXA7");
    }

    #[test]
    fn test_parse_device_list() {
        let out = "Node             SN       Model        Namespace Usage\n---------------- -------- ------------ --------- -----\n/dev/nvme0n1     S4EW     Samsung 980  1         1.00 TB\n";
        assert_eq!(parse_device_list(out), vec!["/dev/nvme0n1"]);
    }

    #[test]
    fn test_count_error_log_entries() {
        let out = "Error Log Entry 0:\nerror_count : 1\nError Log Entry 1:\nerror_count : 2\n";
        assert_eq!(count_error_log_entries(out), 2);
        assert_eq!(count_error_log_entries(""), 0);
    }

    #[test]
    fn test_value_forms() {
        assert_eq!(parse_value("0x1F", Radix::Auto), Field::Value(31));
        assert_eq!(parse_value("1,024", Radix::Auto), Field::Value(1024));
        assert_eq!(parse_value("41 C", Radix::Auto), Field::Value(41));
        assert_eq!(parse_value("3%", Radix::Auto), Field::Value(3));
        assert_eq!(parse_value("ff", Radix::Hex), Field::Value(0xff));
        assert_eq!(parse_value("abc", Radix::Auto), Field::Invalid);
        assert_eq!(Field::Invalid.value(), None);
    }
}
