//! nvme-qual-core: NVMe Information-Command Qualification
//!
//! Runs a fixed, ordered plan of eight read-only nvme-cli queries against
//! one device, then judges the collected outputs against a device-type
//! profile and produces a pass/fail verdict with ordered failure reasons.
//!
//! ## Key Components
//!
//! - `decode`: Pure bit-field decoders for SMART, PCIe LNKSTA and CSTS
//! - `CommandRunner`: One query under a hard time budget, never fails
//! - `Sequencer`: Precondition check, then the plan in order
//! - `CriteriaEvaluator`: SMART, PCIe, command and firmware rules
//! - `QualificationHarness`: A full run, producing a `RunReport`

pub mod config;
pub mod criteria;
pub mod decode;
mod error;
pub mod fakes;
pub mod harness;
pub mod obs;
pub mod parse;
pub mod profile;
pub mod report;
pub mod runner;
pub mod sequencer;
pub mod step;
pub mod telemetry;

pub use config::{HarnessConfig, RunMode};
pub use criteria::{
    CriteriaEvaluator, Evaluation, FailureClass, FailureReason, RuleDetails, Verdict,
    INCOMPLETE_RUN, NAMESPACE_NOT_INITIALIZED,
};
pub use decode::{
    decode_controller_status, decode_pcie_link_status, decode_smart_critical_warning,
    ControllerStatus, CriticalWarning, DecodeOutOfRange, PcieLinkStatus,
};
pub use error::{QualError, Result};
pub use harness::{QualificationHarness, RunRequest};
pub use profile::{DeviceType, DeviceTypeProfile, SmartThresholds};
pub use parse::Field;
pub use report::{write_artifacts, ArtifactPaths, RunReport, TdsRecord};
pub use runner::{CommandOutcome, CommandRunner, DeviceQuery, ErrorKind, NvmeCli, QueryOutput};
pub use sequencer::{SequenceResult, Sequencer, SequencerState};
pub use step::{CommandStep, QueryKind};
