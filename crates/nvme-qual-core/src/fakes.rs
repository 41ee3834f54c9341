//! In-memory device fakes (testing only)
//!
//! Provides `ScriptedDevice`, a [`DeviceQuery`] that answers each query
//! kind from a script and records the order in which queries arrived.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::runner::{DeviceQuery, QueryOutput};
use crate::step::{CommandStep, QueryKind};

/// Scripted answer for one query kind.
#[derive(Debug, Clone)]
pub enum ScriptedResponse {
    /// Query completes with the given output.
    Output(QueryOutput),

    /// Query never completes; only the runner's budget ends it.
    Hang,

    /// Query cannot be executed at all.
    Error(std::io::ErrorKind),
}

impl ScriptedResponse {
    pub fn ok(stdout: &str) -> Self {
        Self::status(0, stdout, "")
    }

    pub fn status(status_code: i32, stdout: &str, stderr: &str) -> Self {
        ScriptedResponse::Output(QueryOutput {
            status_code,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
        })
    }
}

/// A device whose answers are fixed up front.
///
/// Unscripted queries succeed with empty output.
#[derive(Debug, Default)]
pub struct ScriptedDevice {
    responses: HashMap<QueryKind, ScriptedResponse>,
    calls: Mutex<Vec<QueryKind>>,
}

impl ScriptedDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// A device that passes every rule for the given link expectation:
    /// namespace 1 non-empty, clean SMART log, controller ready.
    pub fn healthy(link_width: u8, link_speed: u8) -> Self {
        let lnksta = ((link_width as u16) << 4) | link_speed as u16;
        Self::new()
            .with(
                QueryKind::NamespaceSize,
                ScriptedResponse::ok("nsze    : 0x1d1c0beb0\nncap    : 0x1d1c0beb0\n"),
            )
            .with(
                CommandStep::NvmeList,
                ScriptedResponse::ok(
                    "Node             SN       Model\n/dev/nvme0n1     S4EW     Scripted SSD\n",
                ),
            )
            .with(
                CommandStep::NvmeIdCtrl,
                ScriptedResponse::ok("vid : 0x144d\nsn  : SCRIPTED0001\nmn  : Scripted SSD\nfr  : 1.0.0\n"),
            )
            .with(
                CommandStep::NvmeIdNs,
                ScriptedResponse::ok("nsze    : 0x1d1c0beb0\n"),
            )
            .with(
                CommandStep::NvmeShowRegs,
                ScriptedResponse::ok(&format!(
                    "cap     : 0x4028033fff\nvs      : 0x10300\ncc      : 0x460001\ncsts    : 0x1\nlnksta  : {:#x}\n",
                    lnksta
                )),
            )
            .with(
                CommandStep::NvmeFwLog,
                ScriptedResponse::ok("frs1 (Active) : 1.0.0\n"),
            )
            .with(
                CommandStep::NvmeSmartLog,
                ScriptedResponse::ok(
                    "critical_warning : 0x0\ntemperature : 38 C\nmedia_errors : 0\nnum_err_log_entries : 0\n",
                ),
            )
    }

    /// Script (or re-script) the answer for one query kind.
    pub fn with(mut self, kind: impl Into<QueryKind>, response: ScriptedResponse) -> Self {
        self.responses.insert(kind.into(), response);
        self
    }

    /// Queries received so far, in arrival order.
    pub fn calls(&self) -> Vec<QueryKind> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeviceQuery for ScriptedDevice {
    async fn query(&self, kind: QueryKind, _device: &str) -> std::io::Result<QueryOutput> {
        self.calls.lock().unwrap().push(kind);
        match self.responses.get(&kind).cloned() {
            Some(ScriptedResponse::Output(output)) => Ok(output),
            Some(ScriptedResponse::Hang) => std::future::pending().await,
            Some(ScriptedResponse::Error(error_kind)) => {
                Err(std::io::Error::new(error_kind, "scripted failure"))
            }
            None => Ok(QueryOutput {
                status_code: 0,
                stdout: String::new(),
                stderr: String::new(),
            }),
        }
    }
}
