//! Tracing setup for the `nvme-qual` binary.
//!
//! Log lines go to stderr; stdout is reserved for command results. A run
//! also keeps a plain-text copy in its log file. Only the first
//! [`init_tracing`] call in a process installs a subscriber.

use crate::error::Result;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `level` when set. With `json`, each event is
/// written as one JSON object per line. With `log_file`, the file (and its
/// parent directory) is created and receives every event without ANSI
/// colouring.
pub fn init_tracing(json: bool, level: Level, log_file: Option<&Path>) -> Result<()> {
    let file = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            Some(Arc::new(File::create(path)?))
        }
        None => None,
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    let json_layer = json.then(|| {
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_writer(std::io::stderr)
    });
    let text_layer = (!json).then(|| {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
    });

    let file_layer = file.map(|file| fmt::layer().with_ansi(false).with_writer(file));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .with(file_layer)
        .try_init();
    Ok(())
}

/// Map a configured log level name (`DEBUG`, `INFO`, `WARNING`, `ERROR`)
/// to a tracing level.
pub fn level_from_name(name: &str) -> Option<Level> {
    match name.trim().to_ascii_uppercase().as_str() {
        "DEBUG" => Some(Level::DEBUG),
        "INFO" => Some(Level::INFO),
        "WARNING" | "WARN" => Some(Level::WARN),
        "ERROR" => Some(Level::ERROR),
        _ => None,
    }
}
