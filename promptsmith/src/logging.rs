//! Tracing setup for the CLI.
//!
//! - **Tracing (this module)**: diagnostics via `RUST_LOG` on stderr, plus a
//!   copy in `session.log` once the session directory is known.
//! - **Transcripts (`io/transcript`)**: product artifacts, always written and
//!   unaffected by `RUST_LOG`.

use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the global subscriber.
///
/// Reads `RUST_LOG`, defaulting to `warn`. Output goes to stderr in compact
/// format and, when `log_file` is given, is appended there without ANSI colors.
///
/// # Example
/// ```bash
/// RUST_LOG=promptsmith=debug promptsmith chat --example a.txt
/// ```
pub fn init(log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let file_layer = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("create directory {}", parent.display()))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("open log file {}", path.display()))?;
            Some(fmt::layer().with_writer(Mutex::new(file)).with_ansi(false))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .with(file_layer)
        .try_init()
        .context("install tracing subscriber")?;
    Ok(())
}
