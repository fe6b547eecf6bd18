//! Tracing setup.
//!
//! The TUI owns the terminal, so it logs to a file; headless modes log to
//! stderr. `RUST_LOG` overrides the default filter either way.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "sim3ds=info";

fn filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

pub fn init_to_file(log_path: &Path) -> Result<()> {
    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .with_context(|| format!("open log file {}", log_path.display()))?;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter())
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .try_init();
    Ok(())
}

pub fn init_stderr() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter())
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}

/// Default log file location for TUI mode.
pub fn default_log_path() -> Option<std::path::PathBuf> {
    dirs::data_local_dir().map(|d| d.join("sim3ds").join("sim3ds.log"))
}

/// Route panics (including worker-thread panics) through tracing.
///
/// With `chain_default` the standard hook still prints to stderr; the TUI
/// turns that off so a panicking program doesn't scribble over the screen.
pub fn install_panic_hook(chain_default: bool) {
    static INIT: std::sync::OnceLock<()> = std::sync::OnceLock::new();
    INIT.get_or_init(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let payload = info
                .payload()
                .downcast_ref::<&str>()
                .copied()
                .or_else(|| info.payload().downcast_ref::<String>().map(|s| s.as_str()))
                .unwrap_or("<non-string panic payload>");
            let location = info
                .location()
                .map(|l| format!("{}:{}", l.file(), l.line()))
                .unwrap_or_else(|| "<unknown>".to_string());
            let thread = std::thread::current().name().unwrap_or("<unnamed>").to_string();
            tracing::error!(%thread, %location, %payload, "panic");
            if chain_default {
                previous(info);
            }
        }));
    });
}
