use crate::console::FrameSnapshot;
use crate::model::RunSummary;
use anyhow::{anyhow, Context, Result};
use std::path::PathBuf;
use std::sync::mpsc as std_mpsc;
use std::sync::OnceLock;
use std::time::Duration;

use super::state::UiState;

static CLIPBOARD_SENDER: OnceLock<std_mpsc::Sender<String>> = OnceLock::new();

/// Export a run as JSON into the current directory.
pub fn export_run_json(r: &RunSummary) -> Result<PathBuf> {
    let default_name = format!(
        "sim3ds-{}-{}-{}.json",
        r.program,
        r.started_utc.replace([':', '.'], "-").replace('T', "_"),
        r.run_id
    );
    let current_dir = std::env::current_dir().context("get current directory")?;
    let path = current_dir.join(default_name);
    crate::storage::export_json(&path, r)?;
    Ok(path)
}

/// Save the latest presented frame and report it in the status line.
pub fn screenshot_and_show_path(frame: Option<&FrameSnapshot>, state: &mut UiState) {
    let Some(frame) = frame else {
        state.info = "Nothing presented yet to screenshot.".into();
        return;
    };
    match crate::storage::save_screenshot(frame, state.stereo) {
        Ok(path) => {
            state.last_screenshot_path = Some(path.to_string_lossy().to_string());
            state.info = format!("Screenshot: {} (press 'y' to copy path)", path.display());
        }
        Err(e) => state.info = format!("Screenshot failed: {e:#}"),
    }
}

/// Lazily start the thread that owns clipboard handles.
///
/// On Linux the clipboard contents live only as long as the handle, so each
/// handle is kept alive for a while after setting the text.
fn clipboard_sender() -> &'static std_mpsc::Sender<String> {
    CLIPBOARD_SENDER.get_or_init(|| {
        let (tx, rx) = std_mpsc::channel::<String>();
        let spawned = std::thread::Builder::new()
            .name("clipboard".into())
            .spawn(move || {
                for text in rx {
                    match arboard::Clipboard::new() {
                        Ok(mut clipboard) => {
                            if clipboard.set_text(&text).is_ok() {
                                std::thread::sleep(Duration::from_secs(2));
                            }
                        }
                        Err(e) => tracing::warn!(error = %e, "clipboard unavailable"),
                    }
                }
            });
        if let Err(e) = spawned {
            tracing::warn!(error = %e, "failed to start clipboard thread");
        }
        tx
    })
}

/// Queue `text` for the clipboard without blocking the UI thread.
pub fn copy_to_clipboard(text: &str) -> Result<()> {
    clipboard_sender()
        .send(text.to_string())
        .map_err(|_| anyhow!("Clipboard manager channel closed"))
}

/// Shorten long paths for the status line.
pub fn display_path(path: &str) -> String {
    if path.chars().count() > 60 {
        let tail: String = path
            .chars()
            .rev()
            .take(57)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        format!("...{tail}")
    } else {
        path.to_string()
    }
}
