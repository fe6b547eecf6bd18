//! Post-run processing utilities.
//!
//! Handles auto-save, exports, and history refresh after a run finishes.

use crate::model::RunSummary;
use crate::storage;
use std::path::{Path, PathBuf};

/// Result of post-run processing, ready for presentation layers.
pub(crate) struct ProcessedRun {
    pub export_messages: Vec<String>,
    pub history: Vec<RunSummary>,
    pub auto_saved_path: Option<PathBuf>,
}

/// Where finished runs go.
pub(crate) struct PostProcessOptions<'a> {
    pub auto_save: bool,
    pub export_json: Option<&'a Path>,
    pub history_load: usize,
    /// Overrides the default runs directory.
    pub runs_dir: Option<&'a Path>,
}

/// Auto-save, export, and reload history for a finished run.
pub(crate) fn process_run_completion(
    opts: &PostProcessOptions<'_>,
    run: &RunSummary,
) -> ProcessedRun {
    let runs_dir = opts
        .runs_dir
        .map(Path::to_path_buf)
        .or_else(|| storage::runs_dir().ok());

    let auto_saved_path = match (opts.auto_save, runs_dir.as_deref()) {
        (true, Some(dir)) => match storage::save_run_in(dir, run) {
            Ok(p) => Some(p),
            Err(e) => {
                tracing::warn!(error = %format!("{e:#}"), "auto-save failed");
                None
            }
        },
        _ => None,
    };

    let mut export_messages = Vec::new();
    if let Some(export_path) = opts.export_json {
        match storage::export_json(export_path, run) {
            Ok(_) => export_messages.push(format!("Exported JSON: {}", export_path.display())),
            Err(e) => export_messages.push(format!("Export JSON failed: {e:#}")),
        }
    }

    let history = runs_dir
        .as_deref()
        .and_then(|dir| storage::load_recent_in(dir, opts.history_load).ok())
        .unwrap_or_default();

    ProcessedRun {
        export_messages,
        history,
        auto_saved_path,
    }
}
