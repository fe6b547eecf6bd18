//! On-disk run history and screenshots.
//!
//! Layout under the platform data directory:
//! `sim3ds/runs/*.json` for run summaries and `sim3ds/screenshots/*.png`.

use crate::console::{Eye, FrameSnapshot};
use crate::model::RunSummary;
use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};

fn base_dir() -> Result<PathBuf> {
    let dir = dirs::data_local_dir()
        .ok_or_else(|| anyhow!("failed to resolve local data directory"))?
        .join("sim3ds");
    Ok(dir)
}

pub fn runs_dir() -> Result<PathBuf> {
    Ok(base_dir()?.join("runs"))
}

pub fn screenshots_dir() -> Result<PathBuf> {
    Ok(base_dir()?.join("screenshots"))
}

fn sanitize_timestamp(ts: &str) -> String {
    ts.replace([':', '.'], "-").replace('T', "_")
}

/// File name a run is stored under. Stable for a given summary.
pub fn run_file_name(r: &RunSummary) -> String {
    let ts = if r.started_utc.is_empty() {
        "unknown".to_string()
    } else {
        sanitize_timestamp(&r.started_utc)
    };
    format!("run-{ts}-{}-{}.json", r.program, r.run_id)
}

pub fn save_run_in(dir: &Path, r: &RunSummary) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    let path = dir.join(run_file_name(r));
    export_json(&path, r)?;
    tracing::debug!(path = %path.display(), "run saved");
    Ok(path)
}

/// Most recent runs first, at most `limit`. Unreadable files are skipped.
pub fn load_recent(limit: usize) -> Result<Vec<RunSummary>> {
    load_recent_in(&runs_dir()?, limit)
}

pub fn load_recent_in(dir: &Path, limit: usize) -> Result<Vec<RunSummary>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut files: Vec<(std::time::SystemTime, PathBuf)> = std::fs::read_dir(dir)
        .with_context(|| format!("read {}", dir.display()))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .map(|p| {
            let modified = std::fs::metadata(&p)
                .and_then(|m| m.modified())
                .unwrap_or(std::time::UNIX_EPOCH);
            (modified, p)
        })
        .collect();
    // Newest first; file name breaks ties so the order is stable.
    files.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.cmp(&a.1)));

    let mut out = Vec::new();
    for (_, path) in files {
        if out.len() >= limit {
            break;
        }
        let parsed = std::fs::read(&path)
            .map_err(anyhow::Error::from)
            .and_then(|bytes| serde_json::from_slice::<RunSummary>(&bytes).map_err(Into::into));
        match parsed {
            Ok(r) => out.push(r),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping unreadable run"),
        }
    }
    Ok(out)
}

pub fn delete_run(r: &RunSummary) -> Result<()> {
    delete_run_in(&runs_dir()?, r)
}

pub fn delete_run_in(dir: &Path, r: &RunSummary) -> Result<()> {
    let path = dir.join(run_file_name(r));
    std::fs::remove_file(&path).with_context(|| format!("delete {}", path.display()))
}

pub fn export_json(path: &Path, r: &RunSummary) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    let json = serde_json::to_vec_pretty(r)?;
    std::fs::write(path, json).with_context(|| format!("write {}", path.display()))
}

/// Compose both screens into one image: top on top, bottom centred below.
/// With `stereo` the left and right eyes sit side by side.
pub fn compose_frame(frame: &FrameSnapshot, stereo: bool) -> image::RgbImage {
    let eyes: &[Eye] = if stereo {
        &[Eye::Left, Eye::Right]
    } else {
        &[Eye::Left]
    };
    let top_w = frame.top_width * eyes.len() as u32;
    let width = top_w.max(frame.bottom_width);
    let height = frame.top_height + frame.bottom_height;
    let mut img = image::RgbImage::new(width, height);

    for (i, eye) in eyes.iter().enumerate() {
        let x0 = (width - top_w) / 2 + i as u32 * frame.top_width;
        for y in 0..frame.top_height {
            for x in 0..frame.top_width {
                if let Some(c) = frame.top_pixel(*eye, x, y) {
                    img.put_pixel(x0 + x, y, image::Rgb([c.r, c.g, c.b]));
                }
            }
        }
    }
    let bx = (width - frame.bottom_width) / 2;
    for y in 0..frame.bottom_height {
        for x in 0..frame.bottom_width {
            if let Some(c) = frame.bottom_pixel(x, y) {
                img.put_pixel(bx + x, frame.top_height + y, image::Rgb([c.r, c.g, c.b]));
            }
        }
    }
    img
}

pub fn save_screenshot(frame: &FrameSnapshot, stereo: bool) -> Result<PathBuf> {
    save_screenshot_in(&screenshots_dir()?, frame, stereo)
}

pub fn save_screenshot_in(dir: &Path, frame: &FrameSnapshot, stereo: bool) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    let stamp = time::OffsetDateTime::now_utc()
        .format(time::macros::format_description!(
            "[year][month][day]-[hour][minute][second]"
        ))
        .unwrap_or_else(|_| "now".into());
    let path = dir.join(format!("screenshot-{stamp}-f{}.png", frame.frame));
    save_screenshot_to(&path, frame, stereo)?;
    Ok(path)
}

/// Write a PNG screenshot to an explicit path.
pub fn save_screenshot_to(path: &Path, frame: &FrameSnapshot, stereo: bool) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    compose_frame(frame, stereo)
        .save_with_format(path, image::ImageFormat::Png)
        .with_context(|| format!("write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::{Color, Console, HidRegister};
    use crate::model::{FrameTimeSummary, RunEnd};
    use std::sync::Arc;

    fn summary(run_id: u64) -> RunSummary {
        RunSummary {
            run_id,
            program: "bounce".into(),
            started_utc: format!("2024-05-01T10:00:0{run_id}Z"),
            duration_ms: 1000,
            frames_rendered: 60,
            frames_presented: 60,
            frames_suppressed: 0,
            frame_rate_target: 60,
            frame_time: FrameTimeSummary::default(),
            end: RunEnd::Stopped,
            comments: Some("test".into()),
        }
    }

    #[test]
    fn saved_runs_load_back_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let p1 = save_run_in(dir.path(), &summary(1)).unwrap();
        let p2 = save_run_in(dir.path(), &summary(2)).unwrap();
        assert_ne!(p1, p2);
        assert!(p1.file_name().unwrap().to_string_lossy().ends_with("-bounce-1.json"));

        let loaded = load_recent_in(dir.path(), 10).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(load_recent_in(dir.path(), 1).unwrap().len(), 1);

        delete_run_in(dir.path(), &summary(1)).unwrap();
        let left = load_recent_in(dir.path(), 10).unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].run_id, 2);
    }

    #[test]
    fn garbage_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.json"), b"{not json").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"hello").unwrap();
        save_run_in(dir.path(), &summary(3)).unwrap();
        let loaded = load_recent_in(dir.path(), 10).unwrap();
        assert_eq!(loaded.len(), 1);
    }

    #[test]
    fn missing_dir_is_empty_history() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = load_recent_in(&dir.path().join("nope"), 10).unwrap();
        assert!(loaded.is_empty());
    }

    #[test]
    fn screenshot_layout_depends_on_stereo() {
        let mut console = Console::new(Arc::new(HidRegister::new())).unwrap();
        console.top.clear(Color::RED);
        console.bottom.clear(Color::BLUE);
        let frame = console.snapshot(7);

        let mono = compose_frame(&frame, false);
        assert_eq!(mono.dimensions(), (400, 480));
        assert_eq!(mono.get_pixel(0, 0).0, [255, 0, 0]);
        // Bottom screen is centred under the wider top screen.
        assert_eq!(mono.get_pixel(0, 300).0, [0, 0, 0]);
        assert_eq!(mono.get_pixel(40, 300).0, [0, 0, 255]);

        let stereo = compose_frame(&frame, true);
        assert_eq!(stereo.dimensions(), (800, 480));
        assert_eq!(stereo.get_pixel(799, 0).0, [255, 0, 0]);

        let dir = tempfile::tempdir().unwrap();
        let path = save_screenshot_in(dir.path(), &frame, true).unwrap();
        assert!(path.to_string_lossy().ends_with("-f7.png"));
        let back = image::open(&path).unwrap().to_rgb8();
        assert_eq!(back.dimensions(), (800, 480));
    }
}
