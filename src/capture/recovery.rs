//! Recorder output file recovery
//!
//! OBS picks its own output filename, so after a capture stops the file has to
//! be found and moved to the session's target path. Files present before the
//! capture started are excluded when a baseline was taken; otherwise the most
//! recently modified video file wins. Only valid while at most one capture is
//! active at a time.

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info, warn};

use crate::session::RecoveryOutcome;

/// Video files present in the output directory at capture start
#[derive(Debug, Clone, Default)]
pub struct OutputBaseline {
    files: HashSet<PathBuf>,
}

impl OutputBaseline {
    pub fn contains(&self, path: &Path) -> bool {
        self.files.contains(path)
    }
}

/// Result of a recovery attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryReport {
    pub outcome: RecoveryOutcome,
    /// Path the video now lives at, when one was found
    pub video_path: Option<PathBuf>,
}

fn has_video_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

async fn list_videos(dir: &Path, extensions: &[String]) -> io::Result<Vec<(PathBuf, SystemTime)>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut videos = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !has_video_extension(&path, extensions) {
            continue;
        }
        let Ok(metadata) = entry.metadata().await else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }
        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        videos.push((path, modified));
    }

    Ok(videos)
}

/// Record which video files already exist in `dir`
pub async fn snapshot_outputs(dir: &Path, extensions: &[String]) -> io::Result<OutputBaseline> {
    let files = list_videos(dir, extensions)
        .await?
        .into_iter()
        .map(|(path, _)| path)
        .collect();
    Ok(OutputBaseline { files })
}

/// Newest video in `dir`, ignoring files listed in `baseline`
pub async fn find_newest_output(
    dir: &Path,
    extensions: &[String],
    baseline: Option<&OutputBaseline>,
) -> io::Result<Option<PathBuf>> {
    let newest = list_videos(dir, extensions)
        .await?
        .into_iter()
        .filter(|(path, _)| baseline.map(|b| !b.contains(path)).unwrap_or(true))
        .max_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)))
        .map(|(path, _)| path);
    Ok(newest)
}

async fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    match tokio::fs::rename(from, to).await {
        Ok(()) => Ok(()),
        Err(rename_err) => {
            // Cross-device moves cannot be renamed
            debug!("Rename failed ({}), falling back to copy", rename_err);
            tokio::fs::copy(from, to).await.map_err(|_| rename_err)?;
            tokio::fs::remove_file(from).await
        }
    }
}

/// Locate the capture's output file in `dir` and move it to `target`
pub async fn recover_output(
    dir: &Path,
    extensions: &[String],
    target: &Path,
    baseline: Option<&OutputBaseline>,
) -> io::Result<RecoveryReport> {
    let Some(newest) = find_newest_output(dir, extensions, baseline).await? else {
        warn!("No video files found in {:?} to rename", dir);
        return Ok(RecoveryReport {
            outcome: RecoveryOutcome::Degraded,
            video_path: None,
        });
    };

    if newest == target {
        info!("Video already has correct name: {:?}", target);
        return Ok(RecoveryReport {
            outcome: RecoveryOutcome::AlreadyNamed,
            video_path: Some(newest),
        });
    }

    move_file(&newest, target).await?;
    info!("Renamed video: {:?} -> {:?}", newest, target);

    Ok(RecoveryReport {
        outcome: RecoveryOutcome::Renamed,
        video_path: Some(target.to_path_buf()),
    })
}
