//! Scan set directory layout.
//!
//! ```text
//! muff_scans/2026-10-16-0942-U/L_00/V_00/raw/frame_00000.jpg
//!            ^ UTC start time  ^ light ^ view    ^ height
//! ```
//!
//! The top directory and every per-condition directory must be new. Two
//! sessions started in the same UTC minute would otherwise mix their frames,
//! so a collision is fatal.

use crate::error::LayoutError;
use chrono::{DateTime, Utc};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// `strftime` pattern of the top-level scan directory name.
pub const SCAN_DIR_FORMAT: &str = "%Y-%m-%d-%H%M-U";

/// Directory tree of one scan set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanLayout {
    top: PathBuf,
}

impl ScanLayout {
    /// Create the scan directory under `root` and one `L_xx/V_yy/raw`
    /// directory per light/view condition.
    ///
    /// `root` itself is created if missing; everything below it must not
    /// exist yet.
    pub fn create(root: &Path, n_lights: u32, n_views: u32, started_at: DateTime<Utc>) -> Result<Self, LayoutError> {
        fs::create_dir_all(root).map_err(|source| LayoutError::Io {
            path: root.to_path_buf(),
            source,
        })?;

        let layout = Self {
            top: root.join(started_at.format(SCAN_DIR_FORMAT).to_string()),
        };
        create_new_dir(&layout.top)?;

        for light in 0..n_lights {
            let light_dir = layout.top.join(light_dir_name(light));
            create_new_dir(&light_dir)?;
            for view in 0..n_views {
                let view_dir = light_dir.join(view_dir_name(view));
                create_new_dir(&view_dir)?;
                create_new_dir(&view_dir.join("raw"))?;
            }
        }

        debug!("Created scan layout at {}", layout.top.display());
        Ok(layout)
    }

    /// Top-level directory of this scan set.
    pub fn top_dir(&self) -> &Path {
        &self.top
    }

    /// Directory receiving the frames of one light/view condition.
    pub fn raw_dir(&self, light: u32, view: u32) -> PathBuf {
        self.top
            .join(light_dir_name(light))
            .join(view_dir_name(view))
            .join("raw")
    }

    /// Destination of a single frame.
    pub fn frame_path(&self, light: u32, view: u32, height: u32) -> PathBuf {
        self.raw_dir(light, view).join(format!("frame_{:05}.jpg", height))
    }
}

fn light_dir_name(light: u32) -> String {
    format!("L_{:02}", light)
}

fn view_dir_name(view: u32) -> String {
    format!("V_{:02}", view)
}

fn create_new_dir(path: &Path) -> Result<(), LayoutError> {
    fs::create_dir(path).map_err(|source| match source.kind() {
        ErrorKind::AlreadyExists => LayoutError::DirectoryExists(path.to_path_buf()),
        _ => LayoutError::Io {
            path: path.to_path_buf(),
            source,
        },
    })
}
