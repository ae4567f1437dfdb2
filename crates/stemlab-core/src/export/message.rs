//! Export progress messages
//!
//! Sent from the export thread to the control thread over an mpsc channel;
//! poll the receiver for updates.

use std::path::PathBuf;
use std::time::Duration;

/// Progress of a running mixdown export
#[derive(Debug)]
pub enum ExportProgress {
    /// Render started
    Started {
        /// Total output frames to render
        total_frames: usize,
    },
    /// Render advanced
    Progress {
        rendered_frames: usize,
        total_frames: usize,
    },
    /// Mixdown written successfully
    Complete {
        path: PathBuf,
        duration: Duration,
    },
    /// Export failed; the exporting flag is already reset so a retry works
    Failed { message: String },
    /// Export cancelled by the user
    Cancelled,
}

impl ExportProgress {
    /// Fraction complete (0.0 - 1.0) for progress displays
    pub fn fraction(&self) -> f32 {
        match self {
            ExportProgress::Started { .. } => 0.0,
            ExportProgress::Progress { rendered_frames, total_frames } => {
                if *total_frames == 0 {
                    0.0
                } else {
                    *rendered_frames as f32 / *total_frames as f32
                }
            }
            ExportProgress::Complete { .. } => 1.0,
            ExportProgress::Failed { .. } | ExportProgress::Cancelled => 0.0,
        }
    }
}
