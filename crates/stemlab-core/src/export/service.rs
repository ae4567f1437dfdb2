//! Background export service
//!
//! Runs one mixdown render at a time on a worker thread, reporting progress
//! over an mpsc channel. Errors are caught at the export boundary and
//! surfaced as [`ExportProgress::Failed`]; on every exit path the exporting
//! flag resets so a retry is possible.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use basedrop::Shared;

use crate::control::EntryState;
use crate::export::render::{render_blocks, MasterSettings};
use crate::export::wav::write_wav;
use crate::export::{ExportError, ExportProgress, ExportResult};
use crate::supply::StemSet;

/// Progress messages per render (coarser than per-block to keep the channel
/// quiet)
const PROGRESS_MESSAGES: usize = 50;

/// Default mixdown path: timestamped file in a directory
pub fn default_mixdown_path(dir: &Path) -> PathBuf {
    let stamp = chrono::Local::now().format("%Y-%m-%d-%H%M%S");
    dir.join(format!("mixdown-{}.wav", stamp))
}

/// One-at-a-time mixdown export coordinator
pub struct ExportService {
    exporting: Arc<AtomicBool>,
    cancel_flag: Arc<AtomicBool>,
}

impl ExportService {
    pub fn new() -> Self {
        Self {
            exporting: Arc::new(AtomicBool::new(false)),
            cancel_flag: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether an export is currently running
    pub fn is_exporting(&self) -> bool {
        self.exporting.load(Ordering::SeqCst)
    }

    /// Cancel the running export; the worker stops at its next block
    pub fn cancel(&self) {
        self.cancel_flag.store(true, Ordering::SeqCst);
    }

    /// Start rendering the current state to `path`
    ///
    /// Returns a receiver for progress messages; the export runs in the
    /// background. Fails immediately if an export is already running.
    pub fn start_export(
        &self,
        stems: Shared<StemSet>,
        state: EntryState,
        master: MasterSettings,
        path: PathBuf,
    ) -> ExportResult<Receiver<ExportProgress>> {
        if self.exporting.swap(true, Ordering::SeqCst) {
            return Err(ExportError::AlreadyExporting);
        }
        self.cancel_flag.store(false, Ordering::SeqCst);

        let (progress_tx, progress_rx) = channel();
        let exporting = Arc::clone(&self.exporting);
        let cancel_flag = Arc::clone(&self.cancel_flag);

        thread::Builder::new()
            .name("mixdown-export".to_string())
            .spawn(move || {
                let start_time = Instant::now();
                let total_frames = crate::export::render::loop_output_frames(
                    &stems,
                    state.clamped().tempo,
                    stems.sample_rate(),
                );
                let _ = progress_tx.send(ExportProgress::Started { total_frames });

                let progress_step = (total_frames / PROGRESS_MESSAGES).max(1);
                let mut next_report = progress_step;

                let rendered = render_blocks(&stems, &state, master, |done, total| {
                    if done >= next_report {
                        next_report = done + progress_step;
                        let _ = progress_tx.send(ExportProgress::Progress {
                            rendered_frames: done,
                            total_frames: total,
                        });
                    }
                    !cancel_flag.load(Ordering::Relaxed)
                });

                match rendered {
                    None => {
                        log::info!("Mixdown export cancelled");
                        let _ = progress_tx.send(ExportProgress::Cancelled);
                    }
                    Some(buffer) => match write_wav(&buffer, stems.sample_rate(), &path) {
                        Ok(()) => {
                            let duration = start_time.elapsed();
                            log::info!(
                                "Mixdown written to {} ({} frames in {:.2?})",
                                path.display(),
                                buffer.len(),
                                duration
                            );
                            let _ = progress_tx.send(ExportProgress::Complete { path, duration });
                        }
                        Err(e) => {
                            log::error!("Mixdown export failed: {}", e);
                            let _ = progress_tx.send(ExportProgress::Failed {
                                message: e.to_string(),
                            });
                        }
                    },
                }

                // Reset on every exit path so a retry is possible
                exporting.store(false, Ordering::SeqCst);
            })
            .map_err(|source| {
                // The thread never started; clear the flag ourselves
                self.exporting.store(false, Ordering::SeqCst);
                ExportError::Io {
                    path: PathBuf::from("<export thread>"),
                    source,
                }
            })?;

        Ok(progress_rx)
    }
}

impl Default for ExportService {
    fn default() -> Self {
        Self::new()
    }
}
