//! Offline render and mixdown export
//!
//! The offline path reconstructs the live graph — same engine type, same
//! node ordering, same parameter application — against a plain loop instead
//! of the device callback, renders exactly one loop at the current tempo,
//! and serializes it to a canonical 16-bit PCM WAV.
//!
//! [`ExportService`] runs a render on a background thread with progress
//! messages, cancellation, and an exporting flag that resets on every exit
//! path so a failed export can be retried.

mod message;
mod render;
mod service;
mod wav;

pub use message::ExportProgress;
pub use render::{render_mixdown, MasterSettings};
pub use service::{default_mixdown_path, ExportService};
pub use wav::{sample_to_i16, write_wav};

use std::path::PathBuf;

use thiserror::Error;

/// Errors from the render/export path
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("An export is already running")]
    AlreadyExporting,

    #[error("No stems loaded to render")]
    NoStems,

    #[error("Failed to write mixdown: {path}")]
    Encode {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },

    #[error("Failed to write mixdown: {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type for export operations
pub type ExportResult<T> = Result<T, ExportError>;
