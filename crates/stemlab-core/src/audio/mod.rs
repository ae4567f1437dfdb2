//! Host audio facility
//!
//! CPAL output stream, configuration, and fail-fast startup errors. The
//! engine itself never touches the device layer — everything crosses the
//! command queue and the atomics.

mod config;
mod error;
mod output;

pub use config::{AudioConfig, BufferSize, DEFAULT_BUFFER_SIZE, LOW_LATENCY_BUFFER_SIZES};
pub use error::{AudioError, AudioResult};
pub use output::{start_audio, AudioSystem};
