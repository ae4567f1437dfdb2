//! Audio backend configuration

use serde::{Deserialize, Serialize};

/// Common low-latency buffer sizes (frames)
pub const LOW_LATENCY_BUFFER_SIZES: [u32; 4] = [64, 128, 256, 512];

/// Default buffer size when no preference is specified (frames)
/// 512 frames is a safe default that works on most systems.
pub const DEFAULT_BUFFER_SIZE: u32 = 512;

/// Preferred buffer size for the output stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BufferSize {
    /// Let the system choose
    #[default]
    Default,
    /// Request a specific size in frames (may be adjusted by the system)
    Fixed(u32),
}

impl BufferSize {
    /// The requested size in frames, or None for system default
    pub fn as_frames(&self) -> Option<u32> {
        match self {
            BufferSize::Default => None,
            BufferSize::Fixed(frames) => Some(*frames),
        }
    }
}

/// Audio system configuration
///
/// Serde-derived so it persists next to the entry state; every field
/// defaults so older config files keep loading as fields are added.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Output device name as reported by the system; None = default device
    pub device: Option<String>,
    /// Buffer size preference
    pub buffer_size: BufferSize,
    /// Preferred sample rate; None = whatever the device reports
    pub sample_rate: Option<u32>,
}
