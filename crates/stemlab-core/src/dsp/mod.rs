//! Primitive signal processing units
//!
//! Everything here is a plain block-processing struct over [`StereoBuffer`];
//! the stem chain and the master bus compose them in a fixed order. No unit
//! allocates during processing.
//!
//! [`StereoBuffer`]: crate::types::StereoBuffer

mod biquad;
mod bitcrush;
mod delay;
mod gate;
mod limiter;
mod meter;
mod panner;
mod reverb;
mod smoother;
mod width;

pub use biquad::{BiquadCoeffs, BiquadState, FILTER_Q};
pub use bitcrush::BitCrusher;
pub use delay::EchoBus;
pub use gate::RhythmGate;
pub use limiter::Limiter;
pub use meter::{RmsMeter, METER_FLOOR_DB};
pub use panner::Panner;
pub use reverb::ReverbBus;
pub use smoother::ParamSmoother;
pub use width::WidthStage;
