//! Master bus limiter
//!
//! A fixed-ratio feed-forward compressor: threshold just under unity,
//! 20:1 ratio, fast attack, moderate release. Inserted into the master
//! chain by re-routing on toggle — when disabled it is not in the signal
//! path at all.

use crate::types::StereoBuffer;

/// Threshold in dBFS (unity headroom)
const THRESHOLD_DB: f32 = -1.0;

/// Compression ratio (effectively limiting)
const RATIO: f32 = 20.0;

/// Attack / release time constants in seconds
const ATTACK_SECS: f32 = 0.003;
const RELEASE_SECS: f32 = 0.25;

pub struct Limiter {
    threshold: f32,
    attack_coeff: f32,
    release_coeff: f32,
    /// Envelope follower state (linear amplitude)
    envelope: f32,
}

impl Limiter {
    pub fn new(sample_rate: u32) -> Self {
        let sr = sample_rate as f32;
        Self {
            threshold: 10.0_f32.powf(THRESHOLD_DB / 20.0),
            // First-order exponential: coeff = exp(-1 / (tau * fs))
            attack_coeff: (-1.0 / (ATTACK_SECS * sr)).exp(),
            release_coeff: (-1.0 / (RELEASE_SECS * sr)).exp(),
            envelope: 0.0,
        }
    }

    /// Process a buffer in-place
    pub fn process(&mut self, buffer: &mut StereoBuffer) {
        for sample in buffer.iter_mut() {
            let peak = sample.peak();

            // Envelope follower: fast up, slow down
            let coeff = if peak > self.envelope {
                self.attack_coeff
            } else {
                self.release_coeff
            };
            self.envelope = peak + (self.envelope - peak) * coeff;

            if self.envelope > self.threshold {
                // Gain so the compressed envelope maps back onto the signal
                let compressed =
                    self.threshold + (self.envelope - self.threshold) / RATIO;
                let gain = compressed / self.envelope;
                sample.left *= gain;
                sample.right *= gain;
            }
        }
    }

    /// Reset follower state (re-insertion after toggle)
    pub fn reset(&mut self) {
        self.envelope = 0.0;
    }
}
