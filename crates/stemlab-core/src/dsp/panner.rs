//! Equal-power stereo panner
//!
//! Implements the standard stereo-input pan law: panning toward one side
//! folds the opposite channel in with an equal-power weighting, so pan 0 is
//! a bit-exact identity and the extremes collapse to a single channel.

use crate::types::StereoBuffer;

#[derive(Debug, Clone, Default)]
pub struct Panner {
    pan: f32,
}

impl Panner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the pan position (-1.0 = hard left, 1.0 = hard right)
    ///
    /// Pan is applied immediately (no smoothing), matching the gain stage.
    pub fn set_pan(&mut self, pan: f32) {
        self.pan = pan.clamp(-1.0, 1.0);
    }

    /// Process a buffer in-place
    pub fn process(&self, buffer: &mut StereoBuffer) {
        let pan = self.pan;
        if pan == 0.0 {
            return;
        }

        let x = if pan <= 0.0 { pan + 1.0 } else { pan };
        let theta = x * std::f32::consts::FRAC_PI_2;
        let gain_l = theta.cos();
        let gain_r = theta.sin();

        if pan <= 0.0 {
            // Fold right into left
            for s in buffer.iter_mut() {
                let (l, r) = (s.left, s.right);
                s.left = l + r * gain_l;
                s.right = r * gain_r;
            }
        } else {
            // Fold left into right
            for s in buffer.iter_mut() {
                let (l, r) = (s.left, s.right);
                s.left = l * gain_l;
                s.right = r + l * gain_r;
            }
        }
    }
}
