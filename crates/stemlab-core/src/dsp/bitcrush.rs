//! Bit-depth reduction waveshaper
//!
//! A static transfer curve quantizing the signal into
//! `1 + (1 - amount) * 64` levels. At amount 0 the curve is the identity —
//! a literal passthrough, not a 65-level approximation of one.

use crate::dsp::ParamSmoother;
use crate::macros::bitcrush_steps;
use crate::types::StereoBuffer;

#[derive(Debug, Clone)]
pub struct BitCrusher {
    amount: ParamSmoother,
}

impl BitCrusher {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            amount: ParamSmoother::new(0.0, sample_rate),
        }
    }

    /// Ramp the crush amount toward `amount` (0.0 - 1.0)
    pub fn set_amount(&mut self, amount: f32) {
        self.amount.set_target(amount.clamp(0.0, 1.0));
    }

    /// Jump the amount with no ramp (play/render start)
    pub fn snap_amount(&mut self, amount: f32) {
        self.amount.snap_to(amount.clamp(0.0, 1.0));
    }

    /// Quantize one sample into `steps` levels over [-1, 1]
    #[inline]
    fn crush(x: f32, steps: f32) -> f32 {
        if steps < 2.0 {
            // Single level left: everything collapses to zero
            return 0.0;
        }
        let levels = steps - 1.0;
        let normalized = (x.clamp(-1.0, 1.0) + 1.0) * 0.5;
        (normalized * levels).round() / levels * 2.0 - 1.0
    }

    /// Process a buffer in-place
    pub fn process(&mut self, buffer: &mut StereoBuffer) {
        let amount = self.amount.advance(buffer.len());
        if amount <= 0.0 {
            return; // identity
        }

        let steps = bitcrush_steps(amount);
        for sample in buffer.iter_mut() {
            sample.left = Self::crush(sample.left, steps);
            sample.right = Self::crush(sample.right, steps);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StereoSample;

    #[test]
    fn test_zero_amount_is_identity() {
        let mut crusher = BitCrusher::new(44100);
        crusher.snap_amount(0.0);

        let mut buffer = StereoBuffer::silence(256);
        for (i, s) in buffer.iter_mut().enumerate() {
            let v = (i as f32 * 0.13).sin() * 0.9;
            *s = StereoSample::new(v, -v);
        }
        let original = buffer.clone();
        crusher.process(&mut buffer);

        for (a, b) in buffer.iter().zip(original.iter()) {
            assert_eq!(a.left, b.left);
            assert_eq!(a.right, b.right);
        }
    }

    #[test]
    fn test_full_amount_collapses_levels() {
        let mut crusher = BitCrusher::new(44100);
        crusher.snap_amount(1.0);

        let mut buffer = StereoBuffer::silence(64);
        for (i, s) in buffer.iter_mut().enumerate() {
            *s = StereoSample::mono((i as f32 * 0.1).sin());
        }
        crusher.process(&mut buffer);
        for s in buffer.iter() {
            assert_eq!(s.left, 0.0);
        }
    }

    #[test]
    fn test_quantization_reduces_distinct_values() {
        let mut crusher = BitCrusher::new(44100);
        crusher.snap_amount(0.9); // steps = 1 + 0.1*64 = 7.4

        let mut buffer = StereoBuffer::silence(1024);
        for (i, s) in buffer.iter_mut().enumerate() {
            *s = StereoSample::mono((i as f32 / 1024.0) * 2.0 - 1.0);
        }
        crusher.process(&mut buffer);

        let mut values: Vec<i32> = buffer.iter().map(|s| (s.left * 1000.0) as i32).collect();
        values.sort_unstable();
        values.dedup();
        assert!(values.len() <= 8, "heavy crush should leave few levels, got {}", values.len());
    }
}
