//! Mid/side stereo width stage
//!
//! `mid = 0.5 (L + R)`, `side = 0.5 (L - R) * width`,
//! `L' = mid + side`, `R' = mid - side`.
//!
//! Width 1 reproduces the input exactly (the mid/side round-trip is the
//! identity), 0 collapses to mono, values above 1 exaggerate the stereo
//! field — accepted up to the declared 4, imaging inversion and all.

use crate::dsp::ParamSmoother;
use crate::types::StereoBuffer;

#[derive(Debug, Clone)]
pub struct WidthStage {
    width: ParamSmoother,
}

impl WidthStage {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            width: ParamSmoother::new(1.0, sample_rate),
        }
    }

    /// Ramp the width toward `width` (0.0 - 4.0)
    pub fn set_width(&mut self, width: f32) {
        self.width.set_target(width.clamp(0.0, 4.0));
    }

    /// Jump the width with no ramp (play/render start)
    pub fn snap_width(&mut self, width: f32) {
        self.width.snap_to(width.clamp(0.0, 4.0));
    }

    /// Process a buffer in-place
    pub fn process(&mut self, buffer: &mut StereoBuffer) {
        let width = self.width.advance(buffer.len());
        for sample in buffer.iter_mut() {
            let mid = 0.5 * (sample.left + sample.right);
            let side = 0.5 * (sample.left - sample.right) * width;
            sample.left = mid + side;
            sample.right = mid - side;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StereoSample;

    fn test_signal(len: usize) -> StereoBuffer {
        let mut buf = StereoBuffer::silence(len);
        for (i, s) in buf.iter_mut().enumerate() {
            *s = StereoSample::new((i as f32 * 0.31).sin(), (i as f32 * 0.17).cos() * 0.6);
        }
        buf
    }

    #[test]
    fn test_unity_width_is_identity() {
        let mut stage = WidthStage::new(44100);
        stage.snap_width(1.0);

        let mut buffer = test_signal(256);
        let original = buffer.clone();
        stage.process(&mut buffer);

        for (a, b) in buffer.iter().zip(original.iter()) {
            assert!((a.left - b.left).abs() < 1e-6);
            assert!((a.right - b.right).abs() < 1e-6);
        }
    }

    #[test]
    fn test_zero_width_is_mono() {
        let mut stage = WidthStage::new(44100);
        stage.snap_width(0.0);

        let mut buffer = test_signal(256);
        stage.process(&mut buffer);

        for s in buffer.iter() {
            assert!((s.left - s.right).abs() < 1e-6, "both channels must equal mid");
        }
    }

    #[test]
    fn test_exaggerated_width_grows_side() {
        let mut narrow = WidthStage::new(44100);
        narrow.snap_width(1.0);
        let mut wide = WidthStage::new(44100);
        wide.snap_width(3.0);

        let mut a = test_signal(256);
        let mut b = a.clone();
        narrow.process(&mut a);
        wide.process(&mut b);

        let side = |buf: &StereoBuffer| {
            buf.iter().map(|s| (s.left - s.right).abs()).sum::<f32>()
        };
        assert!(side(&b) > side(&a) * 2.0);
    }
}
