//! Echo send bus
//!
//! A shared tempo-synced feedback delay. Stems tap into it post-width with
//! their `echo_send` level; the wet return joins the master input. The
//! feedback path is an intentional one-node cycle with a bounded
//! coefficient — not a general graph cycle.

use crate::types::{StereoBuffer, StereoSample};

/// Maximum delay time in seconds
const MAX_DELAY_SECONDS: f32 = 2.0;

/// Echo length in beats (dotted eighth at the nominal grid)
const ECHO_BEATS: f32 = 0.375;

/// Feedback coefficient; bounded well below 1 so the loop always decays
const FEEDBACK: f32 = 0.45;

/// Shared feedback delay for the echo sends
pub struct EchoBus {
    buffer_l: Vec<f32>,
    buffer_r: Vec<f32>,
    write_pos: usize,
    delay_samples: usize,
    sample_rate: f32,
}

impl EchoBus {
    pub fn new(sample_rate: u32) -> Self {
        let max_samples = (sample_rate as f32 * MAX_DELAY_SECONDS) as usize;
        let mut bus = Self {
            buffer_l: vec![0.0; max_samples],
            buffer_r: vec![0.0; max_samples],
            write_pos: 0,
            delay_samples: 0,
            sample_rate: sample_rate as f32,
        };
        bus.set_clock(120.0, 1.0);
        bus
    }

    /// Update the delay time from the grid BPM and tempo factor
    ///
    /// The echo stays musical: a dotted eighth of the effective tempo.
    pub fn set_clock(&mut self, bpm: f64, tempo: f64) {
        let effective_bpm = (bpm * tempo).max(1.0) as f32;
        let seconds = ECHO_BEATS * 60.0 / effective_bpm;
        let samples = (seconds * self.sample_rate) as usize;
        self.delay_samples = samples.clamp(1, self.buffer_l.len() - 1);
    }

    /// Process the summed send buffer; the wet return is *added* into `out`
    pub fn process(&mut self, send: &StereoBuffer, out: &mut StereoBuffer) {
        debug_assert_eq!(send.len(), out.len());
        let len = self.buffer_l.len();
        for (i, dst) in out.iter_mut().enumerate() {
            let read_pos = (self.write_pos + len - self.delay_samples) % len;
            let delayed = StereoSample::new(self.buffer_l[read_pos], self.buffer_r[read_pos]);

            let input = send[i];
            self.buffer_l[self.write_pos] = input.left + delayed.left * FEEDBACK;
            self.buffer_r[self.write_pos] = input.right + delayed.right * FEEDBACK;
            self.write_pos = (self.write_pos + 1) % len;

            *dst += delayed;
        }
    }

    /// Clear the delay line (stop / chain teardown)
    pub fn reset(&mut self) {
        self.buffer_l.fill(0.0);
        self.buffer_r.fill(0.0);
        self.write_pos = 0;
    }
}
