//! Reverb send bus
//!
//! Freeverb-style: parallel damped comb filters into serial allpass
//! diffusers, per channel with a small stereo spread. Stems tap in
//! post-width with their `reverb_send` level; the wet return joins the
//! master input. Fixed room/damping — the send level is the only control.

use crate::types::StereoBuffer;

/// Comb filter delay line lengths (in samples at 44.1kHz, prime-ish)
const COMB_LENGTHS: [usize; 8] = [1557, 1617, 1491, 1422, 1277, 1356, 1188, 1116];

/// Allpass filter delay line lengths
const ALLPASS_LENGTHS: [usize; 4] = [225, 556, 441, 341];

/// Stereo spread offset for the right channel (in samples)
const STEREO_SPREAD: usize = 23;

/// Comb feedback (room size) and damping, fixed for the send bus
const COMB_FEEDBACK: f32 = 0.84;
const DAMPING: f32 = 0.2;
const ALLPASS_FEEDBACK: f32 = 0.5;

/// Wet output trim so a full-level send does not overwhelm the dry mix
const WET_GAIN: f32 = 0.35;

struct CombFilter {
    buffer: Vec<f32>,
    pos: usize,
    filter_state: f32,
}

impl CombFilter {
    fn new(length: usize, sample_rate: u32) -> Self {
        let scaled = ((length as f32 * sample_rate as f32 / 44100.0) as usize).max(1);
        Self {
            buffer: vec![0.0; scaled],
            pos: 0,
            filter_state: 0.0,
        }
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let output = self.buffer[self.pos];
        // One-pole lowpass in the feedback path damps the highs
        self.filter_state = output * (1.0 - DAMPING) + self.filter_state * DAMPING;
        self.buffer[self.pos] = input + self.filter_state * COMB_FEEDBACK;
        self.pos = (self.pos + 1) % self.buffer.len();
        output
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.filter_state = 0.0;
    }
}

struct AllpassFilter {
    buffer: Vec<f32>,
    pos: usize,
}

impl AllpassFilter {
    fn new(length: usize, sample_rate: u32) -> Self {
        let scaled = ((length as f32 * sample_rate as f32 / 44100.0) as usize).max(1);
        Self {
            buffer: vec![0.0; scaled],
            pos: 0,
        }
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let buffered = self.buffer[self.pos];
        let output = -input + buffered;
        self.buffer[self.pos] = input + buffered * ALLPASS_FEEDBACK;
        self.pos = (self.pos + 1) % self.buffer.len();
        output
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
    }
}

/// Shared reverb bus for the per-stem sends
pub struct ReverbBus {
    combs_l: Vec<CombFilter>,
    combs_r: Vec<CombFilter>,
    allpass_l: Vec<AllpassFilter>,
    allpass_r: Vec<AllpassFilter>,
}

impl ReverbBus {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            combs_l: COMB_LENGTHS.iter().map(|&l| CombFilter::new(l, sample_rate)).collect(),
            combs_r: COMB_LENGTHS
                .iter()
                .map(|&l| CombFilter::new(l + STEREO_SPREAD, sample_rate))
                .collect(),
            allpass_l: ALLPASS_LENGTHS.iter().map(|&l| AllpassFilter::new(l, sample_rate)).collect(),
            allpass_r: ALLPASS_LENGTHS
                .iter()
                .map(|&l| AllpassFilter::new(l + STEREO_SPREAD, sample_rate))
                .collect(),
        }
    }

    /// Process the summed send buffer; the wet return is *added* into `out`
    pub fn process(&mut self, send: &StereoBuffer, out: &mut StereoBuffer) {
        debug_assert_eq!(send.len(), out.len());
        for (i, dst) in out.iter_mut().enumerate() {
            // Mono-sum into the tank, stereo out via the spread offsets
            let input = (send[i].left + send[i].right) * 0.5;

            let mut wet_l = 0.0;
            for comb in &mut self.combs_l {
                wet_l += comb.process(input);
            }
            let mut wet_r = 0.0;
            for comb in &mut self.combs_r {
                wet_r += comb.process(input);
            }

            for allpass in &mut self.allpass_l {
                wet_l = allpass.process(wet_l);
            }
            for allpass in &mut self.allpass_r {
                wet_r = allpass.process(wet_r);
            }

            dst.left += wet_l * WET_GAIN;
            dst.right += wet_r * WET_GAIN;
        }
    }

    /// Clear the tank (stop / chain teardown)
    pub fn reset(&mut self) {
        for c in self.combs_l.iter_mut().chain(self.combs_r.iter_mut()) {
            c.reset();
        }
        for a in self.allpass_l.iter_mut().chain(self.allpass_r.iter_mut()) {
            a.reset();
        }
    }
}
