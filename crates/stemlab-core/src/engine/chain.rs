//! Per-stem processing chain
//!
//! One chain per stem, built fresh for every playback session. Fixed node
//! order: source → high-pass → tone (peaking) → low-pass → gate → bitcrush →
//! gain → pan → width, with echo/reverb send taps post-width.
//!
//! The source is the decoded stem buffer read at a fractional position with
//! linear interpolation, looped; the caller supplies the playhead and the
//! per-block rate (tempo factor × tape multiplier) so all stems stay
//! phase-locked. Live control edits retarget smoothers on the running nodes;
//! the chain is never rebuilt mid-play.

use basedrop::Shared;

use crate::control::StemControl;
use crate::dsp::{
    BiquadCoeffs, BiquadState, BitCrusher, Panner, ParamSmoother, RhythmGate, WidthStage,
    FILTER_Q,
};
use crate::macros::{gate_frequency_hz, resolve_targets, NEUTRAL_HP_HZ, NEUTRAL_LP_HZ};
use crate::supply::StemSet;
use crate::types::{Stem, StereoBuffer, StereoSample};

/// Tone stage Q (wide musical bell)
const TONE_Q: f32 = 0.9;

pub struct StemChain {
    stem: Stem,
    stems: Shared<StemSet>,
    sample_rate: f32,

    // Filter stages
    hp_cutoff: ParamSmoother,
    hp_state: BiquadState,
    tone_freq: ParamSmoother,
    tone_gain_db: ParamSmoother,
    tone_state: BiquadState,
    lp_cutoff: ParamSmoother,
    lp_state: BiquadState,

    // Amplitude shaping
    gate: RhythmGate,
    crusher: BitCrusher,
    gain: f32,
    panner: Panner,
    width: WidthStage,

    // Send taps (post-width)
    echo_send: ParamSmoother,
    reverb_send: ParamSmoother,
}

impl StemChain {
    /// Build a chain for one stem of a set
    ///
    /// Returns `None` when the stem was not delivered with this entry.
    pub fn new(stem: Stem, stems: Shared<StemSet>, sample_rate: u32) -> Option<Self> {
        stems.stem(stem)?;

        Some(Self {
            stem,
            stems,
            sample_rate: sample_rate as f32,
            hp_cutoff: ParamSmoother::new(NEUTRAL_HP_HZ, sample_rate),
            hp_state: BiquadState::default(),
            tone_freq: ParamSmoother::new(1000.0, sample_rate),
            tone_gain_db: ParamSmoother::new(0.0, sample_rate),
            tone_state: BiquadState::default(),
            lp_cutoff: ParamSmoother::new(NEUTRAL_LP_HZ, sample_rate),
            lp_state: BiquadState::default(),
            gate: RhythmGate::new(sample_rate),
            crusher: BitCrusher::new(sample_rate),
            gain: 1.0,
            panner: Panner::new(),
            width: WidthStage::new(sample_rate),
            echo_send: ParamSmoother::new(0.0, sample_rate),
            reverb_send: ParamSmoother::new(0.0, sample_rate),
        })
    }

    /// The stem this chain renders
    pub fn stem(&self) -> Stem {
        self.stem
    }

    /// Map a control record onto the running nodes
    ///
    /// Filter, tone, gate, bitcrush, width and send levels ramp with short
    /// smoothing; gain and pan apply immediately. With `immediate` set
    /// (play/render start) every smoother snaps so live and offline graphs
    /// begin from identical state.
    pub fn apply_control(&mut self, control: &StemControl, tempo: f64, immediate: bool) {
        let control = control.clamped();
        let targets = resolve_targets(self.stem, &control);

        let (tone_freq, tone_gain) = match targets.tone {
            Some(tone) => (tone.freq_hz, tone.gain_db),
            // Flat bell: keep the last center frequency, ramp gain to zero
            None => (self.tone_freq.target(), 0.0),
        };

        if immediate {
            self.hp_cutoff.snap_to(targets.highpass_hz);
            self.lp_cutoff.snap_to(targets.lowpass_hz);
            self.tone_freq.snap_to(tone_freq);
            self.tone_gain_db.snap_to(tone_gain);
            self.gate.snap_depth(control.gate);
            self.crusher.snap_amount(control.bitcrush);
            self.width.snap_width(control.width);
            self.echo_send.snap_to(control.echo_send);
            self.reverb_send.snap_to(control.reverb_send);
        } else {
            self.hp_cutoff.set_target(targets.highpass_hz);
            self.lp_cutoff.set_target(targets.lowpass_hz);
            self.tone_freq.set_target(tone_freq);
            self.tone_gain_db.set_target(tone_gain);
            self.gate.set_depth(control.gate);
            self.crusher.set_amount(control.bitcrush);
            self.width.set_width(control.width);
            self.echo_send.set_target(control.echo_send);
            self.reverb_send.set_target(control.reverb_send);
        }

        self.gate.set_frequency(gate_frequency_hz(tempo));
        self.gain = control.gain;
        self.panner.set_pan(control.pan);
    }

    /// Tempo changed mid-play: only the gate clock cares
    pub fn set_tempo(&mut self, tempo: f64) {
        self.gate.set_frequency(gate_frequency_hz(tempo));
    }

    /// Read the source at a fractional loop position (linear interpolation)
    #[inline]
    fn read_source(source: &StereoBuffer, pos: f64, frames: usize) -> StereoSample {
        let wrapped = pos.rem_euclid(frames as f64);
        let i0 = wrapped as usize;
        let i1 = (i0 + 1) % frames;
        let frac = (wrapped - i0 as f64) as f32;

        let a = source[i0];
        let b = source[i1];
        StereoSample::new(
            a.left + (b.left - a.left) * frac,
            a.right + (b.right - a.right) * frac,
        )
    }

    /// Render one block
    ///
    /// `position` is the loop playhead in source frames, `rate` the source
    /// frames consumed per output frame. Output lands in `out`; the
    /// post-width send taps are *added* into `echo_send`/`reverb_send`.
    pub fn process(
        &mut self,
        position: f64,
        rate: f64,
        out: &mut StereoBuffer,
        echo_send: &mut StereoBuffer,
        reverb_send: &mut StereoBuffer,
    ) {
        let frames = out.len();
        let Some(source) = self.stems.stem(self.stem) else {
            out.fill_silence();
            return;
        };
        let loop_frames = self.stems.frames();

        // Source read at the shared playhead
        for (i, dst) in out.iter_mut().enumerate() {
            *dst = Self::read_source(source, position + i as f64 * rate, loop_frames);
        }

        // Filters: smoothed cutoffs, coefficients recomputed per block.
        // A filter parked at its neutral cutoff drops out of the path.
        let hp = self.hp_cutoff.advance(frames);
        let hp_coeffs = if hp <= NEUTRAL_HP_HZ + 0.5 {
            BiquadCoeffs::passthrough()
        } else {
            BiquadCoeffs::highpass(hp, FILTER_Q, self.sample_rate)
        };
        self.hp_state.process_buffer(out, &hp_coeffs);

        let tone_gain = self.tone_gain_db.advance(frames);
        let tone_freq = self.tone_freq.advance(frames);
        let tone_coeffs = if tone_gain.abs() < 0.1 {
            BiquadCoeffs::passthrough()
        } else {
            BiquadCoeffs::peaking(tone_freq, tone_gain, TONE_Q, self.sample_rate)
        };
        self.tone_state.process_buffer(out, &tone_coeffs);

        let lp = self.lp_cutoff.advance(frames);
        let lp_coeffs = if lp >= NEUTRAL_LP_HZ - 50.0 {
            BiquadCoeffs::passthrough()
        } else {
            BiquadCoeffs::lowpass(lp, FILTER_Q, self.sample_rate)
        };
        self.lp_state.process_buffer(out, &lp_coeffs);

        // Amplitude shaping
        self.gate.process(out);
        self.crusher.process(out);
        out.scale(self.gain);
        self.panner.process(out);
        self.width.process(out);

        // Post-width send taps
        let echo_level = self.echo_send.advance(frames);
        let reverb_level = self.reverb_send.advance(frames);
        if echo_level > 0.0 {
            for (dst, src) in echo_send.iter_mut().zip(out.iter()) {
                *dst += *src * echo_level;
            }
        }
        if reverb_level > 0.0 {
            for (dst, src) in reverb_send.iter_mut().zip(out.iter()) {
                *dst += *src * reverb_level;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::gc::gc_handle;
    use crate::supply::StemSet;

    fn shared_set(frames: usize) -> Shared<StemSet> {
        let mut buf = StereoBuffer::silence(frames);
        for (i, s) in buf.iter_mut().enumerate() {
            let v = (2.0 * std::f32::consts::PI * 220.0 * i as f32 / 44100.0).sin() * 0.5;
            *s = StereoSample::new(v, -v);
        }
        let set = StemSet::from_buffers(vec![(Stem::Drums, buf)], 44100).unwrap();
        Shared::new(&gc_handle(), set)
    }

    fn silent_sends(frames: usize) -> (StereoBuffer, StereoBuffer) {
        (StereoBuffer::silence(frames), StereoBuffer::silence(frames))
    }

    #[test]
    fn test_missing_stem_yields_no_chain() {
        let stems = shared_set(1024);
        assert!(StemChain::new(Stem::Vocals, stems.clone(), 44100).is_none());
        assert!(StemChain::new(Stem::Drums, stems, 44100).is_some());
    }

    #[test]
    fn test_default_control_passes_source_through() {
        let stems = shared_set(4096);
        let mut chain = StemChain::new(Stem::Drums, stems.clone(), 44100).unwrap();
        chain.apply_control(&StemControl::default(), 1.0, true);

        let mut out = StereoBuffer::silence(256);
        let (mut echo, mut reverb) = silent_sends(256);
        chain.process(0.0, 1.0, &mut out, &mut echo, &mut reverb);

        let source = stems.stem(Stem::Drums).unwrap();
        for i in 0..256 {
            assert!((out[i].left - source[i].left).abs() < 1e-5);
            assert!((out[i].right - source[i].right).abs() < 1e-5);
        }
        // No sends at default levels
        assert_eq!(echo.peak(), 0.0);
        assert_eq!(reverb.peak(), 0.0);
    }

    #[test]
    fn test_zero_gain_silences_output() {
        let stems = shared_set(4096);
        let mut chain = StemChain::new(Stem::Drums, stems, 44100).unwrap();
        let control = StemControl { gain: 0.0, ..StemControl::default() };
        chain.apply_control(&control, 1.0, true);

        let mut out = StereoBuffer::silence(512);
        let (mut echo, mut reverb) = silent_sends(512);
        chain.process(0.0, 1.0, &mut out, &mut echo, &mut reverb);
        assert_eq!(out.peak(), 0.0);
    }

    #[test]
    fn test_send_taps_follow_output() {
        let stems = shared_set(4096);
        let mut chain = StemChain::new(Stem::Drums, stems, 44100).unwrap();
        let control = StemControl { echo_send: 0.5, ..StemControl::default() };
        chain.apply_control(&control, 1.0, true);

        let mut out = StereoBuffer::silence(256);
        let (mut echo, mut reverb) = silent_sends(256);
        chain.process(0.0, 1.0, &mut out, &mut echo, &mut reverb);

        for i in 0..256 {
            assert!((echo[i].left - out[i].left * 0.5).abs() < 1e-6);
        }
        assert_eq!(reverb.peak(), 0.0);
    }

    #[test]
    fn test_playhead_wraps_around_loop() {
        let stems = shared_set(1000);
        let mut chain = StemChain::new(Stem::Drums, stems.clone(), 44100).unwrap();
        chain.apply_control(&StemControl::default(), 1.0, true);

        let mut out = StereoBuffer::silence(64);
        let (mut echo, mut reverb) = silent_sends(64);
        // Start 10 frames before the loop end
        chain.process(990.0, 1.0, &mut out, &mut echo, &mut reverb);

        let source = stems.stem(Stem::Drums).unwrap();
        // Frame 10 of the block is loop position 0 again
        assert!((out[10].left - source[0].left).abs() < 1e-5);
    }

    #[test]
    fn test_half_rate_reads_between_samples() {
        let stems = shared_set(4096);
        let mut chain = StemChain::new(Stem::Drums, stems.clone(), 44100).unwrap();
        chain.apply_control(&StemControl::default(), 1.0, true);

        let mut out = StereoBuffer::silence(8);
        let (mut echo, mut reverb) = silent_sends(8);
        chain.process(0.0, 0.5, &mut out, &mut echo, &mut reverb);

        let source = stems.stem(Stem::Drums).unwrap();
        // Frame 1 sits halfway between source samples 0 and 1
        let expected = 0.5 * (source[0].left + source[1].left);
        assert!((out[1].left - expected).abs() < 1e-5);
    }
}
