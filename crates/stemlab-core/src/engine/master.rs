//! Master bus
//!
//! Fixed topology: stem outputs + echo/reverb returns → master gain →
//! stutter gate → master high-pass → master low-pass → (optional) limiter →
//! meter tap → output.
//!
//! The stutter gate, tape stop and build sweep are small per-effect state
//! machines (`idle → running → idle`) with explicit cancellation hooks so
//! `stop()` can reset everything to pre-automation values immediately.

use crate::dsp::{BiquadCoeffs, BiquadState, Limiter, RmsMeter, FILTER_Q};
use crate::macros::{NEUTRAL_HP_HZ, NEUTRAL_LP_HZ};
use crate::types::StereoBuffer;

/// Stutter retrigger subdivisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StutterRate {
    Quarter,
    Eighth,
}

impl StutterRate {
    /// Length of one retrigger period in beats
    fn beats(&self) -> f64 {
        match self {
            StutterRate::Quarter => 1.0,
            StutterRate::Eighth => 0.5,
        }
    }
}

/// Stutter gain ramp length (gate reopens over this time)
const STUTTER_RAMP_SECS: f32 = 0.05;

/// Tape-stop timeline
const TAPE_STOP_SECS: f64 = 0.7;
const TAPE_HOLD_SECS: f64 = 0.2;
const TAPE_RESUME_SECS: f64 = 0.6;
/// Rate floor during the hold ("near-zero", not a full halt)
const TAPE_MIN_RATE: f64 = 0.01;

/// Build-sweep timeline and band
const BUILD_TIGHTEN_SECS: f64 = 2.0;
const BUILD_RELEASE_SECS: f64 = 0.5;
const BUILD_LP_TARGET_HZ: f32 = 500.0;
const BUILD_HP_TARGET_HZ: f32 = 180.0;

/// Periodic gate retrigger: gain snaps to zero at each subdivision boundary,
/// then ramps linearly back to unity.
struct StutterGate {
    rate: Option<StutterRate>,
    period_samples: usize,
    pos: usize,
    gain: f32,
    ramp_step: f32,
}

impl StutterGate {
    fn new(sample_rate: u32) -> Self {
        Self {
            rate: None,
            period_samples: 1,
            pos: 0,
            gain: 1.0,
            ramp_step: 1.0 / (STUTTER_RAMP_SECS * sample_rate as f32),
        }
    }

    /// Toggle a rate: same rate off restores unity, a new rate replaces the
    /// running timer.
    fn toggle(&mut self, rate: StutterRate, bpm: f64, tempo: f64, sample_rate: u32) {
        if self.rate == Some(rate) {
            self.cancel();
            return;
        }
        let beat_secs = 60.0 / (bpm * tempo).max(1.0);
        let period = (rate.beats() * beat_secs * sample_rate as f64) as usize;
        self.rate = Some(rate);
        self.period_samples = period.max(1);
        self.pos = 0;
        self.gain = 1.0;
    }

    fn cancel(&mut self) {
        self.rate = None;
        self.gain = 1.0;
        self.pos = 0;
    }

    #[inline]
    fn tick(&mut self) -> f32 {
        if self.rate.is_none() {
            return 1.0;
        }
        if self.pos == 0 {
            self.gain = 0.0;
        }
        let gain = self.gain;
        self.gain = (self.gain + self.ramp_step).min(1.0);
        self.pos = (self.pos + 1) % self.period_samples;
        gain
    }
}

/// Tape stop/start: playback rate ramps to near-zero, holds, ramps back.
#[derive(Debug, Clone, Copy, PartialEq)]
enum TapePhase {
    Idle,
    Stopping,
    Holding,
    Resuming,
}

struct TapeStop {
    phase: TapePhase,
    /// Seconds elapsed within the current phase
    elapsed: f64,
}

impl TapeStop {
    fn new() -> Self {
        Self { phase: TapePhase::Idle, elapsed: 0.0 }
    }

    /// Start the sequence; ignored while one is already running
    fn trigger(&mut self) {
        if self.phase == TapePhase::Idle {
            self.phase = TapePhase::Stopping;
            self.elapsed = 0.0;
        }
    }

    fn cancel(&mut self) {
        self.phase = TapePhase::Idle;
        self.elapsed = 0.0;
    }

    fn is_active(&self) -> bool {
        self.phase != TapePhase::Idle
    }

    /// Rate multiplier at the current point of the timeline, then advance
    /// by one block. The flag resets automatically when the resume ramp
    /// completes.
    fn advance(&mut self, block_secs: f64) -> f64 {
        let mult = match self.phase {
            TapePhase::Idle => 1.0,
            TapePhase::Stopping => {
                let t = (self.elapsed / TAPE_STOP_SECS).min(1.0);
                1.0 + (TAPE_MIN_RATE - 1.0) * t
            }
            TapePhase::Holding => TAPE_MIN_RATE,
            TapePhase::Resuming => {
                let t = (self.elapsed / TAPE_RESUME_SECS).min(1.0);
                TAPE_MIN_RATE + (1.0 - TAPE_MIN_RATE) * t
            }
        };

        self.elapsed += block_secs;
        match self.phase {
            TapePhase::Stopping if self.elapsed >= TAPE_STOP_SECS => {
                self.phase = TapePhase::Holding;
                self.elapsed = 0.0;
            }
            TapePhase::Holding if self.elapsed >= TAPE_HOLD_SECS => {
                self.phase = TapePhase::Resuming;
                self.elapsed = 0.0;
            }
            TapePhase::Resuming if self.elapsed >= TAPE_RESUME_SECS => {
                self.phase = TapePhase::Idle;
                self.elapsed = 0.0;
            }
            _ => {}
        }

        mult
    }
}

/// Build sweep: master filters pinch inward, then release to neutral.
#[derive(Debug, Clone, Copy, PartialEq)]
enum BuildPhase {
    Idle,
    Tighten,
    Release,
}

struct BuildSweep {
    phase: BuildPhase,
    elapsed: f64,
}

impl BuildSweep {
    fn new() -> Self {
        Self { phase: BuildPhase::Idle, elapsed: 0.0 }
    }

    fn trigger(&mut self) {
        if self.phase == BuildPhase::Idle {
            self.phase = BuildPhase::Tighten;
            self.elapsed = 0.0;
        }
    }

    fn cancel(&mut self) {
        self.phase = BuildPhase::Idle;
        self.elapsed = 0.0;
    }

    fn is_active(&self) -> bool {
        self.phase != BuildPhase::Idle
    }

    /// Current (hp, lp) cutoffs, then advance by one block
    fn advance(&mut self, block_secs: f64) -> (f32, f32) {
        let cutoffs = match self.phase {
            BuildPhase::Idle => (NEUTRAL_HP_HZ, NEUTRAL_LP_HZ),
            BuildPhase::Tighten => {
                let t = (self.elapsed / BUILD_TIGHTEN_SECS).min(1.0) as f32;
                (
                    NEUTRAL_HP_HZ + (BUILD_HP_TARGET_HZ - NEUTRAL_HP_HZ) * t,
                    NEUTRAL_LP_HZ + (BUILD_LP_TARGET_HZ - NEUTRAL_LP_HZ) * t,
                )
            }
            BuildPhase::Release => {
                let t = (self.elapsed / BUILD_RELEASE_SECS).min(1.0) as f32;
                (
                    BUILD_HP_TARGET_HZ + (NEUTRAL_HP_HZ - BUILD_HP_TARGET_HZ) * t,
                    BUILD_LP_TARGET_HZ + (NEUTRAL_LP_HZ - BUILD_LP_TARGET_HZ) * t,
                )
            }
        };

        self.elapsed += block_secs;
        match self.phase {
            BuildPhase::Tighten if self.elapsed >= BUILD_TIGHTEN_SECS => {
                self.phase = BuildPhase::Release;
                self.elapsed = 0.0;
            }
            BuildPhase::Release if self.elapsed >= BUILD_RELEASE_SECS => {
                self.phase = BuildPhase::Idle;
                self.elapsed = 0.0;
            }
            _ => {}
        }

        cutoffs
    }
}

/// The master bus singleton
///
/// Persists across play/stop cycles; only the automations and meter are
/// reset on stop.
pub struct MasterBus {
    sample_rate: u32,
    gain: f32,
    stutter: StutterGate,
    tape: TapeStop,
    build: BuildSweep,
    hp_state: BiquadState,
    lp_state: BiquadState,
    limiter_enabled: bool,
    limiter: Limiter,
    meter: RmsMeter,
}

impl MasterBus {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            gain: 1.0,
            stutter: StutterGate::new(sample_rate),
            tape: TapeStop::new(),
            build: BuildSweep::new(),
            hp_state: BiquadState::default(),
            lp_state: BiquadState::default(),
            limiter_enabled: false,
            limiter: Limiter::new(sample_rate),
            meter: RmsMeter::new(),
        }
    }

    /// Set master gain (0.0 - 1.0)
    pub fn set_gain(&mut self, gain: f32) {
        self.gain = gain.clamp(0.0, 1.0);
    }

    /// Toggle the stutter gate at a subdivision
    pub fn toggle_stutter(&mut self, rate: StutterRate, bpm: f64, tempo: f64) {
        self.stutter.toggle(rate, bpm, tempo, self.sample_rate);
    }

    /// Trigger the tape stop/start sequence
    pub fn trigger_tape_stop(&mut self) {
        self.tape.trigger();
    }

    /// Trigger the build sweep
    pub fn trigger_build_sweep(&mut self) {
        self.build.trigger();
    }

    /// Insert or remove the limiter (re-route, not a bypass parameter)
    pub fn set_limiter_enabled(&mut self, enabled: bool) {
        if enabled && !self.limiter_enabled {
            self.limiter.reset();
        }
        self.limiter_enabled = enabled;
    }

    pub fn limiter_enabled(&self) -> bool {
        self.limiter_enabled
    }

    pub fn stutter_active(&self) -> bool {
        self.stutter.rate.is_some()
    }

    pub fn is_taping(&self) -> bool {
        self.tape.is_active()
    }

    pub fn build_active(&self) -> bool {
        self.build.is_active()
    }

    /// Current output level in dB (floored)
    pub fn meter_db(&self) -> f32 {
        self.meter.level_db()
    }

    /// Advance source-facing automation and return this block's playback
    /// rate multiplier (the tape timeline). Call once per block, before the
    /// chains render.
    pub fn begin_block(&mut self, frames: usize) -> f64 {
        let block_secs = frames as f64 / self.sample_rate as f64;
        self.tape.advance(block_secs)
    }

    /// Process one block through the master chain
    pub fn process(&mut self, buffer: &mut StereoBuffer) {
        let frames = buffer.len();
        let block_secs = frames as f64 / self.sample_rate as f64;

        // Master gain
        if self.gain != 1.0 {
            buffer.scale(self.gain);
        }

        // Stutter gate (per-sample ramp)
        if self.stutter.rate.is_some() {
            for sample in buffer.iter_mut() {
                let g = self.stutter.tick();
                sample.left *= g;
                sample.right *= g;
            }
        }

        // Build-sweep filters; out of the path while neutral
        let (hp, lp) = self.build.advance(block_secs);
        if hp > NEUTRAL_HP_HZ + 0.5 {
            let coeffs = BiquadCoeffs::highpass(hp, FILTER_Q, self.sample_rate as f32);
            self.hp_state.process_buffer(buffer, &coeffs);
        }
        if lp < NEUTRAL_LP_HZ - 50.0 {
            let coeffs = BiquadCoeffs::lowpass(lp, FILTER_Q, self.sample_rate as f32);
            self.lp_state.process_buffer(buffer, &coeffs);
        }

        // Optional limiter
        if self.limiter_enabled {
            self.limiter.process(buffer);
        }

        // Meter tap at the output
        self.meter.push(buffer);
    }

    /// Cancel every running automation, restoring pre-automation values
    ///
    /// Invoked by `stop()` on all exit paths.
    pub fn cancel_automations(&mut self) {
        self.stutter.cancel();
        self.tape.cancel();
        self.build.cancel();
        self.hp_state.reset();
        self.lp_state.reset();
        self.meter.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StereoSample;

    const SR: u32 = 44100;

    fn ones(len: usize) -> StereoBuffer {
        let mut buf = StereoBuffer::silence(len);
        for s in buf.iter_mut() {
            *s = StereoSample::new(0.5, 0.5);
        }
        buf
    }

    #[test]
    fn test_neutral_master_is_transparent() {
        let mut master = MasterBus::new(SR);
        let mut buf = ones(512);
        master.begin_block(512);
        master.process(&mut buf);
        for s in buf.iter() {
            assert!((s.left - 0.5).abs() < 1e-6);
        }
    }

    #[test]
    fn test_tape_stop_timeline() {
        let mut master = MasterBus::new(SR);
        assert!(!master.is_taping());

        master.trigger_tape_stop();
        assert!(master.is_taping());

        // First block starts at full rate, then the ramp takes hold
        let first = master.begin_block(256);
        assert!((first - 1.0).abs() < 1e-9);

        // Walk the full timeline: 0.7 + 0.2 + 0.6 = 1.5s
        let block_secs = 256.0 / SR as f64;
        let total_blocks = (1.5 / block_secs).ceil() as usize + 2;
        let mut min_rate = f64::INFINITY;
        for _ in 0..total_blocks {
            let r = master.begin_block(256);
            min_rate = min_rate.min(r);
        }
        assert!(min_rate <= 0.011, "rate should reach near-zero, got {}", min_rate);
        assert!(!master.is_taping(), "flag must clear after the sequence");
        assert!((master.begin_block(256) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_tape_flag_false_before_and_after() {
        let mut master = MasterBus::new(SR);
        assert!(!master.is_taping());
        master.trigger_tape_stop();
        // Run ~1.6 seconds
        let blocks = (1.6 * SR as f64 / 256.0) as usize;
        for _ in 0..blocks {
            master.begin_block(256);
        }
        assert!(!master.is_taping());
    }

    #[test]
    fn test_stutter_toggle_same_rate_off() {
        let mut master = MasterBus::new(SR);
        master.toggle_stutter(StutterRate::Quarter, 120.0, 1.0);
        assert!(master.stutter_active());

        // Stutter forces gain to zero at the period start
        let mut buf = ones(64);
        master.process(&mut buf);
        assert_eq!(buf[0].left, 0.0);

        master.toggle_stutter(StutterRate::Quarter, 120.0, 1.0);
        assert!(!master.stutter_active());
        let mut buf = ones(64);
        master.process(&mut buf);
        assert!((buf[0].left - 0.5).abs() < 1e-6, "unity restored after toggle off");
    }

    #[test]
    fn test_stutter_switch_rate_replaces_timer() {
        let mut master = MasterBus::new(SR);
        master.toggle_stutter(StutterRate::Quarter, 120.0, 1.0);
        master.toggle_stutter(StutterRate::Eighth, 120.0, 1.0);
        assert!(master.stutter_active());
        // Eighth at 120 BPM = 0.25s period
        assert_eq!(master.stutter.period_samples, (0.25 * SR as f64) as usize);
    }

    #[test]
    fn test_stutter_ramp_reopens() {
        let mut master = MasterBus::new(SR);
        master.toggle_stutter(StutterRate::Quarter, 120.0, 1.0);

        // 50ms ramp = 2205 samples; by 3000 samples in, gain is unity again
        let mut buf = ones(3000);
        master.process(&mut buf);
        assert_eq!(buf[0].left, 0.0);
        assert!((buf[2999].left - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_build_sweep_flag_clears() {
        let mut master = MasterBus::new(SR);
        master.trigger_build_sweep();
        assert!(master.build_active());

        // 2.5s total timeline
        let blocks = (2.6 * SR as f64 / 256.0) as usize;
        let mut buf = ones(256);
        for _ in 0..blocks {
            master.begin_block(256);
            master.process(&mut buf);
        }
        assert!(!master.build_active());
    }

    #[test]
    fn test_build_sweep_narrows_band() {
        let mut master = MasterBus::new(SR);
        master.trigger_build_sweep();

        // 1s in: low frequencies must be attenuated by the rising high-pass.
        // Feed DC and look at the output level.
        let blocks = (1.0 * SR as f64 / 256.0) as usize;
        let mut last_avg = 0.0;
        for _ in 0..blocks {
            let mut buf = ones(256);
            master.begin_block(256);
            master.process(&mut buf);
            last_avg = buf.iter().map(|s| s.left.abs()).sum::<f32>() / 256.0;
        }
        assert!(last_avg < 0.1, "high-pass should be eating DC, got {}", last_avg);
    }

    #[test]
    fn test_cancel_restores_neutral() {
        let mut master = MasterBus::new(SR);
        master.toggle_stutter(StutterRate::Eighth, 120.0, 1.0);
        master.trigger_tape_stop();
        master.trigger_build_sweep();
        master.begin_block(256);

        master.cancel_automations();
        assert!(!master.stutter_active());
        assert!(!master.is_taping());
        assert!(!master.build_active());
        assert!((master.begin_block(256) - 1.0).abs() < 1e-9);

        let mut buf = ones(256);
        master.process(&mut buf);
        assert!((buf[0].left - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_limiter_reroute() {
        let mut master = MasterBus::new(SR);
        assert!(!master.limiter_enabled());

        // Hot signal passes untouched without the limiter
        let mut buf = ones(256);
        for s in buf.iter_mut() {
            *s = StereoSample::new(1.5, 1.5);
        }
        master.process(&mut buf);
        assert!(buf[255].left > 1.4);

        master.set_limiter_enabled(true);
        let mut buf = StereoBuffer::silence(SR as usize);
        for s in buf.iter_mut() {
            *s = StereoSample::new(1.5, 1.5);
        }
        master.process(&mut buf);
        assert!(buf[(SR - 1) as usize].left < 1.0, "limiter should pull overs down");
    }
}
