//! Lookahead step scheduler
//!
//! Fires step-indexed callbacks at precise future audio-clock times, immune
//! to control-thread jitter. Each poll schedules every step falling inside
//! the lookahead window; the next step time accumulates from itself rather
//! than from "now", so per-tick drift never compounds.
//!
//! [`StepScheduler`] is the pure state machine (poll it yourself, e.g. in
//! tests); [`SchedulerRunner`] drives it from a control thread at a fixed
//! wall-clock interval against an audio-clock source.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Steps per bar (sixteenth-note grid)
pub const STEPS_PER_BAR: usize = 16;

/// How far ahead of the audio clock steps are scheduled
pub const LOOKAHEAD_SECS: f64 = 0.18;

/// Wall-clock poll interval for the runner thread
pub const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Pure lookahead scheduling state
#[derive(Debug, Clone)]
pub struct StepScheduler {
    running: bool,
    step: usize,
    next_time: f64,
    seconds_per_step: f64,
}

impl StepScheduler {
    pub fn new() -> Self {
        Self {
            running: false,
            step: 0,
            next_time: 0.0,
            seconds_per_step: seconds_per_step(120.0),
        }
    }

    /// Start the grid: step index resets to 0 and the first tick is due
    /// immediately at `now`
    pub fn start(&mut self, bpm: f64, now: f64) {
        self.running = true;
        self.step = 0;
        self.next_time = now;
        self.seconds_per_step = seconds_per_step(bpm);
    }

    /// Change the grid tempo without resetting phase
    pub fn set_tempo(&mut self, bpm: f64) {
        self.seconds_per_step = seconds_per_step(bpm);
    }

    /// Stop scheduling; idempotent, and no tick fires afterwards
    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Fire every step due inside the lookahead window
    ///
    /// `now` is the audio clock in seconds. `on_tick(step, when)` receives
    /// the step index and its scheduled audio-clock time, which is always
    /// at or after the time it was emitted at.
    pub fn poll(&mut self, now: f64, mut on_tick: impl FnMut(usize, f64)) {
        if !self.running {
            return;
        }
        while self.next_time < now + LOOKAHEAD_SECS {
            on_tick(self.step, self.next_time);
            self.next_time += self.seconds_per_step;
            self.step = (self.step + 1) % STEPS_PER_BAR;
        }
    }
}

impl Default for StepScheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// Sixteenth-note duration at a BPM
fn seconds_per_step(bpm: f64) -> f64 {
    60.0 / (bpm.max(1.0) * 4.0)
}

/// Drives a [`StepScheduler`] from a dedicated control thread
///
/// The loop is cooperative: each pass polls once (firing zero or more due
/// callbacks) and sleeps for [`POLL_INTERVAL`]. `stop()` is synchronous —
/// it joins the thread, so no callback runs after it returns.
pub struct SchedulerRunner {
    stop_flag: Arc<AtomicBool>,
    /// BPM as f64 bits, read by the loop each pass
    bpm_bits: Arc<AtomicU64>,
    handle: Option<thread::JoinHandle<()>>,
}

impl SchedulerRunner {
    /// Spawn the polling loop
    ///
    /// `clock` reads the current audio-clock time in seconds (typically
    /// derived from the engine's rendered-frames atomic); `on_tick` runs on
    /// the runner thread for every scheduled step.
    pub fn spawn(
        bpm: f64,
        clock: impl Fn() -> f64 + Send + 'static,
        mut on_tick: impl FnMut(usize, f64) + Send + 'static,
    ) -> Self {
        let stop_flag = Arc::new(AtomicBool::new(false));
        let bpm_bits = Arc::new(AtomicU64::new(bpm.to_bits()));

        let thread_stop = Arc::clone(&stop_flag);
        let thread_bpm = Arc::clone(&bpm_bits);
        let handle = thread::Builder::new()
            .name("step-scheduler".to_string())
            .spawn(move || {
                let mut scheduler = StepScheduler::new();
                scheduler.start(bpm, clock());
                let mut last_bpm = bpm;

                while !thread_stop.load(Ordering::Relaxed) {
                    let bpm_now = f64::from_bits(thread_bpm.load(Ordering::Relaxed));
                    if bpm_now != last_bpm {
                        scheduler.set_tempo(bpm_now);
                        last_bpm = bpm_now;
                    }
                    scheduler.poll(clock(), &mut on_tick);
                    thread::sleep(POLL_INTERVAL);
                }
            })
            .expect("Failed to spawn scheduler thread");

        Self {
            stop_flag,
            bpm_bits,
            handle: Some(handle),
        }
    }

    /// Retarget the grid tempo; phase is preserved
    pub fn set_tempo(&self, bpm: f64) {
        self.bpm_bits.store(bpm.to_bits(), Ordering::Relaxed);
    }

    /// Stop the loop and join the thread; idempotent
    pub fn stop(&mut self) {
        self.stop_flag.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SchedulerRunner {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_fires_step_zero_first() {
        let mut scheduler = StepScheduler::new();
        scheduler.start(120.0, 10.0);

        let mut ticks = Vec::new();
        scheduler.poll(10.0, |step, when| ticks.push((step, when)));

        assert!(!ticks.is_empty());
        assert_eq!(ticks[0], (0, 10.0));
    }

    #[test]
    fn test_lookahead_window_bounds_scheduling() {
        let mut scheduler = StepScheduler::new();
        scheduler.start(120.0, 0.0);

        // 120 BPM sixteenths = 125ms per step; window = 180ms → steps at
        // 0.0 and 0.125 are due, 0.25 is not.
        let mut ticks = Vec::new();
        scheduler.poll(0.0, |step, when| ticks.push((step, when)));
        assert_eq!(ticks.len(), 2);
        assert_eq!(ticks[1].0, 1);
        assert!((ticks[1].1 - 0.125).abs() < 1e-12);
    }

    #[test]
    fn test_accumulation_does_not_drift() {
        let mut scheduler = StepScheduler::new();
        scheduler.start(97.3, 0.0); // awkward BPM on purpose

        let step_secs = 60.0 / (97.3 * 4.0);
        let mut times = Vec::new();
        // Poll with deliberately jittered clocks
        let mut now = 0.0;
        while times.len() < 64 {
            scheduler.poll(now, |_, when| times.push(when));
            now += 0.0237; // irregular poll cadence
        }

        for (i, &when) in times.iter().enumerate() {
            let expected = i as f64 * step_secs;
            assert!(
                (when - expected).abs() < 1e-9,
                "step {} drifted: {} vs {}",
                i,
                when,
                expected
            );
        }
    }

    #[test]
    fn test_step_index_wraps_at_bar() {
        let mut scheduler = StepScheduler::new();
        scheduler.start(120.0, 0.0);

        let mut steps = Vec::new();
        let mut now = 0.0;
        while steps.len() < 40 {
            scheduler.poll(now, |step, _| steps.push(step));
            now += 0.05;
        }
        for (i, &step) in steps.iter().enumerate() {
            assert_eq!(step, i % STEPS_PER_BAR);
        }
    }

    #[test]
    fn test_set_tempo_preserves_phase() {
        let mut scheduler = StepScheduler::new();
        scheduler.start(120.0, 0.0);

        let mut times = Vec::new();
        scheduler.poll(0.0, |_, when| times.push(when));
        let boundary = *times.last().unwrap();

        scheduler.set_tempo(60.0);
        let mut later = Vec::new();
        scheduler.poll(0.3, |_, when| later.push(when));

        // First tick after the change continues from the accumulated time
        // with the new step duration, no phase reset to "now"
        assert!((later[0] - (boundary + 0.125)).abs() < 1e-12);
        if later.len() > 1 {
            assert!((later[1] - later[0] - 0.25).abs() < 1e-12);
        }
    }

    #[test]
    fn test_stop_is_idempotent_and_final() {
        let mut scheduler = StepScheduler::new();
        scheduler.start(120.0, 0.0);
        scheduler.stop();
        scheduler.stop();

        let mut fired = false;
        scheduler.poll(100.0, |_, _| fired = true);
        assert!(!fired, "no tick may fire after stop");
    }

    #[test]
    fn test_runner_stop_joins_synchronously() {
        use std::sync::atomic::AtomicUsize;

        let count = Arc::new(AtomicUsize::new(0));
        let tick_count = Arc::clone(&count);
        let start = std::time::Instant::now();
        let mut runner = SchedulerRunner::spawn(
            480.0,
            move || start.elapsed().as_secs_f64(),
            move |_, _| {
                tick_count.fetch_add(1, Ordering::Relaxed);
            },
        );

        thread::sleep(Duration::from_millis(120));
        runner.stop();
        let after_stop = count.load(Ordering::Relaxed);
        assert!(after_stop > 0, "runner should have ticked");

        thread::sleep(Duration::from_millis(80));
        assert_eq!(
            count.load(Ordering::Relaxed),
            after_stop,
            "no callback may run after stop() returns"
        );
    }
}
