//! Offline render engine
//!
//! Reconstructs the live graph from the current state and renders exactly
//! one loop at the current tempo. The render drives the same
//! [`RemixEngine`] the audio callback drives, with identical node ordering
//! and parameter application.
//!
//! Transient master automations (stutter, tape stop, build sweep) are
//! excluded from exports: a bounce captures the dialed-in state, not an
//! automation caught mid-flight.

use basedrop::Shared;

use crate::control::EntryState;
use crate::engine::RemixEngine;
use crate::supply::StemSet;
use crate::types::{StereoBuffer, BUFFER_SIZE};

/// Master-bus switches that carry into an offline render
#[derive(Debug, Clone, Copy)]
pub struct MasterSettings {
    /// Master output gain (0.0 - 1.0)
    pub gain: f32,
    /// Whether the limiter is in the chain
    pub limiter: bool,
}

impl Default for MasterSettings {
    fn default() -> Self {
        Self { gain: 1.0, limiter: false }
    }
}

/// Number of output frames for one loop at a tempo (rounded up)
pub fn loop_output_frames(stems: &StemSet, tempo: f64, sample_rate: u32) -> usize {
    (stems.loop_seconds() / tempo * sample_rate as f64).ceil() as usize
}

/// Render one full loop of the current state to a buffer
///
/// Block-driven internals are exposed through `on_block(rendered, total)`;
/// returning `false` cancels the render (used by the export service), in
/// which case `None` comes back.
pub(crate) fn render_blocks(
    stems: &Shared<StemSet>,
    state: &EntryState,
    master: MasterSettings,
    mut on_block: impl FnMut(usize, usize) -> bool,
) -> Option<StereoBuffer> {
    let sample_rate = stems.sample_rate();
    let state = state.clamped();
    let total_frames = loop_output_frames(stems, state.tempo, sample_rate);

    // The same engine the live path runs, against a plain loop
    let mut engine = RemixEngine::new(sample_rate);
    engine.load_stems(stems.clone());
    engine.set_entry_state(&state);
    engine.master_mut().set_gain(master.gain);
    engine.master_mut().set_limiter_enabled(master.limiter);
    engine.play();

    let mut output = StereoBuffer::silence(total_frames);
    let mut block = StereoBuffer::silence(BUFFER_SIZE);
    let mut rendered = 0usize;

    while rendered < total_frames {
        let frames = BUFFER_SIZE.min(total_frames - rendered);
        block.set_len_from_capacity(frames);
        engine.process(&mut block);

        let out_slice = output.as_mut_slice();
        out_slice[rendered..rendered + frames].copy_from_slice(block.as_slice());
        rendered += frames;

        if !on_block(rendered, total_frames) {
            return None;
        }
    }

    Some(output)
}

/// Render one full loop of the current state
pub fn render_mixdown(
    stems: &Shared<StemSet>,
    state: &EntryState,
    master: MasterSettings,
) -> StereoBuffer {
    render_blocks(stems, state, master, |_, _| true)
        .expect("uncancellable render cannot be cancelled")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::gc::gc_handle;
    use crate::export::write_wav;
    use crate::types::{Stem, StereoSample};

    const SR: u32 = 44100;

    fn four_second_set() -> Shared<StemSet> {
        let frames = 4 * SR as usize;
        let mut drums = StereoBuffer::silence(frames);
        for s in drums.iter_mut() {
            *s = StereoSample::new(0.2, 0.2);
        }
        let mut vocals = StereoBuffer::silence(frames);
        for (i, s) in vocals.iter_mut().enumerate() {
            let v = (2.0 * std::f32::consts::PI * 440.0 * i as f32 / SR as f32).sin() * 0.1;
            *s = StereoSample::new(v, v);
        }
        let set = StemSet::from_buffers(
            vec![(Stem::Drums, drums), (Stem::Vocals, vocals)],
            SR,
        )
        .unwrap();
        Shared::new(&gc_handle(), set)
    }

    #[test]
    fn test_render_length_matches_loop() {
        let stems = four_second_set();
        let state = EntryState::default();
        let mix = render_mixdown(&stems, &state, MasterSettings::default());
        // 4 seconds at 44100, tempo 1.0
        assert!((mix.len() as i64 - (4 * SR as i64)).abs() <= 1);
    }

    #[test]
    fn test_render_length_scales_with_tempo() {
        let stems = four_second_set();
        let state = EntryState { tempo: 1.25, ..EntryState::default() };
        let mix = render_mixdown(&stems, &state, MasterSettings::default());
        let expected = (4.0 / 1.25 * SR as f64).ceil() as usize;
        assert_eq!(mix.len(), expected);
    }

    #[test]
    fn test_rendered_wav_data_size() {
        let stems = four_second_set();
        let state = EntryState::default();
        let mix = render_mixdown(&stems, &state, MasterSettings::default());

        let path = std::env::temp_dir().join(format!("stemlab-mix-{}.wav", std::process::id()));
        write_wav(&mix, SR, &path).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let data_size = u32::from_le_bytes(bytes[40..44].try_into().unwrap());
        assert_eq!(data_size as usize, mix.len() * 2 * 2);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_muted_stem_contributes_nothing() {
        let stems = four_second_set();

        // Reference: both stems at defaults
        let full = render_mixdown(&stems, &EntryState::default(), MasterSettings::default());

        // Drums gained to zero: output must be exactly the vocals alone
        let mut state = EntryState::default();
        state.control_mut(Stem::Drums).gain = 0.0;
        let without_drums = render_mixdown(&stems, &state, MasterSettings::default());

        let vocal_peak = without_drums.peak();
        assert!(vocal_peak > 0.05, "vocals must survive");
        // The flat drums layer (0.2 DC) is gone
        let dc: f32 = without_drums.iter().take(1024).map(|s| s.left).sum::<f32>() / 1024.0;
        assert!(dc.abs() < 0.01, "drums DC offset should vanish, got {}", dc);
        assert!(full.peak() > without_drums.peak());
    }

    #[test]
    fn test_render_matches_live_block_loop() {
        // The offline path must be the live path: running the same state
        // through a hand-driven engine block loop gives identical samples.
        let stems = four_second_set();
        let mut state = EntryState::default();
        state.control_mut(Stem::Drums).filter_position = -0.5;
        state.control_mut(Stem::Vocals).width = 2.0;
        state.tempo = 1.1;

        let mix = render_mixdown(&stems, &state, MasterSettings::default());

        let mut engine = RemixEngine::new(SR);
        engine.load_stems(stems.clone());
        engine.set_entry_state(&state);
        engine.play();
        let mut live = Vec::new();
        let mut block = StereoBuffer::silence(BUFFER_SIZE);
        while live.len() < mix.len() {
            let frames = BUFFER_SIZE.min(mix.len() - live.len());
            block.set_len_from_capacity(frames);
            engine.process(&mut block);
            live.extend_from_slice(block.as_slice());
        }

        for (i, (a, b)) in mix.iter().zip(live.iter()).enumerate() {
            assert!(
                (a.left - b.left).abs() < 1e-7 && (a.right - b.right).abs() < 1e-7,
                "divergence at frame {}: {:?} vs {:?}",
                i,
                a,
                b
            );
        }
    }

    #[test]
    fn test_cancelled_render_returns_none() {
        let stems = four_second_set();
        let state = EntryState::default();
        let result = render_blocks(&stems, &state, MasterSettings::default(), |rendered, _| {
            rendered < 4096
        });
        assert!(result.is_none());
    }
}
