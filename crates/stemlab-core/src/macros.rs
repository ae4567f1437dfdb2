//! Macro engine - named parameter presets and the continuous filter sweep
//!
//! A macro is a bundle of filter/tone targets toggled as a unit. Each macro
//! has a designated stem; the flag is stored on every stem's control record
//! but only takes effect when the owning stem matches. Resolution starts from
//! neutral defaults, layers active macro bases on top, then applies the
//! continuous `filter_position` sweep.

use crate::control::StemControl;
use crate::types::Stem;

/// Neutral high-pass cutoff (filter effectively open)
pub const NEUTRAL_HP_HZ: f32 = 20.0;
/// Neutral low-pass cutoff (filter effectively open)
pub const NEUTRAL_LP_HZ: f32 = 20_000.0;

/// Tone (peaking) stage target
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToneTarget {
    pub freq_hz: f32,
    pub gain_db: f32,
}

/// Fully resolved filter targets for one stem chain
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterTargets {
    pub highpass_hz: f32,
    pub lowpass_hz: f32,
    /// None = tone stage flat (unity peaking filter)
    pub tone: Option<ToneTarget>,
}

impl FilterTargets {
    /// Neutral targets: both filters open, tone flat
    pub fn neutral() -> Self {
        Self {
            highpass_hz: NEUTRAL_HP_HZ,
            lowpass_hz: NEUTRAL_LP_HZ,
            tone: None,
        }
    }
}

/// Base overrides contributed by one macro. `None` leaves the running value
/// untouched so several macros on the same stem compose.
struct MacroBase {
    highpass_hz: Option<f32>,
    lowpass_hz: Option<f32>,
    tone: Option<ToneTarget>,
}

/// The four macros
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MacroKind {
    VocalClean,
    DrumPunch,
    BassTighten,
    BassBoost,
}

impl MacroKind {
    /// All macros in resolution order
    pub const ALL: [MacroKind; 4] = [
        MacroKind::VocalClean,
        MacroKind::DrumPunch,
        MacroKind::BassTighten,
        MacroKind::BassBoost,
    ];

    /// The stem this macro is designated for; it has no effect elsewhere
    pub fn stem(&self) -> Stem {
        match self {
            MacroKind::VocalClean => Stem::Vocals,
            MacroKind::DrumPunch => Stem::Drums,
            MacroKind::BassTighten => Stem::Bass,
            MacroKind::BassBoost => Stem::Bass,
        }
    }

    /// Whether this macro is enabled on the given control record
    pub fn is_set(&self, control: &StemControl) -> bool {
        match self {
            MacroKind::VocalClean => control.macros.vocal_clean,
            MacroKind::DrumPunch => control.macros.drum_punch,
            MacroKind::BassTighten => control.macros.bass_tighten,
            MacroKind::BassBoost => control.macros.bass_boost,
        }
    }

    fn base(&self) -> MacroBase {
        match self {
            // Clear out mud below the voice and add presence
            MacroKind::VocalClean => MacroBase {
                highpass_hz: Some(140.0),
                lowpass_hz: None,
                tone: Some(ToneTarget { freq_hz: 4500.0, gain_db: 2.5 }),
            },
            // Low-mid punch boost
            MacroKind::DrumPunch => MacroBase {
                highpass_hz: None,
                lowpass_hz: None,
                tone: Some(ToneTarget { freq_hz: 110.0, gain_db: 4.0 }),
            },
            // Trim sub rumble and fizz
            MacroKind::BassTighten => MacroBase {
                highpass_hz: Some(45.0),
                lowpass_hz: Some(9000.0),
                tone: None,
            },
            // Fundamental boost
            MacroKind::BassBoost => MacroBase {
                highpass_hz: None,
                lowpass_hz: None,
                tone: Some(ToneTarget { freq_hz: 75.0, gain_db: 5.0 }),
            },
        }
    }
}

/// Resolve a control record into concrete filter targets for one stem
///
/// Order: neutral defaults, then every active macro whose designated stem
/// matches (total match on [`Stem`], no string comparison), then the
/// continuous sweep on top:
///
/// - `filter_position < 0`: low-pass mode, `cutoff = 20000 * 0.01^|pos|`;
///   the final low-pass is the *lower* of the macro base and the sweep.
/// - `filter_position > 0`: high-pass mode, `cutoff = 20 * 100^pos`; the
///   final high-pass is the *higher* of the macro base and the sweep.
/// - `filter_position == 0`: both filters sit at their macro base values.
///
/// The tone stage comes from macro bases only; the sweep never moves it.
pub fn resolve_targets(stem: Stem, control: &StemControl) -> FilterTargets {
    let mut targets = FilterTargets::neutral();

    for kind in MacroKind::ALL {
        if kind.stem() == stem && kind.is_set(control) {
            let base = kind.base();
            if let Some(hp) = base.highpass_hz {
                targets.highpass_hz = hp;
            }
            if let Some(lp) = base.lowpass_hz {
                targets.lowpass_hz = lp;
            }
            if let Some(tone) = base.tone {
                targets.tone = Some(tone);
            }
        }
    }

    let pos = control.filter_position.clamp(-1.0, 1.0);
    if pos < 0.0 {
        let cutoff = NEUTRAL_LP_HZ * 0.01_f32.powf(-pos);
        targets.lowpass_hz = targets.lowpass_hz.min(cutoff.max(NEUTRAL_HP_HZ));
    } else if pos > 0.0 {
        let cutoff = NEUTRAL_HP_HZ * 100.0_f32.powf(pos);
        targets.highpass_hz = targets.highpass_hz.max(cutoff.min(NEUTRAL_LP_HZ));
    }

    targets
}

/// Gate oscillator frequency in Hz for the given tempo factor
///
/// Sixteenth-note chop relative to the nominal grid: 8 Hz at tempo 1.0,
/// scaling with playback rate so the chop stays locked to the material.
pub fn gate_frequency_hz(tempo: f64) -> f32 {
    (4.0 * tempo * 2.0) as f32
}

/// Amplitude bounds of the gate multiplier for a given depth
///
/// Returns `(base, scale)` such that the square modulation
/// `base + scale * square(t)` swings over `[1 - depth, 1]`.
pub fn gate_bounds(depth: f32) -> (f32, f32) {
    let scale = 0.5 * depth;
    (1.0 - scale, scale)
}

/// Number of quantization levels for a bitcrush amount
///
/// 65 levels at amount 0 (but the curve short-circuits to identity there),
/// collapsing toward a single level at amount 1.
pub fn bitcrush_steps(amount: f32) -> f32 {
    1.0 + (1.0 - amount.clamp(0.0, 1.0)) * 64.0
}
