//! Stem supply boundary
//!
//! Separation runs elsewhere (an external service produces per-stem audio
//! from a mixed recording); this module is the seam where its output enters
//! the engine as decoded PCM. The backend can be swapped without changing
//! the calling code — the engine only sees a [`StemSet`].
//!
//! A delivered set may be missing stems; that is not an error, those stems
//! are simply unavailable for the entry. Zero usable stems is an error.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::types::{Stem, StereoBuffer, StereoSample, NUM_STEMS};

/// Errors that can occur while obtaining stems
#[derive(Error, Debug)]
pub enum SupplyError {
    #[error("No stems could be decoded for this entry")]
    NoStems,

    #[error("Failed to read stem file: {path}")]
    StemReadError {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },

    #[error("Sample rate mismatch within entry: expected {expected}Hz, found {found}Hz in {stem}")]
    SampleRateMismatch {
        expected: u32,
        found: u32,
        stem: &'static str,
    },

    #[error("Unsupported WAV format in {path}: {detail}")]
    UnsupportedFormat { path: PathBuf, detail: String },
}

/// Result type for supply operations
pub type SupplyResult<T> = Result<T, SupplyError>;

/// A decoded set of stems sharing one canonical sample rate
///
/// All present stems are padded with trailing silence to a common length,
/// which defines the loop for playback and export.
pub struct StemSet {
    buffers: [Option<StereoBuffer>; NUM_STEMS],
    sample_rate: u32,
    frames: usize,
}

impl StemSet {
    /// Build a set from named buffers
    ///
    /// Requires at least one stem; stems shorter than the longest are padded
    /// with silence so every source loops in phase.
    pub fn from_buffers(
        named: Vec<(Stem, StereoBuffer)>,
        sample_rate: u32,
    ) -> SupplyResult<Self> {
        if named.is_empty() {
            return Err(SupplyError::NoStems);
        }

        let frames = named.iter().map(|(_, b)| b.len()).max().unwrap_or(0);
        if frames == 0 {
            return Err(SupplyError::NoStems);
        }

        let mut buffers: [Option<StereoBuffer>; NUM_STEMS] = Default::default();
        for (stem, mut buffer) in named {
            buffer.resize(frames);
            buffers[stem as usize] = Some(buffer);
        }

        Ok(Self {
            buffers,
            sample_rate,
            frames,
        })
    }

    /// Get a stem's audio, if it was delivered
    #[inline]
    pub fn stem(&self, stem: Stem) -> Option<&StereoBuffer> {
        self.buffers[stem as usize].as_ref()
    }

    /// Loop length in frames at the canonical sample rate
    #[inline]
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// The canonical sample rate shared by all stems
    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Loop duration in seconds at natural tempo
    pub fn loop_seconds(&self) -> f64 {
        self.frames as f64 / self.sample_rate as f64
    }

    /// Stems present in this set
    pub fn available(&self) -> impl Iterator<Item = Stem> + '_ {
        Stem::ALL
            .into_iter()
            .filter(|s| self.buffers[*s as usize].is_some())
    }
}

/// Source of decoded stems for an entry
pub trait StemSupply {
    /// Fetch the stem set, skipping stems that cannot be decoded
    fn fetch(&self) -> SupplyResult<StemSet>;
}

/// Reads `drums.wav`, `bass.wav`, `vocals.wav`, `other.wav` from a directory
///
/// This is the file-drop path: the separation service (or the user) leaves
/// canonical per-stem WAVs in a folder. Missing or unreadable stems are
/// skipped with a warning; only an empty result is an error.
pub struct WavDirectorySupply {
    dir: PathBuf,
}

impl WavDirectorySupply {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Decode one WAV into a stereo buffer, duplicating mono to both channels
    fn read_wav(path: &Path) -> SupplyResult<(StereoBuffer, u32)> {
        let mut reader =
            hound::WavReader::open(path).map_err(|source| SupplyError::StemReadError {
                path: path.to_path_buf(),
                source,
            })?;
        let spec = reader.spec();

        if spec.channels == 0 || spec.channels > 2 {
            return Err(SupplyError::UnsupportedFormat {
                path: path.to_path_buf(),
                detail: format!("{} channels", spec.channels),
            });
        }

        let samples: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .samples::<f32>()
                .collect::<Result<_, _>>()
                .map_err(|source| SupplyError::StemReadError {
                    path: path.to_path_buf(),
                    source,
                })?,
            hound::SampleFormat::Int => {
                if spec.bits_per_sample > 16 {
                    return Err(SupplyError::UnsupportedFormat {
                        path: path.to_path_buf(),
                        detail: format!("{}-bit integer PCM", spec.bits_per_sample),
                    });
                }
                reader
                    .samples::<i16>()
                    .map(|s| s.map(|v| v as f32 / 32768.0))
                    .collect::<Result<_, _>>()
                    .map_err(|source| SupplyError::StemReadError {
                        path: path.to_path_buf(),
                        source,
                    })?
            }
        };

        let buffer = if spec.channels == 1 {
            let mut buf = StereoBuffer::silence(samples.len());
            for (dst, &v) in buf.iter_mut().zip(samples.iter()) {
                *dst = StereoSample::mono(v);
            }
            buf
        } else {
            StereoBuffer::from_interleaved(&samples)
        };

        Ok((buffer, spec.sample_rate))
    }
}

impl StemSupply for WavDirectorySupply {
    fn fetch(&self) -> SupplyResult<StemSet> {
        let mut named = Vec::new();
        let mut sample_rate: Option<u32> = None;

        for stem in Stem::ALL {
            let path = self.dir.join(format!("{}.wav", stem.name()));
            if !path.exists() {
                log::warn!("Stem '{}' not present in {}, skipping", stem.name(), self.dir.display());
                continue;
            }
            match Self::read_wav(&path) {
                Ok((buffer, rate)) => {
                    match sample_rate {
                        None => sample_rate = Some(rate),
                        Some(expected) if expected != rate => {
                            return Err(SupplyError::SampleRateMismatch {
                                expected,
                                found: rate,
                                stem: stem.name(),
                            });
                        }
                        Some(_) => {}
                    }
                    named.push((stem, buffer));
                }
                Err(e) => {
                    // One bad stem must not take the entry down
                    log::warn!("Failed to decode stem '{}': {}", stem.name(), e);
                }
            }
        }

        let sample_rate = sample_rate.ok_or(SupplyError::NoStems)?;
        StemSet::from_buffers(named, sample_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine_buffer(frames: usize, freq: f32) -> StereoBuffer {
        let mut buf = StereoBuffer::silence(frames);
        for (i, s) in buf.iter_mut().enumerate() {
            let v = (2.0 * std::f32::consts::PI * freq * i as f32 / 44100.0).sin() * 0.5;
            *s = StereoSample::mono(v);
        }
        buf
    }

    #[test]
    fn test_empty_set_rejected() {
        let result = StemSet::from_buffers(Vec::new(), 44100);
        assert!(matches!(result, Err(SupplyError::NoStems)));
    }

    #[test]
    fn test_single_stem_is_enough() {
        let set =
            StemSet::from_buffers(vec![(Stem::Drums, sine_buffer(1000, 100.0))], 44100).unwrap();
        assert!(set.stem(Stem::Drums).is_some());
        assert!(set.stem(Stem::Vocals).is_none());
        assert_eq!(set.frames(), 1000);
        assert_eq!(set.available().count(), 1);
    }

    #[test]
    fn test_shorter_stems_padded_to_loop_length() {
        let set = StemSet::from_buffers(
            vec![
                (Stem::Drums, sine_buffer(2000, 100.0)),
                (Stem::Bass, sine_buffer(500, 60.0)),
            ],
            44100,
        )
        .unwrap();
        assert_eq!(set.frames(), 2000);
        assert_eq!(set.stem(Stem::Bass).unwrap().len(), 2000);
        // Padding is silence
        assert_eq!(set.stem(Stem::Bass).unwrap()[1500].left, 0.0);
    }

    #[test]
    fn test_loop_seconds() {
        let set =
            StemSet::from_buffers(vec![(Stem::Other, sine_buffer(44100, 220.0))], 44100).unwrap();
        assert!((set.loop_seconds() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_directory_supply_skips_missing() {
        use std::io::Write as _;

        let dir = std::env::temp_dir().join(format!("stemlab-supply-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        // Write only a drums stem
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 44100,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(dir.join("drums.wav"), spec).unwrap();
        for i in 0..1000 {
            let v = ((i as f32 * 0.05).sin() * 10000.0) as i16;
            writer.write_sample(v).unwrap();
            writer.write_sample(v).unwrap();
        }
        writer.finalize().unwrap();

        // And a corrupt vocals stem
        let mut bad = std::fs::File::create(dir.join("vocals.wav")).unwrap();
        bad.write_all(b"not a wav").unwrap();

        let supply = WavDirectorySupply::new(&dir);
        let set = supply.fetch().unwrap();
        assert!(set.stem(Stem::Drums).is_some());
        assert!(set.stem(Stem::Vocals).is_none());
        assert!(set.stem(Stem::Bass).is_none());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_directory_supply_empty_dir_errors() {
        let dir = std::env::temp_dir().join(format!("stemlab-empty-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let supply = WavDirectorySupply::new(&dir);
        assert!(matches!(supply.fetch(), Err(SupplyError::NoStems)));
        std::fs::remove_dir_all(&dir).ok();
    }
}
