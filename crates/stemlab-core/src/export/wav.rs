//! Canonical WAV serialization
//!
//! RIFF/WAVE, `fmt ` with integer PCM format 1, 16 bits per sample,
//! interleaved little-endian frames. Samples are clamped to [-1, 1] before
//! integer scaling; the negative and positive halves scale by 32768 and
//! 32767 respectively so both rails are reachable without overflow.

use std::path::Path;

use crate::export::{ExportError, ExportResult};
use crate::types::StereoBuffer;

/// Convert one float sample to a 16-bit integer sample
#[inline]
pub fn sample_to_i16(sample: f32) -> i16 {
    let clamped = sample.clamp(-1.0, 1.0);
    if clamped < 0.0 {
        (clamped * 32768.0) as i16
    } else {
        (clamped * 32767.0) as i16
    }
}

/// Write a stereo buffer as a 16-bit PCM WAV file
pub fn write_wav(buffer: &StereoBuffer, sample_rate: u32, path: &Path) -> ExportResult<()> {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer =
        hound::WavWriter::create(path, spec).map_err(|source| ExportError::Encode {
            path: path.to_path_buf(),
            source,
        })?;

    for sample in buffer.iter() {
        writer
            .write_sample(sample_to_i16(sample.left))
            .and_then(|_| writer.write_sample(sample_to_i16(sample.right)))
            .map_err(|source| ExportError::Encode {
                path: path.to_path_buf(),
                source,
            })?;
    }

    writer.finalize().map_err(|source| ExportError::Encode {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StereoSample;

    #[test]
    fn test_sample_scaling() {
        assert_eq!(sample_to_i16(0.0), 0);
        assert_eq!(sample_to_i16(1.0), 32767);
        assert_eq!(sample_to_i16(-1.0), -32768);
        // Clamped, not wrapped
        assert_eq!(sample_to_i16(2.5), 32767);
        assert_eq!(sample_to_i16(-7.0), -32768);
        assert_eq!(sample_to_i16(0.5), 16383);
    }

    #[test]
    fn test_wav_container_layout() {
        let frames = 1000;
        let mut buffer = StereoBuffer::silence(frames);
        for (i, s) in buffer.iter_mut().enumerate() {
            *s = StereoSample::mono((i as f32 * 0.01).sin() * 0.5);
        }

        let path = std::env::temp_dir().join(format!("stemlab-wav-{}.wav", std::process::id()));
        write_wav(&buffer, 44100, &path).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let data_bytes = frames * 2 * 2; // frames * channels * 2

        // RIFF header
        assert_eq!(&bytes[0..4], b"RIFF");
        let chunk_size = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
        assert_eq!(chunk_size as usize, 36 + data_bytes);
        assert_eq!(&bytes[8..12], b"WAVE");

        // fmt subchunk
        assert_eq!(&bytes[12..16], b"fmt ");
        let audio_format = u16::from_le_bytes(bytes[20..22].try_into().unwrap());
        assert_eq!(audio_format, 1); // integer PCM
        let channels = u16::from_le_bytes(bytes[22..24].try_into().unwrap());
        assert_eq!(channels, 2);
        let sample_rate = u32::from_le_bytes(bytes[24..28].try_into().unwrap());
        assert_eq!(sample_rate, 44100);
        let byte_rate = u32::from_le_bytes(bytes[28..32].try_into().unwrap());
        assert_eq!(byte_rate, 44100 * 4); // sampleRate * blockAlign
        let block_align = u16::from_le_bytes(bytes[32..34].try_into().unwrap());
        assert_eq!(block_align, 4); // channels * 2
        let bits = u16::from_le_bytes(bytes[34..36].try_into().unwrap());
        assert_eq!(bits, 16);

        // data subchunk
        assert_eq!(&bytes[36..40], b"data");
        let data_size = u32::from_le_bytes(bytes[40..44].try_into().unwrap());
        assert_eq!(data_size as usize, data_bytes);
        assert_eq!(bytes.len(), 44 + data_bytes);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_wav_roundtrip_preserves_samples() {
        let mut buffer = StereoBuffer::silence(64);
        for (i, s) in buffer.iter_mut().enumerate() {
            *s = StereoSample::new(i as f32 / 64.0, -(i as f32) / 64.0);
        }

        let path = std::env::temp_dir().join(format!("stemlab-rt-{}.wav", std::process::id()));
        write_wav(&buffer, 44100, &path).unwrap();

        let mut reader = hound::WavReader::open(&path).unwrap();
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples.len(), 128);
        assert_eq!(samples[0], 0);
        assert_eq!(samples[2], sample_to_i16(1.0 / 64.0));

        std::fs::remove_file(&path).ok();
    }
}
