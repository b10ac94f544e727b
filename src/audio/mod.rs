//! PCM audio helpers for the live transcription path.
//!
//! All audio handled here is signed 16-bit little-endian mono PCM. The bot
//! streams it in small frames; `chunker` groups frames and drops silence,
//! `buffer` cuts the stream into overlapping windows sized for one
//! speech-to-text call, and `encode_wav` wraps a window for upload.
//! Browser captures arrive at 48 kHz and go through `resample_48k_to_16k`.

pub mod buffer;
pub mod chunker;

pub use buffer::SttBuffer;
pub use chunker::AudioChunker;

use std::io::Cursor;

use rubato::{Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction};

const RESAMPLE_INPUT_RATE: u32 = 48_000;
const RESAMPLE_OUTPUT_RATE: u32 = 16_000;

#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("wav encoding failed: {0}")]
    Wav(#[from] hound::Error),
    #[error("resampling failed: {0}")]
    Resample(String),
}

/// Wrap mono PCM16 samples in a RIFF/WAVE container.
///
/// # Errors
///
/// Returns [`AudioError::Wav`] if the writer rejects the data.
pub fn encode_wav(pcm: &[u8], sample_rate: u32) -> Result<Vec<u8>, AudioError> {
    let spec = hound::WavSpec { channels: 1, sample_rate, bits_per_sample: 16, sample_format: hound::SampleFormat::Int };
    // 44-byte canonical header plus the data.
    let mut cursor = Cursor::new(Vec::with_capacity(44 + pcm.len()));
    let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
    // An odd trailing byte is not a whole sample; chunks_exact drops it.
    for s in pcm.chunks_exact(2) {
        writer.write_sample(i16::from_le_bytes([s[0], s[1]]))?;
    }
    writer.finalize()?;
    Ok(cursor.into_inner())
}

/// Resample 48 kHz PCM16 to 16 kHz.
///
/// A windowed-sinc filter cuts everything above the 8 kHz output Nyquist
/// before decimating, so browser audio with high-frequency content does not
/// fold back into the speech band. The filter delays output by a few
/// milliseconds, which transcription tolerates.
///
/// # Errors
///
/// Returns [`AudioError::Resample`] if the resampler cannot be built or run.
pub fn resample_48k_to_16k(pcm: &[u8]) -> Result<Vec<u8>, AudioError> {
    let samples: Vec<f32> = pcm
        .chunks_exact(2)
        .map(|s| f32::from(i16::from_le_bytes([s[0], s[1]])) / 32_768.0)
        .collect();
    if samples.is_empty() {
        return Ok(Vec::new());
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };
    let ratio = f64::from(RESAMPLE_OUTPUT_RATE) / f64::from(RESAMPLE_INPUT_RATE);
    let mut resampler = SincFixedIn::<f32>::new(ratio, 1.0, params, samples.len(), 1)
        .map_err(|e| AudioError::Resample(e.to_string()))?;
    let input = vec![samples];
    let output = resampler
        .process(&input, None)
        .map_err(|e| AudioError::Resample(e.to_string()))?;

    Ok(output
        .first()
        .map(|channel| channel.iter().flat_map(|&v| to_pcm16(v).to_le_bytes()).collect())
        .unwrap_or_default())
}

#[allow(clippy::cast_possible_truncation)]
fn to_pcm16(v: f32) -> i16 {
    (v * 32_768.0).round().clamp(f32::from(i16::MIN), f32::from(i16::MAX)) as i16
}

/// Root-mean-square level of PCM16 samples. Empty input is silent.
#[must_use]
pub fn rms(pcm: &[u8]) -> f64 {
    let mut sum = 0.0_f64;
    let mut count = 0_u32;
    for s in pcm.chunks_exact(2) {
        let v = f64::from(i16::from_le_bytes([s[0], s[1]]));
        sum += v * v;
        count += 1;
    }
    if count == 0 {
        return 0.0;
    }
    (sum / f64::from(count)).sqrt()
}

/// Number of PCM16 bytes covering `seconds` of mono audio.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn bytes_for_seconds(sample_rate: u32, seconds: f64) -> usize {
    let samples = (f64::from(sample_rate) * seconds.max(0.0)) as usize;
    samples * 2
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
