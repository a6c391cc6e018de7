//! 16-bit PCM WAV encoding for progressive delivery.
//!
//! A response carries one RIFF header, written in front of the first
//! segment's PCM. Because the total length is unknown while streaming, the
//! RIFF and data sizes hold the `0xFFFFFFFF` streaming placeholder until a
//! fully buffered response is passed through [`finalize_header`].

use hound::{SampleFormat, WavSpec};

use crate::engine::RawAudio;
use crate::error::{Result, TtsError};

pub const WAV_HEADER_LEN: usize = 44;
pub const BITS_PER_SAMPLE: u16 = 16;

const STREAMING_LENGTH: u32 = u32::MAX;
const RIFF_SIZE_OFFSET: usize = 4;
const DATA_SIZE_OFFSET: usize = 40;

/// The output format implied by the first segment of a response.
pub fn spec_for(audio: &RawAudio) -> WavSpec {
    WavSpec {
        channels: audio.channels,
        sample_rate: audio.sample_rate,
        bits_per_sample: BITS_PER_SAMPLE,
        sample_format: SampleFormat::Int,
    }
}

/// Encode one segment against the format already declared for the response.
///
/// With `is_first_segment` the header is prepended; otherwise the bytes are
/// bare PCM and must match `declared` exactly.
pub fn encode(audio: &RawAudio, declared: &WavSpec, is_first_segment: bool) -> Result<Vec<u8>> {
    let actual = spec_for(audio);
    if actual != *declared {
        return Err(TtsError::Engine(format!(
            "segment format {} Hz/{} ch does not match declared {} Hz/{} ch",
            actual.sample_rate, actual.channels, declared.sample_rate, declared.channels
        )));
    }
    if declared.sample_rate == 0 || declared.channels == 0 {
        return Err(TtsError::Engine(
            "engine returned audio without a sample rate or channel count".to_string(),
        ));
    }

    let header_len = if is_first_segment { WAV_HEADER_LEN } else { 0 };
    let mut out = Vec::with_capacity(header_len + audio.samples.len() * 2);
    if is_first_segment {
        write_header(&mut out, declared);
    }
    write_pcm(&mut out, &audio.samples);
    Ok(out)
}

fn write_header(out: &mut Vec<u8>, spec: &WavSpec) {
    let bytes_per_sample = spec.bits_per_sample / 8;
    let block_align: u16 = spec.channels * bytes_per_sample;
    let byte_rate: u32 = spec.sample_rate * block_align as u32;

    // RIFF header
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&STREAMING_LENGTH.to_le_bytes());
    out.extend_from_slice(b"WAVE");

    // fmt chunk
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes()); // PCM
    out.extend_from_slice(&spec.channels.to_le_bytes());
    out.extend_from_slice(&spec.sample_rate.to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&spec.bits_per_sample.to_le_bytes());

    // data chunk
    out.extend_from_slice(b"data");
    out.extend_from_slice(&STREAMING_LENGTH.to_le_bytes());
}

fn write_pcm(out: &mut Vec<u8>, samples: &[f32]) {
    const I16_MAX_F32: f32 = i16::MAX as f32;
    for &s in samples {
        let v = (s.clamp(-1.0, 1.0) * I16_MAX_F32) as i16;
        out.extend_from_slice(&v.to_le_bytes());
    }
}

/// Replace the streaming placeholders with the real sizes of `buffer`.
pub fn finalize_header(buffer: &mut [u8]) -> Result<()> {
    if buffer.len() < WAV_HEADER_LEN || &buffer[..4] != b"RIFF" || &buffer[36..40] != b"data" {
        return Err(TtsError::Engine(
            "buffer does not start with a WAV header".to_string(),
        ));
    }
    let total = u32::try_from(buffer.len())
        .map_err(|_| TtsError::Engine("audio exceeds the WAV size limit".to_string()))?;
    let riff_size = total - 8;
    let data_size = total - WAV_HEADER_LEN as u32;

    buffer[RIFF_SIZE_OFFSET..RIFF_SIZE_OFFSET + 4].copy_from_slice(&riff_size.to_le_bytes());
    buffer[DATA_SIZE_OFFSET..DATA_SIZE_OFFSET + 4].copy_from_slice(&data_size.to_le_bytes());
    Ok(())
}
