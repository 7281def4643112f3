// Import path for audio delivered by the generative API:
// base64 text -> raw bytes -> normalized planar buffer

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::buffer::AudioData;
use crate::error::{AudioError, Result};

/// Decode a standard base64 payload into raw bytes.
pub fn decode_base64(input: &str) -> Result<Vec<u8>> {
    Ok(STANDARD.decode(input)?)
}

/// Interpret raw bytes as interleaved signed 16-bit little-endian PCM and
/// normalize into a planar buffer.
///
/// An incomplete trailing frame is discarded; empty input yields a
/// zero-frame buffer.
pub fn decode_pcm(bytes: &[u8], sample_rate: u32, num_channels: usize) -> Result<AudioData> {
    if num_channels == 0 {
        return Err(AudioError::Format("channel count must be nonzero".into()));
    }
    if sample_rate == 0 {
        return Err(AudioError::Format("sample rate must be nonzero".into()));
    }

    let frame_count = bytes.len() / (2 * num_channels);
    let dropped = bytes.len() - frame_count * 2 * num_channels;
    if dropped > 0 {
        tracing::debug!(dropped, "discarding incomplete trailing PCM frame");
    }

    let mut channels: Vec<Vec<f32>> = (0..num_channels)
        .map(|_| Vec::with_capacity(frame_count))
        .collect();
    for frame in 0..frame_count {
        for (ch, samples) in channels.iter_mut().enumerate() {
            let offset = (frame * num_channels + ch) * 2;
            let raw = i16::from_le_bytes([bytes[offset], bytes[offset + 1]]);
            samples.push(raw as f32 / 32768.0);
        }
    }

    Ok(AudioData::new(channels, sample_rate))
}
