// WAV export
// Canonical 44-byte RIFF/WAVE header followed by interleaved 16-bit PCM

use std::io::Cursor;

use hound::{SampleFormat, WavSpec, WavWriter};

use crate::buffer::AudioData;
use crate::codec::{EncodedFile, MIME_WAV};
use crate::error::{AudioError, Result};

/// Encode a buffer as a 16-bit PCM WAV file.
///
/// Deterministic and byte-reproducible for identical input.
pub fn encode_wav(audio: &AudioData) -> Result<EncodedFile> {
    let spec = WavSpec {
        channels: audio.channel_count() as u16,
        sample_rate: audio.sample_rate(),
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    let mut writer = WavWriter::new(&mut cursor, spec)
        .map_err(|e| AudioError::Encoding(format!("failed to start WAV writer: {}", e)))?;

    for frame in 0..audio.frame_count() {
        for channel in audio.channels() {
            writer
                .write_sample(quantize(channel[frame]))
                .map_err(|e| AudioError::Encoding(format!("failed to write WAV sample: {}", e)))?;
        }
    }

    writer
        .finalize()
        .map_err(|e| AudioError::Encoding(format!("failed to finalize WAV file: {}", e)))?;

    Ok(EncodedFile {
        mime_type: MIME_WAV,
        bytes: cursor.into_inner(),
    })
}

/// Clamp to [-1, 1] and quantize to i16.
///
/// Negative values scale by 0x8000 and non-negative by 0x7FFF, truncating
/// toward zero, so both full-scale extremes are representable.
fn quantize(sample: f32) -> i16 {
    let s = sample.clamp(-1.0, 1.0);
    if s < 0.0 {
        (s * 32768.0) as i16
    } else {
        (s * 32767.0) as i16
    }
}
