// MP3 export through the LAME encoder
// Feeds fixed-size sample blocks and concatenates the emitted chunks plus
// the flush tail into a single byte stream

use mp3lame_encoder::{max_required_buffer_size, Bitrate, Builder, FlushNoGap, MonoPcm, Quality};

use crate::buffer::AudioData;
use crate::codec::{EncodedFile, MIME_MP3};
use crate::error::{AudioError, Result};

/// Samples handed to the encoder per call (one MPEG granule pair)
const SAMPLE_BLOCK_SIZE: usize = 1152;

/// Constant bitrate of the produced stream
const BITRATE: Bitrate = Bitrate::Kbps128;

/// Minimum output headroom LAME needs when flushing
const FLUSH_HEADROOM: usize = 7200;

/// Encode a buffer as a constant-bitrate mono MP3 file.
///
/// Only channel 0 is encoded; further channels are ignored rather than
/// mixed down. The restriction comes from the encoder configuration, not
/// from the input shape.
pub fn encode_mp3(audio: &AudioData) -> Result<EncodedFile> {
    if audio.channel_count() == 0 {
        return Err(AudioError::Encoding("no audio channels to encode".into()));
    }
    if audio.channel_count() > 1 {
        tracing::debug!(
            channels = audio.channel_count(),
            "multi-channel buffer: encoding channel 0 only"
        );
    }

    let samples: Vec<i16> = audio.channel(0).iter().map(|&s| quantize(s)).collect();

    let mut builder = Builder::new()
        .ok_or_else(|| AudioError::Encoding("failed to allocate LAME encoder".into()))?;
    builder
        .set_num_channels(1)
        .map_err(|e| AudioError::Encoding(format!("LAME channel setup: {:?}", e)))?;
    builder
        .set_sample_rate(audio.sample_rate())
        .map_err(|e| AudioError::Encoding(format!("LAME sample rate setup: {:?}", e)))?;
    builder
        .set_brate(BITRATE)
        .map_err(|e| AudioError::Encoding(format!("LAME bitrate setup: {:?}", e)))?;
    builder
        .set_quality(Quality::Best)
        .map_err(|e| AudioError::Encoding(format!("LAME quality setup: {:?}", e)))?;
    let mut encoder = builder
        .build()
        .map_err(|e| AudioError::Encoding(format!("failed to initialize LAME encoder: {:?}", e)))?;

    let mut out: Vec<u8> = Vec::new();
    for block in samples.chunks(SAMPLE_BLOCK_SIZE) {
        out.reserve(max_required_buffer_size(block.len()));
        let written = encoder
            .encode(MonoPcm(block), out.spare_capacity_mut())
            .map_err(|e| AudioError::Encoding(format!("MP3 encode failed: {:?}", e)))?;
        // SAFETY: the encoder initialized `written` bytes of the spare capacity
        unsafe { out.set_len(out.len() + written) };
    }

    out.reserve(FLUSH_HEADROOM);
    let written = encoder
        .flush::<FlushNoGap>(out.spare_capacity_mut())
        .map_err(|e| AudioError::Encoding(format!("MP3 flush failed: {:?}", e)))?;
    // SAFETY: as above, the flush initialized `written` bytes
    unsafe { out.set_len(out.len() + written) };

    Ok(EncodedFile {
        mime_type: MIME_MP3,
        bytes: out,
    })
}

/// Clamp to [-1, 1] and quantize to i16.
///
/// Full-scale input maps to +/-32767; values beyond full scale saturate
/// instead of wrapping.
fn quantize(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * 32767.5) as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(frames: usize) -> Vec<f32> {
        (0..frames)
            .map(|i| (i as f32 * 0.05).sin() * 0.6)
            .collect()
    }

    #[test]
    fn test_quantize_extremes() {
        assert_eq!(quantize(1.0), 32767);
        assert_eq!(quantize(-1.0), -32767);
        assert_eq!(quantize(0.0), 0);
        assert_eq!(quantize(1.5), 32767);
        assert_eq!(quantize(-1.5), -32767);
    }

    #[test]
    fn test_produces_mpeg_stream() {
        let audio = AudioData::new(vec![sine(24000)], 24000);
        let file = encode_mp3(&audio).unwrap();

        assert_eq!(file.mime_type, MIME_MP3);
        assert!(!file.bytes.is_empty());
        // MPEG frame sync word
        assert_eq!(file.bytes[0], 0xff);
        assert_eq!(file.bytes[1] & 0xe0, 0xe0);
    }

    #[test]
    fn test_encodes_only_first_channel() {
        let voice = sine(4800);
        let junk = vec![0.9_f32; 4800];

        let mono = AudioData::new(vec![voice.clone()], 24000);
        let stereo = AudioData::new(vec![voice, junk], 24000);

        assert_eq!(
            encode_mp3(&mono).unwrap().bytes,
            encode_mp3(&stereo).unwrap().bytes
        );
    }

    #[test]
    fn test_rejects_empty_buffer() {
        let audio = AudioData::new(vec![], 24000);
        assert!(encode_mp3(&audio).is_err());
    }
}
