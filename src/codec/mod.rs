// Codec utilities
// Pure transforms between the TTS wire format, normalized audio and
// downloadable containers

pub mod decode;
pub mod mp3;
pub mod wav;

pub use decode::{decode_base64, decode_pcm};
pub use mp3::encode_mp3;
pub use wav::encode_wav;

/// Sample rate of PCM audio delivered by the generative API
pub const WIRE_SAMPLE_RATE: u32 = 24000;

/// Channel count of PCM audio delivered by the generative API
pub const WIRE_CHANNELS: usize = 1;

pub const MIME_WAV: &str = "audio/wav";
pub const MIME_MP3: &str = "audio/mp3";

/// An exported audio file, produced on demand and never retained
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFile {
    pub mime_type: &'static str,
    pub bytes: Vec<u8>,
}
