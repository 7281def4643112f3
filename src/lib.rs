// voicedeck - audio core for a text-to-speech front end
// Codec utilities for the TTS wire format and export containers, plus a
// playback transport over the decoded audio

pub mod buffer;
pub mod codec;
pub mod error;
pub mod playback;

pub use buffer::AudioData;
pub use codec::{
    decode_base64, decode_pcm, encode_mp3, encode_wav, EncodedFile, MIME_MP3, MIME_WAV,
    WIRE_CHANNELS, WIRE_SAMPLE_RATE,
};
pub use error::{AudioError, Result};
pub use playback::{AudioSink, Clock, CpalSink, PlaybackState, Player, SystemClock};
