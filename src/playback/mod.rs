// Playback engine
// Clock-derived transport over a decoded buffer, cpal for output

pub mod clock;
pub mod player;
pub mod sink;

pub use clock::{Clock, SystemClock};
pub use player::{PlaybackState, Player};
pub use sink::{AudioSink, CpalSink};
