// Playback transport over a single decoded buffer
//
// Elapsed time is never stored while playing; it is derived from two
// anchors (buffer offset at leg start, clock reading at leg start) so the
// reported position cannot drift from the audio clock.

use std::sync::Arc;

use serde::Serialize;

use crate::buffer::AudioData;
use crate::playback::clock::Clock;
use crate::playback::sink::AudioSink;

/// Observable transport snapshot, updated on every tick and every
/// state-changing call
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PlaybackState {
    pub is_playing: bool,
    pub current_time: f64,
    pub duration: f64,
    pub volume: f32,
}

/// Transport over one decoded audio buffer: load, play/pause toggle,
/// stop, seek and volume.
///
/// All operations are synchronous; the host drives `tick` while audio is
/// playing to keep the reported position fresh.
pub struct Player {
    sink: Box<dyn AudioSink>,
    clock: Box<dyn Clock>,
    audio: Option<Arc<AudioData>>,
    playing: bool,
    /// Buffer position at which the current or next leg starts
    start_offset: f64,
    /// Clock reading when the current leg started
    leg_epoch: f64,
    /// Last reported position; authoritative only while not playing
    current_time: f64,
    volume: f32,
}

impl Player {
    pub fn new(sink: Box<dyn AudioSink>, clock: Box<dyn Clock>) -> Self {
        Self {
            sink,
            clock,
            audio: None,
            playing: false,
            start_offset: 0.0,
            leg_epoch: 0.0,
            current_time: 0.0,
            volume: 1.0,
        }
    }

    /// Build a player over the default output device and the system clock.
    ///
    /// Fails with `PlaybackUnavailable` when the host has no usable audio
    /// output; that condition is fatal for the session.
    pub fn with_default_output() -> crate::error::Result<Self> {
        let sink = crate::playback::sink::CpalSink::new()?;
        let clock = crate::playback::clock::SystemClock::new();
        Ok(Self::new(Box::new(sink), Box::new(clock)))
    }

    /// Replace the loaded buffer, resetting the transport position.
    ///
    /// The volume setting is deliberately kept across loads.
    pub fn load(&mut self, audio: Arc<AudioData>) {
        self.halt(true);
        self.audio = Some(audio);
    }

    /// Toggle playback: starts a leg when stopped or paused, pauses when
    /// playing. Without a loaded buffer this is a no-op.
    pub fn play(&mut self) {
        if self.playing {
            // Pause: bank the elapsed time into the offset, halt the leg
            self.start_offset += self.clock.now() - self.leg_epoch;
            self.start_offset = self.start_offset.min(self.duration());
            self.halt(false);
            self.current_time = self.start_offset;
            return;
        }

        let Some(audio) = self.audio.as_ref() else {
            return;
        };

        self.sink.set_gain(self.volume);
        self.sink.start(Arc::clone(audio), self.start_offset);
        self.leg_epoch = self.clock.now();
        self.playing = true;
    }

    /// Halt playback. `reset_time` returns the position to zero; otherwise
    /// the position is preserved (pause semantics).
    pub fn stop(&mut self, reset_time: bool) {
        self.halt(reset_time);
    }

    /// Position update driven by the host while playing; a no-op
    /// otherwise, so a tick arriving after a stop cannot move the clock.
    ///
    /// When the derived position reaches the end of the buffer the
    /// transport stops, resets the offset for the next `play`, and pins
    /// the reported position at the duration.
    pub fn tick(&mut self) {
        if !self.playing {
            return;
        }

        let duration = self.duration();
        let position = self.start_offset + (self.clock.now() - self.leg_epoch);
        if position < duration {
            self.current_time = position;
        } else {
            self.halt(true);
            self.current_time = duration;
        }
    }

    /// Jump to a position, clamped to the buffer bounds. Playback resumes
    /// from the new position if it was running.
    pub fn seek(&mut self, time_secs: f64) {
        if self.audio.is_none() {
            return;
        }

        let was_playing = self.playing;
        self.halt(false);

        let clamped = time_secs.clamp(0.0, self.duration());
        self.start_offset = clamped;
        self.current_time = clamped;

        if was_playing {
            self.play();
        }
    }

    /// Set the output volume, clamped to [0, 1]. Applies immediately,
    /// independent of play state, and persists across loads.
    pub fn set_volume(&mut self, level: f32) {
        self.volume = level.clamp(0.0, 1.0);
        self.sink.set_gain(self.volume);
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn duration(&self) -> f64 {
        self.audio
            .as_ref()
            .map(|a| a.duration_secs())
            .unwrap_or(0.0)
    }

    pub fn current_time(&self) -> f64 {
        if self.playing {
            let position = self.start_offset + (self.clock.now() - self.leg_epoch);
            position.min(self.duration())
        } else {
            self.current_time
        }
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    /// Current transport snapshot
    pub fn state(&self) -> PlaybackState {
        PlaybackState {
            is_playing: self.playing,
            current_time: self.current_time(),
            duration: self.duration(),
            volume: self.volume,
        }
    }

    fn halt(&mut self, reset_time: bool) {
        self.sink.stop();
        self.playing = false;
        if reset_time {
            self.start_offset = 0.0;
            self.current_time = 0.0;
        }
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.stop(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    #[derive(Debug, Clone, PartialEq)]
    enum SinkEvent {
        Start { offset: f64 },
        Stop,
        Gain(f32),
    }

    struct FakeSink {
        events: Rc<RefCell<Vec<SinkEvent>>>,
    }

    impl AudioSink for FakeSink {
        fn start(&mut self, _audio: Arc<AudioData>, offset_secs: f64) {
            self.events.borrow_mut().push(SinkEvent::Start {
                offset: offset_secs,
            });
        }

        fn stop(&mut self) {
            self.events.borrow_mut().push(SinkEvent::Stop);
        }

        fn set_gain(&mut self, gain: f32) {
            self.events.borrow_mut().push(SinkEvent::Gain(gain));
        }
    }

    struct FakeClock {
        now: Rc<Cell<f64>>,
    }

    impl Clock for FakeClock {
        fn now(&self) -> f64 {
            self.now.get()
        }
    }

    struct Rig {
        player: Player,
        clock: Rc<Cell<f64>>,
        events: Rc<RefCell<Vec<SinkEvent>>>,
    }

    fn rig() -> Rig {
        let clock = Rc::new(Cell::new(0.0));
        let events = Rc::new(RefCell::new(Vec::new()));
        let player = Player::new(
            Box::new(FakeSink {
                events: events.clone(),
            }),
            Box::new(FakeClock { now: clock.clone() }),
        );
        Rig {
            player,
            clock,
            events,
        }
    }

    /// 10 seconds of silence at 24 kHz
    fn ten_second_buffer() -> Arc<AudioData> {
        Arc::new(AudioData::new(vec![vec![0.0; 240_000]], 24000))
    }

    fn advance(rig: &Rig, secs: f64) {
        rig.clock.set(rig.clock.get() + secs);
    }

    #[test]
    fn test_play_without_buffer_is_noop() {
        let mut r = rig();
        r.player.play();
        assert!(!r.player.is_playing());
        assert!(r
            .events
            .borrow()
            .iter()
            .all(|e| !matches!(e, SinkEvent::Start { .. })));
    }

    #[test]
    fn test_load_fixes_duration_and_resets_position() {
        let mut r = rig();
        r.player.load(ten_second_buffer());
        let state = r.player.state();
        assert!(!state.is_playing);
        assert_eq!(state.current_time, 0.0);
        assert_eq!(state.duration, 10.0);
    }

    #[test]
    fn test_time_advances_while_playing() {
        let mut r = rig();
        r.player.load(ten_second_buffer());
        r.player.play();
        assert!(r.player.is_playing());

        let mut last = 0.0;
        for _ in 0..5 {
            advance(&r, 0.5);
            r.player.tick();
            let now = r.player.current_time();
            assert!(now >= last, "time went backwards: {} < {}", now, last);
            last = now;
        }
        assert!((last - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_pause_preserves_offset_and_resume_continues() {
        let mut r = rig();
        r.player.load(ten_second_buffer());

        r.player.play();
        advance(&r, 3.0);
        r.player.tick();
        r.player.play(); // toggle: pause

        assert!(!r.player.is_playing());
        assert_eq!(r.player.current_time(), 3.0);

        // Paused time holds still
        advance(&r, 5.0);
        r.player.tick();
        assert_eq!(r.player.current_time(), 3.0);

        // Resume picks up from the exact pause point
        r.player.play();
        assert!(r.player.is_playing());
        assert_eq!(
            r.events.borrow().last(),
            Some(&SinkEvent::Start { offset: 3.0 })
        );
        advance(&r, 1.0);
        r.player.tick();
        assert_eq!(r.player.current_time(), 4.0);
    }

    #[test]
    fn test_natural_end_pins_time_at_duration() {
        let mut r = rig();
        r.player.load(ten_second_buffer());
        r.player.play();

        advance(&r, 11.0);
        r.player.tick();

        assert!(!r.player.is_playing());
        assert_eq!(r.player.current_time(), 10.0);
        assert_eq!(r.events.borrow().last(), Some(&SinkEvent::Stop));

        // Replay starts from the beginning
        r.player.play();
        assert_eq!(
            r.events.borrow().last(),
            Some(&SinkEvent::Start { offset: 0.0 })
        );
    }

    #[test]
    fn test_seek_clamps_to_buffer_bounds() {
        let mut r = rig();
        r.player.load(ten_second_buffer());

        r.player.seek(-5.0);
        assert_eq!(r.player.current_time(), 0.0);

        r.player.seek(15.0);
        assert_eq!(r.player.current_time(), 10.0);
    }

    #[test]
    fn test_seek_while_playing_restarts_leg_at_target() {
        let mut r = rig();
        r.player.load(ten_second_buffer());
        r.player.play();
        advance(&r, 2.0);
        r.player.tick();

        r.player.seek(7.0);

        assert!(r.player.is_playing());
        assert_eq!(
            r.events.borrow().last(),
            Some(&SinkEvent::Start { offset: 7.0 })
        );
        advance(&r, 1.0);
        r.player.tick();
        assert_eq!(r.player.current_time(), 8.0);
    }

    #[test]
    fn test_seek_while_stopped_does_not_start_playback() {
        let mut r = rig();
        r.player.load(ten_second_buffer());
        r.player.seek(4.0);
        assert!(!r.player.is_playing());
        assert_eq!(r.player.current_time(), 4.0);

        // Next play resumes from the seek target
        r.player.play();
        assert_eq!(
            r.events.borrow().last(),
            Some(&SinkEvent::Start { offset: 4.0 })
        );
    }

    #[test]
    fn test_volume_clamps_and_survives_load() {
        let mut r = rig();
        r.player.set_volume(-1.0);
        assert_eq!(r.player.volume(), 0.0);

        r.player.set_volume(2.0);
        assert_eq!(r.player.volume(), 1.0);

        r.player.set_volume(0.4);
        r.player.load(ten_second_buffer());
        assert_eq!(r.player.volume(), 0.4);

        // The gain stage hears every change
        assert!(r.events.borrow().contains(&SinkEvent::Gain(0.4)));
    }

    #[test]
    fn test_stop_with_reset_returns_to_start() {
        let mut r = rig();
        r.player.load(ten_second_buffer());
        r.player.play();
        advance(&r, 2.0);
        r.player.tick();

        r.player.stop(true);
        assert!(!r.player.is_playing());
        assert_eq!(r.player.current_time(), 0.0);
    }

    #[test]
    fn test_stop_without_reset_keeps_position() {
        let mut r = rig();
        r.player.load(ten_second_buffer());
        r.player.play();
        advance(&r, 2.0);
        r.player.tick();

        r.player.stop(false);
        assert!(!r.player.is_playing());
        assert_eq!(r.player.current_time(), 2.0);
    }

    #[test]
    fn test_stale_tick_after_stop_changes_nothing() {
        let mut r = rig();
        r.player.load(ten_second_buffer());
        r.player.play();
        advance(&r, 2.0);
        r.player.tick();
        r.player.stop(true);

        advance(&r, 3.0);
        r.player.tick();
        assert_eq!(r.player.current_time(), 0.0);
        assert!(!r.player.is_playing());
    }

    #[test]
    fn test_drop_halts_the_sink() {
        let r = rig();
        let events = r.events.clone();
        let mut player = r.player;
        player.load(ten_second_buffer());
        player.play();
        drop(player);

        assert_eq!(events.borrow().last(), Some(&SinkEvent::Stop));
    }

    #[test]
    fn test_state_snapshot_serializes_for_the_ui() {
        let mut r = rig();
        r.player.load(ten_second_buffer());
        let json = serde_json::to_value(r.player.state()).unwrap();
        assert_eq!(json["is_playing"], false);
        assert_eq!(json["duration"], 10.0);
        assert_eq!(json["current_time"], 0.0);
        assert_eq!(json["volume"], 1.0);
    }
}
