// Audio output sink
// cpal output stream fed through a ring buffer, with the gain applied in
// the stream callback and one feeder per playback leg

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Stream, StreamConfig};
use parking_lot::Mutex;
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::HeapRb;
use rubato::{FastFixedIn, PolynomialDegree, Resampler};

use crate::buffer::AudioData;
use crate::error::{AudioError, Result};

type RingProducer = ringbuf::HeapProd<f32>;
type RingConsumer = ringbuf::HeapCons<f32>;

/// Source frames handed to the resampler per block
const FEED_CHUNK_FRAMES: usize = 1024;

/// Host audio graph behind the playback transport.
///
/// One persistent gain stage, one playback leg at a time.
pub trait AudioSink {
    /// Begin a fresh playback leg at `offset_secs` into the buffer,
    /// replacing any leg still running.
    fn start(&mut self, audio: Arc<AudioData>, offset_secs: f64);

    /// Halt the current leg immediately. No samples written by it may be
    /// heard after this returns.
    fn stop(&mut self);

    /// Apply gain to the persistent output stage, independent of play
    /// state and surviving across legs.
    fn set_gain(&mut self, gain: f32);
}

struct Leg {
    cancel: Arc<AtomicBool>,
    feeder: JoinHandle<()>,
}

/// `AudioSink` over the default cpal output device
pub struct CpalSink {
    _stream: Stream,
    producer: Arc<Mutex<RingProducer>>,
    sample_rate: u32,
    channels: u16,
    volume: Arc<Mutex<f32>>,
    clear_flag: Arc<AtomicBool>,
    leg: Option<Leg>,
}

impl CpalSink {
    /// Open the default output device and start its stream.
    ///
    /// Failure here is fatal for the session; the transport cannot be
    /// constructed without a sink.
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| AudioError::PlaybackUnavailable("no output device available".into()))?;

        let config = device.default_output_config().map_err(|e| {
            AudioError::PlaybackUnavailable(format!("failed to get default output config: {}", e))
        })?;

        let sample_rate = config.sample_rate().0;
        let channels = config.channels();

        // ~250ms of audio at the device rate
        let rb = HeapRb::<f32>::new((sample_rate as usize * channels as usize) / 4);
        let (producer, consumer) = rb.split();
        let producer = Arc::new(Mutex::new(producer));
        let consumer = Arc::new(Mutex::new(consumer));

        let volume = Arc::new(Mutex::new(1.0f32));
        let volume_clone = volume.clone();

        let clear_flag = Arc::new(AtomicBool::new(false));
        let clear_flag_clone = clear_flag.clone();

        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => Self::build_stream::<f32>(
                &device,
                &config.into(),
                consumer,
                volume_clone,
                clear_flag_clone,
            )?,
            cpal::SampleFormat::I16 => Self::build_stream::<i16>(
                &device,
                &config.into(),
                consumer,
                volume_clone,
                clear_flag_clone,
            )?,
            cpal::SampleFormat::U16 => Self::build_stream::<u16>(
                &device,
                &config.into(),
                consumer,
                volume_clone,
                clear_flag_clone,
            )?,
            format => {
                return Err(AudioError::PlaybackUnavailable(format!(
                    "unsupported sample format: {:?}",
                    format
                )))
            }
        };

        stream
            .play()
            .map_err(|e| AudioError::PlaybackUnavailable(format!("failed to start stream: {}", e)))?;

        Ok(Self {
            _stream: stream,
            producer,
            sample_rate,
            channels,
            volume,
            clear_flag,
            leg: None,
        })
    }

    fn build_stream<T: cpal::SizedSample + cpal::FromSample<f32>>(
        device: &cpal::Device,
        config: &StreamConfig,
        consumer: Arc<Mutex<RingConsumer>>,
        volume: Arc<Mutex<f32>>,
        clear_flag: Arc<AtomicBool>,
    ) -> Result<Stream> {
        let stream = device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    let mut consumer = consumer.lock();
                    let vol = *volume.lock();

                    // If the clear flag is set, drain the buffer and output silence
                    if clear_flag.swap(false, Ordering::SeqCst) {
                        while consumer.try_pop().is_some() {}
                    }

                    for sample in data.iter_mut() {
                        let value = consumer.try_pop().unwrap_or(0.0) * vol;
                        *sample = T::from_sample(value);
                    }
                },
                move |err| {
                    tracing::warn!("audio output error: {}", err);
                },
                None,
            )
            .map_err(|e| {
                AudioError::PlaybackUnavailable(format!("failed to build output stream: {}", e))
            })?;

        Ok(stream)
    }
}

impl AudioSink for CpalSink {
    fn start(&mut self, audio: Arc<AudioData>, offset_secs: f64) {
        self.stop();

        let start_frame = ((offset_secs * audio.sample_rate() as f64) as usize)
            .min(audio.frame_count());

        let cancel = Arc::new(AtomicBool::new(false));
        let cancel_clone = cancel.clone();
        let producer = self.producer.clone();
        let device_rate = self.sample_rate;
        let device_channels = self.channels;

        let feeder = std::thread::spawn(move || {
            feed_leg(
                audio,
                start_frame,
                device_rate,
                device_channels,
                producer,
                cancel_clone,
            );
        });

        self.leg = Some(Leg { cancel, feeder });
    }

    fn stop(&mut self) {
        if let Some(leg) = self.leg.take() {
            leg.cancel.store(true, Ordering::SeqCst);
            if leg.feeder.join().is_err() {
                tracing::warn!("playback feeder thread panicked");
            }
        }

        // With the feeder gone, drain whatever is still queued so the halt
        // is audible immediately
        self.clear_flag.store(true, Ordering::SeqCst);
    }

    fn set_gain(&mut self, gain: f32) {
        *self.volume.lock() = gain.clamp(0.0, 1.0);
    }
}

impl Drop for CpalSink {
    fn drop(&mut self) {
        AudioSink::stop(self);
    }
}

/// Push one leg's worth of samples into the ring buffer, converting from
/// the buffer's rate and layout to the device's.
fn feed_leg(
    audio: Arc<AudioData>,
    start_frame: usize,
    device_rate: u32,
    device_channels: u16,
    producer: Arc<Mutex<RingProducer>>,
    cancel: Arc<AtomicBool>,
) {
    let src_channels = audio.channel_count();
    if src_channels == 0 {
        return;
    }

    let mut resampler = if audio.sample_rate() != device_rate {
        let ratio = device_rate as f64 / audio.sample_rate() as f64;
        match FastFixedIn::<f32>::new(
            ratio,
            1.0,
            PolynomialDegree::Linear,
            FEED_CHUNK_FRAMES,
            src_channels,
        ) {
            Ok(r) => Some(r),
            Err(e) => {
                tracing::warn!("failed to create resampler: {}", e);
                return;
            }
        }
    } else {
        None
    };

    let total = audio.frame_count();
    let mut frame = start_frame;

    while frame < total && !cancel.load(Ordering::Relaxed) {
        let take = FEED_CHUNK_FRAMES.min(total - frame);

        let mut chunk: Vec<Vec<f32>> = (0..src_channels)
            .map(|ch| audio.channel(ch)[frame..frame + take].to_vec())
            .collect();

        let converted = match resampler.as_mut() {
            Some(resampler) => {
                // Fixed-input resampler; pad the final short block with silence
                for channel in chunk.iter_mut() {
                    channel.resize(FEED_CHUNK_FRAMES, 0.0);
                }
                match resampler.process(&chunk, None) {
                    Ok(out) => out,
                    Err(e) => {
                        tracing::warn!("resampling failed: {}", e);
                        return;
                    }
                }
            }
            None => chunk,
        };

        let interleaved = interleave_for_device(&converted, device_channels as usize);

        let mut remaining = &interleaved[..];
        while !remaining.is_empty() && !cancel.load(Ordering::Relaxed) {
            let written = push_samples(&producer, remaining);
            if written > 0 {
                remaining = &remaining[written..];
            } else {
                // Ring buffer full, wait for the stream callback to drain it
                std::thread::sleep(std::time::Duration::from_millis(1));
            }
        }

        frame += take;
    }
}

/// Interleave planar samples into the device's channel layout, repeating
/// source channels when the device has more (mono fans out to all).
fn interleave_for_device(planar: &[Vec<f32>], device_channels: usize) -> Vec<f32> {
    let src_channels = planar.len();
    let frames = planar.first().map(|c| c.len()).unwrap_or(0);

    let mut interleaved = Vec::with_capacity(frames * device_channels);
    for frame in 0..frames {
        for ch in 0..device_channels {
            interleaved.push(planar[ch % src_channels][frame]);
        }
    }
    interleaved
}

/// Write samples to the ring buffer, returning how many were accepted
fn push_samples(producer: &Mutex<RingProducer>, samples: &[f32]) -> usize {
    let mut producer = producer.lock();
    let mut written = 0;

    for &sample in samples {
        if producer.try_push(sample).is_ok() {
            written += 1;
        } else {
            break;
        }
    }

    written
}
