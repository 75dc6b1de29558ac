use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample};

use super::decode::DecodedTrack;
use super::resample::resample_track;
use super::spectrum::SampleTap;
use crate::error::PlaybackError;

/// The one place audio is actually played. The coordinator owns exactly one.
pub trait MediaOutput {
    /// Replace the current source and start playing it from the beginning.
    fn start(&mut self, track: Arc<DecodedTrack>) -> Result<(), PlaybackError>;
    fn set_playing(&mut self, playing: bool);
    fn set_volume(&mut self, volume: f32);
    fn rewind(&mut self);
    fn is_finished(&self) -> bool;
    /// Called once per frame with the frame delta; device-backed outputs
    /// advance on their own thread and ignore it.
    fn tick(&mut self, _dt: f32) {}
}

/// Transport flags shared with the audio callback thread.
#[derive(Debug)]
struct Transport {
    playing: AtomicBool,
    finished: AtomicBool,
    volume: AtomicU32,
    /// Next frame to play
    cursor: AtomicU64,
    /// Set by the render thread, applied by the callback at its next buffer
    rewind: AtomicBool,
}

impl Transport {
    fn new(volume: f32) -> Self {
        Self {
            playing: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            volume: AtomicU32::new(volume.to_bits()),
            cursor: AtomicU64::new(0),
            rewind: AtomicBool::new(false),
        }
    }

    /// Only valid while no stream is running.
    fn reset(&self) {
        self.cursor.store(0, Ordering::Relaxed);
        self.finished.store(false, Ordering::Relaxed);
        self.rewind.store(false, Ordering::Relaxed);
    }

    fn request_rewind(&self) {
        self.rewind.store(true, Ordering::Release);
        self.finished.store(false, Ordering::Release);
    }

    /// A pending rewind hides any `finished` written by a buffer that was
    /// already in flight when the rewind was requested.
    fn is_finished(&self) -> bool {
        !self.rewind.load(Ordering::Acquire) && self.finished.load(Ordering::Acquire)
    }

    /// Start of a callback buffer: apply a pending rewind, return the cursor.
    fn begin_buffer(&self) -> u64 {
        if self.rewind.load(Ordering::Acquire) {
            self.cursor.store(0, Ordering::Relaxed);
            self.finished.store(false, Ordering::Release);
            self.rewind.store(false, Ordering::Release);
            return 0;
        }
        self.cursor.load(Ordering::Relaxed)
    }

    fn end_buffer(&self, cursor: u64, ended: bool) {
        self.cursor.store(cursor, Ordering::Relaxed);
        if ended {
            self.finished.store(true, Ordering::Release);
        }
    }
}

/// Plays through the default cpal output device, feeding the spectrum tap
/// with the mono mix of what was just played.
pub struct CpalOutput {
    device: cpal::Device,
    config: cpal::StreamConfig,
    sample_format: SampleFormat,
    transport: Arc<Transport>,
    tap: SampleTap,
    stream: Option<cpal::Stream>,
}

impl CpalOutput {
    pub fn new(tap: SampleTap, volume: f32) -> Result<Self, PlaybackError> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(PlaybackError::NoDevice)?;
        let supported = device
            .default_output_config()
            .map_err(|e| PlaybackError::Config(e.to_string()))?;

        log::info!(
            "Audio output: {} @ {}Hz, {} ch, {:?}",
            device.name().unwrap_or_else(|_| "unknown".to_string()),
            supported.sample_rate().0,
            supported.channels(),
            supported.sample_format()
        );

        Ok(Self {
            sample_format: supported.sample_format(),
            config: supported.into(),
            device,
            transport: Arc::new(Transport::new(volume)),
            tap,
            stream: None,
        })
    }
}

impl MediaOutput for CpalOutput {
    fn start(&mut self, track: Arc<DecodedTrack>) -> Result<(), PlaybackError> {
        // Dropping the old stream stops the previous source
        self.stream = None;
        self.transport.reset();
        self.tap.clear();

        let device_rate = self.config.sample_rate.0;
        let track = if track.sample_rate == device_rate {
            track
        } else {
            Arc::new(resample_track(&track, device_rate)?)
        };

        let transport = Arc::clone(&self.transport);
        let tap = self.tap.clone();
        let stream = match self.sample_format {
            SampleFormat::F32 => build_stream::<f32>(&self.device, &self.config, track, transport, tap),
            SampleFormat::I16 => build_stream::<i16>(&self.device, &self.config, track, transport, tap),
            SampleFormat::U16 => build_stream::<u16>(&self.device, &self.config, track, transport, tap),
            other => return Err(PlaybackError::UnsupportedFormat(format!("{:?}", other))),
        }?;

        stream.play().map_err(|e| PlaybackError::Stream(e.to_string()))?;
        self.transport.playing.store(true, Ordering::Relaxed);
        self.stream = Some(stream);
        Ok(())
    }

    fn set_playing(&mut self, playing: bool) {
        self.transport.playing.store(playing, Ordering::Relaxed);
    }

    fn set_volume(&mut self, volume: f32) {
        self.transport.volume.store(volume.to_bits(), Ordering::Relaxed);
    }

    fn rewind(&mut self) {
        self.transport.request_rewind();
    }

    fn is_finished(&self) -> bool {
        self.transport.is_finished()
    }
}

/// `track` must already be at the device rate.
fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    track: Arc<DecodedTrack>,
    transport: Arc<Transport>,
    tap: SampleTap,
) -> Result<cpal::Stream, PlaybackError>
where
    T: SizedSample + FromSample<f32>,
{
    let out_channels = (config.channels as usize).max(1);
    let mut mono: Vec<f32> = Vec::with_capacity(4096);

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                fill_buffer(data, out_channels, &track, &transport, &mut mono);
                tap.push(&mono);
            },
            |err| log::error!("Audio stream error: {}", err),
            None,
        )
        .map_err(|e| PlaybackError::Stream(e.to_string()))
}

/// One device buffer: write interleaved frames from the cursor and leave the
/// mono mix of what was played in `mono`. Runs on the audio thread, so `mono`
/// grows at most once per buffer size.
fn fill_buffer<T>(
    data: &mut [T],
    out_channels: usize,
    track: &DecodedTrack,
    transport: &Transport,
    mono: &mut Vec<f32>,
) where
    T: SizedSample + FromSample<f32>,
{
    mono.clear();
    mono.reserve(data.len() / out_channels);
    let playing = transport.playing.load(Ordering::Relaxed);
    let volume = f32::from_bits(transport.volume.load(Ordering::Relaxed));
    let last_channel = track.channels.len().saturating_sub(1);
    let frames = track.frames();
    let mut pos = transport.begin_buffer() as usize;

    for frame in data.chunks_mut(out_channels) {
        if !playing || pos >= frames {
            frame.fill(T::EQUILIBRIUM);
            continue;
        }
        for (ch, out) in frame.iter_mut().enumerate() {
            let sample = track.channels[ch.min(last_channel)][pos];
            *out = T::from_sample(sample * volume);
        }
        mono.push(track.mono_at(pos));
        pos += 1;
    }

    transport.end_buffer(pos as u64, playing && pos >= frames);
}

/// Device-less output driven by the frame clock. Used by the headless host
/// and in tests.
pub struct ClockedOutput {
    track: Option<Arc<DecodedTrack>>,
    tap: SampleTap,
    playing: bool,
    finished: bool,
    position: f64,
    scratch: Vec<f32>,
}

impl ClockedOutput {
    pub fn new(tap: SampleTap) -> Self {
        Self {
            track: None,
            tap,
            playing: false,
            finished: false,
            position: 0.0,
            scratch: Vec::new(),
        }
    }

    #[allow(dead_code)]
    pub fn position_seconds(&self) -> f32 {
        match &self.track {
            Some(track) => (self.position / track.sample_rate as f64) as f32,
            None => 0.0,
        }
    }
}

impl MediaOutput for ClockedOutput {
    fn start(&mut self, track: Arc<DecodedTrack>) -> Result<(), PlaybackError> {
        self.track = Some(track);
        self.tap.clear();
        self.rewind();
        self.playing = true;
        Ok(())
    }

    fn set_playing(&mut self, playing: bool) {
        self.playing = playing;
    }

    /// Silent output, nothing to scale.
    fn set_volume(&mut self, _volume: f32) {}

    fn rewind(&mut self) {
        self.position = 0.0;
        self.finished = false;
    }

    fn is_finished(&self) -> bool {
        self.finished
    }

    fn tick(&mut self, dt: f32) {
        let Some(track) = &self.track else {
            return;
        };
        if !self.playing || self.finished {
            return;
        }

        let frames = track.frames();
        let start = self.position as usize;
        self.position += dt.max(0.0) as f64 * track.sample_rate as f64;
        let end = (self.position as usize).min(frames);

        self.scratch.clear();
        self.scratch.extend((start..end).map(|i| track.mono_at(i)));
        self.tap.push(&self.scratch);

        if self.position as usize >= frames {
            self.finished = true;
        }
    }
}
