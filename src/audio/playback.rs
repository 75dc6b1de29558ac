use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread;

use super::analysis::extract_features;
use super::decode::DecodedTrack;
use super::features::AudioFeatureSet;
use super::output::MediaOutput;
use crate::error::PlaybackError;

/// Messages from the playback side to the render loop.
#[derive(Clone, Debug, PartialEq)]
pub enum PlaybackEvent {
    TrackReady { generation: u64, duration: f32 },
    FeaturesReady { generation: u64, features: AudioFeatureSet },
    ExtractionFailed { generation: u64, message: String },
    Paused,
    Resumed,
    TrackEnded { generation: u64 },
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlaybackState {
    pub is_playing: bool,
    pub volume: f32,
}

/// Owns the single active media source and the lifecycle that kicks off
/// feature extraction for it.
pub struct PlaybackCoordinator {
    output: Box<dyn MediaOutput>,
    state: PlaybackState,
    generation: u64,
    track: Option<Arc<DecodedTrack>>,
    window_size: usize,
    events: Sender<PlaybackEvent>,
}

impl PlaybackCoordinator {
    pub fn new(
        mut output: Box<dyn MediaOutput>,
        volume: f32,
        window_size: usize,
        events: Sender<PlaybackEvent>,
    ) -> Self {
        let volume = clamp_volume(volume);
        output.set_volume(volume);
        Self {
            output,
            state: PlaybackState { is_playing: false, volume },
            generation: 0,
            track: None,
            window_size,
            events,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Replace whatever was playing, start the new track, signal the render
    /// loop, and extract features on a worker thread. If the output cannot
    /// start, nothing is loaded afterwards: the previous source is gone.
    pub fn load(&mut self, track: Arc<DecodedTrack>) -> Result<u64, PlaybackError> {
        self.generation += 1;
        let generation = self.generation;

        self.output.set_volume(self.state.volume);
        if let Err(e) = self.output.start(Arc::clone(&track)) {
            self.state.is_playing = false;
            self.track = None;
            return Err(e);
        }
        self.state.is_playing = true;
        self.track = Some(Arc::clone(&track));

        log::info!("Track {} started ({:.1}s)", generation, track.duration());
        let _ = self.events.send(PlaybackEvent::TrackReady {
            generation,
            duration: track.duration(),
        });

        self.spawn_extraction(generation, track);
        Ok(generation)
    }

    fn spawn_extraction(&self, generation: u64, track: Arc<DecodedTrack>) {
        let events = self.events.clone();
        let window_size = self.window_size;
        thread::spawn(move || {
            let event = match extract_features(&track, window_size) {
                Ok(features) => PlaybackEvent::FeaturesReady { generation, features },
                Err(e) => {
                    log::error!("Feature extraction failed: {}", e);
                    PlaybackEvent::ExtractionFailed {
                        generation,
                        message: e.to_string(),
                    }
                }
            };
            let _ = events.send(event);
        });
    }

    /// No-op without a track. Playing again after the end restarts it.
    pub fn toggle_play_pause(&mut self) -> PlaybackState {
        if self.track.is_none() {
            return self.state;
        }

        self.state.is_playing = !self.state.is_playing;
        if self.state.is_playing && self.output.is_finished() {
            self.output.rewind();
        }
        self.output.set_playing(self.state.is_playing);

        let event = if self.state.is_playing {
            PlaybackEvent::Resumed
        } else {
            PlaybackEvent::Paused
        };
        log::info!("Playback {}", if self.state.is_playing { "resumed" } else { "paused" });
        let _ = self.events.send(event);
        self.state
    }

    pub fn set_volume(&mut self, volume: f32) -> f32 {
        self.state.volume = clamp_volume(volume);
        self.output.set_volume(self.state.volume);
        log::debug!("Volume {:.2}", self.state.volume);
        self.state.volume
    }

    /// Per-frame housekeeping: advance clock-driven outputs and detect the
    /// natural end of the track.
    pub fn tick(&mut self, dt: f32) {
        self.output.tick(dt);
        if self.state.is_playing && self.output.is_finished() {
            self.state.is_playing = false;
            self.output.set_playing(false);
            log::info!("Track {} ended", self.generation);
            let _ = self.events.send(PlaybackEvent::TrackEnded {
                generation: self.generation,
            });
        }
    }
}

fn clamp_volume(volume: f32) -> f32 {
    if volume.is_nan() {
        0.0
    } else {
        volume.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::output::ClockedOutput;
    use crate::audio::spectrum::SampleTap;
    use std::sync::mpsc::{self, Receiver};
    use std::time::Duration;

    fn coordinator() -> (PlaybackCoordinator, Receiver<PlaybackEvent>) {
        let (tx, rx) = mpsc::channel();
        let output = ClockedOutput::new(SampleTap::new(256));
        (PlaybackCoordinator::new(Box::new(output), 0.8, 256, tx), rx)
    }

    fn silent_track(seconds: f32) -> Arc<DecodedTrack> {
        let sample_rate = 1_000;
        Arc::new(DecodedTrack {
            channels: vec![vec![0.0; (seconds * sample_rate as f32) as usize]],
            sample_rate,
        })
    }

    #[test]
    fn load_signals_ready_then_features() {
        let (mut playback, rx) = coordinator();
        let generation = playback.load(silent_track(2.0)).unwrap();
        assert_eq!(generation, 1);
        assert!(playback.state().is_playing);

        match rx.recv_timeout(Duration::from_secs(5)).unwrap() {
            PlaybackEvent::TrackReady { generation, duration } => {
                assert_eq!(generation, 1);
                assert!((duration - 2.0).abs() < 1e-3);
            }
            other => panic!("unexpected {:?}", other),
        }
        match rx.recv_timeout(Duration::from_secs(5)).unwrap() {
            PlaybackEvent::FeaturesReady { generation, features } => {
                assert_eq!(generation, 1);
                assert_eq!(features.rms, 0.0);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn loading_again_bumps_generation() {
        let (mut playback, _rx) = coordinator();
        playback.load(silent_track(0.5)).unwrap();
        assert_eq!(playback.load(silent_track(0.5)).unwrap(), 2);
        assert_eq!(playback.generation(), 2);
    }

    #[test]
    fn toggle_without_track_is_noop() {
        let (mut playback, rx) = coordinator();
        assert!(!playback.toggle_play_pause().is_playing);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn toggle_flips_and_reports() {
        let (mut playback, rx) = coordinator();
        playback.load(silent_track(1.0)).unwrap();
        assert!(!playback.toggle_play_pause().is_playing);
        assert!(playback.toggle_play_pause().is_playing);

        let events: Vec<_> = rx.try_iter().collect();
        assert!(events.contains(&PlaybackEvent::Paused));
        assert!(events.contains(&PlaybackEvent::Resumed));
    }

    #[test]
    fn volume_is_clamped() {
        let (mut playback, _rx) = coordinator();
        assert_eq!(playback.set_volume(1.7), 1.0);
        assert_eq!(playback.set_volume(-0.2), 0.0);
        assert_eq!(playback.set_volume(f32::NAN), 0.0);
        assert_eq!(playback.set_volume(0.25), 0.25);
        assert_eq!(playback.state().volume, 0.25);
    }

    /// Starts once, then refuses every later source.
    struct StartsOnce {
        inner: ClockedOutput,
        started: bool,
    }

    impl MediaOutput for StartsOnce {
        fn start(&mut self, track: Arc<DecodedTrack>) -> Result<(), PlaybackError> {
            if self.started {
                return Err(PlaybackError::Stream("device disappeared".into()));
            }
            self.started = true;
            self.inner.start(track)
        }
        fn set_playing(&mut self, playing: bool) {
            self.inner.set_playing(playing);
        }
        fn set_volume(&mut self, volume: f32) {
            self.inner.set_volume(volume);
        }
        fn rewind(&mut self) {
            self.inner.rewind();
        }
        fn is_finished(&self) -> bool {
            self.inner.is_finished()
        }
    }

    #[test]
    fn failed_start_leaves_nothing_playing() {
        let (tx, rx) = mpsc::channel();
        let output = StartsOnce {
            inner: ClockedOutput::new(SampleTap::new(256)),
            started: false,
        };
        let mut playback = PlaybackCoordinator::new(Box::new(output), 0.8, 256, tx);

        playback.load(silent_track(1.0)).unwrap();
        assert!(playback.state().is_playing);

        assert!(playback.load(silent_track(1.0)).is_err());
        assert!(!playback.state().is_playing);
        assert_eq!(playback.generation(), 2);

        // No track left, so toggling stays a no-op
        assert!(!playback.toggle_play_pause().is_playing);
        assert!(!rx
            .try_iter()
            .any(|e| e == PlaybackEvent::TrackReady { generation: 2, duration: 1.0 }));
    }

    #[test]
    fn natural_end_stops_playing() {
        let (mut playback, rx) = coordinator();
        playback.load(silent_track(0.1)).unwrap();
        playback.tick(0.05);
        assert!(playback.state().is_playing);
        playback.tick(0.1);
        assert!(!playback.state().is_playing);
        assert!(rx.try_iter().any(|e| e == PlaybackEvent::TrackEnded { generation: 1 }));

        // Playing again restarts from the top
        assert!(playback.toggle_play_pause().is_playing);
        playback.tick(0.01);
        assert!(playback.state().is_playing);
    }
}
