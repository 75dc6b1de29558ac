use super::backend::ShadingBackend;
use super::particles::{Particle, ParticleField};
use super::shader::ShaderProgram;
use super::uniforms::{build_uniforms, derive_color};
use crate::audio::features::{AudioFeatureSet, SpectrumSnapshot};
use crate::audio::playback::PlaybackEvent;
use crate::audio::spectrum::{LiveSpectrumSampler, SampleTap};
use crate::error::ShaderBuildError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderState {
    Idle,
    Initializing,
    Ready,
    Running,
    /// Terminal. Audio keeps working without visuals.
    Failed,
}

/// Everything one frame saw. Rebuilt every frame, never kept.
#[allow(dead_code)]
#[derive(Clone, Debug)]
pub struct RenderFrameState {
    pub frame_index: u64,
    pub elapsed_seconds: f32,
    pub features: Option<AudioFeatureSet>,
    pub spectrum: Option<SpectrumSnapshot>,
    pub particles: Vec<Particle>,
}

/// The render loop's owned context: pipeline backend, feature slot, particle
/// pool and live spectrum sampler all live here instead of in globals.
pub struct Visualizer<B: ShadingBackend> {
    backend: B,
    program: ShaderProgram,
    state: RenderState,
    particles: ParticleField,
    sampler: LiveSpectrumSampler,
    features: Option<AudioFeatureSet>,
    generation: u64,
    frames: u64,
}

impl<B: ShadingBackend> Visualizer<B> {
    pub fn new(
        backend: B,
        program: ShaderProgram,
        particles: ParticleField,
        sampler: LiveSpectrumSampler,
    ) -> Self {
        Self {
            backend,
            program,
            state: RenderState::Idle,
            particles,
            sampler,
            features: None,
            generation: 0,
            frames: 0,
        }
    }

    pub fn state(&self) -> RenderState {
        self.state
    }

    #[allow(dead_code)]
    pub fn features(&self) -> Option<&AudioFeatureSet> {
        self.features.as_ref()
    }

    #[allow(dead_code)]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if self.state != RenderState::Failed {
            self.backend.resize(width, height);
        }
    }

    /// Feed the live sampler from the playback output.
    pub fn attach_tap(&mut self, tap: SampleTap) {
        self.sampler.attach(tap);
    }

    /// Idle → Initializing → Ready, or Failed on a shader build error.
    pub fn initialize(&mut self) -> Result<(), ShaderBuildError> {
        if self.state != RenderState::Idle {
            log::warn!("initialize called in state {:?}", self.state);
            return Ok(());
        }

        self.state = RenderState::Initializing;
        log::info!("Building shading pipeline...");
        match self.backend.build(&self.program) {
            Ok(()) => {
                self.state = RenderState::Ready;
                log::info!("Shading pipeline ready");
                Ok(())
            }
            Err(e) => {
                self.state = RenderState::Failed;
                log::error!("Visuals disabled: {}", e);
                Err(e)
            }
        }
    }

    pub fn handle_event(&mut self, event: &PlaybackEvent) {
        match event {
            PlaybackEvent::TrackReady { generation, duration } => {
                self.generation = *generation;
                self.features = None;
                log::info!("Track {} ready ({:.1}s)", generation, duration);
                if self.state == RenderState::Ready {
                    self.state = RenderState::Running;
                    log::info!("Render loop running");
                }
            }
            PlaybackEvent::FeaturesReady { generation, features } => {
                if *generation == self.generation {
                    self.features = Some(*features);
                } else {
                    log::warn!(
                        "Dropping features for stale track {} (current {})",
                        generation,
                        self.generation
                    );
                }
            }
            PlaybackEvent::ExtractionFailed { generation, message } => {
                if *generation == self.generation {
                    log::warn!("No features for track {}: {}", generation, message);
                }
            }
            PlaybackEvent::TrackEnded { generation } => {
                log::info!("Track {} ended, visuals continue", generation);
            }
            PlaybackEvent::Paused | PlaybackEvent::Resumed => {}
        }
    }

    /// One loop iteration. Only draws while Running; a draw error is logged
    /// and the loop carries on.
    pub fn frame(&mut self, elapsed: f32) -> Option<RenderFrameState> {
        if self.state != RenderState::Running {
            return None;
        }

        self.particles.advance();
        let spectrum = self.sampler.snapshot();
        let color = derive_color(self.features.as_ref(), spectrum.as_ref(), elapsed);
        let uniforms = build_uniforms(color, elapsed, self.features.as_ref(), self.particles.particles());

        if let Err(e) = self.backend.draw(&uniforms) {
            log::warn!("Frame {} not drawn: {}", self.frames, e);
        }

        let frame_state = RenderFrameState {
            frame_index: self.frames,
            elapsed_seconds: elapsed,
            features: self.features,
            spectrum,
            particles: self.particles.particles().to_vec(),
        };
        self.frames += 1;
        if self.frames % 600 == 0 {
            log::debug!("Frame {} at {:.1}s", self.frames, elapsed);
        }
        Some(frame_state)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::ParticleConfig;
    use crate::error::FrameError;
    use crate::render::pipeline::FrameUniforms;
    use crate::render::uniforms::NEUTRAL_COLOR;

    /// Validates shaders for real (CPU side) and records what it was asked
    /// to draw.
    #[derive(Default)]
    pub(crate) struct RecordingBackend {
        pub built: bool,
        pub draws: Vec<FrameUniforms>,
        pub fail_draws: bool,
    }

    impl ShadingBackend for RecordingBackend {
        fn build(&mut self, program: &ShaderProgram) -> Result<(), ShaderBuildError> {
            program.validate()?;
            self.built = true;
            Ok(())
        }

        fn draw(&mut self, uniforms: &FrameUniforms) -> Result<(), FrameError> {
            if self.fail_draws {
                return Err(FrameError::Timeout);
            }
            self.draws.push(*uniforms);
            Ok(())
        }
    }

    pub(crate) fn visualizer(program: ShaderProgram) -> Visualizer<RecordingBackend> {
        Visualizer::new(
            RecordingBackend::default(),
            program,
            ParticleField::seeded(&ParticleConfig::default(), 9),
            LiveSpectrumSampler::new(256, 0.8),
        )
    }

    fn features() -> AudioFeatureSet {
        AudioFeatureSet {
            rms: 0.4,
            spectral_centroid: 0.2,
            tempo_estimate_bpm: 120.0,
            duration_seconds: 3.0,
        }
    }

    #[test]
    fn starts_idle_and_becomes_ready() {
        let mut vis = visualizer(ShaderProgram::embedded());
        assert_eq!(vis.state(), RenderState::Idle);
        vis.initialize().unwrap();
        assert_eq!(vis.state(), RenderState::Ready);
        assert!(vis.backend().built);
    }

    #[test]
    fn ready_waits_for_track() {
        let mut vis = visualizer(ShaderProgram::embedded());
        vis.initialize().unwrap();
        assert!(vis.frame(0.0).is_none());

        vis.handle_event(&PlaybackEvent::TrackReady { generation: 1, duration: 2.0 });
        assert_eq!(vis.state(), RenderState::Running);
        let frame = vis.frame(0.016).unwrap();
        assert_eq!(frame.frame_index, 0);
        assert_eq!(frame.particles.len(), 100);
        assert!(frame.features.is_none());
        assert!(frame.spectrum.is_none());
    }

    #[test]
    fn renders_neutral_before_features_arrive() {
        let mut vis = visualizer(ShaderProgram::embedded());
        vis.initialize().unwrap();
        vis.handle_event(&PlaybackEvent::TrackReady { generation: 1, duration: 2.0 });
        vis.frame(0.5).unwrap();
        assert_eq!(vis.backend().draws[0].color, NEUTRAL_COLOR);
    }

    #[test]
    fn syntax_error_fails_and_never_runs() {
        let mut vis = visualizer(ShaderProgram::with_fragment("fn broken( {"));
        assert!(vis.initialize().is_err());
        assert_eq!(vis.state(), RenderState::Failed);

        vis.handle_event(&PlaybackEvent::TrackReady { generation: 1, duration: 1.0 });
        assert_eq!(vis.state(), RenderState::Failed);
        assert!(vis.frame(1.0).is_none());
        assert!(vis.backend().draws.is_empty());
    }

    #[test]
    fn stale_features_are_ignored() {
        let mut vis = visualizer(ShaderProgram::embedded());
        vis.initialize().unwrap();
        vis.handle_event(&PlaybackEvent::TrackReady { generation: 1, duration: 2.0 });
        vis.handle_event(&PlaybackEvent::TrackReady { generation: 2, duration: 2.0 });

        // Extraction for track 1 finishes after track 2 was loaded
        vis.handle_event(&PlaybackEvent::FeaturesReady { generation: 1, features: features() });
        assert!(vis.features().is_none());

        vis.handle_event(&PlaybackEvent::FeaturesReady { generation: 2, features: features() });
        assert_eq!(vis.features(), Some(&features()));
    }

    #[test]
    fn new_track_clears_feature_slot() {
        let mut vis = visualizer(ShaderProgram::embedded());
        vis.initialize().unwrap();
        vis.handle_event(&PlaybackEvent::TrackReady { generation: 1, duration: 2.0 });
        vis.handle_event(&PlaybackEvent::FeaturesReady { generation: 1, features: features() });
        vis.handle_event(&PlaybackEvent::TrackReady { generation: 2, duration: 2.0 });
        assert!(vis.features().is_none());
        assert_eq!(vis.state(), RenderState::Running);
    }

    #[test]
    fn draw_errors_do_not_stop_the_loop() {
        let mut vis = visualizer(ShaderProgram::embedded());
        vis.initialize().unwrap();
        vis.handle_event(&PlaybackEvent::TrackReady { generation: 1, duration: 2.0 });
        vis.backend.fail_draws = true;
        for i in 0..5 {
            assert!(vis.frame(i as f32 * 0.016).is_some());
        }
        assert_eq!(vis.state(), RenderState::Running);
    }

    #[test]
    fn pause_does_not_freeze_visuals() {
        let mut vis = visualizer(ShaderProgram::embedded());
        vis.initialize().unwrap();
        vis.handle_event(&PlaybackEvent::TrackReady { generation: 1, duration: 2.0 });
        let before = vis.frame(0.0).unwrap();
        vis.handle_event(&PlaybackEvent::Paused);
        let after = vis.frame(0.016).unwrap();
        assert_eq!(vis.state(), RenderState::Running);
        assert_eq!(after.frame_index, before.frame_index + 1);
        assert_ne!(after.particles, before.particles);
    }

    #[test]
    fn initialize_twice_is_harmless() {
        let mut vis = visualizer(ShaderProgram::embedded());
        vis.initialize().unwrap();
        vis.initialize().unwrap();
        assert_eq!(vis.state(), RenderState::Ready);
    }
}
