use anyhow::{Context, Result};
use std::ops::ControlFlow;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::time::Duration;

use winit::application::ApplicationHandler;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::ActiveEventLoop;
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowId};

use crate::audio::output::{ClockedOutput, CpalOutput, MediaOutput};
use crate::audio::playback::{PlaybackCoordinator, PlaybackEvent, PlaybackState};
use crate::audio::spectrum::{LiveSpectrumSampler, SampleTap};
use crate::config::ParticleConfig;
use crate::ingest::{self, IngestEvent, IngestionClient};
use crate::render::backend::{ShadingBackend, WgpuBackend};
use crate::render::controller::{RenderFrameState, RenderState, Visualizer};
use crate::render::frame::FrameTarget;
use crate::render::gpu::GpuContext;
use crate::render::particles::ParticleField;
use crate::render::scheduler::{FrameScheduler, FrameTick, ManualClock, SystemClock};
use crate::render::shader::ShaderProgram;

const VOLUME_STEP: f32 = 0.1;

/// Resolved runtime settings (CLI merged over config).
#[derive(Clone, Debug)]
pub struct Settings {
    pub width: u32,
    pub height: u32,
    pub title: String,
    pub window_size: usize,
    pub smoothing: f32,
    pub volume: f32,
    pub fps: u32,
    pub frames: Option<u64>,
    pub particles: ParticleConfig,
    pub program: ShaderProgram,
}

/// Per-frame glue between playback and visuals, shared by both hosts.
pub struct Session<B: ShadingBackend> {
    visualizer: Visualizer<B>,
    playback: PlaybackCoordinator,
    playback_events: Receiver<PlaybackEvent>,
    ingest_events: Receiver<IngestEvent>,
    loaded: bool,
    ingest_failed: bool,
}

impl<B: ShadingBackend> Session<B> {
    /// Hands `make_output` the tap the sampler reads, then builds both sides.
    pub fn new(
        backend: B,
        settings: &Settings,
        ingest_events: Receiver<IngestEvent>,
        make_output: impl FnOnce(SampleTap) -> Box<dyn MediaOutput>,
    ) -> Self {
        let sampler = LiveSpectrumSampler::new(settings.window_size, settings.smoothing);
        let tap = sampler.tap();
        let output = make_output(tap.clone());

        let (tx, rx) = mpsc::channel();
        let playback = PlaybackCoordinator::new(output, settings.volume, settings.window_size, tx);
        let mut visualizer = Visualizer::new(
            backend,
            settings.program.clone(),
            ParticleField::new(&settings.particles),
            sampler,
        );
        visualizer.attach_tap(tap);

        Self {
            visualizer,
            playback,
            playback_events: rx,
            ingest_events,
            loaded: false,
            ingest_failed: false,
        }
    }

    pub fn initialize(&mut self) -> Result<(), crate::error::ShaderBuildError> {
        self.visualizer.initialize()
    }

    pub fn handle_ingest(&mut self, event: IngestEvent) {
        match event {
            IngestEvent::Decoded { source, track } => match self.playback.load(track) {
                Ok(generation) => {
                    self.loaded = true;
                    self.ingest_failed = false;
                    log::info!("Playing {} (track {})", source, generation);
                }
                Err(e) => log::error!("Cannot play {}: {}", source, e),
            },
            IngestEvent::Failed { source, message } => {
                self.ingest_failed = true;
                log::error!("Failed to load {}: {}", source, message);
            }
        }
    }

    /// One iteration: take finished ingestion, advance playback, deliver
    /// events, then render.
    pub fn frame(&mut self, tick: FrameTick) -> Option<RenderFrameState> {
        while let Ok(event) = self.ingest_events.try_recv() {
            self.handle_ingest(event);
        }
        self.playback.tick(tick.dt);
        while let Ok(event) = self.playback_events.try_recv() {
            self.visualizer.handle_event(&event);
        }
        self.visualizer.frame(tick.elapsed)
    }

    pub fn toggle_play_pause(&mut self) -> PlaybackState {
        self.playback.toggle_play_pause()
    }

    pub fn nudge_volume(&mut self, delta: f32) -> f32 {
        let volume = self.playback.state().volume + delta;
        self.playback.set_volume(volume)
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.visualizer.resize(width, height);
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.playback.state()
    }

    #[allow(dead_code)]
    pub fn generation(&self) -> u64 {
        self.playback.generation()
    }

    pub fn render_state(&self) -> RenderState {
        self.visualizer.state()
    }

    /// A track was loaded and has stopped, or loading failed outright.
    pub fn is_done(&self) -> bool {
        self.ingest_failed || (self.loaded && !self.playback.state().is_playing)
    }
}

/// Offscreen rendering on a fixed-step clock until the track ends or the
/// frame budget runs out.
pub fn run_headless(settings: &Settings, ingest_events: Receiver<IngestEvent>) -> Result<()> {
    let gpu = GpuContext::headless().context("Graphics device unavailable")?;
    let target = FrameTarget::offscreen(&gpu, settings.width, settings.height);
    let backend = WgpuBackend::new(gpu, target);

    let (_idle, no_more_ingest) = mpsc::channel();
    let mut session = Session::new(backend, settings, no_more_ingest, |tap| {
        Box::new(ClockedOutput::new(tap))
    });
    if let Err(e) = session.initialize() {
        eprintln!("Visuals disabled: {}", e);
    }

    let first = ingest_events
        .recv()
        .context("Ingestion worker exited without a result")?;
    session.handle_ingest(first);

    let clock = ManualClock::new();
    let step = Duration::from_secs_f64(1.0 / settings.fps.max(1) as f64);
    let mut scheduler = FrameScheduler::new(clock.clone());
    let mut drawn = 0u64;

    let ran = scheduler.run_until(|tick| {
        if session.frame(tick).is_some() {
            drawn += 1;
        }
        clock.advance(step);
        let budget_spent = settings.frames.is_some_and(|n| tick.index + 1 >= n);
        if budget_spent || (settings.frames.is_none() && session.is_done()) {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    });

    log::info!(
        "Headless run finished: {} frames, {} drawn, final state {:?}, playing: {}",
        ran,
        drawn,
        session.render_state(),
        session.playback_state().is_playing
    );
    Ok(())
}

/// Windowed host. Frames are scheduled off the redraw callback, which
/// re-requests itself. Dropping a file on the window loads it in place of the
/// current track.
pub struct App {
    settings: Settings,
    client: Arc<IngestionClient>,
    ingest_tx: Sender<IngestEvent>,
    ingest_events: Option<Receiver<IngestEvent>>,
    window: Option<Arc<Window>>,
    session: Option<Session<WgpuBackend>>,
    scheduler: FrameScheduler<SystemClock>,
    pub fatal: Option<anyhow::Error>,
}

impl App {
    pub fn new(
        settings: Settings,
        client: Arc<IngestionClient>,
        ingest_tx: Sender<IngestEvent>,
        ingest_events: Receiver<IngestEvent>,
    ) -> Self {
        Self {
            settings,
            client,
            ingest_tx,
            ingest_events: Some(ingest_events),
            window: None,
            session: None,
            scheduler: FrameScheduler::new(SystemClock::new()),
            fatal: None,
        }
    }

    fn start(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let attributes = Window::default_attributes()
            .with_title(self.settings.title.clone())
            .with_inner_size(winit::dpi::LogicalSize::new(
                self.settings.width,
                self.settings.height,
            ));
        let window = Arc::new(
            event_loop
                .create_window(attributes)
                .context("Failed to create window")?,
        );

        let size = window.inner_size();
        let (gpu, surface) =
            GpuContext::for_window(Arc::clone(&window)).context("Graphics device unavailable")?;
        let target = FrameTarget::surface(&gpu, surface, size.width, size.height)
            .context("Graphics device unavailable")?;
        let backend = WgpuBackend::new(gpu, target);

        let ingest_events = self
            .ingest_events
            .take()
            .context("Window already initialized")?;
        let volume = self.settings.volume;
        let mut session = Session::new(backend, &self.settings, ingest_events, |tap| {
            match CpalOutput::new(tap.clone(), volume) {
                Ok(output) => Box::new(output),
                Err(e) => {
                    log::error!("Audio output unavailable, continuing silently: {}", e);
                    Box::new(ClockedOutput::new(tap))
                }
            }
        });
        if let Err(e) = session.initialize() {
            eprintln!("Visuals disabled: {}", e);
        }

        log::info!("Space: play/pause, Up/Down: volume, Esc: quit, drop a file to load it");
        window.request_redraw();
        self.window = Some(window);
        self.session = Some(session);
        Ok(())
    }

    fn handle_key(&mut self, event_loop: &ActiveEventLoop, code: KeyCode) {
        if code == KeyCode::Escape {
            event_loop.exit();
            return;
        }
        let Some(session) = self.session.as_mut() else {
            return;
        };
        match code {
            KeyCode::Space => {
                session.toggle_play_pause();
            }
            KeyCode::ArrowUp => {
                let v = session.nudge_volume(VOLUME_STEP);
                log::info!("Volume {:.0}%", v * 100.0);
            }
            KeyCode::ArrowDown => {
                let v = session.nudge_volume(-VOLUME_STEP);
                log::info!("Volume {:.0}%", v * 100.0);
            }
            _ => {}
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(e) = self.start(event_loop) {
            log::error!("{:#}", e);
            eprintln!("{:#}", e);
            self.fatal = Some(e);
            event_loop.exit();
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::DroppedFile(path) => {
                log::info!("Loading dropped file {}", path.display());
                ingest::spawn_ingest(
                    Arc::clone(&self.client),
                    path.display().to_string(),
                    self.ingest_tx.clone(),
                );
            }
            WindowEvent::Resized(size) => {
                if let Some(session) = self.session.as_mut() {
                    session.resize(size.width, size.height);
                }
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        state: ElementState::Pressed,
                        physical_key: PhysicalKey::Code(code),
                        repeat: false,
                        ..
                    },
                ..
            } => self.handle_key(event_loop, code),
            WindowEvent::RedrawRequested => {
                let tick = self.scheduler.tick();
                if let Some(session) = self.session.as_mut() {
                    session.frame(tick);
                }
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
            _ => {}
        }
    }
}
