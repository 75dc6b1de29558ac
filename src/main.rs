mod app;
mod audio;
mod cli;
mod config;
mod error;
mod ingest;
mod render;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::mpsc;
use std::sync::Arc;
use winit::event_loop::EventLoop;

use app::{App, Settings};
use cli::Cli;
use config::Config;
use ingest::IngestionClient;
use render::particles::MAX_PARTICLES;
use render::shader::ShaderProgram;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let mut cli = Cli::parse();

    let mut cfg = Config::default();
    if let Some(path) = config::find_config(cli.config.as_deref()) {
        if let Some(loaded) = config::load_config(&path) {
            log::info!("Loaded config from {}", path.display());
            cfg = loaded;
        } else {
            log::warn!("Failed to load config from {}", path.display());
        }
    }

    // Merge: config values apply only when CLI is at its default
    if cli.width == 1280 { cli.width = cfg.window.width; }
    if cli.height == 720 { cli.height = cfg.window.height; }
    if cli.window_size == 2048 { cli.window_size = cfg.audio.window_size; }
    if cli.smoothing == 0.8 { cli.smoothing = cfg.audio.smoothing; }
    if cli.volume == 1.0 { cli.volume = cfg.audio.volume; }
    if cli.particles == 100 { cli.particles = cfg.particles.count; }
    if cli.shader.is_none() { cli.shader = cfg.render.shader.clone(); }
    if cli.server.is_none() { cli.server = cfg.ingest.server.clone(); }

    audio::analysis::validate_window(cli.window_size)?;
    if cli.particles > MAX_PARTICLES {
        log::warn!("Capping particles at {} (asked for {})", MAX_PARTICLES, cli.particles);
        cli.particles = MAX_PARTICLES;
    }

    let client = Arc::new(IngestionClient::new(cli.server.clone()));

    // Feature dump mode
    if cli.json {
        let input = cli.input.as_deref().context("Input audio is required for --json")?;
        let media = client.ingest(input)?;
        let features = audio::analysis::extract_from_bytes(
            media.bytes,
            media.extension.as_deref(),
            cli.window_size,
        )?;
        println!("{}", serde_json::to_string_pretty(&features)?);
        return Ok(());
    }

    let program = match &cli.shader {
        Some(path) => ShaderProgram::from_fragment_file(path)?,
        None => ShaderProgram::embedded(),
    };

    let mut particles = cfg.particles.clone();
    particles.count = cli.particles;
    let settings = Settings {
        width: cli.width,
        height: cli.height,
        title: cfg.window.title.clone(),
        window_size: cli.window_size,
        smoothing: cli.smoothing,
        volume: cli.volume,
        fps: cli.fps,
        frames: cli.frames,
        particles,
        program,
    };

    log::info!("sonica-live - real-time audio visualizer");
    log::info!(
        "Window {}x{}, FFT {} bins, {} particles",
        settings.width,
        settings.height,
        settings.window_size / 2,
        settings.particles.count
    );

    let (ingest_tx, ingest_rx) = mpsc::channel();
    match &cli.input {
        Some(input) => {
            log::info!("Input: {}", input);
            ingest::spawn_ingest(Arc::clone(&client), input.clone(), ingest_tx.clone());
        }
        None if cli.headless => anyhow::bail!("Input audio is required for --headless"),
        None => log::info!("No input given; drop an audio file on the window to start"),
    }

    if cli.headless {
        return app::run_headless(&settings, ingest_rx);
    }

    let event_loop = EventLoop::new().context("Failed to create event loop")?;
    let mut app = App::new(settings, client, ingest_tx, ingest_rx);
    event_loop.run_app(&mut app).context("Event loop failed")?;

    match app.fatal.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
