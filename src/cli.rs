use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "sonica-live", about = "Real-time audio visualizer driven by live playback")]
pub struct Cli {
    /// Audio file path or http(s) URL (WAV, MP3, FLAC, OGG, AAC)
    pub input: Option<String>,

    /// Upload service base URL; local files are uploaded there first
    #[arg(long)]
    pub server: Option<String>,

    /// Window width in pixels
    #[arg(long, default_value_t = 1280)]
    pub width: u32,

    /// Window height in pixels
    #[arg(long, default_value_t = 720)]
    pub height: u32,

    /// FFT window size for analysis and the live spectrum (power of two)
    #[arg(long, default_value_t = 2048)]
    pub window_size: usize,

    /// Live spectrum smoothing (0.0-1.0)
    #[arg(long, default_value_t = 0.8)]
    pub smoothing: f32,

    /// Number of particles (max 128)
    #[arg(long, default_value_t = 100)]
    pub particles: usize,

    /// Initial playback volume (0.0-1.0)
    #[arg(long, default_value_t = 1.0)]
    pub volume: f32,

    /// Custom WGSL fragment shader (entry point `fs_main`)
    #[arg(long)]
    pub shader: Option<PathBuf>,

    /// Render offscreen without a window or audio device
    #[arg(long)]
    pub headless: bool,

    /// Headless only: stop after this many frames instead of at track end
    #[arg(long)]
    pub frames: Option<u64>,

    /// Headless frame rate
    #[arg(long, default_value_t = 60)]
    pub fps: u32,

    /// Print the extracted feature set as JSON and exit
    #[arg(long)]
    pub json: bool,

    /// Config file (defaults to ./sonica-live.toml or the user config dir)
    #[arg(long)]
    pub config: Option<PathBuf>,
}
