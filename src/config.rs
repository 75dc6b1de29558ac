use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub window: WindowConfig,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub particles: ParticleConfig,
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
}

#[derive(Debug, Deserialize)]
pub struct WindowConfig {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_title")]
    pub title: String,
}

#[derive(Debug, Deserialize)]
pub struct AudioConfig {
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    #[serde(default = "default_smoothing")]
    pub smoothing: f32,
    #[serde(default = "default_volume")]
    pub volume: f32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ParticleConfig {
    #[serde(default = "default_particle_count")]
    pub count: usize,
    /// Life lost per frame
    #[serde(default = "default_decay")]
    pub decay: f32,
    /// Max velocity component, clip-space units per frame
    #[serde(default = "default_max_speed")]
    pub max_speed: f32,
    #[serde(default = "default_min_life")]
    pub min_life: f32,
    #[serde(default = "default_max_life")]
    pub max_life: f32,
}

#[derive(Debug, Default, Deserialize)]
pub struct RenderConfig {
    /// WGSL file replacing the embedded shader
    #[serde(default)]
    pub shader: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
pub struct IngestConfig {
    /// Base URL of the upload service
    #[serde(default)]
    pub server: Option<String>,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            title: default_title(),
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            window_size: default_window_size(),
            smoothing: default_smoothing(),
            volume: default_volume(),
        }
    }
}

impl Default for ParticleConfig {
    fn default() -> Self {
        Self {
            count: default_particle_count(),
            decay: default_decay(),
            max_speed: default_max_speed(),
            min_life: default_min_life(),
            max_life: default_max_life(),
        }
    }
}

fn default_width() -> u32 { 1280 }
fn default_height() -> u32 { 720 }
fn default_title() -> String { "sonica-live".into() }
fn default_window_size() -> usize { crate::audio::analysis::DEFAULT_WINDOW_SIZE }
fn default_smoothing() -> f32 { 0.8 }
fn default_volume() -> f32 { 1.0 }
fn default_particle_count() -> usize { 100 }
fn default_decay() -> f32 { 0.01 }
fn default_max_speed() -> f32 { 0.01 }
fn default_min_life() -> f32 { 0.5 }
fn default_max_life() -> f32 { 1.0 }

pub fn load_config(path: &Path) -> Option<Config> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            log::warn!("Invalid config {}: {}", path.display(), e);
            None
        }
    }
}

/// Explicit path, then `./sonica-live.toml`, then the user config dirs.
pub fn find_config(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = PathBuf::from("sonica-live.toml");
    if local.exists() {
        return Some(local);
    }
    if let Some(home) = dirs::home_dir() {
        let xdg = home.join(".config").join("sonica-live").join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }
    if let Some(config_dir) = dirs::config_dir() {
        let platform = config_dir.join("sonica-live").join("config.toml");
        if platform.exists() {
            return Some(platform);
        }
    }
    None
}
