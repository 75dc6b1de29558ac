use thiserror::Error;

/// Malformed or unsupported audio bytes. Decoding is deterministic, so these
/// are never retried.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("unrecognized audio format: {0}")]
    UnknownFormat(#[source] symphonia::core::errors::Error),
    #[error("no audio tracks found")]
    NoTrack,
    #[error("unknown sample rate")]
    UnknownSampleRate,
    #[error("failed to create audio decoder: {0}")]
    Codec(#[source] symphonia::core::errors::Error),
    #[error("failed to read audio packet: {0}")]
    Packet(#[source] symphonia::core::errors::Error),
    #[error("audio stream contains no samples")]
    Empty,
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("analysis window must be a power of two >= 2, got {0}")]
    InvalidWindow(usize),
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Upload or fetch failure at the ingestion service boundary.
#[derive(Debug, Error)]
pub enum IngestionError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("malformed upload response: {0}")]
    MalformedResponse(String),
    #[error("upload response has no filePath")]
    MissingFilePath,
    #[error("invalid url {0}")]
    InvalidUrl(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl std::fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShaderStage::Vertex => f.write_str("vertex"),
            ShaderStage::Fragment => f.write_str("fragment"),
        }
    }
}

/// Compile or link failure of the shading pipeline. Fatal to visuals only.
#[derive(Debug, Clone, Error)]
pub enum ShaderBuildError {
    #[error("{stage} shader failed to compile: {message}")]
    Compile { stage: ShaderStage, message: String },
    #[error("shader program failed to link: {0}")]
    Link(String),
}

/// No graphics context could be obtained.
#[derive(Debug, Error)]
pub enum DeviceUnavailableError {
    #[error("failed to create rendering surface: {0}")]
    Surface(String),
    #[error("no suitable GPU adapter found")]
    Adapter,
    #[error("failed to create GPU device: {0}")]
    Device(String),
}

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("no audio output device available")]
    NoDevice,
    #[error("failed to query output config: {0}")]
    Config(String),
    #[error("unsupported output sample format {0}")]
    UnsupportedFormat(String),
    #[error("failed to build audio stream: {0}")]
    Stream(String),
    #[error("failed to resample track: {0}")]
    Resample(String),
}

/// Per-frame draw failure. Logged by the render loop, never fatal.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("surface lost or outdated, reconfigured")]
    SurfaceLost,
    #[error("timed out acquiring the next frame")]
    Timeout,
    #[error("out of GPU memory")]
    OutOfMemory,
    #[error("no pipeline built")]
    NoPipeline,
    #[error("{0}")]
    Other(String),
}
