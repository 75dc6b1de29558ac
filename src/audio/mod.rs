pub mod analysis;
pub mod decode;
pub mod features;
pub mod output;
pub mod playback;
pub mod resample;
pub mod spectrum;
