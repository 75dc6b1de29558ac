use rayon::prelude::*;
use rubato::{Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction};

use super::decode::DecodedTrack;
use crate::error::PlaybackError;

/// Convert every channel of `track` to `to_rate` in one pass. Returns a clone
/// when the rates already match.
pub fn resample_track(track: &DecodedTrack, to_rate: u32) -> Result<DecodedTrack, PlaybackError> {
    if track.sample_rate == to_rate {
        return Ok(track.clone());
    }
    if to_rate == 0 || track.sample_rate == 0 {
        return Err(PlaybackError::Resample(format!(
            "cannot convert {}Hz to {}Hz",
            track.sample_rate, to_rate
        )));
    }

    let ratio = to_rate as f64 / track.sample_rate as f64;
    let channels = track
        .channels
        .par_iter()
        .map(|samples| resample_channel(samples, ratio))
        .collect::<Result<Vec<_>, _>>()?;

    log::info!(
        "Resampled {} ch from {}Hz to {}Hz ({} -> {} frames)",
        channels.len(),
        track.sample_rate,
        to_rate,
        track.frames(),
        channels.first().map_or(0, |c| c.len())
    );

    Ok(DecodedTrack {
        channels,
        sample_rate: to_rate,
    })
}

fn resample_channel(samples: &[f32], ratio: f64) -> Result<Vec<f32>, PlaybackError> {
    if samples.is_empty() {
        return Ok(Vec::new());
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, samples.len(), 1)
        .map_err(|e| PlaybackError::Resample(e.to_string()))?;

    let input = vec![samples.to_vec()];
    let output = resampler
        .process(&input, None)
        .map_err(|e| PlaybackError::Resample(e.to_string()))?;

    Ok(output.into_iter().next().unwrap_or_default())
}
