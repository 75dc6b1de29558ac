use std::f32::consts::TAU;

use super::particles::{Particle, MAX_PARTICLES};
use super::pipeline::FrameUniforms;
use crate::audio::features::{AudioFeatureSet, SpectrumSnapshot};

pub const NEUTRAL_COLOR: [f32; 4] = [0.5, 0.5, 0.5, 1.0];

const BASE_SPEED: f32 = 2.0;
const BASE_RIPPLE: f32 = 8.0;
/// Maps the unbounded centroid onto 0.0-1.0
const CENTROID_GAIN: f32 = 4.0;

/// `0.5 + 0.5·sin(phase)`: always within [0, 1].
pub fn brightness(phase: f32) -> f32 {
    (0.5 + 0.5 * phase.sin()).clamp(0.0, 1.0)
}

/// Color from whatever is available this frame. Neutral grey when neither
/// features nor a spectrum exist yet.
pub fn derive_color(
    features: Option<&AudioFeatureSet>,
    spectrum: Option<&SpectrumSnapshot>,
    elapsed: f32,
) -> [f32; 4] {
    if features.is_none() && spectrum.is_none() {
        return NEUTRAL_COLOR;
    }

    let rms = features.map_or(0.0, |f| f.rms.clamp(0.0, 1.0));
    let tone = features.map_or(0.0, |f| 1.0 - (-f.spectral_centroid.max(0.0) * CENTROID_GAIN).exp());
    let beat_hz = features.map_or(1.0, |f| f.tempo_estimate_bpm / 60.0);
    let (low, high) = spectrum.map_or((0.0, 0.0), |s| (s.band_level(0.0, 0.1), s.band_level(0.5, 1.0)));

    let energy = if spectrum.is_some() { (rms + low) * 0.5 } else { rms };
    let beat = brightness(elapsed * TAU * beat_hz);

    let r = 0.3 + 0.7 * energy * beat;
    let g = 0.2 + 0.6 * tone * brightness(elapsed * 0.7 + 2.0);
    let b = 0.4 + 0.6 * high.max(1.0 - tone) * brightness(elapsed * 1.3 + 4.0);

    [r.clamp(0.0, 1.0), g.clamp(0.0, 1.0), b.clamp(0.0, 1.0), 1.0]
}

pub fn build_uniforms(
    color: [f32; 4],
    elapsed: f32,
    features: Option<&AudioFeatureSet>,
    particles: &[Particle],
) -> FrameUniforms {
    let rms = features.map_or(0.0, |f| f.rms.clamp(0.0, 1.0));
    let mut uniforms = FrameUniforms {
        color,
        time: elapsed,
        particle_count: particles.len().min(MAX_PARTICLES) as u32,
        ripple: BASE_RIPPLE * (1.0 + 2.0 * rms),
        speed: BASE_SPEED,
        ..FrameUniforms::default()
    };
    for (slot, p) in uniforms.particles.iter_mut().zip(particles) {
        *slot = [p.position[0], p.position[1], p.remaining_life, 0.0];
    }
    uniforms
}
