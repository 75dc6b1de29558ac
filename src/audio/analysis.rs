use rayon::prelude::*;
use rustfft::{num_complex::Complex, FftPlanner};

use super::decode::{decode_bytes, DecodedTrack};
use super::features::AudioFeatureSet;
use crate::error::AnalysisError;

pub const DEFAULT_WINDOW_SIZE: usize = 2048;

/// Reference tempo the placeholder heuristic scales from.
const BASE_BPM: f32 = 120.0;

/// Decode then compute. This is what the extraction worker runs per upload.
pub fn extract_from_bytes(
    bytes: Vec<u8>,
    extension: Option<&str>,
    window_size: usize,
) -> Result<AudioFeatureSet, AnalysisError> {
    validate_window(window_size)?;
    let track = decode_bytes(bytes, extension)?;
    extract_features(&track, window_size)
}

/// One pass over the first channel of a decoded track.
pub fn extract_features(track: &DecodedTrack, window_size: usize) -> Result<AudioFeatureSet, AnalysisError> {
    validate_window(window_size)?;

    let samples = track.first_channel();
    let duration = track.duration();

    let rms = rms(samples);
    let tempo = estimate_tempo(samples.len(), track.sample_rate, duration);
    let spectrum = mean_spectrum(samples, window_size);
    let centroid = spectral_centroid(&spectrum);

    log::info!(
        "Features: rms={:.4}, centroid={:.4}, tempo={:.1} BPM (placeholder), duration={:.2}s",
        rms, centroid, tempo, duration
    );

    Ok(AudioFeatureSet {
        rms,
        spectral_centroid: centroid,
        tempo_estimate_bpm: tempo,
        duration_seconds: duration,
    })
}

pub fn validate_window(window_size: usize) -> Result<(), AnalysisError> {
    if window_size < 2 || !window_size.is_power_of_two() {
        return Err(AnalysisError::InvalidWindow(window_size));
    }
    Ok(())
}

pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples.par_iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum / samples.len() as f64).sqrt() as f32
}

/// Placeholder tempo: the sample count per second of audio, relative to the
/// sample rate, scaled to a reference tempo. No onset detection happens here;
/// for consistent input this is always `BASE_BPM`.
pub fn estimate_tempo(sample_count: usize, sample_rate: u32, duration: f32) -> f32 {
    if sample_rate == 0 || duration <= 0.0 {
        return BASE_BPM;
    }
    let bpm = BASE_BPM * (sample_count as f32 / duration) / sample_rate as f32;
    if bpm.is_finite() && bpm > 0.0 {
        bpm
    } else {
        BASE_BPM
    }
}

/// `Σ(i · mag_i) / bin_count`. Not normalized by total magnitude, so the
/// result is linear in the magnitudes.
pub fn spectral_centroid(magnitudes: &[f32]) -> f32 {
    if magnitudes.is_empty() {
        return 0.0;
    }
    let weighted: f32 = magnitudes
        .iter()
        .enumerate()
        .map(|(i, &mag)| i as f32 * mag)
        .sum();
    weighted / magnitudes.len() as f32
}

/// Mean amplitude spectrum (`window_size / 2` bins) over half-overlapping
/// Hann-windowed hops. Input shorter than one window is zero-padded.
pub fn mean_spectrum(samples: &[f32], window_size: usize) -> Vec<f32> {
    let half = window_size / 2;
    let hop = half.max(1);

    let positions: Vec<usize> = if samples.len() <= window_size {
        vec![0]
    } else {
        (0..=samples.len() - window_size).step_by(hop).collect()
    };

    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(window_size);
    let hann = hann_window(window_size);
    let scale = 2.0 / window_size as f32;

    let summed = positions
        .par_iter()
        .map(|&pos| {
            let end = (pos + window_size).min(samples.len());
            let mut buffer = vec![Complex::new(0.0f32, 0.0); window_size];
            for (i, &s) in samples[pos..end].iter().enumerate() {
                buffer[i] = Complex::new(s * hann[i], 0.0);
            }
            fft.process(&mut buffer);
            buffer[..half].iter().map(|c| c.norm() * scale).collect::<Vec<f32>>()
        })
        .reduce(
            || vec![0.0f32; half],
            |mut acc, mags| {
                acc.iter_mut().zip(mags).for_each(|(a, m)| *a += m);
                acc
            },
        );

    let count = positions.len() as f32;
    summed.into_iter().map(|m| m / count).collect()
}

pub fn hann_window(size: usize) -> Vec<f32> {
    if size < 2 {
        return vec![1.0; size];
    }
    (0..size)
        .map(|i| {
            0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / (size - 1) as f32).cos())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::decode::tests::{sine, wav_bytes};

    #[test]
    fn full_scale_sine_rms() {
        let bytes = wav_bytes(&sine(440.0, 1.0, 44_100), 44_100);
        let features = extract_from_bytes(bytes, Some("wav"), DEFAULT_WINDOW_SIZE).unwrap();
        assert!((features.rms - 0.707).abs() < 0.01, "rms = {}", features.rms);
        assert!((features.duration_seconds - 1.0).abs() < 0.01);
        assert!(features.tempo_estimate_bpm > 0.0);
    }

    #[test]
    fn silent_buffer_has_zero_rms() {
        let bytes = wav_bytes(&vec![0.0; 2 * 22_050], 22_050);
        let features = extract_from_bytes(bytes, Some("wav"), DEFAULT_WINDOW_SIZE).unwrap();
        assert_eq!(features.rms, 0.0);
        assert_eq!(features.spectral_centroid, 0.0);
        assert!((features.duration_seconds - 2.0).abs() < 0.01);
    }

    #[test]
    fn rms_stays_within_full_scale() {
        let square: Vec<f32> = (0..4096).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        let r = rms(&square);
        assert!((0.0..=1.0).contains(&r));
        assert!((r - 1.0).abs() < 1e-6);
        assert_eq!(rms(&[]), 0.0);
    }

    #[test]
    fn centroid_scales_linearly_with_magnitude() {
        let mags = [0.1f32, 0.4, 0.2, 0.9, 0.0, 0.3];
        let base = spectral_centroid(&mags);
        let scaled: Vec<f32> = mags.iter().map(|m| m * 3.0).collect();
        assert!((spectral_centroid(&scaled) - 3.0 * base).abs() < 1e-5);
    }

    #[test]
    fn centroid_uses_bin_count_denominator() {
        // Σ i·mag = 0·1 + 1·1 + 2·1 + 3·1 = 6, over 4 bins
        assert_eq!(spectral_centroid(&[1.0, 1.0, 1.0, 1.0]), 1.5);
        assert_eq!(spectral_centroid(&[]), 0.0);
    }

    #[test]
    fn spectrum_peaks_at_tone_bin() {
        let sr = 8_192;
        // 512 Hz with a 1024 window at 8192 Hz lands exactly on bin 64
        let samples = sine(512.0, 1.0, sr);
        let spectrum = mean_spectrum(&samples, 1024);
        assert_eq!(spectrum.len(), 512);
        let peak = spectrum
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(peak, 64);
    }

    #[test]
    fn short_input_is_zero_padded() {
        let spectrum = mean_spectrum(&[0.5; 10], 64);
        assert_eq!(spectrum.len(), 32);
        assert!(spectrum[0] > 0.0);
    }

    #[test]
    fn tempo_placeholder_is_reference_for_consistent_input() {
        assert_eq!(estimate_tempo(44_100, 44_100, 1.0), 120.0);
        assert_eq!(estimate_tempo(10, 0, 1.0), 120.0);
        assert_eq!(estimate_tempo(0, 44_100, 1.0), 120.0);
    }

    #[test]
    fn window_must_be_power_of_two() {
        assert!(validate_window(2048).is_ok());
        assert!(matches!(validate_window(1000), Err(AnalysisError::InvalidWindow(1000))));
        assert!(validate_window(1).is_err());
        assert!(validate_window(0).is_err());
    }

    #[test]
    fn garbage_bytes_fail_with_decode_error() {
        let err = extract_from_bytes(vec![1, 2, 3, 4], None, DEFAULT_WINDOW_SIZE).unwrap_err();
        assert!(matches!(err, AnalysisError::Decode(_)));
    }
}
