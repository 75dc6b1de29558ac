use serde::Serialize;

/// Track-level descriptors, computed once per upload and read by the render
/// loop for the lifetime of that track.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioFeatureSet {
    /// RMS energy of the first channel, normalized to full scale (0.0-1.0)
    pub rms: f32,
    /// Bin-index-weighted magnitude sum divided by bin count
    pub spectral_centroid: f32,
    /// Placeholder heuristic, not a beat tracker
    #[serde(rename = "tempoEstimateBPM")]
    pub tempo_estimate_bpm: f32,
    pub duration_seconds: f32,
}

/// Fixed-length byte magnitudes of the live signal, valid for one frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpectrumSnapshot {
    pub bins: Vec<u8>,
}

impl SpectrumSnapshot {
    pub fn silent(len: usize) -> Self {
        Self { bins: vec![0; len] }
    }

    pub fn len(&self) -> usize {
        self.bins.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    /// Mean of a fractional band of the spectrum, normalized to 0.0-1.0.
    pub fn band_level(&self, from: f32, to: f32) -> f32 {
        let n = self.bins.len();
        let lo = ((from.clamp(0.0, 1.0) * n as f32) as usize).min(n);
        let hi = ((to.clamp(0.0, 1.0) * n as f32) as usize).min(n);
        if lo >= hi {
            return 0.0;
        }
        let sum: u32 = self.bins[lo..hi].iter().map(|&b| b as u32).sum();
        sum as f32 / ((hi - lo) as f32 * 255.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn band_level_is_normalized() {
        let snap = SpectrumSnapshot { bins: vec![255, 255, 0, 0] };
        assert_eq!(snap.band_level(0.0, 0.5), 1.0);
        assert_eq!(snap.band_level(0.5, 1.0), 0.0);
        assert_eq!(snap.band_level(0.6, 0.6), 0.0);
    }

    #[test]
    fn serializes_with_wire_names() {
        let features = AudioFeatureSet {
            rms: 0.5,
            spectral_centroid: 1.0,
            tempo_estimate_bpm: 120.0,
            duration_seconds: 2.0,
        };
        let json = serde_json::to_value(features).unwrap();
        assert_eq!(json["tempoEstimateBPM"], 120.0);
        assert_eq!(json["durationSeconds"], 2.0);
        assert_eq!(json["spectralCentroid"], 1.0);
    }
}
