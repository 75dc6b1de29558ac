use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use rustfft::{num_complex::Complex, Fft, FftPlanner};

use super::analysis::hann_window;
use super::features::SpectrumSnapshot;

pub const DEFAULT_MIN_DB: f32 = -100.0;
pub const DEFAULT_MAX_DB: f32 = -30.0;

/// Bounded ring of the most recently played mono samples. Written from the
/// audio callback, read by the sampler once per frame.
#[derive(Clone, Debug)]
pub struct SampleTap {
    inner: Arc<Mutex<VecDeque<f32>>>,
    capacity: usize,
}

impl SampleTap {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    pub fn push(&self, samples: &[f32]) {
        let Ok(mut ring) = self.inner.lock() else {
            return;
        };
        for &s in samples {
            if ring.len() == self.capacity {
                ring.pop_front();
            }
            ring.push_back(s);
        }
    }

    pub fn clear(&self) {
        if let Ok(mut ring) = self.inner.lock() {
            ring.clear();
        }
    }

    /// Copy the newest samples into the tail of `out`, zero-filling the head
    /// when fewer are available.
    fn copy_latest(&self, out: &mut [f32]) {
        out.fill(0.0);
        let Ok(ring) = self.inner.lock() else {
            return;
        };
        let n = ring.len().min(out.len());
        let offset = out.len() - n;
        for (dst, &src) in out[offset..].iter_mut().zip(ring.iter().skip(ring.len() - n)) {
            *dst = src;
        }
    }
}

/// Per-frame frequency snapshot of whatever the output is playing right now.
/// No history is queued: polling faster than audio arrives repeats data.
pub struct LiveSpectrumSampler {
    tap: Option<SampleTap>,
    window_size: usize,
    fft: Arc<dyn Fft<f32>>,
    hann: Vec<f32>,
    smoothing: f32,
    min_db: f32,
    max_db: f32,
    smoothed: Vec<f32>,
    samples: Vec<f32>,
    buffer: Vec<Complex<f32>>,
}

impl LiveSpectrumSampler {
    /// `window_size` must already be validated as a power of two.
    pub fn new(window_size: usize, smoothing: f32) -> Self {
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(window_size);
        Self {
            tap: None,
            window_size,
            fft,
            hann: hann_window(window_size),
            smoothing: smoothing.clamp(0.0, 1.0),
            min_db: DEFAULT_MIN_DB,
            max_db: DEFAULT_MAX_DB,
            smoothed: vec![0.0; window_size / 2],
            samples: vec![0.0; window_size],
            buffer: vec![Complex::new(0.0, 0.0); window_size],
        }
    }

    #[allow(dead_code)]
    pub fn bin_count(&self) -> usize {
        self.window_size / 2
    }

    /// Tap capacity that keeps exactly one analysis window.
    pub fn tap(&self) -> SampleTap {
        SampleTap::new(self.window_size)
    }

    pub fn attach(&mut self, tap: SampleTap) {
        self.smoothed.fill(0.0);
        self.tap = Some(tap);
    }

    /// `None` until a playback source is attached; all zeros while it is
    /// attached but silent.
    pub fn snapshot(&mut self) -> Option<SpectrumSnapshot> {
        let tap = self.tap.as_ref()?;
        tap.copy_latest(&mut self.samples);

        for ((dst, &s), &w) in self.buffer.iter_mut().zip(&self.samples).zip(&self.hann) {
            *dst = Complex::new(s * w, 0.0);
        }
        self.fft.process(&mut self.buffer);

        let n = self.window_size as f32;
        let tau = self.smoothing;
        let range = self.max_db - self.min_db;
        let bins = self
            .smoothed
            .iter_mut()
            .zip(&self.buffer)
            .map(|(smoothed, c)| {
                *smoothed = tau * *smoothed + (1.0 - tau) * (c.norm() / n);
                if *smoothed <= 0.0 {
                    return 0;
                }
                let db = 20.0 * smoothed.log10();
                (255.0 * (db - self.min_db) / range).clamp(0.0, 255.0) as u8
            })
            .collect();

        Some(SpectrumSnapshot { bins })
    }

    /// Lazy, infinite sequence of snapshots, one per `next()`.
    #[allow(dead_code)]
    pub fn stream(&mut self) -> SpectrumStream<'_> {
        SpectrumStream { sampler: self }
    }
}

pub struct SpectrumStream<'a> {
    sampler: &'a mut LiveSpectrumSampler,
}

impl Iterator for SpectrumStream<'_> {
    type Item = Option<SpectrumSnapshot>;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.sampler.snapshot())
    }
}
