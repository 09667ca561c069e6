//! Spectrum analysis for audio blocks
//!
//! Runs on the graph thread, never inside the render callback. The analyzer
//! keeps its FFT plan and scratch buffers between calls so a steady stream of
//! equally-sized blocks does not allocate.

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::f32::consts::PI;
use std::sync::Arc;

/// Default FFT size for analyzer objects
pub const DEFAULT_FFT_SIZE: usize = 1024;

/// Window function applied before the transform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WindowFunction {
    Rectangular,
    #[default]
    Hann,
    Hamming,
    Blackman,
}

impl WindowFunction {
    pub fn coefficient(&self, i: usize, n: usize) -> f32 {
        let x = i as f32 / n as f32;
        match self {
            WindowFunction::Rectangular => 1.0,
            WindowFunction::Hann => 0.5 * (1.0 - (2.0 * PI * x).cos()),
            WindowFunction::Hamming => 0.54 - 0.46 * (2.0 * PI * x).cos(),
            // Clamped: endpoints can round to -epsilon
            WindowFunction::Blackman => {
                (0.42 - 0.5 * (2.0 * PI * x).cos() + 0.08 * (4.0 * PI * x).cos()).max(0.0)
            }
        }
    }

    pub fn generate(&self, n: usize) -> Vec<f32> {
        (0..n).map(|i| self.coefficient(i, n)).collect()
    }
}

/// Root mean square of a block. Empty blocks are silent.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    (sum / samples.len() as f32).sqrt()
}

/// Fixed-size magnitude spectrum analyzer
pub struct SpectrumAnalyzer {
    size: usize,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    buffer: Vec<Complex<f32>>,
    magnitudes: Vec<f32>,
}

impl SpectrumAnalyzer {
    /// `size` is rounded up to a power of two.
    pub fn new(size: usize, window: WindowFunction) -> Self {
        let size = size.max(2).next_power_of_two();
        let fft = FftPlanner::new().plan_fft_forward(size);
        Self {
            size,
            fft,
            window: window.generate(size),
            buffer: vec![Complex::new(0.0, 0.0); size],
            magnitudes: vec![0.0; size / 2 + 1],
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn bin_count(&self) -> usize {
        self.magnitudes.len()
    }

    /// Frequency of bin `bin` at `sample_rate`
    pub fn bin_frequency(&self, bin: usize, sample_rate: u32) -> f32 {
        bin as f32 * sample_rate as f32 / self.size as f32
    }

    /// Transform the most recent `size` samples (zero-padded if shorter) and
    /// return single-sided linear magnitudes.
    pub fn compute(&mut self, samples: &[f32]) -> &[f32] {
        let start = samples.len().saturating_sub(self.size);
        let tail = &samples[start..];

        for (i, slot) in self.buffer.iter_mut().enumerate() {
            let s = tail.get(i).copied().unwrap_or(0.0);
            *slot = Complex::new(s * self.window[i], 0.0);
        }
        self.fft.process(&mut self.buffer);

        let scale = 2.0 / self.size as f32;
        for (mag, c) in self.magnitudes.iter_mut().zip(&self.buffer) {
            *mag = c.norm() * scale;
        }
        &self.magnitudes
    }

    /// Collapse the last spectrum into `count` bands of equal bin width.
    pub fn bands(&self, count: usize) -> Vec<f32> {
        if count == 0 {
            return Vec::new();
        }
        let per_band = (self.magnitudes.len() / count).max(1);
        self.magnitudes
            .chunks(per_band)
            .take(count)
            .map(|chunk| chunk.iter().sum::<f32>() / chunk.len() as f32)
            .collect()
    }

    /// Bin index holding the largest magnitude of the last spectrum, DC excluded.
    pub fn peak_bin(&self) -> Option<usize> {
        self.magnitudes
            .iter()
            .enumerate()
            .skip(1)
            .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(i, _)| i)
    }
}
