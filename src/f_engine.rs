use std::{f64::consts::PI, sync::Arc};

use rustfft::{num_complex::Complex, Fft, FftPlanner};

use crate::{SampleBlock, BLOCK_SIZE, SPECTRUM_BINS};

// For each sealed block of BLOCK_SIZE samples, to get a magnitude spectrum we
// * remove the DC bias (mean)
// * multiply with the Hamming window
// * FFT
// * keep |X[k]| for the first half, the rest is the mirror image for real input

/// Symmetric Hamming window coefficient for sample `index` of `size`
pub fn hamming_window(index: usize, size: usize) -> f64 {
    0.54 - 0.46 * ((2.0 * PI * index as f64) / (size as f64 - 1.0)).cos()
}

/// Magnitude spectrum of one block
#[derive(Debug, Clone, PartialEq)]
pub struct SpectrumResult {
    magnitudes: Vec<f64>,
    sample_rate: f64,
    block_seq: u64,
}

impl SpectrumResult {
    /// Unnormalized magnitudes, bin `k` at `k * sample_rate / BLOCK_SIZE` Hz
    pub fn magnitudes(&self) -> &[f64] {
        &self.magnitudes
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Sequence number of the block this was computed from
    pub fn block_seq(&self) -> u64 {
        self.block_seq
    }

    /// Width of one bin in Hz
    pub fn bin_width(&self) -> f64 {
        self.sample_rate / BLOCK_SIZE as f64
    }

    pub fn bin_frequency(&self, bin: usize) -> f64 {
        bin as f64 * self.bin_width()
    }

    /// Strongest bin, ignoring DC, as `(bin, frequency, magnitude)`
    pub fn peak(&self) -> Option<(usize, f64, f64)> {
        self.magnitudes
            .iter()
            .enumerate()
            .skip(1)
            .fold(None, |best: Option<(usize, f64)>, (i, &m)| match best {
                Some((_, bm)) if bm >= m => best,
                _ => Some((i, m)),
            })
            .map(|(i, m)| (i, self.bin_frequency(i), m))
    }
}

/// Fixed-size windowed FFT. Holds only the plan and the window table, both immutable,
/// so `compute` is a pure function of the block.
pub struct SpectrumEngine {
    fft: Arc<dyn Fft<f64>>,
    window: Vec<f64>,
    sample_rate: f64,
}

impl SpectrumEngine {
    pub fn new(sample_rate: u32) -> Self {
        let mut planner = FftPlanner::new();
        Self {
            fft: planner.plan_fft_forward(BLOCK_SIZE),
            window: (0..BLOCK_SIZE)
                .map(|i| hamming_window(i, BLOCK_SIZE))
                .collect(),
            sample_rate: sample_rate as f64,
        }
    }

    pub fn compute(&self, block: &SampleBlock) -> SpectrumResult {
        let samples = block.samples();
        let mean = samples.iter().map(|&s| s as f64).sum::<f64>() / BLOCK_SIZE as f64;
        let mut buf: Vec<Complex<f64>> = samples
            .iter()
            .zip(&self.window)
            .map(|(&s, w)| Complex::new((s as f64 - mean) * w, 0.0))
            .collect();
        self.fft.process(&mut buf);
        SpectrumResult {
            magnitudes: buf[..SPECTRUM_BINS].iter().map(|c| c.norm()).collect(),
            sample_rate: self.sample_rate,
            block_seq: block.seq(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SAMPLE_RATE_HZ;

    fn sine_block(freq: f64, sample_rate: f64) -> SampleBlock {
        let mut samples = [0u16; BLOCK_SIZE];
        for (i, s) in samples.iter_mut().enumerate() {
            let t = i as f64 / sample_rate;
            *s = (2048.0 + 1500.0 * (2.0 * PI * freq * t).sin()).round() as u16;
        }
        SampleBlock::from_array(0, samples)
    }

    #[test]
    fn test_hamming_window() {
        let size = BLOCK_SIZE;
        assert!((hamming_window(0, size) - 0.08).abs() < 1e-12);
        assert!((hamming_window(size - 1, size) - 0.08).abs() < 1e-12);
        // Symmetric, peaks near the middle
        assert!((hamming_window(10, size) - hamming_window(size - 11, size)).abs() < 1e-12);
        assert!((hamming_window(size / 2, size) - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_constant_block_is_silent() {
        let engine = SpectrumEngine::new(SAMPLE_RATE_HZ);
        let block = SampleBlock::from_array(3, [2048u16; BLOCK_SIZE]);
        let spec = engine.compute(&block);
        assert_eq!(spec.magnitudes().len(), SPECTRUM_BINS);
        assert_eq!(spec.block_seq(), 3);
        assert!(spec.magnitudes().iter().all(|&m| m == 0.0));
    }

    #[test]
    fn test_dc_is_suppressed() {
        let engine = SpectrumEngine::new(SAMPLE_RATE_HZ);
        let block = SampleBlock::from_array(0, [3001u16; BLOCK_SIZE]);
        let spec = engine.compute(&block);
        assert!(spec.magnitudes()[0].abs() < 1e-6);
    }

    #[test]
    fn test_sine_peaks_at_expected_bin() {
        let engine = SpectrumEngine::new(SAMPLE_RATE_HZ);
        for freq in [10.0, 50.0, 123.0, 400.0] {
            let spec = engine.compute(&sine_block(freq, SAMPLE_RATE_HZ as f64));
            let (bin, hz, mag) = spec.peak().unwrap();
            let expected = (freq * BLOCK_SIZE as f64 / SAMPLE_RATE_HZ as f64).round() as i64;
            assert!(
                (bin as i64 - expected).abs() <= 1,
                "{} Hz peaked at bin {} (expected {})",
                freq,
                bin,
                expected
            );
            assert!((hz - freq).abs() <= 2.0 * spec.bin_width());
            assert!(mag > 0.0);
        }
    }

    #[test]
    fn test_compute_is_deterministic() {
        let engine = SpectrumEngine::new(SAMPLE_RATE_HZ);
        let mut samples = [0u16; BLOCK_SIZE];
        for (i, s) in samples.iter_mut().enumerate() {
            *s = ((i * 7919) % 4096) as u16;
        }
        let block = SampleBlock::from_array(0, samples);
        let a = engine.compute(&block);
        let b = engine.compute(&block);
        let bits = |r: &SpectrumResult| {
            r.magnitudes()
                .iter()
                .map(|m| m.to_bits())
                .collect::<Vec<_>>()
        };
        assert_eq!(bits(&a), bits(&b));
        // A freshly planned engine agrees too
        let c = SpectrumEngine::new(SAMPLE_RATE_HZ).compute(&block);
        assert_eq!(bits(&a), bits(&c));
    }

    #[test]
    fn test_bin_frequency() {
        let engine = SpectrumEngine::new(1024);
        let spec = engine.compute(&SampleBlock::from_array(0, [0u16; BLOCK_SIZE]));
        assert_eq!(spec.bin_width(), 1.0);
        assert_eq!(spec.bin_frequency(60), 60.0);
        assert_eq!(spec.sample_rate(), 1024.0);
    }
}
