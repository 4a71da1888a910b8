//! Averaged power spectrum over a whole track.

use std::sync::Arc;

use realfft::{RealFftPlanner, RealToComplex};
use rustfft::num_complex::Complex;

/// Accumulates Hann-windowed power spectra from a sample stream.
///
/// Samples are gathered into windows of `fft_size`. After each window the
/// accumulator skips ahead so that consecutive windows start `hop` samples
/// apart, which spreads a bounded number of windows across a long track.
/// Windows quieter than the silence threshold don't count.
pub struct SpectrumAccumulator {
    fft: Arc<dyn RealToComplex<f32>>,
    fft_size: usize,
    hop: usize,
    window: Vec<f32>,
    input: Vec<f32>,
    skip: usize,
    output: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    power: Vec<f64>,
    windows: usize,
    max_windows: usize,
    silence_rms: f32,
}

impl SpectrumAccumulator {
    pub fn new(fft_size: usize, hop: usize, max_windows: usize, silence_rms: f32) -> Self {
        let mut planner = RealFftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(fft_size);

        let window: Vec<f32> = (0..fft_size)
            .map(|i| {
                let x = std::f32::consts::TAU * i as f32 / (fft_size - 1) as f32;
                0.5 * (1.0 - x.cos())
            })
            .collect();

        let output = fft.make_output_vec();
        let scratch = fft.make_scratch_vec();
        let bins = output.len();

        Self {
            fft,
            fft_size,
            hop: hop.max(fft_size),
            window,
            input: Vec::with_capacity(fft_size),
            skip: 0,
            output,
            scratch,
            power: vec![0.0; bins],
            windows: 0,
            max_windows,
            silence_rms,
        }
    }

    /// Whether enough windows have been analysed.
    pub fn is_full(&self) -> bool {
        self.windows >= self.max_windows
    }

    /// Non-silent windows analysed so far.
    pub fn windows(&self) -> usize {
        self.windows
    }

    pub fn push(&mut self, mut samples: &[f32]) {
        while !samples.is_empty() && !self.is_full() {
            if self.skip > 0 {
                let n = self.skip.min(samples.len());
                self.skip -= n;
                samples = &samples[n..];
                continue;
            }

            let n = (self.fft_size - self.input.len()).min(samples.len());
            self.input.extend_from_slice(&samples[..n]);
            samples = &samples[n..];

            if self.input.len() == self.fft_size {
                self.analyze_window();
                self.input.clear();
                self.skip = self.hop - self.fft_size;
            }
        }
    }

    fn analyze_window(&mut self) {
        let rms = (self.input.iter().map(|s| s * s).sum::<f32>() / self.fft_size as f32).sqrt();
        if rms < self.silence_rms {
            return;
        }

        let mut windowed: Vec<f32> = self.input.iter().zip(&self.window).map(|(s, w)| s * w).collect();
        if self
            .fft
            .process_with_scratch(&mut windowed, &mut self.output, &mut self.scratch)
            .is_err()
        {
            return;
        }

        for (acc, c) in self.power.iter_mut().zip(&self.output) {
            *acc += c.norm_sqr() as f64;
        }
        self.windows += 1;
    }

    /// Mean power per band in dB, for bands of `band_hz` up to `max_hz`.
    ///
    /// Only whole bands below `max_hz` are returned. Empty when no window
    /// has been analysed.
    pub fn band_levels(&self, sample_rate: u32, band_hz: f32, max_hz: f32) -> Vec<f32> {
        if self.windows == 0 || band_hz <= 0.0 {
            return Vec::new();
        }

        let bin_hz = sample_rate as f32 / self.fft_size as f32;
        let bands = (max_hz / band_hz).floor() as usize;
        let mut sums = vec![0.0f64; bands];
        let mut counts = vec![0usize; bands];

        for (bin, power) in self.power.iter().enumerate() {
            let band = (bin as f32 * bin_hz / band_hz) as usize;
            if band >= bands {
                break;
            }
            sums[band] += power / self.windows as f64;
            counts[band] += 1;
        }

        sums.iter()
            .zip(&counts)
            .map(|(sum, &count)| {
                let mean = if count == 0 { 0.0 } else { sum / count as f64 };
                (10.0 * (mean + 1e-20).log10()) as f32
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(freq: f32, rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|n| 0.5 * (std::f32::consts::TAU * freq * n as f32 / rate as f32).sin())
            .collect()
    }

    #[test]
    fn test_tone_lands_in_its_band() {
        let mut acc = SpectrumAccumulator::new(1024, 1024, 16, 1e-4);
        acc.push(&tone(1000.0, 8000, 4096));
        assert_eq!(acc.windows(), 4);

        let levels = acc.band_levels(8000, 500.0, 4000.0);
        assert_eq!(levels.len(), 8);
        let loudest = levels
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(loudest, 2);
        assert!(levels[2] - levels[6] > 40.0);
    }

    #[test]
    fn test_silent_windows_are_skipped() {
        let mut acc = SpectrumAccumulator::new(1024, 1024, 16, 1e-4);
        acc.push(&vec![0.0; 4096]);
        assert_eq!(acc.windows(), 0);
        assert!(acc.band_levels(8000, 500.0, 4000.0).is_empty());
    }

    #[test]
    fn test_hop_spreads_windows_and_caps_count() {
        let mut acc = SpectrumAccumulator::new(256, 1024, 3, 1e-4);
        acc.push(&tone(440.0, 8000, 256 * 40));
        assert_eq!(acc.windows(), 3);
        assert!(acc.is_full());
    }

    #[test]
    fn test_push_accepts_uneven_blocks() {
        let mut acc = SpectrumAccumulator::new(256, 512, 100, 1e-4);
        let samples = tone(440.0, 8000, 2048);
        for block in samples.chunks(100) {
            acc.push(block);
        }
        // Windows start at 0, 512, 1024 and 1536
        assert_eq!(acc.windows(), 4);
    }
}
