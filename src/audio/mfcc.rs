use rayon::prelude::*;
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::f64::consts::PI;
use std::sync::Arc;

use super::features::{N_MFCC, TARGET_SAMPLE_RATE};

/// Parameters of the MFCC pipeline. Defaults match the reference
/// (librosa-compatible) configuration the classifier was trained on.
#[derive(Clone, Debug)]
pub struct MfccConfig {
    pub sample_rate: u32,
    pub n_fft: usize,
    pub hop_length: usize,
    pub n_mels: usize,
    pub n_mfcc: usize,
    pub fmin: f32,
    /// Upper filterbank edge; `None` means Nyquist.
    pub fmax: Option<f32>,
    /// Dynamic range kept by the log-power step, in dB.
    pub top_db: Option<f32>,
}

impl Default for MfccConfig {
    fn default() -> Self {
        Self {
            sample_rate: TARGET_SAMPLE_RATE,
            n_fft: 2048,
            hop_length: 512,
            n_mels: 128,
            n_mfcc: N_MFCC,
            fmin: 0.0,
            fmax: None,
            top_db: Some(80.0),
        }
    }
}

const AMIN: f32 = 1e-10;

/// MFCC extractor with a pre-computed window, filterbank, DCT basis and FFT plan.
pub struct MfccExtractor {
    config: MfccConfig,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    mel_filterbank: Vec<Vec<f32>>,
    dct_basis: Vec<Vec<f32>>,
}

impl MfccExtractor {
    pub fn new(config: MfccConfig) -> Self {
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(config.n_fft);

        let fmax = config.fmax.unwrap_or(config.sample_rate as f32 / 2.0);
        let mel_filterbank = create_mel_filterbank(
            config.n_mels,
            config.n_fft,
            config.sample_rate as f32,
            config.fmin,
            fmax,
        );

        Self {
            window: periodic_hann(config.n_fft),
            dct_basis: dct_ortho_basis(config.n_mfcc, config.n_mels),
            fft,
            mel_filterbank,
            config,
        }
    }

    /// Number of STFT frames produced for `n_samples` input samples.
    pub fn frame_count(&self, n_samples: usize) -> usize {
        1 + n_samples / self.config.hop_length
    }

    /// Compute MFCCs for `samples`. The result is time-major: one row of
    /// `n_mfcc` coefficients per frame.
    pub fn compute(&self, samples: &[f32]) -> Vec<Vec<f32>> {
        let mut log_mel = self.log_mel_spectrogram(samples);

        // Clamp to the top_db window below the global peak
        if let Some(top_db) = self.config.top_db {
            let peak = log_mel
                .iter()
                .flat_map(|frame| frame.iter())
                .copied()
                .fold(f32::NEG_INFINITY, nan_max);
            let floor = peak - top_db;
            for value in log_mel.iter_mut().flat_map(|frame| frame.iter_mut()) {
                *value = nan_max(*value, floor);
            }
        }

        log_mel
            .par_iter()
            .map(|frame| {
                self.dct_basis
                    .iter()
                    .map(|basis| basis.iter().zip(frame).map(|(b, x)| b * x).sum::<f32>())
                    .collect()
            })
            .collect()
    }

    /// Power mel spectrogram in dB, one row of `n_mels` values per frame.
    fn log_mel_spectrogram(&self, samples: &[f32]) -> Vec<Vec<f32>> {
        let n_fft = self.config.n_fft;
        let hop = self.config.hop_length;
        let pad = n_fft / 2;

        // Centered frames: zero padding on both sides
        let mut padded = vec![0.0f32; samples.len() + 2 * pad];
        padded[pad..pad + samples.len()].copy_from_slice(samples);

        let n_frames = self.frame_count(samples.len());
        let n_bins = n_fft / 2 + 1;

        (0..n_frames)
            .into_par_iter()
            .map(|frame_idx| {
                let start = frame_idx * hop;
                let mut buffer: Vec<Complex<f32>> = padded[start..start + n_fft]
                    .iter()
                    .zip(&self.window)
                    .map(|(&s, &w)| Complex::new(s * w, 0.0))
                    .collect();
                self.fft.process(&mut buffer);

                let power: Vec<f32> = buffer[..n_bins].iter().map(|c| c.norm_sqr()).collect();

                self.mel_filterbank
                    .iter()
                    .map(|filter| {
                        let energy: f32 = filter.iter().zip(&power).map(|(f, p)| f * p).sum();
                        10.0 * nan_max(energy, AMIN).log10()
                    })
                    .collect()
            })
            .collect()
    }
}

/// Arithmetic mean of each coefficient across frames.
pub fn mean_over_time(frames: &[Vec<f32>], n_coeffs: usize) -> Vec<f32> {
    let mut sums = vec![0.0f64; n_coeffs];
    for frame in frames {
        for (sum, &value) in sums.iter_mut().zip(frame) {
            *sum += value as f64;
        }
    }
    let count = frames.len() as f64;
    sums.into_iter().map(|s| (s / count) as f32).collect()
}

/// `max` that propagates NaN instead of discarding it, so a corrupt frame
/// poisons the output rather than being clamped into a valid-looking value.
fn nan_max(a: f32, b: f32) -> f32 {
    if a.is_nan() || b.is_nan() {
        f32::NAN
    } else {
        a.max(b)
    }
}

fn periodic_hann(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| (0.5 - 0.5 * (2.0 * PI * i as f64 / size as f64).cos()) as f32)
        .collect()
}

// Slaney mel scale: linear below 1 kHz, logarithmic above.
const F_SP: f64 = 200.0 / 3.0;
const MIN_LOG_HZ: f64 = 1000.0;
const MIN_LOG_MEL: f64 = MIN_LOG_HZ / F_SP;

fn log_step() -> f64 {
    6.4f64.ln() / 27.0
}

fn hz_to_mel(hz: f64) -> f64 {
    if hz >= MIN_LOG_HZ {
        MIN_LOG_MEL + (hz / MIN_LOG_HZ).ln() / log_step()
    } else {
        hz / F_SP
    }
}

fn mel_to_hz(mel: f64) -> f64 {
    if mel >= MIN_LOG_MEL {
        MIN_LOG_HZ * (log_step() * (mel - MIN_LOG_MEL)).exp()
    } else {
        F_SP * mel
    }
}

/// Triangular mel filters over `n_fft / 2 + 1` bins with Slaney area
/// normalisation, so each filter has roughly constant energy per Hz.
fn create_mel_filterbank(
    n_mels: usize,
    n_fft: usize,
    sample_rate: f32,
    fmin: f32,
    fmax: f32,
) -> Vec<Vec<f32>> {
    let n_bins = n_fft / 2 + 1;
    let fft_freqs: Vec<f64> = (0..n_bins)
        .map(|i| i as f64 * sample_rate as f64 / n_fft as f64)
        .collect();

    let mel_min = hz_to_mel(fmin as f64);
    let mel_max = hz_to_mel(fmax as f64);
    let mel_freqs: Vec<f64> = (0..n_mels + 2)
        .map(|i| mel_to_hz(mel_min + (mel_max - mel_min) * i as f64 / (n_mels + 1) as f64))
        .collect();

    (0..n_mels)
        .map(|i| {
            let (left, center, right) = (mel_freqs[i], mel_freqs[i + 1], mel_freqs[i + 2]);
            let enorm = 2.0 / (right - left);
            fft_freqs
                .iter()
                .map(|&f| {
                    let lower = (f - left) / (center - left);
                    let upper = (right - f) / (right - center);
                    (lower.min(upper).max(0.0) * enorm) as f32
                })
                .collect()
        })
        .collect()
}

/// Rows of the orthonormal DCT-II matrix, truncated to `n_out` coefficients.
fn dct_ortho_basis(n_out: usize, n_in: usize) -> Vec<Vec<f32>> {
    let n = n_in as f64;
    (0..n_out)
        .map(|k| {
            let scale = if k == 0 { (1.0 / n).sqrt() } else { (2.0 / n).sqrt() };
            (0..n_in)
                .map(|i| (scale * (PI * k as f64 * (2.0 * i as f64 + 1.0) / (2.0 * n)).cos()) as f32)
                .collect()
        })
        .collect()
}
