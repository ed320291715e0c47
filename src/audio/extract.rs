use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

use super::decode::load_waveform;
use super::features::{
    ExtractError, ExtractionResult, FeatureVector, Waveform, N_MFCC, TARGET_SAMPLE_RATE,
};
use super::mfcc::{mean_over_time, MfccConfig, MfccExtractor};

/// Absolute tolerance under which a sample counts as zero.
const SILENCE_TOLERANCE: f32 = 1e-8;

/// Decode `path` and compute its feature vector.
///
/// Expected failures come back as [`ExtractError`] values. Panics raised by the
/// decoder or the transform are caught and reported as [`ExtractError::Decode`].
pub fn extract(path: &Path, use_mfcc: bool) -> ExtractionResult {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        let waveform = load_waveform(path, TARGET_SAMPLE_RATE)
            .map_err(|e| ExtractError::Decode(format!("{:#}", e)))?;

        log::info!(
            "Loaded {} with {} samples at {} Hz ({:.2}s)",
            path.display(),
            waveform.samples.len(),
            waveform.sample_rate,
            waveform.duration_secs()
        );

        if !use_mfcc {
            return Err(ExtractError::FeaturesDisabled);
        }

        extract_from_waveform(&waveform)
    }));

    let result = match outcome {
        Ok(result) => result,
        Err(payload) => Err(ExtractError::Decode(panic_message(payload.as_ref()))),
    };

    if let Err(ref err) = result {
        log::warn!("Feature extraction failed for {}: {}", path.display(), err);
    }
    result
}

/// Run the validation gates and the MFCC transform on an already decoded clip.
pub fn extract_from_waveform(waveform: &Waveform) -> ExtractionResult {
    if waveform.samples.len() < waveform.sample_rate as usize {
        return Err(ExtractError::TooShort {
            samples: waveform.samples.len(),
            sample_rate: waveform.sample_rate,
        });
    }

    if waveform.samples.iter().all(|s| s.abs() <= SILENCE_TOLERANCE) {
        return Err(ExtractError::Silent);
    }

    let extractor = MfccExtractor::new(MfccConfig {
        sample_rate: waveform.sample_rate,
        ..MfccConfig::default()
    });
    let frames = extractor.compute(&waveform.samples);
    let means = mean_over_time(&frames, N_MFCC);

    log::debug!(
        "MFCC shape: ({}, {}), mean shape: ({},)",
        N_MFCC,
        frames.len(),
        means.len()
    );

    let values: [f32; N_MFCC] = means
        .try_into()
        .map_err(|v: Vec<f32>| ExtractError::Decode(format!("expected {} coefficients, got {}", N_MFCC, v.len())))?;
    let vector = FeatureVector::new(values);

    if !vector.is_finite() {
        return Err(ExtractError::InvalidFeatures);
    }

    Ok(vector)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("internal error: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("internal error: {}", s)
    } else {
        "internal error during audio processing".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn write_wav(dir: &Path, name: &str, samples: &[f32]) -> PathBuf {
        write_wav_at(dir, name, TARGET_SAMPLE_RATE, samples)
    }

    fn write_wav_at(dir: &Path, name: &str, sample_rate: u32, samples: &[f32]) -> PathBuf {
        let path = dir.join(name);
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for &s in samples {
            writer.write_sample((s * i16::MAX as f32) as i16).unwrap();
        }
        writer.finalize().unwrap();
        path
    }

    fn sine(secs: f32) -> Vec<f32> {
        let n = (secs * TARGET_SAMPLE_RATE as f32) as usize;
        (0..n)
            .map(|i| {
                (2.0 * std::f32::consts::PI * 440.0 * i as f32 / TARGET_SAMPLE_RATE as f32).sin() * 0.6
            })
            .collect()
    }

    fn waveform(samples: Vec<f32>) -> Waveform {
        Waveform {
            samples,
            sample_rate: TARGET_SAMPLE_RATE,
        }
    }

    #[test]
    fn two_second_sine_yields_full_vector() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_wav(dir.path(), "sine.wav", &sine(2.0));

        let vector = extract(&path, true).unwrap();
        assert_eq!(vector.as_slice().len(), N_MFCC);
        assert!(vector.is_finite());
    }

    #[test]
    fn one_second_clips_pass_at_any_source_rate() {
        let dir = tempfile::tempdir().unwrap();
        for rate in [44100u32, 48000, 16000, 8000] {
            let tone: Vec<f32> = (0..rate)
                .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / rate as f32).sin() * 0.6)
                .collect();
            let path = write_wav_at(dir.path(), &format!("tone_{}.wav", rate), rate, &tone);

            let result = extract(&path, true);
            assert!(result.is_ok(), "{} Hz: {:?}", rate, result);
        }
    }

    #[test]
    fn half_second_clip_is_too_short() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_wav(dir.path(), "short.wav", &sine(0.5));

        match extract(&path, true) {
            Err(ExtractError::TooShort { samples, sample_rate }) => {
                assert_eq!(samples, 11025);
                assert_eq!(sample_rate, TARGET_SAMPLE_RATE);
            }
            other => panic!("expected TooShort, got {:?}", other),
        }
    }

    #[test]
    fn three_seconds_of_zeros_is_silent() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_wav(dir.path(), "silence.wav", &vec![0.0; 3 * 22050]);
        assert_eq!(extract(&path, true), Err(ExtractError::Silent));
    }

    #[test]
    fn corrupt_file_reports_decode_cause() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.mp3");
        std::fs::write(&path, [0xde, 0xad, 0xbe, 0xef, 0x00, 0x01, 0x02]).unwrap();

        match extract(&path, true) {
            Err(ExtractError::Decode(cause)) => assert!(!cause.is_empty()),
            other => panic!("expected Decode, got {:?}", other),
        }
    }

    #[test]
    fn empty_file_is_a_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.wav");
        std::fs::write(&path, b"").unwrap();
        assert!(matches!(extract(&path, true), Err(ExtractError::Decode(_))));
    }

    #[test]
    fn extraction_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_wav(dir.path(), "repeat.wav", &sine(1.5));

        let first = extract(&path, true).unwrap();
        let second = extract(&path, true).unwrap();
        for (a, b) in first.as_slice().iter().zip(second.as_slice()) {
            assert!((a - b).abs() <= 1e-6);
        }
    }

    #[test]
    fn disabled_feature_set_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_wav(dir.path(), "sine.wav", &sine(1.2));
        assert_eq!(extract(&path, false), Err(ExtractError::FeaturesDisabled));
    }

    #[test]
    fn duration_gate_ignores_content() {
        let loud = waveform(vec![0.9; 22049]);
        assert!(matches!(extract_from_waveform(&loud), Err(ExtractError::TooShort { .. })));
        let empty = waveform(Vec::new());
        assert!(matches!(extract_from_waveform(&empty), Err(ExtractError::TooShort { .. })));
    }

    #[test]
    fn duration_gate_runs_before_silence_gate() {
        let quiet = waveform(vec![0.0; 100]);
        assert!(matches!(extract_from_waveform(&quiet), Err(ExtractError::TooShort { .. })));
    }

    #[test]
    fn exactly_one_second_passes_duration_gate() {
        let result = extract_from_waveform(&waveform(sine(1.0)));
        assert!(result.is_ok());
    }

    #[test]
    fn near_zero_noise_counts_as_silence() {
        let samples: Vec<f32> = (0..30000).map(|i| if i % 2 == 0 { 1e-9 } else { -1e-9 }).collect();
        assert_eq!(extract_from_waveform(&waveform(samples)), Err(ExtractError::Silent));
    }

    #[test]
    fn non_finite_samples_are_invalid_features() {
        let mut samples = sine(1.2);
        samples[5000] = f32::NAN;
        assert_eq!(
            extract_from_waveform(&waveform(samples)),
            Err(ExtractError::InvalidFeatures)
        );
    }
}
