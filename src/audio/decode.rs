use anyhow::{Context, Result};
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::features::Waveform;

/// Input frames fed to the resampler per call.
const RESAMPLE_CHUNK: usize = 1024;

/// Mono samples at the source's native rate, before resampling.
pub struct AudioData {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// Decode `path` to mono and resample it to `target_rate`.
///
/// A stream that decodes to zero samples is treated as a decode failure.
pub fn load_waveform(path: &Path, target_rate: u32) -> Result<Waveform> {
    let audio = decode_audio(path)?;
    if audio.samples.is_empty() {
        anyhow::bail!("No audio samples decoded from {}", path.display());
    }

    let samples = resample(&audio.samples, audio.sample_rate, target_rate)?;

    log::debug!(
        "Resampled {} -> {} samples ({}Hz -> {}Hz)",
        audio.samples.len(),
        samples.len(),
        audio.sample_rate,
        target_rate
    );

    Ok(Waveform {
        samples,
        sample_rate: target_rate,
    })
}

pub fn decode_audio(path: &Path) -> Result<AudioData> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open audio file: {}", path.display()))?;

    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .context("Failed to probe audio format")?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != symphonia::core::codecs::CODEC_TYPE_NULL)
        .context("No audio tracks found")?;

    let track_id = track.id;
    let sample_rate = track.codec_params.sample_rate.context("Unknown sample rate")?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .context("Failed to create audio decoder")?;

    let mut all_samples: Vec<f32> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => return Err(e).context("Failed to read audio packet"),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(symphonia::core::errors::Error::DecodeError(err)) => {
                log::debug!("Skipping undecodable packet: {}", err);
                continue;
            }
            Err(e) => return Err(e).context("Failed to decode audio packet"),
        };

        let spec = *decoded.spec();
        let num_frames = decoded.frames();
        // Some codecs only report their layout on the decoded buffer
        let channels = spec.channels.count().max(1);

        let mut sample_buf = SampleBuffer::<f32>::new(num_frames as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);

        let samples = sample_buf.samples();

        // Downmix to mono
        if channels == 1 {
            all_samples.extend_from_slice(samples);
        } else {
            for frame_samples in samples.chunks(channels) {
                let mono: f32 = frame_samples.iter().sum::<f32>() / channels as f32;
                all_samples.push(mono);
            }
        }
    }

    log::info!(
        "Decoded {}: {} samples, {}Hz, {:.2}s",
        path.display(),
        all_samples.len(),
        sample_rate,
        all_samples.len() as f32 / sample_rate as f32
    );

    Ok(AudioData {
        samples: all_samples,
        sample_rate,
    })
}

/// Resample mono f32 audio from `from_rate` to `to_rate` using rubato.
///
/// The output is aligned with the input (the filter delay is trimmed) and
/// holds exactly `ceil(len * to_rate / from_rate)` samples.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    use rubato::{Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction};

    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let ratio = to_rate as f64 / from_rate as f64;
    let mut resampler = SincFixedIn::<f32>::new(
        ratio,
        2.0, // max relative ratio
        params,
        RESAMPLE_CHUNK,
        1, // mono
    )
    .context("Failed to create resampler")?;

    let delay = resampler.output_delay();
    let expected = (samples.len() as u64 * to_rate as u64).div_ceil(from_rate as u64) as usize;
    let mut output: Vec<f32> = Vec::with_capacity(expected + delay + RESAMPLE_CHUNK);

    let mut chunks = samples.chunks_exact(RESAMPLE_CHUNK);
    for chunk in chunks.by_ref() {
        let out = resampler
            .process(&[chunk], None)
            .context("Resampling failed")?;
        output.extend(out.into_iter().flatten());
    }

    let tail = chunks.remainder();
    if !tail.is_empty() {
        let input: [&[f32]; 1] = [tail];
        let out = resampler
            .process_partial(Some(&input[..]), None)
            .context("Resampling failed")?;
        output.extend(out.into_iter().flatten());
    }

    // Flush the samples still held back by the filter delay
    while output.len() < delay + expected {
        let out = resampler
            .process_partial::<Vec<f32>>(None, None)
            .context("Failed to flush resampler")?;
        let before = output.len();
        output.extend(out.into_iter().flatten());
        if output.len() == before {
            break;
        }
    }

    output.drain(..delay.min(output.len()));
    output.resize(expected, 0.0);
    Ok(output)
}
