//! WAV transcoder (hound)

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use opz_drum::{SLICE_PAD_SECONDS, TARGET_SAMPLE_RATE};

use super::{
    Concatenation, NormalizeMode, TranscodeOptions, Transcoded, Transcoder, db_to_amplitude,
};
use crate::error::TranscodeError;

/// Decodes WAV files in-process and reports exact frame counts.
#[derive(Debug, Default)]
pub struct WavTranscoder {
    ready: bool,
}

impl WavTranscoder {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Transcoder for WavTranscoder {
    async fn ensure_ready(&mut self) -> Result<(), TranscodeError> {
        self.ready = true;
        Ok(())
    }

    async fn transcode_and_concat(
        &mut self,
        inputs: &[PathBuf],
        options: &TranscodeOptions,
    ) -> Result<Transcoded, TranscodeError> {
        if !self.ready {
            self.ensure_ready().await?;
        }
        let inputs = inputs.to_vec();
        let options = *options;
        tokio::task::spawn_blocking(move || render(&inputs, &options)).await?
    }

    async fn close(&mut self) -> Result<(), TranscodeError> {
        self.ready = false;
        Ok(())
    }
}

/// Decode, condition and concatenate every input.
fn render(inputs: &[PathBuf], options: &TranscodeOptions) -> Result<Transcoded, TranscodeError> {
    let threshold = db_to_amplitude(options.silence_threshold_db);
    let pad = (SLICE_PAD_SECONDS * TARGET_SAMPLE_RATE as f64).round() as usize;
    let mut concat = Concatenation::new(options);

    for path in inputs {
        let (mono, rate) = load_mono(path)?;
        let mut segment = resample(&mono, rate, TARGET_SAMPLE_RATE);
        strip_leading_silence(&mut segment, threshold);
        if options.normalize == NormalizeMode::Peak {
            normalize(&mut segment);
        }
        segment.resize(segment.len() + pad, 0.0);

        let pcm: Vec<i16> = to_pcm_i16(&segment).collect();
        let kept = concat.push(path, &pcm);
        tracing::debug!("Transcoded {:?}: {} Hz -> {} frames", path, rate, kept);
    }

    Ok(concat.finish())
}

/// Load a WAV file as mono f32 samples plus its sample rate.
fn load_mono(path: &Path) -> Result<(Vec<f32>, u32), TranscodeError> {
    let wav_error = |source| TranscodeError::Wav {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = hound::WavReader::open(path).map_err(wav_error)?;
    let spec = reader.spec();

    if spec.channels == 0 {
        return Err(TranscodeError::Unsupported {
            path: path.to_path_buf(),
            reason: "no channels".into(),
        });
    }

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Int => match spec.bits_per_sample {
            1..=32 => {
                let full_scale = (1u64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / full_scale))
                    .collect::<Result<_, _>>()
                    .map_err(wav_error)?
            }
            bits => {
                return Err(TranscodeError::Unsupported {
                    path: path.to_path_buf(),
                    reason: format!("bit depth {bits}"),
                });
            }
        },
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(wav_error)?,
    };

    let channels = spec.channels as usize;
    let mono = interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect();

    Ok((mono, spec.sample_rate))
}

/// Linear resampling
fn resample(samples: &[f32], src_rate: u32, dst_rate: u32) -> Vec<f32> {
    if src_rate == dst_rate || samples.is_empty() || src_rate == 0 {
        return samples.to_vec();
    }

    let ratio = src_rate as f64 / dst_rate as f64;
    let output_len = (samples.len() as f64 / ratio) as usize;

    (0..output_len)
        .map(|i| {
            let src_pos = i as f64 * ratio;
            let src_idx = src_pos as usize;
            let frac = (src_pos - src_idx as f64) as f32;

            if src_idx + 1 < samples.len() {
                let a = samples[src_idx];
                let b = samples[src_idx + 1];
                a + (b - a) * frac
            } else {
                samples[src_idx.min(samples.len() - 1)]
            }
        })
        .collect()
}

/// Drop everything before the first sample louder than `threshold`.
///
/// A segment that never crosses the threshold becomes empty.
fn strip_leading_silence(samples: &mut Vec<f32>, threshold: f32) {
    let first = samples
        .iter()
        .position(|s| s.abs() > threshold)
        .unwrap_or(samples.len());
    samples.drain(..first);
}

/// Scale so the loudest sample reaches full scale.
fn normalize(samples: &mut [f32]) {
    let peak = samples.iter().fold(0.0f32, |max, s| max.max(s.abs()));
    if peak > 0.0 {
        for sample in samples.iter_mut() {
            *sample /= peak;
        }
    }
}

fn to_pcm_i16(samples: &[f32]) -> impl Iterator<Item = i16> + '_ {
    samples
        .iter()
        .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
}
