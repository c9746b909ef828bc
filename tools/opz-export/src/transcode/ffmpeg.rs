//! External ffmpeg transcoder
//!
//! Handles any input format ffmpeg can read. Each input is rendered through
//! its own filter chain into a scratch AIFF, so the frame count of every
//! segment is read from what ffmpeg actually produced after silence removal
//! and resampling. Concatenation and the duration cut happen in-process.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use opz_drum::{ContainerFormat, SLICE_PAD_SECONDS, TARGET_SAMPLE_RATE, ids, validate};
use tokio::process::Command;

use super::{Concatenation, NormalizeMode, TranscodeOptions, Transcoded, Transcoder};
use crate::error::TranscodeError;

/// Runs the `ffmpeg` found on PATH.
#[derive(Debug, Default)]
pub struct FfmpegTranscoder {
    ffmpeg: Option<PathBuf>,
}

impl FfmpegTranscoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use an explicit tool path instead of searching PATH.
    pub fn with_path(ffmpeg: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: Some(ffmpeg.into()),
        }
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn ensure_ready(&mut self) -> Result<(), TranscodeError> {
        if self.ffmpeg.is_some() {
            return Ok(());
        }
        let ffmpeg = which::which("ffmpeg").map_err(|_| TranscodeError::ToolMissing("ffmpeg"))?;
        tracing::info!("Using {:?}", ffmpeg);
        self.ffmpeg = Some(ffmpeg);
        Ok(())
    }

    async fn transcode_and_concat(
        &mut self,
        inputs: &[PathBuf],
        options: &TranscodeOptions,
    ) -> Result<Transcoded, TranscodeError> {
        self.ensure_ready().await?;
        let Some(ffmpeg) = self.ffmpeg.clone() else {
            return Err(TranscodeError::ToolMissing("ffmpeg"));
        };

        let scratch = tempfile::tempdir().map_err(|e| TranscodeError::io(std::env::temp_dir(), e))?;
        let mut concat = Concatenation::new(options);

        for (i, input) in inputs.iter().enumerate() {
            let gain = match options.normalize {
                NormalizeMode::Peak => peak_gain(&ffmpeg, input).await?,
                NormalizeMode::Off => None,
            };

            let output = scratch.path().join(format!("segment{i}.aif"));
            run(&ffmpeg, "ffmpeg", &segment_args(input, gain, &output, options)).await?;

            let rendered = tokio::fs::read(&output)
                .await
                .map_err(|e| TranscodeError::io(&output, e))?;
            let samples = segment_samples(input, &rendered)?;
            let kept = concat.push(input, &samples);
            tracing::debug!("ffmpeg rendered {:?}: {} frames", input, kept);
        }

        Ok(concat.finish())
    }

    async fn close(&mut self) -> Result<(), TranscodeError> {
        self.ffmpeg = None;
        Ok(())
    }
}

/// Per-input filter chain: strip leading silence, apply the optional gain
/// in dB, convert to mono s16 at 44.1 kHz and append the slice pad.
pub fn segment_filter(gain_db: Option<f64>, options: &TranscodeOptions) -> String {
    let volume = gain_db.map(|db| format!("volume={db}dB,")).unwrap_or_default();
    format!(
        "silenceremove=start_periods=1:start_duration=0:start_threshold={}dB,\
         {volume}aformat=sample_fmts=s16:sample_rates={TARGET_SAMPLE_RATE}:channel_layouts=mono,\
         apad=pad_dur={SLICE_PAD_SECONDS}",
        options.silence_threshold_db
    )
}

fn segment_args(
    input: &Path,
    gain_db: Option<f64>,
    output: &Path,
    options: &TranscodeOptions,
) -> Vec<OsString> {
    let filter = segment_filter(gain_db, options);
    let rate = TARGET_SAMPLE_RATE.to_string();
    let mut args: Vec<OsString> = vec!["-hide_banner".into(), "-i".into(), input.into()];
    args.extend(
        [
            "-y",
            "-af",
            filter.as_str(),
            "-ar",
            rate.as_str(),
            "-ac",
            "1",
            "-c:a",
            "pcm_s16be",
            "-f",
            "aiff",
        ]
        .map(OsString::from),
    );
    args.push(output.into());
    args
}

/// Decode the 16-bit mono samples of one rendered segment.
fn segment_samples(input: &Path, rendered: &[u8]) -> Result<Vec<i16>, TranscodeError> {
    let unsupported = |reason: String| TranscodeError::Unsupported {
        path: input.to_path_buf(),
        reason,
    };

    let layout = validate(rendered).map_err(|e| unsupported(format!("ffmpeg output: {e}")))?;
    let common = layout.common;
    let big_endian = match (layout.format, common.compression) {
        (ContainerFormat::Aiff, _) => true,
        (ContainerFormat::Aifc, Some(c)) => &c == ids::COMPRESSION_NONE,
        (ContainerFormat::Aifc, None) => false,
    };
    if !big_endian || common.channels != 1 || common.sample_size != 16 {
        return Err(unsupported(format!(
            "ffmpeg output is {} ch {} bit, expected mono 16-bit big-endian PCM",
            common.channels, common.sample_size
        )));
    }
    if common.sample_rate.round() as u32 != TARGET_SAMPLE_RATE {
        return Err(unsupported(format!(
            "ffmpeg output is {} Hz, expected {}",
            common.sample_rate, TARGET_SAMPLE_RATE
        )));
    }

    // SSND data starts with an offset and block size
    let data = &rendered[layout.sound_chunk().data_range()];
    let offset = data
        .get(..4)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]) as usize)
        .unwrap_or(0);
    let pcm = data.get(8 + offset..).unwrap_or_default();
    let frames = (layout.frame_count() as usize).min(pcm.len() / 2);

    Ok(pcm[..frames * 2]
        .chunks_exact(2)
        .map(|b| i16::from_be_bytes([b[0], b[1]]))
        .collect())
}

/// Gain in dB that brings the input's peak to full scale, from a
/// `volumedetect` pass. `None` for silent or already full-scale input.
async fn peak_gain(ffmpeg: &Path, input: &Path) -> Result<Option<f64>, TranscodeError> {
    let args: [OsString; 9] = [
        "-hide_banner".into(),
        "-nostats".into(),
        "-i".into(),
        input.into(),
        "-af".into(),
        "volumedetect".into(),
        "-f".into(),
        "null".into(),
        "-".into(),
    ];
    let output = run(ffmpeg, "ffmpeg", &args).await?;
    let peak = parse_max_volume(&output.stderr).ok_or_else(|| TranscodeError::Probe {
        path: input.to_path_buf(),
        output: output.stderr.clone(),
    })?;
    tracing::debug!("{:?} peaks at {} dB", input, peak);
    Ok((peak.is_finite() && peak < 0.0).then_some(-peak))
}

/// `max_volume` from volumedetect's report, `-inf` for digital silence.
fn parse_max_volume(report: &str) -> Option<f64> {
    report.lines().find_map(|line| {
        let (_, rest) = line.split_once("max_volume:")?;
        let value = rest.trim().trim_end_matches("dB").trim();
        match value {
            "-inf" => Some(f64::NEG_INFINITY),
            v => v.parse::<f64>().ok(),
        }
    })
}

struct ToolOutput {
    stderr: String,
}

/// Run a tool to completion, capturing its diagnostics.
async fn run(
    program: &Path,
    tool: &'static str,
    args: &[OsString],
) -> Result<ToolOutput, TranscodeError> {
    let output = Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| TranscodeError::io(program, e))?;

    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    if !output.status.success() {
        return Err(TranscodeError::ToolFailed {
            tool,
            status: output.status.to_string(),
            stderr: stderr.lines().rev().take(5).collect::<Vec<_>>().join(" | "),
        });
    }

    Ok(ToolOutput { stderr })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcode::SegmentLengths;
    use opz_drum::write_pcm_aiff;

    #[test]
    fn test_segment_filter() {
        assert_eq!(
            segment_filter(None, &TranscodeOptions::default()),
            "silenceremove=start_periods=1:start_duration=0:start_threshold=-35dB,\
             aformat=sample_fmts=s16:sample_rates=44100:channel_layouts=mono,apad=pad_dur=0.01"
        );
    }

    #[test]
    fn test_segment_filter_uses_options_and_gain() {
        let options = TranscodeOptions {
            silence_threshold_db: -50.5,
            ..Default::default()
        };
        let filter = segment_filter(Some(6.5), &options);
        assert!(filter.contains("start_threshold=-50.5dB,volume=6.5dB,aformat="));
        assert!(!segment_filter(None, &options).contains("volume="));
    }

    #[test]
    fn test_segment_args() {
        let args = segment_args(
            Path::new("snare.mp3"),
            None,
            Path::new("/tmp/segment0.aif"),
            &TranscodeOptions::default(),
        );
        let args: Vec<String> = args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        assert_eq!(&args[..3], &["-hide_banner", "-i", "snare.mp3"]);
        assert_eq!(args[3], "-y");
        assert_eq!(args[4], "-af");
        assert_eq!(args.last().map(String::as_str), Some("/tmp/segment0.aif"));
        assert!(args.windows(2).any(|w| w[0] == "-ar" && w[1] == "44100"));
        assert!(args.windows(2).any(|w| w[0] == "-c:a" && w[1] == "pcm_s16be"));
    }

    #[test]
    fn test_segment_samples_reads_rendered_frames() {
        let samples: Vec<i16> = (0..500).map(|i| i as i16 - 250).collect();
        let rendered = write_pcm_aiff(&samples, 44100);
        let decoded = segment_samples(Path::new("a.wav"), &rendered).unwrap();
        assert_eq!(decoded, samples);
    }

    #[test]
    fn test_segment_samples_rejects_wrong_rate() {
        let rendered = write_pcm_aiff(&[0; 10], 22050);
        let result = segment_samples(Path::new("a.wav"), &rendered);
        assert!(matches!(result, Err(TranscodeError::Unsupported { .. })));

        let result = segment_samples(Path::new("a.wav"), b"not audio");
        assert!(matches!(result, Err(TranscodeError::Unsupported { .. })));
    }

    #[test]
    fn test_parse_max_volume() {
        let report = "[Parsed_volumedetect_0 @ 0x1] mean_volume: -20.1 dB\n\
                      [Parsed_volumedetect_0 @ 0x1] max_volume: -6.5 dB\n";
        assert_eq!(parse_max_volume(report), Some(-6.5));
        assert_eq!(
            parse_max_volume("max_volume: -inf dB"),
            Some(f64::NEG_INFINITY)
        );
        assert_eq!(parse_max_volume("no report"), None);
    }

    #[tokio::test]
    async fn test_missing_tool_fails_to_run() {
        let mut transcoder = FfmpegTranscoder::with_path("/nonexistent/ffmpeg");
        transcoder.ensure_ready().await.unwrap();
        let result = transcoder
            .transcode_and_concat(&[PathBuf::from("a.wav")], &TranscodeOptions::default())
            .await;
        assert!(matches!(result, Err(TranscodeError::Io { .. })));
    }

    fn write_tone(path: &Path, silent_frames: usize, tone_frames: usize) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 44100,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for _ in 0..silent_frames {
            writer.write_sample(0i16).unwrap();
        }
        for i in 0..tone_frames {
            // Square wave, loud from its first sample
            let sample: i16 = if (i / 50) % 2 == 0 { 16000 } else { -16000 };
            writer.write_sample(sample).unwrap();
        }
        writer.finalize().unwrap();
    }

    /// Needs ffmpeg on PATH; passes trivially without it.
    #[tokio::test]
    async fn test_lengths_follow_leading_silence_removal() {
        if which::which("ffmpeg").is_err() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let quiet_start = dir.path().join("quiet_start.wav");
        let immediate = dir.path().join("immediate.wav");
        write_tone(&quiet_start, 22050, 22050);
        write_tone(&immediate, 0, 44100);

        let mut transcoder = FfmpegTranscoder::new();
        let result = transcoder
            .transcode_and_concat(&[quiet_start, immediate], &TranscodeOptions::default())
            .await
            .unwrap();

        let SegmentLengths::Frames(frames) = result.lengths else {
            panic!("ffmpeg should report rendered frames");
        };
        // Half a second of silence is gone from the first slice only
        assert!(frames[0].abs_diff(22050 + 441) <= 64, "{frames:?}");
        assert!(frames[1].abs_diff(44100 + 441) <= 64, "{frames:?}");
        let layout = validate(&result.container).unwrap();
        assert_eq!(layout.frame_count(), frames[0] + frames[1]);
    }
}
