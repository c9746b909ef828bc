//! Transcoders: arbitrary source audio to one concatenated PCM container
//!
//! A transcoder is an owned, stateful collaborator. It may be expensive to
//! bring up (locating external tools, warming a worker), so its lifecycle is
//! explicit: `ensure_ready` before the first job, `close` when done. Callers
//! serialize jobs; implementations never see two concurrent calls.
//!
//! - `wav` - Pure Rust WAV decoding through `hound`
//! - `ffmpeg` - External `ffmpeg` processes, one render per input

mod ffmpeg;
mod wav;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use opz_drum::{TARGET_SAMPLE_RATE, write_pcm_aiff};

use crate::error::TranscodeError;

pub use ffmpeg::{FfmpegTranscoder, segment_filter};
pub use wav::WavTranscoder;

/// Leading-silence threshold used when none is configured, in dB
pub const DEFAULT_SILENCE_THRESHOLD_DB: f64 = -35.0;

/// Loudness handling applied to each segment before concatenation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NormalizeMode {
    /// Leave levels untouched
    #[default]
    Off,
    /// Scale each segment so its peak reaches full scale
    Peak,
}

/// Per-build transcoding settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TranscodeOptions {
    /// Leading audio quieter than this is removed, in dB
    pub silence_threshold_db: f64,
    /// The concatenated buffer is cut at this length, in seconds
    pub max_duration: f64,
    pub normalize: NormalizeMode,
}

impl Default for TranscodeOptions {
    fn default() -> Self {
        Self {
            silence_threshold_db: DEFAULT_SILENCE_THRESHOLD_DB,
            max_duration: opz_drum::MAX_DURATION_SECONDS,
            normalize: NormalizeMode::Off,
        }
    }
}

/// How a transcoder reports the size of each segment it produced.
#[derive(Debug, Clone, PartialEq)]
pub enum SegmentLengths {
    /// Exact frames per segment, trailing pad included
    Frames(Vec<u64>),
    /// Source durations in seconds, before padding and trimming
    Durations(Vec<f64>),
}

impl SegmentLengths {
    pub fn len(&self) -> usize {
        match self {
            SegmentLengths::Frames(frames) => frames.len(),
            SegmentLengths::Durations(durations) => durations.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Output of one transcoding job.
#[derive(Debug, Clone)]
pub struct Transcoded {
    /// Mono 16-bit 44.1 kHz AIFF holding every segment back to back
    pub container: Vec<u8>,
    pub lengths: SegmentLengths,
}

#[async_trait]
pub trait Transcoder: Send {
    /// Bring the transcoder up. Called once before the first job.
    async fn ensure_ready(&mut self) -> Result<(), TranscodeError>;

    /// Convert `inputs` and concatenate them in order.
    async fn transcode_and_concat(
        &mut self,
        inputs: &[PathBuf],
        options: &TranscodeOptions,
    ) -> Result<Transcoded, TranscodeError>;

    /// Release whatever `ensure_ready` acquired.
    async fn close(&mut self) -> Result<(), TranscodeError>;
}

/// Transcoder backends selectable from a manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscoderKind {
    #[default]
    Wav,
    Ffmpeg,
}

impl TranscoderKind {
    pub fn create(self) -> Box<dyn Transcoder> {
        match self {
            TranscoderKind::Wav => Box::new(WavTranscoder::new()),
            TranscoderKind::Ffmpeg => Box::new(FfmpegTranscoder::new()),
        }
    }
}

/// Joins conditioned segments into one buffer, cutting at the duration
/// limit and recording the frames each segment actually contributed.
pub(crate) struct Concatenation {
    samples: Vec<i16>,
    frames: Vec<u64>,
    limit: usize,
    max_duration: f64,
}

impl Concatenation {
    pub(crate) fn new(options: &TranscodeOptions) -> Self {
        let max_duration = options.max_duration.max(0.0);
        Self {
            samples: Vec::new(),
            frames: Vec::new(),
            limit: (max_duration * TARGET_SAMPLE_RATE as f64).round() as usize,
            max_duration,
        }
    }

    /// Append one 44.1 kHz mono segment, returning the frames kept.
    ///
    /// Segments past the duration limit are cut short or dropped entirely.
    pub(crate) fn push(&mut self, path: &Path, segment: &[i16]) -> u64 {
        let room = self.limit.saturating_sub(self.samples.len());
        let kept = segment.len().min(room);
        if kept < segment.len() {
            tracing::warn!(
                "Trimmed {:?} from {} to {} frames (max duration {}s)",
                path,
                segment.len(),
                kept,
                self.max_duration
            );
        }
        self.samples.extend_from_slice(&segment[..kept]);
        self.frames.push(kept as u64);
        kept as u64
    }

    pub(crate) fn finish(self) -> Transcoded {
        Transcoded {
            container: write_pcm_aiff(&self.samples, TARGET_SAMPLE_RATE),
            lengths: SegmentLengths::Frames(self.frames),
        }
    }
}

/// Amplitude in `0.0..=1.0` for a level in dBFS.
pub(crate) fn db_to_amplitude(db: f64) -> f32 {
    10f64.powf(db / 20.0) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_to_amplitude() {
        assert!((db_to_amplitude(0.0) - 1.0).abs() < 1e-6);
        assert!((db_to_amplitude(-20.0) - 0.1).abs() < 1e-6);
        assert!((db_to_amplitude(-35.0) - 0.017_782_8).abs() < 1e-5);
    }

    #[test]
    fn test_concatenation_cuts_at_limit() {
        let options = TranscodeOptions {
            max_duration: 0.001,
            ..Default::default()
        };
        // 44 frames fit in 1 ms
        let mut concat = Concatenation::new(&options);
        assert_eq!(concat.push(Path::new("a"), &[1; 30]), 30);
        assert_eq!(concat.push(Path::new("b"), &[2; 30]), 14);
        assert_eq!(concat.push(Path::new("c"), &[3; 30]), 0);

        let transcoded = concat.finish();
        assert_eq!(transcoded.lengths, SegmentLengths::Frames(vec![30, 14, 0]));
        let layout = opz_drum::validate(&transcoded.container).unwrap();
        assert_eq!(layout.frame_count(), 44);
    }

    #[test]
    fn test_segment_lengths_len() {
        assert_eq!(SegmentLengths::Frames(vec![1, 2]).len(), 2);
        assert!(SegmentLengths::Durations(vec![]).is_empty());
    }

    #[test]
    fn test_kind_from_toml_string() {
        #[derive(Deserialize)]
        struct Holder {
            kind: TranscoderKind,
        }
        let holder: Holder = toml::from_str("kind = \"ffmpeg\"").unwrap();
        assert_eq!(holder.kind, TranscoderKind::Ffmpeg);
    }
}
