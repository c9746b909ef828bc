//! Export pipeline errors

use std::path::PathBuf;

use opz_drum::DrumError;
use thiserror::Error;

/// Failure inside a transcoder.
#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to decode WAV {path:?}: {source}")]
    Wav {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },

    #[error("Unsupported input {path:?}: {reason}")]
    Unsupported { path: PathBuf, reason: String },

    #[error("{0} not found on PATH")]
    ToolMissing(&'static str),

    #[error("{tool} exited with {status}: {stderr}")]
    ToolFailed {
        tool: &'static str,
        status: String,
        stderr: String,
    },

    #[error("Could not read the level of {path:?} from ffmpeg output {output:?}")]
    Probe { path: PathBuf, output: String },

    #[error("Transcoder worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

impl TranscodeError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Failure while building a drum pack.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("No slices to build")]
    NoSlices,

    #[error("{0} slices given, a drum pack holds at most {max}", max = opz_drum::MAX_SLICES)]
    TooManySlices(usize),

    #[error("Transcoder reported {reported} segment lengths for {expected} slices")]
    LengthMismatch { expected: usize, reported: usize },

    #[error(transparent)]
    Transcode(#[from] TranscodeError),

    #[error(transparent)]
    Drum(#[from] DrumError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        assert_eq!(
            BuildError::TooManySlices(30).to_string(),
            "30 slices given, a drum pack holds at most 24"
        );
        assert_eq!(
            TranscodeError::ToolMissing("ffmpeg").to_string(),
            "ffmpeg not found on PATH"
        );
    }

    #[test]
    fn test_drum_errors_pass_through() {
        let err: BuildError = DrumError::from(opz_drum::FormatError::NotForm).into();
        assert_eq!(err.to_string(), "Not an IFF FORM container");
    }
}
