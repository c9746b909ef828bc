//! opz-export library
//!
//! Turns a list of audio files into an OP-Z drum pack: transcoding, slice
//! planning, metadata injection, and the pack.toml manifest that drives it.

pub mod error;
pub mod manifest;
pub mod pack;
pub mod params;
pub mod transcode;

pub use error::{BuildError, TranscodeError};
pub use pack::{DrumPack, PackBuilder, PackOptions};
pub use params::normalize_parameters;
pub use transcode::{
    FfmpegTranscoder, NormalizeMode, SegmentLengths, TranscodeOptions, Transcoded, Transcoder,
    TranscoderKind, WavTranscoder,
};
