//! OPZ-Drum: drum pack container core for the OP-Z sampler
//!
//! A drum pack is a mono 16-bit AIFF/AIFC file holding up to 24 slices back to
//! back, plus an `APPL` chunk (application signature `op-1`) carrying a JSON
//! document that tells the device where each slice starts and ends and how to
//! play it. This crate owns the parts that must be byte-exact:
//!
//! - [`PositionCodec`] - frame offsets to the device's fixed-point positions
//! - [`SlicePlan`] - gap-free, exclusive-end slice boundaries
//! - [`validate`] - structural checks on an AIFF/AIFC buffer
//! - [`inject`] - builds the metadata chunk and splices it in without touching
//!   the sound data
//!
//! Everything here is synchronous and allocation-local; audio decoding and
//! transcoding live with the caller.
//!
//! # Usage
//!
//! ```
//! use opz_drum::{inject, write_pcm_aiff, ContainerFormat, DrumMetadata, SlicePlan};
//!
//! let pcm = write_pcm_aiff(&[0i16; 2200], 44100);
//! let plan = SlicePlan::from_frame_counts(&[1000, 1200]);
//! let pack = inject(&pcm, &plan, &DrumMetadata::default(), ContainerFormat::Aiff).unwrap();
//!
//! let layout = opz_drum::validate(&pack).unwrap();
//! assert!(layout.metadata_chunk().is_some());
//! ```

mod container;
mod error;
mod inject;
mod inspect;
mod metadata;
mod position;
mod slices;

pub use container::{
    ChunkInfo, CommonInfo, ContainerFormat, ContainerLayout, validate, write_pcm_aiff,
};
pub use error::{DrumError, EncodingError, FormatError};
pub use inject::{inject, inject_with_codec};
pub use inspect::{DecodedMetadata, DecodedSlice, read_drum_metadata};
pub use metadata::{DrumMetadata, DrumVersion, EncodedTables, ParameterTable, Reverse, SlotParams};
pub use position::{PositionCodec, decode_positions, encode_positions};
pub use slices::{SlicePlan, effective_sample_rate};

// =============================================================================
// Device Constants
// =============================================================================

/// Slots in a drum pack
pub const MAX_SLICES: usize = 24;

/// Longest pack the device accepts, in seconds
pub const MAX_DURATION_SECONDS: f64 = 12.0;

/// Sample rate of the concatenated buffer
pub const TARGET_SAMPLE_RATE: u32 = 44100;

/// Position ticks per frame
pub const DEFAULT_POSITION_SCALE: u32 = 4096;

/// Largest storable position
pub const MAX_POSITION: u32 = 0x7FFF_FFFE;

/// Silence appended after each slice by the transcoders, in seconds
pub const SLICE_PAD_SECONDS: f64 = 0.01;

/// Longest patch name written to the metadata
pub const MAX_NAME_LEN: usize = 32;

/// Patch name used when none is given
pub const DEFAULT_NAME: &str = "op-done";

/// Per-slot parameter defaults and ranges
pub mod params {
    /// Pitch offset; zero plays at unison
    pub const PITCH: f64 = 0.0;
    /// Play mode code
    pub const PLAYMODE: f64 = 8192.0;
    /// Reverse flag (forward)
    pub const REVERSE: f64 = 8192.0;
    /// Volume level (mid-scale)
    pub const VOLUME: f64 = 8192.0;
    /// Loudest volume level
    pub const VOLUME_MAX: f64 = 16383.0;
    /// Reverse sentinel for forward playback
    pub const REVERSE_FORWARD: i32 = 8192;
    /// Reverse sentinel for reversed playback
    pub const REVERSE_REVERSED: i32 = 0;
}

// =============================================================================
// Container Constants
// =============================================================================

/// IFF container identifiers
pub mod ids {
    pub const FORM: &[u8; 4] = b"FORM";
    pub const AIFF: &[u8; 4] = b"AIFF";
    pub const AIFC: &[u8; 4] = b"AIFC";
    pub const COMM: &[u8; 4] = b"COMM";
    pub const SSND: &[u8; 4] = b"SSND";
    pub const FVER: &[u8; 4] = b"FVER";
    pub const APPL: &[u8; 4] = b"APPL";
    /// Application signature of the drum metadata inside `APPL`
    pub const OP1_SIGNATURE: &[u8; 4] = b"op-1";
    /// AIFC compression type for big-endian PCM
    pub const COMPRESSION_NONE: &[u8; 4] = b"NONE";
}

/// AIFC format version timestamp written to `FVER`
pub const AIFC_VERSION_1: u32 = 0xA280_5140;
