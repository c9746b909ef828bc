//! AIFF/AIFC container layout
//!
//! This module provides the structural view of a drum pack container:
//!
//! - `read` - Validating a buffer and locating its chunks
//! - `write` - Emitting chunks and minimal PCM containers
//! - `tests` - Validation test suite

mod read;
mod write;


use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::ids;

pub use read::validate;
pub use write::write_pcm_aiff;

pub(crate) use read::is_drum_metadata;
pub(crate) use write::{common_for_format, push_chunk};

/// Output container variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerFormat {
    /// Plain AIFF
    #[default]
    Aiff,
    /// AIFF-C, as written by the manufacturer's own tooling
    Aifc,
}

impl ContainerFormat {
    pub fn form_type(self) -> &'static [u8; 4] {
        match self {
            ContainerFormat::Aiff => ids::AIFF,
            ContainerFormat::Aifc => ids::AIFC,
        }
    }

    pub fn from_form_type(form_type: &[u8; 4]) -> Option<Self> {
        match form_type {
            b"AIFF" => Some(ContainerFormat::Aiff),
            b"AIFC" => Some(ContainerFormat::Aifc),
            _ => None,
        }
    }

    /// MIME type to tag the finished pack with
    pub fn mime(self) -> &'static str {
        match self {
            ContainerFormat::Aiff => "audio/aiff",
            ContainerFormat::Aifc => "audio/x-aifc",
        }
    }

    /// File extension the device expects for both variants
    pub fn extension(self) -> &'static str {
        "aif"
    }
}

/// One chunk inside the FORM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkInfo {
    pub id: [u8; 4],
    /// Offset of the chunk header from the start of the buffer
    pub offset: usize,
    /// Declared data size, excluding header and pad byte
    pub size: u32,
}

impl ChunkInfo {
    pub fn is(&self, id: &[u8; 4]) -> bool {
        &self.id == id
    }

    pub fn data_range(&self) -> Range<usize> {
        let start = self.offset + 8;
        start..start + self.size as usize
    }

    /// Header and data, without the pad byte
    pub fn full_range(&self) -> Range<usize> {
        self.offset..self.data_range().end
    }
}

/// Fields of the COMM chunk.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CommonInfo {
    pub channels: u16,
    pub sample_frames: u32,
    pub sample_size: u16,
    pub sample_rate: f64,
    /// AIFC compression type; `None` for plain AIFF
    pub compression: Option<[u8; 4]>,
}

impl CommonInfo {
    pub fn bytes_per_frame(&self) -> usize {
        self.channels as usize * (self.sample_size as usize).div_ceil(8)
    }

    /// Whether the sample bytes are uncompressed PCM of `sample_size` bits
    pub fn is_pcm(&self) -> bool {
        match &self.compression {
            None => true,
            Some(c) => c == ids::COMPRESSION_NONE || c == b"sowt",
        }
    }
}

/// Result of a successful [`validate`].
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerLayout {
    pub format: ContainerFormat,
    pub form_size: u32,
    pub chunks: Vec<ChunkInfo>,
    pub common: CommonInfo,
    pub(crate) common_index: usize,
    pub(crate) sound_index: usize,
    pub(crate) metadata_index: Option<usize>,
    pub(crate) version_index: Option<usize>,
}

impl ContainerLayout {
    /// End of the FORM chunk; bytes past this are not part of the container
    pub fn form_end(&self) -> usize {
        8 + self.form_size as usize
    }

    pub fn common_chunk(&self) -> &ChunkInfo {
        &self.chunks[self.common_index]
    }

    pub fn sound_chunk(&self) -> &ChunkInfo {
        &self.chunks[self.sound_index]
    }

    /// The `APPL` chunk carrying `op-1` drum metadata, if any
    pub fn metadata_chunk(&self) -> Option<&ChunkInfo> {
        self.metadata_index.map(|i| &self.chunks[i])
    }

    pub fn version_chunk(&self) -> Option<&ChunkInfo> {
        self.version_index.map(|i| &self.chunks[i])
    }

    /// Complete SSND chunk bytes (header included)
    pub fn sound_bytes<'a>(&self, bytes: &'a [u8]) -> &'a [u8] {
        &bytes[self.sound_chunk().full_range()]
    }

    /// Sample frames carried by the container
    pub fn frame_count(&self) -> u64 {
        self.common.sample_frames as u64
    }
}
