//! Reading drum metadata back out of a pack

use serde_json::Value;

use crate::container::validate;
use crate::error::{DrumError, EncodingError};
use crate::ids;
use crate::position::PositionCodec;

/// One populated slot, decoded to frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedSlice {
    pub slot: usize,
    pub start: u64,
    pub end: u64,
}

impl DecodedSlice {
    pub fn frames(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }
}

/// Drum metadata found in a container.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedMetadata {
    pub name: Option<String>,
    pub octave: Option<i64>,
    pub drum_version: Option<u64>,
    /// Raw stored positions, as many as the document holds
    pub start: Vec<u32>,
    pub end: Vec<u32>,
    /// Populated slots in slot order
    pub slices: Vec<DecodedSlice>,
    /// Frames declared by COMM
    pub container_frames: u64,
    /// The full JSON document
    pub document: Value,
}

impl DecodedMetadata {
    /// Pairs of slots whose frame ranges overlap, in start order.
    pub fn overlaps(&self) -> Vec<(usize, usize)> {
        self.adjacent_pairs()
            .filter(|(a, b)| b.start < a.end)
            .map(|(a, b)| (a.slot, b.slot))
            .collect()
    }

    /// Pairs of slots with unused frames between them, in start order.
    pub fn gaps(&self) -> Vec<(usize, usize)> {
        self.adjacent_pairs()
            .filter(|(a, b)| b.start > a.end)
            .map(|(a, b)| (a.slot, b.slot))
            .collect()
    }

    /// Slots that end past the sound data.
    pub fn out_of_bounds(&self) -> Vec<usize> {
        self.slices
            .iter()
            .filter(|s| s.end > self.container_frames)
            .map(|s| s.slot)
            .collect()
    }

    fn adjacent_pairs(&self) -> impl Iterator<Item = (DecodedSlice, DecodedSlice)> {
        let mut sorted = self.slices.clone();
        sorted.sort_by_key(|s| (s.start, s.end));
        let pairs: Vec<_> = sorted.windows(2).map(|w| (w[0], w[1])).collect();
        pairs.into_iter()
    }
}

/// Decode the `op-1` metadata of a container, if it carries one.
///
/// The document is read leniently: missing or mistyped fields come back as
/// `None` or empty tables rather than errors, so packs written by other
/// tools can still be inspected.
///
/// # Returns
/// * `Ok(Some(_))` - Metadata found and parsed as JSON
/// * `Ok(None)` - Valid container without drum metadata
/// * `Err(DrumError)` - Invalid container, or metadata that is not JSON
pub fn read_drum_metadata(
    bytes: &[u8],
    codec: &PositionCodec,
) -> Result<Option<DecodedMetadata>, DrumError> {
    let layout = validate(bytes)?;
    let Some(chunk) = layout.metadata_chunk() else {
        return Ok(None);
    };

    let payload = &bytes[chunk.data_range()][ids::OP1_SIGNATURE.len()..];
    // Some writers leave NUL padding inside the chunk
    let trimmed = payload
        .iter()
        .rposition(|&b| b != 0)
        .map_or(0, |i| i + 1);
    let document: Value = serde_json::from_slice(&payload[..trimmed]).map_err(EncodingError::from)?;

    let start = positions(&document, "start");
    let end = positions(&document, "end");
    let slices = start
        .iter()
        .zip(&end)
        .enumerate()
        .filter(|(_, (s, e))| !(**s == 0 && **e == 0))
        .map(|(slot, (&s, &e))| DecodedSlice {
            slot,
            start: codec.decode_one(s),
            end: codec.decode_one(e),
        })
        .collect();

    Ok(Some(DecodedMetadata {
        name: document["name"].as_str().map(str::to_string),
        octave: document["octave"].as_i64(),
        drum_version: document["drum_version"].as_u64(),
        start,
        end,
        slices,
        container_frames: layout.frame_count(),
        document,
    }))
}

fn positions(document: &Value, key: &str) -> Vec<u32> {
    document[key]
        .as_array()
        .map(|values| {
            values
                .iter()
                .map(|v| {
                    v.as_u64()
                        .map(|p| p.min(u32::MAX as u64) as u32)
                        .unwrap_or(0)
                })
                .collect()
        })
        .unwrap_or_default()
}
