//! Drum pack error types

use thiserror::Error;

/// Render a chunk or form identifier for messages.
pub(crate) fn fourcc(id: &[u8; 4]) -> String {
    id.iter()
        .map(|&b| {
            if b.is_ascii_graphic() || b == b' ' {
                b as char
            } else {
                '?'
            }
        })
        .collect()
}

/// The byte buffer is not a usable AIFF/AIFC container.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    /// Buffer shorter than the 12-byte FORM header
    #[error("Buffer too small to contain a FORM header")]
    TooSmall,
    /// First four bytes are not "FORM"
    #[error("Not an IFF FORM container")]
    NotForm,
    /// Form type is neither AIFF nor AIFC
    #[error("Unsupported form type '{}' (expected AIFF or AIFC)", fourcc(.0))]
    UnsupportedFormType([u8; 4]),
    /// FORM size field claims more bytes than the buffer holds
    #[error("FORM declares {declared} bytes but only {available} are present")]
    FormSizeOverrun { declared: u32, available: usize },
    /// Fewer than 8 bytes left where a chunk header should start
    #[error("Truncated chunk header at offset {offset}")]
    TruncatedChunkHeader { offset: usize },
    /// Chunk data runs past the end of the form
    #[error("Chunk '{}' at offset {offset} declares {size} bytes, past the end of the container", fourcc(.id))]
    ChunkOverrun { id: [u8; 4], offset: usize, size: u32 },
    /// A mandatory chunk is absent
    #[error("Missing mandatory {0} chunk")]
    MissingChunk(&'static str),
    /// COMM chunk smaller than the form type requires
    #[error("COMM chunk is {size} bytes, need at least {required}")]
    CommonTooShort { size: u32, required: u32 },
    /// SSND chunk without room for its offset/block-size header
    #[error("SSND chunk is {0} bytes, need at least 8")]
    SoundDataTooShort(u32),
    /// COMM declares more sample frames than SSND holds
    #[error("COMM declares {frames} frames but SSND holds only {available} bytes of samples")]
    FramesOverrun { frames: u32, available: usize },
    /// Variant conversion would require rewriting sample data
    #[error("Cannot convert compression type '{}' to plain AIFF without re-encoding samples", fourcc(.0))]
    UnsupportedCompression([u8; 4]),
}

/// A metadata value cannot be represented in the vendor chunk.
#[derive(Debug, Error)]
pub enum EncodingError {
    /// NaN or infinite parameter value
    #[error("{table}[{slot}] is not a finite number ({value})")]
    NonFinite {
        table: &'static str,
        slot: usize,
        value: f64,
    },
    /// Parameter value does not fit the device's 32-bit field
    #[error("{table}[{slot}] = {value} does not fit a 32-bit field")]
    OutOfRange {
        table: &'static str,
        slot: usize,
        value: f64,
    },
    /// Table could not be brought to exactly one entry per slot
    #[error("{table} has {len} entries after padding, expected {}", crate::MAX_SLICES)]
    TableShape { table: &'static str, len: usize },
    /// Drum version other than 2 or 3
    #[error("Unsupported drum version: {0} (expected 2 or 3)")]
    UnsupportedDrumVersion(u8),
    /// Metadata JSON serialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// Vendor chunk payload exceeds the 32-bit chunk size field
    #[error("Metadata chunk of {0} bytes exceeds the chunk size field")]
    ChunkTooLarge(usize),
}

/// Any failure while producing a drum pack container.
#[derive(Debug, Error)]
pub enum DrumError {
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error(transparent)]
    Encoding(#[from] EncodingError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            FormatError::UnsupportedFormType(*b"WAVE").to_string(),
            "Unsupported form type 'WAVE' (expected AIFF or AIFC)"
        );
        assert_eq!(
            FormatError::MissingChunk("SSND").to_string(),
            "Missing mandatory SSND chunk"
        );
        assert_eq!(
            EncodingError::TableShape {
                table: "volume",
                len: 23
            }
            .to_string(),
            "volume has 23 entries after padding, expected 24"
        );
    }

    #[test]
    fn test_fourcc_masks_binary() {
        assert_eq!(fourcc(b"op-1"), "op-1");
        assert_eq!(fourcc(&[0x00, b'A', 0xFF, b' ']), "?A? ");
    }

    #[test]
    fn test_drum_error_is_transparent() {
        let err: DrumError = FormatError::NotForm.into();
        assert_eq!(err.to_string(), "Not an IFF FORM container");
        assert!(matches!(err, DrumError::Format(FormatError::NotForm)));
    }
}
