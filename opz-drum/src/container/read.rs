//! Container validation and chunk walking

use super::{ChunkInfo, CommonInfo, ContainerFormat, ContainerLayout};
use crate::error::FormatError;
use crate::ids;

/// COMM data size in plain AIFF
pub(crate) const AIFF_COMM_SIZE: u32 = 18;

/// COMM data size in AIFC up to the compression type
pub(crate) const AIFC_COMM_MIN_SIZE: u32 = 22;

/// Check that `bytes` is a well-formed AIFF/AIFC container.
///
/// Walks every chunk inside the FORM, requires COMM and SSND, and checks that
/// no declared size runs past the buffer. Bytes after the end of the FORM are
/// ignored. Nothing is modified.
///
/// # Returns
/// * `Ok(ContainerLayout)` - Chunk offsets and the decoded COMM fields
/// * `Err(FormatError)` - The first structural problem found
pub fn validate(bytes: &[u8]) -> Result<ContainerLayout, FormatError> {
    if bytes.len() < 12 {
        return Err(FormatError::TooSmall);
    }
    if &bytes[0..4] != ids::FORM {
        return Err(FormatError::NotForm);
    }

    let form_type = read_id(bytes, 8);
    let format =
        ContainerFormat::from_form_type(&form_type).ok_or(FormatError::UnsupportedFormType(form_type))?;

    let form_size = read_u32(bytes, 4);
    let form_end = 8usize
        .checked_add(form_size as usize)
        .filter(|&end| end <= bytes.len())
        .ok_or(FormatError::FormSizeOverrun {
            declared: form_size,
            available: bytes.len() - 8,
        })?;
    if form_size < 4 {
        return Err(FormatError::TooSmall);
    }

    let chunks = walk_chunks(bytes, form_end)?;

    let common_index = chunks
        .iter()
        .position(|c| c.is(ids::COMM))
        .ok_or(FormatError::MissingChunk("COMM"))?;
    let sound_index = chunks
        .iter()
        .position(|c| c.is(ids::SSND))
        .ok_or(FormatError::MissingChunk("SSND"))?;

    let common = parse_common(bytes, &chunks[common_index], format)?;
    check_sound_data(bytes, &chunks[sound_index], &common)?;

    let metadata_index = chunks.iter().position(|c| is_drum_metadata(bytes, c));
    let version_index = chunks.iter().position(|c| c.is(ids::FVER));

    tracing::debug!(
        form = ?format,
        chunks = chunks.len(),
        frames = common.sample_frames,
        has_metadata = metadata_index.is_some(),
        "Validated container"
    );

    Ok(ContainerLayout {
        format,
        form_size,
        chunks,
        common,
        common_index,
        sound_index,
        metadata_index,
        version_index,
    })
}

/// Walk chunk headers between the FORM header and `form_end`.
fn walk_chunks(bytes: &[u8], form_end: usize) -> Result<Vec<ChunkInfo>, FormatError> {
    let mut chunks = Vec::new();
    let mut pos = 12usize;

    while pos < form_end {
        if pos + 8 > form_end {
            return Err(FormatError::TruncatedChunkHeader { offset: pos });
        }
        let id = read_id(bytes, pos);
        let size = read_u32(bytes, pos + 4);
        let data_end = (pos + 8)
            .checked_add(size as usize)
            .filter(|&end| end <= form_end)
            .ok_or(FormatError::ChunkOverrun {
                id,
                offset: pos,
                size,
            })?;

        chunks.push(ChunkInfo {
            id,
            offset: pos,
            size,
        });

        // Odd-sized chunks are followed by one pad byte
        pos = data_end + (size as usize & 1);
    }

    Ok(chunks)
}

fn parse_common(
    bytes: &[u8],
    chunk: &ChunkInfo,
    format: ContainerFormat,
) -> Result<CommonInfo, FormatError> {
    let required = match format {
        ContainerFormat::Aiff => AIFF_COMM_SIZE,
        ContainerFormat::Aifc => AIFC_COMM_MIN_SIZE,
    };
    if chunk.size < required {
        return Err(FormatError::CommonTooShort {
            size: chunk.size,
            required,
        });
    }

    let data = chunk.data_range().start;
    let mut rate = [0u8; 10];
    rate.copy_from_slice(&bytes[data + 8..data + 18]);

    Ok(CommonInfo {
        channels: read_u16(bytes, data),
        sample_frames: read_u32(bytes, data + 2),
        sample_size: read_u16(bytes, data + 6),
        sample_rate: read_extended(&rate),
        compression: match format {
            ContainerFormat::Aiff => None,
            ContainerFormat::Aifc => Some(read_id(bytes, data + 18)),
        },
    })
}

/// SSND must hold its 8-byte header and, for PCM, every declared frame.
fn check_sound_data(bytes: &[u8], chunk: &ChunkInfo, common: &CommonInfo) -> Result<(), FormatError> {
    if chunk.size < 8 {
        return Err(FormatError::SoundDataTooShort(chunk.size));
    }
    if !common.is_pcm() {
        return Ok(());
    }

    let data = chunk.data_range().start;
    let offset = read_u32(bytes, data) as usize;
    let available = (chunk.size as usize - 8).saturating_sub(offset);
    let needed = common.sample_frames as usize * common.bytes_per_frame();
    if needed > available {
        return Err(FormatError::FramesOverrun {
            frames: common.sample_frames,
            available,
        });
    }
    Ok(())
}

/// Whether `chunk` is an `APPL` chunk signed `op-1`.
pub(crate) fn is_drum_metadata(bytes: &[u8], chunk: &ChunkInfo) -> bool {
    chunk.is(ids::APPL)
        && chunk.size >= 4
        && &bytes[chunk.data_range().start..chunk.data_range().start + 4] == ids::OP1_SIGNATURE
}

pub(crate) fn read_id(bytes: &[u8], at: usize) -> [u8; 4] {
    let mut id = [0u8; 4];
    id.copy_from_slice(&bytes[at..at + 4]);
    id
}

pub(crate) fn read_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([bytes[at], bytes[at + 1]])
}

pub(crate) fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_be_bytes(read_id(bytes, at))
}

/// Decode an IEEE 754 80-bit extended float (sign, 15-bit exponent, 64-bit
/// significand with explicit integer bit).
pub(crate) fn read_extended(raw: &[u8; 10]) -> f64 {
    let sign_exp = u16::from_be_bytes([raw[0], raw[1]]);
    let mut significand = [0u8; 8];
    significand.copy_from_slice(&raw[2..10]);
    let significand = u64::from_be_bytes(significand);

    let negative = sign_exp & 0x8000 != 0;
    let exponent = (sign_exp & 0x7FFF) as i32;

    let magnitude = if exponent == 0 && significand == 0 {
        0.0
    } else if exponent == 0x7FFF {
        if significand << 1 == 0 {
            f64::INFINITY
        } else {
            f64::NAN
        }
    } else {
        significand as f64 * 2f64.powi(exponent - 16383 - 63)
    };

    if negative { -magnitude } else { magnitude }
}
