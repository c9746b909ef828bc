//! Chunk emission and minimal PCM containers

use super::read::AIFF_COMM_SIZE;
use super::{ContainerFormat, ContainerLayout};
use crate::error::FormatError;
use crate::ids;

/// Pascal-string compression name paired with `NONE`
const NONE_COMPRESSION_NAME: &[u8] = b"not compressed";

/// Append a chunk header, its data, and a pad byte when the size is odd.
///
/// The caller guarantees `data.len()` fits the 32-bit size field.
pub(crate) fn push_chunk(out: &mut Vec<u8>, id: &[u8; 4], data: &[u8]) {
    out.extend_from_slice(id);
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(data);
    if data.len() % 2 == 1 {
        out.push(0);
    }
}

/// COMM data for `target`, derived from the container's existing COMM.
///
/// Only the header fields are rewritten; sample bytes stay valid because the
/// conversion is limited to big-endian uncompressed PCM.
pub(crate) fn common_for_format(
    bytes: &[u8],
    layout: &ContainerLayout,
    target: ContainerFormat,
) -> Result<Vec<u8>, FormatError> {
    let existing = &bytes[layout.common_chunk().data_range()];

    match (layout.format, target) {
        (ContainerFormat::Aiff, ContainerFormat::Aiff)
        | (ContainerFormat::Aifc, ContainerFormat::Aifc) => Ok(existing.to_vec()),
        (ContainerFormat::Aiff, ContainerFormat::Aifc) => {
            let mut data = existing[..AIFF_COMM_SIZE as usize].to_vec();
            data.extend_from_slice(ids::COMPRESSION_NONE);
            data.push(NONE_COMPRESSION_NAME.len() as u8);
            data.extend_from_slice(NONE_COMPRESSION_NAME);
            // Pascal strings are padded to an even total length
            if (NONE_COMPRESSION_NAME.len() + 1) % 2 == 1 {
                data.push(0);
            }
            Ok(data)
        }
        (ContainerFormat::Aifc, ContainerFormat::Aiff) => match layout.common.compression {
            Some(c) if &c == ids::COMPRESSION_NONE => Ok(existing[..AIFF_COMM_SIZE as usize].to_vec()),
            Some(c) => Err(FormatError::UnsupportedCompression(c)),
            None => Ok(existing[..AIFF_COMM_SIZE as usize].to_vec()),
        },
    }
}

/// Encode an f64 as an IEEE 754 80-bit extended float.
pub(crate) fn write_extended(value: f64) -> [u8; 10] {
    let mut out = [0u8; 10];
    if value == 0.0 || !value.is_finite() {
        return out;
    }

    let bits = value.to_bits();
    let sign = ((bits >> 63) as u16) << 15;
    let exponent = ((bits >> 52) & 0x7FF) as i32;
    let fraction = bits & ((1u64 << 52) - 1);

    let (exponent, significand) = if exponent == 0 {
        // Subnormal f64: normalize into the explicit-integer-bit form
        let shift = fraction.leading_zeros() as i32;
        (-1022 - (shift - 11) + 16383, fraction << shift)
    } else {
        (exponent - 1023 + 16383, (1u64 << 63) | (fraction << 11))
    };

    out[0..2].copy_from_slice(&(sign | exponent as u16).to_be_bytes());
    out[2..10].copy_from_slice(&significand.to_be_bytes());
    out
}

/// Build a plain AIFF holding mono 16-bit big-endian PCM.
///
/// Layout: FORM header, 18-byte COMM, SSND with zero offset and block size.
pub fn write_pcm_aiff(samples: &[i16], sample_rate: u32) -> Vec<u8> {
    let sound_size = 8 + samples.len() * 2;
    let form_size = 4 + (8 + AIFF_COMM_SIZE as usize) + (8 + sound_size);
    let mut out = Vec::with_capacity(8 + form_size + 1);

    out.extend_from_slice(ids::FORM);
    out.extend_from_slice(&(form_size as u32).to_be_bytes());
    out.extend_from_slice(ids::AIFF);

    let mut common = Vec::with_capacity(AIFF_COMM_SIZE as usize);
    common.extend_from_slice(&1u16.to_be_bytes());
    common.extend_from_slice(&(samples.len() as u32).to_be_bytes());
    common.extend_from_slice(&16u16.to_be_bytes());
    common.extend_from_slice(&write_extended(sample_rate as f64));
    push_chunk(&mut out, ids::COMM, &common);

    out.extend_from_slice(ids::SSND);
    out.extend_from_slice(&(sound_size as u32).to_be_bytes());
    out.extend_from_slice(&0u32.to_be_bytes()); // offset
    out.extend_from_slice(&0u32.to_be_bytes()); // block size
    for sample in samples {
        out.extend_from_slice(&sample.to_be_bytes());
    }

    out
}
