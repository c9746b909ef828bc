//! Metadata injection
//!
//! Rebuilds a container around its original sound data with a fresh `op-1`
//! metadata chunk. The output chunk order is fixed:
//!
//! ```text
//! FORM <size> <AIFF|AIFC>
//!   FVER        (AIFC only)
//!   COMM
//!   ...         (other chunks from the input, in their original order)
//!   APPL op-1   (replaces any existing one)
//!   SSND        (copied byte for byte)
//! ```

use crate::container::{
    ContainerFormat, common_for_format, is_drum_metadata, push_chunk, validate,
};
use crate::error::{DrumError, EncodingError};
use crate::metadata::{DrumMetadata, metadata_json};
use crate::position::PositionCodec;
use crate::slices::SlicePlan;
use crate::{AIFC_VERSION_1, MAX_SLICES, ids};

/// Write drum metadata into `bytes` using the default position scale.
///
/// See [`inject_with_codec`].
pub fn inject(
    bytes: &[u8],
    plan: &SlicePlan,
    meta: &DrumMetadata,
    format: ContainerFormat,
) -> Result<Vec<u8>, DrumError> {
    inject_with_codec(bytes, plan, meta, format, &PositionCodec::default())
}

/// Write drum metadata into `bytes`, producing a new container of `format`.
///
/// The input is validated first and never modified. Sound data and the
/// declared frame count are carried over unchanged; only the container
/// header, COMM framing and the metadata chunk are rewritten. Bytes after
/// the input's FORM chunk are dropped.
///
/// # Errors
/// * `DrumError::Format` - The input is not a valid container, or cannot be
///   converted to `format` without re-encoding samples
/// * `DrumError::Encoding` - A parameter or the metadata document cannot be
///   represented
pub fn inject_with_codec(
    bytes: &[u8],
    plan: &SlicePlan,
    meta: &DrumMetadata,
    format: ContainerFormat,
    codec: &PositionCodec,
) -> Result<Vec<u8>, DrumError> {
    let layout = validate(bytes)?;

    if plan.total_frames() > layout.frame_count() {
        tracing::warn!(
            plan_frames = plan.total_frames(),
            container_frames = layout.frame_count(),
            "Slice plan extends past the sound data"
        );
    }

    let tables = meta.params.encode()?;
    let start = encode_slots(codec, &plan.start);
    let end = encode_slots(codec, &plan.end);
    let json = metadata_json(meta, &start, &end, &tables)?;

    let mut payload = Vec::with_capacity(ids::OP1_SIGNATURE.len() + json.len());
    payload.extend_from_slice(ids::OP1_SIGNATURE);
    payload.extend_from_slice(&json);
    if u32::try_from(payload.len()).is_err() {
        return Err(EncodingError::ChunkTooLarge(payload.len()).into());
    }

    let common = common_for_format(bytes, &layout, format)?;

    let mut body = Vec::with_capacity(layout.form_end() + payload.len() + 64);
    body.extend_from_slice(format.form_type());

    if format == ContainerFormat::Aifc {
        match layout.version_chunk() {
            Some(chunk) if layout.format == ContainerFormat::Aifc => {
                push_chunk(&mut body, ids::FVER, &bytes[chunk.data_range()]);
            }
            _ => push_chunk(&mut body, ids::FVER, &AIFC_VERSION_1.to_be_bytes()),
        }
    }

    push_chunk(&mut body, ids::COMM, &common);

    let mut preserved = 0usize;
    for chunk in &layout.chunks {
        let replaced = chunk.is(ids::COMM)
            || chunk.is(ids::SSND)
            || chunk.is(ids::FVER)
            || is_drum_metadata(bytes, chunk);
        if replaced {
            continue;
        }
        push_chunk(&mut body, &chunk.id, &bytes[chunk.data_range()]);
        preserved += 1;
    }

    push_chunk(&mut body, ids::APPL, &payload);
    push_chunk(&mut body, ids::SSND, &bytes[layout.sound_chunk().data_range()]);

    let form_size =
        u32::try_from(body.len()).map_err(|_| EncodingError::ChunkTooLarge(body.len()))?;

    let mut out = Vec::with_capacity(8 + body.len());
    out.extend_from_slice(ids::FORM);
    out.extend_from_slice(&form_size.to_be_bytes());
    out.extend_from_slice(&body);

    tracing::debug!(
        format = ?format,
        slices = plan.populated_count(),
        metadata_bytes = payload.len(),
        preserved_chunks = preserved,
        size = out.len(),
        "Injected drum metadata"
    );

    Ok(out)
}

fn encode_slots(codec: &PositionCodec, frames: &[u64; MAX_SLICES]) -> [u32; MAX_SLICES] {
    frames.map(|f| codec.encode_one(i64::try_from(f).unwrap_or(i64::MAX)))
}
