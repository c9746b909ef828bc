//! Drum metadata: per-slot parameter tables and the `op-1` JSON layouts

use serde::{Deserialize, Serialize};

use crate::error::EncodingError;
use crate::{DEFAULT_NAME, MAX_NAME_LEN, MAX_SLICES, params};

/// Reverse flag, stored as one of two sentinels rather than a boolean.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reverse {
    #[default]
    Forward,
    Reversed,
}

impl Reverse {
    pub fn sentinel(self) -> i32 {
        match self {
            Reverse::Forward => params::REVERSE_FORWARD,
            Reverse::Reversed => params::REVERSE_REVERSED,
        }
    }

    pub fn from_sentinel(value: i64) -> Option<Self> {
        match value {
            v if v == params::REVERSE_FORWARD as i64 => Some(Reverse::Forward),
            v if v == params::REVERSE_REVERSED as i64 => Some(Reverse::Reversed),
            _ => None,
        }
    }
}

impl From<bool> for Reverse {
    fn from(reversed: bool) -> Self {
        if reversed {
            Reverse::Reversed
        } else {
            Reverse::Forward
        }
    }
}

/// Metadata layout generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum DrumVersion {
    /// Layout of the manufacturer's own export tool
    V2,
    /// Layout of current firmware
    #[default]
    V3,
}

impl TryFrom<u8> for DrumVersion {
    type Error = EncodingError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            2 => Ok(DrumVersion::V2),
            3 => Ok(DrumVersion::V3),
            other => Err(EncodingError::UnsupportedDrumVersion(other)),
        }
    }
}

impl From<DrumVersion> for u8 {
    fn from(version: DrumVersion) -> Self {
        match version {
            DrumVersion::V2 => 2,
            DrumVersion::V3 => 3,
        }
    }
}

/// Parameters for one slot, before padding into tables.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlotParams {
    pub pitch: f64,
    pub playmode: f64,
    pub reverse: Reverse,
    pub volume: f64,
}

impl Default for SlotParams {
    fn default() -> Self {
        Self {
            pitch: params::PITCH,
            playmode: params::PLAYMODE,
            reverse: Reverse::Forward,
            volume: params::VOLUME,
        }
    }
}

/// Four parallel per-slot tables. Tables may be shorter or longer than
/// [`MAX_SLICES`]; encoding pads each with its own default and truncates.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ParameterTable {
    pub pitch: Vec<f64>,
    pub playmode: Vec<f64>,
    pub reverse: Vec<Reverse>,
    pub volume: Vec<f64>,
}

impl ParameterTable {
    /// Build tables from per-slot parameters, one entry per slot.
    pub fn from_slots<I>(slots: I) -> Self
    where
        I: IntoIterator<Item = SlotParams>,
    {
        let mut table = Self::default();
        for slot in slots {
            table.pitch.push(slot.pitch);
            table.playmode.push(slot.playmode);
            table.reverse.push(slot.reverse);
            table.volume.push(slot.volume);
        }
        table
    }

    /// Parameters of one slot, with defaults where a table is short.
    pub fn slot(&self, index: usize) -> SlotParams {
        let defaults = SlotParams::default();
        SlotParams {
            pitch: self.pitch.get(index).copied().unwrap_or(defaults.pitch),
            playmode: self.playmode.get(index).copied().unwrap_or(defaults.playmode),
            reverse: self.reverse.get(index).copied().unwrap_or(defaults.reverse),
            volume: self.volume.get(index).copied().unwrap_or(defaults.volume),
        }
    }

    /// Pad, validate and round every table to exactly one `i32` per slot.
    pub fn encode(&self) -> Result<EncodedTables, EncodingError> {
        let reverse: Vec<f64> = self.reverse.iter().map(|r| r.sentinel() as f64).collect();
        Ok(EncodedTables {
            pitch: encode_table("pitch", &self.pitch, params::PITCH)?,
            playmode: encode_table("playmode", &self.playmode, params::PLAYMODE)?,
            reverse: encode_table("reverse", &reverse, params::REVERSE)?,
            volume: encode_table("volume", &self.volume, params::VOLUME)?,
        })
    }
}

/// Parameter tables as written to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodedTables {
    pub pitch: [i32; MAX_SLICES],
    pub playmode: [i32; MAX_SLICES],
    pub reverse: [i32; MAX_SLICES],
    pub volume: [i32; MAX_SLICES],
}

fn encode_table(
    table: &'static str,
    values: &[f64],
    default: f64,
) -> Result<[i32; MAX_SLICES], EncodingError> {
    let encoded = values
        .iter()
        .copied()
        .chain(std::iter::repeat(default))
        .take(MAX_SLICES)
        .enumerate()
        .map(|(slot, value)| {
            if !value.is_finite() {
                return Err(EncodingError::NonFinite { table, slot, value });
            }
            let rounded = value.round();
            if rounded < i32::MIN as f64 || rounded > i32::MAX as f64 {
                return Err(EncodingError::OutOfRange { table, slot, value });
            }
            Ok(rounded as i32)
        })
        .collect::<Result<Vec<i32>, _>>()?;

    let len = encoded.len();
    encoded
        .try_into()
        .map_err(|_| EncodingError::TableShape { table, len })
}

/// Everything the metadata chunk describes besides slice positions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DrumMetadata {
    pub name: String,
    pub octave: i32,
    pub drum_version: DrumVersion,
    #[serde(flatten)]
    pub params: ParameterTable,
}

impl Default for DrumMetadata {
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            octave: 0,
            drum_version: DrumVersion::default(),
            params: ParameterTable::default(),
        }
    }
}

impl DrumMetadata {
    /// Name as stored: at most [`MAX_NAME_LEN`] characters, never empty.
    pub fn stored_name(&self) -> String {
        let trimmed = self.name.trim();
        if trimmed.is_empty() {
            DEFAULT_NAME.to_string()
        } else {
            trimmed.chars().take(MAX_NAME_LEN).collect()
        }
    }
}

// =============================================================================
// JSON Layouts
// =============================================================================

/// Dynamics envelope written with every pack
const DYNA_ENV: [i32; 8] = [0, 8192, 0, 8192, 0, 0, 0, 0];

/// Effect parameters written with every pack (effect off)
const FX_PARAMS: [i32; 8] = [8000; 8];

/// LFO parameters written with every pack (LFO off)
const LFO_PARAMS: [i32; 8] = [16000, 16000, 16000, 16000, 0, 0, 0, 0];

/// Version 2: keys in the sorted order the manufacturer's tool emits.
#[derive(Serialize)]
struct LayoutV2<'a> {
    drum_version: u8,
    dyna_env: [i32; 8],
    end: &'a [u32; MAX_SLICES],
    fx_active: bool,
    fx_params: [i32; 8],
    fx_type: &'static str,
    lfo_active: bool,
    lfo_params: [i32; 8],
    lfo_type: &'static str,
    name: &'a str,
    octave: i32,
    pitch: &'a [i32; MAX_SLICES],
    playmode: &'a [i32; MAX_SLICES],
    reverse: &'a [i32; MAX_SLICES],
    start: &'a [u32; MAX_SLICES],
    #[serde(rename = "type")]
    kind: &'static str,
    volume: &'a [i32; MAX_SLICES],
}

/// Version 3: identity first, then the slice table, then the tone blocks.
#[derive(Serialize)]
struct LayoutV3<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    name: &'a str,
    octave: i32,
    drum_version: u8,
    start: &'a [u32; MAX_SLICES],
    end: &'a [u32; MAX_SLICES],
    pitch: &'a [i32; MAX_SLICES],
    playmode: &'a [i32; MAX_SLICES],
    reverse: &'a [i32; MAX_SLICES],
    volume: &'a [i32; MAX_SLICES],
    dyna_env: [i32; 8],
    fx_active: bool,
    fx_type: &'static str,
    fx_params: [i32; 8],
    lfo_active: bool,
    lfo_type: &'static str,
    lfo_params: [i32; 8],
}

/// Serialize the metadata document for the given layout version.
pub(crate) fn metadata_json(
    meta: &DrumMetadata,
    start: &[u32; MAX_SLICES],
    end: &[u32; MAX_SLICES],
    tables: &EncodedTables,
) -> Result<Vec<u8>, EncodingError> {
    let name = meta.stored_name();
    let json = match meta.drum_version {
        DrumVersion::V2 => serde_json::to_vec(&LayoutV2 {
            drum_version: meta.drum_version.into(),
            dyna_env: DYNA_ENV,
            end,
            fx_active: false,
            fx_params: FX_PARAMS,
            fx_type: "delay",
            lfo_active: false,
            lfo_params: LFO_PARAMS,
            lfo_type: "tremolo",
            name: &name,
            octave: meta.octave,
            pitch: &tables.pitch,
            playmode: &tables.playmode,
            reverse: &tables.reverse,
            start,
            kind: "drum",
            volume: &tables.volume,
        })?,
        DrumVersion::V3 => serde_json::to_vec(&LayoutV3 {
            kind: "drum",
            name: &name,
            octave: meta.octave,
            drum_version: meta.drum_version.into(),
            start,
            end,
            pitch: &tables.pitch,
            playmode: &tables.playmode,
            reverse: &tables.reverse,
            volume: &tables.volume,
            dyna_env: DYNA_ENV,
            fx_active: false,
            fx_type: "delay",
            fx_params: FX_PARAMS,
            lfo_active: false,
            lfo_type: "tremolo",
            lfo_params: LFO_PARAMS,
        })?,
    };
    Ok(json)
}
