//! Tolerant parameter normalization
//!
//! Parameter documents come from loosely structured sources (hand-written
//! JSON, AI suggestions) with inconsistent key names and shapes. Everything
//! here maps such a document onto a strict [`ParameterTable`]; values that
//! cannot be used fall back to the slot default with a warning. Nothing in
//! this module fails.

use opz_drum::{MAX_SLICES, ParameterTable, Reverse, SlotParams, params};
use serde_json::{Map, Value};

/// Keys a table document may be nested under
const WRAPPER_KEYS: &[&str] = &["parameters", "params", "metadata", "drum", "kit", "data"];

/// Keys holding an array of per-slice objects
const SLICE_LIST_KEYS: &[&str] = &["slices", "samples", "pads", "sounds"];

const PITCH_KEYS: &[&str] = &["pitch", "tune", "pitch_offset", "pitchOffset", "transpose"];
const PLAYMODE_KEYS: &[&str] = &["playmode", "play_mode", "playMode", "mode"];
const REVERSE_KEYS: &[&str] = &["reverse", "reversed", "is_reversed", "isReversed"];
const VOLUME_KEYS: &[&str] = &["volume", "vol", "gain", "level"];

/// Map a loose parameter document onto a [`ParameterTable`].
///
/// Accepted shapes, possibly nested under a wrapper key such as `params`:
/// - table form: `{"volume": [..], "pitch": [..], ...}`, where a scalar
///   applies to every slot
/// - list form: `[{"volume": .., "pitch": ..}, ...]`, or the same list under
///   a key such as `slices`
pub fn normalize_parameters(document: &Value) -> ParameterTable {
    let document = unwrap(document);

    let slots: Vec<SlotParams> = match document {
        Value::Array(items) => from_slice_list(items),
        Value::Object(map) => match find_slice_list(map) {
            Some(items) => from_slice_list(items),
            None => from_tables(map),
        },
        other => {
            tracing::warn!("Ignoring parameter document of unexpected type: {}", other);
            Vec::new()
        }
    };

    ParameterTable::from_slots(slots)
}

/// Descend through wrapper objects until something with parameters appears.
fn unwrap(mut value: &Value) -> &Value {
    // Bounded so a pathological document cannot recurse forever
    for _ in 0..8 {
        let Value::Object(map) = value else {
            break;
        };
        if has_any_key(map) || find_slice_list(map).is_some() {
            break;
        }
        match WRAPPER_KEYS.iter().find_map(|key| map.get(*key)) {
            Some(inner @ (Value::Object(_) | Value::Array(_))) => value = inner,
            _ => break,
        }
    }
    value
}

fn has_any_key(map: &Map<String, Value>) -> bool {
    [PITCH_KEYS, PLAYMODE_KEYS, REVERSE_KEYS, VOLUME_KEYS]
        .iter()
        .any(|keys| lookup(map, keys).is_some())
}

fn find_slice_list(map: &Map<String, Value>) -> Option<&Vec<Value>> {
    SLICE_LIST_KEYS
        .iter()
        .find_map(|key| map.get(*key).and_then(Value::as_array))
}

fn lookup<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| map.get(*key))
}

fn from_slice_list(items: &[Value]) -> Vec<SlotParams> {
    if items.len() > MAX_SLICES {
        tracing::warn!(
            "Parameter list has {} entries, keeping the first {}",
            items.len(),
            MAX_SLICES
        );
    }

    items
        .iter()
        .take(MAX_SLICES)
        .enumerate()
        .map(|(slot, item)| {
            let Some(map) = item.as_object() else {
                tracing::warn!("Slot {}: expected an object, using defaults", slot);
                return SlotParams::default();
            };
            let defaults = SlotParams::default();
            SlotParams {
                pitch: number_or(lookup(map, PITCH_KEYS), defaults.pitch, "pitch", slot),
                playmode: number_or(lookup(map, PLAYMODE_KEYS), defaults.playmode, "playmode", slot),
                reverse: reverse_or(lookup(map, REVERSE_KEYS), slot),
                volume: volume_or(lookup(map, VOLUME_KEYS), slot),
            }
        })
        .collect()
}

fn from_tables(map: &Map<String, Value>) -> Vec<SlotParams> {
    let pitch = lookup(map, PITCH_KEYS);
    let playmode = lookup(map, PLAYMODE_KEYS);
    let reverse = lookup(map, REVERSE_KEYS);
    let volume = lookup(map, VOLUME_KEYS);

    let slots = [pitch, playmode, reverse, volume]
        .iter()
        .map(|value| match value {
            Some(Value::Array(items)) => items.len(),
            Some(_) => MAX_SLICES,
            None => 0,
        })
        .max()
        .unwrap_or(0);
    if slots > MAX_SLICES {
        tracing::warn!(
            "Parameter tables have {} entries, keeping the first {}",
            slots,
            MAX_SLICES
        );
    }

    let defaults = SlotParams::default();
    (0..slots.min(MAX_SLICES))
        .map(|slot| SlotParams {
            pitch: number_or(entry(pitch, slot), defaults.pitch, "pitch", slot),
            playmode: number_or(entry(playmode, slot), defaults.playmode, "playmode", slot),
            reverse: reverse_or(entry(reverse, slot), slot),
            volume: volume_or(entry(volume, slot), slot),
        })
        .collect()
}

/// Element `slot` of an array, or the value itself when it is a scalar.
fn entry(value: Option<&Value>, slot: usize) -> Option<&Value> {
    match value? {
        Value::Array(items) => items.get(slot),
        scalar => Some(scalar),
    }
}

fn number_or(value: Option<&Value>, default: f64, name: &str, slot: usize) -> f64 {
    match value {
        None | Some(Value::Null) => default,
        Some(value) => match as_number(value) {
            Some(n) => n,
            None => {
                tracing::warn!("Slot {}: unusable {} value {}, using {}", slot, name, value, default);
                default
            }
        },
    }
}

/// Volume is a level between silent and [`params::VOLUME_MAX`].
fn volume_or(value: Option<&Value>, slot: usize) -> f64 {
    let volume = number_or(value, params::VOLUME, "volume", slot);
    let clamped = volume.clamp(0.0, params::VOLUME_MAX);
    if clamped != volume {
        tracing::warn!("Slot {}: volume {} clamped to {}", slot, volume, clamped);
    }
    clamped
}

fn as_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }?;
    // Clamped so every accepted value fits the device's 32-bit fields
    n.is_finite()
        .then_some(n.clamp(i32::MIN as f64, i32::MAX as f64))
}

/// Reverse accepts booleans, their string spellings, and the two sentinels.
fn reverse_or(value: Option<&Value>, slot: usize) -> Reverse {
    let parsed = match value {
        None | Some(Value::Null) => return Reverse::Forward,
        Some(Value::Bool(b)) => Some(Reverse::from(*b)),
        Some(Value::Number(n)) => n.as_i64().and_then(Reverse::from_sentinel),
        Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "reverse" | "reversed" => Some(Reverse::Reversed),
            "false" | "no" | "forward" => Some(Reverse::Forward),
            other => other.parse::<i64>().ok().and_then(Reverse::from_sentinel),
        },
        Some(_) => None,
    };

    parsed.unwrap_or_else(|| {
        let shown = value.map(ToString::to_string).unwrap_or_default();
        tracing::warn!(
            "Slot {}: unusable reverse value {}, expected a boolean, {} or {}",
            slot,
            shown,
            params::REVERSE_FORWARD,
            params::REVERSE_REVERSED
        );
        Reverse::Forward
    })
}
