//! Slice boundary calculation
//!
//! Slices are packed back to back with exclusive ends: a populated slot `i`
//! covers frames `start[i]..end[i]`, and the next populated slot starts at
//! `end[i]`. Unused slots are written as `(0, 0)`, never as the running
//! cursor, because the firmware treats `(0, 0)` as "no sample here".

use crate::{MAX_SLICES, TARGET_SAMPLE_RATE};

/// Start/end frame table for all device slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlicePlan {
    pub start: [u64; MAX_SLICES],
    pub end: [u64; MAX_SLICES],
}

impl Default for SlicePlan {
    fn default() -> Self {
        Self {
            start: [0; MAX_SLICES],
            end: [0; MAX_SLICES],
        }
    }
}

impl SlicePlan {
    /// Pack slices from their frame counts.
    ///
    /// Counts past [`MAX_SLICES`] are ignored; a zero count leaves the slot
    /// empty and does not advance the cursor. The cursor saturates at
    /// `u64::MAX`; a slice with no frames left to claim stays empty.
    pub fn from_frame_counts(frame_counts: &[u64]) -> Self {
        let mut plan = Self::default();
        let mut cursor = 0u64;

        for (slot, &count) in frame_counts.iter().take(MAX_SLICES).enumerate() {
            if count == 0 {
                continue;
            }
            let end = cursor.saturating_add(count);
            if end == cursor {
                tracing::warn!(slot, "Frame cursor exhausted, leaving slot empty");
                continue;
            }
            plan.start[slot] = cursor;
            plan.end[slot] = end;
            cursor = end;
        }

        tracing::debug!(
            slices = plan.populated_count(),
            total_frames = cursor,
            "Computed slice plan from frame counts"
        );
        plan
    }

    /// Pack slices from probed durations against an already rendered buffer.
    ///
    /// Each populated slice owns its trailing `gap_seconds` of padding, so the
    /// packing stays gap-free. The effective sample rate is derived from
    /// `total_frames` over the summed durations, which absorbs any drift
    /// between probed durations and what the transcoder actually produced.
    /// Slices that would run past `total_frames` are shortened, and a slice
    /// with nothing left becomes an empty slot.
    pub fn from_durations(durations: &[f64], total_frames: u64, gap_seconds: f64) -> Self {
        let gap = if gap_seconds.is_finite() {
            gap_seconds.max(0.0)
        } else {
            0.0
        };
        let padded: Vec<f64> = durations
            .iter()
            .take(MAX_SLICES)
            .map(|&d| {
                if d.is_finite() && d > 0.0 {
                    d + gap
                } else {
                    0.0
                }
            })
            .collect();

        let total_duration: f64 = padded.iter().sum();
        let sample_rate = effective_sample_rate(total_frames, total_duration);

        let mut remaining = total_frames;
        let counts: Vec<u64> = padded
            .iter()
            .map(|&d| {
                let wanted = (d * sample_rate).round() as u64;
                let len = wanted.min(remaining);
                remaining -= len;
                len
            })
            .collect();

        tracing::debug!(sample_rate, total_frames, "Derived slice lengths from durations");
        Self::from_frame_counts(&counts)
    }

    /// Whether the slot holds the empty `(0, 0)` marker.
    pub fn is_empty_slot(&self, slot: usize) -> bool {
        self.start[slot] == 0 && self.end[slot] == 0
    }

    /// Populated slots as `(slot, start, end)`.
    pub fn populated(&self) -> impl Iterator<Item = (usize, u64, u64)> + '_ {
        (0..MAX_SLICES)
            .filter(|&slot| !self.is_empty_slot(slot))
            .map(|slot| (slot, self.start[slot], self.end[slot]))
    }

    pub fn populated_count(&self) -> usize {
        self.populated().count()
    }

    /// One past the last frame used by any slice.
    pub fn total_frames(&self) -> u64 {
        self.end.iter().copied().max().unwrap_or(0)
    }
}

/// Frames per second implied by a rendered buffer and its source durations.
///
/// Falls back to [`TARGET_SAMPLE_RATE`] when there is no duration to divide by.
pub fn effective_sample_rate(total_frames: u64, total_duration: f64) -> f64 {
    if total_duration > 0.0 {
        total_frames as f64 / total_duration
    } else {
        TARGET_SAMPLE_RATE as f64
    }
}
