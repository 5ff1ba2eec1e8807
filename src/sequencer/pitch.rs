/// Angle-to-pitch mapping: the direction of a block as seen from the sweep
/// origin picks one of eight scale degrees.
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use super::GridCoordinate;

/// Major scale over one octave, one entry per eighth of a turn.
pub const DIATONIC_SCALE: [i32; 8] = [0, 2, 4, 5, 7, 9, 11, 12];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PitchMapping {
    /// Sector index looked up in `DIATONIC_SCALE`.
    #[default]
    Diatonic,
    /// Sector index used directly as the semitone offset.
    RawIndex,
}

impl PitchMapping {
    pub fn pitch_of(self, origin: GridCoordinate, cell: GridCoordinate, offset: i32) -> i32 {
        if cell.row == origin.row {
            // atan is undefined here; these two values bypass the scale lookup
            return if cell.col >= origin.col {
                2 + offset
            } else {
                6 + offset
            };
        }

        let sector = sector_index(origin, cell);
        match self {
            PitchMapping::Diatonic => DIATONIC_SCALE[sector] + offset,
            PitchMapping::RawIndex => sector as i32 + offset,
        }
    }
}

/// Default mapping, see `PitchMapping::Diatonic`.
pub fn pitch_of(origin: GridCoordinate, cell: GridCoordinate, offset: i32) -> i32 {
    PitchMapping::Diatonic.pitch_of(origin, cell, offset)
}

/// Which eighth of the turn `cell` sits in. Caller guarantees the rows differ.
fn sector_index(origin: GridCoordinate, cell: GridCoordinate) -> usize {
    let dx = (cell.col - origin.col) as f64;
    let dy = (cell.row - origin.row) as f64;
    let mut raw = (dx / dy).atan() * 4.0 / PI;
    if cell.row < origin.row {
        raw += 4.0;
    } else if cell.col < origin.col {
        raw += 8.0;
    }
    // raw lands in [0, 8); the clamp only absorbs float edge noise
    (raw.floor() as i64).clamp(0, 7) as usize
}
