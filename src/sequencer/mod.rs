/// Core sequencer model - grid cells, note blocks and the editing brush
/// Geometry and timing live in the submodules; this is grid-size agnostic.
use std::collections::HashMap;

use crate::config::BrushConfig;

pub mod pitch;
pub mod playback;
pub mod rings;
pub mod sweeper;

/// Number of instrument banks a block can select.
pub const NUM_INSTRUMENTS: u8 = 4;

/// A cell on the toroidal grid, `(column, row)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GridCoordinate {
    pub col: i32,
    pub row: i32,
}

impl GridCoordinate {
    pub const fn new(col: i32, row: i32) -> Self {
        Self { col, row }
    }
}

/// Displacement from a sweep origin, before wrapping onto the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RingOffset {
    pub dx: i32,
    pub dy: i32,
}

impl RingOffset {
    pub const fn new(dx: i32, dy: i32) -> Self {
        Self { dx, dy }
    }

    /// Chebyshev distance from the origin.
    pub fn ring_index(&self) -> u32 {
        self.dx.unsigned_abs().max(self.dy.unsigned_abs())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SustainKind {
    /// Released at the end of the ring it was reached in (circle blocks).
    Short,
    /// Held until the sweep ends (square blocks).
    Held,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    pub offset: i32,
    pub instrument: u8,
    pub sustain: SustainKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoteEvent {
    pub pitch: i32,
    pub instrument: u8,
    pub kind: SustainKind,
}

/// The note blocks placed on the grid.
#[derive(Debug, Clone)]
pub struct BlockGrid {
    blocks: HashMap<GridCoordinate, Block>,
    width: usize,
    height: usize,
}

impl BlockGrid {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            blocks: HashMap::new(),
            width,
            height,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn contains(&self, coord: GridCoordinate) -> bool {
        coord.col >= 0
            && coord.row >= 0
            && (coord.col as usize) < self.width
            && (coord.row as usize) < self.height
    }

    pub fn get(&self, coord: GridCoordinate) -> Option<&Block> {
        self.blocks.get(&coord)
    }

    /// Places a block, replacing whatever was in the cell. Returns false for
    /// coordinates outside the grid.
    pub fn place(&mut self, coord: GridCoordinate, block: Block) -> bool {
        if !self.contains(coord) {
            return false;
        }
        self.blocks.insert(coord, block);
        true
    }

    pub fn remove(&mut self, coord: GridCoordinate) -> Option<Block> {
        self.blocks.remove(&coord)
    }

    pub fn clear(&mut self) {
        self.blocks.clear();
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&GridCoordinate, &Block)> {
        self.blocks.iter()
    }
}

/// Attributes given to newly placed blocks.
#[derive(Debug, Clone)]
pub struct BlockBrush {
    instrument: u8,
    sustain: SustainKind,
    offset: i32,
    min_offset: i32,
    max_offset: i32,
    step: i32,
}

impl BlockBrush {
    pub fn new(config: &BrushConfig) -> Self {
        Self {
            instrument: 0,
            sustain: SustainKind::Short,
            offset: config.default_offset,
            min_offset: config.min_offset,
            max_offset: config.max_offset,
            step: config.offset_step,
        }
    }

    pub fn instrument(&self) -> u8 {
        self.instrument
    }

    pub fn set_instrument(&mut self, instrument: u8) {
        self.instrument = instrument.min(NUM_INSTRUMENTS - 1);
    }

    pub fn sustain(&self) -> SustainKind {
        self.sustain
    }

    pub fn set_sustain(&mut self, sustain: SustainKind) {
        self.sustain = sustain;
    }

    pub fn offset(&self) -> i32 {
        self.offset
    }

    /// One step up, only while still below the upper bound.
    pub fn raise_offset(&mut self) {
        if self.offset < self.max_offset {
            self.offset += self.step;
        }
    }

    /// One step down, only while still above the lower bound.
    pub fn lower_offset(&mut self) {
        if self.offset > self.min_offset {
            self.offset -= self.step;
        }
    }

    pub fn block(&self) -> Block {
        Block {
            offset: self.offset,
            instrument: self.instrument,
            sustain: self.sustain,
        }
    }
}

impl Default for BlockBrush {
    fn default() -> Self {
        Self::new(&BrushConfig::default())
    }
}

/// Whether a click edits the grid (Paused) or starts a sweep (Playing).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayMode {
    #[default]
    Paused,
    Playing,
}

impl PlayMode {
    pub fn toggle(self) -> Self {
        match self {
            PlayMode::Paused => PlayMode::Playing,
            PlayMode::Playing => PlayMode::Paused,
        }
    }

    pub fn is_playing(self) -> bool {
        self == PlayMode::Playing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn short_block(offset: i32) -> Block {
        Block {
            offset,
            instrument: 0,
            sustain: SustainKind::Short,
        }
    }

    #[test]
    fn test_grid_creation() {
        let grid = BlockGrid::new(24, 16);
        assert_eq!(grid.width(), 24);
        assert_eq!(grid.height(), 16);
        assert!(grid.is_empty());
    }

    #[test]
    fn test_place_replaces_existing_block() {
        let mut grid = BlockGrid::new(4, 4);
        let at = GridCoordinate::new(1, 2);
        assert!(grid.place(at, short_block(64)));
        assert!(grid.place(at, short_block(76)));
        assert_eq!(grid.len(), 1);
        assert_eq!(grid.get(at).map(|b| b.offset), Some(76));
    }

    #[test]
    fn test_place_outside_grid_is_ignored() {
        let mut grid = BlockGrid::new(4, 4);
        assert!(!grid.place(GridCoordinate::new(4, 0), short_block(64)));
        assert!(!grid.place(GridCoordinate::new(0, -1), short_block(64)));
        assert!(grid.is_empty());
    }

    #[test]
    fn test_remove_and_clear() {
        let mut grid = BlockGrid::new(4, 4);
        grid.place(GridCoordinate::new(0, 0), short_block(64));
        grid.place(GridCoordinate::new(3, 3), short_block(64));
        assert!(grid.remove(GridCoordinate::new(0, 0)).is_some());
        assert!(grid.remove(GridCoordinate::new(0, 0)).is_none());
        grid.clear();
        assert!(grid.is_empty());
    }

    #[test]
    fn test_brush_offset_bounds() {
        let mut brush = BlockBrush::default();
        assert_eq!(brush.offset(), 64);
        brush.raise_offset();
        brush.raise_offset();
        assert_eq!(brush.offset(), 88);
        brush.raise_offset();
        assert_eq!(brush.offset(), 88);
        for _ in 0..5 {
            brush.lower_offset();
        }
        assert_eq!(brush.offset(), 52);
    }

    #[test]
    fn test_brush_instrument_clamped() {
        let mut brush = BlockBrush::default();
        brush.set_instrument(9);
        assert_eq!(brush.instrument(), NUM_INSTRUMENTS - 1);
        brush.set_sustain(SustainKind::Held);
        let block = brush.block();
        assert_eq!(block.sustain, SustainKind::Held);
        assert_eq!(block.instrument, 3);
    }

    #[test]
    fn test_play_mode_toggle() {
        let mode = PlayMode::default();
        assert!(!mode.is_playing());
        assert!(mode.toggle().is_playing());
        assert_eq!(mode.toggle().toggle(), PlayMode::Paused);
    }

    #[test]
    fn test_ring_index_is_chebyshev() {
        assert_eq!(RingOffset::new(0, 0).ring_index(), 0);
        assert_eq!(RingOffset::new(-3, 2).ring_index(), 3);
        assert_eq!(RingOffset::new(1, -4).ring_index(), 4);
    }
}
