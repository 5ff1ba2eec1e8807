/// Ring sweeper - walks the wrapped rings outward from an origin, one ring per
/// dwell, turning the blocks it passes over into note events
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::pitch::PitchMapping;
use super::rings::{wrap, RingPlan, RingPlanner};
use super::{Block, BlockGrid, GridCoordinate, NoteEvent, RingOffset, SustainKind};
use crate::config::{Config, GridConfig, SweepConfig};
use crate::error::{ConfigError, SinkError, SweepError};

/// Read access to the blocks on the grid.
pub trait BlockLookup {
    fn block_at(&self, coord: GridCoordinate) -> Option<Block>;
}

impl BlockLookup for BlockGrid {
    fn block_at(&self, coord: GridCoordinate) -> Option<Block> {
        self.get(coord).copied()
    }
}

impl<T: BlockLookup + ?Sized> BlockLookup for RwLock<T> {
    fn block_at(&self, coord: GridCoordinate) -> Option<Block> {
        self.read()
            .unwrap_or_else(PoisonError::into_inner)
            .block_at(coord)
    }
}

impl<T: BlockLookup + ?Sized> BlockLookup for Mutex<T> {
    fn block_at(&self, coord: GridCoordinate) -> Option<Block> {
        self.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .block_at(coord)
    }
}

impl<T: BlockLookup + ?Sized> BlockLookup for Arc<T> {
    fn block_at(&self, coord: GridCoordinate) -> Option<Block> {
        (**self).block_at(coord)
    }
}

/// Where note-on/note-off go.
pub trait NoteSink {
    fn note_on(&mut self, pitch: i32, instrument: u8) -> Result<(), SinkError>;
    fn note_off(&mut self, pitch: i32) -> Result<(), SinkError>;
}

/// Gets told which cells each ring covered, before the ring's dwell.
pub trait RingObserver {
    fn on_ring_visited(&mut self, ring_index: usize, cells: &[GridCoordinate]);

    fn on_sweep_finished(&mut self, _report: &SweepReport) {}
}

impl RingObserver for () {
    fn on_ring_visited(&mut self, _ring_index: usize, _cells: &[GridCoordinate]) {}
}

pub trait CancelSignal {
    fn is_requested(&self) -> bool;
}

impl CancelSignal for AtomicBool {
    fn is_requested(&self) -> bool {
        self.load(Ordering::Acquire)
    }
}

impl<T: CancelSignal + ?Sized> CancelSignal for Arc<T> {
    fn is_requested(&self) -> bool {
        (**self).is_requested()
    }
}

/// A signal that never fires.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverCancel;

impl CancelSignal for NeverCancel {
    fn is_requested(&self) -> bool {
        false
    }
}

/// Waits out the per-ring dwell.
pub trait DwellTimer {
    /// Returns true if `cancel` fired before the dwell ran out.
    fn dwell(&mut self, duration: Duration, cancel: &dyn CancelSignal) -> bool;
}

/// Wall-clock dwell that sleeps in `poll_interval` slices, checking the
/// cancel signal between slices.
#[derive(Debug, Clone, Copy)]
pub struct SleepDwell {
    poll_interval: Duration,
}

impl SleepDwell {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            poll_interval: poll_interval.max(Duration::from_millis(1)),
        }
    }
}

impl DwellTimer for SleepDwell {
    fn dwell(&mut self, duration: Duration, cancel: &dyn CancelSignal) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if cancel.is_requested() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            thread::sleep(self.poll_interval.min(deadline - now));
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepOutcome {
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub origin: GridCoordinate,
    pub rings_visited: usize,
    pub notes_played: usize,
    pub failures: usize,
    pub outcome: SweepOutcome,
}

/// Per-sweep state. Dropped when the sweep ends.
#[derive(Debug, Clone)]
pub struct SweepState {
    origin: GridCoordinate,
    rings: Vec<Vec<GridCoordinate>>,
    ring: usize,
    short: Vec<NoteEvent>,
    held: Vec<NoteEvent>,
    rings_visited: usize,
    notes_played: usize,
    failures: usize,
}

impl SweepState {
    pub fn origin(&self) -> GridCoordinate {
        self.origin
    }

    pub fn ring(&self) -> usize {
        self.ring
    }

    pub fn pending_short(&self) -> &[NoteEvent] {
        &self.short
    }

    pub fn pending_held(&self) -> &[NoteEvent] {
        &self.held
    }

    fn note_on(&mut self, sink: &mut dyn NoteSink, event: NoteEvent) {
        match sink.note_on(event.pitch, event.instrument) {
            Ok(()) => self.notes_played += 1,
            Err(e) => {
                warn!(pitch = event.pitch, instrument = event.instrument, "note on failed: {e}");
                self.failures += 1;
            }
        }
    }

    fn note_off(&mut self, sink: &mut dyn NoteSink, event: NoteEvent) {
        if let Err(e) = sink.note_off(event.pitch) {
            warn!(pitch = event.pitch, "note off failed: {e}");
            self.failures += 1;
        }
    }

    fn release_short(&mut self, sink: &mut dyn NoteSink) {
        for event in std::mem::take(&mut self.short) {
            self.note_off(sink, event);
        }
    }
}

#[derive(Debug, Clone, Default)]
pub enum SweeperState {
    #[default]
    Idle,
    Sweeping(SweepState),
}

/// Drives one sweep at a time over a fixed-size torus.
///
/// A sweep can be driven step by step (`start_sweep`, `visit_ring`,
/// `release_ring`, `finish`) from any event loop, or end to end with `run`.
#[derive(Debug, Clone)]
pub struct RingSweeper {
    plan: Arc<RingPlan>,
    width: usize,
    height: usize,
    mapping: PitchMapping,
    retrigger_held: bool,
    dwell: Duration,
    state: SweeperState,
}

impl RingSweeper {
    pub fn new(
        plan: Arc<RingPlan>,
        grid: &GridConfig,
        sweep: &SweepConfig,
    ) -> Result<Self, ConfigError> {
        grid.validate()?;
        sweep.validate(grid)?;
        let needed = grid.width.max(grid.height);
        if plan.len() < needed {
            return Err(ConfigError::Invalid(format!(
                "ring plan has {} rings, a {}x{} grid needs {needed}",
                plan.len(),
                grid.width,
                grid.height
            )));
        }
        Ok(Self {
            plan,
            width: grid.width,
            height: grid.height,
            mapping: sweep.pitch_mapping,
            retrigger_held: sweep.retrigger_held,
            dwell: sweep.dwell(),
            state: SweeperState::Idle,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let plan = RingPlanner::new().plan(config.sweep.max_rings);
        Self::new(Arc::new(plan), &config.grid, &config.sweep)
    }

    pub fn plan(&self) -> &Arc<RingPlan> {
        &self.plan
    }

    pub fn dwell(&self) -> Duration {
        self.dwell
    }

    /// Grid `(width, height)` the sweeper wraps onto.
    pub fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// The cell a sweep started at `origin` actually uses.
    pub fn wrap_origin(&self, origin: GridCoordinate) -> GridCoordinate {
        wrap(origin, RingOffset::new(0, 0), self.width, self.height)
    }

    pub fn state(&self) -> &SweeperState {
        &self.state
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, SweeperState::Idle)
    }

    pub fn current_ring(&self) -> Option<usize> {
        match &self.state {
            SweeperState::Sweeping(state) => Some(state.ring),
            SweeperState::Idle => None,
        }
    }

    /// Idle -> Sweeping. Wraps the whole plan around `origin` up front.
    pub fn start_sweep(&mut self, origin: GridCoordinate) -> Result<(), SweepError> {
        if !self.is_idle() {
            return Err(SweepError::AlreadySweeping);
        }
        let origin = self.wrap_origin(origin);
        info!(col = origin.col, row = origin.row, rings = self.plan.len(), "sweep started");
        self.state = SweeperState::Sweeping(SweepState {
            origin,
            rings: self.plan.wrap_around(origin, self.width, self.height),
            ring: 0,
            short: Vec::new(),
            held: Vec::new(),
            rings_visited: 0,
            notes_played: 0,
            failures: 0,
        });
        Ok(())
    }

    /// Collects the blocks under the current ring, reports the ring to
    /// `observer` and sends note-on for its short notes and the held notes.
    /// Returns the ring index.
    pub fn visit_ring(
        &mut self,
        blocks: &dyn BlockLookup,
        sink: &mut dyn NoteSink,
        observer: &mut dyn RingObserver,
    ) -> Result<usize, SweepError> {
        let SweeperState::Sweeping(state) = &mut self.state else {
            return Err(SweepError::NotSweeping);
        };
        let ring = state.ring;
        let Some(cells) = state.rings.get(ring) else {
            return Err(SweepError::RingsExhausted);
        };

        let held_before = state.held.len();
        for &cell in cells {
            let Some(block) = blocks.block_at(cell) else {
                continue;
            };
            let event = NoteEvent {
                pitch: self.mapping.pitch_of(state.origin, cell, block.offset),
                instrument: block.instrument,
                kind: block.sustain,
            };
            match block.sustain {
                SustainKind::Short => state.short.push(event),
                SustainKind::Held => state.held.push(event),
            }
        }
        observer.on_ring_visited(ring, cells);
        debug!(
            ring,
            short = state.short.len(),
            held = state.held.len(),
            "ring visited"
        );

        for event in state.short.clone() {
            state.note_on(sink, event);
        }
        let first_held = if self.retrigger_held { 0 } else { held_before };
        for event in state.held[first_held..].to_vec() {
            state.note_on(sink, event);
        }
        state.rings_visited += 1;
        Ok(ring)
    }

    /// Releases the current ring's short notes and moves to the next ring.
    /// Returns false once every planned ring has been visited.
    pub fn release_ring(&mut self, sink: &mut dyn NoteSink) -> Result<bool, SweepError> {
        let SweeperState::Sweeping(state) = &mut self.state else {
            return Err(SweepError::NotSweeping);
        };
        state.release_short(sink);
        state.ring += 1;
        Ok(state.ring < state.rings.len())
    }

    /// Sweeping -> Idle. Releases every pending short and held note.
    pub fn finish(
        &mut self,
        sink: &mut dyn NoteSink,
        outcome: SweepOutcome,
    ) -> Result<SweepReport, SweepError> {
        let SweeperState::Sweeping(mut state) = std::mem::take(&mut self.state) else {
            return Err(SweepError::NotSweeping);
        };
        state.release_short(sink);
        for event in std::mem::take(&mut state.held) {
            state.note_off(sink, event);
        }
        let report = SweepReport {
            origin: state.origin,
            rings_visited: state.rings_visited,
            notes_played: state.notes_played,
            failures: state.failures,
            outcome,
        };
        info!(
            rings = report.rings_visited,
            notes = report.notes_played,
            failures = report.failures,
            outcome = ?report.outcome,
            "sweep finished"
        );
        Ok(report)
    }

    /// Runs a whole sweep from `origin`, blocking until it completes or
    /// `cancel` fires. Cancellation is checked before every ring and during
    /// every dwell.
    pub fn run(
        &mut self,
        origin: GridCoordinate,
        blocks: &dyn BlockLookup,
        sink: &mut dyn NoteSink,
        observer: &mut dyn RingObserver,
        cancel: &dyn CancelSignal,
        timer: &mut dyn DwellTimer,
    ) -> Result<SweepReport, SweepError> {
        self.start_sweep(origin)?;
        let mut outcome = SweepOutcome::Completed;
        loop {
            if cancel.is_requested() {
                outcome = SweepOutcome::Cancelled;
                break;
            }
            let ring = self.visit_ring(blocks, sink, observer)?;
            if timer.dwell(self.dwell, cancel) {
                warn!(ring, "sweep cancelled during dwell");
                outcome = SweepOutcome::Cancelled;
                break;
            }
            if !self.release_ring(sink)? {
                break;
            }
        }
        let report = self.finish(sink, outcome)?;
        observer.on_sweep_finished(&report);
        Ok(report)
    }
}
