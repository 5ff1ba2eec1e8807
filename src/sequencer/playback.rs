/// Playback engine - runs sweeps on a background thread and reports what
/// happens as a stream of events
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{error, info};

use super::sweeper::{BlockLookup, NoteSink, RingObserver, RingSweeper, SleepDwell, SweepReport};
use super::{BlockGrid, GridCoordinate};
use crate::config::Config;
use crate::error::{ConfigError, SinkError, SweepError};

#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    SweepStarted(GridCoordinate),
    RingVisited {
        ring: usize,
        cells: Vec<GridCoordinate>,
    },
    NoteOn {
        pitch: i32,
        instrument: u8,
    },
    NoteOff(i32),
    SweepFinished(SweepReport),
}

type SharedOutput = Arc<Mutex<Box<dyn NoteSink + Send>>>;

/// Publishes notes as events, then hands them to the attached output if any.
struct EventSink {
    sender: Sender<PlaybackEvent>,
    output: Option<SharedOutput>,
}

impl NoteSink for EventSink {
    fn note_on(&mut self, pitch: i32, instrument: u8) -> Result<(), SinkError> {
        let _ = self.sender.send(PlaybackEvent::NoteOn { pitch, instrument });
        match &self.output {
            Some(output) => output
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .note_on(pitch, instrument),
            None => Ok(()),
        }
    }

    fn note_off(&mut self, pitch: i32) -> Result<(), SinkError> {
        let _ = self.sender.send(PlaybackEvent::NoteOff(pitch));
        match &self.output {
            Some(output) => output
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .note_off(pitch),
            None => Ok(()),
        }
    }
}

struct EventObserver {
    sender: Sender<PlaybackEvent>,
}

impl RingObserver for EventObserver {
    fn on_ring_visited(&mut self, ring: usize, cells: &[GridCoordinate]) {
        let _ = self.sender.send(PlaybackEvent::RingVisited {
            ring,
            cells: cells.to_vec(),
        });
    }
}

pub struct PlaybackEngine {
    sweeper: RingSweeper,
    poll_interval: Duration,
    snapshot_blocks: bool,
    sender: Sender<PlaybackEvent>,
    receiver: Receiver<PlaybackEvent>,
    cancel: Arc<AtomicBool>,
    is_running: Arc<AtomicBool>,
    output: Option<SharedOutput>,
    handle: Option<JoinHandle<()>>,
}

impl PlaybackEngine {
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        let (sender, receiver) = channel();

        Ok(Self {
            sweeper: RingSweeper::from_config(config)?,
            poll_interval: config.sweep.poll_interval(),
            snapshot_blocks: config.sweep.snapshot_blocks,
            sender,
            receiver,
            cancel: Arc::new(AtomicBool::new(false)),
            is_running: Arc::new(AtomicBool::new(false)),
            output: None,
            handle: None,
        })
    }

    /// Sends every note to `output` as well as to the event stream.
    pub fn with_output(mut self, output: impl NoteSink + Send + 'static) -> Self {
        self.output = Some(Arc::new(Mutex::new(Box::new(output))));
        self
    }

    /// The flag `stop` raises; usable as a `CancelSignal` from elsewhere.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn start(
        &mut self,
        origin: GridCoordinate,
        blocks: Arc<RwLock<BlockGrid>>,
    ) -> Result<(), SweepError> {
        let expected = self.sweeper.dimensions();
        let actual = {
            let grid = blocks.read().unwrap_or_else(PoisonError::into_inner);
            (grid.width(), grid.height())
        };
        if actual != expected {
            return Err(SweepError::GridMismatch { expected, actual });
        }
        if self.is_running.swap(true, Ordering::AcqRel) {
            return Err(SweepError::AlreadySweeping);
        }
        let origin = self.sweeper.wrap_origin(origin);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        self.cancel.store(false, Ordering::Release);

        let blocks: Arc<dyn BlockLookup + Send + Sync> = if self.snapshot_blocks {
            let snapshot = blocks.read().unwrap_or_else(PoisonError::into_inner).clone();
            Arc::new(snapshot)
        } else {
            blocks
        };

        let mut sweeper = self.sweeper.clone();
        let mut timer = SleepDwell::new(self.poll_interval);
        let mut sink = EventSink {
            sender: self.sender.clone(),
            output: self.output.clone(),
        };
        let mut observer = EventObserver {
            sender: self.sender.clone(),
        };
        let sender = self.sender.clone();
        let cancel = Arc::clone(&self.cancel);
        let is_running = Arc::clone(&self.is_running);

        self.handle = Some(thread::spawn(move || {
            let _ = sender.send(PlaybackEvent::SweepStarted(origin));
            match sweeper.run(
                origin,
                &*blocks,
                &mut sink,
                &mut observer,
                &*cancel,
                &mut timer,
            ) {
                Ok(report) => {
                    let _ = sender.send(PlaybackEvent::SweepFinished(report));
                }
                Err(e) => error!("sweep aborted: {e}"),
            }
            is_running.store(false, Ordering::Release);
        }));
        info!(col = origin.col, row = origin.row, "playback started");
        Ok(())
    }

    /// Asks the running sweep to stop. It releases its notes before exiting.
    pub fn stop(&self) {
        self.cancel.store(true, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Acquire)
    }

    /// Blocks until the current sweep thread exits.
    pub fn wait(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    pub fn poll_events(&self) -> Vec<PlaybackEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.receiver.try_recv() {
            events.push(event);
        }
        events
    }

    pub fn next_event(&self, timeout: Duration) -> Option<PlaybackEvent> {
        match self.receiver.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        self.stop();
        self.wait();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequencer::sweeper::SweepOutcome;
    use crate::sequencer::{Block, SustainKind};

    fn fast_config() -> Config {
        let mut config = Config::default();
        config.grid.width = 6;
        config.grid.height = 6;
        config.sweep.max_rings = 6;
        config.sweep.dwell_ms = 0;
        config.sweep.poll_interval_ms = 1;
        config
    }

    fn collect_until_finished(engine: &PlaybackEngine) -> Vec<PlaybackEvent> {
        let mut events = Vec::new();
        while let Some(event) = engine.next_event(Duration::from_secs(5)) {
            let done = matches!(event, PlaybackEvent::SweepFinished(_));
            events.push(event);
            if done {
                break;
            }
        }
        events
    }

    #[test]
    fn test_sweep_emits_rings_and_notes() {
        let mut grid = BlockGrid::new(6, 6);
        grid.place(
            GridCoordinate::new(2, 1),
            Block {
                offset: 60,
                instrument: 2,
                sustain: SustainKind::Short,
            },
        );
        let blocks = Arc::new(RwLock::new(grid));
        let mut engine = PlaybackEngine::new(&fast_config()).unwrap();
        engine.start(GridCoordinate::new(1, 1), blocks).unwrap();
        let events = collect_until_finished(&engine);

        assert_eq!(events[0], PlaybackEvent::SweepStarted(GridCoordinate::new(1, 1)));
        let rings = events
            .iter()
            .filter(|e| matches!(e, PlaybackEvent::RingVisited { .. }))
            .count();
        assert_eq!(rings, 6);
        assert!(events.contains(&PlaybackEvent::NoteOn {
            pitch: 62,
            instrument: 2
        }));
        assert!(events.contains(&PlaybackEvent::NoteOff(62)));
        match events.last() {
            Some(PlaybackEvent::SweepFinished(report)) => {
                assert_eq!(report.outcome, SweepOutcome::Completed)
            }
            other => panic!("unexpected last event {other:?}"),
        }
        engine.wait();
        assert!(!engine.is_running());
    }

    #[test]
    fn test_started_event_reports_wrapped_origin() {
        let blocks = Arc::new(RwLock::new(BlockGrid::new(6, 6)));
        let mut engine = PlaybackEngine::new(&fast_config()).unwrap();
        engine.start(GridCoordinate::new(-1, 9), blocks).unwrap();
        let events = collect_until_finished(&engine);

        assert_eq!(events[0], PlaybackEvent::SweepStarted(GridCoordinate::new(5, 3)));
        match events.last() {
            Some(PlaybackEvent::SweepFinished(report)) => {
                assert_eq!(report.origin, GridCoordinate::new(5, 3))
            }
            other => panic!("unexpected last event {other:?}"),
        }
    }

    #[test]
    fn test_rejects_grid_of_other_size() {
        let blocks = Arc::new(RwLock::new(BlockGrid::new(8, 6)));
        let mut engine = PlaybackEngine::new(&fast_config()).unwrap();
        assert_eq!(
            engine.start(GridCoordinate::new(0, 0), blocks),
            Err(SweepError::GridMismatch {
                expected: (6, 6),
                actual: (8, 6)
            })
        );
        assert!(!engine.is_running());
    }

    #[test]
    fn test_stop_cancels_sweep() {
        let mut config = fast_config();
        config.sweep.dwell_ms = 10_000;
        let blocks = Arc::new(RwLock::new(BlockGrid::new(6, 6)));
        let mut engine = PlaybackEngine::new(&config).unwrap();
        engine.start(GridCoordinate::new(0, 0), blocks.clone()).unwrap();
        assert_eq!(
            engine.start(GridCoordinate::new(0, 0), blocks),
            Err(SweepError::AlreadySweeping)
        );
        engine.stop();
        let events = collect_until_finished(&engine);
        match events.last() {
            Some(PlaybackEvent::SweepFinished(report)) => {
                assert_eq!(report.outcome, SweepOutcome::Cancelled);
                assert!(report.rings_visited <= 1);
            }
            other => panic!("unexpected last event {other:?}"),
        }
    }

    #[test]
    fn test_output_receives_notes() {
        #[derive(Clone, Default)]
        struct Counter(Arc<Mutex<(usize, usize)>>);
        impl NoteSink for Counter {
            fn note_on(&mut self, _pitch: i32, _instrument: u8) -> Result<(), SinkError> {
                self.0.lock().unwrap().0 += 1;
                Ok(())
            }
            fn note_off(&mut self, _pitch: i32) -> Result<(), SinkError> {
                self.0.lock().unwrap().1 += 1;
                Ok(())
            }
        }

        let mut config = fast_config();
        config.sweep.snapshot_blocks = true;
        let mut grid = BlockGrid::new(6, 6);
        grid.place(
            GridCoordinate::new(3, 3),
            Block {
                offset: 48,
                instrument: 0,
                sustain: SustainKind::Held,
            },
        );
        let counter = Counter::default();
        let mut engine = PlaybackEngine::new(&config)
            .unwrap()
            .with_output(counter.clone());
        engine
            .start(GridCoordinate::new(3, 3), Arc::new(RwLock::new(grid)))
            .unwrap();
        collect_until_finished(&engine);
        engine.wait();

        let (ons, offs) = *counter.0.lock().unwrap();
        // held block under the origin: retriggered on all six rings, released once
        assert_eq!(ons, 6);
        assert_eq!(offs, 1);
    }
}
