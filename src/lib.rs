/// RADSYNTH - A radial ring-sweep sequencer library
///
/// This library provides the core components of a toroidal grid sequencer:
/// - Ring geometry planned once and wrapped onto any grid around any origin
/// - Angle-to-pitch mapping for the blocks a sweep passes over
/// - A ring sweeper that can be stepped or run against a dwell timer
/// - A playback engine running sweeps on a background thread
/// - MIDI and audio note sinks

pub mod audio;
pub mod config;
pub mod error;
pub mod midi;
pub mod sequencer;

// Re-export commonly used types
pub use audio::{AudioOutput, SynthVoices};
pub use config::Config;
pub use error::{ConfigError, MidiError, SinkError, SweepError};
pub use midi::{midi_note_name, MidiOutputDevice};
pub use sequencer::pitch::{pitch_of, PitchMapping};
pub use sequencer::playback::{PlaybackEngine, PlaybackEvent};
pub use sequencer::rings::{wrap, RingPlan, RingPlanner};
pub use sequencer::sweeper::{
    BlockLookup, CancelSignal, DwellTimer, NeverCancel, NoteSink, RingObserver, RingSweeper,
    SleepDwell, SweepOutcome, SweepReport,
};
pub use sequencer::{
    Block, BlockBrush, BlockGrid, GridCoordinate, NoteEvent, PlayMode, RingOffset, SustainKind,
};
