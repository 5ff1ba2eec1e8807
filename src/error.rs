/// Error types shared across the engine and its note sinks
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Failure reported by a `NoteSink`. The sweep logs these and keeps going.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("pitch {0} is outside the playable range 0..=127")]
    PitchOutOfRange(i32),

    #[error("instrument {0} has no sound bank")]
    UnknownInstrument(u8),

    #[error("output is not connected")]
    NotConnected,

    #[error("failed to send note: {0}")]
    Send(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SweepError {
    #[error("a sweep is already in progress")]
    AlreadySweeping,

    #[error("no sweep is in progress")]
    NotSweeping,

    #[error("every planned ring has been visited")]
    RingsExhausted,

    #[error("block grid is {actual:?} but the sweeper expects {expected:?}")]
    GridMismatch {
        expected: (usize, usize),
        actual: (usize, usize),
    },
}

#[derive(Debug, Error)]
pub enum MidiError {
    #[error("failed to create MIDI output: {0}")]
    Init(String),

    #[error("invalid port index {0}")]
    InvalidPort(usize),

    #[error("failed to connect: {0}")]
    Connect(String),
}
