/// MIDI output using midir
use midir::{MidiOutput, MidiOutputConnection};
use tracing::{debug, info};

use crate::config::MidiConfig;
use crate::error::{MidiError, SinkError};
use crate::sequencer::sweeper::NoteSink;

const CLIENT_NAME: &str = "radsynth MIDI Output";

pub struct MidiOutputDevice {
    connection: Option<MidiOutputConnection>,
    channel: u8,
    velocity: u8,
    programs: [u8; 4],
    current_program: Option<u8>,
}

impl MidiOutputDevice {
    pub fn new(config: &MidiConfig) -> Self {
        Self {
            connection: None,
            channel: config.channel & 0x0F,
            velocity: config.velocity.min(127),
            programs: config.programs,
            current_program: None,
        }
    }

    pub fn available_ports() -> Vec<String> {
        if let Ok(midi_out) = MidiOutput::new(CLIENT_NAME) {
            midi_out
                .ports()
                .iter()
                .filter_map(|p| midi_out.port_name(p).ok())
                .collect()
        } else {
            vec![]
        }
    }

    pub fn connect(&mut self, port_index: usize) -> Result<(), MidiError> {
        let midi_out = MidiOutput::new(CLIENT_NAME).map_err(|e| MidiError::Init(e.to_string()))?;

        let ports = midi_out.ports();
        let port = ports
            .get(port_index)
            .ok_or(MidiError::InvalidPort(port_index))?;
        let name = midi_out.port_name(port).unwrap_or_default();

        let connection = midi_out
            .connect(port, "radsynth")
            .map_err(|e| MidiError::Connect(e.to_string()))?;

        info!(port = port_index, name = %name, "connected MIDI output");
        self.connection = Some(connection);
        self.current_program = None;
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    pub fn disconnect(&mut self) {
        self.connection = None;
    }

    fn send(&mut self, message: &[u8]) -> Result<(), SinkError> {
        let conn = self.connection.as_mut().ok_or(SinkError::NotConnected)?;
        conn.send(message)
            .map_err(|e| SinkError::Send(e.to_string()))
    }

    fn program_for(&self, instrument: u8) -> Result<u8, SinkError> {
        self.programs
            .get(instrument as usize)
            .copied()
            .ok_or(SinkError::UnknownInstrument(instrument))
    }
}

impl NoteSink for MidiOutputDevice {
    fn note_on(&mut self, pitch: i32, instrument: u8) -> Result<(), SinkError> {
        let note = midi_note(pitch)?;
        let program = self.program_for(instrument)?;
        if self.current_program != Some(program) {
            self.send(&program_change_message(self.channel, program))?;
            self.current_program = Some(program);
        }
        debug!(note, program, "midi note on");
        self.send(&note_on_message(self.channel, note, self.velocity))
    }

    fn note_off(&mut self, pitch: i32) -> Result<(), SinkError> {
        let note = midi_note(pitch)?;
        self.send(&note_off_message(self.channel, note))
    }
}

impl Default for MidiOutputDevice {
    fn default() -> Self {
        Self::new(&MidiConfig::default())
    }
}

/// Checks that a pitch fits in a MIDI note number.
pub fn midi_note(pitch: i32) -> Result<u8, SinkError> {
    u8::try_from(pitch)
        .ok()
        .filter(|n| *n <= 127)
        .ok_or(SinkError::PitchOutOfRange(pitch))
}

fn note_on_message(channel: u8, note: u8, velocity: u8) -> [u8; 3] {
    [0x90 | channel, note, velocity]
}

fn note_off_message(channel: u8, note: u8) -> [u8; 3] {
    [0x80 | channel, note, 0]
}

fn program_change_message(channel: u8, program: u8) -> [u8; 2] {
    [0xC0 | channel, program]
}

pub fn midi_note_name(note: u8) -> String {
    let note_names = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];
    let octave = (note / 12) as i32 - 1;
    let note_index = (note % 12) as usize;
    format!("{}{}", note_names[note_index], octave)
}
