/// Audio output using cpal - a small polyphonic oscillator bank, one
/// waveform per instrument
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{error, warn};

use crate::error::SinkError;
use crate::midi::midi_note;
use crate::sequencer::sweeper::NoteSink;

const MAX_VOICES: usize = 32;
const VOICE_GAIN: f32 = 0.1;
/// Per-sample amplitude step for attack and release ramps.
const RAMP_STEP: f32 = 0.002;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Waveform {
    Sine,
    Triangle,
    Square,
    Saw,
}

impl Waveform {
    pub fn for_instrument(instrument: u8) -> Option<Self> {
        match instrument {
            0 => Some(Waveform::Sine),
            1 => Some(Waveform::Triangle),
            2 => Some(Waveform::Square),
            3 => Some(Waveform::Saw),
            _ => None,
        }
    }

    fn sample(self, phase: f32) -> f32 {
        match self {
            Waveform::Sine => (phase * 2.0 * std::f32::consts::PI).sin(),
            Waveform::Triangle => 1.0 - 4.0 * (phase - 0.5).abs(),
            Waveform::Square => {
                if phase < 0.5 {
                    0.5
                } else {
                    -0.5
                }
            }
            Waveform::Saw => phase - 0.5,
        }
    }
}

#[derive(Debug, Clone)]
struct Voice {
    note: u8,
    frequency: f32,
    waveform: Waveform,
    phase: f32,
    level: f32,
    released: bool,
}

impl Voice {
    fn next_sample(&mut self, sample_rate: f32) -> f32 {
        if self.released {
            self.level = (self.level - RAMP_STEP).max(0.0);
        } else {
            self.level = (self.level + RAMP_STEP).min(1.0);
        }
        let out = self.waveform.sample(self.phase) * self.level * VOICE_GAIN;
        self.phase += self.frequency / sample_rate;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
        }
        out
    }

    fn is_silent(&self) -> bool {
        self.released && self.level <= 0.0
    }
}

/// Handle to the voice bank. Cheap to clone and safe to move to the sweep
/// thread; the stream itself stays with `AudioOutput`.
#[derive(Debug, Clone, Default)]
pub struct SynthVoices {
    voices: Arc<Mutex<Vec<Voice>>>,
}

impl SynthVoices {
    pub fn active_voices(&self) -> usize {
        self.lock().iter().filter(|v| !v.released).count()
    }

    pub fn release_all(&self) {
        for voice in self.lock().iter_mut() {
            voice.released = true;
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Voice>> {
        self.voices.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mixes every voice into an interleaved buffer and drops finished ones.
    fn render(&self, data: &mut [f32], channels: usize, sample_rate: f32) {
        let mut voices = self.lock();
        for frame in data.chunks_mut(channels.max(1)) {
            let value: f32 = voices.iter_mut().map(|v| v.next_sample(sample_rate)).sum();
            for sample in frame.iter_mut() {
                *sample = value;
            }
        }
        voices.retain(|v| !v.is_silent());
    }
}

impl NoteSink for SynthVoices {
    fn note_on(&mut self, pitch: i32, instrument: u8) -> Result<(), SinkError> {
        let note = midi_note(pitch)?;
        let waveform =
            Waveform::for_instrument(instrument).ok_or(SinkError::UnknownInstrument(instrument))?;
        let mut voices = self.lock();
        if let Some(voice) = voices.iter_mut().find(|v| v.note == note && !v.released) {
            voice.waveform = waveform;
            voice.phase = 0.0;
            return Ok(());
        }
        if voices.len() >= MAX_VOICES {
            // steal the oldest
            voices.remove(0);
        }
        voices.push(Voice {
            note,
            frequency: midi_note_to_frequency(note),
            waveform,
            phase: 0.0,
            level: 0.0,
            released: false,
        });
        Ok(())
    }

    fn note_off(&mut self, pitch: i32) -> Result<(), SinkError> {
        let note = midi_note(pitch)?;
        for voice in self.lock().iter_mut().filter(|v| v.note == note) {
            voice.released = true;
        }
        Ok(())
    }
}

pub struct AudioOutput {
    _stream: Option<cpal::Stream>,
    voices: SynthVoices,
}

impl AudioOutput {
    pub fn new() -> Option<Self> {
        let voices = SynthVoices::default();
        let stream = Self::setup_audio_stream(voices.clone())?;

        Some(Self {
            _stream: Some(stream),
            voices,
        })
    }

    fn setup_audio_stream(voices: SynthVoices) -> Option<cpal::Stream> {
        let host = cpal::default_host();
        let device = host.default_output_device()?;
        let config = device.default_output_config().ok()?;

        let sample_rate = config.sample_rate().0 as f32;
        let channels = config.channels() as usize;

        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => device.build_output_stream(
                &config.into(),
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    voices.render(data, channels, sample_rate);
                },
                |err| error!("audio stream error: {err}"),
                None,
            ),
            other => {
                warn!(format = ?other, "unsupported sample format");
                return None;
            }
        };

        match stream {
            Ok(stream) => {
                if let Err(e) = stream.play() {
                    warn!("failed to start audio stream: {e}");
                    return None;
                }
                Some(stream)
            }
            Err(e) => {
                warn!("failed to build audio stream: {e}");
                None
            }
        }
    }

    pub fn is_live(&self) -> bool {
        self._stream.is_some()
    }

    /// Sink feeding this output's voice bank.
    pub fn sink(&self) -> SynthVoices {
        self.voices.clone()
    }
}

impl Default for AudioOutput {
    fn default() -> Self {
        Self::new().unwrap_or_else(|| Self {
            _stream: None,
            voices: SynthVoices::default(),
        })
    }
}

fn midi_note_to_frequency(note: u8) -> f32 {
    440.0 * 2.0_f32.powf((note as f32 - 69.0) / 12.0)
}
