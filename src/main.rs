//! radsynth CLI - place blocks on the grid and run one sweep from an origin

use anyhow::{bail, Context};
use clap::Parser;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::{Arc, RwLock};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

use radsynth::sequencer::NUM_INSTRUMENTS;
use radsynth::{
    midi_note_name, AudioOutput, BlockBrush, BlockGrid, Config, GridCoordinate, MidiOutputDevice,
    NoteSink, PlayMode, PlaybackEngine, PlaybackEvent, SinkError, SustainKind, SynthVoices,
};

#[derive(Parser, Debug)]
#[command(name = "radsynth")]
#[command(author, version, about = "Radial ring-sweep sequencer", long_about = None)]
struct Args {
    /// Path to config TOML (defaults are used when omitted)
    #[arg(long)]
    config: Option<PathBuf>,

    /// List MIDI output ports and exit
    #[arg(long)]
    list_ports: bool,

    /// MIDI output port index (overrides config)
    #[arg(long)]
    midi_port: Option<usize>,

    /// Do not play through the built-in synth
    #[arg(long)]
    no_audio: bool,

    /// Sweep origin as COL,ROW
    #[arg(long, value_parser = parse_coordinate)]
    origin: Option<GridCoordinate>,

    /// Note block as COL,ROW,INSTRUMENT,SHAPE[,OFFSET]; SHAPE is circle or square
    #[arg(long = "block", value_parser = parse_block)]
    blocks: Vec<BlockSpec>,
}

#[derive(Debug, Clone)]
struct BlockSpec {
    at: GridCoordinate,
    instrument: u8,
    sustain: SustainKind,
    offset: Option<i32>,
}

fn parse_coordinate(s: &str) -> Result<GridCoordinate, String> {
    let (col, row) = s
        .split_once(',')
        .ok_or_else(|| format!("expected COL,ROW, got {s:?}"))?;
    let col = col.trim().parse().map_err(|e| format!("bad column: {e}"))?;
    let row = row.trim().parse().map_err(|e| format!("bad row: {e}"))?;
    Ok(GridCoordinate::new(col, row))
}

fn parse_block(s: &str) -> Result<BlockSpec, String> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    if !(4..=5).contains(&parts.len()) {
        return Err(format!("expected COL,ROW,INSTRUMENT,SHAPE[,OFFSET], got {s:?}"));
    }
    let at = parse_coordinate(&format!("{},{}", parts[0], parts[1]))?;
    let instrument: u8 = parts[2]
        .parse()
        .map_err(|e| format!("bad instrument: {e}"))?;
    if instrument >= NUM_INSTRUMENTS {
        return Err(format!("instrument {instrument} out of range 0..{NUM_INSTRUMENTS}"));
    }
    let sustain = match parts[3] {
        "circle" | "short" => SustainKind::Short,
        "square" | "held" => SustainKind::Held,
        other => return Err(format!("unknown shape {other:?}")),
    };
    let offset = parts
        .get(4)
        .map(|o| o.parse().map_err(|e| format!("bad offset: {e}")))
        .transpose()?;
    Ok(BlockSpec {
        at,
        instrument,
        sustain,
        offset,
    })
}

/// Blocks for one line of input. End of input does not count as Enter.
fn wait_for_enter(input: &mut impl BufRead) -> bool {
    let mut line = String::new();
    matches!(input.read_line(&mut line), Ok(n) if n > 0)
}

/// Fans notes out to whichever outputs are open.
struct Outputs {
    midi: Option<MidiOutputDevice>,
    synth: Option<SynthVoices>,
}

impl NoteSink for Outputs {
    fn note_on(&mut self, pitch: i32, instrument: u8) -> Result<(), SinkError> {
        let midi = self.midi.as_mut().map(|m| m.note_on(pitch, instrument));
        let synth = self.synth.as_mut().map(|s| s.note_on(pitch, instrument));
        midi.unwrap_or(Ok(())).and(synth.unwrap_or(Ok(())))
    }

    fn note_off(&mut self, pitch: i32) -> Result<(), SinkError> {
        let midi = self.midi.as_mut().map(|m| m.note_off(pitch));
        let synth = self.synth.as_mut().map(|s| s.note_off(pitch));
        midi.unwrap_or(Ok(())).and(synth.unwrap_or(Ok(())))
    }
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    if args.list_ports {
        for (i, name) in MidiOutputDevice::available_ports().iter().enumerate() {
            println!("{i}: {name}");
        }
        return Ok(());
    }

    let config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => Config::default(),
    };
    let Some(origin) = args.origin else {
        bail!("--origin COL,ROW is required");
    };

    let mut grid = BlockGrid::new(config.grid.width, config.grid.height);
    let mut brush = BlockBrush::new(&config.brush);
    for spec in &args.blocks {
        brush.set_instrument(spec.instrument);
        brush.set_sustain(spec.sustain);
        let mut block = brush.block();
        if let Some(offset) = spec.offset {
            block.offset = offset;
        }
        if !grid.place(spec.at, block) {
            warn!(col = spec.at.col, row = spec.at.row, "block outside the grid, skipped");
        }
    }
    info!(blocks = grid.len(), "grid ready");

    let midi = match args.midi_port.or(config.midi.port) {
        Some(port) => {
            let mut device = MidiOutputDevice::new(&config.midi);
            device
                .connect(port)
                .with_context(|| format!("connecting to MIDI port {port}"))?;
            Some(device)
        }
        None => None,
    };
    // the stream must outlive the sweep
    let audio = if args.no_audio {
        None
    } else {
        let output = AudioOutput::new();
        if output.is_none() {
            warn!("no audio device available, continuing without the synth");
        }
        output
    };
    let synth = audio.as_ref().map(AudioOutput::sink);

    let mut engine = PlaybackEngine::new(&config)
        .context("invalid configuration")?
        .with_output(Outputs { midi, synth });

    let cancel = engine.cancel_flag();
    thread::spawn(move || {
        if wait_for_enter(&mut std::io::stdin().lock()) {
            cancel.store(true, Ordering::Release);
        } else {
            debug!("stdin closed, sweep runs to completion");
        }
    });

    let blocks = Arc::new(RwLock::new(grid));
    engine
        .start(origin, blocks)
        .context("starting sweep")?;
    let mut mode = PlayMode::Playing;
    println!("Sweeping from ({}, {}); press Enter to stop", origin.col, origin.row);

    while mode.is_playing() {
        let Some(event) = engine.next_event(Duration::from_millis(100)) else {
            if !engine.is_running() {
                mode = mode.toggle();
            }
            continue;
        };
        match event {
            PlaybackEvent::SweepStarted(at) => debug!(col = at.col, row = at.row, "sweep started"),
            PlaybackEvent::RingVisited { ring, cells } => {
                debug!(ring, cells = cells.len(), "ring");
            }
            PlaybackEvent::NoteOn { pitch, instrument } => {
                let name = u8::try_from(pitch)
                    .ok()
                    .filter(|n| *n <= 127)
                    .map(midi_note_name)
                    .unwrap_or_else(|| pitch.to_string());
                info!(note = %name, instrument, "note on");
            }
            PlaybackEvent::NoteOff(pitch) => debug!(pitch, "note off"),
            PlaybackEvent::SweepFinished(report) => {
                println!(
                    "{:?} after {} rings: {} notes, {} output failures",
                    report.outcome, report.rings_visited, report.notes_played, report.failures
                );
                mode = mode.toggle();
            }
        }
    }
    engine.wait();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_coordinate() {
        assert_eq!(parse_coordinate("5, 7").unwrap(), GridCoordinate::new(5, 7));
        assert!(parse_coordinate("5").is_err());
        assert!(parse_coordinate("a,1").is_err());
    }

    #[test]
    fn test_parse_block() {
        let spec = parse_block("8,5,0,circle").unwrap();
        assert_eq!(spec.at, GridCoordinate::new(8, 5));
        assert_eq!(spec.sustain, SustainKind::Short);
        assert_eq!(spec.offset, None);

        let spec = parse_block("1,2,3,square,76").unwrap();
        assert_eq!(spec.instrument, 3);
        assert_eq!(spec.sustain, SustainKind::Held);
        assert_eq!(spec.offset, Some(76));

        assert!(parse_block("1,2,3,triangle").is_err());
        assert!(parse_block("1,2").is_err());
    }

    #[test]
    fn test_parse_block_rejects_unknown_instrument() {
        assert!(parse_block("1,2,9,circle").is_err());
        assert!(parse_block("1,2,4,square").is_err());
        assert_eq!(parse_block("1,2,0,circle").unwrap().instrument, 0);
    }

    #[test]
    fn test_enter_detection() {
        assert!(wait_for_enter(&mut std::io::Cursor::new("\n")));
        assert!(wait_for_enter(&mut std::io::Cursor::new("stop\n")));
        assert!(!wait_for_enter(&mut std::io::Cursor::new("")));
    }
}
