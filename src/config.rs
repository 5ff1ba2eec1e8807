/// Runtime configuration, loaded from TOML
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;
use crate::sequencer::pitch::PitchMapping;

/// Largest grid edge accepted; keeps coordinate math well inside `i32`.
pub const MAX_GRID_DIMENSION: usize = 4096;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub grid: GridConfig,
    #[serde(default)]
    pub sweep: SweepConfig,
    #[serde(default)]
    pub brush: BrushConfig,
    #[serde(default)]
    pub midi: MidiConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.grid.validate()?;
        self.sweep.validate(&self.grid)?;
        self.brush.validate()?;
        self.midi.validate()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridConfig {
    #[serde(default = "GridConfig::default_width")]
    pub width: usize,
    #[serde(default = "GridConfig::default_height")]
    pub height: usize,
    /// Pixel size of one cell. Only renderers care about this.
    #[serde(default = "GridConfig::default_cell_size")]
    pub cell_size: u32,
}

impl GridConfig {
    fn default_width() -> usize {
        24
    }
    fn default_height() -> usize {
        24
    }
    fn default_cell_size() -> u32 {
        36
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [("width", self.width), ("height", self.height)] {
            if value == 0 || value > MAX_GRID_DIMENSION {
                return Err(ConfigError::Invalid(format!(
                    "grid {name} must be in 1..={MAX_GRID_DIMENSION}, got {value}"
                )));
            }
        }
        Ok(())
    }
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            width: Self::default_width(),
            height: Self::default_height(),
            cell_size: Self::default_cell_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    #[serde(default = "SweepConfig::default_max_rings")]
    pub max_rings: usize,
    #[serde(default = "SweepConfig::default_dwell_ms")]
    pub dwell_ms: u64,
    #[serde(default = "SweepConfig::default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default)]
    pub pitch_mapping: PitchMapping,
    /// Send note-on again for every held note on every ring.
    #[serde(default = "SweepConfig::default_retrigger_held")]
    pub retrigger_held: bool,
    /// Copy the block map at sweep start instead of reading it live each ring.
    #[serde(default)]
    pub snapshot_blocks: bool,
}

impl SweepConfig {
    fn default_max_rings() -> usize {
        200
    }
    fn default_dwell_ms() -> u64 {
        300
    }
    fn default_poll_interval_ms() -> u64 {
        10
    }
    fn default_retrigger_held() -> bool {
        true
    }

    pub fn dwell(&self) -> Duration {
        Duration::from_millis(self.dwell_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn validate(&self, grid: &GridConfig) -> Result<(), ConfigError> {
        let needed = grid.width.max(grid.height);
        if self.max_rings < needed {
            return Err(ConfigError::Invalid(format!(
                "max_rings {} cannot cover a {}x{} grid (need at least {needed})",
                self.max_rings, grid.width, grid.height
            )));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "poll_interval_ms must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            max_rings: Self::default_max_rings(),
            dwell_ms: Self::default_dwell_ms(),
            poll_interval_ms: Self::default_poll_interval_ms(),
            pitch_mapping: PitchMapping::default(),
            retrigger_held: Self::default_retrigger_held(),
            snapshot_blocks: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrushConfig {
    #[serde(default = "BrushConfig::default_offset")]
    pub default_offset: i32,
    #[serde(default = "BrushConfig::default_min_offset")]
    pub min_offset: i32,
    #[serde(default = "BrushConfig::default_max_offset")]
    pub max_offset: i32,
    #[serde(default = "BrushConfig::default_offset_step")]
    pub offset_step: i32,
}

impl BrushConfig {
    fn default_offset() -> i32 {
        64
    }
    fn default_min_offset() -> i32 {
        52
    }
    fn default_max_offset() -> i32 {
        88
    }
    fn default_offset_step() -> i32 {
        12
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.min_offset <= self.default_offset && self.default_offset <= self.max_offset) {
            return Err(ConfigError::Invalid(format!(
                "brush offsets must satisfy min <= default <= max, got {} <= {} <= {}",
                self.min_offset, self.default_offset, self.max_offset
            )));
        }
        if self.offset_step <= 0 {
            return Err(ConfigError::Invalid(format!(
                "offset_step must be positive, got {}",
                self.offset_step
            )));
        }
        Ok(())
    }
}

impl Default for BrushConfig {
    fn default() -> Self {
        Self {
            default_offset: Self::default_offset(),
            min_offset: Self::default_min_offset(),
            max_offset: Self::default_max_offset(),
            offset_step: Self::default_offset_step(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MidiConfig {
    #[serde(default)]
    pub port: Option<usize>,
    #[serde(default)]
    pub channel: u8,
    #[serde(default = "MidiConfig::default_velocity")]
    pub velocity: u8,
    /// Program number for each instrument index.
    #[serde(default = "MidiConfig::default_programs")]
    pub programs: [u8; 4],
}

impl MidiConfig {
    fn default_velocity() -> u8 {
        60
    }
    fn default_programs() -> [u8; 4] {
        [0, 1, 73, 88]
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.channel > 15 {
            return Err(ConfigError::Invalid(format!(
                "midi channel must be 0-15, got {}",
                self.channel
            )));
        }
        if self.velocity > 127 {
            return Err(ConfigError::Invalid(format!(
                "midi velocity must be 0-127, got {}",
                self.velocity
            )));
        }
        if let Some(program) = self.programs.iter().find(|p| **p > 127) {
            return Err(ConfigError::Invalid(format!(
                "midi program must be 0-127, got {program}"
            )));
        }
        Ok(())
    }
}

impl Default for MidiConfig {
    fn default() -> Self {
        Self {
            port: None,
            channel: 0,
            velocity: Self::default_velocity(),
            programs: Self::default_programs(),
        }
    }
}
