use std::path::PathBuf;

use clap::ValueEnum;

use crate::timer::TIMER_DEC_PER_SECOND;

/// Interpreter lineage. Selects the behaviour of the three ambiguous
/// instruction families: 8XY6/8XYE shifts, FX55/FX65 block store and load,
/// and BNNN jump with offset.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Architecture {
    /// CHIP-48 / SUPER-CHIP style: shifts act on VX, I is left alone by
    /// FX55/FX65, BXNN adds VX.
    #[default]
    Chip,
    /// Original COSMAC VIP: shifts copy VY first, FX55/FX65 advance I,
    /// BNNN adds V0.
    Cosmac,
}

pub const DEFAULT_SPEED: u32 = 11;
pub const DEFAULT_SCALE: usize = 16;

/// Runtime settings gathered once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub rom: PathBuf,
    pub arch: Architecture,
    /// instructions per frame
    pub speed: u32,
    pub timer_hz: u32,
    pub scale: usize,
    pub mute: bool,
}

impl Config {
    pub fn new(rom: PathBuf) -> Self {
        Self {
            rom,
            arch: Architecture::default(),
            speed: DEFAULT_SPEED,
            timer_hz: TIMER_DEC_PER_SECOND,
            scale: DEFAULT_SCALE,
            mute: false,
        }
    }
}
