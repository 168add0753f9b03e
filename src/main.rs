// 16 8-bit data registers named V0 to VF
// I -> address register (12 bits)
//
// Delay timer & Sound timer: Count down at 60 times / s until 0
// Beep when sound timer is non-zero
//
// Display res: 64 width, 32 height
//
// Separately:
// CPU: `speed` instructions per frame
// Display: 60 times per second
// Timer: `timer_hz` times per second

use std::{fs, path::PathBuf, time::Instant};

use anyhow::{Context, Result};
use chipvm::{
    config::{DEFAULT_SCALE, DEFAULT_SPEED},
    screen::Screen,
    sound::Sound,
    timer::{Clock, TIMER_DEC_PER_SECOND},
    Advance, Architecture, Config, Emulator,
};
use clap::Parser;
use log::{error, info, warn};

#[derive(Parser, Debug)]
#[command(version, about = "CHIP-8 interpreter", long_about = None)]
struct Args {
    /// Path to the ROM file to run
    rom: PathBuf,

    /// Interpreter lineage for the ambiguous instructions
    #[arg(short, long, value_enum, default_value_t = Architecture::Chip)]
    arch: Architecture,

    /// Instructions executed per frame
    #[arg(short, long, default_value_t = DEFAULT_SPEED,
          value_parser = clap::value_parser!(u32).range(1..=1000))]
    speed: u32,

    /// Delay and sound timer rate in ticks per second
    #[arg(long, default_value_t = TIMER_DEC_PER_SECOND,
          value_parser = clap::value_parser!(u32).range(1..=1000))]
    timer_hz: u32,

    /// Window scale factor (rounded up to 1, 2, 4, 8, 16 or 32)
    #[arg(long, default_value_t = DEFAULT_SCALE)]
    scale: usize,

    /// Do not open an audio device
    #[arg(short, long)]
    mute: bool,
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        Config {
            arch: args.arch,
            speed: args.speed,
            timer_hz: args.timer_hz,
            scale: args.scale,
            mute: args.mute,
            ..Config::new(args.rom)
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let config: Config = Args::parse().into();
    run(&config)
}

fn run(config: &Config) -> Result<()> {
    let rom = fs::read(&config.rom)
        .with_context(|| format!("failed to read ROM {}", config.rom.display()))?;
    let mut emu = Emulator::new(config.arch);
    let len = emu
        .load_program(&rom)
        .with_context(|| format!("failed to load ROM {}", config.rom.display()))?;
    info!(
        "loaded {} ({len} bytes), {:?} architecture",
        config.rom.display(),
        config.arch
    );

    let mut screen = Screen::new(config.scale)?;
    let mut sound = if config.mute {
        None
    } else {
        Sound::new()
            .map_err(|e| warn!("continuing without sound: {e}"))
            .ok()
    };
    let mut timers = Clock::new(config.timer_hz, Instant::now());

    while screen.is_running() {
        for _ in 0..config.speed {
            if !emu.in_program() {
                break;
            }
            match emu.step(&screen) {
                // key state only changes between frames
                Ok(Advance::Reissue) => break,
                Ok(_) => {}
                Err(e) => {
                    error!("halting at {:03x}: {e}", emu.pc.0);
                    return Err(e.into());
                }
            }
        }

        for _ in 0..timers.due(Instant::now()) {
            emu.sync_timers();
        }
        if let Some(sound) = sound.as_mut() {
            sound.set_active(emu.is_sound_active());
        }
        screen.render(emu.frame_buffer())?;
    }

    info!("window closed, exiting");
    Ok(())
}
