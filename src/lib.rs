//! CHIP-8 interpreter core and host collaborators.
//!
//! The [`emulator::Emulator`] owns all machine state and never touches the
//! host on its own: the driver feeds it key state through
//! [`keyboard::KeySource`], ticks its timers and reads its frame buffer.

pub mod config;
pub mod decode;
pub mod display;
pub mod emulator;
pub mod error;
pub mod keyboard;
pub mod memory;
pub mod registers;
pub mod screen;
pub mod sound;
pub mod timer;

pub use config::{Architecture, Config};
pub use emulator::{Advance, Emulator};
pub use error::ChipError;
