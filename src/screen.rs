use std::time::Duration;

use minifb::{Key, KeyRepeat, Scale, Window, WindowOptions};

use crate::display::{FrameBuffer, HEIGHT, WIDTH};
use crate::error::ChipError;
use crate::keyboard::KeySource;

const LIT: u32 = from_u8_rgb(0, 127, 255);
const UNLIT: u32 = from_u8_rgb(0, 0, 0);

const fn from_u8_rgb(r: u8, g: u8, b: u8) -> u32 {
    let (r, g, b) = (r as u32, g as u32, b as u32);
    (r << 16) | (g << 8) | b
}

fn scale_for(factor: usize) -> Scale {
    match factor {
        0 | 1 => Scale::X1,
        2 => Scale::X2,
        3 | 4 => Scale::X4,
        5..=8 => Scale::X8,
        9..=16 => Scale::X16,
        _ => Scale::X32,
    }
}

/// Host window the frame buffer is presented in. Also the source of key
/// state for the emulator.
pub struct Screen {
    pixel_buffer: Vec<u32>,
    window: Window,
}

impl Screen {
    pub fn new(scale: usize) -> Result<Self, ChipError> {
        let mut window = Window::new(
            "chipvm - ESC to exit",
            WIDTH,
            HEIGHT,
            WindowOptions {
                scale: scale_for(scale),
                ..WindowOptions::default()
            },
        )
        .map_err(|e| ChipError::Window(e.to_string()))?;
        // Limit to max ~60 fps update rate
        window.limit_update_rate(Some(Duration::from_micros(16600)));
        Ok(Self {
            pixel_buffer: vec![UNLIT; WIDTH * HEIGHT],
            window,
        })
    }

    pub fn is_running(&self) -> bool {
        self.window.is_open() && !self.window.is_key_down(Key::Escape)
    }

    pub fn render(&mut self, fb: &FrameBuffer) -> Result<(), ChipError> {
        for (dst, lit) in self.pixel_buffer.iter_mut().zip(fb.rows().iter().flatten()) {
            *dst = if *lit { LIT } else { UNLIT };
        }
        self.window
            .update_with_buffer(&self.pixel_buffer, WIDTH, HEIGHT)
            .map_err(|e| ChipError::Window(e.to_string()))
    }
}

impl KeySource for Screen {
    fn is_down(&self, key: Key) -> bool {
        self.window.is_key_down(key)
    }

    fn just_pressed(&self, key: Key) -> bool {
        self.window.is_key_pressed(key, KeyRepeat::No)
    }
}
