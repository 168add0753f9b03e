use thiserror::Error;

use crate::memory::TypeAddr;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChipError {
    #[error("ROM is too large ({size} bytes), at most {max} bytes fit above 0x200")]
    RomTooLarge { size: usize, max: usize },

    #[error("call stack overflow: no room for return address {addr:#05x}")]
    StackOverflow { addr: TypeAddr },

    #[error("call stack underflow: return with no subroutine active")]
    StackUnderflow,

    #[error("window error: {0}")]
    Window(String),

    #[error("audio error: {0}")]
    Audio(String),
}
