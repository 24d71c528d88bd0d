//! Error types for protocol parsing

use thiserror::Error;

/// Errors that can occur while decoding frames or commands
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Frame shorter than the minimum for its kind
    #[error("frame too short: {0} bytes")]
    FrameTooShort(usize),

    /// A BCD byte carried a nibble outside 0..=9
    #[error("invalid BCD digit: 0x{0:02X}")]
    InvalidBcd(u8),

    /// Frequency field was not a decimal digit string
    #[error("invalid frequency field: {0}")]
    InvalidFrequency(String),

    /// Mode code outside the known table
    #[error("unknown mode code: {0}")]
    UnknownModeCode(String),
}
