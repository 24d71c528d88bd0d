//! Yaesu / Kenwood CAT Protocol
//!
//! Both vendors speak ASCII commands terminated by `;`. The subset needed to
//! track rig state is identical between them, so a single codec covers both:
//!
//! - `FA<digits>;` — VFO A frequency in Hz
//! - `MD0<c>;` — operating mode (`0` is the main-receiver placeholder)
//! - `IF<status>;` — combined status report carrying frequency and mode
//!
//! Auto-Information (`AI1;`) makes the rig push these unsolicited; rigs that
//! predate AI1 (FT-817/857/897, TS-2000) are polled instead.

use crate::error::ParseError;
use crate::mode::RigMode;
use crate::StreamCodec;

/// Command terminator
pub const TERMINATOR: u8 = b';';

/// Enable Auto-Information and request the initial frequency and mode
pub const AUTO_INFO_ARM: &[u8] = b"AI1;FA;MD0;";
/// Frequency + mode query used when polling rigs that ignore AI1
pub const POLL_QUERY: &[u8] = b"FA;MD0;";

/// Minimum IF report length (command without terminator)
const MIN_IF_LEN: usize = 30;

/// Buffer cap; commands this long do not occur on the wire
const MAX_COMMAND_LEN: usize = 64;

/// Streaming CAT command splitter.
///
/// Accumulates bytes and yields complete commands with the terminator
/// stripped; a partial trailing command is preserved for the next read.
pub struct CatCodec {
    buffer: Vec<u8>,
}

impl CatCodec {
    /// Create a new CAT codec
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(MAX_COMMAND_LEN),
        }
    }
}

impl Default for CatCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamCodec for CatCodec {
    type Frame = String;

    fn push_bytes(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);

        // Runaway protection against a stream that never terminates commands
        if self.buffer.len() > MAX_COMMAND_LEN * 4 {
            let start = self.buffer.len() - MAX_COMMAND_LEN;
            self.buffer.drain(..start);
        }
    }

    fn next_frame(&mut self) -> Option<Self::Frame> {
        let term = self.buffer.iter().position(|&b| b == TERMINATOR)?;
        let cmd: Vec<u8> = self.buffer.drain(..=term).collect();
        Some(String::from_utf8_lossy(&cmd[..cmd.len() - 1]).into_owned())
    }

    fn clear(&mut self) {
        self.buffer.clear();
    }
}

/// Parse an `FA` frequency report. Digits run until the first non-digit;
/// a report of zero means the rig had nothing to say.
pub fn parse_frequency(cmd: &str) -> Result<i64, ParseError> {
    if cmd.len() < 5 {
        return Err(ParseError::FrameTooShort(cmd.len()));
    }

    let mut hz: i64 = 0;
    let mut digits = 0;
    for &b in &cmd.as_bytes()[2..] {
        if !b.is_ascii_digit() {
            break;
        }
        hz = hz * 10 + (b - b'0') as i64;
        digits += 1;
    }
    if digits == 0 {
        return Err(ParseError::InvalidFrequency(cmd.to_string()));
    }

    Ok(hz)
}

/// Parse an `MD` mode report. The code is the parameter with leading `'0'`s
/// stripped, which absorbs the main-receiver placeholder digit.
pub fn parse_mode(cmd: &str) -> Result<(RigMode, bool), ParseError> {
    if cmd.len() < 4 {
        return Err(ParseError::FrameTooShort(cmd.len()));
    }

    let Some(params) = cmd.get(2..) else {
        return Err(ParseError::UnknownModeCode(cmd.to_string()));
    };
    let code = params.trim_start_matches('0');
    let (mode, data) = match code {
        "1" => (RigMode::Lsb, false),
        "2" => (RigMode::Usb, false),
        "3" => (RigMode::CwU, false),
        "4" => (RigMode::Fm, false),
        "5" => (RigMode::Am, false),
        "6" => (RigMode::RttyLsb, false),
        "7" => (RigMode::CwR, false),
        "8" => (RigMode::Lsb, true),
        "9" => (RigMode::RttyUsb, true),
        "A" => (RigMode::Fm, true),
        "B" => (RigMode::FmN, false),
        "C" => (RigMode::Usb, true),
        "D" => (RigMode::AmN, false),
        "E" => (RigMode::C4fm, false),
        other => return Err(ParseError::UnknownModeCode(other.to_string())),
    };

    Ok((mode, data))
}

/// Parsed `IF` status report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IfReport {
    /// Frequency in Hz
    pub freq: i64,
    /// Operating mode and data flag, when the mode code was recognized
    pub mode: Option<(RigMode, bool)>,
}

/// Parse an `IF` status report: chars 5..16 are an 11-digit frequency,
/// char 26 the mode code (decoded as `MD0<c>`).
///
/// Field access is byte-wise: a corrupted report may not be valid UTF-8 at
/// the expected offsets.
pub fn parse_if(cmd: &str) -> Result<IfReport, ParseError> {
    let bytes = cmd.as_bytes();
    if bytes.len() < MIN_IF_LEN {
        return Err(ParseError::FrameTooShort(bytes.len()));
    }

    let freq_field = &bytes[5..16];
    let mut hz: i64 = 0;
    for &b in freq_field {
        if !b.is_ascii_digit() {
            return Err(ParseError::InvalidFrequency(
                String::from_utf8_lossy(freq_field).into_owned(),
            ));
        }
        hz = hz * 10 + (b - b'0') as i64;
    }

    let mode = parse_mode(&format!("MD0{}", bytes[26] as char)).ok();

    Ok(IfReport { freq: hz, mode })
}
