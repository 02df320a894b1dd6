//! Request/response framing for the GRAPHIX RS232 protocol.
//!
//! A request is `SI <group> ; <parameter> ; CRC EOT`, a response is
//! `ACK <ascii value> CRC EOT`. The checksum covers every byte from the
//! start marker up to the checksum byte. All byte values come from a
//! [`FrameFormat`] so a differently configured controller can be matched
//! without touching the codec.

use crate::state::Reading;
use serde::Deserialize;
use std::fmt;
use std::marker::PhantomData;
use thiserror::Error;

/// Start marker + one payload byte + checksum + terminator.
pub const MIN_FRAME_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumAlgorithm {
    /// `255 - (sum mod 256)`, lifted by 32 when it would land on a control character.
    #[default]
    Graphix,
    Xor,
}

impl ChecksumAlgorithm {
    pub fn compute(self, bytes: &[u8]) -> u8 {
        match self {
            ChecksumAlgorithm::Graphix => {
                let sum = bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
                let crc = 255 - sum;
                if crc < 32 {
                    crc + 32
                } else {
                    crc
                }
            }
            ChecksumAlgorithm::Xor => bytes.iter().fold(0u8, |acc, b| acc ^ b),
        }
    }
}

/// Device constants for one controller family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FrameFormat {
    pub request_start: u8,
    pub response_start: u8,
    pub nak: u8,
    pub terminator: u8,
    pub separator: u8,
    pub checksum: ChecksumAlgorithm,
    pub pressure_group: u16,
    pub pressure_parameter: u16,
}

impl Default for FrameFormat {
    fn default() -> Self {
        Self {
            request_start: 0x0F,
            response_start: 0x06,
            nak: 0x15,
            terminator: 0x04,
            separator: b';',
            checksum: ChecksumAlgorithm::Graphix,
            pressure_group: 1,
            pressure_parameter: 29,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    ReadPressure,
    ReadParameter { group: u16, parameter: u16 },
    WriteParameter { group: u16, parameter: u16, value: f64 },
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::ReadPressure => write!(f, "read pressure"),
            Command::ReadParameter { group, parameter } => {
                write!(f, "read parameter {group};{parameter}")
            }
            Command::WriteParameter {
                group,
                parameter,
                value,
            } => write!(f, "write parameter {group};{parameter}={value}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("unsupported command: {0}")]
    UnsupportedCommand(String),

    #[error("frame too short: {len} bytes, need at least {min}")]
    FrameTooShort { len: usize, min: usize },

    #[error("bad framing: {0}")]
    BadFraming(&'static str),

    #[error("checksum mismatch: computed {expected:#04x}, received {actual:#04x}")]
    ChecksumMismatch { expected: u8, actual: u8 },

    #[error("unparsable payload {0:?}")]
    PayloadParseError(String),

    #[error("device answered with NAK")]
    DeviceNak,
}

#[derive(Debug, Clone, Copy)]
pub struct Unverified;

#[derive(Debug, Clone, Copy)]
pub struct Verified;

/// Raw frame bytes. Only a `Frame<Verified>` exposes its body.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a, State = Unverified> {
    bytes: &'a [u8],
    _state: PhantomData<State>,
}

impl<'a> Frame<'a, Unverified> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            _state: PhantomData,
        }
    }

    pub fn verify(self, format: &FrameFormat, start: u8) -> Result<Frame<'a, Verified>, DecodeError> {
        let len = self.bytes.len();
        if len < MIN_FRAME_LEN {
            return Err(DecodeError::FrameTooShort {
                len,
                min: MIN_FRAME_LEN,
            });
        }
        if self.bytes[0] == format.nak {
            return Err(DecodeError::DeviceNak);
        }
        if self.bytes[0] != start {
            return Err(DecodeError::BadFraming("missing start marker"));
        }
        if self.bytes[len - 1] != format.terminator {
            return Err(DecodeError::BadFraming("missing terminator"));
        }

        let covered = &self.bytes[..len - 2];
        let actual = self.bytes[len - 2];
        let expected = format.checksum.compute(covered);
        if expected != actual {
            return Err(DecodeError::ChecksumMismatch { expected, actual });
        }

        Ok(Frame {
            bytes: self.bytes,
            _state: PhantomData,
        })
    }
}

impl<'a> Frame<'a, Verified> {
    /// Bytes between the start marker and the checksum.
    pub fn body(&self) -> &'a [u8] {
        &self.bytes[1..self.bytes.len() - 2]
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FrameCodec {
    format: FrameFormat,
}

impl FrameCodec {
    pub fn new(format: FrameFormat) -> Self {
        Self { format }
    }

    pub fn checksum(&self, bytes: &[u8]) -> u8 {
        self.format.checksum.compute(bytes)
    }

    pub fn encode_request(&self, command: &Command) -> Result<Vec<u8>, DecodeError> {
        let (group, parameter) = match *command {
            Command::ReadPressure => (self.format.pressure_group, self.format.pressure_parameter),
            Command::ReadParameter { group, parameter } => (group, parameter),
            Command::WriteParameter { .. } => {
                return Err(DecodeError::UnsupportedCommand(command.to_string()))
            }
        };

        let sep = self.format.separator;
        let mut frame = vec![self.format.request_start];
        frame.extend_from_slice(group.to_string().as_bytes());
        frame.push(sep);
        frame.extend_from_slice(parameter.to_string().as_bytes());
        frame.push(sep);
        Ok(self.seal(frame))
    }

    pub fn decode_request(&self, bytes: &[u8]) -> Result<Command, DecodeError> {
        let frame = Frame::new(bytes).verify(&self.format, self.format.request_start)?;
        let body = frame.body();
        let sep = self.format.separator;
        let mut fields = body.split(|b| *b == sep);

        let group = fields.next().and_then(parse_u16_field);
        let parameter = fields.next().and_then(parse_u16_field);
        let trailing_empty =
            matches!(fields.next(), Some(f) if f.is_empty()) && fields.next().is_none();

        match (group, parameter, trailing_empty) {
            (Some(group), Some(parameter), true) => {
                if group == self.format.pressure_group && parameter == self.format.pressure_parameter
                {
                    Ok(Command::ReadPressure)
                } else {
                    Ok(Command::ReadParameter { group, parameter })
                }
            }
            _ => Err(DecodeError::PayloadParseError(
                String::from_utf8_lossy(body).into_owned(),
            )),
        }
    }

    /// Builds the frame a healthy controller sends back for `payload`.
    pub fn encode_response(&self, payload: &str) -> Vec<u8> {
        let mut frame = vec![self.format.response_start];
        frame.extend_from_slice(payload.as_bytes());
        self.seal(frame)
    }

    pub fn encode_nak(&self) -> Vec<u8> {
        self.seal(vec![self.format.nak, b'0'])
    }

    pub fn decode_response(&self, bytes: &[u8], acquired_unix_us: u64) -> Result<Reading, DecodeError> {
        let frame = Frame::new(bytes).verify(&self.format, self.format.response_start)?;
        let text = String::from_utf8_lossy(frame.body());
        let payload = normalize_payload(&text);
        match numeric_field(&payload, self.format.separator).and_then(parse_number) {
            Some(value) => Ok(Reading::new(value, acquired_unix_us)),
            None => Err(DecodeError::PayloadParseError(payload)),
        }
    }

    fn seal(&self, mut frame: Vec<u8>) -> Vec<u8> {
        let crc = self.checksum(&frame);
        frame.push(crc);
        frame.push(self.format.terminator);
        frame
    }
}

/// Drops stray control characters (ACK, SI, EOT echoes) and trims surrounding whitespace.
pub fn normalize_payload(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .filter(|c| !(c.is_ascii_control() && !c.is_ascii_whitespace()))
        .collect();
    cleaned.trim_matches(|c: char| c.is_ascii_whitespace()).to_string()
}

/// Picks the value out of a normalized payload.
///
/// Fields are split on whitespace, `;`, `,` and the frame separator. Fields
/// without a digit are status text and are skipped. Exactly one field may
/// carry digits, so `"7.87E-06 A"` yields `7.87E-06` while `"1.2 3"` yields
/// nothing.
pub fn numeric_field(payload: &str, separator: u8) -> Option<&str> {
    let mut fields = payload
        .split(|c: char| {
            c.is_ascii_whitespace()
                || matches!(c, ';' | ',')
                || (separator.is_ascii() && c == char::from(separator))
        })
        .filter(|f| f.bytes().any(|b| b.is_ascii_digit()));
    let field = fields.next()?;
    match fields.next() {
        Some(_) => None,
        None => Some(field),
    }
}

fn parse_u16_field(field: &[u8]) -> Option<u16> {
    std::str::from_utf8(field).ok()?.parse().ok()
}

/// Parses plain decimal or scientific notation. Rejects `inf`, `NaN` and anything
/// else `f64::from_str` would otherwise accept.
pub fn parse_number(token: &str) -> Option<f64> {
    if !matches_numeric_grammar(token) {
        return None;
    }
    token.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn matches_numeric_grammar(token: &str) -> bool {
    let b = token.as_bytes();
    let mut i = 0;

    if matches!(b.first(), Some(b'+' | b'-')) {
        i += 1;
    }
    let int_start = i;
    while i < b.len() && b[i].is_ascii_digit() {
        i += 1;
    }
    let int_digits = i - int_start;

    let mut frac_digits = 0;
    if i < b.len() && b[i] == b'.' {
        i += 1;
        let frac_start = i;
        while i < b.len() && b[i].is_ascii_digit() {
            i += 1;
        }
        frac_digits = i - frac_start;
    }
    if int_digits == 0 && frac_digits == 0 {
        return false;
    }

    if i < b.len() && matches!(b[i], b'e' | b'E') {
        i += 1;
        if i < b.len() && matches!(b[i], b'+' | b'-') {
            i += 1;
        }
        let exp_start = i;
        while i < b.len() && b[i].is_ascii_digit() {
            i += 1;
        }
        if i == exp_start {
            return false;
        }
    }

    i == b.len()
}

/// Formats a value the way the controller prints it: `d.ddE±xx`.
pub fn format_scientific(value: f64) -> String {
    let raw = format!("{value:.2E}");
    match raw.split_once('E') {
        Some((mantissa, exp)) => {
            let exp: i32 = exp.parse().unwrap_or(0);
            let sign = if exp < 0 { '-' } else { '+' };
            format!("{mantissa}E{sign}{:02}", exp.abs())
        }
        None => raw,
    }
}
