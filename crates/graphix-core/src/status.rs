use crate::codec::DecodeError;
use crate::transport::TransportError;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum ScrapeStatus {
    #[default]
    Starting,
    Running,
    Error,
}

impl ScrapeStatus {
    pub const ALL: [ScrapeStatus; 3] = [
        ScrapeStatus::Starting,
        ScrapeStatus::Running,
        ScrapeStatus::Error,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ScrapeStatus::Starting => "starting",
            ScrapeStatus::Running => "running",
            ScrapeStatus::Error => "error",
        }
    }

    /// Any successful decode lands in `Running`, whatever the prior state.
    pub fn on_success(self) -> Self {
        ScrapeStatus::Running
    }

    pub fn on_failure(self) -> Self {
        ScrapeStatus::Error
    }
}

impl fmt::Display for ScrapeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a tick failed. Diagnostic only; every variant drives the same `Error` transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScrapeFailure {
    TransportTimeout,
    TransportIo,
    UnsupportedCommand,
    FrameTooShort,
    BadFraming,
    ChecksumMismatch,
    PayloadParse,
    DeviceNak,
    Implausible,
}

impl ScrapeFailure {
    pub const ALL: [ScrapeFailure; 9] = [
        ScrapeFailure::TransportTimeout,
        ScrapeFailure::TransportIo,
        ScrapeFailure::UnsupportedCommand,
        ScrapeFailure::FrameTooShort,
        ScrapeFailure::BadFraming,
        ScrapeFailure::ChecksumMismatch,
        ScrapeFailure::PayloadParse,
        ScrapeFailure::DeviceNak,
        ScrapeFailure::Implausible,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ScrapeFailure::TransportTimeout => "transport_timeout",
            ScrapeFailure::TransportIo => "transport_io",
            ScrapeFailure::UnsupportedCommand => "unsupported_command",
            ScrapeFailure::FrameTooShort => "frame_too_short",
            ScrapeFailure::BadFraming => "bad_framing",
            ScrapeFailure::ChecksumMismatch => "checksum_mismatch",
            ScrapeFailure::PayloadParse => "payload_parse",
            ScrapeFailure::DeviceNak => "device_nak",
            ScrapeFailure::Implausible => "implausible_value",
        }
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for ScrapeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&DecodeError> for ScrapeFailure {
    fn from(err: &DecodeError) -> Self {
        match err {
            DecodeError::UnsupportedCommand(_) => ScrapeFailure::UnsupportedCommand,
            DecodeError::FrameTooShort { .. } => ScrapeFailure::FrameTooShort,
            DecodeError::BadFraming(_) => ScrapeFailure::BadFraming,
            DecodeError::ChecksumMismatch { .. } => ScrapeFailure::ChecksumMismatch,
            DecodeError::PayloadParseError(_) => ScrapeFailure::PayloadParse,
            DecodeError::DeviceNak => ScrapeFailure::DeviceNak,
        }
    }
}

impl From<&TransportError> for ScrapeFailure {
    fn from(err: &TransportError) -> Self {
        match err {
            TransportError::Timeout(_) => ScrapeFailure::TransportTimeout,
            TransportError::Io(_) => ScrapeFailure::TransportIo,
        }
    }
}
