//! RS-232/RS-485 link to a Graphix controller.

use graphix_core::{Transport, TransportError};
use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{self, Read, Write};
use std::time::{Duration, Instant};

const OPEN_TIMEOUT: Duration = Duration::from_millis(100);
const READ_CHUNK: usize = 64;

/// Serial port speaking 8N1 with no flow control.
///
/// One exchange is a write of the full request followed by reads until the
/// frame terminator arrives or the deadline passes.
pub struct SerialTransport {
    path: String,
    terminator: u8,
    port: Box<dyn SerialPort>,
}

impl std::fmt::Debug for SerialTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialTransport")
            .field("path", &self.path)
            .field("terminator", &self.terminator)
            .finish()
    }
}

impl SerialTransport {
    pub fn open(path: &str, baud_rate: u32, terminator: u8) -> Result<Self, TransportError> {
        let port = serialport::new(path, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(OPEN_TIMEOUT)
            .open()
            .map_err(io::Error::from)?;

        tracing::info!(port = path, baud_rate, "Opened gauge serial port");
        Ok(Self {
            path: path.to_string(),
            terminator,
            port,
        })
    }
}

impl Transport for SerialTransport {
    fn exchange(&mut self, request: &[u8], timeout: Duration) -> Result<Vec<u8>, TransportError> {
        // Drop anything left over from a previous, abandoned answer
        self.port
            .clear(ClearBuffer::Input)
            .map_err(io::Error::from)?;
        self.port.write_all(request)?;
        self.port.flush()?;

        let deadline = Instant::now() + timeout;
        let mut response = Vec::with_capacity(READ_CHUNK);
        let mut chunk = [0u8; READ_CHUNK];

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            self.port
                .set_timeout(remaining)
                .map_err(io::Error::from)?;

            match self.port.read(&mut chunk) {
                Ok(0) => continue,
                Ok(n) => {
                    response.extend_from_slice(&chunk[..n]);
                    if response.last() == Some(&self.terminator) {
                        return Ok(response);
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::TimedOut => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        if response.is_empty() {
            Err(TransportError::Timeout(timeout))
        } else {
            // Partial frame; the decoder reports it as bad framing.
            tracing::debug!(
                port = %self.path,
                bytes = response.len(),
                "Gauge answer ended without terminator"
            );
            Ok(response)
        }
    }

    fn describe(&self) -> String {
        format!("serial:{}", self.path)
    }
}
