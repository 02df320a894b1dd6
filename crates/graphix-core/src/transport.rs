use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("no response within {0:?}")]
    Timeout(Duration),

    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Byte-level link to the gauge controller.
///
/// One call is one request/response exchange and must return within
/// `timeout` (plus whatever the OS adds to a blocking read).
pub trait Transport: Send {
    fn exchange(&mut self, request: &[u8], timeout: Duration) -> Result<Vec<u8>, TransportError>;

    fn describe(&self) -> String {
        "transport".to_string()
    }
}
