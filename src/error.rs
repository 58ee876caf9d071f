//! Custom error types for the luxmeter acquisition engine.
//!
//! This module defines the primary error type, `DaqError`, shared by both
//! instrument adapters. Using the `thiserror` crate, it provides a centralized
//! and consistent way to report everything from a serial port that cannot be
//! opened to a fault code reported by the instrument itself.
//!
//! ## Error Hierarchy
//!
//! - **`Connect`**: the transport could not be opened. Fatal, never retried.
//! - **`Handshake`**: a mode-transition acknowledgment was wrong or missing after
//!   its retry budget was spent.
//! - **`InstrumentFault`**: the instrument reported a machine fault in its error
//!   byte. The CL-200A has to be power-cycled to clear it.
//! - **`Frame`**: a command/response frame was malformed (length, markers,
//!   checksum) after its retry budget was spent.
//! - **`ConnectionLost`**: a serial-level read or write failed mid-session.
//! - **`SessionFaulted`**: an operation was attempted on a session that already
//!   hit a fatal error.
//!
//! "No data yet" and "unsupported CCT method" are not errors: operations return
//! `Ok(None)` for those.

use crate::config::ConfigError;
use crate::instrument::cl200a::codec::ResponseFault;
use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, DaqError>;

#[derive(Error, Debug)]
pub enum DaqError {
    #[error("Could not open serial port '{port}': {source}")]
    Connect {
        port: String,
        #[source]
        source: serialport::Error,
    },

    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error("Instrument fault {code}: {message}")]
    InstrumentFault { code: u8, message: String },

    #[error("Malformed response frame: {0}")]
    Frame(ResponseFault),

    #[error("Connection to instrument was lost: {0}")]
    ConnectionLost(String),

    #[error("Cannot encode command: {0}")]
    Encoding(String),

    #[error("Session is faulted: {0}")]
    SessionFaulted(String),

    #[error("Actuator error: {0}")]
    Actuator(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DaqError {
    /// Returns true for errors after which the session must not be used again.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, DaqError::Encoding(_) | DaqError::Config(_))
    }
}
