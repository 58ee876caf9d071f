use super::SerialLink;
use crate::error::{AppResult, DaqError};
use log::debug;
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{self, Read, Write};
use std::time::Duration;

/// Line settings for opening a serial port.
#[derive(Clone, Debug, PartialEq)]
pub struct SerialSettings {
    /// Port name (e.g., "/dev/ttyUSB0", "COM3")
    pub port: String,
    /// Baud rate (e.g., 9600, 19200)
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
    /// Per-read timeout
    pub timeout: Duration,
}

impl SerialSettings {
    /// 8 data bits, no parity, one stop bit.
    pub fn eight_n_one(port: impl Into<String>, baud_rate: u32, timeout: Duration) -> Self {
        Self {
            port: port.into(),
            baud_rate,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            timeout,
        }
    }

    /// 7 data bits, even parity, one stop bit.
    pub fn seven_e_one(port: impl Into<String>, baud_rate: u32, timeout: Duration) -> Self {
        Self {
            data_bits: DataBits::Seven,
            parity: Parity::Even,
            ..Self::eight_n_one(port, baud_rate, timeout)
        }
    }
}

/// Serial adapter for RS-232 communication
///
/// This adapter wraps the serialport crate. The port is closed when the
/// adapter is dropped, which happens on every exit path of the owning session.
pub struct SerialAdapter {
    port_name: String,
    port: Box<dyn SerialPort>,
}

impl SerialAdapter {
    /// Opens the port with the given settings.
    ///
    /// # Errors
    /// Returns [`DaqError::Connect`] if the port cannot be opened; callers never
    /// retry this.
    pub fn open(settings: &SerialSettings) -> AppResult<Self> {
        let port = serialport::new(&settings.port, settings.baud_rate)
            .data_bits(settings.data_bits)
            .parity(settings.parity)
            .stop_bits(settings.stop_bits)
            .flow_control(FlowControl::None)
            .timeout(settings.timeout)
            .open()
            .map_err(|source| DaqError::Connect {
                port: settings.port.clone(),
                source,
            })?;

        debug!(
            "Serial port '{}' opened at {} baud ({:?}, {:?})",
            settings.port, settings.baud_rate, settings.data_bits, settings.parity
        );

        Ok(Self {
            port_name: settings.port.clone(),
            port,
        })
    }
}

impl SerialLink for SerialAdapter {
    fn name(&self) -> &str {
        &self.port_name
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.port.write_all(bytes)?;
        self.port.flush()
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            // Port timeout just means nothing arrived in this window
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn clear_buffers(&mut self) -> io::Result<()> {
        self.port
            .clear(serialport::ClearBuffer::All)
            .map_err(io::Error::from)
    }

    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.port.set_timeout(timeout).map_err(io::Error::from)
    }
}

impl Drop for SerialAdapter {
    fn drop(&mut self) {
        debug!("Serial port '{}' closed", self.port_name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cl200a_line_settings() {
        let settings = SerialSettings::seven_e_one("COM3", 9600, Duration::from_secs(1));
        assert_eq!(settings.data_bits, DataBits::Seven);
        assert_eq!(settings.parity, Parity::Even);
        assert_eq!(settings.stop_bits, StopBits::One);
        assert_eq!(settings.baud_rate, 9600);
    }

    #[test]
    fn test_open_missing_port_is_connect_error() {
        let settings =
            SerialSettings::eight_n_one("/dev/does-not-exist-luxmeter", 19200, Duration::from_millis(20));
        match SerialAdapter::open(&settings) {
            Err(DaqError::Connect { port, .. }) => assert_eq!(port, "/dev/does-not-exist-luxmeter"),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("opening a missing port must fail"),
        }
    }
}
