//! Hardware adapter implementations
//!
//! This module contains the [`SerialLink`] trait and its implementations,
//! providing the low-level blocking I/O the instrument sessions are written
//! against. Each link is exclusively owned by one session for its lifetime.

pub mod mock;
pub mod serial_adapter;

pub use mock::MockAdapter;
pub use serial_adapter::{SerialAdapter, SerialSettings};

use std::io;
use std::time::Duration;

/// Blocking byte transport with per-read timeouts.
pub trait SerialLink: Send {
    /// Port name used in log lines.
    fn name(&self) -> &str;

    /// Writes and flushes the whole buffer.
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Reads whatever is available into `buf`.
    ///
    /// Returns `Ok(0)` when the read timed out without data.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Discards pending input and output.
    fn clear_buffers(&mut self) -> io::Result<()>;

    /// Changes the per-read timeout.
    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()>;

    /// Reads until `max` bytes arrived or a read times out.
    fn read_up_to(&mut self, max: usize) -> io::Result<Vec<u8>> {
        let mut out = Vec::with_capacity(max);
        let mut buf = [0u8; 64];
        while out.len() < max {
            let want = (max - out.len()).min(buf.len());
            let n = self.read(&mut buf[..want])?;
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        Ok(out)
    }

    /// Reads one line including its `\n`, or whatever arrived before a timeout.
    fn read_line(&mut self) -> io::Result<Vec<u8>> {
        let mut line = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            if self.read(&mut byte)? == 0 {
                break;
            }
            line.push(byte[0]);
            if byte[0] == b'\n' {
                break;
            }
        }
        Ok(line)
    }
}

impl<L: SerialLink + ?Sized> SerialLink for Box<L> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        (**self).write_all(bytes)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read(buf)
    }

    fn clear_buffers(&mut self) -> io::Result<()> {
        (**self).clear_buffers()
    }

    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        (**self).set_timeout(timeout)
    }
}
