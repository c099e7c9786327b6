//! Duplex byte transport the protocol session runs on.
//!
//! The serial port is the one real implementation; tests substitute a
//! scripted one. The contract deliberately stays at the byte level:
//! open/close, timed reads and writes, and nothing about flow control.

use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

use serialport::{ClearBuffer, SerialPort};

use crate::errors::Result;

/// Abstract duplex byte channel standing in for the serial port.
///
/// Reads and writes take a per-call timeout. A read that times out
/// reports `Ok(0)` rather than an error; partial reads are permitted
/// and the caller loops.
pub trait Transport: Send {
    fn open(&mut self) -> Result<()>;
    fn close(&mut self) -> Result<()>;
    fn is_open(&self) -> bool;
    fn write(&mut self, buf: &[u8], timeout: Duration) -> Result<usize>;
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;
    /// Drop any stale bytes sitting in the receive buffer.
    fn discard_input(&mut self) -> Result<()>;
}

/// `Transport` backed by a real serial port (e.g. `/dev/ttyUSB0`).
///
/// The port is opened lazily by `open()` so the monitor can be built,
/// dropped into Disconnected and reconnected without rebuilding it.
pub struct SerialTransport {
    path: String,
    baud_rate: u32,
    port: Option<Box<dyn SerialPort>>,
}

impl SerialTransport {
    pub fn new(path: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            path: path.into(),
            baud_rate,
            port: None,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl Transport for SerialTransport {
    fn open(&mut self) -> Result<()> {
        if self.port.is_none() {
            let port = serialport::new(&self.path, self.baud_rate)
                .timeout(Duration::from_millis(100))
                .open()?;
            self.port = Some(port);
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        // Dropping the handle releases the fd; nothing else to tear down.
        self.port = None;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn write(&mut self, buf: &[u8], timeout: Duration) -> Result<usize> {
        let port = self.require_open()?;
        port.set_timeout(timeout)?;
        if let Err(e) = port.write_all(buf).and_then(|()| port.flush()) {
            // A hard write failure usually means the adapter was pulled.
            self.port = None;
            return Err(e.into());
        }
        Ok(buf.len())
    }

    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let port = self.require_open()?;
        port.set_timeout(timeout)?;
        match port.read(buf) {
            Ok(n) => Ok(n),
            // A timed-out read just means no bytes arrived yet.
            Err(e) if e.kind() == ErrorKind::TimedOut => Ok(0),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(0),
            Err(e) => {
                // Same as writes: surviving the error with a dead fd would
                // leave is_open() lying to the reconnect logic.
                self.port = None;
                Err(e.into())
            }
        }
    }

    fn discard_input(&mut self) -> Result<()> {
        let port = self.require_open()?;
        port.clear(ClearBuffer::Input)?;
        Ok(())
    }
}

impl SerialTransport {
    fn require_open(&mut self) -> Result<&mut Box<dyn SerialPort>> {
        self.port.as_mut().ok_or_else(|| {
            std::io::Error::new(ErrorKind::NotConnected, "serial port is not open").into()
        })
    }
}
