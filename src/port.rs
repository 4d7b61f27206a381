//! The link to the printer: a byte transport plus the framer that cuts
//! response frames out of the received byte stream.

use snafu::{ensure, ResultExt};

use std::io::{ErrorKind, Read, Write};
use std::sync::Mutex;
use std::time::Duration;

use crate::buffer::Buffer;
use crate::config::PortSettings;
use crate::response::{is_response, MAX_RESPONSE_LEN, RESP_START};
use crate::types::{Error, IoSnafu, NotOpenSnafu, SerialSnafu, WriteTimeoutSnafu};

/// Size of the receive ring.
pub const RX_BUFFER_SIZE: usize = 3000;
/// Largest chunk moved from the transport per poll.
pub const POLL_CHUNK: usize = 256;

/// Byte level access to the printer.
pub trait Transport: Send {
    /// # Errors
    /// Returns an error if the device can't be opened or configured.
    fn open(&mut self, settings: &PortSettings) -> Result<(), Error>;

    fn close(&mut self);

    fn is_open(&self) -> bool;

    /// Read whatever is available without waiting for more.
    /// # Errors
    /// Returns [`Error::NotOpen`] or an I/O error.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Error>;

    /// Write `data`, giving up after `timeout`. Returns the number of bytes
    /// accepted.
    /// # Errors
    /// Returns [`Error::NotOpen`] or an I/O error.
    fn write(&mut self, data: &[u8], timeout: Duration) -> Result<usize, Error>;
}

/// [`Transport`] over a local serial port.
#[derive(Default)]
pub struct SerialTransport {
    port: Option<Box<dyn serialport::SerialPort>>,
    name: String,
}

impl SerialTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn port(&mut self) -> Result<&mut Box<dyn serialport::SerialPort>, Error> {
        self.port.as_mut().ok_or(Error::NotOpen)
    }
}

impl std::fmt::Debug for SerialTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialTransport")
            .field("name", &self.name)
            .field("open", &self.port.is_some())
            .finish()
    }
}

impl Transport for SerialTransport {
    fn open(&mut self, settings: &PortSettings) -> Result<(), Error> {
        self.close();
        self.name = settings.port.clone();
        log::debug!(
            "opening {} at {} baud, {:?} parity, {:?} handshake",
            settings.port,
            settings.baud_rate,
            settings.parity,
            settings.handshake
        );
        let mut port = serialport::new(&settings.port, settings.baud_rate)
            .data_bits(settings.data_bits)
            .parity(settings.parity)
            .stop_bits(serialport::StopBits::One)
            .flow_control(settings.handshake.flow_control())
            .timeout(Duration::from_millis(u64::from(settings.timeout.max(1))))
            .open()
            .context(SerialSnafu { port: &self.name })?;

        // Wake the printer's UART, then drop whatever it sent meanwhile.
        port.set_break().context(SerialSnafu { port: &self.name })?;
        std::thread::sleep(Duration::from_millis(100));
        port.clear_break().context(SerialSnafu { port: &self.name })?;
        port.clear(serialport::ClearBuffer::All)
            .context(SerialSnafu { port: &self.name })?;

        self.port = Some(port);
        Ok(())
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            log::debug!("closed {}", self.name);
        }
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        let name = self.name.clone();
        let port = self.port()?;
        let available = port.bytes_to_read().context(SerialSnafu { port: &name })? as usize;
        if available == 0 {
            return Ok(0);
        }
        let n = available.min(buf.len());
        match port.read(&mut buf[..n]) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e).context(IoSnafu { port: name }),
        }
    }

    fn write(&mut self, data: &[u8], timeout: Duration) -> Result<usize, Error> {
        let name = self.name.clone();
        let port = self.port()?;
        port.set_timeout(timeout).context(SerialSnafu { port: &name })?;
        let mut written = 0;
        while written < data.len() {
            match port.write(&data[written..]) {
                Ok(0) => break,
                Ok(n) => written += n,
                Err(e) if e.kind() == ErrorKind::TimedOut => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e).context(IoSnafu { port: name }),
            }
        }
        Ok(written)
    }
}

/// A transport plus the receive buffer and framing logic.
pub struct PrinterPort {
    transport: Box<dyn Transport>,
    settings: Option<PortSettings>,
    rx: Mutex<Buffer>,
}

impl std::fmt::Debug for PrinterPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let buffered = self.rx.lock().map(|rx| rx.len()).unwrap_or_default();
        f.debug_struct("PrinterPort")
            .field("settings", &self.settings)
            .field("open", &self.transport.is_open())
            .field("buffered", &buffered)
            .finish()
    }
}

impl PrinterPort {
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self {
            transport,
            settings: None,
            rx: Mutex::new(Buffer::new(RX_BUFFER_SIZE)),
        }
    }

    fn name(&self) -> String {
        self.settings
            .as_ref()
            .map(|s| s.port.clone())
            .unwrap_or_default()
    }

    /// # Errors
    /// Returns the transport's error if the port can't be opened.
    pub fn open(&mut self, settings: &PortSettings) -> Result<(), Error> {
        self.transport.open(settings)?;
        self.settings = Some(settings.clone());
        if let Ok(mut rx) = self.rx.lock() {
            rx.clear();
        }
        Ok(())
    }

    pub fn close(&mut self) {
        self.transport.close();
    }

    pub fn is_open(&self) -> bool {
        self.transport.is_open()
    }

    /// Move available bytes from the transport into the receive buffer,
    /// dropping what doesn't fit.
    /// # Errors
    /// Returns [`Error::NotOpen`] or the transport's read error.
    pub fn poll(&mut self) -> Result<(), Error> {
        ensure!(self.transport.is_open(), NotOpenSnafu);
        let mut chunk = [0u8; POLL_CHUNK];
        let n = self.transport.read(&mut chunk)?;
        if n > 0 {
            let mut rx = self.rx.lock().map_err(|_| Error::NotOpen)?;
            let stored = rx.write(&chunk[..n]);
            if stored < n {
                log::trace!("receive buffer full, dropped {} bytes", n - stored);
            }
        }
        Ok(())
    }

    /// Extract the next response frame.
    ///
    /// Returns the frame length, or 0 if no complete frame is buffered. The
    /// frame is copied into `buf` and consumed only if `buf` can hold it.
    pub fn get_message(&self, buf: &mut [u8]) -> usize {
        let mut rx = match self.rx.lock() {
            Ok(rx) => rx,
            Err(_) => return 0,
        };

        while let Some(b) = rx.head() {
            if b == RESP_START {
                break;
            }
            log::trace!("dropping {:#04x} ahead of frame start", b);
            rx.pop();
        }
        if rx.is_empty() {
            return 0;
        }

        let is_full = rx.is_full();
        let data = rx.as_slice();
        let found = (1..data.len())
            .filter(|&i| data[i] == RESP_START)
            .map(|i| i + 1)
            .find(|&len| is_response(&data[..len]));

        match found {
            Some(len) => {
                if let Some(dst) = buf.get_mut(..len) {
                    dst.copy_from_slice(&data[..len]);
                    rx.consume(len);
                }
                len
            }
            None => {
                if is_full || data.len() > MAX_RESPONSE_LEN {
                    let dropped = rx.pop();
                    log::trace!("no frame in {} bytes, dropped {:?}", rx.len() + 1, dropped);
                }
                0
            }
        }
    }

    /// Write a complete command.
    /// # Errors
    /// Returns [`Error::WriteTimeout`] if the transport doesn't take all of
    /// `data` in time.
    pub fn write(&mut self, data: &[u8]) -> Result<usize, Error> {
        let per_byte = self.settings.as_ref().map_or(1, |s| s.timeout.max(1));
        let millis = (u64::from(per_byte) * data.len() as u64 * 3).max(1000);
        let written = self.transport.write(data, Duration::from_millis(millis))?;
        ensure!(
            written == data.len(),
            WriteTimeoutSnafu {
                port: self.name(),
                written,
                len: data.len(),
            }
        );
        Ok(written)
    }
}
