//! Serial link to the motor controller
//!
//! Every send opens the port, writes one command and closes it again, so no
//! exclusive OS handle is held between operations and other tools can use the
//! port in the meantime. Nothing is retried.

use crate::command_encoder::WireCommand;
use log::{debug, error};
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::Write;
use std::time::Duration;
use thiserror::Error;

pub const SERIAL_BAUDRATE: u32 = 115200;
pub const SERIAL_TIMEOUT: Duration = Duration::from_secs(1);

/// Fixed port configuration (8N1, no flow control)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkSettings {
    pub baud_rate: u32,
    pub timeout: Duration,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            baud_rate: SERIAL_BAUDRATE,
            timeout: SERIAL_TIMEOUT,
        }
    }
}

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("No serial port selected")]
    NoPortSelected,
    #[error("Failed to open serial connection on {port}: {source}")]
    ConnectFailed {
        port: String,
        #[source]
        source: serialport::Error,
    },
    #[error("Failed to send command to {port}: {source}")]
    WriteFailed {
        port: String,
        #[source]
        source: std::io::Error,
    },
}

/// Byte transport underneath the link. Real ports in production, recording
/// fakes in tests.
pub trait Transport {
    fn open(&mut self, port: &str, settings: &LinkSettings) -> Result<(), serialport::Error>;
    fn write_all(&mut self, bytes: &[u8]) -> std::io::Result<()>;
    fn close(&mut self);
    fn is_open(&self) -> bool;
}

#[derive(Default)]
pub struct SerialPortTransport {
    port: Option<Box<dyn SerialPort>>,
}

impl std::fmt::Debug for SerialPortTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialPortTransport")
            .field("open", &self.port.is_some())
            .finish()
    }
}

impl SerialPortTransport {
    pub fn new() -> Self {
        Self { port: None }
    }
}

impl Transport for SerialPortTransport {
    fn open(&mut self, port: &str, settings: &LinkSettings) -> Result<(), serialport::Error> {
        let opened = serialport::new(port, settings.baud_rate)
            .data_bits(DataBits::Eight)
            .stop_bits(StopBits::One)
            .parity(Parity::None)
            .flow_control(FlowControl::None)
            .timeout(settings.timeout)
            .open()?;
        self.port = Some(opened);
        Ok(())
    }

    fn write_all(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        let port = self.port.as_mut().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotConnected, "port not open")
        })?;
        port.write_all(bytes)?;
        port.flush()
    }

    fn close(&mut self) {
        // Dropping the boxed port releases the OS handle
        self.port = None;
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }
}

/// Closes the transport when dropped, whatever happened while it was open.
struct OpenConnection<'a, T: Transport> {
    transport: &'a mut T,
}

impl<T: Transport> Drop for OpenConnection<'_, T> {
    fn drop(&mut self) {
        self.transport.close();
    }
}

#[derive(Debug)]
pub struct SerialLink<T: Transport = SerialPortTransport> {
    transport: T,
    settings: LinkSettings,
}

impl SerialLink<SerialPortTransport> {
    pub fn open_default() -> Self {
        Self::new(SerialPortTransport::new())
    }
}

impl<T: Transport> SerialLink<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            settings: LinkSettings::default(),
        }
    }

    pub fn settings(&self) -> &LinkSettings {
        &self.settings
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn is_open(&self) -> bool {
        self.transport.is_open()
    }

    /// Open `port`, write `command`, close. The connection is closed on every
    /// return path.
    pub fn send(&mut self, port: &str, command: &WireCommand) -> Result<(), LinkError> {
        if port.is_empty() {
            return Err(LinkError::NoPortSelected);
        }
        if self.transport.is_open() {
            debug!(target: "serial_link", "closing stale connection before opening {}", port);
            self.transport.close();
        }

        self.transport
            .open(port, &self.settings)
            .map_err(|source| LinkError::ConnectFailed { port: port.to_string(), source })?;
        let connection = OpenConnection { transport: &mut self.transport };

        debug!(target: "serial_link", "{} <- {:?}", port, command.as_str());
        let written = connection
            .transport
            .write_all(command.as_bytes())
            .map_err(|source| LinkError::WriteFailed { port: port.to_string(), source });
        drop(connection);
        written
    }
}

/// Device names of the serial ports currently present on this machine.
pub fn available_ports() -> Vec<String> {
    match serialport::available_ports() {
        Ok(ports) => ports.into_iter().map(|p| p.port_name).collect(),
        Err(e) => {
            error!("Failed to get serial ports: {}", e);
            Vec::new()
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::command_encoder::{run, Run};

    /// Records every call so tests can check the open/close pairing.
    #[derive(Debug, Default)]
    pub(crate) struct RecordingTransport {
        pub opens: usize,
        pub closes: usize,
        pub written: Vec<Vec<u8>>,
        pub opened_ports: Vec<String>,
        pub fail_open: bool,
        pub fail_write: bool,
        pub open: bool,
    }

    impl RecordingTransport {
        pub(crate) fn with_stale_connection() -> Self {
            Self { open: true, ..Default::default() }
        }
    }

    impl Transport for RecordingTransport {
        fn open(&mut self, port: &str, settings: &LinkSettings) -> Result<(), serialport::Error> {
            assert_eq!(settings.baud_rate, 115200);
            assert!(!self.open, "opened twice without close");
            if self.fail_open {
                return Err(serialport::Error::new(serialport::ErrorKind::NoDevice, "no such device"));
            }
            self.opens += 1;
            self.opened_ports.push(port.to_string());
            self.open = true;
            Ok(())
        }

        fn write_all(&mut self, bytes: &[u8]) -> std::io::Result<()> {
            if self.fail_write {
                return Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "cable pulled"));
            }
            self.written.push(bytes.to_vec());
            Ok(())
        }

        fn close(&mut self) {
            if self.open {
                self.closes += 1;
            }
            self.open = false;
        }

        fn is_open(&self) -> bool {
            self.open
        }
    }

    #[test]
    fn test_send_opens_and_closes_once() {
        let mut link = SerialLink::new(RecordingTransport::default());
        link.send("/dev/ttyACM0", &run(Run::Start)).unwrap();
        link.send("/dev/ttyACM0", &run(Run::Stop)).unwrap();

        let t = link.transport();
        assert_eq!(t.opens, 2);
        assert_eq!(t.closes, 2);
        assert_eq!(t.written, vec![b"i".to_vec(), b"o".to_vec()]);
        assert!(!link.is_open());
    }

    #[test]
    fn test_write_failure_still_closes() {
        let mut link = SerialLink::new(RecordingTransport { fail_write: true, ..Default::default() });
        let err = link.send("/dev/ttyUSB1", &run(Run::Start)).unwrap_err();
        assert!(matches!(err, LinkError::WriteFailed { ref port, .. } if port == "/dev/ttyUSB1"));
        assert_eq!(link.transport().opens, 1);
        assert_eq!(link.transport().closes, 1);
        assert!(!link.is_open());
    }

    #[test]
    fn test_open_failure_writes_nothing() {
        let mut link = SerialLink::new(RecordingTransport { fail_open: true, ..Default::default() });
        let err = link.send("COM7", &run(Run::Stop)).unwrap_err();
        assert!(matches!(err, LinkError::ConnectFailed { .. }));
        assert!(link.transport().written.is_empty());
        assert_eq!(link.transport().opens, link.transport().closes);
        assert!(!link.is_open());
    }

    #[test]
    fn test_stale_connection_closed_before_open() {
        let mut link = SerialLink::new(RecordingTransport::with_stale_connection());
        link.send("/dev/ttyACM0", &run(Run::Start)).unwrap();
        assert_eq!(link.transport().opens, 1);
        // one close for the stale handle, one for this send
        assert_eq!(link.transport().closes, 2);
        assert!(!link.is_open());
    }

    #[test]
    fn test_empty_port_rejected_without_open() {
        let mut link = SerialLink::new(RecordingTransport::default());
        assert!(matches!(link.send("", &run(Run::Start)), Err(LinkError::NoPortSelected)));
        assert_eq!(link.transport().opens, 0);
    }
}
