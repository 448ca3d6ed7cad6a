//! Serial port transport
//!
//! Wraps a host serial device (typically a USB RS-485 adapter that
//! switches the driver direction by itself).

use std::io::{self, Read, Write};

use serialport::SerialPort;
use tiny485_hal::{BusTransport, DataBits, LineConfig, Parity, StopBits};
use tracing::info;

/// Serial device as a bus transport
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
}

impl SerialTransport {
    /// Open `path` with the given line settings
    pub fn open(path: &str, line: &LineConfig) -> io::Result<Self> {
        let port = serialport::new(path, line.baudrate)
            .data_bits(data_bits(line.data_bits))
            .parity(parity(line.parity))
            .stop_bits(stop_bits(line.stop_bits))
            .timeout(line.read_timeout)
            .open()?;
        info!(path, baud = line.baudrate, "serial port opened");
        Ok(Self { port })
    }
}

fn data_bits(bits: DataBits) -> serialport::DataBits {
    match bits {
        DataBits::Seven => serialport::DataBits::Seven,
        DataBits::Eight => serialport::DataBits::Eight,
    }
}

fn parity(parity: Parity) -> serialport::Parity {
    match parity {
        Parity::None => serialport::Parity::None,
        Parity::Even => serialport::Parity::Even,
        Parity::Odd => serialport::Parity::Odd,
    }
}

fn stop_bits(bits: StopBits) -> serialport::StopBits {
    match bits {
        StopBits::One => serialport::StopBits::One,
        StopBits::Two => serialport::StopBits::Two,
    }
}

impl BusTransport for SerialTransport {
    type Error = io::Error;

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        self.port.write_all(data)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }
}
