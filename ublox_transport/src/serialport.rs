//! [`Transport`] over a serial port.

use std::{
    io::{self, Read, Write},
    time::Duration,
};

use serialport::SerialPort;

use crate::{error::Result, transport::Transport};

/// Read timeout given to ports opened with [`open`]; a read that times out
/// simply reports no data.
pub const READ_TIMEOUT: Duration = Duration::from_millis(1);

impl Transport for dyn SerialPort {
    fn write(&mut self, data: &[u8]) -> Result<usize> {
        Ok(Write::write(self, data)?)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        match Read::read(self, buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e.into()),
        }
    }
}

/// Opens `path` at `baud_rate` 8N1 without flow control.
pub fn open(path: &str, baud_rate: u32) -> Result<Box<dyn SerialPort>> {
    let port = serialport::new(path, baud_rate)
        .data_bits(serialport::DataBits::Eight)
        .flow_control(serialport::FlowControl::None)
        .parity(serialport::Parity::None)
        .stop_bits(serialport::StopBits::One)
        .timeout(READ_TIMEOUT)
        .open()
        .map_err(io::Error::from)?;
    Ok(port)
}
