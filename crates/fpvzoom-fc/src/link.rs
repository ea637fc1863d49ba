use anyhow::{Context, Result};
use std::io::{self, ErrorKind, Read, Write};
use std::time::Duration;
use tokio_serial::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::info;

/// Duplex byte channel to the flight controller.
pub trait Transport {
    /// Wait at most `timeout` for input. `Ok(0)` means nothing arrived.
    fn poll_read(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize>;

    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Retries interrupted and would-block writes; only real failures surface.
    fn write_all(&mut self, mut buf: &[u8]) -> io::Result<()> {
        while !buf.is_empty() {
            match self.write(buf) {
                Ok(0) => {
                    return Err(io::Error::new(ErrorKind::WriteZero, "transport accepted no bytes"))
                }
                Ok(n) => buf = &buf[n..],
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    std::thread::sleep(Duration::from_millis(1));
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn poll_read(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        (**self).poll_read(buf, timeout)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        (**self).write(buf)
    }
}

/// Blocking serial port, 8N1, no flow control.
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    timeout: Duration,
}

impl SerialTransport {
    pub fn open(dev: &str, baud: u32) -> Result<Self> {
        let timeout = Duration::from_millis(100);
        let port = tokio_serial::new(dev, baud)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(timeout)
            .open()
            .with_context(|| format!("open fc serial device {} @ {}", dev, baud))?;
        info!("FC serial open: {} @ {}", dev, baud);
        Ok(Self { port, timeout })
    }
}

impl Transport for SerialTransport {
    fn poll_read(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        if timeout != self.timeout {
            self.port.set_timeout(timeout)?;
            self.timeout = timeout;
        }
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted) => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.port.write(buf)?;
        self.port.flush()?;
        Ok(n)
    }
}
