use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream};
use std::time::Duration;

use crate::error::Result;

/// A connected link stream; implements Read + Write.
///
/// This is the fundamental I/O type returned by transport operations.
/// It wraps a TCP socket, a serial port (with the `serial` feature), or on
/// Unix a socket pair used for in-process loopback.
pub struct LinkStream {
    inner: LinkStreamInner,
}

enum LinkStreamInner {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(std::os::unix::net::UnixStream),
    #[cfg(feature = "serial")]
    Serial(Box<dyn serialport::SerialPort>),
}

impl Read for LinkStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            LinkStreamInner::Tcp(stream) => stream.read(buf),
            #[cfg(unix)]
            LinkStreamInner::Unix(stream) => stream.read(buf),
            #[cfg(feature = "serial")]
            LinkStreamInner::Serial(port) => port.read(buf),
        }
    }
}

impl Write for LinkStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            LinkStreamInner::Tcp(stream) => stream.write(buf),
            #[cfg(unix)]
            LinkStreamInner::Unix(stream) => stream.write(buf),
            #[cfg(feature = "serial")]
            LinkStreamInner::Serial(port) => port.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            LinkStreamInner::Tcp(stream) => stream.flush(),
            #[cfg(unix)]
            LinkStreamInner::Unix(stream) => stream.flush(),
            #[cfg(feature = "serial")]
            LinkStreamInner::Serial(port) => port.flush(),
        }
    }
}

impl LinkStream {
    /// Serial ports have no "block forever"; this stands in for `None`.
    #[cfg(feature = "serial")]
    const SERIAL_BLOCKING_TIMEOUT: Duration = Duration::from_secs(3600);

    pub(crate) fn from_tcp(stream: TcpStream) -> Self {
        Self {
            inner: LinkStreamInner::Tcp(stream),
        }
    }

    #[cfg(feature = "serial")]
    pub(crate) fn from_serial(port: Box<dyn serialport::SerialPort>) -> Self {
        Self {
            inner: LinkStreamInner::Serial(port),
        }
    }

    /// Create a connected in-process stream pair (Unix socket pair).
    ///
    /// Used for loopback testing of the full link without a network.
    #[cfg(unix)]
    pub fn pair() -> Result<(Self, Self)> {
        let (left, right) = std::os::unix::net::UnixStream::pair()?;
        Ok((
            Self {
                inner: LinkStreamInner::Unix(left),
            },
            Self {
                inner: LinkStreamInner::Unix(right),
            },
        ))
    }

    /// Set read timeout on the underlying stream.
    ///
    /// A finite timeout is what lets blocked readers notice a cancelled
    /// [`CancelToken`](crate::CancelToken).
    pub fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        match &mut self.inner {
            LinkStreamInner::Tcp(stream) => stream.set_read_timeout(timeout).map_err(Into::into),
            #[cfg(unix)]
            LinkStreamInner::Unix(stream) => stream.set_read_timeout(timeout).map_err(Into::into),
            #[cfg(feature = "serial")]
            LinkStreamInner::Serial(port) => port
                .set_timeout(timeout.unwrap_or(Self::SERIAL_BLOCKING_TIMEOUT))
                .map_err(|err| std::io::Error::other(err.to_string()).into()),
        }
    }

    /// Set write timeout on the underlying stream.
    ///
    /// Serial ports share one timeout for both directions; the read timeout
    /// wins there and this call is a no-op.
    pub fn set_write_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        match &mut self.inner {
            LinkStreamInner::Tcp(stream) => stream.set_write_timeout(timeout).map_err(Into::into),
            #[cfg(unix)]
            LinkStreamInner::Unix(stream) => stream.set_write_timeout(timeout).map_err(Into::into),
            #[cfg(feature = "serial")]
            LinkStreamInner::Serial(_) => {
                tracing::debug!(?timeout, "serial write timeout follows read timeout");
                Ok(())
            }
        }
    }

    /// Try to clone this stream so reader and writer can live on different threads.
    pub fn try_clone(&self) -> Result<Self> {
        match &self.inner {
            LinkStreamInner::Tcp(stream) => Ok(Self::from_tcp(stream.try_clone()?)),
            #[cfg(unix)]
            LinkStreamInner::Unix(stream) => Ok(Self {
                inner: LinkStreamInner::Unix(stream.try_clone()?),
            }),
            #[cfg(feature = "serial")]
            LinkStreamInner::Serial(port) => {
                let cloned = port
                    .try_clone()
                    .map_err(|err| std::io::Error::other(err.to_string()))?;
                Ok(Self::from_serial(cloned))
            }
        }
    }

    /// Tear down the connection.
    ///
    /// Sockets are shut down in both directions, which also wakes a peer
    /// thread blocked reading the same socket. Serial ports discard any
    /// buffered bytes; the device itself is closed on drop.
    pub fn shutdown(&self) -> Result<()> {
        match &self.inner {
            LinkStreamInner::Tcp(stream) => stream.shutdown(Shutdown::Both).map_err(Into::into),
            #[cfg(unix)]
            LinkStreamInner::Unix(stream) => stream.shutdown(Shutdown::Both).map_err(Into::into),
            #[cfg(feature = "serial")]
            LinkStreamInner::Serial(port) => port
                .clear(serialport::ClearBuffer::All)
                .map_err(|err| std::io::Error::other(err.to_string()).into()),
        }
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        match &self.inner {
            LinkStreamInner::Tcp(_) => "tcp",
            #[cfg(unix)]
            LinkStreamInner::Unix(_) => "unix-pair",
            #[cfg(feature = "serial")]
            LinkStreamInner::Serial(_) => "serial",
        }
    }
}

impl std::fmt::Debug for LinkStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkStream")
            .field("type", &self.transport_name())
            .finish()
    }
}
