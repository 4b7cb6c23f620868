use std::net::{SocketAddr, TcpListener, TcpStream};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::stream::LinkStream;

/// TCP socket transport.
///
/// The rover side binds and waits for exactly one station to connect; the
/// station side connects out. Both ends get the same [`LinkStream`].
pub struct TcpEndpoint {
    listener: TcpListener,
    addr: SocketAddr,
}

impl TcpEndpoint {
    /// Bind and listen on `addr`.
    pub fn bind(addr: SocketAddr) -> Result<Self> {
        let listener =
            TcpListener::bind(addr).map_err(|source| TransportError::Bind { addr, source })?;
        let addr = listener
            .local_addr()
            .map_err(|source| TransportError::Bind { addr, source })?;

        info!(%addr, "listening for station connection");
        Ok(Self { listener, addr })
    }

    /// Accept an incoming connection (blocking).
    pub fn accept(&self) -> Result<LinkStream> {
        let (stream, peer) = self.listener.accept().map_err(TransportError::Accept)?;
        configure(&stream)?;
        info!(%peer, "accepted station connection");
        Ok(LinkStream::from_tcp(stream))
    }

    /// Bind, then block until one peer connects (rover role).
    pub fn listen(addr: SocketAddr) -> Result<LinkStream> {
        Self::bind(addr)?.accept()
    }

    /// Connect to a listening rover (station role).
    pub fn connect(addr: SocketAddr) -> Result<LinkStream> {
        let stream =
            TcpStream::connect(addr).map_err(|source| TransportError::Connect { addr, source })?;
        configure(&stream)?;
        debug!(%addr, "connected to rover");
        Ok(LinkStream::from_tcp(stream))
    }

    /// Connect with a bounded connection timeout.
    pub fn connect_timeout(addr: SocketAddr, timeout: Duration) -> Result<LinkStream> {
        let stream = TcpStream::connect_timeout(&addr, timeout)
            .map_err(|source| TransportError::Connect { addr, source })?;
        configure(&stream)?;
        debug!(%addr, ?timeout, "connected to rover");
        Ok(LinkStream::from_tcp(stream))
    }

    /// The address this endpoint is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        "tcp"
    }
}

fn configure(stream: &TcpStream) -> Result<()> {
    stream.set_nodelay(true)?;
    Ok(())
}
