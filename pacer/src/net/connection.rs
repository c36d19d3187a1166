//! Blocking TCP connection to the receiver.

use std::io::{self, ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::os::fd::{AsFd, BorrowedFd};
use std::time::Duration;

use super::Endpoint;
use crate::trace::{debug, info};

/// A connected, blocking TCP stream with `TCP_NODELAY` set.
#[derive(Debug)]
pub struct TcpConnection {
    inner: TcpStream,
    peer: Endpoint,
}

impl TcpConnection {
    /// Connects to `endpoint`, giving up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection is refused, times out, or
    /// `TCP_NODELAY` cannot be set.
    pub fn connect(endpoint: Endpoint, timeout: Duration) -> io::Result<Self> {
        let inner = TcpStream::connect_timeout(&endpoint.as_socket_addr(), timeout)?;
        inner.set_nodelay(true)?;
        info!(peer = %endpoint, "connected");
        Ok(Self {
            inner,
            peer: endpoint,
        })
    }

    /// Wraps an already connected stream, e.g. one accepted by a listener.
    ///
    /// # Errors
    ///
    /// Returns an error if the peer address cannot be read or `TCP_NODELAY`
    /// cannot be set.
    pub fn from_stream(inner: TcpStream) -> io::Result<Self> {
        inner.set_nodelay(true)?;
        let peer = Endpoint::from(inner.peer_addr()?);
        Ok(Self { inner, peer })
    }

    #[must_use]
    pub const fn peer(&self) -> Endpoint {
        self.peer
    }

    /// Bounds blocking reads; `None` blocks indefinitely.
    ///
    /// # Errors
    ///
    /// Returns an error if the option cannot be set (a zero duration is
    /// rejected by the OS).
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        self.inner.set_read_timeout(timeout)
    }

    /// Sets the socket's send buffer size.
    ///
    /// # Errors
    ///
    /// Returns an error if the option cannot be set.
    pub fn set_send_buffer_size(&self, size: usize) -> io::Result<()> {
        rustix::net::sockopt::set_socket_send_buffer_size(self.inner.as_fd(), size)?;
        Ok(())
    }

    /// Gets the socket's send buffer size.
    ///
    /// # Errors
    ///
    /// Returns an error if the option cannot be retrieved.
    pub fn send_buffer_size(&self) -> io::Result<usize> {
        Ok(rustix::net::sockopt::socket_send_buffer_size(self.inner.as_fd())?)
    }

    #[must_use]
    pub fn nodelay(&self) -> bool {
        self.inner.nodelay().unwrap_or(false)
    }

    /// Closes both directions. A peer that already went away is not an error.
    ///
    /// # Errors
    ///
    /// Returns any shutdown failure other than `NotConnected`.
    pub fn shutdown(&self) -> io::Result<()> {
        match self.inner.shutdown(Shutdown::Both) {
            Ok(()) => {
                debug!(peer = %self.peer, "connection closed");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(e),
        }
    }
}

impl Read for TcpConnection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Write for TcpConnection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl AsFd for TcpConnection {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.inner.as_fd()
    }
}
