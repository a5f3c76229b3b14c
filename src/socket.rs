//! Blocking TCP transport with byte-exact reads and writes.
//!
//! Every receive is bounded by one deadline taken when the operation starts:
//! before each blocking `peek`/`read` the socket's receive timeout is set to
//! whatever is left of it, so a slow sender cannot stretch the wait by
//! trickling bytes.

use std::{
    io::{self, Read, Write},
    net::{Shutdown, SocketAddr, TcpStream},
    time::Duration,
};

use socket2::{Domain, Protocol, SockAddr, Type};
use tracing::{debug, trace};

use crate::{
    error::{ConnectionError, SocketError},
    tcp_util::{is_errorkind_timeout, resolve, socket_error, Deadline},
};

/// Bytes inspected per peek while looking for a line delimiter.
pub const LINE_PEEK_SIZE: usize = 1024;

/// Largest single receive, and the most `read` allocates ahead of arrival.
pub const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Byte-level operations the dispatcher needs from a transport.
///
/// Once `disconnect` has succeeded every further call, `disconnect` included,
/// fails with [`SocketError::Closed`].
pub trait Socket: Send {
    /// Sends all of `data`.
    fn write(&mut self, data: &[u8]) -> Result<(), SocketError>;
    /// Receives exactly `length` bytes.
    fn read(&mut self, length: usize) -> Result<Vec<u8>, SocketError>;
    /// Receives one `\n`-terminated line with its line ending stripped,
    /// leaving every byte after the delimiter unread.
    fn read_line(&mut self) -> Result<String, SocketError>;
    fn disconnect(&mut self) -> Result<(), SocketError>;
}

pub struct NativeSocket {
    stream: Option<TcpStream>,
    addr: SocketAddr,
    timeout: Duration,
}

impl NativeSocket {
    pub fn connect(host: &str, port: u16, timeout: Duration) -> Result<Self, ConnectionError> {
        if timeout.is_zero() {
            return Err(ConnectionError::Configure(io::Error::new(
                io::ErrorKind::InvalidInput,
                "timeout must be non-zero",
            )));
        }
        let addrs: Vec<SocketAddr> = resolve(host, port)?;
        Self::connect_any(host, &addrs, timeout)
    }

    /// Tries each address in order, failing with the last error if none accepts.
    fn connect_any(
        host: &str,
        addrs: &[SocketAddr],
        timeout: Duration,
    ) -> Result<Self, ConnectionError> {
        let mut last_err: Option<ConnectionError> = None;
        for &addr in addrs {
            match open(addr, timeout) {
                Ok(stream) => {
                    return Ok(Self {
                        stream: Some(stream),
                        addr,
                        timeout,
                    })
                }
                Err(err) => {
                    debug!(%addr, %err, "connect attempt failed");
                    last_err = Some(err);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| ConnectionError::NoAddress {
            host: host.to_owned(),
        }))
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn is_closed(&self) -> bool {
        self.stream.is_none()
    }

    fn stream(&mut self) -> Result<&mut TcpStream, SocketError> {
        self.stream.as_mut().ok_or(SocketError::Closed)
    }
}

fn open(addr: SocketAddr, timeout: Duration) -> Result<TcpStream, ConnectionError> {
    let socket: socket2::Socket =
        socket2::Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
            .map_err(ConnectionError::Configure)?;
    socket
        .set_keepalive(true)
        .map_err(ConnectionError::Configure)?;
    socket
        .set_write_timeout(Some(timeout))
        .map_err(ConnectionError::Configure)?;
    socket
        .set_read_timeout(Some(timeout))
        .map_err(ConnectionError::Configure)?;
    socket
        .connect_timeout(&SockAddr::from(addr), timeout)
        .map_err(|source| ConnectionError::Connect { addr, source })?;
    Ok(socket.into())
}

fn arm(stream: &TcpStream, deadline: &Deadline) -> Result<(), SocketError> {
    stream
        .set_read_timeout(Some(deadline.remaining()?))
        .map_err(SocketError::Io)
}

impl Socket for NativeSocket {
    fn write(&mut self, mut data: &[u8]) -> Result<(), SocketError> {
        let stream: &mut TcpStream = self.stream()?;
        while !data.is_empty() {
            match stream.write(data) {
                Ok(0) => return Err(SocketError::WriteZero),
                Ok(written) => {
                    trace!(written, left = data.len() - written, "wrote to stream");
                    data = &data[written..];
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(socket_error(err)),
            }
        }
        Ok(())
    }

    fn read(&mut self, length: usize) -> Result<Vec<u8>, SocketError> {
        let deadline: Deadline = Deadline::after(self.timeout);
        let stream: &mut TcpStream = self.stream()?;
        // grows with what actually arrives; the length comes off the wire
        let mut data: Vec<u8> = Vec::with_capacity(length.min(READ_CHUNK_SIZE));
        let mut chunk: Vec<u8> = vec![0; length.min(READ_CHUNK_SIZE)];
        while data.len() < length {
            arm(stream, &deadline)?;
            let wanted: usize = (length - data.len()).min(chunk.len());
            match stream.read(&mut chunk[..wanted]) {
                Ok(0) => {
                    return Err(SocketError::UnexpectedEof {
                        expected: length,
                        received: data.len(),
                    })
                }
                Ok(count) => {
                    data.extend_from_slice(&chunk[..count]);
                    trace!(count, received = data.len(), length, "read from stream");
                }
                // the deadline decides when to give up, not the kernel
                Err(err) if is_errorkind_timeout(err.kind()) => continue,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(SocketError::Io(err)),
            }
        }
        Ok(data)
    }

    fn read_line(&mut self) -> Result<String, SocketError> {
        let deadline: Deadline = Deadline::after(self.timeout);
        let stream: &mut TcpStream = self.stream()?;
        let mut line: Vec<u8> = Vec::new();
        let mut peeked: [u8; LINE_PEEK_SIZE] = [0; LINE_PEEK_SIZE];
        loop {
            arm(stream, &deadline)?;
            let available: usize = match stream.peek(&mut peeked) {
                Ok(0) => return Err(SocketError::UnterminatedLine),
                Ok(available) => available,
                Err(err) if is_errorkind_timeout(err.kind()) => continue,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(SocketError::Io(err)),
            };
            let delimiter: Option<usize> = peeked[..available].iter().position(|&b| b == b'\n');
            let take: usize = delimiter.map_or(available, |pos| pos + 1);
            let start: usize = line.len();
            line.resize(start + take, 0);
            // already buffered by the kernel, so this cannot block
            stream.read_exact(&mut line[start..]).map_err(socket_error)?;
            if delimiter.is_some() {
                break;
            }
        }
        while matches!(line.last(), Some(b'\r' | b'\n')) {
            line.pop();
        }
        trace!(elapsed = ?deadline.elapsed(), "read line");
        String::from_utf8(line).map_err(|_| SocketError::InvalidLine)
    }

    fn disconnect(&mut self) -> Result<(), SocketError> {
        let stream: TcpStream = self.stream.take().ok_or(SocketError::Closed)?;
        match stream.shutdown(Shutdown::Both) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotConnected => {}
            Err(err) => return Err(SocketError::Io(err)),
        }
        debug!(addr = %self.addr, "disconnected");
        Ok(())
    }
}
