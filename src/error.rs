use std::{fmt::Display, io, net::SocketAddr};

use thiserror::Error;

/// Failures while establishing a transport. Never raised once a socket is open.
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("could not resolve hostname {host}: {source}")]
    Resolve { host: String, source: io::Error },
    #[error("could not resolve hostname {host}: no addresses")]
    NoAddress { host: String },
    #[error("cannot connect to {addr}: {source}")]
    Connect { addr: SocketAddr, source: io::Error },
    #[error("cannot configure socket: {0}")]
    Configure(io::Error),
}

#[derive(Error, Debug)]
pub enum SocketError {
    #[error("the connection was closed")]
    Closed,
    #[error("timeout has been reached")]
    Timeout,
    #[error("stream ended after {received} of {expected} bytes")]
    UnexpectedEof { expected: usize, received: usize },
    #[error("stream ended before a line delimiter")]
    UnterminatedLine,
    #[error("write to stream accepted zero bytes")]
    WriteZero,
    #[error("received a line that is not valid utf-8")]
    InvalidLine,
    #[error("socket operation failed: {0}")]
    Io(io::Error),
}

impl SocketError {
    /// The OS error code behind this failure, if there is one.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Self::Io(err) => err.raw_os_error(),
            _ => None,
        }
    }
}

/// The stream no longer lines up with the protocol framing.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("expected CRLF after {length} bytes of data")]
    MissingDelimiter { length: usize },
    #[error("response line {line:?} does not end in a data length")]
    InvalidDataLength { line: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerErrorKind {
    OutOfMemory,
    InternalError,
    Draining,
    BadFormat,
    UnknownCommand,
}

impl ServerErrorKind {
    pub fn from_status(status: &str) -> Option<Self> {
        match status {
            crate::response::OUT_OF_MEMORY => Some(Self::OutOfMemory),
            crate::response::INTERNAL_ERROR => Some(Self::InternalError),
            crate::response::DRAINING => Some(Self::Draining),
            crate::response::BAD_FORMAT => Some(Self::BadFormat),
            crate::response::UNKNOWN_COMMAND => Some(Self::UnknownCommand),
            _ => None,
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            Self::OutOfMemory => crate::response::OUT_OF_MEMORY,
            Self::InternalError => crate::response::INTERNAL_ERROR,
            Self::Draining => crate::response::DRAINING,
            Self::BadFormat => crate::response::BAD_FORMAT,
            Self::UnknownCommand => crate::response::UNKNOWN_COMMAND,
        }
    }
}

impl Display for ServerErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.status())
    }
}

/// A global error reported by the server in place of the command's reply.
#[derive(Error, Debug)]
#[error("{kind} in response to '{command}'")]
pub struct ServerError {
    pub kind: ServerErrorKind,
    pub status_line: String,
    pub command: String,
}

/// Raised by a response parser when a well-formed status line is not one its
/// command knows how to handle.
#[derive(Error, Debug)]
pub enum ResponseParseError {
    #[error("unhandled response: {line}")]
    Unexpected { line: String },
    #[error("malformed response {line:?}: {reason}")]
    Malformed { line: String, reason: String },
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("connection failed: {0}")]
    Connection(#[from] ConnectionError),
    #[error("socket failed: {0}")]
    Socket(#[from] SocketError),
    #[error("protocol framing failed: {0}")]
    Client(#[from] ClientError),
    #[error("server error: {0}")]
    Server(#[from] ServerError),
    #[error("cannot parse response: {0}")]
    Response(#[from] ResponseParseError),
}

impl Error {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Socket(SocketError::Timeout))
    }

    pub fn server_kind(&self) -> Option<ServerErrorKind> {
        match self {
            Self::Server(err) => Some(err.kind),
            _ => None,
        }
    }
}
