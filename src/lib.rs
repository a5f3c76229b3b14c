//! Connection and socket transport for the beanstalkd work queue protocol.
//!
//! [`Connection::dispatch`] writes a [`Command`] as one CRLF-terminated frame,
//! reads the status line, raises global server errors, collects the data
//! block of `RESERVED`/`FOUND`/`OK` replies, and hands the rest to the
//! command's [`ResponseParser`].

pub mod command;
pub mod config;
pub mod connection;
pub mod error;
pub mod response;
pub mod socket;
mod tcp_util;

pub use command::{Command, RawCommand, RawResponse, RawResponseParser, ResponseParser};
pub use config::{ConnectionParameters, DEFAULT_PORT, DEFAULT_TIMEOUT};
pub use connection::Connection;
pub use error::{
    ClientError, ConnectionError, Error, ResponseParseError, ServerError, ServerErrorKind,
    SocketError,
};
pub use socket::{NativeSocket, Socket};
