//! Request/response exchange with a beanstalkd server.
//!
//! A [`Connection`] opens its transport on first use and again after every
//! [`Connection::disconnect`]. Each [`Connection::dispatch`] writes one frame
//! and reads one complete reply, data block included, before returning.

use std::time::Duration;

use tracing::{debug, trace};

use crate::{
    command::{Command, ResponseParser},
    config::ConnectionParameters,
    error::{ClientError, ConnectionError, Error, ServerError, ServerErrorKind, SocketError},
    response::{is_data_response, StatusLine, CRLF, CRLF_LENGTH},
    socket::{NativeSocket, Socket},
};

enum SocketState {
    Unconnected,
    Open(Box<dyn Socket>),
    Closed,
}

pub struct Connection {
    params: ConnectionParameters,
    state: SocketState,
}

/// The exact bytes sent for `command`.
pub fn frame<C: Command + ?Sized>(command: &C) -> Vec<u8> {
    let mut frame: Vec<u8> = command.command_line().into_bytes();
    frame.extend_from_slice(CRLF);
    if command.has_data() {
        frame.extend_from_slice(command.data().unwrap_or_default());
        frame.extend_from_slice(CRLF);
    }
    frame
}

fn connect(params: &ConnectionParameters) -> Result<Box<dyn Socket>, ConnectionError> {
    let socket: NativeSocket = NativeSocket::connect(&params.host, params.port, params.timeout)?;
    debug!(addr = %socket.peer_addr(), timeout = ?socket.timeout(), "transport connected");
    Ok(Box::new(socket))
}

impl Connection {
    pub fn new(params: ConnectionParameters) -> Self {
        Self {
            params,
            state: SocketState::Unconnected,
        }
    }

    /// A connection that talks through `socket` until it is disconnected.
    pub fn with_socket(params: ConnectionParameters, socket: Box<dyn Socket>) -> Self {
        Self {
            params,
            state: SocketState::Open(socket),
        }
    }

    pub fn set_socket(&mut self, socket: Box<dyn Socket>) -> &mut Self {
        self.state = SocketState::Open(socket);
        self
    }

    pub fn has_socket(&self) -> bool {
        matches!(self.state, SocketState::Open(_))
    }

    pub fn host(&self) -> &str {
        &self.params.host
    }

    pub fn port(&self) -> u16 {
        self.params.port
    }

    pub fn timeout(&self) -> Duration {
        self.params.timeout
    }

    pub fn parameters(&self) -> &ConnectionParameters {
        &self.params
    }

    fn socket(&mut self) -> Result<&mut dyn Socket, ConnectionError> {
        if let SocketState::Unconnected | SocketState::Closed = self.state {
            let reconnect: bool = matches!(self.state, SocketState::Closed);
            debug!(
                host = %self.params.host,
                port = self.params.port,
                reconnect,
                "opening transport"
            );
            self.state = SocketState::Open(connect(&self.params)?);
        }
        match &mut self.state {
            SocketState::Open(socket) => Ok(socket.as_mut()),
            SocketState::Unconnected | SocketState::Closed => {
                unreachable!("transport opened above")
            }
        }
    }

    /// Closes the live transport. The next dispatch opens a new one.
    ///
    /// Fails with [`SocketError::Closed`] when there is no live transport.
    pub fn disconnect(&mut self) -> Result<(), SocketError> {
        match std::mem::replace(&mut self.state, SocketState::Closed) {
            SocketState::Open(mut socket) => socket.disconnect(),
            previous => {
                self.state = previous;
                Err(SocketError::Closed)
            }
        }
    }

    /// Whether a transport is, or can now be, established.
    pub fn is_service_listening(&mut self) -> bool {
        match self.socket() {
            Ok(_) => true,
            Err(err) => {
                debug!(%err, "service is not listening");
                false
            }
        }
    }

    pub fn dispatch<C: Command + ?Sized>(
        &mut self,
        command: &C,
    ) -> Result<<C::Parser as ResponseParser>::Output, Error> {
        let command_line: String = command.command_line();
        let frame: Vec<u8> = frame(command);
        let socket: &mut dyn Socket = self.socket()?;

        socket.write(&frame)?;
        trace!(command = %command_line, bytes = frame.len(), "sent frame");

        let line: String = socket.read_line()?;
        let status_line: StatusLine<'_> = StatusLine::parse(&line);
        debug!(command = %command_line, status = status_line.status, "received response");

        if let Some(kind) = ServerErrorKind::from_status(status_line.status) {
            return Err(ServerError {
                kind,
                status_line: line.clone(),
                command: command_line,
            }
            .into());
        }

        let data: Option<Vec<u8>> = if is_data_response(status_line.status) {
            let length: usize = status_line
                .data_length()
                .ok_or_else(|| ClientError::InvalidDataLength { line: line.clone() })?;
            let data: Vec<u8> = socket.read(length)?;
            let crlf: Vec<u8> = socket.read(CRLF_LENGTH)?;
            if crlf != CRLF {
                return Err(ClientError::MissingDelimiter { length }.into());
            }
            trace!(length, "read data block");
            Some(data)
        } else {
            None
        };

        Ok(command.response_parser().parse_response(&line, data)?)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        sync::{Arc, Mutex},
    };

    use super::*;
    use crate::{
        command::RawCommand,
        error::ResponseParseError,
        response::{DATA_RESPONSES, KNOWN_RESPONSES},
    };

    #[derive(Default)]
    struct Wire {
        writes: Vec<Vec<u8>>,
        incoming: VecDeque<u8>,
        reads: Vec<usize>,
        closed: bool,
    }

    #[derive(Clone, Default)]
    struct ScriptedSocket {
        wire: Arc<Mutex<Wire>>,
    }

    impl ScriptedSocket {
        fn replying(reply: &[u8]) -> Self {
            let socket = Self::default();
            socket.wire.lock().unwrap().incoming.extend(reply);
            socket
        }

        fn writes(&self) -> Vec<Vec<u8>> {
            self.wire.lock().unwrap().writes.clone()
        }

        fn reads(&self) -> Vec<usize> {
            self.wire.lock().unwrap().reads.clone()
        }

        fn unread(&self) -> Vec<u8> {
            self.wire.lock().unwrap().incoming.iter().copied().collect()
        }
    }

    impl Socket for ScriptedSocket {
        fn write(&mut self, data: &[u8]) -> Result<(), SocketError> {
            let mut wire = self.wire.lock().unwrap();
            if wire.closed {
                return Err(SocketError::Closed);
            }
            wire.writes.push(data.to_vec());
            Ok(())
        }

        fn read(&mut self, length: usize) -> Result<Vec<u8>, SocketError> {
            let mut wire = self.wire.lock().unwrap();
            if wire.closed {
                return Err(SocketError::Closed);
            }
            wire.reads.push(length);
            if wire.incoming.len() < length {
                return Err(SocketError::Timeout);
            }
            Ok(wire.incoming.drain(..length).collect())
        }

        fn read_line(&mut self) -> Result<String, SocketError> {
            let mut wire = self.wire.lock().unwrap();
            if wire.closed {
                return Err(SocketError::Closed);
            }
            let end = wire
                .incoming
                .iter()
                .position(|&b| b == b'\n')
                .ok_or(SocketError::Timeout)?;
            let mut line: Vec<u8> = wire.incoming.drain(..=end).collect();
            while matches!(line.last(), Some(b'\r' | b'\n')) {
                line.pop();
            }
            String::from_utf8(line).map_err(|_| SocketError::InvalidLine)
        }

        fn disconnect(&mut self) -> Result<(), SocketError> {
            let mut wire = self.wire.lock().unwrap();
            if wire.closed {
                return Err(SocketError::Closed);
            }
            wire.closed = true;
            Ok(())
        }
    }

    /// Hands back exactly what the parser was given.
    struct Echo;

    impl ResponseParser for Echo {
        type Output = (String, Option<Vec<u8>>);

        fn parse_response(
            &self,
            line: &str,
            data: Option<Vec<u8>>,
        ) -> Result<Self::Output, ResponseParseError> {
            Ok((line.to_owned(), data))
        }
    }

    struct EchoCommand {
        line: &'static str,
        data: Option<Vec<u8>>,
    }

    impl Command for EchoCommand {
        type Parser = Echo;

        fn command_line(&self) -> String {
            self.line.to_owned()
        }

        fn data(&self) -> Option<&[u8]> {
            self.data.as_deref()
        }

        fn response_parser(&self) -> Echo {
            Echo
        }
    }

    fn echo(line: &'static str) -> EchoCommand {
        EchoCommand { line, data: None }
    }

    fn connection(socket: &ScriptedSocket) -> Connection {
        Connection::with_socket(
            ConnectionParameters::new("nonexistent.invalid", 11300, None),
            Box::new(socket.clone()),
        )
    }

    #[test]
    fn command_without_payload_is_one_line() {
        let socket = ScriptedSocket::replying(b"USING default\r\n");
        let mut conn = connection(&socket);
        let (line, data) = conn.dispatch(&echo("use default")).unwrap();
        assert_eq!(line, "USING default");
        assert_eq!(data, None);
        assert_eq!(socket.writes(), vec![b"use default\r\n".to_vec()]);
        assert!(socket.reads().is_empty());
    }

    #[test]
    fn payload_follows_command_line() {
        let socket = ScriptedSocket::replying(b"INSERTED 9\r\n");
        let mut conn = connection(&socket);
        let payload = b"he\r\nllo\0".to_vec();
        conn.dispatch(&EchoCommand {
            line: "put 0 0 60 8",
            data: Some(payload.clone()),
        })
        .unwrap();
        let mut expected = b"put 0 0 60 8\r\n".to_vec();
        expected.extend_from_slice(&payload);
        expected.extend_from_slice(b"\r\n");
        assert_eq!(socket.writes(), vec![expected]);
    }

    #[test]
    fn empty_payload_still_gets_delimiter() {
        let socket = ScriptedSocket::replying(b"INSERTED 10\r\n");
        let mut conn = connection(&socket);
        conn.dispatch(&EchoCommand {
            line: "put 0 0 60 0",
            data: Some(Vec::new()),
        })
        .unwrap();
        assert_eq!(socket.writes(), vec![b"put 0 0 60 0\r\n\r\n".to_vec()]);
    }

    #[test]
    fn global_errors_are_raised_without_reading_data() {
        for (status, kind) in [
            ("OUT_OF_MEMORY", ServerErrorKind::OutOfMemory),
            ("INTERNAL_ERROR", ServerErrorKind::InternalError),
            ("DRAINING", ServerErrorKind::Draining),
            ("BAD_FORMAT", ServerErrorKind::BadFormat),
            ("UNKNOWN_COMMAND", ServerErrorKind::UnknownCommand),
        ] {
            let reply = format!("{status} extra text 5\r\nhello\r\n");
            let socket = ScriptedSocket::replying(reply.as_bytes());
            let mut conn = connection(&socket);
            match conn.dispatch(&echo("reserve")) {
                Err(Error::Server(err)) => {
                    assert_eq!(err.kind, kind);
                    assert_eq!(err.status_line, format!("{status} extra text 5"));
                    assert_eq!(err.command, "reserve");
                }
                other => panic!("expected server error for {status}, got {other:?}"),
            }
            assert!(socket.reads().is_empty());
            assert_eq!(socket.unread(), b"hello\r\n".to_vec());
        }
    }

    #[test]
    fn data_block_is_read_for_data_responses() {
        for status in DATA_RESPONSES {
            let reply = format!("{status} 12 5\r\nhello\r\n");
            let socket = ScriptedSocket::replying(reply.as_bytes());
            let mut conn = connection(&socket);
            let (line, data) = conn.dispatch(&echo("peek 12")).unwrap();
            assert_eq!(line, format!("{status} 12 5"));
            assert_eq!(data.as_deref(), Some(&b"hello"[..]));
            assert_eq!(socket.reads(), vec![5, CRLF_LENGTH]);
            assert!(socket.unread().is_empty());
        }
    }

    #[test]
    fn zero_length_data_block() {
        let socket = ScriptedSocket::replying(b"RESERVED 4 0\r\n\r\n");
        let mut conn = connection(&socket);
        let (_, data) = conn.dispatch(&echo("reserve")).unwrap();
        assert_eq!(data, Some(Vec::new()));
    }

    #[test]
    fn other_statuses_carry_no_data() {
        for status in KNOWN_RESPONSES {
            if is_data_response(status) || ServerErrorKind::from_status(status).is_some() {
                continue;
            }
            let reply = format!("{status} 5\r\nhello\r\n");
            let socket = ScriptedSocket::replying(reply.as_bytes());
            let mut conn = connection(&socket);
            let (_, data) = conn.dispatch(&echo("kick 5")).unwrap();
            assert_eq!(data, None);
            assert_eq!(socket.unread(), b"hello\r\n".to_vec());
        }
    }

    #[test]
    fn wrong_bytes_after_data_block() {
        let socket = ScriptedSocket::replying(b"FOUND 3 5\r\nhelloXYINSERTED 1\r\n");
        let mut conn = connection(&socket);
        match conn.dispatch(&echo("peek 3")) {
            Err(Error::Client(ClientError::MissingDelimiter { length })) => assert_eq!(length, 5),
            other => panic!("expected missing delimiter, got {other:?}"),
        }
        assert_eq!(socket.reads(), vec![5, CRLF_LENGTH]);
        assert_eq!(socket.unread(), b"INSERTED 1\r\n".to_vec());
    }

    #[test]
    fn data_response_without_length() {
        let socket = ScriptedSocket::replying(b"OK\r\n");
        let mut conn = connection(&socket);
        assert!(matches!(
            conn.dispatch(&echo("stats")),
            Err(Error::Client(ClientError::InvalidDataLength { .. }))
        ));
        assert!(socket.reads().is_empty());
    }

    #[test]
    fn parser_rejection_is_propagated() {
        let socket = ScriptedSocket::replying(b"WHATEVER 1\r\n");
        let mut conn = connection(&socket);
        assert!(matches!(
            conn.dispatch(&RawCommand::new("stats-job 1")),
            Err(Error::Response(ResponseParseError::Unexpected { .. }))
        ));
    }

    #[test]
    fn socket_errors_are_propagated() {
        let socket = ScriptedSocket::default();
        let mut conn = connection(&socket);
        let err = conn.dispatch(&echo("reserve")).unwrap_err();
        assert!(err.is_timeout());
    }

    #[test]
    fn disconnect_twice_fails() {
        let socket = ScriptedSocket::default();
        let mut conn = connection(&socket);
        assert!(conn.has_socket());
        conn.disconnect().unwrap();
        assert!(!conn.has_socket());
        assert!(socket.wire.lock().unwrap().closed);
        assert!(matches!(conn.disconnect(), Err(SocketError::Closed)));
    }

    #[test]
    fn disconnect_without_transport_fails() {
        let mut conn = Connection::new(ConnectionParameters::default());
        assert!(matches!(conn.disconnect(), Err(SocketError::Closed)));
        assert!(!conn.has_socket());
    }

    #[test]
    fn injected_socket_counts_as_listening() {
        let socket = ScriptedSocket::default();
        let mut conn = connection(&socket);
        assert!(conn.is_service_listening());
        assert!(socket.writes().is_empty());
    }

    #[test]
    fn unresolvable_host() {
        let mut conn = Connection::new(ConnectionParameters::new(
            "nonexistent.invalid",
            11300,
            Some(Duration::from_millis(200)),
        ));
        assert!(!conn.is_service_listening());
        assert!(matches!(
            conn.dispatch(&echo("stats")),
            Err(Error::Connection(_))
        ));
        assert!(!conn.has_socket());
    }

    #[test]
    fn set_socket_replaces_transport() {
        let first = ScriptedSocket::default();
        let second = ScriptedSocket::replying(b"DELETED\r\n");
        let mut conn = connection(&first);
        conn.set_socket(Box::new(second.clone()));
        conn.dispatch(&echo("delete 1")).unwrap();
        assert!(first.writes().is_empty());
        assert_eq!(second.writes(), vec![b"delete 1\r\n".to_vec()]);
    }

    #[test]
    fn accessors() {
        let conn = Connection::new(ConnectionParameters::new(
            "queue.local",
            11301,
            Some(Duration::from_secs(5)),
        ));
        assert_eq!(conn.host(), "queue.local");
        assert_eq!(conn.port(), 11301);
        assert_eq!(conn.timeout(), Duration::from_secs(5));
        assert_eq!(conn.parameters().port, 11301);
    }
}
