use std::{
    io,
    net::{SocketAddr, ToSocketAddrs},
    time::{Duration, Instant},
};

use crate::error::{ConnectionError, SocketError};

pub fn is_errorkind_timeout(kind: io::ErrorKind) -> bool {
    matches!(kind, io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock)
}

pub fn socket_error(err: io::Error) -> SocketError {
    if is_errorkind_timeout(err.kind()) {
        SocketError::Timeout
    } else {
        SocketError::Io(err)
    }
}

/// Every address `host` resolves to, IPv4 first since beanstalkd binds IPv4 by default.
pub fn resolve(host: &str, port: u16) -> Result<Vec<SocketAddr>, ConnectionError> {
    let addrs: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|source| ConnectionError::Resolve {
            host: host.to_owned(),
            source,
        })?
        .collect();
    if addrs.is_empty() {
        return Err(ConnectionError::NoAddress {
            host: host.to_owned(),
        });
    }
    Ok(prefer_ipv4(addrs))
}

pub fn prefer_ipv4(mut addrs: Vec<SocketAddr>) -> Vec<SocketAddr> {
    addrs.sort_by_key(|addr: &SocketAddr| addr.is_ipv6());
    addrs
}

/// Wall-clock limit for one blocking operation, fixed when the operation starts.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    timeout: Duration,
}

impl Deadline {
    pub fn after(timeout: Duration) -> Self {
        Self {
            started: Instant::now(),
            timeout,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Time left before expiry; `Timeout` once nothing is left.
    pub fn remaining(&self) -> Result<Duration, SocketError> {
        match self.timeout.checked_sub(self.started.elapsed()) {
            Some(left) if !left.is_zero() => Ok(left),
            _ => Err(SocketError::Timeout),
        }
    }
}
