//! Status words of the beanstalkd protocol and splitting of the status line.

pub const CRLF: &[u8; 2] = b"\r\n";
pub const CRLF_LENGTH: usize = 2;

// global errors, valid in reply to any command
pub const OUT_OF_MEMORY: &str = "OUT_OF_MEMORY";
pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
pub const DRAINING: &str = "DRAINING";
pub const BAD_FORMAT: &str = "BAD_FORMAT";
pub const UNKNOWN_COMMAND: &str = "UNKNOWN_COMMAND";

// followed by a data block
pub const RESERVED: &str = "RESERVED";
pub const FOUND: &str = "FOUND";
pub const OK: &str = "OK";

pub const INSERTED: &str = "INSERTED";
pub const BURIED: &str = "BURIED";
pub const EXPECTED_CRLF: &str = "EXPECTED_CRLF";
pub const JOB_TOO_BIG: &str = "JOB_TOO_BIG";
pub const USING: &str = "USING";
pub const DEADLINE_SOON: &str = "DEADLINE_SOON";
pub const TIMED_OUT: &str = "TIMED_OUT";
pub const DELETED: &str = "DELETED";
pub const NOT_FOUND: &str = "NOT_FOUND";
pub const RELEASED: &str = "RELEASED";
pub const TOUCHED: &str = "TOUCHED";
pub const WATCHING: &str = "WATCHING";
pub const NOT_IGNORED: &str = "NOT_IGNORED";
pub const KICKED: &str = "KICKED";
pub const PAUSED: &str = "PAUSED";

pub const DATA_RESPONSES: [&str; 3] = [RESERVED, FOUND, OK];

/// Every reply word a server may send, global errors included.
pub const KNOWN_RESPONSES: [&str; 23] = [
    OUT_OF_MEMORY,
    INTERNAL_ERROR,
    DRAINING,
    BAD_FORMAT,
    UNKNOWN_COMMAND,
    RESERVED,
    FOUND,
    OK,
    INSERTED,
    BURIED,
    EXPECTED_CRLF,
    JOB_TOO_BIG,
    USING,
    DEADLINE_SOON,
    TIMED_OUT,
    DELETED,
    NOT_FOUND,
    RELEASED,
    TOUCHED,
    WATCHING,
    NOT_IGNORED,
    KICKED,
    PAUSED,
];

pub fn is_data_response(status: &str) -> bool {
    DATA_RESPONSES.contains(&status)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusLine<'a> {
    pub status: &'a str,
    pub remainder: &'a str,
}

impl<'a> StatusLine<'a> {
    pub fn parse(line: &'a str) -> Self {
        let line = line.trim_start();
        match line.split_once(char::is_whitespace) {
            Some((status, remainder)) => Self {
                status,
                remainder: remainder.trim(),
            },
            None => Self {
                status: line,
                remainder: "",
            },
        }
    }

    pub fn args(&self) -> impl Iterator<Item = &'a str> {
        self.remainder.split_whitespace()
    }

    /// The length announced by the last token of a data-bearing reply.
    pub fn data_length(&self) -> Option<usize> {
        self.args().last()?.parse::<usize>().ok()
    }
}
