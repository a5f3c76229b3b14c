use std::fmt::Display;

use crate::{
    error::ResponseParseError,
    response::{is_data_response, StatusLine, KNOWN_RESPONSES},
};

/// Turns a status line, plus the data block that followed it, into a result.
pub trait ResponseParser {
    type Output;

    fn parse_response(
        &self,
        line: &str,
        data: Option<Vec<u8>>,
    ) -> Result<Self::Output, ResponseParseError>;
}

/// A request that can be sent over a [`crate::Connection`].
pub trait Command {
    type Parser: ResponseParser;

    fn command_line(&self) -> String;

    fn has_data(&self) -> bool {
        self.data().is_some()
    }

    fn data(&self) -> Option<&[u8]> {
        None
    }

    fn response_parser(&self) -> Self::Parser;
}

/// A command line typed verbatim, with an optional job body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCommand {
    pub line: String,
    pub data: Option<Vec<u8>>,
}

impl RawCommand {
    pub fn new(line: impl Into<String>) -> Self {
        Self {
            line: line.into(),
            data: None,
        }
    }

    pub fn with_data(line: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            line: line.into(),
            data: Some(data.into()),
        }
    }
}

impl Display for RawCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.line)
    }
}

impl Command for RawCommand {
    type Parser = RawResponseParser;

    fn command_line(&self) -> String {
        self.line.clone()
    }

    fn data(&self) -> Option<&[u8]> {
        self.data.as_deref()
    }

    fn response_parser(&self) -> Self::Parser {
        RawResponseParser
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: String,
    pub args: Vec<String>,
    pub data: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RawResponseParser;

impl ResponseParser for RawResponseParser {
    type Output = RawResponse;

    fn parse_response(
        &self,
        line: &str,
        data: Option<Vec<u8>>,
    ) -> Result<Self::Output, ResponseParseError> {
        let status_line: StatusLine<'_> = StatusLine::parse(line);
        if !KNOWN_RESPONSES.contains(&status_line.status) {
            return Err(ResponseParseError::Unexpected {
                line: line.to_owned(),
            });
        }
        if is_data_response(status_line.status) != data.is_some() {
            return Err(ResponseParseError::Malformed {
                line: line.to_owned(),
                reason: "data block does not match status".to_owned(),
            });
        }
        Ok(RawResponse {
            status: status_line.status.to_owned(),
            args: status_line.args().map(str::to_owned).collect(),
            data,
        })
    }
}
