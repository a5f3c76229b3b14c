use std::{
    io::{self, stdin, stdout, BufRead, StdinLock, StdoutLock, Write},
    process::exit,
    time::Duration,
};

use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use rsbeanstalk::{
    config::{parse_timeout, DEFAULT_HOST},
    Connection, ConnectionParameters, RawCommand, RawResponse, DEFAULT_PORT, DEFAULT_TIMEOUT,
};
use thiserror::Error;
use tracing_subscriber::EnvFilter;
use util::fatal;

mod util;

#[derive(Error, Debug)]
pub enum ReadCommandError {
    #[error("cannot write to stdout")]
    StdoutWriteError(io::Error),
    #[error("cannot read from stdin")]
    StdinReadError(io::Error),
}

/// Prompts for one line; `None` once stdin is exhausted.
pub fn read_input(prompt: &str) -> Result<Option<String>, ReadCommandError> {
    let mut stdout: StdoutLock<'_> = stdout().lock();
    if let Err(err) = stdout.write_all(prompt.as_bytes()) {
        return Err(ReadCommandError::StdoutWriteError(err));
    }
    if let Err(err) = stdout.flush() {
        return Err(ReadCommandError::StdoutWriteError(err));
    }
    let mut input: String = String::new();
    let mut stdin: StdinLock<'_> = stdin().lock();
    match stdin.read_line(&mut input) {
        Ok(0) => Ok(None),
        Ok(_) => Ok(Some(input.trim_end_matches(['\r', '\n']).to_owned())),
        Err(err) => Err(ReadCommandError::StdinReadError(err)),
    }
}

/// `put <pri> <delay> <ttr>` without a byte count gets the body's length appended.
pub fn complete_put_line(line: &str, body: &[u8]) -> String {
    if line.split_whitespace().count() == 4 {
        format!("{} {}", line.trim(), body.len())
    } else {
        line.trim().to_owned()
    }
}

pub fn read_command() -> Result<Option<RawCommand>, ReadCommandError> {
    let Some(line) = read_input("> ")? else {
        return Ok(None);
    };
    if line.split_whitespace().next() != Some("put") {
        return Ok(Some(RawCommand::new(line.trim())));
    }
    let body: String = read_input("body> ")?.unwrap_or_default();
    Ok(Some(RawCommand::with_data(
        complete_put_line(&line, body.as_bytes()),
        body,
    )))
}

pub fn print_response(response: &RawResponse) {
    if response.args.is_empty() {
        println!("< {}", response.status);
    } else {
        println!("< {} {}", response.status, response.args.join(" "));
    }
    if let Some(data) = &response.data {
        for line in String::from_utf8_lossy(data).lines() {
            println!("< {}", line);
        }
    }
}

pub enum TransmissionResult {
    Success { response: RawResponse },
    Error(anyhow::Error),
    Fatal(anyhow::Error),
}

/// Server-reported and parser errors leave the stream usable; the rest do not.
pub fn transmission(connection: &mut Connection, command: &RawCommand) -> TransmissionResult {
    match connection.dispatch(command) {
        Ok(response) => TransmissionResult::Success { response },
        Err(err @ (rsbeanstalk::Error::Server(_) | rsbeanstalk::Error::Response(_))) => {
            TransmissionResult::Error(err.into())
        }
        Err(err) => TransmissionResult::Fatal(err.into()),
    }
}

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .try_init();
}

pub fn main() {
    init_logging();
    let args: ArgMatches = Command::new("rsbeanstalk")
        .about("A simple beanstalkd client written in rust")
        .arg(
            Arg::new("host")
                .help(format!("hostname of the server (default: {})", DEFAULT_HOST))
                .required(false),
        )
        .arg(
            Arg::new("port")
                .help(format!("port of the server (default: {})", DEFAULT_PORT))
                .required(false)
                .short('p')
                .long("port")
                .value_parser(value_parser!(u16)),
        )
        .arg(
            Arg::new("timeout")
                .help(format!(
                    "timeout of connect, send and receive in seconds (default: {} s)",
                    DEFAULT_TIMEOUT.as_secs()
                ))
                .required(false)
                .short('t')
                .long("timeout"),
        )
        .arg(
            Arg::new("check")
                .help("only check whether the server accepts connections")
                .long("check")
                .action(ArgAction::SetTrue),
        )
        .get_matches();
    let host: String = args
        .get_one::<String>("host")
        .map(|host: &String| host.to_owned())
        .unwrap_or_else(|| DEFAULT_HOST.to_owned());
    let port: u16 = args.get_one::<u16>("port").copied().unwrap_or(DEFAULT_PORT);
    let timeout: Option<Duration> = args
        .get_one::<String>("timeout")
        .map(|timeout: &String| parse_timeout(timeout));
    let mut connection: Connection =
        Connection::new(ConnectionParameters::new(host, port, timeout));

    if args.get_flag("check") {
        let listening: bool = connection.is_service_listening();
        println!(
            "{}:{} is {}",
            connection.host(),
            connection.port(),
            if listening { "listening" } else { "not listening" }
        );
        exit(if listening { 0 } else { 1 });
    }

    println!("Type your command or \"quit\" to disconnect");
    loop {
        let command: RawCommand = match read_command() {
            Ok(Some(command)) => command,
            Ok(None) => break,
            Err(err) => fatal(&format!("{err}")),
        };
        if command.line.is_empty() {
            continue;
        }
        if command.line == "quit" || command.line == "disconnect" {
            break;
        }
        match transmission(&mut connection, &command) {
            TransmissionResult::Success { response } => print_response(&response),
            TransmissionResult::Error(err) => eprintln!("{err}"),
            TransmissionResult::Fatal(err) => fatal(&format!("{err}")),
        }
    }
    if connection.has_socket() {
        connection
            .disconnect()
            .unwrap_or_else(|err| fatal(&format!("{err}")));
    }
}
