//! A small asynchronous client for the MPD text protocol.

#[cfg(test)]
pub mod fake;

use std::{fmt, io};

use thiserror::Error;
use tokio::{
    io::{AsyncBufReadExt as _, AsyncWriteExt as _, BufReader},
    net::TcpStream,
};

use crate::player::Status;

/// Greeting prefix sent by the server right after the connection is accepted
const GREETING_PREFIX: &str = "OK MPD ";

#[derive(Debug, Error)]
pub enum MpdError {
    #[error("Failed to connect to MPD at {addr}: {source}")]
    Connect { addr: String, source: io::Error },
    #[error("I/O error during `{command}`: {source}")]
    Io { command: String, source: io::Error },
    #[error("Unexpected line in response to `{command}`: {line:?}")]
    Protocol { command: String, line: String },
    #[error("MPD rejected `{command}` (error {code}): {message}")]
    Ack {
        command: String,
        code: u32,
        message: String,
    },
    #[error("MPD status has no `{0}` field")]
    MissingField(&'static str),
    #[error("MPD status field `{field}` has invalid value {value:?}")]
    InvalidField { field: &'static str, value: String },
    #[error("MPD closed the connection during `{command}`")]
    Closed { command: String },
}

/// A playback command understood by the player
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Resume, or start the current song
    Play,
    Pause,
    Next,
    Previous,
    /// Set the mixer volume in percent. Out of range values are left for the server to reject.
    SetVolume(i32),
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Play => f.write_str("play"),
            Self::Pause => f.write_str("pause 1"),
            Self::Next => f.write_str("next"),
            Self::Previous => f.write_str("previous"),
            Self::SetVolume(volume) => write!(f, "setvol {volume}"),
        }
    }
}

/// An open connection to an MPD server
pub struct MpdClient {
    addr: String,
    version: String,
    stream: BufReader<TcpStream>,
}

impl MpdClient {
    /// Connect to `addr` (`host:port`) and read the server greeting
    ///
    /// # Errors
    ///
    /// Returns an error if the server is unreachable or does not greet like an MPD server.
    pub async fn connect(addr: &str) -> Result<Self, MpdError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|source| MpdError::Connect {
                addr: addr.to_owned(),
                source,
            })?;
        let mut stream = BufReader::new(stream);

        let greeting = read_line(&mut stream, "connect").await?;
        let Some(version) = greeting.strip_prefix(GREETING_PREFIX) else {
            return Err(MpdError::Protocol {
                command: "connect".to_owned(),
                line: greeting,
            });
        };
        let version = version.to_owned();
        tracing::debug!(%addr, %version, "Connected to MPD");

        Ok(Self {
            addr: addr.to_owned(),
            version,
            stream,
        })
    }

    /// Address this client is connected to
    #[must_use]
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Protocol version announced by the server
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Query the current playback state and volume
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the response lacks a `state` field.
    pub async fn status(&mut self) -> Result<Status, MpdError> {
        let pairs = self.run("status").await?;
        Status::from_pairs(&pairs)
    }

    /// Send a playback command and wait for its acknowledgement
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails or the server rejects the command.
    pub async fn execute(&mut self, command: Command) -> Result<(), MpdError> {
        match command {
            Command::Play => self.play().await,
            Command::Pause => self.pause().await,
            Command::Next => self.next().await,
            Command::Previous => self.previous().await,
            Command::SetVolume(volume) => self.set_volume(volume).await,
        }
    }

    pub async fn play(&mut self) -> Result<(), MpdError> {
        self.acknowledge(Command::Play).await
    }

    pub async fn pause(&mut self) -> Result<(), MpdError> {
        self.acknowledge(Command::Pause).await
    }

    pub async fn next(&mut self) -> Result<(), MpdError> {
        self.acknowledge(Command::Next).await
    }

    pub async fn previous(&mut self) -> Result<(), MpdError> {
        self.acknowledge(Command::Previous).await
    }

    pub async fn set_volume(&mut self, volume: i32) -> Result<(), MpdError> {
        self.acknowledge(Command::SetVolume(volume)).await
    }

    async fn acknowledge(&mut self, command: Command) -> Result<(), MpdError> {
        self.run(&command.to_string()).await.map(drop)
    }

    /// Send a single command line and collect the `key: value` pairs of the response
    async fn run(&mut self, command: &str) -> Result<Vec<(String, String)>, MpdError> {
        let io_err = |source: io::Error| MpdError::Io {
            command: command.to_owned(),
            source,
        };
        self.stream
            .write_all(format!("{command}\n").as_bytes())
            .await
            .map_err(io_err)?;
        self.stream.flush().await.map_err(io_err)?;

        let mut pairs = Vec::new();
        loop {
            let line = read_line(&mut self.stream, command).await?;
            if line == "OK" {
                return Ok(pairs);
            }
            if let Some(ack) = line.strip_prefix("ACK ") {
                return Err(parse_ack(command, ack));
            }
            match line.split_once(": ") {
                Some((key, value)) => pairs.push((key.to_owned(), value.to_owned())),
                None => {
                    return Err(MpdError::Protocol {
                        command: command.to_owned(),
                        line,
                    })
                }
            }
        }
    }
}

/// Read one response line without its terminator
async fn read_line(stream: &mut BufReader<TcpStream>, command: &str) -> Result<String, MpdError> {
    let mut line = String::new();
    let read = stream
        .read_line(&mut line)
        .await
        .map_err(|source| MpdError::Io {
            command: command.to_owned(),
            source,
        })?;
    if read == 0 {
        return Err(MpdError::Closed {
            command: command.to_owned(),
        });
    }
    line.truncate(line.trim_end_matches(['\r', '\n']).len());
    Ok(line)
}

/// Parse the body of an `ACK [code@index] {command} message` line
fn parse_ack(command: &str, ack: &str) -> MpdError {
    let code = ack
        .strip_prefix('[')
        .and_then(|s| s.split_once('@'))
        .and_then(|(code, _)| code.parse().ok())
        .unwrap_or_default();
    let message = ack
        .split_once("} ")
        .map_or(ack, |(_, message)| message)
        .to_owned();
    MpdError::Ack {
        command: command.to_owned(),
        code,
        message,
    }
}
