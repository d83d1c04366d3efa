// ABOUTME: Contract between the session core and the SSH transport implementation.
// ABOUTME: Connection, authentication and exec-channel traits plus transport errors (SNAFU).

use super::known_hosts::HostKeyVerifier;
use async_trait::async_trait;
use russh::keys::ssh_key::PrivateKey;
use snafu::Snafu;
use std::sync::Arc;

/// Where a session connects to, and as whom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub user: String,
}

impl Endpoint {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Faults raised by a transport. Sessions wrap these into [`super::Error`].
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum TransportError {
    #[snafu(display("cannot reach {addr}: {message}"))]
    Unreachable { addr: String, message: String },

    #[snafu(display("host key for {host} was rejected"))]
    HostKeyRejected { host: String },

    #[snafu(display("SSH protocol error: {source}"))]
    Protocol { source: russh::Error },

    #[snafu(display("channel failure: {message}"))]
    Channel { message: String },

    #[snafu(display("I/O error: {source}"))]
    Io { source: std::io::Error },
}

/// Something that can open authenticated-capable connections.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a connection and complete key exchange.
    ///
    /// The server's host key must be passed through `verifier` before the
    /// connection is returned.
    async fn connect(
        &self,
        endpoint: &Endpoint,
        verifier: HostKeyVerifier,
    ) -> Result<Box<dyn Connection>, TransportError>;
}

/// A live transport connection to one host.
#[async_trait]
pub trait Connection: Send {
    /// Try public-key authentication. `Ok(false)` means the server refused the key.
    async fn authenticate_key(
        &mut self,
        user: &str,
        key: Arc<PrivateKey>,
    ) -> Result<bool, TransportError>;

    /// Open a session channel for running one command.
    async fn open_exec(&mut self) -> Result<Box<dyn ExecChannel>, TransportError>;

    fn is_connected(&self) -> bool;

    async fn disconnect(&mut self) -> Result<(), TransportError>;
}

/// What a command channel reports while the remote process runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Stdout(Vec<u8>),
    Stderr(Vec<u8>),
    ExitStatus(u32),
    /// The remote process was terminated by the named signal.
    ExitSignal(String),
    Eof,
    Closed,
}

/// One command-execution channel.
#[async_trait]
pub trait ExecChannel: Send {
    /// Start `command` on the remote side.
    async fn exec(&mut self, command: &str) -> Result<(), TransportError>;

    async fn send_stdin(&mut self, data: &[u8]) -> Result<(), TransportError>;

    async fn send_eof(&mut self) -> Result<(), TransportError>;

    /// Wait for the next event. `None` once the channel is gone.
    ///
    /// Must be cancel safe: the session races it against input and interrupts.
    async fn next_event(&mut self) -> Option<ChannelEvent>;

    /// Tear the channel down. Called exactly once per opened channel.
    async fn release(&mut self) -> Result<(), TransportError>;
}
