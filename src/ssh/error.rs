// ABOUTME: SSH-specific error types.
// ABOUTME: Wraps every transport fault into one of four kinds callers can match on.

use super::transport::TransportError;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to load identity from {path}: {reason}")]
    KeyLoadFailed { path: PathBuf, reason: String },

    #[error("no identity loaded: at least one private key is required to authenticate")]
    NoIdentity,

    #[error("connection failed: {0}")]
    Connection(#[source] TransportError),

    #[error("host key for {host} was rejected")]
    HostKeyRejected { host: String },

    #[error("authentication failed for {user}@{host} after trying {tried} identities")]
    AuthenticationFailed {
        user: String,
        host: String,
        tried: usize,
    },

    #[error("command must not be empty")]
    EmptyCommand,

    #[error("session is closed")]
    SessionClosed,

    #[error("command execution failed: {0}")]
    CommandFailed(#[source] TransportError),

    #[error("channel closed unexpectedly without exit status")]
    ChannelClosed,

    #[error("remote process was killed by signal {signal}")]
    KilledBySignal { signal: String },

    #[error("command interrupted before the remote process completed")]
    Interrupted,

    #[error("command timed out after {0:?}")]
    CommandTimeout(Duration),

    #[error("I/O error on local stream: {0}")]
    Io(#[from] std::io::Error),
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Identity material is missing or could not be parsed.
    AuthSetup,
    /// The host could not be reached, its key was rejected, or no identity authenticated.
    Connect,
    /// Opening the channel or streaming the command failed.
    Exec,
    /// The wait for remote completion was aborted.
    Interrupted,
}

impl Error {
    /// Returns the error kind for programmatic handling.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::KeyLoadFailed { .. } | Error::NoIdentity => ErrorKind::AuthSetup,
            Error::Connection(_)
            | Error::HostKeyRejected { .. }
            | Error::AuthenticationFailed { .. } => ErrorKind::Connect,
            Error::EmptyCommand
            | Error::SessionClosed
            | Error::CommandFailed(_)
            | Error::ChannelClosed
            | Error::KilledBySignal { .. }
            | Error::Io(_) => ErrorKind::Exec,
            Error::Interrupted | Error::CommandTimeout(_) => ErrorKind::Interrupted,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
