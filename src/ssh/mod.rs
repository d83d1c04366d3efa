// ABOUTME: SSH client module for running one remote command per session.
// ABOUTME: Factory, session lifecycle, host trust and the russh-backed transport.

mod client;
mod error;
mod factory;
mod identity;
mod known_hosts;
mod prompt;
mod session;
mod target;
pub mod transport;

pub use client::RusshTransport;
pub use error::{Error, ErrorKind, Result};
pub use factory::{
    ConnectionFactory, DEFAULT_IDENTITY_FILENAME, DEFAULT_SSH_PORT, FactoryConfig,
    KNOWN_HOSTS_FILENAME, SessionContext, SessionSettings, default_ssh_dir, default_username,
};
pub use identity::{Identity, IdentityKey, IdentitySet};
pub use known_hosts::{
    HostKeyStatus, HostKeyVerifier, TrustStore, changed_host_message, unknown_host_message,
};
pub use prompt::{Prompt, PromptReply, Prompter, TrustPolicy};
pub use session::{
    CommandOutput, ExecStreams, InterruptHandle, LocalEcho, ProcessEcho, RemoteSession,
};
pub use target::Target;
