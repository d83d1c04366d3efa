// ABOUTME: russh-backed implementation of the transport traits.
// ABOUTME: Handles connection, host-key checks, authentication and exec channels.

use super::known_hosts::HostKeyVerifier;
use super::prompt::Prompt;
use super::transport::{
    ChannelEvent, Connection, Endpoint, ExecChannel, ProtocolSnafu, Transport, TransportError,
};
use async_trait::async_trait;
use russh::client::{self, Config, Handle, Msg};
use russh::keys::{PrivateKeyWithHashAlg, ssh_key};
use russh::{Channel, ChannelMsg, Disconnect, Sig};
use snafu::ResultExt;
use std::sync::Arc;
use std::time::Duration;

/// SSH client handler for russh.
pub(crate) struct SshHandler {
    verifier: HostKeyVerifier,
}

impl client::Handler for SshHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &ssh_key::PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        Ok(self.verifier.verify(server_public_key))
    }

    async fn auth_banner(
        &mut self,
        banner: &str,
        _session: &mut client::Session,
    ) -> std::result::Result<(), Self::Error> {
        self.verifier.prompter().respond(Prompt::Message(banner.trim_end()));
        Ok(())
    }
}

const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Transport that speaks SSH through russh.
#[derive(Debug, Clone, Default)]
pub struct RusshTransport;

#[async_trait]
impl Transport for RusshTransport {
    async fn connect(
        &self,
        endpoint: &Endpoint,
        verifier: HostKeyVerifier,
    ) -> Result<Box<dyn Connection>, TransportError> {
        // No inactivity timeout: a command may stay silent for a long time.
        let russh_config = Config {
            inactivity_timeout: None,
            keepalive_interval: Some(KEEPALIVE_INTERVAL),
            ..Default::default()
        };

        let handler = SshHandler { verifier };

        let handle = client::connect(
            Arc::new(russh_config),
            (endpoint.host.as_str(), endpoint.port),
            handler,
        )
        .await
        .map_err(|e| match e {
            russh::Error::UnknownKey => TransportError::HostKeyRejected {
                host: endpoint.host.clone(),
            },
            other => TransportError::Unreachable {
                addr: endpoint.addr(),
                message: other.to_string(),
            },
        })?;

        Ok(Box::new(RusshConnection { handle }))
    }
}

struct RusshConnection {
    handle: Handle<SshHandler>,
}

#[async_trait]
impl Connection for RusshConnection {
    async fn authenticate_key(
        &mut self,
        user: &str,
        key: Arc<ssh_key::PrivateKey>,
    ) -> Result<bool, TransportError> {
        let hash_alg = self
            .handle
            .best_supported_rsa_hash()
            .await
            .context(ProtocolSnafu)?
            .flatten();

        let result = self
            .handle
            .authenticate_publickey(user, PrivateKeyWithHashAlg::new(key, hash_alg))
            .await
            .context(ProtocolSnafu)?;

        Ok(result.success())
    }

    async fn open_exec(&mut self) -> Result<Box<dyn ExecChannel>, TransportError> {
        let channel = self
            .handle
            .channel_open_session()
            .await
            .context(ProtocolSnafu)?;
        Ok(Box::new(RusshChannel { channel }))
    }

    fn is_connected(&self) -> bool {
        !self.handle.is_closed()
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        self.handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
            .context(ProtocolSnafu)
    }
}

struct RusshChannel {
    channel: Channel<Msg>,
}

#[async_trait]
impl ExecChannel for RusshChannel {
    async fn exec(&mut self, command: &str) -> Result<(), TransportError> {
        self.channel
            .exec(true, command)
            .await
            .context(ProtocolSnafu)
    }

    async fn send_stdin(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.channel.data(data).await.context(ProtocolSnafu)
    }

    async fn send_eof(&mut self) -> Result<(), TransportError> {
        self.channel.eof().await.context(ProtocolSnafu)
    }

    async fn next_event(&mut self) -> Option<ChannelEvent> {
        loop {
            let event = match self.channel.wait().await? {
                ChannelMsg::Data { data } => ChannelEvent::Stdout(data.to_vec()),
                // Extended data type 1 is stderr
                ChannelMsg::ExtendedData { data, ext: 1 } => ChannelEvent::Stderr(data.to_vec()),
                ChannelMsg::ExitStatus { exit_status } => ChannelEvent::ExitStatus(exit_status),
                ChannelMsg::Eof => ChannelEvent::Eof,
                ChannelMsg::Close => ChannelEvent::Closed,
                ChannelMsg::ExitSignal { signal_name, .. } => {
                    ChannelEvent::ExitSignal(signal_label(&signal_name))
                }
                _ => continue,
            };
            return Some(event);
        }
    }

    async fn release(&mut self) -> Result<(), TransportError> {
        self.channel.close().await.context(ProtocolSnafu)
    }
}

fn signal_label(signal: &Sig) -> String {
    match signal {
        Sig::Custom(name) => name.clone(),
        other => format!("{other:?}"),
    }
}
