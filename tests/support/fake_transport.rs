// ABOUTME: Scripted in-memory transport for session tests.
// ABOUTME: Records connects, authentication attempts, channels and releases.

use async_trait::async_trait;
use parking_lot::Mutex;
use russh::keys::ssh_key::{HashAlg, PrivateKey, PublicKey};
use sshexec::ssh::transport::{
    ChannelEvent, Connection, Endpoint, ExecChannel, Transport, TransportError,
};
use sshexec::ssh::{HostKeyVerifier, Prompt};
use std::path::Path;
use std::sync::Arc;

/// Everything the fake observed.
#[derive(Debug, Default)]
pub struct Recorder {
    pub connects: usize,
    pub endpoints: Vec<Endpoint>,
    /// SHA256 fingerprints of keys offered for authentication, in order.
    pub key_attempts: Vec<String>,
    pub channels_opened: usize,
    pub channels_released: usize,
    pub commands: Vec<String>,
    pub stdin: Vec<u8>,
    pub eofs_sent: usize,
    pub disconnects: usize,
    /// Set by tests to make the live connection report itself dead.
    pub connection_lost: bool,
}

/// Fingerprint of the public half of a fixture key.
pub fn fingerprint_of(private_key_path: &Path) -> String {
    public_key_of(private_key_path)
        .fingerprint(HashAlg::Sha256)
        .to_string()
}

/// Public half of a fixture key, read from its `.pub` file.
pub fn public_key_of(private_key_path: &Path) -> PublicKey {
    let pub_path = private_key_path.with_extension("pub");
    let text = std::fs::read_to_string(&pub_path).expect("fixture public key should exist");
    PublicKey::from_openssh(text.trim()).expect("fixture public key should parse")
}

#[derive(Clone)]
pub struct FakeTransport {
    recorder: Arc<Mutex<Recorder>>,
    unreachable: bool,
    accepted_fingerprint: Option<String>,
    reject_keys: bool,
    host_key_prompt: Option<String>,
    script: Vec<ChannelEvent>,
    hang: bool,
    exec_fails: bool,
    release_fails: bool,
    echo_stdin: bool,
    stdin_fails: bool,
}

impl Default for FakeTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeTransport {
    /// A host that accepts any key and runs `echo 42`.
    pub fn new() -> Self {
        Self {
            recorder: Arc::new(Mutex::new(Recorder::default())),
            unreachable: false,
            accepted_fingerprint: None,
            reject_keys: false,
            host_key_prompt: None,
            script: vec![
                ChannelEvent::Stdout(b"42\n".to_vec()),
                ChannelEvent::ExitStatus(0),
                ChannelEvent::Eof,
                ChannelEvent::Closed,
            ],
            hang: false,
            exec_fails: false,
            release_fails: false,
            echo_stdin: false,
            stdin_fails: false,
        }
    }

    pub fn recorder(&self) -> Arc<Mutex<Recorder>> {
        Arc::clone(&self.recorder)
    }

    pub fn unreachable(mut self) -> Self {
        self.unreachable = true;
        self
    }

    pub fn accept_only(mut self, fingerprint: impl Into<String>) -> Self {
        self.accepted_fingerprint = Some(fingerprint.into());
        self
    }

    pub fn reject_keys(mut self) -> Self {
        self.reject_keys = true;
        self
    }

    /// Ask the verifier this yes/no question during connect; deny fails the connect.
    pub fn host_key_prompt(mut self, text: impl Into<String>) -> Self {
        self.host_key_prompt = Some(text.into());
        self
    }

    pub fn script(mut self, events: Vec<ChannelEvent>) -> Self {
        self.script = events;
        self
    }

    /// After the script runs out, never complete.
    pub fn hang(mut self) -> Self {
        self.hang = true;
        self
    }

    pub fn exec_fails(mut self) -> Self {
        self.exec_fails = true;
        self
    }

    pub fn release_fails(mut self) -> Self {
        self.release_fails = true;
        self
    }

    /// Emit everything received on stdin as stdout before the script.
    pub fn echo_stdin(mut self) -> Self {
        self.echo_stdin = true;
        self
    }

    /// Refuse every stdin write, as a remote that stopped reading would.
    pub fn stdin_fails(mut self) -> Self {
        self.stdin_fails = true;
        self
    }

    pub fn into_arc(self) -> Arc<dyn Transport> {
        Arc::new(self)
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn connect(
        &self,
        endpoint: &Endpoint,
        verifier: HostKeyVerifier,
    ) -> Result<Box<dyn Connection>, TransportError> {
        {
            let mut rec = self.recorder.lock();
            rec.connects += 1;
            rec.endpoints.push(endpoint.clone());
            rec.connection_lost = false;
        }

        if self.unreachable {
            return Err(TransportError::Unreachable {
                addr: endpoint.addr(),
                message: "connection refused".to_string(),
            });
        }

        if let Some(text) = &self.host_key_prompt {
            if !verifier.prompter().respond(Prompt::YesNo(text)).proceed() {
                return Err(TransportError::HostKeyRejected {
                    host: endpoint.host.clone(),
                });
            }
        }

        Ok(Box::new(FakeConnection {
            transport: self.clone(),
            open: true,
        }))
    }
}

struct FakeConnection {
    transport: FakeTransport,
    open: bool,
}

#[async_trait]
impl Connection for FakeConnection {
    async fn authenticate_key(
        &mut self,
        _user: &str,
        key: Arc<PrivateKey>,
    ) -> Result<bool, TransportError> {
        let fingerprint = key.public_key().fingerprint(HashAlg::Sha256).to_string();
        self.transport
            .recorder
            .lock()
            .key_attempts
            .push(fingerprint.clone());

        if self.transport.reject_keys {
            return Ok(false);
        }
        Ok(match &self.transport.accepted_fingerprint {
            Some(accepted) => *accepted == fingerprint,
            None => true,
        })
    }

    async fn open_exec(&mut self) -> Result<Box<dyn ExecChannel>, TransportError> {
        self.transport.recorder.lock().channels_opened += 1;
        Ok(Box::new(FakeChannel {
            transport: self.transport.clone(),
            pending: Vec::new(),
            started: false,
            eof_received: false,
            released: false,
        }))
    }

    fn is_connected(&self) -> bool {
        self.open && !self.transport.recorder.lock().connection_lost
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        self.open = false;
        self.transport.recorder.lock().disconnects += 1;
        Ok(())
    }
}

struct FakeChannel {
    transport: FakeTransport,
    /// Events not yet delivered, in reverse order.
    pending: Vec<ChannelEvent>,
    started: bool,
    eof_received: bool,
    released: bool,
}

#[async_trait]
impl ExecChannel for FakeChannel {
    async fn exec(&mut self, command: &str) -> Result<(), TransportError> {
        self.transport
            .recorder
            .lock()
            .commands
            .push(command.to_string());
        if self.transport.exec_fails {
            return Err(TransportError::Channel {
                message: "exec request refused".to_string(),
            });
        }
        self.started = true;
        Ok(())
    }

    async fn send_stdin(&mut self, data: &[u8]) -> Result<(), TransportError> {
        if self.transport.stdin_fails {
            return Err(TransportError::Channel {
                message: "remote stopped reading stdin".to_string(),
            });
        }
        self.transport
            .recorder
            .lock()
            .stdin
            .extend_from_slice(data);
        Ok(())
    }

    async fn send_eof(&mut self) -> Result<(), TransportError> {
        self.transport.recorder.lock().eofs_sent += 1;
        if !self.eof_received {
            self.eof_received = true;
            let mut events = Vec::new();
            if self.transport.echo_stdin {
                let stdin = self.transport.recorder.lock().stdin.clone();
                if !stdin.is_empty() {
                    events.push(ChannelEvent::Stdout(stdin));
                }
            }
            events.extend(self.transport.script.iter().cloned());
            events.reverse();
            self.pending = events;
        }
        Ok(())
    }

    async fn next_event(&mut self) -> Option<ChannelEvent> {
        // Like a remote process blocked on stdin, nothing happens before EOF.
        if !self.started || !self.eof_received {
            return std::future::pending().await;
        }
        match self.pending.pop() {
            Some(event) => Some(event),
            None if self.transport.hang => std::future::pending().await,
            None => None,
        }
    }

    async fn release(&mut self) -> Result<(), TransportError> {
        assert!(!self.released, "channel released twice");
        self.released = true;
        self.transport.recorder.lock().channels_released += 1;
        if self.transport.release_fails {
            return Err(TransportError::Channel {
                message: "close failed".to_string(),
            });
        }
        Ok(())
    }
}
