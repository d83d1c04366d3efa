// ABOUTME: One logical SSH connection to one host as one user.
// ABOUTME: Lazy connect, key authentication, command execution and deterministic release.

use super::error::{Error, Result};
use super::factory::SessionContext;
use super::identity::{IdentityKey, IdentitySet};
use super::known_hosts::HostKeyVerifier;
use super::prompt::{Prompt, Prompter};
use super::transport::{ChannelEvent, Connection, Endpoint, ExecChannel, TransportError};
use crate::diagnostics::Warning;
use async_trait::async_trait;
use std::pin::Pin;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Notify;

const STDIN_CHUNK: usize = 8 * 1024;

/// Output from a remote command execution.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Exit code of the command.
    pub exit_code: u32,
    /// Standard output.
    pub stdout: String,
    /// Standard error.
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

type Input<'a> = &'a mut (dyn AsyncRead + Unpin + Send);
type Sink<'a> = &'a mut (dyn AsyncWrite + Unpin + Send);

/// Streams bound to a remote command.
///
/// An omitted output sink is buffered and echoed to the local stdout or
/// stderr once the command completes.
#[derive(Default)]
pub struct ExecStreams<'a> {
    stdin: Option<Input<'a>>,
    stdout: Option<Sink<'a>>,
    stderr: Option<Sink<'a>>,
}

impl<'a> ExecStreams<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stdin(mut self, input: Input<'a>) -> Self {
        self.stdin = Some(input);
        self
    }

    pub fn stdout(mut self, sink: Sink<'a>) -> Self {
        self.stdout = Some(sink);
        self
    }

    pub fn stderr(mut self, sink: Sink<'a>) -> Self {
        self.stderr = Some(sink);
        self
    }
}

/// Where output of a stream the caller left unbound is echoed once a command completes.
#[async_trait]
pub trait LocalEcho: Send + Sync {
    async fn stdout(&self, data: &[u8]) -> std::io::Result<()>;
    async fn stderr(&self, data: &[u8]) -> std::io::Result<()>;
}

/// Echoes to this process's stdout and stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEcho;

#[async_trait]
impl LocalEcho for ProcessEcho {
    async fn stdout(&self, data: &[u8]) -> std::io::Result<()> {
        let mut out = tokio::io::stdout();
        out.write_all(data).await?;
        out.flush().await
    }

    async fn stderr(&self, data: &[u8]) -> std::io::Result<()> {
        let mut err = tokio::io::stderr();
        err.write_all(data).await?;
        err.flush().await
    }
}

/// Aborts the wait of an in-flight `exec` on the session it came from.
#[derive(Debug, Clone)]
pub struct InterruptHandle(Arc<Notify>);

impl InterruptHandle {
    /// Wakes a running `exec`, which then fails with [`Error::Interrupted`].
    /// Has no effect when no command is running.
    pub fn interrupt(&self) {
        self.0.notify_waiters();
    }
}

enum ConnectionState {
    Unconnected,
    Connected(Box<dyn Connection>),
    Closed,
}

/// A session to one remote host, created by a [`super::ConnectionFactory`].
pub struct RemoteSession<'f> {
    context: &'f dyn SessionContext,
    host: String,
    user: String,
    port: u16,
    state: ConnectionState,
    interrupt: Arc<Notify>,
    echo: Arc<dyn LocalEcho>,
}

impl std::fmt::Debug for RemoteSession<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteSession")
            .field("id", &self.id())
            .field("port", &self.port)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl<'f> RemoteSession<'f> {
    pub(crate) fn new(context: &'f dyn SessionContext, host: String, user: String, port: u16) -> Self {
        Self {
            context,
            host,
            user,
            port,
            state: ConnectionState::Unconnected,
            interrupt: Arc::new(Notify::new()),
            echo: Arc::new(ProcessEcho),
        }
    }

    /// Replace where unbound output streams are echoed.
    pub fn with_echo(mut self, echo: Arc<dyn LocalEcho>) -> Self {
        self.echo = echo;
        self
    }

    /// `user@host#factory-id`
    pub fn id(&self) -> String {
        format!("{}@{}#{}", self.user, self.host, self.context.factory_id())
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_connected(&self) -> bool {
        matches!(&self.state, ConnectionState::Connected(conn) if conn.is_connected())
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.state, ConnectionState::Closed)
    }

    pub fn interrupt_handle(&self) -> InterruptHandle {
        InterruptHandle(Arc::clone(&self.interrupt))
    }

    /// Run `command`, capturing stdout into `out`. Stderr is echoed locally.
    pub async fn exec_capture(&mut self, command: &str, out: &mut String) -> Result<u32> {
        let mut buf = Vec::new();
        let exit_code = self
            .exec(command, ExecStreams::new().stdout(&mut buf))
            .await?;
        out.push_str(&String::from_utf8_lossy(&buf));
        Ok(exit_code)
    }

    /// Run `command` and collect both output streams without echoing them.
    pub async fn exec_output(&mut self, command: &str) -> Result<CommandOutput> {
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let exit_code = self
            .exec(
                command,
                ExecStreams::new().stdout(&mut stdout).stderr(&mut stderr),
            )
            .await?;
        Ok(CommandOutput {
            exit_code,
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        })
    }

    /// Execute `command` on the remote host and return its exit status.
    ///
    /// Connects on first use. Blocks until the remote process has exited and
    /// its output is drained. The command channel is released on every path.
    pub async fn exec(&mut self, command: &str, streams: ExecStreams<'_>) -> Result<u32> {
        if command.trim().is_empty() {
            return Err(Error::EmptyCommand);
        }

        let interrupt = Arc::clone(&self.interrupt);
        let interrupted = interrupt.notified();
        tokio::pin!(interrupted);

        let context = self.context;
        let diagnostics = Arc::clone(context.diagnostics());
        let conn = self.ensure_connected().await?;

        diagnostics.debug(format_args!("exec -> {command}"));
        let mut channel = conn.open_exec().await.map_err(Error::CommandFailed)?;

        let mut run = ExecRun::new(streams, Arc::clone(&self.echo));
        let outcome = match context.settings().command_timeout {
            Some(limit) => {
                match tokio::time::timeout(
                    limit,
                    run.drive(channel.as_mut(), command, interrupted.as_mut()),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => Err(Error::CommandTimeout(limit)),
                }
            }
            None => run.drive(channel.as_mut(), command, interrupted.as_mut()).await,
        };

        if let Err(e) = channel.release().await {
            diagnostics.warn(Warning::channel_release(format!(
                "failed to release channel on {}: {e}",
                self.host
            )));
        }

        let exit_code = outcome?;
        run.echo_buffered().await?;
        diagnostics.debug(format_args!("rc -> {exit_code}"));
        Ok(exit_code)
    }

    /// Disconnect and mark the session closed. Safe to call repeatedly.
    pub async fn close(&mut self) {
        let previous = std::mem::replace(&mut self.state, ConnectionState::Closed);
        if let ConnectionState::Connected(mut conn) = previous {
            if conn.is_connected() {
                if let Err(e) = conn.disconnect().await {
                    self.context.diagnostics().warn(Warning::ssh_disconnect(format!(
                        "SSH disconnect failed for {}: {e}",
                        self.host
                    )));
                }
            }
        }
    }

    async fn ensure_connected(&mut self) -> Result<&mut Box<dyn Connection>> {
        let needs_connect = match &self.state {
            ConnectionState::Closed => return Err(Error::SessionClosed),
            ConnectionState::Connected(conn) => {
                let lost = !conn.is_connected();
                if lost {
                    self.context
                        .diagnostics()
                        .debug(format_args!("connection to {} lost, reconnecting", self.host));
                }
                lost
            }
            ConnectionState::Unconnected => true,
        };
        if needs_connect {
            self.state = ConnectionState::Connected(self.connect().await?);
        }
        match &mut self.state {
            ConnectionState::Connected(conn) => Ok(conn),
            _ => Err(Error::SessionClosed),
        }
    }

    async fn connect(&self) -> Result<Box<dyn Connection>> {
        let identities = self.context.identities();
        if identities.is_empty() {
            return Err(Error::NoIdentity);
        }

        let diagnostics = self.context.diagnostics();
        let settings = self.context.settings();
        let prompter = Prompter::new(&self.host, settings.trust_policy, Arc::clone(diagnostics));
        let verifier = HostKeyVerifier::new(
            &self.host,
            self.port,
            self.context.trust_store().cloned(),
            prompter.clone(),
        );
        let endpoint = Endpoint {
            host: self.host.clone(),
            port: self.port,
            user: self.user.clone(),
        };

        diagnostics.debug(format_args!("connecting to {}", endpoint.addr()));
        let mut conn = self
            .context
            .transport()
            .connect(&endpoint, verifier)
            .await
            .map_err(|e| match e {
                TransportError::HostKeyRejected { host } => Error::HostKeyRejected { host },
                other => Error::Connection(other),
            })?;

        if self.authenticate(conn.as_mut(), identities, &prompter).await? {
            diagnostics.debug(format_args!("authenticated as {}@{}", self.user, self.host));
            return Ok(conn);
        }

        if let Err(e) = conn.disconnect().await {
            diagnostics.debug(format_args!("disconnect after failed auth: {e}"));
        }
        Err(Error::AuthenticationFailed {
            user: self.user.clone(),
            host: self.host.clone(),
            tried: identities.len(),
        })
    }

    async fn authenticate(
        &self,
        conn: &mut dyn Connection,
        identities: &IdentitySet,
        prompter: &Prompter,
    ) -> Result<bool> {
        let diagnostics = prompter.diagnostics();
        for identity in identities.iter() {
            let key = match identity.key() {
                IdentityKey::Unlocked(key) => Arc::clone(key),
                IdentityKey::Locked => {
                    // Secrets are never offered, so a locked key is only announced.
                    let question = format!("Passphrase for {}", identity.path().display());
                    if prompter.respond(Prompt::PassphraseConfirm(&question)).proceed() {
                        prompter.respond(Prompt::Passphrase(&question));
                    }
                    diagnostics.debug(format_args!(
                        "skipping locked identity {}",
                        identity.path().display()
                    ));
                    continue;
                }
            };

            diagnostics.debug(format_args!("trying identity {}", identity.path().display()));
            if conn
                .authenticate_key(&self.user, key)
                .await
                .map_err(Error::Connection)?
            {
                return Ok(true);
            }
        }

        prompter.respond(Prompt::Password(&format!(
            "Password for {}@{}",
            self.user, self.host
        )));
        Ok(false)
    }
}

impl Drop for RemoteSession<'_> {
    fn drop(&mut self) {
        if let ConnectionState::Connected(_) = &self.state {
            self.context.diagnostics().debug(format_args!(
                "session {} dropped without close, releasing connection",
                self.id()
            ));
        }
    }
}

/// State of one command execution.
struct ExecRun<'s> {
    stdin: Option<Input<'s>>,
    stdout: Option<Sink<'s>>,
    stderr: Option<Sink<'s>>,
    stdout_buf: Vec<u8>,
    stderr_buf: Vec<u8>,
    echo_stdout: bool,
    echo_stderr: bool,
    echo: Arc<dyn LocalEcho>,
}

impl<'s> ExecRun<'s> {
    fn new(streams: ExecStreams<'s>, echo: Arc<dyn LocalEcho>) -> Self {
        Self {
            echo_stdout: streams.stdout.is_none(),
            echo_stderr: streams.stderr.is_none(),
            stdin: streams.stdin,
            stdout: streams.stdout,
            stderr: streams.stderr,
            stdout_buf: Vec::new(),
            stderr_buf: Vec::new(),
            echo,
        }
    }

    async fn drive(
        &mut self,
        channel: &mut dyn ExecChannel,
        command: &str,
        mut interrupted: Pin<&mut tokio::sync::futures::Notified<'_>>,
    ) -> Result<u32> {
        channel.exec(command).await.map_err(Error::CommandFailed)?;
        if self.stdin.is_none() {
            channel.send_eof().await.map_err(Error::CommandFailed)?;
        }

        let mut input = vec![0u8; STDIN_CHUNK];
        let mut exit_status = None;
        let mut exit_signal = None;
        let mut got_eof = false;

        loop {
            let exited = exit_status.is_some() || exit_signal.is_some();
            tokio::select! {
                _ = &mut interrupted => return Err(Error::Interrupted),
                read = read_input(&mut self.stdin, &mut input), if self.stdin.is_some() && !exited => {
                    let n = read?;
                    let sent = if n == 0 {
                        self.stdin = None;
                        channel.send_eof().await
                    } else {
                        channel.send_stdin(&input[..n]).await
                    };
                    if let Err(e) = sent {
                        // The remote side may have stopped reading; its exit status still decides.
                        tracing::debug!("stopped forwarding stdin: {e}");
                        if self.stdin.take().is_some() {
                            if let Err(e) = channel.send_eof().await {
                                tracing::debug!("eof after failed stdin write: {e}");
                            }
                        }
                    }
                }
                event = channel.next_event() => match event {
                    Some(ChannelEvent::Stdout(data)) => {
                        write_out(&mut self.stdout, &mut self.stdout_buf, &data).await?;
                    }
                    Some(ChannelEvent::Stderr(data)) => {
                        write_out(&mut self.stderr, &mut self.stderr_buf, &data).await?;
                    }
                    Some(ChannelEvent::ExitStatus(code)) => {
                        exit_status = Some(code);
                        if got_eof {
                            break;
                        }
                    }
                    Some(ChannelEvent::ExitSignal(signal)) => {
                        exit_signal = Some(signal);
                        if got_eof {
                            break;
                        }
                    }
                    Some(ChannelEvent::Eof) => {
                        got_eof = true;
                        if exited {
                            break;
                        }
                    }
                    Some(ChannelEvent::Closed) | None => break,
                },
            }
        }

        match (exit_status, exit_signal) {
            (Some(code), _) => Ok(code),
            (None, Some(signal)) => Err(Error::KilledBySignal { signal }),
            (None, None) => Err(Error::ChannelClosed),
        }
    }

    async fn echo_buffered(&self) -> Result<()> {
        if self.echo_stdout && !self.stdout_buf.is_empty() {
            self.echo.stdout(&self.stdout_buf).await?;
        }
        if self.echo_stderr && !self.stderr_buf.is_empty() {
            self.echo.stderr(&self.stderr_buf).await?;
        }
        Ok(())
    }
}

async fn read_input(stdin: &mut Option<Input<'_>>, buf: &mut [u8]) -> std::io::Result<usize> {
    match stdin {
        Some(reader) => reader.read(buf).await,
        None => std::future::pending().await,
    }
}

async fn write_out(sink: &mut Option<Sink<'_>>, buffer: &mut Vec<u8>, data: &[u8]) -> Result<()> {
    match sink {
        Some(writer) => {
            writer.write_all(data).await?;
            writer.flush().await?;
        }
        None => buffer.extend_from_slice(data),
    }
    Ok(())
}
