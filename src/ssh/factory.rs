// ABOUTME: Connection factory holding identities, trust store and debug state.
// ABOUTME: Mints RemoteSession handles; assigns each factory a process-unique id.

use super::client::RusshTransport;
use super::error::Result;
use super::identity::{Identity, IdentitySet};
use super::known_hosts::TrustStore;
use super::prompt::TrustPolicy;
use super::session::RemoteSession;
use super::target::Target;
use super::transport::Transport;
use crate::diagnostics::{Diagnostics, Warning};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

pub const DEFAULT_IDENTITY_FILENAME: &str = "id_rsa";
pub const KNOWN_HOSTS_FILENAME: &str = "known_hosts";
pub const DEFAULT_SSH_PORT: u16 = 22;

static NEXT_FACTORY_ID: AtomicU64 = AtomicU64::new(0);

fn next_factory_id() -> u64 {
    NEXT_FACTORY_ID.fetch_add(1, Ordering::Relaxed)
}

/// `$HOME/.ssh`, or `.ssh` relative to the working directory when HOME is unset.
pub fn default_ssh_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_default()
        .join(".ssh")
}

/// Username of the invoking OS user.
pub fn default_username() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "root".to_string())
}

/// Configuration for building a [`ConnectionFactory`].
#[derive(Clone)]
pub struct FactoryConfig {
    /// Remote user for sessions opened without an explicit one.
    pub default_username: String,
    /// Identity loaded at construction. Relative paths resolve against `ssh_dir`.
    pub identity: Option<PathBuf>,
    /// Passphrase for `identity`. `None` for an unencrypted key.
    pub passphrase: Option<String>,
    /// Directory holding identities and known_hosts.
    pub ssh_dir: PathBuf,
    /// SSH port (default: 22).
    pub port: u16,
    /// How unknown host keys are answered.
    pub trust_policy: TrustPolicy,
    /// Upper bound on a single command execution.
    pub command_timeout: Option<Duration>,
}

impl std::fmt::Debug for FactoryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FactoryConfig")
            .field("default_username", &self.default_username)
            .field("identity", &self.identity)
            .field("passphrase", &self.passphrase.as_ref().map(|_| "<redacted>"))
            .field("ssh_dir", &self.ssh_dir)
            .field("port", &self.port)
            .field("trust_policy", &self.trust_policy)
            .field("command_timeout", &self.command_timeout)
            .finish()
    }
}

impl Default for FactoryConfig {
    fn default() -> Self {
        Self::new(default_username())
    }
}

impl FactoryConfig {
    pub fn new(default_username: impl Into<String>) -> Self {
        Self {
            default_username: default_username.into(),
            identity: Some(PathBuf::from(DEFAULT_IDENTITY_FILENAME)),
            passphrase: None,
            ssh_dir: default_ssh_dir(),
            port: DEFAULT_SSH_PORT,
            trust_policy: TrustPolicy::default(),
            command_timeout: None,
        }
    }

    pub fn identity(mut self, path: impl Into<PathBuf>) -> Self {
        self.identity = Some(path.into());
        self
    }

    /// Construct without loading any identity.
    pub fn no_identity(mut self) -> Self {
        self.identity = None;
        self
    }

    pub fn passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.passphrase = Some(passphrase.into());
        self
    }

    pub fn ssh_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.ssh_dir = dir.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn trust_policy(mut self, policy: TrustPolicy) -> Self {
        self.trust_policy = policy;
        self
    }

    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = Some(timeout);
        self
    }
}

/// Per-factory settings sessions read at connect and exec time.
#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    pub port: u16,
    pub trust_policy: TrustPolicy,
    pub command_timeout: Option<Duration>,
}

/// What a session needs from the factory that created it.
pub trait SessionContext: Send + Sync {
    fn factory_id(&self) -> u64;
    fn diagnostics(&self) -> &Arc<Diagnostics>;
    fn identities(&self) -> &IdentitySet;
    fn trust_store(&self) -> Option<&TrustStore>;
    fn transport(&self) -> &dyn Transport;
    fn settings(&self) -> SessionSettings;
}

/// Process-wide holder of authentication material and trust configuration.
pub struct ConnectionFactory {
    id: u64,
    default_username: String,
    ssh_dir: PathBuf,
    diagnostics: Arc<Diagnostics>,
    identities: IdentitySet,
    trust_store: Option<TrustStore>,
    transport: Arc<dyn Transport>,
    settings: SessionSettings,
}

impl std::fmt::Debug for ConnectionFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionFactory")
            .field("id", &self.id)
            .field("default_username", &self.default_username)
            .field("identities", &self.identities)
            .field("trust_store", &self.trust_store)
            .field("transport", &"<dyn Transport>")
            .finish()
    }
}

impl ConnectionFactory {
    /// Build a factory that connects through russh.
    pub fn new(config: FactoryConfig) -> Result<Self> {
        Self::with_transport(config, Arc::new(RusshTransport::default()))
    }

    /// Build a factory on top of a custom transport.
    pub fn with_transport(config: FactoryConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        let id = next_factory_id();
        let trust_store = TrustStore::open(config.ssh_dir.join(KNOWN_HOSTS_FILENAME));

        let mut factory = Self {
            id,
            default_username: config.default_username,
            ssh_dir: config.ssh_dir,
            diagnostics: Arc::new(Diagnostics::new(id)),
            identities: IdentitySet::default(),
            trust_store,
            transport,
            settings: SessionSettings {
                port: config.port,
                trust_policy: config.trust_policy,
                command_timeout: config.command_timeout,
            },
        };

        if let Some(identity) = &config.identity {
            factory.load_identity(identity, config.passphrase.as_deref())?;
        }

        Ok(factory)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn default_username(&self) -> &str {
        &self.default_username
    }

    pub fn ssh_dir(&self) -> &Path {
        &self.ssh_dir
    }

    pub fn identities(&self) -> &IdentitySet {
        &self.identities
    }

    pub fn trust_store(&self) -> Option<&TrustStore> {
        self.trust_store.as_ref()
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Append an identity to the authentication trial set.
    ///
    /// `path` resolves against the SSH directory unless absolute. A missing
    /// file is reported as a warning before the load fails.
    pub fn load_identity(
        &mut self,
        path: impl AsRef<Path>,
        passphrase: Option<&str>,
    ) -> Result<&mut Self> {
        let path = self.ssh_dir.join(path);
        if !path.exists() {
            self.diagnostics.warn(Warning::missing_identity(format!(
                "identity file {} not found",
                path.display()
            )));
        }

        match passphrase {
            Some(_) => self.diagnostics.debug(format_args!(
                "loading identity {} with given passphrase",
                path.display()
            )),
            None => self
                .diagnostics
                .debug(format_args!("loading identity {}", path.display())),
        }

        let identity = Identity::load(&path, passphrase)?;
        if identity.is_locked() {
            self.diagnostics.debug(format_args!(
                "identity {} is encrypted and no passphrase was given",
                path.display()
            ));
        }
        self.identities.push(identity);

        if self.diagnostics.is_debug() {
            self.diagnostics
                .debug(format_args!("identities loaded: {}", self.identities.len()));
            for loaded in self.identities.paths() {
                self.diagnostics
                    .debug(format_args!("identity -> {}", loaded.display()));
            }
        }
        Ok(self)
    }

    /// Load `<ssh_dir>/id_rsa` if it exists.
    pub fn load_discovered_identity(&mut self) -> Result<&mut Self> {
        let path = self.ssh_dir.join(DEFAULT_IDENTITY_FILENAME);
        if path.exists() {
            self.load_identity(path, None)?;
        }
        Ok(self)
    }

    /// Open a session as the default user. Does not connect.
    pub fn open_session(&self, host: impl Into<String>) -> RemoteSession<'_> {
        RemoteSession::new(self, host.into(), self.default_username.clone(), self.settings.port)
    }

    /// Open a session as `user`. Does not connect.
    pub fn open_session_as(
        &self,
        host: impl Into<String>,
        user: impl Into<String>,
    ) -> RemoteSession<'_> {
        RemoteSession::new(self, host.into(), user.into(), self.settings.port)
    }

    /// Open a session for a parsed target, filling gaps from the factory defaults.
    pub fn open_target(&self, target: &Target) -> RemoteSession<'_> {
        RemoteSession::new(
            self,
            target.host.clone(),
            target
                .user
                .clone()
                .unwrap_or_else(|| self.default_username.clone()),
            target.port.unwrap_or(self.settings.port),
        )
    }

    pub fn debug_on(&self) -> &Self {
        self.diagnostics.set_debug(true);
        self
    }

    pub fn debug_off(&self) -> &Self {
        self.diagnostics.set_debug(false);
        self
    }

    pub fn is_debug(&self) -> bool {
        self.diagnostics.is_debug()
    }
}

impl SessionContext for ConnectionFactory {
    fn factory_id(&self) -> u64 {
        self.id
    }

    fn diagnostics(&self) -> &Arc<Diagnostics> {
        &self.diagnostics
    }

    fn identities(&self) -> &IdentitySet {
        &self.identities
    }

    fn trust_store(&self) -> Option<&TrustStore> {
        self.trust_store.as_ref()
    }

    fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    fn settings(&self) -> SessionSettings {
        self.settings
    }
}
