// ABOUTME: Configuration file for the sshexec CLI.
// ABOUTME: Handles YAML parsing, discovery under $HOME and conversion to a FactoryConfig.

mod deserialize;

use crate::error::{Error, Result};
use crate::ssh::{FactoryConfig, Target, TrustPolicy, default_ssh_dir, default_username};
use deserialize::deserialize_target_option;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Location of the config file relative to the home directory.
pub const CONFIG_PATH: &str = ".config/sshexec/config.yml";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Default remote user.
    #[serde(default)]
    pub user: Option<String>,

    /// Default target when the CLI is given none.
    #[serde(default, deserialize_with = "deserialize_target_option")]
    pub host: Option<Target>,

    /// Primary identity. Relative paths resolve against `ssh_dir`.
    #[serde(default)]
    pub identity: Option<PathBuf>,

    /// Additional unencrypted identities tried after the primary one.
    #[serde(default)]
    pub identities: Vec<PathBuf>,

    /// Environment variable holding the primary identity's passphrase.
    #[serde(default)]
    pub passphrase_env: Option<String>,

    #[serde(default)]
    pub ssh_dir: Option<PathBuf>,

    #[serde(default)]
    pub port: Option<u16>,

    #[serde(default)]
    pub trust: TrustPolicy,

    #[serde(default, with = "humantime_serde")]
    pub command_timeout: Option<Duration>,

    #[serde(default)]
    pub debug: bool,
}

impl Config {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Load `<home>/.config/sshexec/config.yml`, or defaults if it does not exist.
    pub fn discover(home: &Path) -> Result<Self> {
        let path = home.join(CONFIG_PATH);
        if path.exists() {
            return Self::load(&path);
        }
        Ok(Self::default())
    }

    fn validate(&self) -> Result<()> {
        if self.port == Some(0) {
            return Err(Error::InvalidConfig("port must be non-zero".to_string()));
        }
        if self.user.as_deref().is_some_and(|u| u.trim().is_empty()) {
            return Err(Error::InvalidConfig("user cannot be empty".to_string()));
        }
        if self.command_timeout == Some(Duration::ZERO) {
            return Err(Error::InvalidConfig(
                "command_timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolve the passphrase, if one is configured.
    pub fn passphrase(&self) -> Result<Option<String>> {
        match &self.passphrase_env {
            Some(var) => std::env::var(var)
                .map(Some)
                .map_err(|_| Error::MissingEnvVar(var.clone())),
            None => Ok(None),
        }
    }

    /// Build the library configuration for a connection factory.
    pub fn factory_config(&self) -> Result<FactoryConfig> {
        let mut config = FactoryConfig::new(self.user.clone().unwrap_or_else(default_username))
            .ssh_dir(self.ssh_dir.clone().unwrap_or_else(default_ssh_dir))
            .trust_policy(self.trust);

        if let Some(identity) = &self.identity {
            config = config.identity(identity);
        }
        if let Some(passphrase) = self.passphrase()? {
            config = config.passphrase(passphrase);
        }
        if let Some(port) = self.port {
            config = config.port(port);
        }
        if let Some(timeout) = self.command_timeout {
            config = config.command_timeout(timeout);
        }
        Ok(config)
    }
}
