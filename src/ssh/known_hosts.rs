// ABOUTME: known_hosts trust store and host-key verification.
// ABOUTME: Turns unknown or changed keys into yes/no prompts and learns accepted keys.

use super::prompt::{Prompt, Prompter};
use crate::diagnostics::Warning;
use russh::keys::known_hosts::{check_known_hosts_path, learn_known_hosts_path};
use russh::keys::ssh_key::{HashAlg, PublicKey};
use std::path::{Path, PathBuf};

/// Result of looking a host key up in the trust store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostKeyStatus {
    Known,
    Unknown,
    /// A different key is recorded for this host at `line`.
    Changed { line: usize },
}

/// A known_hosts file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustStore {
    path: PathBuf,
}

impl TrustStore {
    /// Open the trust store at `path` if the file exists.
    pub fn open(path: impl Into<PathBuf>) -> Option<Self> {
        let path = path.into();
        path.is_file().then_some(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn check(&self, host: &str, port: u16, key: &PublicKey) -> HostKeyStatus {
        match check_known_hosts_path(host, port, key, &self.path) {
            Ok(true) => HostKeyStatus::Known,
            Ok(false) => HostKeyStatus::Unknown,
            Err(russh::keys::Error::KeyChanged { line }) => HostKeyStatus::Changed { line },
            Err(e) => {
                tracing::debug!("known_hosts lookup failed for {host}: {e}");
                HostKeyStatus::Unknown
            }
        }
    }

    pub fn learn(&self, host: &str, port: u16, key: &PublicKey) -> Result<(), russh::keys::Error> {
        learn_known_hosts_path(host, port, key, &self.path)
    }
}

/// Prompt text for a host that has never been seen.
pub fn unknown_host_message(host: &str, key: &PublicKey) -> String {
    format!(
        "The authenticity of host '{host}' can't be established.\n\
         {} key fingerprint is {}.\n\
         Are you sure you want to continue connecting?",
        key.algorithm().as_str(),
        key.fingerprint(HashAlg::Sha256)
    )
}

/// Prompt text for a host whose recorded key differs from the offered one.
pub fn changed_host_message(host: &str, key: &PublicKey, store: &Path, line: usize) -> String {
    format!(
        "WARNING: REMOTE HOST IDENTIFICATION HAS CHANGED!\n\
         IT IS POSSIBLE THAT SOMEONE IS DOING SOMETHING NASTY!\n\
         The {} host key for '{host}' has changed.\n\
         The offered key fingerprint is {}.\n\
         Offending key in {}:{line}\n\
         Do you want to replace the old key with the new key?",
        key.algorithm().as_str(),
        key.fingerprint(HashAlg::Sha256),
        store.display()
    )
}

/// Decides whether a server's host key is trusted.
///
/// Handed to the transport at connect time.
#[derive(Clone)]
pub struct HostKeyVerifier {
    host: String,
    port: u16,
    store: Option<TrustStore>,
    prompter: Prompter,
}

impl HostKeyVerifier {
    pub fn new(host: impl Into<String>, port: u16, store: Option<TrustStore>, prompter: Prompter) -> Self {
        Self {
            host: host.into(),
            port,
            store,
            prompter,
        }
    }

    pub fn prompter(&self) -> &Prompter {
        &self.prompter
    }

    pub fn verify(&self, key: &PublicKey) -> bool {
        let status = match &self.store {
            Some(store) => store.check(&self.host, self.port, key),
            None => HostKeyStatus::Unknown,
        };

        match status {
            HostKeyStatus::Known => {
                self.prompter
                    .diagnostics()
                    .debug(format_args!("host key for {} found in known_hosts", self.host));
                true
            }
            HostKeyStatus::Unknown => {
                let message = unknown_host_message(&self.host, key);
                let accepted = self.prompter.respond(Prompt::YesNo(&message)).proceed();
                if accepted {
                    self.remember(key);
                }
                accepted
            }
            HostKeyStatus::Changed { line } => {
                // Changed is only reachable with a store present.
                let store_path = self
                    .store
                    .as_ref()
                    .map(|s| s.path().to_path_buf())
                    .unwrap_or_default();
                let message = changed_host_message(&self.host, key, &store_path, line);
                self.prompter.respond(Prompt::YesNo(&message)).proceed()
            }
        }
    }

    fn remember(&self, key: &PublicKey) {
        let Some(store) = &self.store else {
            self.prompter.diagnostics().debug(format_args!(
                "no known_hosts file, host key for {} not persisted",
                self.host
            ));
            return;
        };
        if let Err(e) = store.learn(&self.host, self.port, key) {
            self.prompter.diagnostics().warn(Warning::known_hosts_update(format!(
                "failed to save host key for {} to {}: {e}",
                self.host,
                store.path().display()
            )));
        }
    }
}
