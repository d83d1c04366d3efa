// ABOUTME: Private-key identities used for public-key authentication.
// ABOUTME: Parses keys eagerly; encrypted keys without a passphrase stay locked.

use super::error::{Error, Result};
use russh::keys::ssh_key::PrivateKey;
use russh::keys::load_secret_key;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Key material of one identity.
#[derive(Clone)]
pub enum IdentityKey {
    Unlocked(Arc<PrivateKey>),
    /// Encrypted key loaded without a passphrase.
    Locked,
}

/// A private key registered for authentication trials.
#[derive(Clone)]
pub struct Identity {
    path: PathBuf,
    key: IdentityKey,
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("path", &self.path)
            .field("locked", &self.is_locked())
            .finish()
    }
}

impl Identity {
    /// Parse the private key at `path`. `None` means the key is not encrypted.
    pub fn load(path: &Path, passphrase: Option<&str>) -> Result<Self> {
        match load_secret_key(path, passphrase) {
            Ok(key) => Ok(Self {
                path: path.to_path_buf(),
                key: IdentityKey::Unlocked(Arc::new(key)),
            }),
            Err(russh::keys::Error::KeyIsEncrypted) if passphrase.is_none() => Ok(Self {
                path: path.to_path_buf(),
                key: IdentityKey::Locked,
            }),
            Err(e) => Err(Error::KeyLoadFailed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn key(&self) -> &IdentityKey {
        &self.key
    }

    pub fn is_locked(&self) -> bool {
        matches!(self.key, IdentityKey::Locked)
    }
}

/// Ordered set of identities. Loads only ever append.
#[derive(Debug, Clone, Default)]
pub struct IdentitySet {
    identities: Vec<Identity>,
}

impl IdentitySet {
    pub fn push(&mut self, identity: Identity) {
        self.identities.push(identity);
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Identity> {
        self.identities.iter()
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.identities.iter().map(Identity::path)
    }
}
