// ABOUTME: Trust and credential prompts raised while connecting.
// ABOUTME: Non-interactive responder: never offers secrets, decides host trust by policy.

use crate::diagnostics::Diagnostics;
use serde::Deserialize;
use std::sync::Arc;

/// How yes/no host-trust prompts are answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TrustPolicy {
    /// Deny every unknown or changed host key.
    #[default]
    DenyUnknown,
    /// Accept a host seen for the first time, deny a changed key.
    AcceptNew,
}

/// A question the transport or the authentication loop needs answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prompt<'a> {
    Password(&'a str),
    Passphrase(&'a str),
    /// Asks whether a passphrase should be requested at all.
    PassphraseConfirm(&'a str),
    /// Host-key trust question.
    YesNo(&'a str),
    /// Informational text, e.g. the server's banner.
    Message(&'a str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptReply {
    /// `None` means no credential is offered.
    Credential(Option<String>),
    Proceed(bool),
    Acknowledged,
}

impl PromptReply {
    pub fn proceed(&self) -> bool {
        matches!(self, PromptReply::Proceed(true))
    }
}

const UNKNOWN_HOST_PREFIX: &str = "The authenticity of host '";
const UNKNOWN_HOST_SUFFIX: &str = "' can't be established.";

/// Answers prompts on behalf of one session.
#[derive(Clone)]
pub struct Prompter {
    host: String,
    policy: TrustPolicy,
    diagnostics: Arc<Diagnostics>,
}

impl Prompter {
    pub fn new(host: impl Into<String>, policy: TrustPolicy, diagnostics: Arc<Diagnostics>) -> Self {
        Self {
            host: host.into(),
            policy,
            diagnostics,
        }
    }

    pub fn diagnostics(&self) -> &Arc<Diagnostics> {
        &self.diagnostics
    }

    pub fn respond(&self, prompt: Prompt<'_>) -> PromptReply {
        match prompt {
            Prompt::Password(message) => {
                self.diagnostics
                    .debug(format_args!("password prompt declined: {message}"));
                PromptReply::Credential(None)
            }
            Prompt::Passphrase(message) => {
                self.diagnostics
                    .debug(format_args!("passphrase prompt declined: {message}"));
                PromptReply::Credential(None)
            }
            Prompt::PassphraseConfirm(_) => PromptReply::Proceed(true),
            Prompt::YesNo(message) => {
                let accepted = self.decide_trust(message);
                self.diagnostics
                    .audit(format_args!("host {} asks: {message}", self.host));
                self.diagnostics.audit(format_args!(
                    "host {}: {}",
                    self.host,
                    if accepted { "accepted" } else { "denied" }
                ));
                PromptReply::Proceed(accepted)
            }
            Prompt::Message(message) => {
                self.diagnostics
                    .info(format_args!("message from {}: {message}", self.host));
                PromptReply::Acknowledged
            }
        }
    }

    fn decide_trust(&self, message: &str) -> bool {
        match self.policy {
            TrustPolicy::DenyUnknown => false,
            TrustPolicy::AcceptNew => is_unknown_host_prompt(message),
        }
    }
}

/// True when the first line is the canonical first-contact question.
fn is_unknown_host_prompt(message: &str) -> bool {
    let first_line = message.lines().next().unwrap_or("").trim_end();
    first_line.len() > UNKNOWN_HOST_PREFIX.len() + UNKNOWN_HOST_SUFFIX.len()
        && first_line.starts_with(UNKNOWN_HOST_PREFIX)
        && first_line.ends_with(UNKNOWN_HOST_SUFFIX)
}
