//! SSH credentials for remote git operations
//!
//! The engine asks a [`CredentialProvider`] for an [`SshAuth`] once per run. Every
//! git process that talks to a remote gets the handle applied, which pins ssh to the
//! configured private key. Passphrase entry stays with ssh and ssh-agent.

use anyhow::{anyhow, bail, Context, Result};
use std::path::{Path, PathBuf};
use tokio::process::Command as AsyncCommand;
use tracing::{debug, warn};

/// Authenticated transport handle applied to git child processes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SshAuth {
    private_key: Option<PathBuf>,
}

impl SshAuth {
    /// Pin ssh to a specific private key
    pub fn with_key(private_key: impl Into<PathBuf>) -> Self {
        Self {
            private_key: Some(private_key.into()),
        }
    }

    /// Use whatever ssh would pick on its own (agent, ~/.ssh/config)
    pub fn ambient() -> Self {
        Self::default()
    }

    pub fn private_key(&self) -> Option<&Path> {
        self.private_key.as_deref()
    }

    /// Value for `GIT_SSH_COMMAND`, if a key is pinned
    pub fn ssh_command(&self) -> Option<String> {
        self.private_key.as_ref().map(|key| {
            format!(
                "ssh -i {} -o IdentitiesOnly=yes",
                shell_quote(&key.to_string_lossy())
            )
        })
    }

    /// Configure a git child process to authenticate with this handle
    pub fn apply(&self, command: &mut AsyncCommand) {
        if let Some(ssh_command) = self.ssh_command() {
            command.env("GIT_SSH_COMMAND", ssh_command);
        }
        // Never block on an https username prompt
        command.env("GIT_TERMINAL_PROMPT", "0");
    }
}

/// Source of the transport handle for a run
#[cfg_attr(test, mockall::automock)]
pub trait CredentialProvider: Send + Sync {
    /// Produce a handle for the given private key; an error aborts the whole run
    fn acquire(&self, private_key: &Path) -> Result<SshAuth>;
}

/// Credential provider backed by a private key file on disk
#[derive(Debug, Default, Clone)]
pub struct SshKeyCredentials;

impl SshKeyCredentials {
    pub fn new() -> Self {
        Self
    }
}

impl CredentialProvider for SshKeyCredentials {
    fn acquire(&self, private_key: &Path) -> Result<SshAuth> {
        if private_key.as_os_str().is_empty() {
            bail!("No private key configured (ssh.private_key)");
        }

        let metadata = std::fs::metadata(private_key)
            .with_context(|| format!("Private key not found: {}", private_key.display()))?;
        if !metadata.is_file() {
            bail!("Private key is not a file: {}", private_key.display());
        }

        let content = std::fs::read_to_string(private_key)
            .with_context(|| format!("Failed to read private key: {}", private_key.display()))?;

        match inspect_key(&content) {
            KeyKind::Plain => debug!("Using private key {}", private_key.display()),
            KeyKind::Encrypted => warn!(
                "Private key {} is passphrase protected; ssh-agent or ssh will ask for it",
                private_key.display()
            ),
            KeyKind::NotAKey => {
                return Err(anyhow!(
                    "File does not contain a private key: {}",
                    private_key.display()
                ))
            }
        }

        Ok(SshAuth::with_key(private_key))
    }
}

#[derive(Debug, PartialEq, Eq)]
enum KeyKind {
    Plain,
    Encrypted,
    NotAKey,
}

fn inspect_key(content: &str) -> KeyKind {
    if !content.contains("-----BEGIN") || !content.contains("PRIVATE KEY-----") {
        return KeyKind::NotAKey;
    }
    // PEM keys announce encryption in a header; OpenSSH-format keys hide it in the body
    if content.contains("ENCRYPTED") {
        KeyKind::Encrypted
    } else {
        KeyKind::Plain
    }
}

fn shell_quote(raw: &str) -> String {
    format!("'{}'", raw.replace('\'', r"'\''"))
}
