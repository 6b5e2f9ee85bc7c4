use anyhow::{bail, Context, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::provider::{ProviderPair, ProviderSource};

/// Main configuration structure for repomirror
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    /// Local workspace settings
    #[serde(default)]
    pub storage: StorageConfig,

    /// SSH credentials used for every remote operation
    #[serde(default)]
    pub ssh: SshConfig,

    /// The two interchangeable hosting providers
    #[serde(default)]
    pub providers: ProvidersConfig,

    /// Repository names, in the order they are processed
    #[serde(default)]
    pub repositories: Vec<String>,

    /// Post-clone setup scripts
    #[serde(default)]
    pub scripts: ScriptConfig,

    /// Synchronization behavior settings
    #[serde(default)]
    pub sync: SyncConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Local workspace configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StorageConfig {
    /// Root directory; each repository lives at `<path>/<name>`
    #[serde(default = "default_storage_path")]
    pub path: String,
}

/// SSH configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SshConfig {
    /// Private key handed to ssh for clone, pull and ls-remote
    #[serde(default = "default_private_key")]
    pub private_key: String,
}

/// Origin and mirror provider configuration
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub origin: ProviderConfig,

    #[serde(default)]
    pub mirror: ProviderConfig,
}

/// A single hosting provider
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq, Eq)]
pub struct ProviderConfig {
    /// Host part of the clone URL, e.g. "github.com"
    #[serde(default)]
    pub url: String,

    /// Account owning the repositories
    #[serde(default)]
    pub username: String,
}

/// Scripts executed inside a freshly cloned repository
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct ScriptConfig {
    /// Script file names, run in order when present at the repository root
    #[serde(default)]
    pub run_queue: Vec<String>,
}

/// Synchronization configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SyncConfig {
    /// Remote that is cloned, pulled and rewritten
    #[serde(default = "default_remote_name")]
    pub remote_name: String,

    /// Pause between repositories in milliseconds (0 disables)
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,

    /// Process repositories in lexical order instead of configured order
    #[serde(default)]
    pub sort: bool,
}

/// Logging configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Log level used when neither RUST_LOG nor --verbose is given
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default value functions
fn default_storage_path() -> String {
    "${HOME}/Documents/Repos".to_string()
}
fn default_private_key() -> String {
    "${HOME}/.ssh/id_ed25519".to_string()
}
fn default_remote_name() -> String {
    "origin".to_string()
}
fn default_delay_ms() -> u64 {
    100
}
fn default_log_level() -> String {
    "warn".to_string()
}

// Default implementations
impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
        }
    }
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            private_key: default_private_key(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            remote_name: default_remote_name(),
            delay_ms: default_delay_ms(),
            sort: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from the default location, writing the example config on first use
    pub fn load_or_default() -> Result<Self> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load(&config_path)
        } else {
            let config = Self::example();

            if let Some(parent) = config_path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
            }

            config.save(&config_path)?;

            tracing::info!("Created example configuration at: {:?}", config_path);
            let mut config = config;
            config.expand_paths()?;
            Ok(config)
        }
    }

    /// Load configuration from a specific file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let mut config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        config.expand_paths()?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_yaml::to_string(self).context("Failed to serialize configuration")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;

        Ok(())
    }

    /// Get the default configuration file path (XDG compliant)
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = config_dir().context("Failed to get user config directory")?;

        Ok(config_dir.join("repomirror").join("config.yml"))
    }

    /// Example configuration written by `config init`
    pub fn example() -> Self {
        Self {
            providers: ProvidersConfig {
                origin: ProviderConfig {
                    url: "github.com".to_string(),
                    username: "your-name".to_string(),
                },
                mirror: ProviderConfig {
                    url: "git.example.com".to_string(),
                    username: "your-name".to_string(),
                },
            },
            repositories: vec!["dotfiles".to_string(), "notes".to_string()],
            scripts: ScriptConfig {
                run_queue: vec!["create-git-hook.sh".to_string()],
            },
            ..Self::default()
        }
    }

    /// Expand environment variables and `~` in configuration paths
    pub fn expand_paths(&mut self) -> Result<()> {
        self.storage.path = expand_path(&self.storage.path)
            .context("Failed to expand storage.path")?;

        self.ssh.private_key = expand_path(&self.ssh.private_key)
            .context("Failed to expand ssh.private_key")?;

        Ok(())
    }

    /// Check the settings every sync run depends on
    pub fn validate(&self) -> Result<()> {
        if self.storage.path.trim().is_empty() {
            bail!("storage.path is not set");
        }
        for (label, provider) in [
            ("origin", &self.providers.origin),
            ("mirror", &self.providers.mirror),
        ] {
            if provider.url.trim().is_empty() || provider.username.trim().is_empty() {
                bail!("providers.{} needs both url and username", label);
            }
        }
        if self.sync.remote_name.trim().is_empty() {
            bail!("sync.remote_name must not be empty");
        }
        for name in &self.repositories {
            if !is_plain_name(name) {
                bail!("repositories: {:?} is not a plain directory name", name);
            }
        }
        for script in &self.scripts.run_queue {
            if !is_plain_name(script) {
                bail!("scripts.run_queue: {:?} is not a plain file name", script);
            }
        }
        Ok(())
    }

    /// Storage root as a path
    pub fn storage_root(&self) -> PathBuf {
        PathBuf::from(&self.storage.path)
    }

    /// Private key as a path
    pub fn private_key_path(&self) -> PathBuf {
        PathBuf::from(&self.ssh.private_key)
    }

    /// Provider descriptors for this run
    pub fn provider_pair(&self) -> ProviderPair {
        ProviderPair {
            origin: ProviderSource::new(&self.providers.origin.url, &self.providers.origin.username),
            mirror: ProviderSource::new(&self.providers.mirror.url, &self.providers.mirror.username),
        }
    }

    /// Resolve a caller selection against the configured repository list.
    ///
    /// An empty selection means every configured repository, in configured order.
    /// Duplicates are dropped; names that are not configured are rejected.
    pub fn select_repositories(&self, selection: &[String]) -> Result<Vec<String>> {
        if selection.is_empty() {
            return Ok(self.repositories.clone());
        }

        let unknown: Vec<&str> = selection
            .iter()
            .filter(|name| !self.repositories.contains(name))
            .map(String::as_str)
            .collect();
        if !unknown.is_empty() {
            bail!("Repositories not present in configuration: {}", unknown.join(", "));
        }

        let mut selected: Vec<String> = Vec::with_capacity(selection.len());
        for name in selection {
            if !selected.contains(name) {
                selected.push(name.clone());
            }
        }
        Ok(selected)
    }
}

/// A single path component: not empty, no separators, not `.` or `..`
pub fn is_plain_name(name: &str) -> bool {
    !name.trim().is_empty()
        && !name.contains(['/', '\\'])
        && Path::new(name).file_name() == Some(std::ffi::OsStr::new(name))
}

fn expand_path(raw: &str) -> Result<String> {
    if raw.is_empty() {
        return Ok(String::new());
    }
    let expanded = shellexpand::full(raw)?;
    let cleaned = path_clean::clean(&*expanded);
    Ok(cleaned.to_string_lossy().into_owned())
}
