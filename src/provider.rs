//! Hosting providers and repository descriptors
//!
//! Two interchangeable providers take part in every run. One of them is the
//! clone/pull source; the identity links of both decide how the mirror push URL
//! is derived from the fetch URL.

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// Which provider acts as the source for this run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SourceChoice {
    /// Clone from the origin provider, mirror pushes to the mirror provider
    #[default]
    Origin,
    /// Clone from the mirror provider, mirror pushes to the origin provider
    Mirror,
}

impl fmt::Display for SourceChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceChoice::Origin => write!(f, "origin"),
            SourceChoice::Mirror => write!(f, "mirror"),
        }
    }
}

/// A remote hosting endpoint: host URL plus owning account
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderSource {
    pub url: String,
    pub username: String,
}

impl ProviderSource {
    pub fn new(url: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            username: username.into(),
        }
    }

    /// `host:username`, the string that identifies this provider inside a git config
    pub fn identity_link(&self) -> String {
        format!("{}:{}", self.url, self.username)
    }

    /// SSH clone URL of a repository hosted by this provider
    pub fn clone_url(&self, repository: &str) -> String {
        format!("git@{}:{}/{}.git", self.url, self.username, repository)
    }
}

/// Origin and mirror providers of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderPair {
    pub origin: ProviderSource,
    pub mirror: ProviderSource,
}

impl ProviderPair {
    /// Resolve the source provider and the link substitution for the push URL
    pub fn resolve(&self, choice: SourceChoice) -> SyncSource {
        let (source, target) = match choice {
            SourceChoice::Origin => (&self.origin, &self.mirror),
            SourceChoice::Mirror => (&self.mirror, &self.origin),
        };

        SyncSource {
            provider: source.clone(),
            original_link: source.identity_link(),
            new_link: target.identity_link(),
        }
    }
}

/// The provider repositories are fetched from, plus the rewrite applied to push URLs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSource {
    pub provider: ProviderSource,
    pub original_link: String,
    pub new_link: String,
}

/// One configured repository as seen by a sync run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryDescriptor {
    pub name: String,
    pub local_path: PathBuf,
    pub clone_url: String,
}

impl RepositoryDescriptor {
    pub fn new(name: &str, storage_root: &Path, source: &SyncSource) -> Self {
        Self {
            name: name.to_string(),
            local_path: storage_root.join(name),
            clone_url: source.provider.clone_url(name),
        }
    }
}
