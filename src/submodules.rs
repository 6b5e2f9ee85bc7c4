//! Submodule processing after a parent repository was cloned or pulled
//!
//! Each submodule is opened as a [`LocalRepository`] of kind
//! [`RepoKind::Submodule`] and gets the same treatment as its parent. Only direct
//! submodules are visited. Errors are collected with a `submodule <name>:` prefix so
//! they can be appended to the parent's error list.

use serde::Serialize;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::branches::reconcile_branches;
use crate::credentials::SshAuth;
use crate::git::{short_hash, BranchScope, GitBackend, LocalRepository, PullResult, RepoKind, SubmoduleEntry};
use crate::remote_config::rewrite_remote_config;

/// Result for one submodule
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SubmoduleOutcome {
    /// Branches derived, default branch checked out, push URLs added
    Reconciled {
        default_branch: Option<String>,
        branches: Vec<String>,
    },
    UpToDate,
    Pulled { old: String, new: String },
    NotARepository,
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmoduleReport {
    pub name: String,
    pub path: PathBuf,
    pub outcome: SubmoduleOutcome,
}

/// Collected results of one walk
#[derive(Debug, Default)]
pub struct SubmoduleWalk {
    pub reports: Vec<SubmoduleReport>,
    pub errors: Vec<String>,
}

/// Settings shared by every submodule of a run
pub struct WalkContext<'a> {
    pub git: &'a dyn GitBackend,
    pub auth: &'a SshAuth,
    pub remote: &'a str,
    pub original_link: &'a str,
    pub new_link: &'a str,
}

impl WalkContext<'_> {
    /// Reconcile every submodule of a freshly cloned parent
    pub async fn after_clone(&self, parent: &LocalRepository) -> SubmoduleWalk {
        let mut walk = SubmoduleWalk::default();

        for entry in self.entries(parent, &mut walk).await {
            let Some(repo) = self.open(parent, &entry, &mut walk).await else {
                continue;
            };

            let outcome = self.reconcile(&repo, &mut walk.errors).await;
            walk.reports.push(SubmoduleReport {
                name: entry.name,
                path: repo.path,
                outcome,
            });
        }

        walk
    }

    /// Fast-forward every submodule of a pulled (or already current) parent
    pub async fn after_pull(&self, parent: &LocalRepository) -> SubmoduleWalk {
        let mut walk = SubmoduleWalk::default();

        for entry in self.entries(parent, &mut walk).await {
            let Some(repo) = self.open(parent, &entry, &mut walk).await else {
                continue;
            };

            let outcome = match self.git.pull_fast_forward(&repo, self.remote, self.auth).await {
                Ok(PullResult::UpToDate) => {
                    debug!("Submodule {} already up to date", entry.name);
                    SubmoduleOutcome::UpToDate
                }
                Ok(PullResult::Updated { old, new }) => {
                    info!("Submodule {} pulled {}..{}", entry.name, short_hash(&old), short_hash(&new));
                    SubmoduleOutcome::Pulled {
                        old: short_hash(&old).to_string(),
                        new: short_hash(&new).to_string(),
                    }
                }
                Err(e) => {
                    let error = format!("pull failed: {:#}", e);
                    walk.errors.push(repo.qualify(&error));
                    SubmoduleOutcome::Failed { error }
                }
            };

            walk.reports.push(SubmoduleReport {
                name: entry.name,
                path: repo.path,
                outcome,
            });
        }

        walk
    }

    async fn entries(&self, parent: &LocalRepository, walk: &mut SubmoduleWalk) -> Vec<SubmoduleEntry> {
        match self.git.submodules(parent).await {
            Ok(entries) => entries,
            Err(e) => {
                walk.errors.push(format!("failed to list submodules: {:#}", e));
                Vec::new()
            }
        }
    }

    async fn open(
        &self,
        parent: &LocalRepository,
        entry: &SubmoduleEntry,
        walk: &mut SubmoduleWalk,
    ) -> Option<LocalRepository> {
        let path = parent.path.join(&entry.path);
        let kind = RepoKind::Submodule {
            name: entry.name.clone(),
        };

        let outcome = match self.git.open(&path, kind).await {
            Ok(Some(repo)) => return Some(repo),
            Ok(None) => {
                warn!("Submodule {} is not a local repository: {}", entry.name, path.display());
                SubmoduleOutcome::NotARepository
            }
            Err(e) => {
                let error = format!("failed to open: {:#}", e);
                walk.errors.push(format!("submodule {}: {}", entry.name, error));
                SubmoduleOutcome::Failed { error }
            }
        };

        walk.reports.push(SubmoduleReport {
            name: entry.name.clone(),
            path,
            outcome,
        });
        None
    }

    async fn reconcile(&self, repo: &LocalRepository, errors: &mut Vec<String>) -> SubmoduleOutcome {
        errors.extend(reconcile_branches(self.git, repo, self.remote).await);

        let default_branch = self.default_branch(repo).await;
        match &default_branch {
            Some(branch) => {
                if let Err(e) = self.git.checkout(repo, branch).await {
                    errors.push(repo.qualify(format!("checkout {} failed: {:#}", branch, e)));
                }
            }
            None => errors.push(repo.qualify("no remote reports a default branch")),
        }

        match self.git.config_path(repo).await {
            Ok(config) => {
                if let Err(e) = rewrite_remote_config(&config, self.original_link, self.new_link) {
                    errors.push(repo.qualify(format!("{:#}", e)));
                }
            }
            Err(e) => errors.push(repo.qualify(format!("cannot locate config: {:#}", e))),
        }

        let branches = match self.git.list_branches(repo, &BranchScope::Local).await {
            Ok(branches) => branches,
            Err(e) => {
                errors.push(repo.qualify(format!("failed to list local branches: {:#}", e)));
                Vec::new()
            }
        };

        SubmoduleOutcome::Reconciled {
            default_branch,
            branches,
        }
    }

    /// Ask the primary remote first, then the others; the first answer wins
    async fn default_branch(&self, repo: &LocalRepository) -> Option<String> {
        let mut remotes = match self.git.remotes(repo).await {
            Ok(remotes) => remotes,
            Err(e) => {
                debug!("Cannot list remotes of {}: {:#}", repo.path.display(), e);
                return None;
            }
        };
        if let Some(position) = remotes.iter().position(|name| name == self.remote) {
            let primary = remotes.remove(position);
            remotes.insert(0, primary);
        }

        for remote in &remotes {
            match self.git.remote_head(repo, remote, self.auth).await {
                Ok(Some(branch)) => return Some(branch),
                Ok(None) => debug!("Remote {} has no symbolic HEAD", remote),
                Err(e) => debug!("Cannot query HEAD of {}: {:#}", remote, e),
            }
        }

        None
    }
}
