//! Local branches derived from remote tracking branches

use tracing::{debug, warn};

use crate::git::{BranchScope, GitBackend, LocalRepository};

/// A branch name in a given namespace of one repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchRef {
    pub name: String,
    pub scope: BranchScope,
    /// Set when the branch lives in a submodule
    pub submodule: Option<String>,
}

impl BranchRef {
    fn remote(repo: &LocalRepository, remote: &str, name: &str) -> Self {
        Self {
            name: name.to_string(),
            scope: BranchScope::Remote(remote.to_string()),
            submodule: repo.submodule_name().map(str::to_string),
        }
    }

    /// Full reference name, e.g. `refs/remotes/origin/dev`
    pub fn full_name(&self) -> String {
        match &self.scope {
            BranchScope::Local => format!("refs/heads/{}", self.name),
            BranchScope::Remote(remote) => format!("refs/remotes/{}/{}", remote, self.name),
        }
    }

    /// Name as shown in reports
    pub fn display_name(&self) -> String {
        match &self.submodule {
            Some(submodule) => format!("{}:{}", submodule, self.name),
            None => self.name.clone(),
        }
    }
}

/// Give every tracking branch of `remote` a local branch with the same name.
///
/// Branches that already exist locally are left alone. One error is returned for each
/// branch that could not be created; the others are still processed.
pub async fn reconcile_branches(git: &dyn GitBackend, repo: &LocalRepository, remote: &str) -> Vec<String> {
    let mut errors = Vec::new();

    let remote_branches = match git
        .list_branches(repo, &BranchScope::Remote(remote.to_string()))
        .await
    {
        Ok(branches) => branches,
        Err(e) => {
            errors.push(repo.qualify(format!("failed to list {} branches: {:#}", remote, e)));
            return errors;
        }
    };

    let local_branches = match git.list_branches(repo, &BranchScope::Local).await {
        Ok(branches) => branches,
        Err(e) => {
            errors.push(repo.qualify(format!("failed to list local branches: {:#}", e)));
            return errors;
        }
    };

    for name in remote_branches {
        if local_branches.contains(&name) {
            continue;
        }

        let branch = BranchRef::remote(repo, remote, &name);
        let commit = match git.resolve_commit(repo, &branch.full_name()).await {
            Ok(commit) => commit,
            Err(e) => {
                warn!("Cannot resolve {}: {:#}", branch.full_name(), e);
                errors.push(repo.qualify(format!("branch {}: {:#}", name, e)));
                continue;
            }
        };

        match git.create_tracking_branch(repo, &name, remote, &commit).await {
            Ok(()) => debug!("Created branch {} tracking {}", branch.display_name(), remote),
            Err(e) => {
                warn!("Cannot create branch {}: {:#}", branch.display_name(), e);
                errors.push(repo.qualify(format!("branch {}: {:#}", name, e)));
            }
        }
    }

    errors
}
