use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command as AsyncCommand;
use tracing::debug;

use crate::credentials::SshAuth;

/// Number of hex digits shown for commit identifiers in reports
pub const SHORT_HASH_LEN: usize = 6;

/// Abbreviate a commit hash for display
pub fn short_hash(hash: &str) -> &str {
    hash.get(..SHORT_HASH_LEN).unwrap_or(hash)
}

/// What a local working tree is, relative to the run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoKind {
    /// A top-level repository from the configured list
    Repository,
    /// A submodule checked out inside a parent repository
    Submodule { name: String },
}

/// An opened local repository, held for the duration of one repository's processing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalRepository {
    pub path: PathBuf,
    pub kind: RepoKind,
    /// Full name of the ref HEAD points at (`refs/heads/main`), `None` when detached
    pub head: Option<String>,
}

impl LocalRepository {
    pub fn submodule_name(&self) -> Option<&str> {
        match &self.kind {
            RepoKind::Repository => None,
            RepoKind::Submodule { name } => Some(name),
        }
    }

    /// Branch HEAD is on, if any
    pub fn head_branch(&self) -> Option<&str> {
        self.head
            .as_deref()
            .and_then(|head| head.strip_prefix("refs/heads/"))
    }

    /// Prefix a message with the submodule name so it stays traceable in the parent's error list
    pub fn qualify(&self, message: impl AsRef<str>) -> String {
        match self.submodule_name() {
            Some(name) => format!("submodule {}: {}", name, message.as_ref()),
            None => message.as_ref().to_string(),
        }
    }
}

/// Namespace a branch listing is taken from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchScope {
    /// `refs/heads/*`
    Local,
    /// `refs/remotes/<remote>/*`
    Remote(String),
}

impl BranchScope {
    fn ref_prefix(&self) -> String {
        match self {
            BranchScope::Local => "refs/heads/".to_string(),
            BranchScope::Remote(remote) => format!("refs/remotes/{}/", remote),
        }
    }
}

/// Result of a fast-forward pull that did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullResult {
    UpToDate,
    Updated { old: String, new: String },
}

/// A submodule declared in `.gitmodules`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmoduleEntry {
    pub name: String,
    /// Path relative to the parent working tree
    pub path: PathBuf,
}

/// Git operations the sync engine depends on
#[async_trait]
pub trait GitBackend: Send + Sync {
    /// Open `path` as a repository; `Ok(None)` when it is not one
    async fn open(&self, path: &Path, kind: RepoKind) -> Result<Option<LocalRepository>>;

    /// Clone `url` into `path`, recursing into submodules
    async fn clone_repository(&self, url: &str, path: &Path, auth: &SshAuth) -> Result<LocalRepository>;

    /// Fast-forward the HEAD branch from `remote`
    async fn pull_fast_forward(&self, repo: &LocalRepository, remote: &str, auth: &SshAuth) -> Result<PullResult>;

    /// Branch names in the given scope, without the scope prefix
    async fn list_branches(&self, repo: &LocalRepository, scope: &BranchScope) -> Result<Vec<String>>;

    /// Commit hash a reference points at
    async fn resolve_commit(&self, repo: &LocalRepository, reference: &str) -> Result<String>;

    /// Create `refs/heads/<name>` at `commit` with `<remote>/<name>` as upstream
    async fn create_tracking_branch(
        &self,
        repo: &LocalRepository,
        name: &str,
        remote: &str,
        commit: &str,
    ) -> Result<()>;

    /// Submodules in declaration order
    async fn submodules(&self, repo: &LocalRepository) -> Result<Vec<SubmoduleEntry>>;

    /// Configured remote names
    async fn remotes(&self, repo: &LocalRepository) -> Result<Vec<String>>;

    /// Short name of the branch the remote's `HEAD` points at
    async fn remote_head(&self, repo: &LocalRepository, remote: &str, auth: &SshAuth) -> Result<Option<String>>;

    /// Switch to a local branch without discarding local changes
    async fn checkout(&self, repo: &LocalRepository, branch: &str) -> Result<()>;

    /// Location of the persisted configuration file of this repository
    async fn config_path(&self, repo: &LocalRepository) -> Result<PathBuf>;
}

/// Git backend driving the `git` executable
#[derive(Debug, Clone)]
pub struct GitClient {
    program: String,
}

impl Default for GitClient {
    fn default() -> Self {
        Self::new()
    }
}

impl GitClient {
    /// Create a new Git client using `git` from PATH
    pub fn new() -> Self {
        Self {
            program: "git".to_string(),
        }
    }

    fn command(&self, dir: &Path, auth: Option<&SshAuth>) -> AsyncCommand {
        let mut command = AsyncCommand::new(&self.program);
        command.current_dir(dir);
        command.env("LC_ALL", "C");
        if let Some(auth) = auth {
            auth.apply(&mut command);
        }
        command
    }

    /// Run git in `dir` and return trimmed stdout, failing on a non-zero exit
    async fn run_git(&self, dir: &Path, args: &[&str], auth: Option<&SshAuth>) -> Result<String> {
        debug!("git {} (in {})", args.join(" "), dir.display());

        let output = self
            .command(dir, auth)
            .args(args)
            .output()
            .await
            .with_context(|| format!("Failed to execute git {}", args.first().unwrap_or(&"")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!(
                "git {} failed: {}",
                args.first().unwrap_or(&""),
                stderr.trim()
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim_end().to_string())
    }

    async fn head_ref(&self, path: &Path) -> Result<Option<String>> {
        let output = self
            .command(path, None)
            .args(["symbolic-ref", "-q", "HEAD"])
            .output()
            .await
            .context("Failed to read HEAD")?;

        if output.status.success() {
            let head = String::from_utf8_lossy(&output.stdout).trim().to_string();
            Ok(Some(head))
        } else {
            Ok(None)
        }
    }

    async fn head_commit(&self, path: &Path) -> Result<String> {
        self.run_git(path, &["rev-parse", "--verify", "HEAD"], None)
            .await
    }
}

#[async_trait]
impl GitBackend for GitClient {
    async fn open(&self, path: &Path, kind: RepoKind) -> Result<Option<LocalRepository>> {
        // A working tree has its own .git entry (a directory, or a file for submodules)
        if !path.is_dir() || !path.join(".git").exists() {
            return Ok(None);
        }

        let output = self
            .command(path, None)
            .args(["rev-parse", "--git-dir"])
            .output()
            .await
            .context("Failed to execute git rev-parse")?;
        if !output.status.success() {
            debug!("{} has a .git entry but git cannot open it", path.display());
            return Ok(None);
        }

        let head = self.head_ref(path).await?;
        Ok(Some(LocalRepository {
            path: path.to_path_buf(),
            kind,
            head,
        }))
    }

    async fn clone_repository(&self, url: &str, path: &Path, auth: &SshAuth) -> Result<LocalRepository> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create parent directory")?;
        }
        let target = path.to_string_lossy();

        self.run_git(
            Path::new("."),
            &["clone", "--recurse-submodules", "--quiet", "--", url, &*target],
            Some(auth),
        )
        .await?;

        self.open(path, RepoKind::Repository)
            .await?
            .ok_or_else(|| anyhow!("Cloned repository cannot be opened: {}", path.display()))
    }

    async fn pull_fast_forward(&self, repo: &LocalRepository, remote: &str, auth: &SshAuth) -> Result<PullResult> {
        let branch = repo
            .head_branch()
            .ok_or_else(|| anyhow!("HEAD is detached, no branch to pull"))?
            .to_string();

        let old = self.head_commit(&repo.path).await?;
        self.run_git(
            &repo.path,
            &["pull", "--ff-only", "--quiet", remote, &branch],
            Some(auth),
        )
        .await?;
        let new = self.head_commit(&repo.path).await?;

        if old == new {
            Ok(PullResult::UpToDate)
        } else {
            Ok(PullResult::Updated { old, new })
        }
    }

    async fn list_branches(&self, repo: &LocalRepository, scope: &BranchScope) -> Result<Vec<String>> {
        let prefix = scope.ref_prefix();
        let stdout = self
            .run_git(
                &repo.path,
                &["for-each-ref", "--format=%(refname)", &prefix],
                None,
            )
            .await?;

        Ok(parse_branch_listing(&stdout, &prefix))
    }

    async fn resolve_commit(&self, repo: &LocalRepository, reference: &str) -> Result<String> {
        let spec = format!("{}^{{commit}}", reference);
        self.run_git(&repo.path, &["rev-parse", "--verify", "--quiet", &spec], None)
            .await
            .with_context(|| format!("reference {} cannot be resolved", reference))
    }

    async fn create_tracking_branch(
        &self,
        repo: &LocalRepository,
        name: &str,
        remote: &str,
        commit: &str,
    ) -> Result<()> {
        let local_ref = format!("refs/heads/{}", name);
        let message = format!("repomirror: branch from {}/{}", remote, name);

        // Empty old value: refuse to move a branch that already exists
        self.run_git(
            &repo.path,
            &["update-ref", "-m", &message, &local_ref, commit, ""],
            None,
        )
        .await?;

        let remote_key = format!("branch.{}.remote", name);
        let merge_key = format!("branch.{}.merge", name);
        self.run_git(&repo.path, &["config", &remote_key, remote], None)
            .await?;
        self.run_git(&repo.path, &["config", &merge_key, &local_ref], None)
            .await?;

        Ok(())
    }

    async fn submodules(&self, repo: &LocalRepository) -> Result<Vec<SubmoduleEntry>> {
        if !repo.path.join(".gitmodules").is_file() {
            return Ok(Vec::new());
        }

        let output = self
            .command(&repo.path, None)
            .args([
                "config",
                "--file",
                ".gitmodules",
                "--get-regexp",
                r"^submodule\..*\.path$",
            ])
            .output()
            .await
            .context("Failed to read .gitmodules")?;

        // Exit status 1 means no key matched
        match output.status.code() {
            Some(0) => Ok(parse_submodule_listing(&String::from_utf8_lossy(&output.stdout))),
            Some(1) => Ok(Vec::new()),
            _ => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                bail!("git config failed on .gitmodules: {}", stderr.trim())
            }
        }
    }

    async fn remotes(&self, repo: &LocalRepository) -> Result<Vec<String>> {
        let stdout = self.run_git(&repo.path, &["remote"], None).await?;
        Ok(stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    async fn remote_head(&self, repo: &LocalRepository, remote: &str, auth: &SshAuth) -> Result<Option<String>> {
        let stdout = self
            .run_git(&repo.path, &["ls-remote", "--symref", remote, "HEAD"], Some(auth))
            .await?;
        Ok(parse_symref_head(&stdout))
    }

    async fn checkout(&self, repo: &LocalRepository, branch: &str) -> Result<()> {
        self.run_git(&repo.path, &["checkout", "--quiet", branch, "--"], None)
            .await?;
        Ok(())
    }

    async fn config_path(&self, repo: &LocalRepository) -> Result<PathBuf> {
        let git_dir = self
            .run_git(&repo.path, &["rev-parse", "--absolute-git-dir"], None)
            .await?;
        Ok(PathBuf::from(git_dir).join("config"))
    }
}

/// Strip the namespace prefix from `for-each-ref` output, skipping symbolic `HEAD`
fn parse_branch_listing(stdout: &str, prefix: &str) -> Vec<String> {
    stdout
        .lines()
        .filter_map(|line| line.trim().strip_prefix(prefix))
        .filter(|name| !name.is_empty() && *name != "HEAD")
        .map(str::to_string)
        .collect()
}

/// Parse `git config --get-regexp '^submodule\..*\.path$'` output
fn parse_submodule_listing(stdout: &str) -> Vec<SubmoduleEntry> {
    stdout
        .lines()
        .filter_map(|line| {
            let (key, path) = line.split_once(' ')?;
            let name = key.strip_prefix("submodule.")?.strip_suffix(".path")?;
            Some(SubmoduleEntry {
                name: name.to_string(),
                path: PathBuf::from(path.trim()),
            })
        })
        .collect()
}

/// Extract the branch from `ls-remote --symref <remote> HEAD` output
fn parse_symref_head(stdout: &str) -> Option<String> {
    stdout.lines().find_map(|line| {
        let target = line.strip_prefix("ref:")?.split_whitespace().next()?;
        let branch = target.strip_prefix("refs/heads/").unwrap_or(target);
        Some(branch.to_string())
    })
}
