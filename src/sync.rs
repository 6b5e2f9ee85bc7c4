//! Sync Engine - Orchestrates sequential repository synchronization
//!
//! For each selected repository the engine classifies the local path, clones or pulls
//! it, and then runs the post-processing steps: branch reconciliation, mirror push URL
//! configuration, setup scripts and the submodule walk. Failures are recorded in the
//! repository's report and never stop the batch.

use anyhow::{Context, Result};
use serde::{Serialize, Serializer};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::branches::reconcile_branches;
use crate::config::is_plain_name;
use crate::config::Config;
use crate::credentials::{CredentialProvider, SshAuth};
use crate::git::{short_hash, BranchScope, GitBackend, LocalRepository, PullResult, RepoKind};
use crate::hooks::run_hooks;
use crate::provider::{RepositoryDescriptor, SyncSource};
use crate::remote_config::{rewrite_remote_config, RewriteOutcome};
use crate::submodules::{SubmoduleReport, WalkContext};

/// Whether a run clones missing repositories only, or also pulls existing ones
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    Clone,
    Pull,
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncMode::Clone => write!(f, "clone"),
            SyncMode::Pull => write!(f, "pull"),
        }
    }
}

/// Engine-wide settings
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub storage_root: PathBuf,
    pub private_key: PathBuf,
    pub remote_name: String,
    pub delay: Duration,
    pub run_queue: Vec<String>,
    pub sort: bool,
}

impl SyncOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            storage_root: config.storage_root(),
            private_key: config.private_key_path(),
            remote_name: config.sync.remote_name.clone(),
            delay: Duration::from_millis(config.sync.delay_ms),
            run_queue: config.scripts.run_queue.clone(),
            sort: config.sync.sort,
        }
    }
}

/// One invocation of the engine
#[derive(Debug, Clone)]
pub struct SyncRequest {
    pub mode: SyncMode,
    pub repositories: Vec<String>,
    pub source: SyncSource,
}

/// What is found at a repository's local path before anything is done
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalState {
    Missing,
    Repository(LocalRepository),
    EmptyDirectory,
    NotARepository,
}

/// Per-repository result
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SyncOutcome {
    /// Clone mode found a repository already in place and left it untouched
    AlreadyExists,
    UpToDate,
    Cloned,
    Pulled { old: String, new: String },
    Skipped { reason: String },
    Failed { error: String },
}

/// Everything recorded for one repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepoReport {
    pub name: String,
    pub path: PathBuf,
    pub outcome: SyncOutcome,
    /// Local branches after a clone
    pub branches: Vec<String>,
    pub submodules: Vec<SubmoduleReport>,
    /// Secondary errors, in the order they happened
    pub errors: Vec<String>,
}

impl RepoReport {
    fn new(name: &str, path: &Path, outcome: SyncOutcome) -> Self {
        Self {
            name: name.to_string(),
            path: path.to_path_buf(),
            outcome,
            branches: Vec::new(),
            submodules: Vec::new(),
            errors: Vec::new(),
        }
    }
}

/// Results from a complete sync run
#[derive(Debug, Clone, Serialize)]
pub struct SyncSummary {
    pub mode: SyncMode,
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub skipped: usize,
    #[serde(rename = "duration_secs", serialize_with = "serialize_secs")]
    pub duration: Duration,
    pub cancelled: bool,
    pub reports: Vec<RepoReport>,
}

impl SyncSummary {
    /// True when the run was cut short or a repository failed
    pub fn has_failures(&self) -> bool {
        self.cancelled || self.failed > 0
    }
}

fn serialize_secs<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}

/// Progress notifications for a presentation layer
#[derive(Debug, Clone)]
pub enum SyncEvent {
    RunStarted { mode: SyncMode, total: usize },
    RepositoryStarted { index: usize, total: usize, name: String },
    RepositoryFinished(RepoReport),
    Cancelled { processed: usize },
}

/// The engine that processes repositories one after the other
pub struct SyncEngine {
    git: Arc<dyn GitBackend>,
    options: SyncOptions,
    events: Option<mpsc::UnboundedSender<SyncEvent>>,
    cancelled: Arc<AtomicBool>,
}

impl SyncEngine {
    pub fn new(git: Arc<dyn GitBackend>, options: SyncOptions) -> Self {
        Self {
            git,
            options,
            events: None,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Stream progress events to `sender`
    pub fn with_events(mut self, sender: mpsc::UnboundedSender<SyncEvent>) -> Self {
        self.events = Some(sender);
        self
    }

    /// Flag that stops the run before the next repository is started
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// Synchronize every repository of `request`.
    ///
    /// Only a credential failure is returned as an error; it happens before any
    /// repository is touched. Everything else ends up in the summary.
    pub async fn run(&self, request: &SyncRequest, credentials: &dyn CredentialProvider) -> Result<SyncSummary> {
        let start_time = Instant::now();

        let auth = credentials
            .acquire(&self.options.private_key)
            .context("Failed to acquire SSH credentials")?;

        let mut names = request.repositories.clone();
        if self.options.sort {
            names.sort();
        }
        let total = names.len();

        info!(
            "Starting {} of {} repositories from {}",
            request.mode, total, request.source.provider.url
        );
        self.emit(SyncEvent::RunStarted {
            mode: request.mode,
            total,
        });

        let mut reports = Vec::with_capacity(total);
        let mut cancelled = false;

        for (index, name) in names.iter().enumerate() {
            if self.cancelled.load(Ordering::SeqCst) {
                info!("Sync cancelled after {} repositories", index);
                self.emit(SyncEvent::Cancelled { processed: index });
                cancelled = true;
                break;
            }

            if index > 0 && !self.options.delay.is_zero() {
                tokio::time::sleep(self.options.delay).await;
            }

            let descriptor = RepositoryDescriptor::new(name, &self.options.storage_root, &request.source);
            self.emit(SyncEvent::RepositoryStarted {
                index,
                total,
                name: name.clone(),
            });

            let report = self.process_repository(&descriptor, request, &auth).await;
            self.emit(SyncEvent::RepositoryFinished(report.clone()));
            reports.push(report);
        }

        let summary = compile_summary(request.mode, reports, start_time.elapsed(), cancelled);

        info!(
            "Sync completed in {:.2}s: {} successful, {} failed, {} skipped",
            summary.duration.as_secs_f64(),
            summary.successful,
            summary.failed,
            summary.skipped
        );

        Ok(summary)
    }

    /// Classify what is at `path` without changing anything
    pub async fn classify(&self, path: &Path) -> Result<LocalState> {
        if !path.exists() {
            return Ok(LocalState::Missing);
        }

        if let Some(repo) = self.git.open(path, RepoKind::Repository).await? {
            return Ok(LocalState::Repository(repo));
        }

        if path.is_dir() && is_empty_dir(path).await? {
            Ok(LocalState::EmptyDirectory)
        } else {
            Ok(LocalState::NotARepository)
        }
    }

    async fn process_repository(
        &self,
        descriptor: &RepositoryDescriptor,
        request: &SyncRequest,
        auth: &SshAuth,
    ) -> RepoReport {
        let name = descriptor.name.as_str();
        let path = descriptor.local_path.as_path();

        if !is_plain_name(name) {
            warn!("Refusing repository name {:?}", name);
            return RepoReport::new(name, path, SyncOutcome::Failed {
                error: format!("invalid repository name {:?}: must be a single directory name", name),
            });
        }

        let state = match self.classify(path).await {
            Ok(state) => state,
            Err(e) => {
                warn!("Cannot inspect {}: {:#}", path.display(), e);
                return RepoReport::new(name, path, SyncOutcome::Failed {
                    error: format!("{:#}", e),
                });
            }
        };

        match state {
            LocalState::Repository(repo) => match request.mode {
                SyncMode::Clone => {
                    info!("{} already cloned", name);
                    RepoReport::new(name, path, SyncOutcome::AlreadyExists)
                }
                SyncMode::Pull => self.pull(name, repo, request, auth).await,
            },
            LocalState::Missing => self.clone_repository(descriptor, request, auth).await,
            LocalState::EmptyDirectory => {
                info!("Removing empty directory {}", path.display());
                if let Err(e) = tokio::fs::remove_dir(path).await {
                    return RepoReport::new(name, path, SyncOutcome::Failed {
                        error: format!("failed to remove empty directory: {}", e),
                    });
                }
                self.clone_repository(descriptor, request, auth).await
            }
            LocalState::NotARepository => {
                warn!("{} exists, is not a repository and is not empty; skipping", path.display());
                RepoReport::new(name, path, SyncOutcome::Skipped {
                    reason: "directory exists, is not a repository and is not empty".to_string(),
                })
            }
        }
    }

    async fn clone_repository(&self, descriptor: &RepositoryDescriptor, request: &SyncRequest, auth: &SshAuth) -> RepoReport {
        let name = descriptor.name.as_str();
        let path = descriptor.local_path.as_path();

        info!("Cloning {} from {}", name, descriptor.clone_url);
        let repo = match self.git.clone_repository(&descriptor.clone_url, path, auth).await {
            Ok(repo) => repo,
            Err(e) => {
                warn!("Clone of {} failed: {:#}", name, e);
                return RepoReport::new(name, path, SyncOutcome::Failed {
                    error: format!("{:#}", e),
                });
            }
        };

        let mut report = RepoReport::new(name, path, SyncOutcome::Cloned);
        let remote = self.options.remote_name.as_str();

        report
            .errors
            .extend(reconcile_branches(self.git.as_ref(), &repo, remote).await);

        match self.git.config_path(&repo).await {
            Ok(config) => {
                match rewrite_remote_config(&config, &request.source.original_link, &request.source.new_link) {
                    Ok(RewriteOutcome::Rewritten { mirror, .. }) => debug!("{} pushes to {}", name, mirror),
                    Ok(outcome) => debug!("{} config left as is: {:?}", name, outcome),
                    Err(e) => report.errors.push(format!("{:#}", e)),
                }
            }
            Err(e) => report.errors.push(format!("cannot locate config: {:#}", e)),
        }

        report
            .errors
            .extend(run_hooks(&repo.path, &self.options.run_queue).await);

        let walk = self.walk_context(request, auth).after_clone(&repo).await;
        report.submodules = walk.reports;
        report.errors.extend(walk.errors);

        match self.git.list_branches(&repo, &BranchScope::Local).await {
            Ok(branches) => report.branches = branches,
            Err(e) => report
                .errors
                .push(format!("failed to list local branches: {:#}", e)),
        }

        for error in &report.errors {
            warn!("{}: {}", name, error);
        }
        report
    }

    async fn pull(&self, name: &str, repo: LocalRepository, request: &SyncRequest, auth: &SshAuth) -> RepoReport {
        let outcome = match self
            .git
            .pull_fast_forward(&repo, &self.options.remote_name, auth)
            .await
        {
            Ok(PullResult::UpToDate) => {
                info!("{} already up to date", name);
                SyncOutcome::UpToDate
            }
            Ok(PullResult::Updated { old, new }) => {
                info!("{} pulled {}..{}", name, short_hash(&old), short_hash(&new));
                SyncOutcome::Pulled {
                    old: short_hash(&old).to_string(),
                    new: short_hash(&new).to_string(),
                }
            }
            Err(e) => {
                warn!("Pull of {} failed: {:#}", name, e);
                return RepoReport::new(name, &repo.path, SyncOutcome::Failed {
                    error: format!("{:#}", e),
                });
            }
        };

        let mut report = RepoReport::new(name, &repo.path, outcome);
        let walk = self.walk_context(request, auth).after_pull(&repo).await;
        report.submodules = walk.reports;
        report.errors.extend(walk.errors);

        for error in &report.errors {
            warn!("{}: {}", name, error);
        }
        report
    }

    fn walk_context<'a>(&'a self, request: &'a SyncRequest, auth: &'a SshAuth) -> WalkContext<'a> {
        WalkContext {
            git: self.git.as_ref(),
            auth,
            remote: &self.options.remote_name,
            original_link: &request.source.original_link,
            new_link: &request.source.new_link,
        }
    }

    fn emit(&self, event: SyncEvent) {
        if let Some(sender) = &self.events {
            // A closed receiver only means nobody is listening anymore
            let _ = sender.send(event);
        }
    }
}

async fn is_empty_dir(path: &Path) -> Result<bool> {
    let mut entries = tokio::fs::read_dir(path)
        .await
        .with_context(|| format!("Failed to read directory: {}", path.display()))?;
    Ok(entries.next_entry().await?.is_none())
}

/// Compile sync summary from reports
fn compile_summary(mode: SyncMode, reports: Vec<RepoReport>, duration: Duration, cancelled: bool) -> SyncSummary {
    let mut successful = 0;
    let mut failed = 0;
    let mut skipped = 0;

    for report in &reports {
        match report.outcome {
            SyncOutcome::AlreadyExists
            | SyncOutcome::UpToDate
            | SyncOutcome::Cloned
            | SyncOutcome::Pulled { .. } => successful += 1,
            SyncOutcome::Skipped { .. } => skipped += 1,
            SyncOutcome::Failed { .. } => failed += 1,
        }
    }

    SyncSummary {
        mode,
        total: reports.len(),
        successful,
        failed,
        skipped,
        duration,
        cancelled,
        reports,
    }
}
