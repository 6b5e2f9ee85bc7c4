//! repomirror - Bulk repository synchronization with mirror push targets
//!
//! repomirror clones or fast-forwards a declared set of repositories, including their
//! submodules, from one of two hosting providers. Every freshly cloned repository gets a
//! second push URL pointing at the other provider, so a single push updates both.
//!
//! ## Core Features
//!
//! - **Clone or Pull**: Per-repository state machine with empty-directory recovery
//! - **Branch Reconciliation**: A local branch for every remote tracking branch
//! - **Mirror Push URLs**: Two `pushurl` lines added to the cloned remote
//! - **Submodules**: Direct submodules get the same treatment as their parent
//! - **Setup Scripts**: Optional post-clone scripts run inside each new repository
//!
//! ## Modules
//!
//! - [`config`]: Configuration management and parsing
//! - [`sync`]: The sync engine, its reports and events
//! - [`git`]: Git backend trait and its `git` CLI implementation
//! - [`remote_config`]: Push URL rewriting of git config files

pub mod branches;
pub mod config;
pub mod credentials;
pub mod git;
pub mod health;
pub mod hooks;
pub mod provider;
pub mod remote_config;
pub mod report;
pub mod submodules;
pub mod sync;

pub use config::Config;
pub use credentials::{CredentialProvider, SshAuth, SshKeyCredentials};
pub use git::{GitBackend, GitClient, LocalRepository, PullResult, RepoKind};
pub use health::HealthCheck;
pub use provider::{ProviderPair, ProviderSource, SourceChoice, SyncSource};
pub use sync::{
    LocalState, RepoReport, SyncEngine, SyncEvent, SyncMode, SyncOptions, SyncOutcome, SyncRequest,
    SyncSummary,
};
