//! System health checks for repomirror
//!
//! This module provides preflight checks to verify the system is properly
//! configured before running a sync.

use crate::credentials::{CredentialProvider, SshKeyCredentials};
use crate::Config;

/// Result of system health checks
#[derive(Debug, Clone)]
pub struct HealthCheck {
    /// Git installation status
    pub git: CheckResult,
    /// Origin and mirror provider settings
    pub providers: CheckResult,
    /// Storage root status
    pub storage: CheckResult,
    /// Private key status
    pub private_key: CheckResult,
    /// bash availability for setup scripts (warning only)
    pub scripts: CheckResult,
}

/// Result of an individual health check
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub passed: bool,
    pub message: String,
    pub details: Option<String>,
    pub is_warning: bool,
}

impl CheckResult {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            passed: true,
            message: message.into(),
            details: None,
            is_warning: false,
        }
    }

    fn ok_with_details(message: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            passed: true,
            message: message.into(),
            details: Some(details.into()),
            is_warning: false,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            passed: false,
            message: message.into(),
            details: None,
            is_warning: false,
        }
    }

    fn error_with_details(message: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            passed: false,
            message: message.into(),
            details: Some(details.into()),
            is_warning: false,
        }
    }

    fn warning_with_details(message: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            passed: true,
            message: message.into(),
            details: Some(details.into()),
            is_warning: true,
        }
    }
}

impl HealthCheck {
    /// Run all health checks
    pub fn run(config: &Config) -> Self {
        Self {
            git: Self::check_git(),
            providers: Self::check_providers(config),
            storage: Self::check_storage(config),
            private_key: Self::check_private_key(config),
            scripts: Self::check_scripts(config),
        }
    }

    /// Check if all required checks passed (excludes warnings)
    pub fn all_passed(&self) -> bool {
        self.all_checks().iter().all(|(_, result)| result.passed)
    }

    /// Get list of failed checks (errors only, not warnings)
    pub fn errors(&self) -> Vec<&CheckResult> {
        self.all_checks()
            .into_iter()
            .map(|(_, result)| result)
            .filter(|r| !r.passed && !r.is_warning)
            .collect()
    }

    /// Get list of warnings
    pub fn warnings(&self) -> Vec<&CheckResult> {
        self.all_checks()
            .into_iter()
            .map(|(_, result)| result)
            .filter(|r| r.is_warning)
            .collect()
    }

    /// Check git installation
    fn check_git() -> CheckResult {
        match std::process::Command::new("git").arg("--version").output() {
            Ok(output) if output.status.success() => {
                let version = String::from_utf8_lossy(&output.stdout);
                CheckResult::ok_with_details("Git installed", version.trim().to_string())
            }
            Ok(_) => CheckResult::error("Git command failed"),
            Err(_) => CheckResult::error_with_details(
                "Git not found in PATH",
                "Install git: https://git-scm.com/downloads",
            ),
        }
    }

    /// Check that both providers are configured
    fn check_providers(config: &Config) -> CheckResult {
        match config.validate() {
            Ok(()) => {
                let pair = config.provider_pair();
                CheckResult::ok_with_details(
                    "Providers configured",
                    format!(
                        "origin: {}\nmirror: {}",
                        pair.origin.identity_link(),
                        pair.mirror.identity_link()
                    ),
                )
            }
            Err(e) => CheckResult::error_with_details(
                "Configuration incomplete",
                format!("{}\nRun: repomirror config path", e),
            ),
        }
    }

    /// Check the storage root (created on first clone when missing)
    fn check_storage(config: &Config) -> CheckResult {
        let root = config.storage_root();
        if root.is_dir() {
            CheckResult::ok_with_details("Storage directory exists", root.display().to_string())
        } else if root.exists() {
            CheckResult::error_with_details(
                "Storage path is not a directory",
                root.display().to_string(),
            )
        } else {
            CheckResult::warning_with_details(
                "Storage directory does not exist yet",
                format!("It will be created on the first clone: {}", root.display()),
            )
        }
    }

    /// Check the configured private key
    fn check_private_key(config: &Config) -> CheckResult {
        let key = config.private_key_path();
        if key.as_os_str().is_empty() {
            return CheckResult::error("No private key configured (ssh.private_key)");
        }

        match SshKeyCredentials::new().acquire(&key) {
            Ok(_) => CheckResult::ok_with_details("Private key readable", key.display().to_string()),
            Err(e) => CheckResult::error_with_details(
                "Private key unusable",
                format!("{:#}\nRun: ssh-keygen -t ed25519", e),
            ),
        }
    }

    /// Check that setup scripts can be run (warning only)
    fn check_scripts(config: &Config) -> CheckResult {
        if config.scripts.run_queue.is_empty() {
            return CheckResult::ok("No setup scripts configured");
        }

        let queue = config.scripts.run_queue.join(", ");
        if command_available("bash") {
            CheckResult::ok_with_details("bash available for setup scripts", queue)
        } else {
            CheckResult::warning_with_details(
                "bash not found in PATH",
                format!("Setup scripts will fail: {}", queue),
            )
        }
    }

    /// Get all checks as a slice for iteration
    pub fn all_checks(&self) -> [(&'static str, &CheckResult); 5] {
        [
            ("Git Installation", &self.git),
            ("Providers", &self.providers),
            ("Storage Directory", &self.storage),
            ("Private Key", &self.private_key),
            ("Setup Scripts", &self.scripts),
        ]
    }
}

fn command_available(program: &str) -> bool {
    std::process::Command::new(program)
        .arg("--version")
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}
