//! Post-clone setup scripts

use anyhow::{anyhow, Context, Result};
use std::path::Path;
use tokio::process::Command as AsyncCommand;
use tracing::{debug, info, warn};

use crate::config::is_plain_name;

/// Run each script of `run_queue` that exists at the root of `repo_path`, in order.
///
/// Scripts are executed with `bash` and the repository as working directory. Missing
/// scripts and entries that are not a bare file name are skipped. A failing script does not stop the ones after it; its error is
/// returned with the others.
pub async fn run_hooks(repo_path: &Path, run_queue: &[String]) -> Vec<String> {
    let mut errors = Vec::new();

    for script in run_queue {
        if !is_plain_name(script) {
            warn!("Script {:?} is not a file name at the repository root, skipping", script);
            continue;
        }

        let script_path = repo_path.join(script);
        if !script_path.is_file() {
            debug!("No {} in {}, skipping", script, repo_path.display());
            continue;
        }

        info!("Running {} in {}", script, repo_path.display());
        if let Err(e) = run_script(repo_path, script).await {
            warn!("Script {} failed: {:#}", script, e);
            errors.push(format!("script {}: {:#}", script, e));
        }
    }

    errors
}

async fn run_script(repo_path: &Path, script: &str) -> Result<()> {
    let output = AsyncCommand::new("bash")
        .arg(script)
        .current_dir(repo_path)
        .output()
        .await
        .context("Failed to execute bash")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!("exited with {}: {}", output.status, stderr.trim()));
    }

    Ok(())
}
