//! Plain-text rendering of sync events and summaries

use crate::submodules::{SubmoduleOutcome, SubmoduleReport};
use crate::sync::{RepoReport, SyncEvent, SyncOutcome, SyncSummary};

/// One line per repository outcome
pub fn outcome_line(report: &RepoReport) -> String {
    match &report.outcome {
        SyncOutcome::AlreadyExists => format!("📁 {}: already cloned", report.name),
        SyncOutcome::UpToDate => format!("✅ {}: already up to date", report.name),
        SyncOutcome::Cloned => format!("📥 {}: cloned into {}", report.name, report.path.display()),
        SyncOutcome::Pulled { old, new } => format!("🔄 {}: pulled {}..{}", report.name, old, new),
        SyncOutcome::Skipped { reason } => format!("⏭️  {}: skipped ({})", report.name, reason),
        SyncOutcome::Failed { error } => format!("❌ {}: {}", report.name, error),
    }
}

fn submodule_line(submodule: &SubmoduleReport) -> String {
    match &submodule.outcome {
        SubmoduleOutcome::Reconciled {
            default_branch,
            branches,
        } => {
            let default_branch = default_branch.as_deref().unwrap_or("?");
            format!(
                "{} on {} ({} branches)",
                submodule.name,
                default_branch,
                branches.len()
            )
        }
        SubmoduleOutcome::UpToDate => format!("{} already up to date", submodule.name),
        SubmoduleOutcome::Pulled { old, new } => format!("{} pulled {}..{}", submodule.name, old, new),
        SubmoduleOutcome::NotARepository => format!("{} is not a local repository", submodule.name),
        SubmoduleOutcome::Failed { error } => format!("{} failed: {}", submodule.name, error),
    }
}

/// Full block for a finished repository: outcome, branches, submodules and errors
pub fn format_report(report: &RepoReport) -> String {
    let mut lines = vec![outcome_line(report)];

    if !report.branches.is_empty() {
        lines.push(format!("   🌿 Branches: {}", report.branches.join(", ")));
    }

    let count = report.submodules.len();
    for (index, submodule) in report.submodules.iter().enumerate() {
        let joiner = if index + 1 == count { "└──" } else { "├──" };
        lines.push(format!("   {} {}", joiner, submodule_line(submodule)));
    }

    for error in &report.errors {
        lines.push(format!("   ⚠️  {}", error));
    }

    lines.join("\n")
}

/// Progress line for an event, if it has one
pub fn format_event(event: &SyncEvent) -> Option<String> {
    match event {
        SyncEvent::RunStarted { mode, total } => {
            Some(format!("🚀 Starting {} of {} repositories", mode, total))
        }
        SyncEvent::RepositoryStarted { index, total, name } => {
            Some(format!("[{}/{}] {}", index + 1, total, name))
        }
        SyncEvent::RepositoryFinished(report) => Some(format_report(report)),
        SyncEvent::Cancelled { processed } => {
            Some(format!("🛑 Cancelled after {} repositories", processed))
        }
    }
}

pub fn format_summary(summary: &SyncSummary) -> String {
    let mut lines = vec![
        if summary.cancelled {
            "🛑 Synchronization Cancelled".to_string()
        } else {
            "🎉 Synchronization Complete!".to_string()
        },
        format!("   📊 Total repositories: {}", summary.total),
        format!("   ✅ Successful: {}", summary.successful),
        format!("   ❌ Failed: {}", summary.failed),
        format!("   ⏭️  Skipped: {}", summary.skipped),
        format!("   ⏱️  Duration: {:.2}s", summary.duration.as_secs_f64()),
    ];

    if summary.failed > 0 {
        lines.push(String::new());
        lines.push("🔍 Failed Repositories:".to_string());
        for report in &summary.reports {
            if let SyncOutcome::Failed { error } = &report.outcome {
                lines.push(format!("   ❌ {}: {}", report.name, error));
            }
        }
    }

    lines.join("\n")
}
