//! CLI output formatting

use crate::core::{Build, ExecutionStatus, Phase};
use crate::execution::ExecutionEvent;
use console::Emoji;
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "! ");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");

/// Format an execution status for display
pub fn format_status(status: ExecutionStatus) -> String {
    match status {
        ExecutionStatus::Success => style("SUCCESS").green().to_string(),
        ExecutionStatus::Failure => style("FAILURE").red().to_string(),
        ExecutionStatus::Canceled => style("CANCELED").yellow().to_string(),
        ExecutionStatus::Error => style("ERROR").red().to_string(),
    }
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{:.1}s", duration.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

/// Format an execution event for display
pub fn format_execution_event(event: &ExecutionEvent) -> Option<String> {
    match event {
        ExecutionEvent::BuildStarted {
            build_id,
            started_at,
        } => Some(format!(
            "{} Starting build {} at {}",
            ROCKET,
            style(build_id.as_deref().unwrap_or("local")).bold(),
            style(started_at.format("%H:%M:%S")).dim()
        )),
        // Stream runs in the background; its start is noise
        ExecutionEvent::PhaseStarted {
            phase: Phase::Stream,
        } => None,
        ExecutionEvent::PhaseStarted { phase } => {
            Some(format!("{} {}", SPINNER, style(phase).cyan()))
        }
        ExecutionEvent::PhaseCompleted { phase, elapsed } => Some(format!(
            "{} {} {}",
            CHECK,
            style(phase).green(),
            style(format_duration(*elapsed)).dim()
        )),
        ExecutionEvent::PhaseFailed { phase, error } => Some(format!(
            "{} {}: {}",
            CROSS,
            style(phase).red(),
            style(error).dim()
        )),
        ExecutionEvent::BuildFinished {
            status, elapsed, ..
        } => Some(format!(
            "{} Build finished: {} in {}",
            match status {
                ExecutionStatus::Success => CHECK,
                ExecutionStatus::Canceled => WARN,
                _ => CROSS,
            },
            format_status(*status),
            format_duration(*elapsed)
        )),
    }
}

/// One-line summary of a compiled build
pub fn format_build_summary(build: &Build) -> String {
    let layout = match build.stages() {
        Some(stages) => format!("{} stage(s), ", style(stages.len()).cyan()),
        None => String::new(),
    };

    format!(
        "{} Build {}: {}{} step(s), {} service(s)",
        INFO,
        style(&build.id).bold(),
        layout,
        style(build.step_count()).cyan(),
        style(build.services.len()).cyan()
    )
}
