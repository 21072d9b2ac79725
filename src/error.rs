//! Error types for local pipeline execution
//!
//! Errors raised before any build phase starts abort immediately with no
//! cleanup obligation. A [`PhaseError`] is always followed by a teardown of
//! the build; teardown and log-streaming failures are only logged.

use crate::compiler::CompileError;
use crate::core::Phase;
use crate::execution::ExecutorError;
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

/// Top-level error for preparing and running a pipeline
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Neither the requested pipeline file nor its extension fallback exists.
    #[error("pipeline file not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    /// The pipeline file exists but could not be read.
    #[error("unable to read pipeline file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The compiler rejected the pipeline.
    #[error("unable to compile pipeline {}: {source}", path.display())]
    Compile {
        path: PathBuf,
        #[source]
        source: CompileError,
    },

    /// Skipping steps would leave nothing to run.
    #[error(transparent)]
    Filter(#[from] FilterError),

    /// Steps reference secrets missing from the environment.
    #[error("missing secrets: {}", format_missing(missing))]
    MissingSecrets { missing: BTreeMap<String, String> },

    /// A build phase failed.
    #[error(transparent)]
    Phase(#[from] PhaseError),
}

/// Removing skipped steps left no step other than `init`
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("no steps left to run after skipping {}", skipped.join(", "))]
pub struct FilterError {
    pub skipped: Vec<String>,
}

/// A build phase failed
#[derive(Debug, Error)]
#[error("unable to {phase} build: {source}")]
pub struct PhaseError {
    pub phase: Phase,
    #[source]
    pub source: ExecutorError,
}

impl PhaseError {
    pub fn new(phase: Phase, source: ExecutorError) -> Self {
        Self { phase, source }
    }

    /// Whether the phase stopped because the build was cancelled
    pub fn is_cancelled(&self) -> bool {
        matches!(self.source, ExecutorError::Cancelled)
    }
}

fn format_missing(missing: &BTreeMap<String, String>) -> String {
    missing
        .iter()
        .map(|(location, target)| format!("{} {}", location, target))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;
