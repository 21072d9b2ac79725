//! Execution state models

use serde::{Deserialize, Serialize};
use std::fmt;

/// One step of the build lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Create,
    Plan,
    Assemble,
    Exec,
    Stream,
    Destroy,
}

impl Phase {
    /// Label used in logs and error messages
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Create => "create",
            Phase::Plan => "plan",
            Phase::Assemble => "assemble",
            Phase::Exec => "exec",
            Phase::Stream => "stream",
            Phase::Destroy => "destroy",
        }
    }

    /// State the build is in once this phase succeeds
    pub fn completed_state(&self) -> BuildState {
        match self {
            Phase::Create => BuildState::Created,
            Phase::Plan => BuildState::Planned,
            Phase::Assemble => BuildState::Assembled,
            Phase::Exec => BuildState::Done,
            Phase::Stream => BuildState::Executing,
            Phase::Destroy => BuildState::Destroyed,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a build is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuildState {
    /// Nothing has run yet
    Pending,
    Created,
    Planned,
    Assembled,
    /// Exec phase is running
    Executing,
    /// Exec phase finished successfully
    Done,
    /// Teardown in progress
    Destroying,
    /// Teardown finished (successfully or not)
    Destroyed,
}

/// Final outcome of a build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    /// Every phase succeeded
    Success,
    /// A step exited non-zero
    Failure,
    /// The build was cancelled
    Canceled,
    /// A phase failed for another reason
    Error,
}
