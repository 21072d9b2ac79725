//! The executor capability - the five build phases plus log streaming

use crate::core::ExecutionContext;
use crate::runtime::RuntimeError;
use async_trait::async_trait;
use thiserror::Error;

/// Error types for executor operations
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error("build was cancelled")]
    Cancelled,

    #[error("step {step} exited with code {exit_code}")]
    StepFailed { step: String, exit_code: i64 },

    #[error("build has no steps to run")]
    NothingToRun,

    #[error("internal error: {0}")]
    Internal(String),
}

/// Runs one build through its lifecycle
///
/// Every phase receives the context it should observe for cancellation.
/// `destroy_build` is called with a fresh context so cleanup is never
/// short-circuited by the cancellation that caused it.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Create build-level resources (network, workspace volume)
    async fn create_build(&self, ctx: &ExecutionContext) -> Result<(), ExecutorError>;

    /// Compute what will run
    async fn plan_build(&self, ctx: &ExecutionContext) -> Result<(), ExecutorError>;

    /// Prepare images and containers
    async fn assemble_build(&self, ctx: &ExecutionContext) -> Result<(), ExecutorError>;

    /// Run the steps
    async fn exec_build(&self, ctx: &ExecutionContext) -> Result<(), ExecutorError>;

    /// Deliver step logs until the build ends or `ctx` is cancelled
    async fn stream_build(&self, ctx: &ExecutionContext) -> Result<(), ExecutorError>;

    /// Release everything the build created
    async fn destroy_build(&self, ctx: &ExecutionContext) -> Result<(), ExecutorError>;
}

/// Something a step did while it ran
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepEvent {
    Started { label: String, image: String },
    Log { label: String, line: String },
    Finished { label: String, exit_code: i64 },
}

impl StepEvent {
    pub fn label(&self) -> &str {
        match self {
            StepEvent::Started { label, .. }
            | StepEvent::Log { label, .. }
            | StepEvent::Finished { label, .. } => label,
        }
    }
}

/// Callback for step activity delivered by the stream phase
///
/// This trait is object-safe and can be used as `Arc<dyn LogCallback>`.
pub trait LogCallback: Send + Sync {
    fn on_event(&self, event: &StepEvent);
}

/// Callback that drops every event
#[derive(Debug, Clone, Default)]
pub struct NoopCallback;

impl LogCallback for NoopCallback {
    fn on_event(&self, _event: &StepEvent) {}
}
