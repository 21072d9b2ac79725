//! Build execution: preparing a build and driving it through its phases

pub mod engine;
pub mod executor;
pub mod filter;
pub mod local;
pub mod pipeline;
pub mod secrets;
pub mod signal;

pub use engine::{BuildOrchestrator, EventHandler, ExecutionEvent};
pub use executor::{Executor, ExecutorError, LogCallback, NoopCallback, StepEvent};
pub use filter::skip_steps;
pub use local::{LocalExecutor, LocalExecutorConfig};
pub use pipeline::{compile_pipeline, prepare_build, ExecOptions};
pub use secrets::{
    audit_secrets, collect_missing_secrets, collect_missing_secrets_with, format_step_identifier,
    SecretPolicy,
};
pub use signal::{shutdown_signal, SignalBridge};
