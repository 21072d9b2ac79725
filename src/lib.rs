//! vela - run Vela pipelines on the local machine

pub mod cli;
pub mod compiler;
pub mod core;
pub mod error;
pub mod execution;
pub mod runtime;

// Re-export commonly used types
pub use compiler::{Compiler, CompileError, PipelineType, YamlCompiler};
pub use core::{Build, BuildMetadata, ExecutionContext, Phase, Stage, Step};
pub use error::{FilterError, PhaseError, PipelineError};
pub use execution::{
    BuildOrchestrator, ExecOptions, ExecutionEvent, Executor, ExecutorError, LocalExecutor,
};
pub use runtime::{DockerRuntime, Runtime, RuntimeError};
