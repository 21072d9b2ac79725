//! Build orchestrator - drives an executor through one build's lifecycle

use crate::core::{BuildState, ExecutionContext, ExecutionStatus, Phase};
use crate::error::{PhaseError, PipelineError};
use crate::execution::signal::{shutdown_signal, SignalBridge};
use crate::execution::{Executor, ExecutorError};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// How long the log stream may keep flushing after the build ends
pub const DEFAULT_STREAM_GRACE: Duration = Duration::from_secs(5);

/// Events that can occur while a build runs
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    BuildStarted {
        build_id: Option<String>,
        started_at: DateTime<Utc>,
    },
    PhaseStarted {
        phase: Phase,
    },
    PhaseCompleted {
        phase: Phase,
        elapsed: Duration,
    },
    PhaseFailed {
        phase: Phase,
        error: String,
    },
    BuildFinished {
        status: ExecutionStatus,
        state: BuildState,
        elapsed: Duration,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(ExecutionEvent) + Send + Sync>;

/// Runs Create, Plan, Assemble and Exec in order with log streaming
/// alongside, and always tears the build down afterwards
pub struct BuildOrchestrator<E: ?Sized> {
    executor: Arc<E>,
    build_id: Option<String>,
    event_handlers: Vec<EventHandler>,
    stream_grace: Duration,
}

impl<E: Executor + ?Sized + 'static> BuildOrchestrator<E> {
    pub fn new(executor: Arc<E>) -> Self {
        Self {
            executor,
            build_id: None,
            event_handlers: Vec::new(),
            stream_grace: DEFAULT_STREAM_GRACE,
        }
    }

    /// Build id reported in [`ExecutionEvent::BuildStarted`]
    pub fn with_build_id(mut self, build_id: impl Into<String>) -> Self {
        self.build_id = Some(build_id.into());
        self
    }

    pub fn with_stream_grace(mut self, grace: Duration) -> Self {
        self.stream_grace = grace;
        self
    }

    /// Add an event handler
    pub fn with_event_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        self.event_handlers.push(Arc::new(handler));
        self
    }

    fn emit_event(&self, event: ExecutionEvent) {
        for handler in &self.event_handlers {
            handler(event.clone());
        }
    }

    /// Run the build, cancelling it on Ctrl-C or SIGTERM
    pub async fn run(&self, ctx: &ExecutionContext) -> Result<(), PipelineError> {
        self.run_with_signal(ctx, shutdown_signal()).await
    }

    /// Run the build, cancelling it when `signal` resolves
    ///
    /// Returns the first phase error. Teardown runs on every path with a
    /// fresh context; its failure is logged and never returned.
    pub async fn run_with_signal<S>(
        &self,
        parent: &ExecutionContext,
        signal: S,
    ) -> Result<(), PipelineError>
    where
        S: Future<Output = ()> + Send + 'static,
    {
        let ctx = parent.child();
        let _bridge = SignalBridge::spawn(ctx.clone(), signal);

        let started = Instant::now();
        info!(
            "Starting build {}",
            self.build_id.as_deref().unwrap_or("(unnamed)")
        );
        self.emit_event(ExecutionEvent::BuildStarted {
            build_id: self.build_id.clone(),
            started_at: Utc::now(),
        });

        let mut state = BuildState::Pending;
        let mut stream = None;

        let result = self.run_phases(&ctx, &mut state, &mut stream).await;
        let interrupted = ctx.is_cancelled();

        self.destroy(&mut state).await;

        ctx.cancel();
        if let Some(handle) = stream {
            self.finish_stream(handle).await;
        }

        let status = match &result {
            Ok(()) => ExecutionStatus::Success,
            Err(e) if interrupted || e.is_cancelled() => ExecutionStatus::Canceled,
            Err(PhaseError {
                source: ExecutorError::StepFailed { .. },
                ..
            }) => ExecutionStatus::Failure,
            Err(_) => ExecutionStatus::Error,
        };

        info!("Build finished: {:?}", status);
        self.emit_event(ExecutionEvent::BuildFinished {
            status,
            state,
            elapsed: started.elapsed(),
        });

        result.map_err(PipelineError::from)
    }

    async fn run_phases(
        &self,
        ctx: &ExecutionContext,
        state: &mut BuildState,
        stream: &mut Option<JoinHandle<()>>,
    ) -> Result<(), PhaseError> {
        self.run_phase(Phase::Create, ctx, state).await?;
        self.run_phase(Phase::Plan, ctx, state).await?;

        *stream = Some(self.spawn_stream(ctx.clone()));

        self.run_phase(Phase::Assemble, ctx, state).await?;
        self.run_phase(Phase::Exec, ctx, state).await
    }

    async fn run_phase(
        &self,
        phase: Phase,
        ctx: &ExecutionContext,
        state: &mut BuildState,
    ) -> Result<(), PhaseError> {
        debug!("Running {} phase", phase);
        self.emit_event(ExecutionEvent::PhaseStarted { phase });

        if phase == Phase::Exec {
            *state = BuildState::Executing;
        }

        let started = Instant::now();
        let result = match phase {
            Phase::Create => self.executor.create_build(ctx).await,
            Phase::Plan => self.executor.plan_build(ctx).await,
            Phase::Assemble => self.executor.assemble_build(ctx).await,
            Phase::Exec => self.executor.exec_build(ctx).await,
            Phase::Stream | Phase::Destroy => {
                return Err(PhaseError::new(
                    phase,
                    ExecutorError::Internal(format!("{} is not a sequential phase", phase)),
                ))
            }
        };

        // A phase that swallowed the cancellation still counts as cancelled
        let result = match result {
            Ok(()) if ctx.is_cancelled() => Err(ExecutorError::Cancelled),
            other => other,
        };

        match result {
            Ok(()) => {
                *state = phase.completed_state();
                self.emit_event(ExecutionEvent::PhaseCompleted {
                    phase,
                    elapsed: started.elapsed(),
                });
                Ok(())
            }
            Err(source) => {
                let error = PhaseError::new(phase, source);
                error!("{}", error);
                self.emit_event(ExecutionEvent::PhaseFailed {
                    phase,
                    error: error.to_string(),
                });
                Err(error)
            }
        }
    }

    fn spawn_stream(&self, ctx: ExecutionContext) -> JoinHandle<()> {
        let executor = Arc::clone(&self.executor);
        tokio::spawn(async move {
            if let Err(e) = executor.stream_build(&ctx).await {
                error!("unable to stream build: {}", e);
            }
        })
    }

    async fn finish_stream(&self, mut handle: JoinHandle<()>) {
        match tokio::time::timeout(self.stream_grace, &mut handle).await {
            Ok(Ok(())) => debug!("Log stream finished"),
            Ok(Err(e)) => error!("log stream task failed: {}", e),
            Err(_) => {
                warn!(
                    "Log stream still running after {:?}, abandoning it",
                    self.stream_grace
                );
                handle.abort();
            }
        }
    }

    async fn destroy(&self, state: &mut BuildState) {
        *state = BuildState::Destroying;
        self.emit_event(ExecutionEvent::PhaseStarted {
            phase: Phase::Destroy,
        });

        let started = Instant::now();
        match self.executor.destroy_build(&ExecutionContext::new()).await {
            Ok(()) => self.emit_event(ExecutionEvent::PhaseCompleted {
                phase: Phase::Destroy,
                elapsed: started.elapsed(),
            }),
            Err(e) => {
                error!("unable to destroy build: {}", e);
                self.emit_event(ExecutionEvent::PhaseFailed {
                    phase: Phase::Destroy,
                    error: e.to_string(),
                });
            }
        }

        *state = BuildState::Destroyed;
    }
}
