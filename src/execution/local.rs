//! Executor that runs a build on the local machine through a container runtime

use crate::core::{Build, ExecutionContext, PullPolicy, Step, WORKSPACE_PATH};
use crate::execution::secrets::format_step_identifier;
use crate::execution::{Executor, ExecutorError, LogCallback, NoopCallback, StepEvent};
use crate::runtime::{ContainerSpec, Runtime, RuntimeError, Volume};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

/// Step events buffered between exec and stream
const EVENT_BUFFER: usize = 1024;

/// Configuration for the local executor
#[derive(Clone)]
pub struct LocalExecutorConfig {
    /// Host directory mounted at the workspace path; a build volume is used when unset
    pub workspace: Option<PathBuf>,

    /// Extra host mounts for every container
    pub volumes: Vec<Volume>,

    /// Receives step activity from the stream phase
    pub callback: Arc<dyn LogCallback>,
}

impl Default for LocalExecutorConfig {
    fn default() -> Self {
        Self {
            workspace: None,
            volumes: Vec::new(),
            callback: Arc::new(NoopCallback),
        }
    }
}

impl LocalExecutorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_workspace(mut self, workspace: impl Into<PathBuf>) -> Self {
        self.workspace = Some(workspace.into());
        self
    }

    pub fn with_volumes(mut self, volumes: Vec<Volume>) -> Self {
        self.volumes = volumes;
        self
    }

    pub fn with_callback(mut self, callback: Arc<dyn LogCallback>) -> Self {
        self.callback = callback;
        self
    }
}

/// A step scheduled to run, with the label used in logs and errors
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedStep {
    pub label: String,
    pub step: Step,
    /// Started before any step, for the whole build
    pub service: bool,
}

/// Services first, then every step in compiled order
pub fn plan(build: &Build) -> Vec<PlannedStep> {
    let services = build.services.iter().map(|service| PlannedStep {
        label: format!("[service: {}]", service.name),
        step: service.clone(),
        service: true,
    });

    let steps = build.iter_steps().map(|(stage, step)| PlannedStep {
        label: format_step_identifier(stage, &step.name),
        step: step.clone(),
        service: false,
    });

    services.chain(steps).collect()
}

#[derive(Default)]
struct LocalState {
    network: Option<String>,
    volume: Option<String>,
    plan: Vec<PlannedStep>,
    /// Started containers, in start order
    containers: Vec<String>,
    events_tx: Option<mpsc::Sender<StepEvent>>,
    events_rx: Option<mpsc::Receiver<StepEvent>>,
}

/// Runs one build's steps sequentially in containers
pub struct LocalExecutor {
    build: Build,
    runtime: Arc<dyn Runtime>,
    config: LocalExecutorConfig,
    state: Mutex<LocalState>,
}

impl LocalExecutor {
    pub fn new(build: Build, runtime: Arc<dyn Runtime>, config: LocalExecutorConfig) -> Self {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        Self {
            build,
            runtime,
            config,
            state: Mutex::new(LocalState {
                events_tx: Some(tx),
                events_rx: Some(rx),
                ..Default::default()
            }),
        }
    }

    pub fn build(&self) -> &Build {
        &self.build
    }

    fn container_spec(&self, step: &Step, network: &str, volume: &str) -> ContainerSpec {
        let workspace = match &self.config.workspace {
            Some(dir) => Volume {
                source: dir.display().to_string(),
                destination: WORKSPACE_PATH.to_string(),
                read_only: false,
            },
            None => Volume {
                source: volume.to_string(),
                destination: WORKSPACE_PATH.to_string(),
                read_only: false,
            },
        };

        let mut volumes = vec![workspace];
        volumes.extend(self.config.volumes.iter().cloned());

        ContainerSpec {
            name: step.id.clone(),
            image: step.image.clone(),
            network: network.to_string(),
            working_dir: WORKSPACE_PATH.to_string(),
            entrypoint: step.entrypoint.clone(),
            commands: step.commands.clone(),
            environment: step.environment.clone(),
            secrets: step.secrets.iter().map(|s| s.target.clone()).collect(),
            volumes,
            detach: step.detach,
        }
    }

    async fn start(&self, planned: &PlannedStep, network: &str, volume: &str) -> Result<(), ExecutorError> {
        let spec = self.container_spec(&planned.step, network, volume);
        // `docker run` can fail after the container exists; teardown must still see it
        self.state.lock().await.containers.push(spec.name.clone());

        let id = self.runtime.run_container(&spec).await?;
        debug!("Started container {} ({}) for {}", spec.name, id, planned.label);
        Ok(())
    }

    async fn start_detached(
        &self,
        planned: &PlannedStep,
        network: &str,
        volume: &str,
        tx: &mpsc::Sender<StepEvent>,
    ) -> Result<(), ExecutorError> {
        self.start(planned, network, volume).await?;
        emit(tx, StepEvent::Started {
            label: planned.label.clone(),
            image: planned.step.image.clone(),
        });
        Ok(())
    }

    /// Run one step to completion, forwarding its output
    async fn run_step(
        &self,
        planned: &PlannedStep,
        network: &str,
        volume: &str,
        tx: &mpsc::Sender<StepEvent>,
        ctx: &ExecutionContext,
    ) -> Result<i64, ExecutorError> {
        let label = planned.label.clone();
        let name = planned.step.id.as_str();

        self.start(planned, network, volume).await?;
        emit(tx, StepEvent::Started {
            label: label.clone(),
            image: planned.step.image.clone(),
        });

        let mut logs = self.runtime.tail_container(name).await?;
        loop {
            tokio::select! {
                line = logs.recv() => match line {
                    Some(line) => emit(tx, StepEvent::Log { label: label.clone(), line }),
                    None => break,
                },
                _ = ctx.cancelled() => return Err(self.interrupt(name).await),
            }
        }

        let exit_code = tokio::select! {
            code = self.runtime.wait_container(name) => code?,
            _ = ctx.cancelled() => return Err(self.interrupt(name).await),
        };

        emit(tx, StepEvent::Finished { label, exit_code });
        Ok(exit_code)
    }

    async fn interrupt(&self, name: &str) -> ExecutorError {
        warn!("Build cancelled, stopping container {}", name);
        if let Err(e) = self.runtime.stop_container(name).await {
            error!("unable to stop container {}: {}", name, e);
        }
        ExecutorError::Cancelled
    }

    async fn resources(&self) -> Result<(String, String, Vec<PlannedStep>, mpsc::Sender<StepEvent>), ExecutorError> {
        let state = self.state.lock().await;
        let missing = |what: &str| ExecutorError::Internal(format!("build has no {}, was it created?", what));

        Ok((
            state.network.clone().ok_or_else(|| missing("network"))?,
            state.volume.clone().ok_or_else(|| missing("volume"))?,
            state.plan.clone(),
            state
                .events_tx
                .clone()
                .ok_or_else(|| ExecutorError::Internal("build was already destroyed".to_string()))?,
        ))
    }
}

/// Hand an event to the stream phase without ever waiting on it
fn emit(tx: &mpsc::Sender<StepEvent>, event: StepEvent) {
    match tx.try_send(event) {
        Ok(()) => {}
        Err(TrySendError::Full(event)) => {
            warn!("Log stream is behind, dropping event for {}", event.label())
        }
        // The stream phase may already have ended
        Err(TrySendError::Closed(_)) => {}
    }
}

fn check(ctx: &ExecutionContext) -> Result<(), ExecutorError> {
    if ctx.is_cancelled() {
        return Err(ExecutorError::Cancelled);
    }
    Ok(())
}

#[async_trait]
impl Executor for LocalExecutor {
    async fn create_build(&self, ctx: &ExecutionContext) -> Result<(), ExecutorError> {
        check(ctx)?;
        let name = self.build.id.clone();

        self.runtime.create_network(&name).await?;
        self.state.lock().await.network = Some(name.clone());

        self.runtime.create_volume(&name).await?;
        self.state.lock().await.volume = Some(name.clone());

        info!("Created network and volume {}", name);
        Ok(())
    }

    async fn plan_build(&self, ctx: &ExecutionContext) -> Result<(), ExecutorError> {
        check(ctx)?;
        let plan = plan(&self.build);

        if plan.iter().all(|planned| planned.step.is_placeholder()) {
            return Err(ExecutorError::NothingToRun);
        }

        debug!("Planned {} container(s)", plan.len());
        self.state.lock().await.plan = plan;
        Ok(())
    }

    async fn assemble_build(&self, ctx: &ExecutionContext) -> Result<(), ExecutorError> {
        let plan = self.state.lock().await.plan.clone();
        let mut seen = BTreeSet::new();

        for planned in plan.iter().filter(|p| !p.step.is_placeholder()) {
            check(ctx)?;
            let step = &planned.step;
            if !seen.insert(step.image.as_str()) {
                continue;
            }

            let pull = match step.pull {
                PullPolicy::Always => true,
                PullPolicy::NotPresent => !self.runtime.image_exists(&step.image).await?,
                PullPolicy::Never => false,
            };

            if pull {
                info!("Pulling image {}", step.image);
                self.runtime.pull_image(&step.image).await?;
            } else {
                debug!("Using local image {}", step.image);
            }
        }

        Ok(())
    }

    async fn exec_build(&self, ctx: &ExecutionContext) -> Result<(), ExecutorError> {
        let (network, volume, plan, tx) = self.resources().await?;

        let (services, steps): (Vec<_>, Vec<_>) = plan.iter().partition(|p| p.service);

        for planned in services {
            check(ctx)?;
            self.start_detached(planned, &network, &volume, &tx).await?;
        }

        for planned in steps {
            check(ctx)?;

            // Detached steps start in their place but are never waited on
            if planned.step.detach {
                self.start_detached(planned, &network, &volume, &tx).await?;
                continue;
            }

            if planned.step.is_placeholder() {
                emit(&tx, StepEvent::Started {
                    label: planned.label.clone(),
                    image: planned.step.image.clone(),
                });
                emit(&tx, StepEvent::Finished {
                    label: planned.label.clone(),
                    exit_code: 0,
                });
                continue;
            }

            let exit_code = self.run_step(planned, &network, &volume, &tx, ctx).await?;
            if exit_code != 0 {
                if planned.step.continue_on_error {
                    warn!("{} exited with code {}, continuing", planned.label, exit_code);
                    continue;
                }
                return Err(ExecutorError::StepFailed {
                    step: planned.label.clone(),
                    exit_code,
                });
            }
        }

        Ok(())
    }

    async fn stream_build(&self, ctx: &ExecutionContext) -> Result<(), ExecutorError> {
        let mut rx = self
            .state
            .lock()
            .await
            .events_rx
            .take()
            .ok_or_else(|| ExecutorError::Internal("build is already being streamed".to_string()))?;

        loop {
            tokio::select! {
                biased;
                event = rx.recv() => match event {
                    Some(event) => self.config.callback.on_event(&event),
                    None => return Ok(()),
                },
                _ = ctx.cancelled() => break,
            }
        }

        rx.close();
        while let Ok(event) = rx.try_recv() {
            self.config.callback.on_event(&event);
        }

        Ok(())
    }

    async fn destroy_build(&self, _ctx: &ExecutionContext) -> Result<(), ExecutorError> {
        let (containers, volume, network) = {
            let mut state = self.state.lock().await;
            state.events_tx = None;
            (
                std::mem::take(&mut state.containers),
                state.volume.take(),
                state.network.take(),
            )
        };

        let mut first_error: Option<RuntimeError> = None;
        let mut record = |what: &str, result: Result<(), RuntimeError>| {
            if let Err(e) = result {
                error!("unable to remove {}: {}", what, e);
                first_error.get_or_insert(e);
            }
        };

        for name in containers.iter().rev() {
            record(name, self.runtime.remove_container(name).await);
        }
        if let Some(volume) = &volume {
            record(volume, self.runtime.remove_volume(volume).await);
        }
        if let Some(network) = &network {
            record(network, self.runtime.remove_network(network).await);
        }

        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }
}
