//! Test fakes shared by the scenario tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, Notify};
use vela::core::{ExecutionContext, FileSystem, Phase};
use vela::execution::{Executor, ExecutorError, LogCallback, StepEvent};
use vela::runtime::{ContainerSpec, Runtime, RuntimeError};

/// Executor that records the phases it runs and fails on demand
#[derive(Default)]
pub struct FakeExecutor {
    calls: Mutex<Vec<Phase>>,
    fail_on: Option<Phase>,
    fail_stream: bool,
    /// Exec waits for cancellation and then reports success anyway
    block_exec: bool,
    /// Context cancellation observed by destroy
    destroy_saw_cancelled: Mutex<Vec<bool>>,
    pub exec_started: Notify,
}

impl FakeExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(phase: Phase) -> Self {
        Self {
            fail_on: Some(phase),
            ..Default::default()
        }
    }

    pub fn with_stream_error(mut self) -> Self {
        self.fail_stream = true;
        self
    }

    pub fn blocking_exec(mut self) -> Self {
        self.block_exec = true;
        self
    }

    pub fn calls(&self) -> Vec<Phase> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls without the background stream phase, whose timing is not fixed
    pub fn sequential_calls(&self) -> Vec<Phase> {
        self.calls()
            .into_iter()
            .filter(|phase| *phase != Phase::Stream)
            .collect()
    }

    pub fn count(&self, phase: Phase) -> usize {
        self.calls().iter().filter(|p| **p == phase).count()
    }

    pub fn destroy_contexts(&self) -> Vec<bool> {
        self.destroy_saw_cancelled.lock().unwrap().clone()
    }

    fn record(&self, phase: Phase) -> Result<(), ExecutorError> {
        self.calls.lock().unwrap().push(phase);
        if self.fail_on == Some(phase) {
            return Err(ExecutorError::Internal(format!("{} exploded", phase)));
        }
        Ok(())
    }
}

#[async_trait]
impl Executor for FakeExecutor {
    async fn create_build(&self, _ctx: &ExecutionContext) -> Result<(), ExecutorError> {
        self.record(Phase::Create)
    }

    async fn plan_build(&self, _ctx: &ExecutionContext) -> Result<(), ExecutorError> {
        self.record(Phase::Plan)
    }

    async fn assemble_build(&self, _ctx: &ExecutionContext) -> Result<(), ExecutorError> {
        self.record(Phase::Assemble)
    }

    async fn exec_build(&self, ctx: &ExecutionContext) -> Result<(), ExecutorError> {
        self.record(Phase::Exec)?;
        if self.block_exec {
            self.exec_started.notify_one();
            ctx.cancelled().await;
        }
        Ok(())
    }

    async fn stream_build(&self, ctx: &ExecutionContext) -> Result<(), ExecutorError> {
        self.calls.lock().unwrap().push(Phase::Stream);
        if self.fail_stream {
            return Err(ExecutorError::Internal("stream broke".to_string()));
        }
        ctx.cancelled().await;
        Ok(())
    }

    async fn destroy_build(&self, ctx: &ExecutionContext) -> Result<(), ExecutorError> {
        self.destroy_saw_cancelled
            .lock()
            .unwrap()
            .push(ctx.is_cancelled());
        self.record(Phase::Destroy)
    }
}

/// Container runtime that never starts anything
#[derive(Default)]
pub struct FakeRuntime {
    calls: Mutex<Vec<String>>,
    local_images: BTreeSet<String>,
    exit_codes: BTreeMap<String, i64>,
    logs: BTreeMap<String, Vec<String>>,
    /// Containers whose wait never returns
    hanging: BTreeSet<String>,
    fail_remove_network: bool,
    /// Containers that are created but fail to start
    failing_run: BTreeSet<String>,
    pub container_started: Notify,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_local_image(mut self, image: &str) -> Self {
        self.local_images.insert(image.to_string());
        self
    }

    pub fn with_exit_code(mut self, container: &str, code: i64) -> Self {
        self.exit_codes.insert(container.to_string(), code);
        self
    }

    pub fn with_logs(mut self, container: &str, lines: &[&str]) -> Self {
        self.logs.insert(
            container.to_string(),
            lines.iter().map(|l| l.to_string()).collect(),
        );
        self
    }

    pub fn hanging(mut self, container: &str) -> Self {
        self.hanging.insert(container.to_string());
        self
    }

    pub fn failing_run(mut self, container: &str) -> Self {
        self.failing_run.insert(container.to_string());
        self
    }

    pub fn failing_network_removal(mut self) -> Self {
        self.fail_remove_network = true;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls whose text starts with `prefix`
    pub fn calls_to(&self, prefix: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.starts_with(prefix))
            .collect()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl Runtime for FakeRuntime {
    async fn create_network(&self, name: &str) -> Result<(), RuntimeError> {
        self.record(format!("create_network {}", name));
        Ok(())
    }

    async fn remove_network(&self, name: &str) -> Result<(), RuntimeError> {
        self.record(format!("remove_network {}", name));
        if self.fail_remove_network {
            return Err(RuntimeError::CommandFailed {
                command: format!("docker network rm {}", name),
                code: 1,
                stderr: "network has active endpoints".to_string(),
            });
        }
        Ok(())
    }

    async fn create_volume(&self, name: &str) -> Result<(), RuntimeError> {
        self.record(format!("create_volume {}", name));
        Ok(())
    }

    async fn remove_volume(&self, name: &str) -> Result<(), RuntimeError> {
        self.record(format!("remove_volume {}", name));
        Ok(())
    }

    async fn image_exists(&self, image: &str) -> Result<bool, RuntimeError> {
        Ok(self.local_images.contains(image))
    }

    async fn pull_image(&self, image: &str) -> Result<(), RuntimeError> {
        self.record(format!("pull_image {}", image));
        Ok(())
    }

    async fn run_container(&self, spec: &ContainerSpec) -> Result<String, RuntimeError> {
        self.record(format!("run_container {}", spec.name));
        if self.failing_run.contains(&spec.name) {
            return Err(RuntimeError::CommandFailed {
                command: format!("docker run --name {}", spec.name),
                code: 127,
                stderr: "exec: \"cargo\": executable file not found in $PATH".to_string(),
            });
        }
        self.container_started.notify_one();
        Ok(format!("id-{}", spec.name))
    }

    async fn tail_container(&self, name: &str) -> Result<mpsc::Receiver<String>, RuntimeError> {
        let lines = self.logs.get(name).cloned().unwrap_or_default();
        let (tx, rx) = mpsc::channel(lines.len().max(1));
        for line in lines {
            let _ = tx.send(line).await;
        }
        if self.hanging.contains(name) {
            // Keep the log stream open so the step looks like it is still running
            tokio::spawn(async move {
                let _tx = tx;
                std::future::pending::<()>().await;
            });
        }
        Ok(rx)
    }

    async fn wait_container(&self, name: &str) -> Result<i64, RuntimeError> {
        if self.hanging.contains(name) {
            std::future::pending::<()>().await;
        }
        Ok(self.exit_codes.get(name).copied().unwrap_or(0))
    }

    async fn stop_container(&self, name: &str) -> Result<(), RuntimeError> {
        self.record(format!("stop_container {}", name));
        Ok(())
    }

    async fn remove_container(&self, name: &str) -> Result<(), RuntimeError> {
        self.record(format!("remove_container {}", name));
        Ok(())
    }
}

/// Callback that keeps every event it receives
#[derive(Default)]
pub struct CollectingCallback {
    events: Mutex<Vec<StepEvent>>,
}

impl CollectingCallback {
    pub fn events(&self) -> Vec<StepEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn log_lines(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                StepEvent::Log { line, .. } => Some(line),
                _ => None,
            })
            .collect()
    }
}

impl LogCallback for CollectingCallback {
    fn on_event(&self, event: &StepEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

/// In-memory filesystem keyed by full path
#[derive(Debug, Clone, Default)]
pub struct MemoryFileSystem {
    files: BTreeMap<PathBuf, String>,
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: impl Into<PathBuf>, contents: &str) -> Self {
        self.files.insert(path.into(), contents.to_string());
        self
    }
}

impl FileSystem for MemoryFileSystem {
    fn exists(&self, path: &Path) -> bool {
        self.files.contains_key(path)
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.display().to_string()))
    }
}

/// Shared handle to a callback, typed for the executor config
pub fn collecting_callback() -> (Arc<CollectingCallback>, Arc<dyn LogCallback>) {
    let callback = Arc::new(CollectingCallback::default());
    let dyn_callback: Arc<dyn LogCallback> = callback.clone();
    (callback, dyn_callback)
}
