//! Container runtime abstraction
//!
//! A [`Runtime`] owns the low-level container operations a build needs. The
//! [`LocalExecutor`](crate::execution::LocalExecutor) drives it; the default
//! implementation is [`DockerRuntime`].

pub mod docker;

use async_trait::async_trait;
use std::collections::BTreeMap;
use thiserror::Error;
use tokio::sync::mpsc;

pub use docker::{DockerConfig, DockerRuntime};

/// Error types for runtime operations
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with code {code}: {stderr}")]
    CommandFailed {
        command: String,
        code: i32,
        stderr: String,
    },

    #[error("`{command}` timed out after {secs} seconds")]
    Timeout { command: String, secs: u64 },

    #[error("invalid volume `{0}`, expected src[:dst[:ro]]")]
    InvalidVolume(String),

    #[error("unexpected runtime output: {0}")]
    Output(String),
}

/// A host path mounted into every step container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Volume {
    pub source: String,
    pub destination: String,
    pub read_only: bool,
}

impl Volume {
    /// Parse `src`, `src:dst` or `src:dst:ro`
    pub fn parse(spec: &str) -> Result<Self, RuntimeError> {
        let parts: Vec<&str> = spec.split(':').collect();
        let invalid = || RuntimeError::InvalidVolume(spec.to_string());

        let (source, destination, read_only) = match parts.as_slice() {
            [src] => (*src, *src, false),
            [src, dst] => (*src, *dst, false),
            [src, dst, "ro"] => (*src, *dst, true),
            [src, dst, "rw"] => (*src, *dst, false),
            _ => return Err(invalid()),
        };

        if source.is_empty() || destination.is_empty() {
            return Err(invalid());
        }

        Ok(Self {
            source: source.to_string(),
            destination: destination.to_string(),
            read_only,
        })
    }

    /// `-v` argument form
    pub fn to_mount(&self) -> String {
        let mut mount = format!("{}:{}", self.source, self.destination);
        if self.read_only {
            mount.push_str(":ro");
        }
        mount
    }
}

/// Everything needed to start one container
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContainerSpec {
    /// Container name
    pub name: String,
    pub image: String,
    pub network: String,
    pub working_dir: String,
    pub entrypoint: Vec<String>,
    pub commands: Vec<String>,
    pub environment: BTreeMap<String, String>,
    /// Variables forwarded by name from the caller's environment
    pub secrets: Vec<String>,
    pub volumes: Vec<Volume>,
    pub detach: bool,
}

/// Trait for container runtimes - allows for different implementations
#[async_trait]
pub trait Runtime: Send + Sync {
    async fn create_network(&self, name: &str) -> Result<(), RuntimeError>;

    async fn remove_network(&self, name: &str) -> Result<(), RuntimeError>;

    async fn create_volume(&self, name: &str) -> Result<(), RuntimeError>;

    async fn remove_volume(&self, name: &str) -> Result<(), RuntimeError>;

    async fn image_exists(&self, image: &str) -> Result<bool, RuntimeError>;

    async fn pull_image(&self, image: &str) -> Result<(), RuntimeError>;

    /// Start a container and return its id
    async fn run_container(&self, spec: &ContainerSpec) -> Result<String, RuntimeError>;

    /// Follow a container's output; the channel closes when the container exits
    async fn tail_container(&self, name: &str) -> Result<mpsc::Receiver<String>, RuntimeError>;

    /// Wait for a container to exit and return its exit code
    async fn wait_container(&self, name: &str) -> Result<i64, RuntimeError>;

    async fn stop_container(&self, name: &str) -> Result<(), RuntimeError>;

    async fn remove_container(&self, name: &str) -> Result<(), RuntimeError>;
}
