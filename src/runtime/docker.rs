//! Docker CLI runtime - drives containers through the `docker` binary

use crate::runtime::{ContainerSpec, Runtime, RuntimeError};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Lines buffered per followed container before the reader waits
const LOG_BUFFER: usize = 256;

/// Configuration for the Docker runtime
#[derive(Debug, Clone)]
pub struct DockerConfig {
    /// Path to the docker executable
    pub docker_path: String,

    /// Timeout for management commands (network, volume, image, stop, rm)
    pub command_timeout_secs: u64,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            docker_path: "docker".to_string(),
            command_timeout_secs: 300,
        }
    }
}

impl DockerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_docker_path(mut self, path: impl Into<String>) -> Self {
        self.docker_path = path.into();
        self
    }

    pub fn with_command_timeout(mut self, secs: u64) -> Self {
        self.command_timeout_secs = secs;
        self
    }
}

/// Runtime backed by the docker CLI
#[derive(Debug, Clone, Default)]
pub struct DockerRuntime {
    config: DockerConfig,
}

impl DockerRuntime {
    pub fn new(config: DockerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DockerConfig {
        &self.config
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.config.docker_path);
        cmd.kill_on_drop(true);
        cmd
    }

    /// Run `docker <args>` to completion and return its trimmed stdout
    async fn docker(&self, args: &[&str]) -> Result<String, RuntimeError> {
        let command = format!("docker {}", args.join(" "));
        debug!("Running {}", command);

        let result = timeout(
            Duration::from_secs(self.config.command_timeout_secs),
            self.command().args(args).output(),
        )
        .await
        .map_err(|_| RuntimeError::Timeout {
            command: command.clone(),
            secs: self.config.command_timeout_secs,
        })?;

        let output = result.map_err(|source| RuntimeError::Spawn {
            command: command.clone(),
            source,
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let code = output.status.code().unwrap_or(-1);
            warn!("{} exited with code {}: {}", command, code, stderr);
            return Err(RuntimeError::CommandFailed {
                command,
                code,
                stderr,
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// `docker run` arguments for `spec`
pub fn run_args(spec: &ContainerSpec) -> Vec<String> {
    let mut args = vec![
        "run".to_string(),
        "--detach".to_string(),
        "--name".to_string(),
        spec.name.clone(),
    ];

    if !spec.network.is_empty() {
        args.push("--network".to_string());
        args.push(spec.network.clone());
    }

    if !spec.working_dir.is_empty() {
        args.push("--workdir".to_string());
        args.push(spec.working_dir.clone());
    }

    for volume in &spec.volumes {
        args.push("--volume".to_string());
        args.push(volume.to_mount());
    }

    for (key, value) in &spec.environment {
        args.push("--env".to_string());
        args.push(format!("{}={}", key, value));
    }

    // Bare names: docker copies the value from our environment
    for name in &spec.secrets {
        args.push("--env".to_string());
        args.push(name.clone());
    }

    let mut command = Vec::new();
    if !spec.commands.is_empty() {
        args.push("--entrypoint".to_string());
        args.push("/bin/sh".to_string());
        command.push("-c".to_string());
        command.push(render_script(&spec.commands));
    } else if let Some((entrypoint, rest)) = spec.entrypoint.split_first() {
        args.push("--entrypoint".to_string());
        args.push(entrypoint.clone());
        command.extend(rest.iter().cloned());
    }

    args.push(spec.image.clone());
    args.extend(command);
    args
}

/// Shell script that echoes each command before running it, stopping on the first failure
pub fn render_script(commands: &[String]) -> String {
    let mut script = String::from("set -e\n");
    for command in commands {
        script.push_str(&format!("echo $ {}\n", shell_quote(command)));
        script.push_str(command);
        script.push('\n');
    }
    script
}

fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

fn forward_lines<R>(reader: R, tx: mpsc::Sender<String>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tx.send(line).await.is_err() {
                break;
            }
        }
    });
}

#[async_trait]
impl Runtime for DockerRuntime {
    async fn create_network(&self, name: &str) -> Result<(), RuntimeError> {
        self.docker(&["network", "create", name]).await.map(|_| ())
    }

    async fn remove_network(&self, name: &str) -> Result<(), RuntimeError> {
        self.docker(&["network", "rm", name]).await.map(|_| ())
    }

    async fn create_volume(&self, name: &str) -> Result<(), RuntimeError> {
        self.docker(&["volume", "create", name]).await.map(|_| ())
    }

    async fn remove_volume(&self, name: &str) -> Result<(), RuntimeError> {
        self.docker(&["volume", "rm", "--force", name]).await.map(|_| ())
    }

    async fn image_exists(&self, image: &str) -> Result<bool, RuntimeError> {
        match self.docker(&["image", "inspect", "--format", "{{.Id}}", image]).await {
            Ok(_) => Ok(true),
            Err(RuntimeError::CommandFailed { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn pull_image(&self, image: &str) -> Result<(), RuntimeError> {
        self.docker(&["pull", "--quiet", image]).await.map(|_| ())
    }

    async fn run_container(&self, spec: &ContainerSpec) -> Result<String, RuntimeError> {
        let args = run_args(spec);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let id = self.docker(&args).await?;

        if id.is_empty() {
            return Err(RuntimeError::Output(format!(
                "docker run returned no container id for {}",
                spec.name
            )));
        }

        Ok(id)
    }

    async fn tail_container(&self, name: &str) -> Result<mpsc::Receiver<String>, RuntimeError> {
        let command = format!("docker logs --follow {}", name);
        let mut child = self
            .command()
            .args(["logs", "--follow", name])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| RuntimeError::Spawn {
                command: command.clone(),
                source,
            })?;

        let (tx, rx) = mpsc::channel(LOG_BUFFER);

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RuntimeError::Output(format!("{}: stdout not captured", command)))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| RuntimeError::Output(format!("{}: stderr not captured", command)))?;

        forward_lines(stdout, tx.clone());
        forward_lines(stderr, tx);

        tokio::spawn(async move {
            if let Err(e) = child.wait().await {
                warn!("{} failed: {}", command, e);
            }
        });

        Ok(rx)
    }

    async fn wait_container(&self, name: &str) -> Result<i64, RuntimeError> {
        let command = format!("docker wait {}", name);
        let output = self
            .command()
            .args(["wait", name])
            .output()
            .await
            .map_err(|source| RuntimeError::Spawn {
                command: command.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(RuntimeError::CommandFailed {
                command,
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        stdout
            .trim()
            .parse()
            .map_err(|_| RuntimeError::Output(format!("{}: unexpected exit code {:?}", command, stdout.trim())))
    }

    async fn stop_container(&self, name: &str) -> Result<(), RuntimeError> {
        self.docker(&["stop", "--time", "5", name]).await.map(|_| ())
    }

    async fn remove_container(&self, name: &str) -> Result<(), RuntimeError> {
        self.docker(&["rm", "--force", "--volumes", name]).await.map(|_| ())
    }
}
