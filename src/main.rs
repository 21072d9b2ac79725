use anyhow::{anyhow, Context, Result};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use vela::cli::commands::{ExecCommand, ValidateCommand};
use vela::cli::output::*;
use vela::cli::terminal_output::TerminalOutputCallback;
use vela::cli::{Cli, Command};
use vela::compiler::YamlCompiler;
use vela::core::{ExecutionContext, OsFileSystem, PathResolver};
use vela::execution::{
    compile_pipeline, format_step_identifier, prepare_build, BuildOrchestrator, LocalExecutor,
    LocalExecutorConfig,
};
use vela::runtime::{DockerConfig, DockerRuntime};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow!("Failed to set logging subscriber: {}", e))?;

    match &cli.command {
        Command::Exec(cmd) => exec_pipeline(cmd, cli.verbose).await?,
        Command::Validate(cmd) => validate_pipeline(cmd)?,
    }

    Ok(())
}

async fn exec_pipeline(cmd: &ExecCommand, verbose: bool) -> Result<()> {
    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    let opts = cmd.exec_options(cwd.clone());
    let volumes = cmd.parsed_volumes().context("Invalid --volume")?;

    let resolver = PathResolver::new(OsFileSystem);
    let build = prepare_build(&resolver, &YamlCompiler::new(), &opts)
        .context("Failed to prepare pipeline")?;

    println!("{}", format_build_summary(&build));

    let total = build.services.len() + build.step_count();
    let callback = Arc::new(TerminalOutputCallback::new(verbose, total));
    let workspace = opts.override_dir.clone().unwrap_or(cwd);

    let runtime = Arc::new(DockerRuntime::new(
        DockerConfig::new().with_docker_path(&cmd.docker),
    ));
    let config = LocalExecutorConfig::new()
        .with_workspace(workspace)
        .with_volumes(volumes)
        .with_callback(callback);

    let build_id = build.id.clone();
    let executor = Arc::new(LocalExecutor::new(build, runtime, config));
    let orchestrator = BuildOrchestrator::new(executor)
        .with_build_id(build_id)
        .with_event_handler(|event| {
            if let Some(line) = format_execution_event(&event) {
                println!("{}", line);
            }
        });

    orchestrator
        .run(&ExecutionContext::new())
        .await
        .context("Build failed")?;

    Ok(())
}

fn validate_pipeline(cmd: &ValidateCommand) -> Result<()> {
    println!("{} Validating pipeline...", INFO);

    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    let opts = cmd.pipeline.exec_options(cwd);
    let resolver = PathResolver::new(OsFileSystem);

    match compile_pipeline(&resolver, &YamlCompiler::new(), &opts) {
        Ok(build) => {
            println!("{} Pipeline configuration is valid!", CHECK);
            println!("{}", format_build_summary(&build));
            for (stage, step) in build.iter_steps() {
                println!(
                    "  {} {}",
                    format_step_identifier(stage, &step.name),
                    style(&step.image).dim()
                );
            }

            if cmd.json {
                let json = serde_json::to_string_pretty(&build)?;
                println!("\n{}", json);
            }
            Ok(())
        }
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(&e).red());
            Err(e.into())
        }
    }
}
