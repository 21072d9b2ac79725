//! CLI command definitions

use crate::compiler::PipelineType;
use crate::core::{BuildMetadata, DEFAULT_PIPELINE_FILE};
use crate::execution::{ExecOptions, SecretPolicy};
use crate::runtime::{RuntimeError, Volume};
use clap::Args;
use std::path::PathBuf;

/// Where to find the pipeline and how to compile it
#[derive(Debug, Args, Clone)]
pub struct PipelineArgs {
    /// Pipeline file name
    #[arg(short, long, env = "VELA_FILE", default_value = DEFAULT_PIPELINE_FILE)]
    pub file: String,

    /// Directory containing the pipeline file (defaults to the current directory)
    #[arg(short, long, env = "VELA_PATH")]
    pub path: Option<PathBuf>,

    /// Language the pipeline is written in
    #[arg(long, value_enum, env = "VELA_PIPELINE_TYPE", default_value_t = PipelineTypeArg::Yaml)]
    pub pipeline_type: PipelineTypeArg,

    /// Branch the build runs for
    #[arg(long, env = "VELA_BRANCH", default_value = "main")]
    pub branch: String,

    /// Comment that triggered the build
    #[arg(long, env = "VELA_COMMENT", default_value = "")]
    pub comment: String,

    /// Event that triggered the build
    #[arg(long, env = "VELA_EVENT", default_value = "push")]
    pub event: String,

    /// Tag the build runs for
    #[arg(long, env = "VELA_TAG", default_value = "")]
    pub tag: String,

    /// Deployment target
    #[arg(long, env = "VELA_TARGET", default_value = "")]
    pub target: String,

    /// Git reference (derived from branch or tag when unset)
    #[arg(long = "ref", env = "VELA_REF")]
    pub git_ref: Option<String>,

    /// Changed files, matched by `path` rulesets
    #[arg(long, env = "VELA_CHANGESET", value_delimiter = ',')]
    pub changeset: Vec<String>,
}

impl PipelineArgs {
    pub fn metadata(&self) -> BuildMetadata {
        let metadata = BuildMetadata::new()
            .with_branch(&self.branch)
            .with_comment(&self.comment)
            .with_event(&self.event)
            .with_tag(&self.tag)
            .with_target(&self.target)
            .with_changeset(self.changeset.iter().cloned());

        match &self.git_ref {
            Some(git_ref) => metadata.with_ref(git_ref),
            None => metadata,
        }
    }

    /// Options for loading the pipeline from `cwd`
    pub fn exec_options(&self, cwd: PathBuf) -> ExecOptions {
        let mut opts = ExecOptions::new(cwd)
            .with_file(&self.file)
            .with_pipeline_type(self.pipeline_type.into())
            .with_metadata(self.metadata());

        if let Some(path) = &self.path {
            opts = opts.with_override_dir(path);
        }

        opts
    }
}

/// Run a pipeline locally
#[derive(Debug, Args, Clone)]
pub struct ExecCommand {
    #[command(flatten)]
    pub pipeline: PipelineArgs,

    /// Step to leave out of the run (repeatable)
    #[arg(long = "skip", env = "VELA_SKIP", value_delimiter = ',')]
    pub skip: Vec<String>,

    /// Extra host mount for every container: src[:dst[:ro]] (repeatable)
    #[arg(long = "volume", env = "VELA_VOLUMES", value_delimiter = ',')]
    pub volumes: Vec<String>,

    /// Path to the docker executable
    #[arg(long, env = "VELA_DOCKER", default_value = "docker")]
    pub docker: String,

    /// Refuse to run when a step references a secret missing from the environment
    #[arg(long, env = "VELA_FAIL_ON_MISSING_SECRETS")]
    pub fail_on_missing_secrets: bool,
}

impl ExecCommand {
    pub fn exec_options(&self, cwd: PathBuf) -> ExecOptions {
        let policy = if self.fail_on_missing_secrets {
            SecretPolicy::Fail
        } else {
            SecretPolicy::Warn
        };

        self.pipeline
            .exec_options(cwd)
            .with_skip_steps(self.skip.clone())
            .with_secret_policy(policy)
    }

    pub fn parsed_volumes(&self) -> Result<Vec<Volume>, RuntimeError> {
        self.volumes.iter().map(|v| Volume::parse(v)).collect()
    }
}

/// Compile a pipeline and show the build
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    #[command(flatten)]
    pub pipeline: PipelineArgs,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Pipeline type argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum PipelineTypeArg {
    Yaml,
    Go,
    Starlark,
}

impl From<PipelineTypeArg> for PipelineType {
    fn from(arg: PipelineTypeArg) -> Self {
        match arg {
            PipelineTypeArg::Yaml => PipelineType::Yaml,
            PipelineTypeArg::Go => PipelineType::Go,
            PipelineTypeArg::Starlark => PipelineType::Starlark,
        }
    }
}
