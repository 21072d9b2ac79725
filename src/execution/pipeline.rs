//! Turning a pipeline file on disk into a build that is ready to run

use crate::compiler::{CompileError, Compiler, PipelineType};
use crate::core::{Build, BuildMetadata, FileSystem, PathResolver, DEFAULT_PIPELINE_FILE};
use crate::error::PipelineError;
use crate::execution::filter::skip_steps;
use crate::execution::secrets::{audit_secrets, SecretPolicy};
use std::path::PathBuf;
use tracing::{debug, info};

/// Options for one local run
#[derive(Debug, Clone)]
pub struct ExecOptions {
    /// Directory the pipeline file is looked up in
    pub base_dir: PathBuf,

    /// Directory that replaces `base_dir` when set
    pub override_dir: Option<PathBuf>,

    /// Pipeline file name
    pub file: String,

    pub pipeline_type: PipelineType,

    /// Names of steps to remove before running
    pub skip_steps: Vec<String>,

    pub metadata: BuildMetadata,

    pub secret_policy: SecretPolicy,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("."),
            override_dir: None,
            file: DEFAULT_PIPELINE_FILE.to_string(),
            pipeline_type: PipelineType::default(),
            skip_steps: Vec::new(),
            metadata: BuildMetadata::default(),
            secret_policy: SecretPolicy::default(),
        }
    }
}

impl ExecOptions {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            ..Default::default()
        }
    }

    pub fn with_override_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.override_dir = Some(dir.into());
        self
    }

    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = file.into();
        self
    }

    pub fn with_pipeline_type(mut self, pipeline_type: PipelineType) -> Self {
        self.pipeline_type = pipeline_type;
        self
    }

    pub fn with_skip_steps(mut self, names: Vec<String>) -> Self {
        self.skip_steps = names;
        self
    }

    pub fn with_metadata(mut self, metadata: BuildMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_secret_policy(mut self, policy: SecretPolicy) -> Self {
        self.secret_policy = policy;
        self
    }
}

/// Resolve, read and compile the pipeline file
pub fn compile_pipeline<F, C>(
    resolver: &PathResolver<F>,
    compiler: &C,
    opts: &ExecOptions,
) -> Result<Build, PipelineError>
where
    F: FileSystem,
    C: Compiler + ?Sized,
{
    let path = resolver.resolve(&opts.base_dir, opts.override_dir.as_deref(), &opts.file)?;
    debug!("Using pipeline file {}", path.display());

    let source = resolver
        .fs()
        .read_to_string(&path)
        .map_err(|source| PipelineError::Read {
            path: path.clone(),
            source,
        })?;

    if !compiler.supports(opts.pipeline_type) {
        return Err(PipelineError::Compile {
            path,
            source: CompileError::UnsupportedType(opts.pipeline_type),
        });
    }

    compiler
        .compile(&source, &opts.metadata)
        .map_err(|source| PipelineError::Compile { path, source })
}

/// Compile the pipeline, drop skipped steps and audit its secrets
///
/// Nothing here touches the container runtime; every error is returned
/// before a build phase could start.
pub fn prepare_build<F, C>(
    resolver: &PathResolver<F>,
    compiler: &C,
    opts: &ExecOptions,
) -> Result<Build, PipelineError>
where
    F: FileSystem,
    C: Compiler + ?Sized,
{
    let mut build = compile_pipeline(resolver, compiler, opts)?;

    skip_steps(&mut build, &opts.skip_steps)?;
    audit_secrets(&build, opts.secret_policy)?;

    info!(
        "Prepared build {} with {} step(s)",
        build.id,
        build.step_count()
    );
    Ok(build)
}
