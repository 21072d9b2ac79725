//! Pipeline compilation
//!
//! The [`Compiler`] capability turns pipeline source into a [`Build`]. The
//! built-in [`YamlCompiler`] understands the YAML subset described in
//! [`config`]; other pipeline types are rejected.

pub mod config;
pub mod ruleset;
pub mod yaml;

use crate::core::{Build, BuildMetadata};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub use config::PipelineConfig;
pub use ruleset::{RuleData, Ruleset};
pub use yaml::YamlCompiler;

/// Error types for compilation
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("invalid YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("{0}")]
    Invalid(String),

    #[error("pipeline type `{0}` is not supported by this compiler")]
    UnsupportedType(PipelineType),
}

impl CompileError {
    pub fn invalid(message: impl Into<String>) -> Self {
        CompileError::Invalid(message.into())
    }
}

/// Language the pipeline file is written in
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PipelineType {
    #[default]
    Yaml,
    Go,
    Starlark,
}

impl fmt::Display for PipelineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PipelineType::Yaml => "yaml",
            PipelineType::Go => "go",
            PipelineType::Starlark => "starlark",
        })
    }
}

impl FromStr for PipelineType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "" | "yaml" | "yml" => Ok(PipelineType::Yaml),
            "go" | "golang" => Ok(PipelineType::Go),
            "starlark" | "star" | "py" => Ok(PipelineType::Starlark),
            other => Err(format!("unknown pipeline type: {}", other)),
        }
    }
}

/// Trait for compilers - turns pipeline source into an executable build
pub trait Compiler: Send + Sync {
    /// Compile `source` for a build described by `metadata`
    fn compile(&self, source: &str, metadata: &BuildMetadata) -> Result<Build, CompileError>;

    /// Whether this compiler understands the given pipeline type
    fn supports(&self, kind: PipelineType) -> bool {
        kind == PipelineType::Yaml
    }
}
