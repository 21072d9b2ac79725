//! Pipeline file discovery

use crate::error::PipelineError;
use std::io;
use std::path::{Path, PathBuf};

/// Default pipeline file name
pub const DEFAULT_PIPELINE_FILE: &str = ".vela.yml";

/// Alternate extension probed when the default file is missing
const ALTERNATE_PIPELINE_FILE: &str = ".vela.yaml";

/// Filesystem operations the pipeline loader needs
pub trait FileSystem: Send + Sync {
    fn exists(&self, path: &Path) -> bool;

    fn read_to_string(&self, path: &Path) -> io::Result<String>;
}

/// The host filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct OsFileSystem;

impl FileSystem for OsFileSystem {
    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }
}

/// Locates the pipeline file on disk
#[derive(Debug, Clone, Default)]
pub struct PathResolver<F = OsFileSystem> {
    fs: F,
}

impl<F: FileSystem> PathResolver<F> {
    pub fn new(fs: F) -> Self {
        Self { fs }
    }

    pub fn fs(&self) -> &F {
        &self.fs
    }

    /// Resolve `file` inside `override_dir`, or `base` when no override is given
    ///
    /// Only `.vela.yml` falls back to its `.vela.yaml` sibling; any other
    /// name must exist exactly as given.
    pub fn resolve(
        &self,
        base: &Path,
        override_dir: Option<&Path>,
        file: &str,
    ) -> Result<PathBuf, PipelineError> {
        let dir = override_dir.unwrap_or(base);
        let path = dir.join(file);

        if self.fs.exists(&path) {
            return Ok(path);
        }

        if file == DEFAULT_PIPELINE_FILE {
            let alternate = dir.join(ALTERNATE_PIPELINE_FILE);
            if self.fs.exists(&alternate) {
                tracing::debug!(
                    "{} not found, using {}",
                    path.display(),
                    alternate.display()
                );
                return Ok(alternate);
            }
        }

        Err(PipelineError::FileNotFound { path })
    }
}
