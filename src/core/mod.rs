//! Core domain models for local builds
//!
//! This module defines the compiled build graph, the metadata it was
//! compiled against, the shared execution context and lifecycle states.

pub mod build;
pub mod context;
pub mod metadata;
pub mod path;
pub mod state;

pub use build::*;
pub use context::*;
pub use metadata::*;
pub use path::{FileSystem, OsFileSystem, PathResolver, DEFAULT_PIPELINE_FILE};
pub use state::*;
