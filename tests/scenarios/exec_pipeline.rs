//! Test: locating and compiling the pipeline file

use crate::helpers::*;
use std::path::PathBuf;
use vela::compiler::{CompileError, YamlCompiler};
use vela::core::{BuildMetadata, OsFileSystem, PathResolver};
use vela::execution::{compile_pipeline, prepare_build, ExecOptions};
use vela::PipelineError;

const PIPELINE: &str = r#"
steps:
  - name: test
    image: alpine
    commands: [echo test]
  - name: deploy
    image: alpine
    commands: [echo deploy]
    ruleset:
      branch: main
      event: tag
"#;

/// `.vela.yml` falls back to `.vela.yaml`
#[test]
fn test_default_file_falls_back_to_yaml_extension() {
    let fs = MemoryFileSystem::new().with_file("/repo/.vela.yaml", PIPELINE);
    let resolver = PathResolver::new(fs);

    let build = prepare_build(&resolver, &YamlCompiler::new(), &ExecOptions::new("/repo")).unwrap();
    assert_eq!(build.step_names(), vec!["init", "test"]);
}

/// Custom file names are used exactly as given
#[test]
fn test_custom_file_has_no_fallback() {
    let fs = MemoryFileSystem::new().with_file("/repo/ci.yaml", PIPELINE);
    let resolver = PathResolver::new(fs);
    let opts = ExecOptions::new("/repo").with_file("ci.yml");

    match prepare_build(&resolver, &YamlCompiler::new(), &opts).unwrap_err() {
        PipelineError::FileNotFound { path } => assert_eq!(path, PathBuf::from("/repo/ci.yml")),
        other => panic!("unexpected error: {}", other),
    }
}

/// `--path` replaces the working directory
#[test]
fn test_override_dir() {
    let fs = MemoryFileSystem::new()
        .with_file("/elsewhere/.vela.yml", PIPELINE)
        .with_file("/repo/.vela.yml", "not: [valid");
    let resolver = PathResolver::new(fs);
    let opts = ExecOptions::new("/repo").with_override_dir("/elsewhere");

    assert!(prepare_build(&resolver, &YamlCompiler::new(), &opts).is_ok());
}

/// Build metadata decides which ruleset-guarded steps are compiled in
#[test]
fn test_metadata_selects_steps() {
    let fs = MemoryFileSystem::new().with_file("/repo/.vela.yml", PIPELINE);
    let resolver = PathResolver::new(fs);
    let opts = ExecOptions::new("/repo")
        .with_metadata(BuildMetadata::new().with_event("tag").with_tag("v2.0.0"));

    let build = prepare_build(&resolver, &YamlCompiler::new(), &opts).unwrap();
    assert_eq!(build.step_names(), vec!["init", "test", "deploy"]);
    assert_eq!(
        build.steps().unwrap()[2].environment["VELA_BUILD_REF"],
        "refs/tags/v2.0.0"
    );
}

/// Compiler errors carry the file they came from
#[test]
fn test_compile_error_names_file() {
    let fs = MemoryFileSystem::new().with_file(
        "/repo/.vela.yml",
        "steps: [{ name: init, image: alpine }]",
    );
    let resolver = PathResolver::new(fs);

    match compile_pipeline(&resolver, &YamlCompiler::new(), &ExecOptions::new("/repo")).unwrap_err() {
        PipelineError::Compile { path, source } => {
            assert_eq!(path, PathBuf::from("/repo/.vela.yml"));
            assert!(matches!(source, CompileError::Invalid(_)));
        }
        other => panic!("unexpected error: {}", other),
    }
}

/// Reading the resolved path goes through the real filesystem in production
#[test]
fn test_os_filesystem_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(".vela.yml"), PIPELINE).unwrap();

    let resolver = PathResolver::new(OsFileSystem);
    let opts = ExecOptions::new(dir.path()).with_skip_steps(vec!["deploy".to_string()]);

    let build = prepare_build(&resolver, &YamlCompiler::new(), &opts).unwrap();
    assert_eq!(build.step_count(), 2);
}
