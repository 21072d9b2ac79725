//! Test: skipping steps before a build runs

use crate::helpers::*;
use vela::compiler::YamlCompiler;
use vela::core::PathResolver;
use vela::execution::{prepare_build, ExecOptions};
use vela::PipelineError;

const STAGED: &str = r#"
version: "1"
stages:
  build:
    steps:
      - name: compile
        image: rust:1
        commands: [cargo build]
  test:
    needs: [build]
    steps:
      - name: unit
        image: rust:1
        commands: [cargo test]
      - name: lint
        image: rust:1
        commands: [cargo clippy]
"#;

fn resolver(contents: &str) -> PathResolver<MemoryFileSystem> {
    PathResolver::new(MemoryFileSystem::new().with_file("/repo/.vela.yml", contents))
}

fn skip(names: &[&str]) -> ExecOptions {
    ExecOptions::new("/repo").with_skip_steps(names.iter().map(|s| s.to_string()).collect())
}

/// Named steps disappear from every stage; the rest keep their order
#[test]
fn test_skip_in_stages() {
    let build = prepare_build(&resolver(STAGED), &YamlCompiler::new(), &skip(&["lint"])).unwrap();

    assert_eq!(build.step_names(), vec!["init", "compile", "unit"]);
}

/// Skipping a whole stage's worth of steps keeps the (now empty) stage
#[test]
fn test_emptied_stage_is_kept() {
    let build =
        prepare_build(&resolver(STAGED), &YamlCompiler::new(), &skip(&["unit", "lint"])).unwrap();

    let stages = build.stages().unwrap();
    assert_eq!(stages.len(), 3);
    assert!(stages[2].steps.is_empty());
    assert_eq!(build.step_names(), vec!["init", "compile"]);
}

/// Leaving only `init` behind is refused before anything runs
#[test]
fn test_skipping_everything_fails() {
    let err = prepare_build(
        &resolver(STAGED),
        &YamlCompiler::new(),
        &skip(&["compile", "unit", "lint"]),
    )
    .unwrap_err();

    match err {
        PipelineError::Filter(e) => {
            assert_eq!(e.skipped, vec!["compile", "unit", "lint"]);
            assert!(e.to_string().contains("no steps left to run"));
        }
        other => panic!("unexpected error: {}", other),
    }
}

/// `init` can be named like any other step; only real steps count toward what is left
#[test]
fn test_skipping_init_by_name() {
    let yaml = "steps: [{ name: test, image: alpine }]";

    let build = prepare_build(&resolver(yaml), &YamlCompiler::new(), &skip(&["init"])).unwrap();
    assert_eq!(build.step_names(), vec!["test"]);
}
