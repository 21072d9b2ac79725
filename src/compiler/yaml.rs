//! Built-in compiler for YAML pipelines

use crate::compiler::config::{value_to_string, PipelineConfig, StepConfig};
use crate::compiler::{CompileError, Compiler, RuleData};
use crate::core::{
    Build, BuildMetadata, Layout, SecretRef, Stage, Step, INIT_STEP_NAME, WORKSPACE_PATH,
};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;
use uuid::Uuid;

/// Compiles the YAML pipeline subset into a [`Build`]
#[derive(Debug, Clone, Default)]
pub struct YamlCompiler {
    build_id: Option<String>,
}

impl YamlCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a fixed build id instead of a random one
    pub fn with_build_id(mut self, build_id: impl Into<String>) -> Self {
        self.build_id = Some(build_id.into());
        self
    }

    fn build_id(&self) -> String {
        self.build_id.clone().unwrap_or_else(|| {
            let id = Uuid::new_v4().simple().to_string();
            format!("vela-{}", &id[..8])
        })
    }
}

impl Compiler for YamlCompiler {
    fn compile(&self, source: &str, metadata: &BuildMetadata) -> Result<Build, CompileError> {
        let config = PipelineConfig::from_yaml(source)?;
        let build_id = self.build_id();
        let data = RuleData::from(metadata);

        let base_env = config.environment_strings();
        let generated = generated_environment(metadata);

        let mut services: Vec<Step> = config
            .services
            .iter()
            .map(|service| {
                let mut step = convert_step(service, &build_id, "service", &base_env, &generated);
                step.detach = true;
                step
            })
            .collect();

        let mut layout = if config.stages.is_some() {
            let mut stages = vec![Stage::new(
                INIT_STEP_NAME,
                vec![init_step(&build_id, INIT_STEP_NAME)],
            )];

            for stage_config in config.ordered_stages() {
                let mut steps = Vec::with_capacity(stage_config.steps.len());
                for step_config in &stage_config.steps {
                    if let Some(step) = compile_step(
                        step_config,
                        &build_id,
                        &stage_config.name,
                        &base_env,
                        &generated,
                        &data,
                    )? {
                        steps.push(step);
                    }
                }

                if steps.is_empty() {
                    debug!("Dropping stage {} - no steps match the ruleset", stage_config.name);
                    continue;
                }

                stages.push(Stage {
                    name: stage_config.name.clone(),
                    needs: stage_config.needs.clone(),
                    steps,
                });
            }

            Layout::Stages(stages)
        } else {
            let mut steps = vec![init_step(&build_id, "")];
            for step_config in config.steps.iter().flatten() {
                if let Some(step) =
                    compile_step(step_config, &build_id, "", &base_env, &generated, &data)?
                {
                    steps.push(step);
                }
            }

            Layout::Steps(steps)
        };

        assign_unique_ids(&mut services, &mut layout);

        Ok(Build {
            id: build_id,
            version: config.version,
            metadata: metadata.clone(),
            services,
            layout,
        })
    }
}

/// Convert a step, or `None` when its ruleset rules it out for this build
fn compile_step(
    config: &StepConfig,
    build_id: &str,
    stage: &str,
    base_env: &BTreeMap<String, String>,
    generated: &BTreeMap<String, String>,
    data: &RuleData<'_>,
) -> Result<Option<Step>, CompileError> {
    let ruleset = config.ruleset.compile()?;
    if !ruleset.matches(data) {
        debug!("Skipping step {} - ruleset does not match", config.name);
        return Ok(None);
    }

    let mut step = convert_step(config, build_id, stage, base_env, generated);
    step.continue_on_error = ruleset.continue_on_error();
    Ok(Some(step))
}

fn convert_step(
    config: &StepConfig,
    build_id: &str,
    stage: &str,
    base_env: &BTreeMap<String, String>,
    generated: &BTreeMap<String, String>,
) -> Step {
    let mut environment = base_env.clone();
    environment.extend(
        config
            .environment
            .iter()
            .map(|(k, v)| (k.clone(), value_to_string(v))),
    );
    environment.extend(generated.clone());

    Step {
        id: container_name(build_id, stage, &config.name),
        name: config.name.clone(),
        image: config.image.clone(),
        pull: config.pull,
        commands: config.commands.clone(),
        entrypoint: config.entrypoint.clone(),
        environment,
        secrets: config
            .secrets
            .iter()
            .map(|secret| {
                let (source, target) = secret.pair();
                SecretRef { source, target }
            })
            .collect(),
        continue_on_error: false,
        detach: config.detach,
    }
}

fn init_step(build_id: &str, stage: &str) -> Step {
    let mut step = Step::init();
    step.id = container_name(build_id, stage, INIT_STEP_NAME);
    step
}

/// Variables every container sees; these override user-supplied values
fn generated_environment(metadata: &BuildMetadata) -> BTreeMap<String, String> {
    let mut env = metadata.environment();
    env.insert("CI".to_string(), "true".to_string());
    env.insert("VELA".to_string(), "true".to_string());
    env.insert("VELA_WORKSPACE".to_string(), WORKSPACE_PATH.to_string());
    env
}

/// Suffix container names that sanitize to the same value, in run order
fn assign_unique_ids(services: &mut [Step], layout: &mut Layout) {
    let steps: Box<dyn Iterator<Item = &mut Step> + '_> = match layout {
        Layout::Steps(steps) => Box::new(steps.iter_mut()),
        Layout::Stages(stages) => Box::new(stages.iter_mut().flat_map(|s| s.steps.iter_mut())),
    };

    let mut used = BTreeSet::new();
    for step in services.iter_mut().chain(steps) {
        let base = step.id.clone();
        let mut n = 2;
        while !used.insert(step.id.clone()) {
            step.id = format!("{}-{}", base, n);
            n += 1;
        }
        if step.id != base {
            debug!("Container name {} is taken, using {}", base, step.id);
        }
    }
}

/// Runtime-safe container name built from the build id, stage and step name
fn container_name(build_id: &str, stage: &str, name: &str) -> String {
    [build_id, stage, name]
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("_")
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect()
}
