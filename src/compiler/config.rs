//! Pipeline configuration from YAML

use crate::compiler::{ruleset::RulesetConfig, CompileError};
use crate::core::{PullPolicy, INIT_STEP_NAME};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use serde_yaml::Value;
use std::collections::{BTreeMap, HashSet};

/// Top-level pipeline configuration loaded from YAML
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Pipeline schema version
    #[serde(default = "default_version")]
    pub version: String,

    /// Variables available to every step and service
    #[serde(default)]
    pub environment: BTreeMap<String, Value>,

    /// Containers running alongside the steps
    #[serde(default)]
    pub services: Vec<StepConfig>,

    /// Flat list of steps (exclusive with `stages`)
    #[serde(default)]
    pub steps: Option<Vec<StepConfig>>,

    /// Named stages in declaration order (exclusive with `steps`)
    #[serde(default, deserialize_with = "stages_in_order")]
    pub stages: Option<Vec<StageConfig>>,
}

/// Stage configuration as defined in YAML
#[derive(Debug, Clone, Deserialize)]
pub struct StageConfig {
    /// Filled from the mapping key
    #[serde(skip)]
    pub name: String,

    /// Stages that must finish first
    #[serde(default, deserialize_with = "one_or_many")]
    pub needs: Vec<String>,

    pub steps: Vec<StepConfig>,
}

/// Step configuration as defined in YAML
#[derive(Debug, Clone, Deserialize)]
pub struct StepConfig {
    pub name: String,

    #[serde(default)]
    pub image: String,

    #[serde(default)]
    pub pull: PullPolicy,

    #[serde(default, deserialize_with = "one_or_many")]
    pub commands: Vec<String>,

    #[serde(default, deserialize_with = "one_or_many")]
    pub entrypoint: Vec<String>,

    #[serde(default)]
    pub environment: BTreeMap<String, Value>,

    #[serde(default)]
    pub secrets: Vec<SecretConfig>,

    /// Conditions deciding whether the step runs
    #[serde(default)]
    pub ruleset: RulesetConfig,

    #[serde(default)]
    pub detach: bool,
}

/// Secret declaration on a step: a bare name or an explicit mapping
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum SecretConfig {
    /// Shorthand: the name is both source and target
    Name(String),
    Mapping { source: String, target: String },
}

impl SecretConfig {
    /// `(source, target)` pair for this declaration
    pub fn pair(&self) -> (String, String) {
        match self {
            SecretConfig::Name(name) => (name.clone(), name.clone()),
            SecretConfig::Mapping { source, target } => (source.clone(), target.clone()),
        }
    }
}

fn default_version() -> String {
    "1".to_string()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

/// Accept either a single string or a list of strings
pub(crate) fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::One(value)) => vec![value],
        Some(OneOrMany::Many(values)) => values,
    })
}

/// Stages are a YAML mapping; keep the declaration order and the key as name
fn stages_in_order<'de, D>(deserializer: D) -> Result<Option<Vec<StageConfig>>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(mapping) = Option::<serde_yaml::Mapping>::deserialize(deserializer)? else {
        return Ok(None);
    };

    let mut stages = Vec::with_capacity(mapping.len());
    for (key, value) in mapping {
        let name = key
            .as_str()
            .ok_or_else(|| D::Error::custom("stage names must be strings"))?
            .to_string();
        let mut stage: StageConfig = serde_yaml::from_value(value)
            .map_err(|e| D::Error::custom(format!("stage '{}': {}", name, e)))?;
        stage.name = name;
        stages.push(stage);
    }

    Ok(Some(stages))
}

/// Render a YAML scalar the way a shell would expect to see it
pub(crate) fn value_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    }
}

impl PipelineConfig {
    /// Parse and validate pipeline configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, CompileError> {
        let config: PipelineConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Global environment rendered to strings
    pub fn environment_strings(&self) -> BTreeMap<String, String> {
        self.environment
            .iter()
            .map(|(k, v)| (k.clone(), value_to_string(v)))
            .collect()
    }

    /// Validate the pipeline configuration
    pub fn validate(&self) -> Result<(), CompileError> {
        match (&self.steps, &self.stages) {
            (Some(_), Some(_)) => {
                return Err(CompileError::invalid(
                    "pipeline cannot define both steps and stages",
                ))
            }
            (None, None) => {
                return Err(CompileError::invalid(
                    "pipeline must define either steps or stages",
                ))
            }
            _ => {}
        }

        validate_steps(&self.services, "services")?;

        if let Some(steps) = &self.steps {
            validate_steps(steps, "steps")?;
        }

        if let Some(stages) = &self.stages {
            let names: HashSet<&str> = stages.iter().map(|s| s.name.as_str()).collect();

            for stage in stages {
                if stage.name.is_empty() {
                    return Err(CompileError::invalid("stage name cannot be empty"));
                }
                if stage.name == INIT_STEP_NAME {
                    return Err(CompileError::invalid(format!(
                        "stage name '{}' is reserved",
                        INIT_STEP_NAME
                    )));
                }
                for need in &stage.needs {
                    if !names.contains(need.as_str()) {
                        return Err(CompileError::invalid(format!(
                            "stage '{}' needs non-existent stage '{}'",
                            stage.name, need
                        )));
                    }
                }
                validate_steps(&stage.steps, &format!("stage '{}'", stage.name))?;
            }

            self.check_cycles(stages)?;
        }

        Ok(())
    }

    /// Check for cycles in the stage `needs` graph
    fn check_cycles(&self, stages: &[StageConfig]) -> Result<(), CompileError> {
        let mut visited = HashSet::new();
        let mut recursion_stack = HashSet::new();

        for stage in stages {
            if !visited.contains(&stage.name) {
                dfs_check(stages, &stage.name, &mut visited, &mut recursion_stack)?;
            }
        }

        Ok(())
    }

    /// Stages ordered so every stage comes after the stages it needs
    ///
    /// Among stages whose needs are met, declaration order wins.
    pub fn ordered_stages(&self) -> Vec<&StageConfig> {
        let Some(stages) = &self.stages else {
            return Vec::new();
        };

        let mut placed: HashSet<&str> = HashSet::new();
        let mut ordered = Vec::with_capacity(stages.len());

        while ordered.len() < stages.len() {
            let next = stages.iter().find(|s| {
                !placed.contains(s.name.as_str())
                    && s.needs.iter().all(|n| placed.contains(n.as_str()))
            });

            // validate() rejects cycles, so a ready stage always exists
            let Some(stage) = next else { break };
            placed.insert(stage.name.as_str());
            ordered.push(stage);
        }

        ordered
    }
}

fn dfs_check(
    stages: &[StageConfig],
    name: &str,
    visited: &mut HashSet<String>,
    recursion_stack: &mut HashSet<String>,
) -> Result<(), CompileError> {
    visited.insert(name.to_string());
    recursion_stack.insert(name.to_string());

    if let Some(stage) = stages.iter().find(|s| s.name == name) {
        for need in &stage.needs {
            if recursion_stack.contains(need) {
                return Err(CompileError::invalid(format!(
                    "cycle detected in stage needs involving '{}'",
                    need
                )));
            }
            if !visited.contains(need) {
                dfs_check(stages, need, visited, recursion_stack)?;
            }
        }
    }

    recursion_stack.remove(name);
    Ok(())
}

fn validate_steps(steps: &[StepConfig], scope: &str) -> Result<(), CompileError> {
    let mut seen = HashSet::new();

    for step in steps {
        if step.name.is_empty() {
            return Err(CompileError::invalid(format!(
                "{}: step name cannot be empty",
                scope
            )));
        }
        if step.name == INIT_STEP_NAME {
            return Err(CompileError::invalid(format!(
                "{}: step name '{}' is reserved",
                scope, INIT_STEP_NAME
            )));
        }
        if step.image.is_empty() {
            return Err(CompileError::invalid(format!(
                "{}: step '{}' has no image",
                scope, step.name
            )));
        }
        if !seen.insert(step.name.as_str()) {
            return Err(CompileError::invalid(format!(
                "{}: duplicate step name '{}'",
                scope, step.name
            )));
        }
    }

    Ok(())
}
