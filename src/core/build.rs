//! Build domain model
//!
//! A [`Build`] is the compiled, executable form of a pipeline file. It holds
//! either a flat list of steps or a list of stages, never both.

use crate::core::metadata::BuildMetadata;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Name of the step the compiler injects ahead of every build
pub const INIT_STEP_NAME: &str = "init";

/// Image marker for the injected init step (never started as a container)
pub const INIT_IMAGE: &str = "#init";

/// Where the workspace is mounted inside step containers
pub const WORKSPACE_PATH: &str = "/vela/src";

/// A compiled pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Build {
    /// Unique build identifier, also used to name runtime resources
    pub id: String,

    /// Pipeline schema version
    #[serde(default)]
    pub version: String,

    /// Metadata the build was compiled against
    #[serde(default)]
    pub metadata: BuildMetadata,

    /// Long-running containers started before any step
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<Step>,

    /// Steps or stages to run
    pub layout: Layout,
}

/// Shape of the work in a build
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    /// Flat ordered list of steps
    Steps(Vec<Step>),
    /// Ordered list of stages, each with its own steps
    Stages(Vec<Stage>),
}

/// A named group of steps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    pub name: String,

    /// Stages that must finish before this one
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub needs: Vec<String>,

    pub steps: Vec<Step>,
}

/// When to pull a step image
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PullPolicy {
    /// Pull only when the image is not present locally
    #[default]
    NotPresent,
    /// Always pull
    Always,
    /// Never pull
    Never,
}

/// A secret a step expects in its environment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretRef {
    /// Where the secret comes from
    pub source: String,

    /// Environment variable the step reads the secret from
    pub target: String,
}

/// One unit of work: an image plus the commands to run in it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Runtime container name
    #[serde(default)]
    pub id: String,

    pub name: String,

    pub image: String,

    #[serde(default)]
    pub pull: PullPolicy,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub commands: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entrypoint: Vec<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secrets: Vec<SecretRef>,

    /// Keep going when this step exits non-zero
    #[serde(default)]
    pub continue_on_error: bool,

    /// Run in the background (services)
    #[serde(default)]
    pub detach: bool,
}

impl Step {
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: name.clone(),
            name,
            image: image.into(),
            pull: PullPolicy::default(),
            commands: Vec::new(),
            entrypoint: Vec::new(),
            environment: BTreeMap::new(),
            secrets: Vec::new(),
            continue_on_error: false,
            detach: false,
        }
    }

    /// The step the compiler puts in front of every build
    pub fn init() -> Self {
        Self::new(INIT_STEP_NAME, INIT_IMAGE)
    }

    pub fn with_commands<I, S>(mut self, commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.commands = commands.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_secret(mut self, source: impl Into<String>, target: impl Into<String>) -> Self {
        self.secrets.push(SecretRef {
            source: source.into(),
            target: target.into(),
        });
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    /// Whether this is the injected init step
    pub fn is_init(&self) -> bool {
        self.name == INIT_STEP_NAME
    }

    /// Init steps carry a marker image and never start a container
    pub fn is_placeholder(&self) -> bool {
        self.image == INIT_IMAGE
    }
}

impl Stage {
    pub fn new(name: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            name: name.into(),
            needs: Vec::new(),
            steps,
        }
    }
}

impl Build {
    /// Build with a flat step list
    pub fn from_steps(steps: Vec<Step>) -> Self {
        Self::with_layout(Layout::Steps(steps))
    }

    /// Build with stages
    pub fn from_stages(stages: Vec<Stage>) -> Self {
        Self::with_layout(Layout::Stages(stages))
    }

    fn with_layout(layout: Layout) -> Self {
        Self {
            id: String::from("local"),
            version: String::from("1"),
            metadata: BuildMetadata::default(),
            services: Vec::new(),
            layout,
        }
    }

    /// Flat steps, if this build is not staged
    pub fn steps(&self) -> Option<&[Step]> {
        match &self.layout {
            Layout::Steps(steps) => Some(steps),
            Layout::Stages(_) => None,
        }
    }

    /// Stages, if this build is staged
    pub fn stages(&self) -> Option<&[Stage]> {
        match &self.layout {
            Layout::Steps(_) => None,
            Layout::Stages(stages) => Some(stages),
        }
    }

    /// Every step paired with its stage name ("" for flat builds), in run order
    pub fn iter_steps(&self) -> Box<dyn Iterator<Item = (&str, &Step)> + '_> {
        match &self.layout {
            Layout::Steps(steps) => Box::new(steps.iter().map(|s| ("", s))),
            Layout::Stages(stages) => Box::new(
                stages
                    .iter()
                    .flat_map(|stage| stage.steps.iter().map(move |s| (stage.name.as_str(), s))),
            ),
        }
    }

    /// Total number of steps across the build
    pub fn step_count(&self) -> usize {
        self.iter_steps().count()
    }

    /// Names of the steps in run order
    pub fn step_names(&self) -> Vec<&str> {
        self.iter_steps().map(|(_, s)| s.name.as_str()).collect()
    }
}
