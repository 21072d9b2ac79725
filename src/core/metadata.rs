//! Build metadata supplied by the caller

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Source-control facts a local build pretends to run for
///
/// Drives both ruleset evaluation at compile time and the `VELA_BUILD_*`
/// variables handed to every step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildMetadata {
    pub branch: String,

    #[serde(default)]
    pub tag: String,

    pub event: String,

    #[serde(default)]
    pub comment: String,

    /// Deployment target
    #[serde(default)]
    pub target: String,

    /// Git reference (e.g. `refs/heads/main`)
    #[serde(default, rename = "ref")]
    pub git_ref: String,

    /// Files changed by this build
    #[serde(default)]
    pub changeset: Vec<String>,
}

impl Default for BuildMetadata {
    fn default() -> Self {
        Self {
            branch: "main".to_string(),
            tag: String::new(),
            event: "push".to_string(),
            comment: String::new(),
            target: String::new(),
            git_ref: String::new(),
            changeset: Vec::new(),
        }
    }
}

impl BuildMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = branch.into();
        self
    }

    pub fn with_event(mut self, event: impl Into<String>) -> Self {
        self.event = event.into();
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    pub fn with_ref(mut self, git_ref: impl Into<String>) -> Self {
        self.git_ref = git_ref.into();
        self
    }

    pub fn with_changeset<I, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.changeset = files.into_iter().map(Into::into).collect();
        self
    }

    /// Reference for the build, derived from branch or tag when not set
    pub fn effective_ref(&self) -> String {
        if !self.git_ref.is_empty() {
            self.git_ref.clone()
        } else if self.event == "tag" && !self.tag.is_empty() {
            format!("refs/tags/{}", self.tag)
        } else {
            format!("refs/heads/{}", self.branch)
        }
    }

    /// Environment variables describing this build
    pub fn environment(&self) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        let git_ref = self.effective_ref();

        for (key, value) in [
            ("BRANCH", &self.branch),
            ("EVENT", &self.event),
            ("TAG", &self.tag),
        ] {
            env.insert(format!("BUILD_{}", key), value.clone());
            env.insert(format!("VELA_BUILD_{}", key), value.clone());
        }

        env.insert("VELA_BUILD_TARGET".to_string(), self.target.clone());
        env.insert("VELA_BUILD_COMMENT".to_string(), self.comment.clone());
        env.insert("VELA_BUILD_REF".to_string(), git_ref);

        env
    }
}
