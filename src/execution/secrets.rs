//! Checks that secrets referenced by steps are present in the environment

use crate::core::Build;
use crate::error::PipelineError;
use std::collections::BTreeMap;
use tracing::warn;

/// What to do when a step references a secret that is not set
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SecretPolicy {
    /// Log each missing secret and keep going
    #[default]
    Warn,
    /// Refuse to run the build
    Fail,
}

/// Human-readable location of a step, e.g. `[stage: test][step: unit]`
pub fn format_step_identifier(stage: &str, step: &str) -> String {
    match (stage.is_empty(), step.is_empty()) {
        (false, _) => format!("[stage: {}][step: {}]", stage, step),
        (true, false) => format!("[step: {}]", step),
        (true, true) => String::new(),
    }
}

/// Secrets referenced by `build` that are unset or empty in the process environment
pub fn collect_missing_secrets(build: Option<&Build>) -> BTreeMap<String, String> {
    collect_missing_secrets_with(build, |name| std::env::var(name).ok())
}

/// Like [`collect_missing_secrets`], reading values through `lookup`
///
/// Keys are step identifiers, values the environment variable that is missing.
/// A step with several missing secrets keeps only the last one.
pub fn collect_missing_secrets_with<L>(build: Option<&Build>, lookup: L) -> BTreeMap<String, String>
where
    L: Fn(&str) -> Option<String>,
{
    let mut missing = BTreeMap::new();
    let Some(build) = build else {
        return missing;
    };

    for (stage, step) in build.iter_steps() {
        for secret in &step.secrets {
            let set = lookup(&secret.target).is_some_and(|value| !value.is_empty());
            if !set {
                missing.insert(
                    format_step_identifier(stage, &step.name),
                    secret.target.clone(),
                );
            }
        }
    }

    missing
}

/// Audit `build` and apply `policy` to the findings
pub fn audit_secrets(
    build: &Build,
    policy: SecretPolicy,
) -> Result<BTreeMap<String, String>, PipelineError> {
    audit_secrets_with(build, policy, |name| std::env::var(name).ok())
}

pub fn audit_secrets_with<L>(
    build: &Build,
    policy: SecretPolicy,
    lookup: L,
) -> Result<BTreeMap<String, String>, PipelineError>
where
    L: Fn(&str) -> Option<String>,
{
    let missing = collect_missing_secrets_with(Some(build), lookup);

    for (location, target) in &missing {
        warn!("{} missing secret {} in environment", location, target);
    }

    if policy == SecretPolicy::Fail && !missing.is_empty() {
        return Err(PipelineError::MissingSecrets { missing });
    }

    Ok(missing)
}
