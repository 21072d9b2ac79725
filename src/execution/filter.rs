//! Removing user-selected steps from a compiled build

use crate::core::{Build, Layout, Step};
use crate::error::FilterError;
use tracing::debug;

/// Remove every step named in `names`, flat or from every stage
///
/// Fails when nothing but the injected `init` step would be left. The build
/// is modified in place and is not restored on error.
pub fn skip_steps(build: &mut Build, names: &[String]) -> Result<(), FilterError> {
    let skipped = |step: &Step| names.iter().any(|name| *name == step.name);

    match &mut build.layout {
        Layout::Steps(steps) => steps.retain(|step| !skipped(step)),
        Layout::Stages(stages) => {
            for stage in stages.iter_mut() {
                stage.steps.retain(|step| !skipped(step));
            }
        }
    }

    let remaining = build.iter_steps().filter(|(_, step)| !step.is_init()).count();
    debug!("{} step(s) left to run after skipping {:?}", remaining, names);

    if remaining == 0 {
        return Err(FilterError {
            skipped: names.to_vec(),
        });
    }

    Ok(())
}
