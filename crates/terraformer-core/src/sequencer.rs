//! Expansion of an operation into the ordered terraform steps of a run.

use crate::operation::{Operation, StepKind};
use crate::state::{PersistedState, StateFormat};

/// Provider migrated when a legacy state references none by name.
pub const DEFAULT_LEGACY_PROVIDER: &str = "aws";

/// Ordered, immutable list of steps for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunPlan {
    steps: Vec<StepKind>,
}

impl RunPlan {
    /// A plan that runs nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn steps(&self) -> &[StepKind] {
        &self.steps
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Subcommands in order, e.g. `["init", "apply"]`.
    pub fn commands(&self) -> Vec<&'static str> {
        self.steps.iter().map(StepKind::command).collect()
    }
}

/// Steps for `operation` given the format of the stored state.
///
/// `init` always comes first. A legacy state gets exactly one
/// `state replace-provider` step right after `init`, whether or not any
/// provider could be read from it. `validate` is followed by a `plan`.
pub fn plan(operation: Operation, format: &StateFormat) -> RunPlan {
    let mut steps = vec![StepKind::Init];

    if format.is_legacy() {
        let provider = format
            .legacy_providers
            .first()
            .map_or(DEFAULT_LEGACY_PROVIDER, String::as_str);
        steps.push(StepKind::ReplaceProvider {
            provider: provider.to_string(),
        });
    }

    steps.push(StepKind::from(operation));
    if operation == Operation::Validate {
        steps.push(StepKind::Plan);
    }

    RunPlan { steps }
}

/// Like [`plan`], but destroying an empty state yields an empty plan: there
/// is nothing to tear down, so no terraform process is started.
pub fn plan_run(operation: Operation, state: &PersistedState) -> RunPlan {
    if operation == Operation::Destroy && state.is_empty() {
        return RunPlan::empty();
    }
    plan(operation, &state.format())
}
