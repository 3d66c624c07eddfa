//! Operations and terraform steps.
//!
//! [`Operation`] is what a caller may request. [`StepKind`] is what actually
//! runs; `init`, `plan` and `state replace-provider` only ever appear as steps
//! produced by the sequencer and cannot be requested directly.

use std::fmt;
use std::str::FromStr;

use terraformer_config::PathSet;

use crate::error::TerraformerError;

/// Registry namespace terraform < 0.13 recorded for providers.
const LEGACY_PROVIDER_NAMESPACE: &str = "registry.terraform.io/-";

/// Registry namespace providers are migrated to.
const PROVIDER_NAMESPACE: &str = "registry.terraform.io/hashicorp";

/// An externally invocable operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Apply,
    Destroy,
    Validate,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Apply => "apply",
            Operation::Destroy => "destroy",
            Operation::Validate => "validate",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = TerraformerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "apply" => Ok(Operation::Apply),
            "destroy" => Ok(Operation::Destroy),
            "validate" => Ok(Operation::Validate),
            other => Err(TerraformerError::UnsupportedOperation(other.to_string())),
        }
    }
}

/// One kind of terraform invocation within a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepKind {
    Init,
    /// Rewrite a pre-0.13 provider address in the state.
    ReplaceProvider { provider: String },
    Apply,
    Destroy,
    Validate,
    Plan,
}

impl StepKind {
    /// Terraform subcommand of this step.
    pub fn command(&self) -> &'static str {
        match self {
            StepKind::Init => "init",
            StepKind::ReplaceProvider { .. } => "state",
            StepKind::Apply => "apply",
            StepKind::Destroy => "destroy",
            StepKind::Validate => "validate",
            StepKind::Plan => "plan",
        }
    }
}

impl From<Operation> for StepKind {
    fn from(operation: Operation) -> Self {
        match operation {
            Operation::Apply => StepKind::Apply,
            Operation::Destroy => StepKind::Destroy,
            Operation::Validate => StepKind::Validate,
        }
    }
}

impl TryFrom<&StepKind> for Operation {
    type Error = TerraformerError;

    fn try_from(kind: &StepKind) -> Result<Self, Self::Error> {
        match kind {
            StepKind::Apply => Ok(Operation::Apply),
            StepKind::Destroy => Ok(Operation::Destroy),
            StepKind::Validate => Ok(Operation::Validate),
            StepKind::Init | StepKind::Plan | StepKind::ReplaceProvider { .. } => Err(
                TerraformerError::UnsupportedOperation(kind.command().to_string()),
            ),
        }
    }
}

/// A terraform invocation with its fixed argument vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub kind: StepKind,
    pub args: Vec<String>,
}

impl Step {
    /// Render the argument vector for `kind` against the working-directory
    /// layout.
    pub fn new(kind: StepKind, paths: &PathSet) -> Self {
        let config_dir = paths.config_dir.display().to_string();
        let var_file = format!("-var-file={}", paths.vars_path().display());
        let state = format!("-state={}", paths.state_path().display());

        let mut args: Vec<String> = Vec::new();
        match &kind {
            StepKind::Init => {
                args.extend(["init".to_string(), "-input=false".to_string()]);
                if paths.providers_dir.is_dir() {
                    args.push(format!("-plugin-dir={}", paths.providers_dir.display()));
                }
                args.push(config_dir);
            }
            StepKind::ReplaceProvider { provider } => {
                args.extend([
                    "state".to_string(),
                    "replace-provider".to_string(),
                    "-auto-approve".to_string(),
                    state,
                    format!("{}/{}", LEGACY_PROVIDER_NAMESPACE, provider),
                    format!("{}/{}", PROVIDER_NAMESPACE, provider),
                ]);
            }
            StepKind::Apply | StepKind::Destroy => {
                args.extend([
                    kind.command().to_string(),
                    "-input=false".to_string(),
                    "-auto-approve".to_string(),
                    var_file,
                    state,
                    config_dir,
                ]);
            }
            StepKind::Validate => {
                args.extend(["validate".to_string(), config_dir]);
            }
            StepKind::Plan => {
                args.extend([
                    "plan".to_string(),
                    "-input=false".to_string(),
                    var_file,
                    state,
                    config_dir,
                ]);
            }
        }

        Self { kind, args }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.args.join(" "))
    }
}
