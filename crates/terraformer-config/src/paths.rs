//! Local working-directory layout.
//!
//! The job materializes cluster content into a fixed set of paths before
//! running terraform. The defaults match the volume mounts of the job pod:
//!
//! ```toml
//! [paths]
//! config_dir = "/tf"
//! vars_dir = "/tfvars"
//! state_dir = "/tfstate"
//! providers_dir = "/terraform-providers"
//! termination_message_path = "/terraform-termination-log"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// File name of the main terraform configuration.
pub const MAIN_FILE: &str = "main.tf";

/// File name of the variable declarations.
pub const VARIABLES_FILE: &str = "variables.tf";

/// File name of the variable values.
pub const TFVARS_FILE: &str = "terraform.tfvars";

/// File name of the terraform state.
pub const STATE_FILE: &str = "terraform.tfstate";

/// Set of local paths the job reads and writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathSet {
    /// Directory holding `main.tf` and `variables.tf`.
    pub config_dir: PathBuf,
    /// Directory holding `terraform.tfvars`.
    pub vars_dir: PathBuf,
    /// Directory holding `terraform.tfstate`.
    pub state_dir: PathBuf,
    /// Pre-installed provider plugins (passed to `init -plugin-dir`).
    pub providers_dir: PathBuf,
    /// Where the output of a failing terraform command is written.
    pub termination_message_path: PathBuf,
}

impl Default for PathSet {
    fn default() -> Self {
        Self {
            config_dir: PathBuf::from("/tf"),
            vars_dir: PathBuf::from("/tfvars"),
            state_dir: PathBuf::from("/tfstate"),
            providers_dir: PathBuf::from("/terraform-providers"),
            termination_message_path: PathBuf::from("/terraform-termination-log"),
        }
    }
}

impl PathSet {
    /// Re-root every path below `base_dir`.
    ///
    /// Absolute default paths keep their relative shape, so `/tf` becomes
    /// `<base_dir>/tf`.
    pub fn with_base_dir(self, base_dir: impl AsRef<Path>) -> Self {
        let base = base_dir.as_ref();
        let rebase = |p: PathBuf| base.join(p.strip_prefix("/").unwrap_or(&p));
        Self {
            config_dir: rebase(self.config_dir),
            vars_dir: rebase(self.vars_dir),
            state_dir: rebase(self.state_dir),
            providers_dir: rebase(self.providers_dir),
            termination_message_path: rebase(self.termination_message_path),
        }
    }

    /// Path of `main.tf`.
    pub fn main_path(&self) -> PathBuf {
        self.config_dir.join(MAIN_FILE)
    }

    /// Path of `variables.tf`.
    pub fn variables_path(&self) -> PathBuf {
        self.config_dir.join(VARIABLES_FILE)
    }

    /// Path of `terraform.tfvars`.
    pub fn vars_path(&self) -> PathBuf {
        self.vars_dir.join(TFVARS_FILE)
    }

    /// Path of `terraform.tfstate`.
    pub fn state_path(&self) -> PathBuf {
        self.state_dir.join(STATE_FILE)
    }
}
