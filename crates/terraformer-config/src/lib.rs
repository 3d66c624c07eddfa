//! Configuration for the terraformer job.
//!
//! Provides TOML-based configuration with:
//! - The names of the three cluster objects a run works on (configuration
//!   ConfigMap, state ConfigMap, variables Secret) and their namespace
//! - The local working-directory layout ([`PathSet`])
//! - The terraform executable and the finalizer name
//! - Cluster API connection settings ([`KubeSettings`])
//!
//! Resolution order (later overrides earlier):
//! 1. Built-in defaults
//! 2. An optional TOML file (`--config`)
//! 3. CLI arguments and environment variables (handled by the binary)

pub mod discovery;
pub mod error;
pub mod paths;
pub mod types;

pub use discovery::{load_config, load_config_file};
pub use error::{ConfigError, Result};
pub use paths::PathSet;
pub use types::*;
