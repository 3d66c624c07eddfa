//! Terraform execution engine.
//!
//! A [`Terraformer`] performs one operation (`apply`, `destroy` or
//! `validate`) for a set of cluster objects:
//!
//! 1. fetch configuration, variables and state from the cluster
//! 2. expand the operation into terraform steps ([`sequencer`])
//! 3. add finalizers and write the files terraform expects
//! 4. run each step as a child process, relaying SIGINT/SIGTERM to it
//! 5. store the resulting state, and on a successful destroy release the
//!    finalizers
//!
//! A failing step still has its state stored (best effort), its output
//! written as termination message, and its exit code surfaced through
//! [`TerraformerError::exit_code`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use terraformer_config::TerraformerConfig;
//! use terraformer_core::{OsSignals, Terraformer};
//! use terraformer_kube::KubeClient;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = TerraformerConfig::new()
//!     .with_namespace("shoot--dev--a")
//!     .with_object_names("infra.tf-config", "infra.tf-state", "infra.tf-vars");
//! let client = KubeClient::from_settings(&config.kube)?;
//!
//! let terraformer = Terraformer::new(config, Arc::new(client), Arc::new(OsSignals));
//! terraformer.run_command("apply").await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod fetch;
pub mod finalizer;
pub mod operation;
pub mod report;
pub mod runner;
pub mod sequencer;
pub mod signal;
pub mod state;
pub mod terraformer;

pub use error::{Result, TerraformerError};
pub use fetch::{FetchedObjects, ObjectRefs};
pub use finalizer::FinalizerManager;
pub use operation::{Operation, Step, StepKind};
pub use report::TerminationReport;
pub use runner::{ActiveProcess, ProcessRunner, RunResult, StepFailure};
pub use sequencer::RunPlan;
pub use signal::{ChannelSignals, OsSignals, RelaySignal, SignalRelay, SignalSource};
pub use state::{
    Persisted, PersistedState, STATE_KEY, StateFormat, StateSynchronizer, StateVersion,
};
pub use terraformer::Terraformer;
