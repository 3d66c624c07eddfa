//! The run orchestrator.

use std::sync::Arc;

use terraformer_config::TerraformerConfig;
use terraformer_kube::ObjectStore;

use crate::error::{Result, TerraformerError};
use crate::fetch::{ObjectRefs, fetch, materialize};
use crate::finalizer::FinalizerManager;
use crate::operation::{Operation, Step};
use crate::report::TerminationReport;
use crate::runner::{ActiveProcess, ProcessRunner, RunResult, StepFailure};
use crate::sequencer::plan_run;
use crate::signal::{SignalRelay, SignalSource};
use crate::state::StateSynchronizer;

/// Runs one terraform operation against the configured cluster objects.
///
/// Everything the run touches from the outside world (cluster access, the
/// terraform executable, signal delivery) is supplied at construction.
pub struct Terraformer {
    config: TerraformerConfig,
    refs: ObjectRefs,
    store: Arc<dyn ObjectStore>,
    signals: Arc<dyn SignalSource>,
    finalizers: FinalizerManager,
    state: StateSynchronizer,
    report: TerminationReport,
}

impl Terraformer {
    pub fn new(
        config: TerraformerConfig,
        store: Arc<dyn ObjectStore>,
        signals: Arc<dyn SignalSource>,
    ) -> Self {
        let refs = ObjectRefs::from_config(&config);
        let finalizers = FinalizerManager::new(store.clone(), config.finalizer.clone());
        let state = StateSynchronizer::new(
            store.clone(),
            refs.state.clone(),
            config.paths.state_path(),
        );
        let report = TerminationReport::new(&config.paths.termination_message_path);

        Self {
            config,
            refs,
            store,
            signals,
            finalizers,
            state,
            report,
        }
    }

    /// Parse `command` and run it. Only `apply`, `destroy` and `validate` are
    /// accepted.
    pub async fn run_command(&self, command: &str) -> Result<()> {
        let operation: Operation = command.parse()?;
        self.run(operation).await
    }

    /// Run `operation` to completion.
    pub async fn run(&self, operation: Operation) -> Result<()> {
        tracing::info!(
            operation = %operation,
            namespace = %self.config.namespace,
            "starting terraformer run"
        );

        self.report.reset().await?;

        let fetched = fetch(self.store.as_ref(), &self.refs).await?;
        let plan = plan_run(operation, &fetched.state);
        if plan.is_empty() {
            tracing::info!(operation = %operation, "state is empty, nothing to do");
            self.finalizers.release(&self.refs).await?;
            return Ok(());
        }
        tracing::debug!(steps = ?plan.commands(), "planned terraform commands");

        self.finalizers.acquire(&self.refs).await?;
        materialize(&fetched, &self.config.paths).await?;

        let active = ActiveProcess::new();
        let _relay = SignalRelay::start(self.signals.as_ref(), active.clone())?;
        let runner = ProcessRunner::new(
            &self.config.terraform_binary,
            &self.config.paths.config_dir,
            active,
        );

        for kind in plan.steps() {
            let step = Step::new(kind.clone(), &self.config.paths);
            match runner.execute(&step).await {
                Ok(RunResult::Success) => {}
                Ok(RunResult::Failure(failure)) => return Err(self.fail(&step, failure).await),
                Err(e) => {
                    self.final_state_update().await;
                    return Err(e);
                }
            }
        }

        self.state.persist().await?;

        if operation == Operation::Destroy {
            self.finalizers.release(&self.refs).await?;
        }

        tracing::info!(operation = %operation, "terraformer run finished successfully");
        Ok(())
    }

    /// Handle a failed step: store whatever state exists, record the step's
    /// output as termination message and build the error to return.
    async fn fail(&self, step: &Step, failure: StepFailure) -> TerraformerError {
        self.final_state_update().await;

        if let Err(e) = self.report.record(&failure.output).await {
            tracing::warn!(error = %e, "failed to write termination message");
        }

        TerraformerError::ToolExecution {
            args: step.to_string(),
            exit_code: failure.exit_code,
            output: failure.output,
        }
    }

    /// Best-effort persist after a failure. Errors are logged only.
    async fn final_state_update(&self) {
        tracing::info!("triggering final state update before exiting");
        if let Err(e) = self.state.persist().await {
            tracing::error!(error = %e, "final state update failed");
        }
    }
}
