//! Finalizer lifecycle on the run's cluster objects.
//!
//! While a run may still need them, the configuration, variables and state
//! objects carry a finalizer so that they cannot be removed from under a
//! half-finished apply. The finalizer is released only after a successful
//! destroy.

use std::sync::Arc;

use terraformer_kube::{ClusterObject, ObjectRef, ObjectStore};

use crate::error::{Result, TerraformerError};
use crate::fetch::ObjectRefs;

pub struct FinalizerManager {
    store: Arc<dyn ObjectStore>,
    finalizer: String,
}

impl FinalizerManager {
    pub fn new(store: Arc<dyn ObjectStore>, finalizer: impl Into<String>) -> Self {
        Self {
            store,
            finalizer: finalizer.into(),
        }
    }

    pub fn finalizer(&self) -> &str {
        &self.finalizer
    }

    /// Add the finalizer to all three objects.
    ///
    /// A missing state object is created empty so that it carries the
    /// finalizer from the start.
    pub async fn acquire(&self, refs: &ObjectRefs) -> Result<()> {
        for object in [&refs.configuration, &refs.variables] {
            let mut existing = self
                .store
                .get(object)
                .await
                .map_err(|source| self.error(object, source))?;
            self.add_and_update(&mut existing).await?;
        }

        match self.store.get(&refs.state).await {
            Ok(mut existing) => self.add_and_update(&mut existing).await?,
            Err(e) if e.is_not_found() => {
                let created = ClusterObject::new(&refs.state).with_finalizer(&self.finalizer);
                self.store
                    .create(&created)
                    .await
                    .map_err(|source| self.error(&refs.state, source))?;
                tracing::info!(object = %refs.state, "created empty state object");
            }
            Err(e) => return Err(self.error(&refs.state, e)),
        }

        tracing::debug!(finalizer = %self.finalizer, "finalizers acquired");
        Ok(())
    }

    /// Remove the finalizer from all three objects. Objects that no longer
    /// exist are skipped.
    pub async fn release(&self, refs: &ObjectRefs) -> Result<()> {
        for object in refs.all() {
            let mut existing = match self.store.get(object).await {
                Ok(existing) => existing,
                Err(e) if e.is_not_found() => {
                    tracing::debug!(object = %object, "object already gone, skipping finalizer removal");
                    continue;
                }
                Err(e) => return Err(self.error(object, e)),
            };
            if existing.remove_finalizer(&self.finalizer) {
                self.store
                    .update(&existing)
                    .await
                    .map_err(|source| self.error(object, source))?;
                tracing::info!(object = %object, finalizer = %self.finalizer, "removed finalizer");
            }
        }
        Ok(())
    }

    async fn add_and_update(&self, existing: &mut ClusterObject) -> Result<()> {
        if existing.add_finalizer(&self.finalizer) {
            let object = existing.object_ref();
            self.store
                .update(existing)
                .await
                .map_err(|source| self.error(&object, source))?;
            tracing::info!(object = %object, finalizer = %self.finalizer, "added finalizer");
        }
        Ok(())
    }

    fn error(&self, object: &ObjectRef, source: terraformer_kube::KubeError) -> TerraformerError {
        TerraformerError::Finalizer {
            object: object.clone(),
            source,
        }
    }
}
