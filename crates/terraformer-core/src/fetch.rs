//! Fetching the run inputs from the cluster and writing them to disk.

use std::path::Path;

use terraformer_config::{PathSet, TerraformerConfig};
use terraformer_config::paths::{MAIN_FILE, TFVARS_FILE, VARIABLES_FILE};
use terraformer_kube::{ClusterObject, ObjectRef, ObjectStore};

use crate::error::{Result, TerraformerError};
use crate::state::PersistedState;

/// The three cluster objects a run depends on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRefs {
    pub configuration: ObjectRef,
    pub variables: ObjectRef,
    pub state: ObjectRef,
}

impl ObjectRefs {
    pub fn from_config(config: &TerraformerConfig) -> Self {
        let ns = &config.namespace;
        Self {
            configuration: ObjectRef::config_map(ns, &config.configuration_config_map_name),
            variables: ObjectRef::secret(ns, &config.variables_secret_name),
            state: ObjectRef::config_map(ns, &config.state_config_map_name),
        }
    }

    /// All objects in a fixed order: configuration, variables, state.
    pub fn all(&self) -> [&ObjectRef; 3] {
        [&self.configuration, &self.variables, &self.state]
    }
}

/// Contents fetched for one run.
#[derive(Debug, Clone)]
pub struct FetchedObjects {
    pub main: String,
    pub variables: String,
    pub tfvars: String,
    pub state: PersistedState,
}

/// Read configuration, variables and state.
///
/// Configuration and variables are required; a missing state object is an
/// empty state.
pub async fn fetch(store: &dyn ObjectStore, refs: &ObjectRefs) -> Result<FetchedObjects> {
    let configuration = get_required(store, &refs.configuration).await?;
    let variables = get_required(store, &refs.variables).await?;

    let state = match store.get(&refs.state).await {
        Ok(object) => PersistedState::from_object(Some(&object)),
        Err(e) if e.is_not_found() => {
            tracing::debug!(object = %refs.state, "state object not found, treating state as empty");
            PersistedState::Empty
        }
        Err(e) => {
            return Err(TerraformerError::Fetch {
                object: refs.state.clone(),
                source: e,
            });
        }
    };

    Ok(FetchedObjects {
        main: required_key(&configuration, MAIN_FILE)?,
        variables: required_key(&configuration, VARIABLES_FILE)?,
        tfvars: required_key(&variables, TFVARS_FILE)?,
        state,
    })
}

async fn get_required(store: &dyn ObjectStore, object: &ObjectRef) -> Result<ClusterObject> {
    tracing::debug!(object = %object, "fetching object");
    store
        .get(object)
        .await
        .map_err(|source| TerraformerError::Fetch {
            object: object.clone(),
            source,
        })
}

fn required_key(object: &ClusterObject, key: &str) -> Result<String> {
    object
        .get(key)
        .map(str::to_string)
        .ok_or_else(|| TerraformerError::MissingKey {
            object: object.object_ref(),
            key: key.to_string(),
        })
}

/// Write the fetched contents into the working-directory layout.
pub async fn materialize(fetched: &FetchedObjects, paths: &PathSet) -> Result<()> {
    write_file(&paths.main_path(), &fetched.main).await?;
    write_file(&paths.variables_path(), &fetched.variables).await?;
    write_file(&paths.vars_path(), &fetched.tfvars).await?;
    if let Some(content) = fetched.state.content() {
        write_file(&paths.state_path(), content).await?;
    }
    tracing::debug!(config_dir = %paths.config_dir.display(), "materialized terraform files");
    Ok(())
}

async fn write_file(path: &Path, content: &str) -> Result<()> {
    let materialize_err = |source| TerraformerError::Materialize {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(materialize_err)?;
    }
    tokio::fs::write(path, content).await.map_err(materialize_err)
}
