//! Run command - apply, destroy or validate.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;

use terraformer_config::{TerraformerConfig, load_config};
use terraformer_core::{Operation, OsSignals, Terraformer};
use terraformer_kube::KubeClient;

/// Arguments shared by all operations.
#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// TOML configuration file; flags and environment variables override it
    #[arg(long, env = "TERRAFORMER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Namespace of the configuration, state and variables objects
    #[arg(long, env = "TERRAFORMER_NAMESPACE")]
    pub namespace: Option<String>,

    /// Name of the ConfigMap holding main.tf and variables.tf
    #[arg(long, env = "TERRAFORMER_CONFIGURATION_CONFIGMAP_NAME")]
    pub configuration_configmap_name: Option<String>,

    /// Name of the ConfigMap holding the terraform state
    #[arg(long, env = "TERRAFORMER_STATE_CONFIGMAP_NAME")]
    pub state_configmap_name: Option<String>,

    /// Name of the Secret holding terraform.tfvars
    #[arg(long, env = "TERRAFORMER_VARIABLES_SECRET_NAME")]
    pub variables_secret_name: Option<String>,

    /// Re-root all working paths below this directory
    #[arg(long, env = "TERRAFORMER_BASE_DIR")]
    pub base_dir: Option<PathBuf>,

    /// Terraform executable
    #[arg(long, env = "TERRAFORMER_TERRAFORM_BINARY")]
    pub terraform_binary: Option<PathBuf>,

    /// API server URL (default: in-cluster discovery)
    #[arg(long, env = "TERRAFORMER_KUBE_API_URL")]
    pub kube_api_url: Option<String>,
}

impl RunArgs {
    /// Layer the flags over the configuration file.
    pub fn resolve(&self) -> Result<TerraformerConfig> {
        let mut config = load_config(self.config.as_deref())?;

        if let Some(namespace) = &self.namespace {
            config.namespace = namespace.clone();
        }
        if let Some(name) = &self.configuration_configmap_name {
            config.configuration_config_map_name = name.clone();
        }
        if let Some(name) = &self.state_configmap_name {
            config.state_config_map_name = name.clone();
        }
        if let Some(name) = &self.variables_secret_name {
            config.variables_secret_name = name.clone();
        }
        if let Some(binary) = &self.terraform_binary {
            config.terraform_binary = binary.clone();
        }
        if let Some(url) = &self.kube_api_url {
            config.kube.api_url = Some(url.clone());
        }
        if let Some(base_dir) = &self.base_dir {
            config.paths = config.paths.with_base_dir(base_dir);
        }

        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

pub async fn run(operation: Operation, args: RunArgs) -> Result<()> {
    let config = args.resolve()?;
    tracing::debug!(?config, "resolved configuration");

    let client = KubeClient::from_settings(&config.kube).context("failed to create cluster client")?;
    let terraformer = Terraformer::new(config, Arc::new(client), Arc::new(OsSignals));

    terraformer.run(operation).await?;
    Ok(())
}
