//! Configuration types.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};
use crate::paths::PathSet;

/// Finalizer placed on the cluster objects while a run depends on them.
pub const DEFAULT_FINALIZER: &str = "gardener.cloud/terraformer";

/// Default terraform executable (resolved through `PATH`).
pub const DEFAULT_TERRAFORM_BINARY: &str = "terraform";

/// Service-account mount used for in-cluster authentication.
const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

/// Root configuration for one terraformer run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerraformerConfig {
    /// Namespace of all three cluster objects.
    pub namespace: String,
    /// ConfigMap holding `main.tf` and `variables.tf`.
    pub configuration_config_map_name: String,
    /// ConfigMap holding `terraform.tfstate`.
    pub state_config_map_name: String,
    /// Secret holding `terraform.tfvars`.
    pub variables_secret_name: String,
    /// Terraform executable.
    pub terraform_binary: PathBuf,
    /// Finalizer name added to and removed from the cluster objects.
    pub finalizer: String,
    /// Local working-directory layout.
    pub paths: PathSet,
    /// Cluster API connection settings.
    pub kube: KubeSettings,
}

impl Default for TerraformerConfig {
    fn default() -> Self {
        Self {
            namespace: String::new(),
            configuration_config_map_name: String::new(),
            state_config_map_name: String::new(),
            variables_secret_name: String::new(),
            terraform_binary: PathBuf::from(DEFAULT_TERRAFORM_BINARY),
            finalizer: DEFAULT_FINALIZER.to_string(),
            paths: PathSet::default(),
            kube: KubeSettings::default(),
        }
    }
}

impl TerraformerConfig {
    /// Create an empty configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a TOML document.
    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Serialize to TOML.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Set the namespace.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Set the names of the configuration ConfigMap, state ConfigMap and
    /// variables Secret.
    pub fn with_object_names(
        mut self,
        configuration: impl Into<String>,
        state: impl Into<String>,
        variables: impl Into<String>,
    ) -> Self {
        self.configuration_config_map_name = configuration.into();
        self.state_config_map_name = state.into();
        self.variables_secret_name = variables.into();
        self
    }

    /// Set the terraform executable.
    pub fn with_terraform_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.terraform_binary = binary.into();
        self
    }

    /// Set the working-directory layout.
    pub fn with_paths(mut self, paths: PathSet) -> Self {
        self.paths = paths;
        self
    }

    /// Check that every required field is set.
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("namespace", &self.namespace),
            (
                "configuration_config_map_name",
                &self.configuration_config_map_name,
            ),
            ("state_config_map_name", &self.state_config_map_name),
            ("variables_secret_name", &self.variables_secret_name),
            ("finalizer", &self.finalizer),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::MissingField {
                    field: field.to_string(),
                });
            }
        }
        if self.terraform_binary.as_os_str().is_empty() {
            return Err(ConfigError::MissingField {
                field: "terraform_binary".to_string(),
            });
        }
        Ok(())
    }
}

/// How to reach the cluster API server.
///
/// Defaults describe the in-cluster setup: the server address comes from
/// `KUBERNETES_SERVICE_HOST`/`KUBERNETES_SERVICE_PORT` and credentials from the
/// mounted service account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KubeSettings {
    /// Explicit API server URL. `None` means in-cluster discovery.
    pub api_url: Option<String>,
    /// File holding the bearer token.
    pub token_path: Option<PathBuf>,
    /// PEM bundle used to verify the API server.
    pub ca_path: Option<PathBuf>,
    /// Skip TLS verification. Only meant for local development.
    pub insecure: bool,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for KubeSettings {
    fn default() -> Self {
        Self {
            api_url: None,
            token_path: Some(PathBuf::from(SERVICE_ACCOUNT_DIR).join("token")),
            ca_path: Some(PathBuf::from(SERVICE_ACCOUNT_DIR).join("ca.crt")),
            insecure: false,
            timeout_secs: 30,
        }
    }
}

impl KubeSettings {
    /// Effective API server URL.
    ///
    /// Resolution order:
    /// 1. Configured `api_url`
    /// 2. `https://$KUBERNETES_SERVICE_HOST:$KUBERNETES_SERVICE_PORT`
    pub fn effective_api_url(&self) -> Option<String> {
        if let Some(url) = &self.api_url {
            return Some(url.clone());
        }
        let host = std::env::var("KUBERNETES_SERVICE_HOST").ok()?;
        let port = std::env::var("KUBERNETES_SERVICE_PORT").unwrap_or_else(|_| "443".to_string());
        // IPv6 service hosts need brackets.
        if host.contains(':') {
            Some(format!("https://[{}]:{}", host, port))
        } else {
            Some(format!("https://{}:{}", host, port))
        }
    }
}
