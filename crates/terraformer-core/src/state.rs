//! Terraform state: detection of the stored format and write-back to the
//! cluster.

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use serde::Deserialize;
use terraformer_config::paths::STATE_FILE;
use terraformer_kube::{ClusterObject, ObjectRef, ObjectStore};

use crate::error::{Result, TerraformerError};

/// Data key of the state ConfigMap holding the state document.
pub const STATE_KEY: &str = STATE_FILE;

/// First terraform release with registry-qualified provider addresses.
const CURRENT_FORMAT: StateVersion = StateVersion {
    major: 0,
    minor: 13,
    patch: 0,
};

/// State content as stored in the cluster at the start of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistedState {
    /// No state object, no data, missing key, or an empty value.
    Empty,
    Present(String),
}

impl PersistedState {
    /// Extract the state from the (possibly absent) state ConfigMap.
    pub fn from_object(object: Option<&ClusterObject>) -> Self {
        match object.and_then(|o| o.get(STATE_KEY)) {
            Some(content) if !content.trim().is_empty() => PersistedState::Present(content.to_string()),
            _ => PersistedState::Empty,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, PersistedState::Empty)
    }

    pub fn content(&self) -> Option<&str> {
        match self {
            PersistedState::Empty => None,
            PersistedState::Present(content) => Some(content),
        }
    }

    /// Inspect the stored state document.
    pub fn format(&self) -> StateFormat {
        self.content().map(StateFormat::detect).unwrap_or_default()
    }
}

/// `major.minor.patch` of the terraform release that wrote a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct StateVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl StateVersion {
    /// Whether this state predates registry-qualified provider addresses and
    /// needs `state replace-provider` before use.
    pub fn is_legacy(&self) -> bool {
        *self < CURRENT_FORMAT
    }
}

impl FromStr for StateVersion {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        // Drop pre-release and build suffixes ("0.13.0-beta2", "1.0.0+abc").
        let core = s
            .trim()
            .trim_start_matches('v')
            .split(['-', '+'])
            .next()
            .unwrap_or_default();
        let mut parts = core.split('.');
        let mut next = |name: &str, required: bool| -> std::result::Result<u64, String> {
            match parts.next() {
                Some(p) => p
                    .parse()
                    .map_err(|_| format!("invalid {} version component '{}' in '{}'", name, p, s)),
                None if required => Err(format!("missing {} version in '{}'", name, s)),
                None => Ok(0),
            }
        };
        Ok(Self {
            major: next("major", true)?,
            minor: next("minor", true)?,
            patch: next("patch", false)?,
        })
    }
}

impl fmt::Display for StateVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// What the sequencer needs to know about a stored state document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateFormat {
    /// Release that wrote the state; `None` when absent or unparseable.
    pub version: Option<StateVersion>,
    /// Provider names referenced with the pre-0.13 `provider.<name>` syntax.
    pub legacy_providers: Vec<String>,
}

#[derive(Deserialize)]
struct StateDocument {
    terraform_version: Option<String>,
    #[serde(default)]
    resources: Vec<StateResource>,
}

#[derive(Deserialize)]
struct StateResource {
    provider: Option<String>,
}

impl StateFormat {
    /// Parse a state document. Anything that is not a readable state is
    /// treated as current format.
    pub fn detect(content: &str) -> Self {
        let Ok(doc) = serde_json::from_str::<StateDocument>(content) else {
            tracing::debug!("state is not a JSON state document, assuming current format");
            return Self::default();
        };

        let version = doc
            .terraform_version
            .as_deref()
            .and_then(|v| v.parse::<StateVersion>().ok());

        let legacy_providers: BTreeSet<String> = doc
            .resources
            .iter()
            .filter_map(|r| r.provider.as_deref())
            .filter_map(legacy_provider_name)
            .collect();

        Self {
            version,
            legacy_providers: legacy_providers.into_iter().collect(),
        }
    }

    /// Whether the state must be migrated before use.
    pub fn is_legacy(&self) -> bool {
        self.version.is_some_and(|v| v.is_legacy())
    }
}

/// `provider.aws` or `provider.aws.eu_west` yields `aws`; registry-qualified
/// addresses (`provider["registry.terraform.io/..."]`) yield nothing.
fn legacy_provider_name(address: &str) -> Option<String> {
    let rest = address.strip_prefix("provider.")?;
    let name = rest.split('.').next()?;
    (!name.is_empty()).then(|| name.to_string())
}

/// Outcome of a successful [`StateSynchronizer::persist`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Persisted {
    Stored,
    /// No local state file existed.
    NothingToStore,
}

/// Writes the local state file back into the state ConfigMap.
pub struct StateSynchronizer {
    store: Arc<dyn ObjectStore>,
    object: ObjectRef,
    state_path: PathBuf,
}

impl StateSynchronizer {
    pub fn new(store: Arc<dyn ObjectStore>, object: ObjectRef, state_path: PathBuf) -> Self {
        Self {
            store,
            object,
            state_path,
        }
    }

    /// Store the current local state, creating the ConfigMap if needed.
    pub async fn persist(&self) -> Result<Persisted> {
        let content = match tokio::fs::read_to_string(&self.state_path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %self.state_path.display(), "no state file found, nothing to store");
                return Ok(Persisted::NothingToStore);
            }
            Err(e) => {
                return Err(TerraformerError::ReadState {
                    path: self.state_path.clone(),
                    source: e,
                });
            }
        };

        let persist_err = |source| TerraformerError::Persist {
            object: self.object.clone(),
            source,
        };

        match self.store.get(&self.object).await {
            Ok(mut existing) => {
                existing.data.insert(STATE_KEY.to_string(), content);
                self.store.update(&existing).await.map_err(persist_err)?;
            }
            Err(e) if e.is_not_found() => {
                tracing::debug!(object = %self.object, "state object missing, creating it");
                let created = ClusterObject::new(&self.object).with_data(STATE_KEY, content);
                self.store.create(&created).await.map_err(persist_err)?;
            }
            Err(e) => return Err(persist_err(e)),
        }

        tracing::info!(object = %self.object, "successfully stored terraform state");
        Ok(Persisted::Stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use terraformer_kube::InMemoryStore;

    const LEGACY_STATE: &str = r#"{
        "version": 4,
        "terraform_version": "0.12.31",
        "resources": [
            {"mode": "managed", "type": "aws_vpc", "name": "vpc", "provider": "provider.aws"},
            {"mode": "managed", "type": "aws_subnet", "name": "a", "provider": "provider.aws.eu"},
            {"mode": "data", "type": "template_file", "name": "t", "provider": "provider.template"}
        ]
    }"#;

    const CURRENT_STATE: &str = r#"{
        "version": 4,
        "terraform_version": "0.13.7",
        "resources": [
            {"type": "aws_vpc", "provider": "provider[\"registry.terraform.io/hashicorp/aws\"]"}
        ]
    }"#;

    #[test]
    fn test_persisted_state_empty_variants() {
        let state_ref = ObjectRef::config_map("ns", "state");
        assert!(PersistedState::from_object(None).is_empty());

        let no_data = ClusterObject::new(&state_ref);
        assert!(PersistedState::from_object(Some(&no_data)).is_empty());

        let empty_value = ClusterObject::new(&state_ref).with_data(STATE_KEY, "");
        assert!(PersistedState::from_object(Some(&empty_value)).is_empty());

        let other_key = ClusterObject::new(&state_ref).with_data("foo", "bar");
        assert!(PersistedState::from_object(Some(&other_key)).is_empty());

        let present = ClusterObject::new(&state_ref).with_data(STATE_KEY, "{}");
        assert_eq!(
            PersistedState::from_object(Some(&present)),
            PersistedState::Present("{}".to_string())
        );
    }

    #[test]
    fn test_version_parsing() {
        let v: StateVersion = "0.12.31".parse().unwrap();
        assert_eq!(
            v,
            StateVersion {
                major: 0,
                minor: 12,
                patch: 31
            }
        );
        assert!(v.is_legacy());
        assert!(!"0.13.0".parse::<StateVersion>().unwrap().is_legacy());
        assert!(!"1.5.7".parse::<StateVersion>().unwrap().is_legacy());
        assert!("0.13.0-beta2".parse::<StateVersion>().unwrap().minor == 13);
        assert_eq!("0.11".parse::<StateVersion>().unwrap().to_string(), "0.11.0");
        assert!("abc".parse::<StateVersion>().is_err());
        assert!("1".parse::<StateVersion>().is_err());
    }

    #[test]
    fn test_detect_legacy_format() {
        let format = StateFormat::detect(LEGACY_STATE);
        assert!(format.is_legacy());
        assert_eq!(format.legacy_providers, vec!["aws", "template"]);
    }

    #[test]
    fn test_detect_current_format() {
        let format = StateFormat::detect(CURRENT_STATE);
        assert!(!format.is_legacy());
        assert!(format.legacy_providers.is_empty());
    }

    #[test]
    fn test_missing_version_is_current_format() {
        assert!(!StateFormat::detect(r#"{"version": 4}"#).is_legacy());
        assert!(!StateFormat::detect("not json").is_legacy());
        assert_eq!(PersistedState::Empty.format(), StateFormat::default());
    }

    #[tokio::test]
    async fn test_persist_without_local_file_is_noop() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(InMemoryStore::new());
        let object = ObjectRef::config_map("ns", "state");
        let sync = StateSynchronizer::new(store.clone(), object.clone(), tmp.path().join("missing"));

        assert_eq!(sync.persist().await.unwrap(), Persisted::NothingToStore);
        assert!(store.snapshot(&object).is_none());
    }

    #[tokio::test]
    async fn test_persist_creates_missing_object() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(STATE_KEY);
        std::fs::write(&path, CURRENT_STATE).unwrap();
        let store = Arc::new(InMemoryStore::new());
        let object = ObjectRef::config_map("ns", "state");

        let sync = StateSynchronizer::new(store.clone(), object.clone(), path);
        assert_eq!(sync.persist().await.unwrap(), Persisted::Stored);
        assert_eq!(
            store.snapshot(&object).unwrap().get(STATE_KEY),
            Some(CURRENT_STATE)
        );
    }

    #[tokio::test]
    async fn test_persist_updates_existing_object() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(STATE_KEY);
        std::fs::write(&path, "new").unwrap();
        let store = Arc::new(InMemoryStore::new());
        let object = ObjectRef::config_map("ns", "state");
        store.insert(
            ClusterObject::new(&object)
                .with_data(STATE_KEY, "old")
                .with_data("other", "kept")
                .with_finalizer("gardener.cloud/terraformer"),
        );

        StateSynchronizer::new(store.clone(), object.clone(), path)
            .persist()
            .await
            .unwrap();

        let stored = store.snapshot(&object).unwrap();
        assert_eq!(stored.get(STATE_KEY), Some("new"));
        assert_eq!(stored.get("other"), Some("kept"));
        assert!(stored.has_finalizer("gardener.cloud/terraformer"));
    }

    #[tokio::test]
    async fn test_persist_write_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(STATE_KEY);
        std::fs::write(&path, "{}").unwrap();
        let store = Arc::new(InMemoryStore::new());
        store.fail_writes(Some("apiserver down"));

        let err = StateSynchronizer::new(store, ObjectRef::config_map("ns", "state"), path)
            .persist()
            .await
            .unwrap_err();
        assert!(matches!(err, TerraformerError::Persist { .. }));
        assert!(err.to_string().contains("apiserver down"));
    }
}
