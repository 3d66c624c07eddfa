//! Cluster object model.

use std::collections::BTreeMap;
use std::fmt;

/// The two core/v1 kinds terraformer works with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    ConfigMap,
    Secret,
}

impl ObjectKind {
    /// `kind` field value.
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::ConfigMap => "ConfigMap",
            ObjectKind::Secret => "Secret",
        }
    }

    /// Plural resource name used in REST paths and error messages.
    pub fn resource(&self) -> &'static str {
        match self {
            ObjectKind::ConfigMap => "configmaps",
            ObjectKind::Secret => "secrets",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Address of a cluster object.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectRef {
    pub kind: ObjectKind,
    pub namespace: String,
    pub name: String,
}

impl ObjectRef {
    /// Reference a ConfigMap.
    pub fn config_map(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: ObjectKind::ConfigMap,
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Reference a Secret.
    pub fn secret(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: ObjectKind::Secret,
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}/{}", self.kind, self.namespace, self.name)
    }
}

/// Object metadata terraformer reads or writes.
///
/// Everything else the server sends (labels, owner references, ...) is kept
/// in `extra` and written back unchanged on update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectMeta {
    pub name: String,
    pub namespace: String,
    pub finalizers: Vec<String>,
    pub resource_version: Option<String>,
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A ConfigMap or Secret with decoded string data.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterObject {
    pub kind: ObjectKind,
    pub metadata: ObjectMeta,
    /// `data` of a ConfigMap, or base64-decoded `data` of a Secret.
    pub data: BTreeMap<String, String>,
    /// Unmodelled top-level fields (`type`, `binaryData`, ...).
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ClusterObject {
    /// Create an empty object at the given address.
    pub fn new(object: &ObjectRef) -> Self {
        Self {
            kind: object.kind,
            metadata: ObjectMeta {
                name: object.name.clone(),
                namespace: object.namespace.clone(),
                ..ObjectMeta::default()
            },
            data: BTreeMap::new(),
            extra: serde_json::Map::new(),
        }
    }

    /// Add a data entry.
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Add a finalizer.
    pub fn with_finalizer(mut self, finalizer: impl Into<String>) -> Self {
        self.add_finalizer(&finalizer.into());
        self
    }

    /// Address of this object.
    pub fn object_ref(&self) -> ObjectRef {
        ObjectRef {
            kind: self.kind,
            namespace: self.metadata.namespace.clone(),
            name: self.metadata.name.clone(),
        }
    }

    /// Look up a data entry.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.data.get(key).map(String::as_str)
    }

    /// Whether the finalizer is present.
    pub fn has_finalizer(&self, finalizer: &str) -> bool {
        self.metadata.finalizers.iter().any(|f| f == finalizer)
    }

    /// Add the finalizer. Returns `false` if it was already present.
    pub fn add_finalizer(&mut self, finalizer: &str) -> bool {
        if self.has_finalizer(finalizer) {
            return false;
        }
        self.metadata.finalizers.push(finalizer.to_string());
        true
    }

    /// Remove the finalizer. Returns `false` if it was not present.
    pub fn remove_finalizer(&mut self, finalizer: &str) -> bool {
        let before = self.metadata.finalizers.len();
        self.metadata.finalizers.retain(|f| f != finalizer);
        self.metadata.finalizers.len() != before
    }
}
