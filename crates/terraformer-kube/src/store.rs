//! Storage abstraction for cluster objects.

use async_trait::async_trait;

use crate::error::Result;
use crate::object::{ClusterObject, ObjectRef};

/// Read and write access to ConfigMaps and Secrets.
///
/// Implementations report a missing object as [`KubeError::NotFound`] and a
/// stale `resource_version` on update as [`KubeError::Conflict`]. No call is
/// retried internally.
///
/// [`KubeError::NotFound`]: crate::KubeError::NotFound
/// [`KubeError::Conflict`]: crate::KubeError::Conflict
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch an object.
    async fn get(&self, object: &ObjectRef) -> Result<ClusterObject>;

    /// Create a new object. Fails if it already exists.
    async fn create(&self, object: &ClusterObject) -> Result<ClusterObject>;

    /// Replace an existing object.
    async fn update(&self, object: &ClusterObject) -> Result<ClusterObject>;
}
