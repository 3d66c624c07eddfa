//! In-process object store.
//!
//! Behaves like the API server for the subset terraformer uses: resource
//! versions are bumped on every write and updates with a stale version are
//! rejected with a conflict.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{KubeError, Result};
use crate::object::{ClusterObject, ObjectRef};
use crate::store::ObjectStore;

/// A thread-safe in-memory [`ObjectStore`].
#[derive(Debug, Default)]
pub struct InMemoryStore {
    objects: Mutex<HashMap<ObjectRef, ClusterObject>>,
    next_version: Mutex<u64>,
    fail_writes: Mutex<Option<String>>,
}

impl InMemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite an object without version checks.
    pub fn insert(&self, object: ClusterObject) {
        let mut object = object;
        object.metadata.resource_version = Some(self.bump());
        self.objects.lock().insert(object.object_ref(), object);
    }

    /// Delete an object. Returns the removed object, if any.
    pub fn remove(&self, object: &ObjectRef) -> Option<ClusterObject> {
        self.objects.lock().remove(object)
    }

    /// Current copy of an object.
    pub fn snapshot(&self, object: &ObjectRef) -> Option<ClusterObject> {
        self.objects.lock().get(object).cloned()
    }

    /// Make every subsequent create/update fail with a server error.
    ///
    /// Pass `None` to make writes succeed again.
    pub fn fail_writes(&self, message: Option<&str>) {
        *self.fail_writes.lock() = message.map(str::to_string);
    }

    fn bump(&self) -> String {
        let mut next = self.next_version.lock();
        *next += 1;
        next.to_string()
    }

    fn check_writable(&self) -> Result<()> {
        match self.fail_writes.lock().as_ref() {
            Some(message) => Err(KubeError::Api {
                status: 500,
                reason: "InternalError".to_string(),
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ObjectStore for InMemoryStore {
    async fn get(&self, object: &ObjectRef) -> Result<ClusterObject> {
        self.snapshot(object).ok_or_else(|| KubeError::NotFound {
            resource: object.kind.resource().to_string(),
            name: object.name.clone(),
        })
    }

    async fn create(&self, object: &ClusterObject) -> Result<ClusterObject> {
        self.check_writable()?;
        let key = object.object_ref();
        let mut stored = object.clone();
        stored.metadata.resource_version = Some(self.bump());

        let mut objects = self.objects.lock();
        if objects.contains_key(&key) {
            return Err(KubeError::AlreadyExists {
                resource: key.kind.resource().to_string(),
                name: key.name,
            });
        }
        objects.insert(key, stored.clone());
        Ok(stored)
    }

    async fn update(&self, object: &ClusterObject) -> Result<ClusterObject> {
        self.check_writable()?;
        let key = object.object_ref();
        let version = self.bump();

        let mut objects = self.objects.lock();
        let Some(current) = objects.get(&key) else {
            return Err(KubeError::NotFound {
                resource: key.kind.resource().to_string(),
                name: key.name,
            });
        };
        if let Some(expected) = &object.metadata.resource_version {
            if current.metadata.resource_version.as_ref() != Some(expected) {
                return Err(KubeError::Conflict {
                    resource: key.kind.resource().to_string(),
                    name: key.name,
                    message: "the object has been modified".to_string(),
                });
            }
        }

        let mut stored = object.clone();
        stored.metadata.resource_version = Some(version);
        objects.insert(key, stored.clone());
        Ok(stored)
    }
}
