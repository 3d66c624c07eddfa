//! Cluster object access for terraformer.
//!
//! Terraformer only ever touches two kinds of core/v1 objects: ConfigMaps
//! (configuration and state) and Secrets (variables). This crate models them as
//! [`ClusterObject`]s with decoded string data and exposes them through the
//! [`ObjectStore`] trait so the execution engine stays independent of the
//! transport.
//!
//! Two stores are provided:
//!
//! - [`KubeClient`]: talks to the API server over HTTPS with a bearer token
//! - [`InMemoryStore`]: a thread-safe in-process store for tests
//!
//! # Example
//!
//! ```no_run
//! use terraformer_kube::{KubeClient, ObjectRef, ObjectStore};
//!
//! # async fn example() -> terraformer_kube::Result<()> {
//! let client = KubeClient::builder()
//!     .api_url("https://10.0.0.1:443")
//!     .token("secret")
//!     .build()?;
//!
//! let state = client.get(&ObjectRef::config_map("garden", "infra.tf-state")).await?;
//! println!("finalizers: {:?}", state.metadata.finalizers);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod memory;
pub mod object;
pub mod store;

pub use client::{ClientBuilder, KubeClient};
pub use error::{KubeError, Result};
pub use memory::InMemoryStore;
pub use object::{ClusterObject, ObjectKind, ObjectMeta, ObjectRef};
pub use store::ObjectStore;
