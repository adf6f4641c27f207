//! Container engine abstraction
//!
//! Managers talk to the engine only through [`ContainerEngine`]. The Docker
//! implementation wraps bollard; the in-memory one backs tests and dry runs.

mod docker;
mod memory;

pub use docker::DockerEngine;
pub use memory::{EngineCall, MemoryContainer, MemoryEngine};

use crate::error::EngineError;
use crate::models::{ContainerSpec, InspectedContainer, LocalImage};
use std::time::Duration;

use async_trait::async_trait;

/// Operations the lifecycle core needs from a container engine
///
/// One engine handle is shared by every manager without client-side locking.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Look up a container by name or id. Missing containers are `NotFound`.
    async fn inspect_container(&self, name: &str) -> Result<InspectedContainer, EngineError>;

    /// Remove a container regardless of its running state
    async fn remove_container_force(&self, name: &str) -> Result<(), EngineError>;

    async fn list_images(&self) -> Result<Vec<LocalImage>, EngineError>;

    /// Pull an image and wait until the pull has completed
    async fn pull_image(&self, reference: &str) -> Result<(), EngineError>;

    /// Create a container and return its id
    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, EngineError>;

    async fn start_container(&self, id: &str) -> Result<(), EngineError>;

    /// Stop gracefully, killing after `timeout`
    async fn stop_container(&self, id: &str, timeout: Duration) -> Result<(), EngineError>;

    /// Remove a stopped container
    async fn remove_container(&self, id: &str) -> Result<(), EngineError>;
}
