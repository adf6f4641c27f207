//! The minimal control surface every managed resource exposes

use crate::error::ManagerError;
use async_trait::async_trait;

/// Create, stop and remove one kind of engine resource
///
/// `stop` and `remove` take an explicit id; callers pass the id the manager
/// is tracking. Nothing here is container specific.
#[async_trait]
pub trait ResourceManager: Send + Sync {
    /// Create the resource from its definition, start it, and return its id
    ///
    /// Idempotent by name: a second call tears down the first call's resource
    /// and creates a fresh one.
    async fn create_and_start(&self) -> Result<String, ManagerError>;

    /// Gracefully stop the resource with the given id
    async fn stop(&self, resource_id: &str) -> Result<(), ManagerError>;

    /// Permanently delete the resource with the given id
    async fn remove(&self, resource_id: &str) -> Result<(), ManagerError>;
}
