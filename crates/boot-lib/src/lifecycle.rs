//! Binding between container managers and the host's start/stop phases
//!
//! The host calls [`HostLifecycle::on_host_start`] once when it starts and
//! [`HostLifecycle::on_host_stop`] once when it shuts down gracefully. The
//! manager's [`LifecycleMode`](crate::settings::LifecycleMode) decides what
//! actually happens.

use crate::error::ManagerError;
use crate::manager::ContainerManager;
use async_trait::async_trait;
use tracing::{debug, info};

/// Phase shared by every binding; no ordering between managers
pub const DEFAULT_PHASE: i32 = 0;

/// Hooks the host drives at its own phase boundaries
#[async_trait]
pub trait HostLifecycle: Send + Sync {
    async fn on_host_start(&self) -> Result<(), ManagerError>;

    async fn on_host_stop(&self) -> Result<(), ManagerError>;

    /// Local running flag, no engine round-trip
    fn is_alive(&self) -> bool;

    /// Lower phases start first and stop last
    fn phase(&self) -> i32 {
        DEFAULT_PHASE
    }
}

#[async_trait]
impl HostLifecycle for ContainerManager {
    async fn on_host_start(&self) -> Result<(), ManagerError> {
        if !self.lifecycle_mode().starts_with_host() {
            debug!(container_type = %self.key(), "Manual lifecycle, not starting with host");
            return Ok(());
        }

        info!(
            container_type = %self.key(),
            "Host starting: running {} container",
            self.key()
        );

        let _guard = self.lock().await;
        self.create_and_start_locked().await?;
        self.set_running(true);
        Ok(())
    }

    /// A failure keeps the running flag and tracked id so a retry resumes
    /// where this call stopped
    async fn on_host_stop(&self) -> Result<(), ManagerError> {
        let _guard = self.lock().await;

        if self.lifecycle_mode().stops_with_host() {
            info!(
                container_type = %self.key(),
                "Host stopping: cleaning up {} container",
                self.key()
            );

            if let Some(id) = self.container_id() {
                // a container stopped earlier by an event only needs removing
                if self.state().running {
                    self.stop_locked(&id).await?;
                }
                self.remove_locked(&id).await?;
            }
            self.clear_container_id();
        } else {
            debug!(
                container_type = %self.key(),
                mode = ?self.lifecycle_mode(),
                "Leaving container as is on host stop"
            );
        }

        self.set_running(false);
        Ok(())
    }

    fn is_alive(&self) -> bool {
        self.state().running
    }
}
