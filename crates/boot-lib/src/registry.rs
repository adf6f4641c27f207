//! Registry of container managers
//!
//! Builds one [`ContainerManager`] per enabled definition and drives the host
//! start/stop phases across all of them.

use crate::engine::ContainerEngine;
use crate::error::{ConfigError, ManagerError};
use crate::events::{spawn_listener, EventBus};
use crate::lifecycle::HostLifecycle;
use crate::manager::{ContainerManager, ManagerOptions};
use crate::models::ManagerStatus;
use crate::observability::LifecycleMetrics;
use crate::settings::DockerSettings;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Managers keyed by their definition key
pub struct ManagerRegistry {
    managers: DashMap<String, Arc<ContainerManager>>,
}

impl ManagerRegistry {
    /// Validate `settings` and register a manager for every enabled definition
    ///
    /// Disabled definitions get no manager at all.
    pub fn from_settings(
        settings: &DockerSettings,
        engine: Arc<dyn ContainerEngine>,
        options: ManagerOptions,
        shutdown: CancellationToken,
    ) -> Result<Self, ConfigError> {
        settings.validate()?;

        let managers = DashMap::new();
        for (key, definition) in settings.enabled_containers() {
            debug!(container_type = %key, container_name = %definition.container_name, "Registering manager");
            let manager = ContainerManager::new(key.clone(), definition.clone(), engine.clone())
                .with_options(options.clone())
                .with_shutdown(shutdown.clone());
            managers.insert(key.clone(), Arc::new(manager));
        }

        let skipped = settings.containers.len() - managers.len();
        info!(
            managed = managers.len(),
            disabled = skipped,
            "Container managers registered"
        );
        LifecycleMetrics::new().set_managed_containers(managers.len() as i64);

        Ok(Self { managers })
    }

    pub fn get(&self, key: &str) -> Option<Arc<ContainerManager>> {
        self.managers.get(key).map(|r| r.value().clone())
    }

    /// Keys in sorted order
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.managers.iter().map(|r| r.key().clone()).collect();
        keys.sort();
        keys
    }

    /// Managers ordered by phase, then key
    pub fn list(&self) -> Vec<Arc<ContainerManager>> {
        let mut managers: Vec<Arc<ContainerManager>> =
            self.managers.iter().map(|r| r.value().clone()).collect();
        managers.sort_by(|a, b| a.phase().cmp(&b.phase()).then_with(|| a.key().cmp(b.key())));
        managers
    }

    pub fn len(&self) -> usize {
        self.managers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.managers.is_empty()
    }

    pub fn statuses(&self) -> Vec<ManagerStatus> {
        self.list().iter().map(|m| m.status()).collect()
    }

    /// Run the host start hook of every manager, stopping at the first failure
    ///
    /// Containers already started stay running; the caller decides whether to
    /// run [`stop_all`](Self::stop_all).
    pub async fn start_all(&self) -> Result<usize, ManagerError> {
        let mut started = 0;
        for manager in self.list() {
            manager.on_host_start().await?;
            started += 1;
        }
        Ok(started)
    }

    /// Run the host stop hook of every manager in reverse order
    ///
    /// One failure does not keep the others from stopping. Returns the number
    /// of managers that failed.
    pub async fn stop_all(&self) -> usize {
        let mut failed = 0;
        for manager in self.list().into_iter().rev() {
            if let Err(e) = manager.on_host_stop().await {
                error!(
                    container_type = %manager.key(),
                    error = %e,
                    cause = %e.source,
                    "Host stop failed"
                );
                failed += 1;
            }
        }
        failed
    }

    /// Subscribe one listener task per manager to `bus`
    pub fn spawn_listeners(&self, bus: &EventBus, shutdown: &CancellationToken) -> Vec<JoinHandle<()>> {
        self.list()
            .into_iter()
            .map(|manager| spawn_listener(manager, bus.subscribe(), shutdown.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineCall, MemoryEngine};
    use crate::error::ErrorKind;
    use crate::events::{Action, ContainerEvent};
    use crate::settings::{ContainerDefinition, LifecycleMode};
    use std::time::Duration;

    fn settings() -> DockerSettings {
        let mut settings = DockerSettings::default();
        settings.containers.insert(
            "redis".to_string(),
            ContainerDefinition::new("my-redis", "redis:latest").with_port("6379", 6379),
        );
        settings.containers.insert(
            "nginx".to_string(),
            ContainerDefinition::new("my-nginx", "nginx:latest")
                .with_lifecycle_mode(LifecycleMode::Manual),
        );
        let mut disabled = ContainerDefinition::new("my-pg", "postgres:16");
        disabled.enabled = false;
        settings.containers.insert("postgres".to_string(), disabled);
        settings
    }

    fn registry(engine: Arc<MemoryEngine>) -> ManagerRegistry {
        ManagerRegistry::from_settings(
            &settings(),
            engine,
            ManagerOptions::default(),
            CancellationToken::new(),
        )
        .unwrap()
    }

    #[test]
    fn test_disabled_definitions_are_skipped() {
        let registry = registry(Arc::new(MemoryEngine::new()));

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.keys(), vec!["nginx".to_string(), "redis".to_string()]);
        assert!(registry.get("postgres").is_none());
        assert_eq!(registry.get("redis").unwrap().key(), "redis");
    }

    #[test]
    fn test_duplicate_names_are_rejected() {
        let mut settings = settings();
        settings.containers.insert(
            "cache".to_string(),
            ContainerDefinition::new("my-redis", "redis:7"),
        );

        let err = ManagerRegistry::from_settings(
            &settings,
            Arc::new(MemoryEngine::new()),
            ManagerOptions::default(),
            CancellationToken::new(),
        )
        .err()
        .unwrap();

        assert!(matches!(err, ConfigError::DuplicateContainerName { .. }));
    }

    #[tokio::test]
    async fn test_start_all_and_stop_all() {
        let engine = Arc::new(MemoryEngine::new());
        let registry = registry(engine.clone());

        assert_eq!(registry.start_all().await.unwrap(), 2);
        assert!(engine.container("my-redis").unwrap().running);
        assert!(engine.container("my-nginx").is_none());

        assert_eq!(registry.stop_all().await, 0);
        assert_eq!(engine.container_count(), 0);
        assert!(registry.statuses().iter().all(|s| !s.running));
    }

    #[tokio::test]
    async fn test_start_all_stops_at_first_failure() {
        let engine = Arc::new(MemoryEngine::new());
        engine.fail(EngineCall::PullImage, ErrorKind::Permission);
        let registry = registry(engine.clone());

        let err = registry.start_all().await.unwrap_err();
        assert_eq!(err.container_type, "redis");
        assert_eq!(err.kind(), ErrorKind::Permission);
    }

    #[tokio::test]
    async fn test_stop_all_continues_past_failures() {
        let engine = Arc::new(MemoryEngine::new());
        let mut settings = settings();
        settings.containers.insert(
            "memcached".to_string(),
            ContainerDefinition::new("my-memcached", "memcached:1"),
        );
        let registry = ManagerRegistry::from_settings(
            &settings,
            engine.clone(),
            ManagerOptions::default(),
            CancellationToken::new(),
        )
        .unwrap();
        registry.start_all().await.unwrap();

        engine.fail(EngineCall::Stop, ErrorKind::Timeout);
        assert_eq!(registry.stop_all().await, 2);

        engine.clear_failure(EngineCall::Stop);
        assert_eq!(registry.stop_all().await, 0);
        assert_eq!(engine.container_count(), 0);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_manager() {
        let engine = Arc::new(MemoryEngine::new());
        let registry = registry(engine.clone());
        let bus = EventBus::default();
        let shutdown = CancellationToken::new();

        let handles = registry.spawn_listeners(&bus, &shutdown);
        assert_eq!(bus.publish(ContainerEvent::new("test", Action::Start)), 2);

        for _ in 0..50 {
            if engine.container_count() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(engine.container("my-redis").is_some());
        assert!(engine.container("my-nginx").is_some());

        shutdown.cancel();
        for handle in handles {
            handle.await.unwrap();
        }
    }
}
