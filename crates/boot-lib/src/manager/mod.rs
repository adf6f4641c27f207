//! Container state machine
//!
//! A [`ContainerManager`] owns one container definition and tracks whether it
//! believes its container is running plus the engine id of that container.
//!
//! Every state-changing operation (create+start, stop, remove, host phase
//! hooks, event handling) runs under a per-manager async lock, so transitions
//! of one manager never interleave. Different managers are independent.


use crate::engine::ContainerEngine;
use crate::error::{EngineError, ManagerError, Operation};
use crate::models::ManagerStatus;
use crate::observability::LifecycleMetrics;
use crate::resource::ResourceManager;
use crate::settings::{ContainerDefinition, LifecycleMode};
use async_trait::async_trait;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Tunables shared by every manager
#[derive(Debug, Clone)]
pub struct ManagerOptions {
    /// Upper bound for a single image pull; `None` waits indefinitely
    pub pull_timeout: Option<Duration>,
    /// Grace period before the engine kills a stopping container
    pub stop_timeout: Duration,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            pull_timeout: Some(Duration::from_secs(600)),
            stop_timeout: Duration::from_secs(10),
        }
    }
}

/// What a manager currently believes about its container
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManagerState {
    /// Set by a successful create+start, cleared by stop, remove and host stop
    pub running: bool,
    /// Engine id of the container this manager created last
    pub container_id: Option<String>,
    /// Message of the most recent failed operation, cleared by the next success
    pub last_error: Option<String>,
}

/// Lifecycle manager for one configured container
pub struct ContainerManager {
    key: String,
    definition: ContainerDefinition,
    engine: Arc<dyn ContainerEngine>,
    options: ManagerOptions,
    shutdown: CancellationToken,
    metrics: LifecycleMetrics,
    op_lock: Mutex<()>,
    state: RwLock<ManagerState>,
}

impl ContainerManager {
    pub fn new(
        key: impl Into<String>,
        definition: ContainerDefinition,
        engine: Arc<dyn ContainerEngine>,
    ) -> Self {
        Self {
            key: key.into(),
            definition,
            engine,
            options: ManagerOptions::default(),
            shutdown: CancellationToken::new(),
            metrics: LifecycleMetrics::new(),
            op_lock: Mutex::new(()),
            state: RwLock::new(ManagerState::default()),
        }
    }

    pub fn with_options(mut self, options: ManagerOptions) -> Self {
        self.options = options;
        self
    }

    /// Cancelling `token` interrupts an image pull in progress
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    /// Definition key; also the container type in logs and errors
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn definition(&self) -> &ContainerDefinition {
        &self.definition
    }

    pub fn lifecycle_mode(&self) -> LifecycleMode {
        self.definition.lifecycle_mode
    }

    pub fn container_id(&self) -> Option<String> {
        self.read_state().container_id.clone()
    }

    pub fn state(&self) -> ManagerState {
        self.read_state().clone()
    }

    pub fn status(&self) -> ManagerStatus {
        let state = self.state();
        ManagerStatus {
            key: self.key.clone(),
            container_name: self.definition.container_name.clone(),
            image_name: self.definition.image_name.clone(),
            lifecycle_mode: self.definition.lifecycle_mode,
            running: state.running,
            container_id: state.container_id,
            last_error: state.last_error,
        }
    }

    fn read_state(&self) -> RwLockReadGuard<'_, ManagerState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, ManagerState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Serialize a transition against every other transition of this manager
    pub(crate) async fn lock(&self) -> MutexGuard<'_, ()> {
        self.op_lock.lock().await
    }

    pub(crate) fn set_running(&self, running: bool) {
        let mut state = self.write_state();
        if state.running != running {
            if running {
                self.metrics.inc_running();
            } else {
                self.metrics.dec_running();
            }
            state.running = running;
        }
    }

    pub(crate) fn clear_container_id(&self) {
        self.write_state().container_id = None;
    }

    /// Log, count and wrap a failed operation
    fn fail(&self, operation: Operation, container_id: Option<&str>, source: EngineError) -> ManagerError {
        error!(
            container_type = %self.key,
            operation = operation.as_str(),
            container_id = container_id.unwrap_or(""),
            kind = %source.kind(),
            error = %source,
            "Failed to {} {} container",
            operation,
            self.key
        );
        self.metrics.inc_failure(&self.key, operation.as_str());

        let err = ManagerError::new(&self.key, operation, source);
        self.write_state().last_error = Some(format!("{}: {}", err, err.source));
        err
    }

    /// Create and start while the caller holds the manager lock
    pub(crate) async fn create_and_start_locked(&self) -> Result<String, ManagerError> {
        self.metrics
            .inc_operation(&self.key, Operation::CreateAndStart.as_str());

        let id = self
            .try_create_and_start()
            .await
            .map_err(|e| self.fail(Operation::CreateAndStart, None, e))?;

        info!(
            container_type = %self.key,
            container_id = %id,
            container_name = %self.definition.container_name,
            "{} container started",
            self.key
        );

        {
            let mut state = self.write_state();
            state.container_id = Some(id.clone());
            state.last_error = None;
        }
        self.set_running(true);

        Ok(id)
    }

    async fn try_create_and_start(&self) -> Result<String, EngineError> {
        self.remove_existing_container().await?;
        self.ensure_image_exists().await?;

        let id = self
            .engine
            .create_container(&self.definition.to_spec())
            .await?;

        if let Err(e) = self.engine.start_container(&id).await {
            warn!(
                container_type = %self.key,
                container_id = %id,
                "Created container could not be started; it is left for the next create to remove"
            );
            return Err(e);
        }

        Ok(id)
    }

    /// Force-remove any container already holding our name
    async fn remove_existing_container(&self) -> Result<(), EngineError> {
        let name = &self.definition.container_name;

        match self.engine.inspect_container(name).await {
            Ok(existing) => {
                info!(
                    container_type = %self.key,
                    container_name = %name,
                    container_id = %existing.id,
                    running = existing.running,
                    "Existing {} container found. Removing...",
                    self.key
                );
                self.engine.remove_container_force(name).await?;
                info!(container_type = %self.key, "Existing {} container removed", self.key);
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                info!(container_type = %self.key, "No existing {} container found", self.key);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Pull the configured image unless a local image carries its exact tag
    async fn ensure_image_exists(&self) -> Result<(), EngineError> {
        let image = &self.definition.image_name;
        let images = self.engine.list_images().await?;

        if images.iter().any(|local| local.matches(image)) {
            debug!(container_type = %self.key, image = %image, "Image present locally");
            return Ok(());
        }

        info!(
            container_type = %self.key,
            image = %image,
            "Image {} not found locally. Downloading...",
            image
        );

        let start = Instant::now();
        self.pull_image(image).await?;
        self.metrics.observe_image_pull(start.elapsed().as_secs_f64());

        info!(container_type = %self.key, image = %image, "Image {} download completed", image);
        Ok(())
    }

    /// Wait for a pull, bounded by the pull timeout and the shutdown token
    async fn pull_image(&self, image: &str) -> Result<(), EngineError> {
        let pull = async {
            match self.options.pull_timeout {
                Some(limit) => match tokio::time::timeout(limit, self.engine.pull_image(image)).await {
                    Ok(result) => result,
                    Err(_) => Err(EngineError::timeout(format!(
                        "image pull of {} did not finish within {}s",
                        image,
                        limit.as_secs()
                    ))),
                },
                None => self.engine.pull_image(image).await,
            }
        };

        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => {
                Err(EngineError::interrupted(format!("image pull of {} was interrupted", image)))
            }
            result = pull => result,
        }
    }

    /// Stop while the caller holds the manager lock
    pub(crate) async fn stop_locked(&self, container_id: &str) -> Result<(), ManagerError> {
        self.metrics.inc_operation(&self.key, Operation::Stop.as_str());

        self.engine
            .stop_container(container_id, self.options.stop_timeout)
            .await
            .map_err(|e| self.fail(Operation::Stop, Some(container_id), e))?;

        info!(
            container_type = %self.key,
            container_id = %container_id,
            "{} container stopped",
            self.key
        );

        self.write_state().last_error = None;
        if self.container_id().as_deref() == Some(container_id) {
            self.set_running(false);
        }
        Ok(())
    }

    /// Remove while the caller holds the manager lock
    ///
    /// Removing the tracked container clears the tracked id.
    pub(crate) async fn remove_locked(&self, container_id: &str) -> Result<(), ManagerError> {
        self.metrics.inc_operation(&self.key, Operation::Remove.as_str());

        self.engine
            .remove_container(container_id)
            .await
            .map_err(|e| self.fail(Operation::Remove, Some(container_id), e))?;

        info!(
            container_type = %self.key,
            container_id = %container_id,
            "{} container removed",
            self.key
        );

        self.write_state().last_error = None;
        if self.container_id().as_deref() == Some(container_id) {
            self.clear_container_id();
            self.set_running(false);
        }
        Ok(())
    }
}

#[async_trait]
impl ResourceManager for ContainerManager {
    async fn create_and_start(&self) -> Result<String, ManagerError> {
        let _guard = self.lock().await;
        self.create_and_start_locked().await
    }

    async fn stop(&self, resource_id: &str) -> Result<(), ManagerError> {
        let _guard = self.lock().await;
        self.stop_locked(resource_id).await
    }

    async fn remove(&self, resource_id: &str) -> Result<(), ManagerError> {
        let _guard = self.lock().await;
        self.remove_locked(resource_id).await
    }
}
