//! Docker container lifecycle library
//!
//! This crate provides the core functionality for:
//! - Creating, starting, stopping and removing configured containers
//! - Binding container lifecycles to the host's start/stop phases
//! - Event-driven control of managers over a broadcast bus
//! - Health checks and observability

pub mod engine;
pub mod error;
pub mod events;
pub mod health;
pub mod lifecycle;
pub mod manager;
pub mod models;
pub mod observability;
pub mod registry;
pub mod resource;
pub mod settings;

pub use engine::{ContainerEngine, DockerEngine, MemoryEngine};
pub use error::{ConfigError, EngineError, ErrorKind, ManagerError, Operation};
pub use events::{Action, ContainerEvent, EventBus};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use lifecycle::HostLifecycle;
pub use manager::{ContainerManager, ManagerOptions, ManagerState};
pub use models::*;
pub use observability::{LifecycleMetrics, StructuredLogger};
pub use registry::ManagerRegistry;
pub use resource::ResourceManager;
pub use settings::{ContainerDefinition, DockerSettings, LifecycleMode, RegistrySettings};
