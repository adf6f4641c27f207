//! Core data models shared by managers and engines

use crate::settings::LifecycleMode;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Everything the engine needs to create one container
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub ports: Vec<PortMapping>,
    /// `KEY=value` pairs
    pub env: Vec<String>,
    /// `host-path:container-path` binds
    pub binds: Vec<String>,
    pub labels: HashMap<String, String>,
    pub command: Option<Vec<String>>,
    pub entrypoint: Option<Vec<String>>,
}

/// A container port published on the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortMapping {
    /// Port with protocol, e.g. `6379/tcp`
    pub container_port: String,
    pub host_port: u16,
}

impl PortMapping {
    /// Build a mapping, defaulting the protocol to tcp
    pub fn new(container_port: &str, host_port: u16) -> Self {
        let container_port = if container_port.contains('/') {
            container_port.to_string()
        } else {
            format!("{}/tcp", container_port)
        };

        Self {
            container_port,
            host_port,
        }
    }
}

/// An image known to the local engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalImage {
    pub id: String,
    pub repo_tags: Vec<String>,
}

impl LocalImage {
    /// True if any tag of this image equals the reference exactly
    pub fn matches(&self, reference: &str) -> bool {
        self.repo_tags.iter().any(|tag| tag == reference)
    }
}

/// Result of inspecting a container by name or id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InspectedContainer {
    pub id: String,
    pub name: String,
    pub running: bool,
}

/// Point-in-time view of one manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerStatus {
    pub key: String,
    pub container_name: String,
    pub image_name: String,
    pub lifecycle_mode: LifecycleMode,
    pub running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}
