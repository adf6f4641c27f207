//! Docker and per-container settings
//!
//! These types are deserialized from the `docker` section of the daemon
//! configuration. Keys are kebab-case.

use crate::error::ConfigError;
use crate::models::{ContainerSpec, PortMapping};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

/// When a container is started and stopped relative to the host
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleMode {
    /// Create and start on host start, stop and remove on host stop
    #[default]
    #[serde(rename = "START_AND_STOP")]
    StartAndStop,
    /// Create and start on host start, leave running on host stop
    #[serde(rename = "START_ONLY")]
    StartOnly,
    /// Never touched by host phases; events and direct calls only
    #[serde(rename = "NONE")]
    Manual,
}

impl LifecycleMode {
    pub fn starts_with_host(&self) -> bool {
        matches!(self, LifecycleMode::StartAndStop | LifecycleMode::StartOnly)
    }

    pub fn stops_with_host(&self) -> bool {
        matches!(self, LifecycleMode::StartAndStop)
    }
}

/// Connection and container settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DockerSettings {
    /// Engine endpoint, e.g. `unix:///var/run/docker.sock` or `tcp://host:2376`
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default, alias = "tls_verify")]
    pub tls_verify: bool,

    /// Directory holding `key.pem`, `cert.pem` and `ca.pem` when tls-verify is on
    #[serde(default, alias = "cert_path")]
    pub cert_path: Option<PathBuf>,

    #[serde(default)]
    pub registry: RegistrySettings,

    /// Container definitions keyed by a unique identifier
    #[serde(default)]
    pub containers: BTreeMap<String, ContainerDefinition>,
}

fn default_host() -> String {
    "unix:///var/run/docker.sock".to_string()
}

impl Default for DockerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            tls_verify: false,
            cert_path: None,
            registry: RegistrySettings::default(),
            containers: BTreeMap::new(),
        }
    }
}

impl DockerSettings {
    /// Enabled definitions in key order
    pub fn enabled_containers(&self) -> impl Iterator<Item = (&String, &ContainerDefinition)> {
        self.containers.iter().filter(|(_, def)| def.enabled)
    }

    /// Check required fields and container name uniqueness of enabled definitions
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut names: HashMap<&str, &str> = HashMap::new();

        for (key, def) in self.enabled_containers() {
            def.validate(key)?;

            if let Some(first) = names.insert(def.container_name.as_str(), key.as_str()) {
                return Err(ConfigError::DuplicateContainerName {
                    name: def.container_name.clone(),
                    first: first.to_string(),
                    second: key.clone(),
                });
            }
        }

        const SCHEMES: [&str; 4] = ["unix://", "tcp://", "http://", "https://"];
        if !SCHEMES.iter().any(|scheme| self.host.starts_with(scheme)) {
            return Err(ConfigError::InvalidHost(self.host.clone()));
        }

        if self.tls_verify && self.cert_path.is_none() {
            return Err(ConfigError::MissingCertPath);
        }

        Ok(())
    }
}

/// Registry used for image pulls
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RegistrySettings {
    #[serde(default = "default_registry_url")]
    pub url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

fn default_registry_url() -> String {
    "https://index.docker.io/v1/".to_string()
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            url: default_registry_url(),
            username: None,
            password: None,
        }
    }
}

/// Definition of one managed container
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ContainerDefinition {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default, alias = "container_name")]
    pub container_name: String,

    /// `repository[:tag]`
    #[serde(default, alias = "image_name")]
    pub image_name: String,

    #[serde(default, alias = "lifecycle_mode")]
    pub lifecycle_mode: LifecycleMode,

    /// Container port (optionally with `/proto`) to host port
    #[serde(default)]
    pub ports: BTreeMap<String, u16>,

    #[serde(default)]
    pub environment: BTreeMap<String, String>,

    /// Host path to container path
    #[serde(default)]
    pub volumes: BTreeMap<String, String>,

    #[serde(default)]
    pub labels: BTreeMap<String, String>,

    #[serde(default)]
    pub command: Option<Vec<String>>,

    #[serde(default)]
    pub entrypoint: Option<Vec<String>>,
}

fn default_enabled() -> bool {
    true
}

impl ContainerDefinition {
    /// Minimal enabled definition with default lifecycle mode
    pub fn new(container_name: impl Into<String>, image_name: impl Into<String>) -> Self {
        Self {
            enabled: true,
            container_name: container_name.into(),
            image_name: image_name.into(),
            ..Default::default()
        }
    }

    pub fn with_lifecycle_mode(mut self, mode: LifecycleMode) -> Self {
        self.lifecycle_mode = mode;
        self
    }

    pub fn with_port(mut self, container_port: impl Into<String>, host_port: u16) -> Self {
        self.ports.insert(container_port.into(), host_port);
        self
    }

    fn validate(&self, key: &str) -> Result<(), ConfigError> {
        if self.container_name.trim().is_empty() {
            return Err(ConfigError::MissingField {
                key: key.to_string(),
                field: "container-name",
            });
        }
        if self.image_name.trim().is_empty() {
            return Err(ConfigError::MissingField {
                key: key.to_string(),
                field: "image-name",
            });
        }
        Ok(())
    }

    /// Translate into the engine's creation request
    pub fn to_spec(&self) -> ContainerSpec {
        ContainerSpec {
            name: self.container_name.clone(),
            image: self.image_name.clone(),
            ports: self
                .ports
                .iter()
                .map(|(container, host)| PortMapping::new(container, *host))
                .collect(),
            env: self
                .environment
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect(),
            binds: self
                .volumes
                .iter()
                .map(|(host, container)| format!("{}:{}", host, container))
                .collect(),
            labels: self
                .labels
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            command: self.command.clone(),
            entrypoint: self.entrypoint.clone(),
        }
    }
}
