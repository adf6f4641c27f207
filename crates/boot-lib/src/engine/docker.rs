//! Docker engine backed by bollard

use super::ContainerEngine;
use crate::error::{EngineError, ErrorKind};
use crate::models::{ContainerSpec, InspectedContainer, LocalImage};
use crate::settings::DockerSettings;
use async_trait::async_trait;
use bollard::auth::DockerCredentials;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, RemoveContainerOptions,
    StartContainerOptions, StopContainerOptions,
};
use bollard::errors::Error as DockerError;
use bollard::image::{CreateImageOptions, ListImagesOptions};
use bollard::models::{HostConfig, PortBinding};
use bollard::{Docker, API_DEFAULT_VERSION};
use futures::TryStreamExt;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

impl From<DockerError> for EngineError {
    fn from(err: DockerError) -> Self {
        let kind = match &err {
            DockerError::DockerResponseServerError { status_code, .. } => match *status_code {
                304 => ErrorKind::NotModified,
                401 | 403 => ErrorKind::Permission,
                404 => ErrorKind::NotFound,
                409 => ErrorKind::Conflict,
                408 | 504 => ErrorKind::Timeout,
                _ => ErrorKind::Other,
            },
            DockerError::RequestTimeoutError => ErrorKind::Timeout,
            DockerError::DockerStreamError { .. } => ErrorKind::Other,
            _ => ErrorKind::Transport,
        };

        EngineError::new(kind, err.to_string()).with_source(err)
    }
}

/// [`ContainerEngine`] talking to a Docker daemon
#[derive(Clone)]
pub struct DockerEngine {
    docker: Docker,
    credentials: Option<DockerCredentials>,
}

impl DockerEngine {
    /// Connect using the configured host, TLS and registry settings
    ///
    /// `request_timeout` bounds every engine request, including image pulls.
    pub fn connect(settings: &DockerSettings, request_timeout: Duration) -> Result<Self, EngineError> {
        let timeout = request_timeout.as_secs();
        let host = settings.host.as_str();

        let docker = if host.starts_with("unix://") {
            Docker::connect_with_unix(host, timeout, API_DEFAULT_VERSION)?
        } else if host.starts_with("tcp://") || host.starts_with("http://") || host.starts_with("https://") {
            match (settings.tls_verify, settings.cert_path.as_ref()) {
                (true, Some(certs)) => Docker::connect_with_ssl(
                    host,
                    &certs.join("key.pem"),
                    &certs.join("cert.pem"),
                    &certs.join("ca.pem"),
                    timeout,
                    API_DEFAULT_VERSION,
                )?,
                (true, None) => {
                    return Err(EngineError::new(
                        ErrorKind::Permission,
                        "tls-verify is enabled but no cert-path is configured",
                    ))
                }
                (false, _) => Docker::connect_with_http(host, timeout, API_DEFAULT_VERSION)?,
            }
        } else {
            return Err(EngineError::new(
                ErrorKind::Transport,
                format!("unsupported docker host '{}'", host),
            ));
        };

        let credentials = settings.registry.username.as_ref().map(|username| DockerCredentials {
            username: Some(username.clone()),
            password: settings.registry.password.clone(),
            serveraddress: Some(settings.registry.url.clone()),
            ..Default::default()
        });

        info!(host = %host, tls_verify = settings.tls_verify, "Configured Docker client");

        Ok(Self {
            docker,
            credentials,
        })
    }

    /// Check that the daemon answers
    pub async fn ping(&self) -> Result<(), EngineError> {
        self.docker.ping().await?;
        Ok(())
    }
}

/// Refuse a start or stop that would leave the container as it is
///
/// The daemon answers such requests with 304, which bollard reports as
/// success, so the state is checked up front.
fn check_transition(id: &str, running: bool, want_running: bool) -> Result<(), EngineError> {
    if running == want_running {
        let state = if running { "started" } else { "stopped" };
        return Err(EngineError::new(
            ErrorKind::NotModified,
            format!("container {} already {}", id, state),
        ));
    }
    Ok(())
}

/// Split `repo[:tag]` into repository and tag, defaulting the tag to `latest`
///
/// Digest references are passed through whole with an empty tag.
fn split_reference(reference: &str) -> (&str, &str) {
    if reference.contains('@') {
        return (reference, "");
    }

    let name_start = reference.rfind('/').map(|i| i + 1).unwrap_or(0);
    match reference[name_start..].rfind(':') {
        Some(i) => {
            let split = name_start + i;
            (&reference[..split], &reference[split + 1..])
        }
        None => (reference, "latest"),
    }
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn inspect_container(&self, name: &str) -> Result<InspectedContainer, EngineError> {
        let response = self
            .docker
            .inspect_container(name, None::<InspectContainerOptions>)
            .await?;

        Ok(InspectedContainer {
            id: response.id.unwrap_or_default(),
            name: response
                .name
                .map(|n| n.trim_start_matches('/').to_string())
                .unwrap_or_else(|| name.to_string()),
            running: response.state.and_then(|s| s.running).unwrap_or(false),
        })
    }

    async fn remove_container_force(&self, name: &str) -> Result<(), EngineError> {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        self.docker.remove_container(name, Some(options)).await?;
        Ok(())
    }

    async fn list_images(&self) -> Result<Vec<LocalImage>, EngineError> {
        let options = ListImagesOptions::<String> {
            all: false,
            ..Default::default()
        };

        let images = self.docker.list_images(Some(options)).await?;
        Ok(images
            .into_iter()
            .map(|image| LocalImage {
                id: image.id,
                repo_tags: image.repo_tags,
            })
            .collect())
    }

    async fn pull_image(&self, reference: &str) -> Result<(), EngineError> {
        let (repository, tag) = split_reference(reference);
        let options = CreateImageOptions {
            from_image: repository.to_string(),
            tag: tag.to_string(),
            ..Default::default()
        };

        let mut stream = self
            .docker
            .create_image(Some(options), None, self.credentials.clone());

        while let Some(progress) = stream.try_next().await? {
            if let Some(status) = progress.status {
                debug!(image = %reference, status = %status, "Pull progress");
            }
        }

        Ok(())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, EngineError> {
        let exposed_ports: HashMap<String, HashMap<(), ()>> = spec
            .ports
            .iter()
            .map(|p| (p.container_port.clone(), HashMap::new()))
            .collect();

        let port_bindings: HashMap<String, Option<Vec<PortBinding>>> = spec
            .ports
            .iter()
            .map(|p| {
                (
                    p.container_port.clone(),
                    Some(vec![PortBinding {
                        host_ip: None,
                        host_port: Some(p.host_port.to_string()),
                    }]),
                )
            })
            .collect();

        let config = Config {
            image: Some(spec.image.clone()),
            cmd: spec.command.clone(),
            entrypoint: spec.entrypoint.clone(),
            env: (!spec.env.is_empty()).then(|| spec.env.clone()),
            labels: (!spec.labels.is_empty()).then(|| spec.labels.clone()),
            exposed_ports: Some(exposed_ports),
            host_config: Some(HostConfig {
                port_bindings: Some(port_bindings),
                binds: (!spec.binds.is_empty()).then(|| spec.binds.clone()),
                ..Default::default()
            }),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: spec.name.clone(),
            platform: None,
        };

        let response = self.docker.create_container(Some(options), config).await?;
        for warning in &response.warnings {
            warn!(container_name = %spec.name, warning = %warning, "Engine warning on create");
        }

        Ok(response.id)
    }

    async fn start_container(&self, id: &str) -> Result<(), EngineError> {
        let current = self.inspect_container(id).await?;
        check_transition(id, current.running, true)?;

        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await?;
        Ok(())
    }

    async fn stop_container(&self, id: &str, timeout: Duration) -> Result<(), EngineError> {
        let current = self.inspect_container(id).await?;
        check_transition(id, current.running, false)?;

        let options = StopContainerOptions {
            t: timeout.as_secs() as i64,
        };
        self.docker.stop_container(id, Some(options)).await?;
        Ok(())
    }

    async fn remove_container(&self, id: &str) -> Result<(), EngineError> {
        self.docker
            .remove_container(id, None::<RemoveContainerOptions>)
            .await?;
        Ok(())
    }
}
