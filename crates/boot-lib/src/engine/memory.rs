//! In-process container engine
//!
//! Keeps containers and images in memory and mirrors the Docker daemon's
//! answers closely enough to exercise the lifecycle logic: names are unique,
//! running containers refuse a plain remove, and repeated start/stop report
//! `NotModified`. Failures can be injected per call.

use super::ContainerEngine;
use crate::error::{EngineError, ErrorKind};
use crate::models::{ContainerSpec, InspectedContainer, LocalImage};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Engine calls that can be counted or made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineCall {
    Inspect,
    RemoveForce,
    ListImages,
    PullImage,
    Create,
    Start,
    Stop,
    Remove,
}

/// A container held by [`MemoryEngine`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryContainer {
    pub id: String,
    pub name: String,
    pub running: bool,
    pub spec: ContainerSpec,
}

#[derive(Default)]
struct MemoryState {
    containers: HashMap<String, MemoryContainer>,
    images: Vec<LocalImage>,
    next_seq: u64,
    calls: HashMap<EngineCall, usize>,
    failures: HashMap<EngineCall, ErrorKind>,
    pull_delay: Option<Duration>,
}

impl MemoryState {
    fn record(&mut self, call: EngineCall) -> Result<(), EngineError> {
        *self.calls.entry(call).or_insert(0) += 1;
        match self.failures.get(&call) {
            Some(kind) => Err(EngineError::new(*kind, format!("injected {:?} failure", call))),
            None => Ok(()),
        }
    }

    fn find(&self, name_or_id: &str) -> Option<&MemoryContainer> {
        self.containers
            .get(name_or_id)
            .or_else(|| self.containers.values().find(|c| c.name == name_or_id))
    }

    fn find_id(&self, name_or_id: &str) -> Option<String> {
        self.find(name_or_id).map(|c| c.id.clone())
    }
}

/// [`ContainerEngine`] that never leaves the process
#[derive(Default)]
pub struct MemoryEngine {
    state: Mutex<MemoryState>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine that already holds the given image tags
    pub fn with_images<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let engine = Self::new();
        {
            let mut state = engine.lock();
            for tag in tags {
                let tag = tag.into();
                state.images.push(LocalImage {
                    id: image_id(&tag),
                    repo_tags: vec![tag],
                });
            }
        }
        engine
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make every subsequent `call` fail with `kind`
    pub fn fail(&self, call: EngineCall, kind: ErrorKind) {
        self.lock().failures.insert(call, kind);
    }

    pub fn clear_failure(&self, call: EngineCall) {
        self.lock().failures.remove(&call);
    }

    /// Delay each pull by `delay` before it completes
    pub fn set_pull_delay(&self, delay: Duration) {
        self.lock().pull_delay = Some(delay);
    }

    /// Add an image record carrying several tags
    pub fn add_image(&self, repo_tags: Vec<String>) {
        let mut state = self.lock();
        let id = image_id(repo_tags.first().map(String::as_str).unwrap_or_default());
        state.images.push(LocalImage { id, repo_tags });
    }

    pub fn call_count(&self, call: EngineCall) -> usize {
        self.lock().calls.get(&call).copied().unwrap_or(0)
    }

    /// Total number of recorded calls of any kind
    pub fn total_calls(&self) -> usize {
        self.lock().calls.values().sum()
    }

    pub fn container(&self, name_or_id: &str) -> Option<MemoryContainer> {
        self.lock().find(name_or_id).cloned()
    }

    pub fn containers_named(&self, name: &str) -> Vec<MemoryContainer> {
        self.lock()
            .containers
            .values()
            .filter(|c| c.name == name)
            .cloned()
            .collect()
    }

    pub fn container_count(&self) -> usize {
        self.lock().containers.len()
    }

    pub fn has_image(&self, reference: &str) -> bool {
        self.lock().images.iter().any(|image| image.matches(reference))
    }
}

fn image_id(tag: &str) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(tag.as_bytes())))
}

#[async_trait]
impl ContainerEngine for MemoryEngine {
    async fn inspect_container(&self, name: &str) -> Result<InspectedContainer, EngineError> {
        let mut state = self.lock();
        state.record(EngineCall::Inspect)?;

        state
            .find(name)
            .map(|c| InspectedContainer {
                id: c.id.clone(),
                name: c.name.clone(),
                running: c.running,
            })
            .ok_or_else(|| EngineError::not_found(format!("No such container: {}", name)))
    }

    async fn remove_container_force(&self, name: &str) -> Result<(), EngineError> {
        let mut state = self.lock();
        state.record(EngineCall::RemoveForce)?;

        let id = state
            .find_id(name)
            .ok_or_else(|| EngineError::not_found(format!("No such container: {}", name)))?;
        state.containers.remove(&id);
        Ok(())
    }

    async fn list_images(&self) -> Result<Vec<LocalImage>, EngineError> {
        let mut state = self.lock();
        state.record(EngineCall::ListImages)?;
        Ok(state.images.clone())
    }

    async fn pull_image(&self, reference: &str) -> Result<(), EngineError> {
        let delay = {
            let mut state = self.lock();
            state.record(EngineCall::PullImage)?;
            state.pull_delay
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.lock();
        if !state.images.iter().any(|image| image.matches(reference)) {
            state.images.push(LocalImage {
                id: image_id(reference),
                repo_tags: vec![reference.to_string()],
            });
        }
        Ok(())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, EngineError> {
        let mut state = self.lock();
        state.record(EngineCall::Create)?;

        if state.containers.values().any(|c| c.name == spec.name) {
            return Err(EngineError::conflict(format!(
                "Conflict. The container name \"/{}\" is already in use",
                spec.name
            )));
        }
        if !state.images.iter().any(|image| image.matches(&spec.image)) {
            return Err(EngineError::not_found(format!("No such image: {}", spec.image)));
        }

        state.next_seq += 1;
        let id = hex::encode(Sha256::digest(format!("{}-{}", spec.name, state.next_seq)));
        state.containers.insert(
            id.clone(),
            MemoryContainer {
                id: id.clone(),
                name: spec.name.clone(),
                running: false,
                spec: spec.clone(),
            },
        );
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> Result<(), EngineError> {
        let mut state = self.lock();
        state.record(EngineCall::Start)?;

        let container = state
            .containers
            .get_mut(id)
            .ok_or_else(|| EngineError::not_found(format!("No such container: {}", id)))?;
        if container.running {
            return Err(EngineError::new(ErrorKind::NotModified, "container already started"));
        }
        container.running = true;
        Ok(())
    }

    async fn stop_container(&self, id: &str, _timeout: Duration) -> Result<(), EngineError> {
        let mut state = self.lock();
        state.record(EngineCall::Stop)?;

        let container = state
            .containers
            .get_mut(id)
            .ok_or_else(|| EngineError::not_found(format!("No such container: {}", id)))?;
        if !container.running {
            return Err(EngineError::new(ErrorKind::NotModified, "container already stopped"));
        }
        container.running = false;
        Ok(())
    }

    async fn remove_container(&self, id: &str) -> Result<(), EngineError> {
        let mut state = self.lock();
        state.record(EngineCall::Remove)?;

        match state.containers.get(id).map(|c| c.running) {
            None => Err(EngineError::not_found(format!("No such container: {}", id))),
            Some(true) => Err(EngineError::conflict(format!(
                "You cannot remove a running container {}. Stop the container before attempting removal or force remove",
                id
            ))),
            Some(false) => {
                state.containers.remove(id);
                Ok(())
            }
        }
    }
}
