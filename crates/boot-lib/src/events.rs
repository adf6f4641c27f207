//! Event-driven control of container managers
//!
//! Publishers put [`ContainerEvent`]s on an [`EventBus`]. Every manager has
//! its own listener task that receives each event and handles them one at a
//! time. Handler failures are logged; nothing flows back to the publisher.

use crate::error::ManagerError;
use crate::manager::ContainerManager;
use crate::observability::LifecycleMetrics;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Default number of events buffered per subscriber
///
/// A listener further behind than this loses the oldest events. The loss is
/// logged and counted in `dockerboot_events_dropped_total`.
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Action requested by a container event
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Action {
    Start,
    Stop,
    Remove,
    /// Anything else; logged and ignored by managers
    Unrecognized(String),
}

impl Action {
    pub fn is_recognized(&self) -> bool {
        !matches!(self, Action::Unrecognized(_))
    }
}

impl From<&str> for Action {
    fn from(s: &str) -> Self {
        match s.trim().to_ascii_uppercase().as_str() {
            "START" => Action::Start,
            "STOP" => Action::Stop,
            "REMOVE" => Action::Remove,
            _ => Action::Unrecognized(s.to_string()),
        }
    }
}

impl From<String> for Action {
    fn from(s: String) -> Self {
        Action::from(s.as_str())
    }
}

impl From<Action> for String {
    fn from(action: Action) -> Self {
        action.to_string()
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Start => write!(f, "START"),
            Action::Stop => write!(f, "STOP"),
            Action::Remove => write!(f, "REMOVE"),
            Action::Unrecognized(s) => write!(f, "{}", s),
        }
    }
}

/// Request for managers to start, stop or remove their container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerEvent {
    pub action: Action,
    /// Opaque reference to whoever published the event
    pub source: String,
    /// Key of the one manager that should act; `None` addresses every manager
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

impl ContainerEvent {
    /// Event for every manager
    pub fn new(source: impl Into<String>, action: Action) -> Self {
        Self {
            action,
            source: source.into(),
            target: None,
        }
    }

    /// Restrict the event to one manager
    pub fn for_container(mut self, key: impl Into<String>) -> Self {
        self.target = Some(key.into());
        self
    }

    pub fn is_for(&self, key: &str) -> bool {
        self.target.as_deref().map_or(true, |target| target == key)
    }
}

impl fmt::Display for ContainerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ContainerEvent{{action={}, source={}",
            self.action, self.source
        )?;
        if let Some(target) = &self.target {
            write!(f, ", target={}", target)?;
        }
        write!(f, "}}")
    }
}

/// Broadcast channel between event publishers and managers
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ContainerEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish an event, returning how many listeners will see it
    pub fn publish(&self, event: ContainerEvent) -> usize {
        debug!(event = %event, "Publishing container event");
        match self.tx.send(event) {
            Ok(receivers) => receivers,
            Err(broadcast::error::SendError(event)) => {
                warn!(event = %event, "No listeners for container event");
                0
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ContainerEvent> {
        self.tx.subscribe()
    }

    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl ContainerManager {
    /// React to one event, holding the manager lock for the whole action
    ///
    /// Events addressed to another manager are ignored. `START` ignores the
    /// lifecycle mode and running flag; `STOP` and `REMOVE` act only on the
    /// tracked container and do nothing when none is tracked.
    pub async fn handle_event(&self, event: &ContainerEvent) -> Result<(), ManagerError> {
        if !event.is_for(self.key()) {
            return Ok(());
        }

        info!(
            container_type = %self.key(),
            action = %event.action,
            source = %event.source,
            "Received container event"
        );

        let _guard = self.lock().await;

        match &event.action {
            Action::Start => {
                self.create_and_start_locked().await?;
            }
            Action::Stop => match self.container_id() {
                Some(id) => self.stop_locked(&id).await?,
                None => debug!(container_type = %self.key(), "No tracked container to stop"),
            },
            Action::Remove => match self.container_id() {
                Some(id) => self.remove_locked(&id).await?,
                None => debug!(container_type = %self.key(), "No tracked container to remove"),
            },
            Action::Unrecognized(action) => {
                warn!(
                    container_type = %self.key(),
                    action = %action,
                    "Unknown container event action"
                );
            }
        }

        Ok(())
    }
}

/// Run a listener task feeding `manager` every event from `rx` until
/// `shutdown` is cancelled or the bus is dropped
pub fn spawn_listener(
    manager: Arc<ContainerManager>,
    mut rx: broadcast::Receiver<ContainerEvent>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        debug!(container_type = %manager.key(), "Event listener started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!(container_type = %manager.key(), "Event listener shutting down");
                    break;
                }
                received = rx.recv() => match received {
                    Ok(event) => {
                        if event.is_for(manager.key()) {
                            LifecycleMetrics::new().inc_events_received();
                        }
                        if let Err(e) = manager.handle_event(&event).await {
                            error!(
                                container_type = %manager.key(),
                                event = %event,
                                error = %e,
                                "Container event handling failed"
                            );
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        LifecycleMetrics::new().add_events_dropped(skipped);
                        warn!(
                            container_type = %manager.key(),
                            skipped = skipped,
                            "Event listener fell behind, events were dropped"
                        );
                    }
                    Err(RecvError::Closed) => {
                        debug!(container_type = %manager.key(), "Event bus closed");
                        break;
                    }
                },
            }
        }
    })
}
