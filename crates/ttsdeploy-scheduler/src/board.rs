//! Shared per-service status for one run

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::debug;
use ttsdeploy_core::{PhaseTransition, ServiceDescriptor, ServicePhase, ServiceStatus};

use crate::cancel::Cancellation;

struct Entry {
    tx: watch::Sender<ServiceStatus>,
    starting_since: Mutex<Option<Instant>>,
}

/// How waiting on a dependency ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyState {
    /// Reached `Starting` or later
    Started,
    /// Failed, so it will never start in this run
    Failed,
    /// The run was cancelled first
    Interrupted,
}

/// Status of every active service, observable while the run progresses
///
/// Each service has its own watch channel, so dependents wake on exactly the
/// transition they wait for. No lock is held across an await.
pub struct StatusBoard {
    order: Vec<String>,
    entries: HashMap<String, Entry>,
    history: Mutex<Vec<PhaseTransition>>,
}

impl StatusBoard {
    /// Create a board with every service `Pending`
    pub fn new(services: &[ServiceDescriptor]) -> Self {
        let entries = services
            .iter()
            .map(|s| {
                let (tx, _) = watch::channel(ServiceStatus::pending(s));
                (
                    s.name.clone(),
                    Entry {
                        tx,
                        starting_since: Mutex::new(None),
                    },
                )
            })
            .collect();

        Self {
            order: services.iter().map(|s| s.name.clone()).collect(),
            entries,
            history: Mutex::new(Vec::new()),
        }
    }

    /// Current status of one service
    pub fn get(&self, name: &str) -> Option<ServiceStatus> {
        self.entries.get(name).map(|e| e.tx.borrow().clone())
    }

    /// Current status of every service, in dependency order
    pub fn snapshot(&self) -> Vec<ServiceStatus> {
        self.order.iter().filter_map(|name| self.get(name)).collect()
    }

    /// Every phase change so far, oldest first
    pub fn history(&self) -> Vec<PhaseTransition> {
        self.history
            .lock()
            .map(|h| h.clone())
            .unwrap_or_default()
    }

    pub fn subscribe(&self, name: &str) -> Option<watch::Receiver<ServiceStatus>> {
        self.entries.get(name).map(|e| e.tx.subscribe())
    }

    /// When the service entered `Starting`
    pub fn starting_since(&self, name: &str) -> Option<Instant> {
        self.entries
            .get(name)
            .and_then(|e| e.starting_since.lock().ok().and_then(|s| *s))
    }

    /// Modify a status without changing its phase
    pub fn update(&self, name: &str, f: impl FnOnce(&mut ServiceStatus)) {
        if let Some(entry) = self.entries.get(name) {
            entry.tx.send_modify(f);
        }
    }

    /// Move a service to a new phase
    pub fn transition(&self, name: &str, phase: ServicePhase) {
        self.set_phase(name, phase, None);
    }

    /// Mark a service failed with a reason
    pub fn fail(&self, name: &str, error: impl Into<String>) {
        self.set_phase(name, ServicePhase::Failed, Some(error.into()));
    }

    /// Record a finished build while the service waits for its dependencies
    pub fn mark_built(&self, name: &str) {
        self.update(name, |s| s.built_at = Some(Utc::now()));
    }

    /// Record a started container and move the service to `Starting`
    pub fn mark_starting(&self, name: &str, container_id: String) {
        if let Some(entry) = self.entries.get(name) {
            if let Ok(mut since) = entry.starting_since.lock() {
                *since = Some(Instant::now());
            }
        }
        self.update(name, |s| s.container_id = Some(container_id));
        self.transition(name, ServicePhase::Starting);
    }

    /// Count a health attempt, keeping its error if it failed
    pub fn record_attempt(&self, name: &str, error: Option<String>) {
        self.update(name, |s| {
            s.health_attempts += 1;
            if error.is_some() {
                s.last_error = error;
            }
        });
    }

    fn set_phase(&self, name: &str, phase: ServicePhase, error: Option<String>) {
        let Some(entry) = self.entries.get(name) else {
            return;
        };

        // The history entry must exist before dependents can observe the change.
        if let Ok(mut history) = self.history.lock() {
            history.push(PhaseTransition {
                service: name.to_string(),
                phase,
                at: Utc::now(),
            });
        }

        entry.tx.send_modify(|s| {
            if let Some(error) = error {
                s.last_error = Some(error);
            }
            s.transition(phase);
        });
        debug!(service = name, phase = %phase, "Phase changed");
    }

    /// Wait until `name` has started or failed, or the run is cancelled
    pub async fn wait_started(&self, name: &str, cancel: &Cancellation) -> DependencyState {
        let Some(mut rx) = self.subscribe(name) else {
            return DependencyState::Failed;
        };

        tokio::select! {
            result = rx.wait_for(|s| s.phase.has_started() || s.phase == ServicePhase::Failed) => {
                match result.map(|s| s.phase) {
                    Ok(ServicePhase::Failed) | Err(_) => DependencyState::Failed,
                    Ok(_) => DependencyState::Started,
                }
            }
            _ = cancel.cancelled() => DependencyState::Interrupted,
        }
    }
}
