//! Session registry: the host side that mounts wizards and unmounts them
//! when they ask to close.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::controller::{ControllerConfig, WizardController, WizardEvent};
use super::gateway::SubmissionGateway;
use super::steps::StepCatalog;
use crate::error::WizardError;

/// Open wizard sessions, keyed by session id.
pub struct SessionRegistry {
    catalog: Arc<StepCatalog>,
    gateway: Arc<dyn SubmissionGateway>,
    config: ControllerConfig,
    sessions: RwLock<HashMap<Uuid, Arc<WizardController>>>,
}

impl SessionRegistry {
    pub fn new(
        catalog: Arc<StepCatalog>,
        gateway: Arc<dyn SubmissionGateway>,
        config: ControllerConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            catalog,
            gateway,
            config,
            sessions: RwLock::new(HashMap::new()),
        })
    }

    pub fn catalog(&self) -> &StepCatalog {
        &self.catalog
    }

    /// Mount a new wizard with a fresh session.
    pub async fn open(self: &Arc<Self>) -> Arc<WizardController> {
        let controller = WizardController::open(
            Arc::clone(&self.catalog),
            Arc::clone(&self.gateway),
            self.config.clone(),
        );
        let id = controller.id();
        let rx = controller.subscribe();

        self.sessions
            .write()
            .await
            .insert(id, Arc::clone(&controller));
        self.watch(id, rx);

        controller
    }

    /// Unmount a session once it requests close or is closed.
    fn watch(self: &Arc<Self>, id: Uuid, mut rx: tokio::sync::broadcast::Receiver<WizardEvent>) {
        let registry = Arc::downgrade(self);
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(WizardEvent::CloseRequested { .. } | WizardEvent::Closed { .. }) => break,
                    Ok(_) => {}
                    Err(RecvError::Lagged(n)) => {
                        debug!(session_id = %id, missed = n, "Registry watcher lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            if let Some(registry) = registry.upgrade() {
                if registry.sessions.write().await.remove(&id).is_some() {
                    info!(session_id = %id, "Session unmounted");
                }
            }
        });
    }

    pub async fn get(&self, id: Uuid) -> Result<Arc<WizardController>, WizardError> {
        self.sessions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(WizardError::SessionNotFound(id))
    }

    /// Manual close from the host (user dismissed the wizard).
    pub async fn close(&self, id: Uuid) -> Result<(), WizardError> {
        let controller = self.sessions.write().await.remove(&id);
        match controller {
            Some(controller) => {
                controller.close();
                Ok(())
            }
            None => {
                warn!(session_id = %id, "Close requested for unknown session");
                Err(WizardError::SessionNotFound(id))
            }
        }
    }

    /// Close every open session. Used on server shutdown.
    pub async fn close_all(&self) -> usize {
        let drained: Vec<_> = self.sessions.write().await.drain().collect();
        for (_, controller) in &drained {
            controller.close();
        }
        drained.len()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
