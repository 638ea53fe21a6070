//! WizardController: owns one session, gates navigation, runs the submit
//! lifecycle and the deferred teardown.
//!
//! Mutations are serialized through the session mutex, so each operation
//! (including re-validation) completes before the next starts. The gateway
//! call is made with the lock released; the `Submitting` state is what keeps
//! a second submit out.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::fields::BlankPolicy;
use super::gateway::{FormSnapshot, SubmissionGateway};
use super::session::{Controls, SessionView, SubmissionState, WizardSession};
use super::steps::StepCatalog;
use crate::error::{GatewayError, WizardError};

/// Event channel capacity per session.
const EVENT_CAPACITY: usize = 64;

/// Engine settings shared by every session a host opens.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// How long a succeeded session stays open before requesting close.
    pub teardown_delay: Duration,
    /// Upper bound on one gateway call.
    pub submit_timeout: Duration,
    pub blank_policy: BlankPolicy,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            teardown_delay: Duration::from_secs(3),
            submit_timeout: Duration::from_secs(30),
            blank_policy: BlankPolicy::Trim,
        }
    }
}

/// Things a host may want to react to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WizardEvent {
    StepChanged {
        session_id: Uuid,
        step: usize,
        step_id: String,
    },
    FieldChanged {
        session_id: Uuid,
        field: String,
        revision: u64,
    },
    SubmissionStarted {
        session_id: Uuid,
        attempt: u32,
    },
    SubmissionSucceeded {
        session_id: Uuid,
        reference: String,
    },
    SubmissionFailed {
        session_id: Uuid,
        reason: String,
        attempts: u32,
    },
    /// The teardown delay after success elapsed; the host should unmount.
    CloseRequested { session_id: Uuid },
    Closed { session_id: Uuid },
}

/// Drives one [`WizardSession`].
pub struct WizardController {
    id: Uuid,
    session: Mutex<WizardSession>,
    gateway: Arc<dyn SubmissionGateway>,
    config: ControllerConfig,
    closed: AtomicBool,
    teardown: StdMutex<Option<JoinHandle<()>>>,
    tx: broadcast::Sender<WizardEvent>,
}

impl WizardController {
    /// Open a fresh session.
    pub fn open(
        catalog: Arc<StepCatalog>,
        gateway: Arc<dyn SubmissionGateway>,
        config: ControllerConfig,
    ) -> Arc<Self> {
        let session = WizardSession::new(catalog, config.blank_policy);
        let id = session.id();
        let (tx, _rx) = broadcast::channel(EVENT_CAPACITY);
        info!(session_id = %id, gateway = gateway.name(), "Wizard opened");
        Arc::new(Self {
            id,
            session: Mutex::new(session),
            gateway,
            config,
            closed: AtomicBool::new(false),
            teardown: StdMutex::new(None),
            tx,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WizardEvent> {
        self.tx.subscribe()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Whether a post-success teardown is scheduled and has not fired.
    pub fn has_pending_teardown(&self) -> bool {
        self.teardown
            .lock()
            .map(|slot| slot.as_ref().is_some_and(|h| !h.is_finished()))
            .unwrap_or(false)
    }

    fn ensure_open(&self) -> Result<(), WizardError> {
        if self.is_closed() {
            Err(WizardError::SessionClosed(self.id))
        } else {
            Ok(())
        }
    }

    fn emit(&self, event: WizardEvent) {
        // No subscribers is fine.
        let _ = self.tx.send(event);
    }

    pub async fn view(&self) -> SessionView {
        self.session.lock().await.view()
    }

    pub async fn controls(&self) -> Controls {
        self.session.lock().await.controls()
    }

    pub async fn submission(&self) -> SubmissionState {
        self.session.lock().await.submission().clone()
    }

    pub async fn current_step(&self) -> usize {
        self.session.lock().await.current_step()
    }

    pub async fn set_scalar(
        &self,
        field: &str,
        value: impl Into<String>,
    ) -> Result<(), WizardError> {
        self.ensure_open()?;
        let revision = {
            let mut session = self.session.lock().await;
            session.set_scalar(field, value)?;
            session.form().revision()
        };
        debug!(session_id = %self.id, field, revision, "Field set");
        self.emit(WizardEvent::FieldChanged {
            session_id: self.id,
            field: field.to_string(),
            revision,
        });
        Ok(())
    }

    /// Toggle an option in a multi-select field. Returns whether it is now
    /// selected.
    pub async fn toggle_in_set(&self, field: &str, value: &str) -> Result<bool, WizardError> {
        self.ensure_open()?;
        let (selected, revision) = {
            let mut session = self.session.lock().await;
            let selected = session.toggle_in_set(field, value)?;
            (selected, session.form().revision())
        };
        debug!(session_id = %self.id, field, value, selected, "Option toggled");
        self.emit(WizardEvent::FieldChanged {
            session_id: self.id,
            field: field.to_string(),
            revision,
        });
        Ok(selected)
    }

    pub async fn advance(&self) -> Result<usize, WizardError> {
        self.navigate(WizardSession::advance).await
    }

    pub async fn retreat(&self) -> Result<usize, WizardError> {
        self.navigate(WizardSession::retreat).await
    }

    async fn navigate(
        &self,
        op: fn(&mut WizardSession) -> Result<usize, WizardError>,
    ) -> Result<usize, WizardError> {
        self.ensure_open()?;
        let (step, step_id) = {
            let mut session = self.session.lock().await;
            let step = op(&mut *session)?;
            (step, session.step().id.clone())
        };
        debug!(session_id = %self.id, step, step_id = %step_id, "Step changed");
        self.emit(WizardEvent::StepChanged {
            session_id: self.id,
            step,
            step_id,
        });
        Ok(step)
    }

    /// Submit from the final step and wait for the gateway's answer.
    pub async fn submit(self: &Arc<Self>) -> Result<SubmissionState, WizardError> {
        let snapshot = self.begin(WizardSession::begin_submit).await?;
        self.run_attempt(snapshot).await
    }

    /// Enter `Submitting` now and finish the gateway call in the background.
    /// Rejections (wrong step, already in flight) are reported immediately.
    pub async fn start_submit(
        self: &Arc<Self>,
    ) -> Result<JoinHandle<Result<SubmissionState, WizardError>>, WizardError> {
        let snapshot = self.begin(WizardSession::begin_submit).await?;
        Ok(self.spawn_attempt(snapshot))
    }

    /// Retry after a failed submission and wait for the answer.
    pub async fn retry(self: &Arc<Self>) -> Result<SubmissionState, WizardError> {
        let snapshot = self.begin(WizardSession::begin_retry).await?;
        self.run_attempt(snapshot).await
    }

    pub async fn start_retry(
        self: &Arc<Self>,
    ) -> Result<JoinHandle<Result<SubmissionState, WizardError>>, WizardError> {
        let snapshot = self.begin(WizardSession::begin_retry).await?;
        Ok(self.spawn_attempt(snapshot))
    }

    async fn begin(
        &self,
        op: fn(&mut WizardSession) -> Result<FormSnapshot, WizardError>,
    ) -> Result<FormSnapshot, WizardError> {
        self.ensure_open()?;
        let (snapshot, attempt) = {
            let mut session = self.session.lock().await;
            let snapshot = op(&mut *session)?;
            let attempt = match session.submission() {
                SubmissionState::Submitting { attempt } => *attempt,
                _ => 0,
            };
            (snapshot, attempt)
        };
        info!(session_id = %self.id, attempt, "Submitting application");
        self.emit(WizardEvent::SubmissionStarted {
            session_id: self.id,
            attempt,
        });
        Ok(snapshot)
    }

    fn spawn_attempt(
        self: &Arc<Self>,
        snapshot: FormSnapshot,
    ) -> JoinHandle<Result<SubmissionState, WizardError>> {
        let controller = Arc::clone(self);
        tokio::spawn(async move { controller.run_attempt(snapshot).await })
    }

    async fn run_attempt(
        self: &Arc<Self>,
        snapshot: FormSnapshot,
    ) -> Result<SubmissionState, WizardError> {
        let timeout = self.config.submit_timeout;
        let outcome = match tokio::time::timeout(timeout, self.gateway.submit(snapshot)).await {
            Ok(Ok(receipt)) => Ok(receipt),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(GatewayError::Timeout(timeout).to_string()),
        };

        let state = {
            let mut session = self.session.lock().await;
            if self.is_closed() {
                debug!(session_id = %self.id, "Gateway answered after close, discarding");
                return Err(WizardError::SessionClosed(self.id));
            }
            session.finish_submit(outcome).clone()
        };

        match &state {
            SubmissionState::Succeeded { receipt } => {
                info!(
                    session_id = %self.id,
                    reference = %receipt.reference,
                    "Application submitted"
                );
                self.emit(WizardEvent::SubmissionSucceeded {
                    session_id: self.id,
                    reference: receipt.reference.clone(),
                });
                self.schedule_teardown();
            }
            SubmissionState::Failed { reason, attempts } => {
                warn!(session_id = %self.id, attempts, reason = %reason, "Submission failed");
                self.emit(WizardEvent::SubmissionFailed {
                    session_id: self.id,
                    reason: reason.clone(),
                    attempts: *attempts,
                });
            }
            SubmissionState::Idle | SubmissionState::Submitting { .. } => {}
        }

        Ok(state)
    }

    /// Arrange for the session to request close once the teardown delay
    /// passes. At most one teardown is pending per session.
    fn schedule_teardown(self: &Arc<Self>) {
        let Ok(mut slot) = self.teardown.lock() else {
            return;
        };
        // Checked under the slot lock so `close` either sees the handle or
        // we see the flag.
        if self.is_closed() || slot.is_some() {
            return;
        }

        let weak = Arc::downgrade(self);
        let delay = self.config.teardown_delay;
        debug!(session_id = %self.id, ?delay, "Teardown scheduled");
        *slot = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(controller) = weak.upgrade() {
                controller.teardown_elapsed();
            }
        }));
    }

    fn teardown_elapsed(&self) {
        // Release our own handle so `shut_down` does not abort this task.
        if let Ok(mut slot) = self.teardown.lock() {
            slot.take();
        }
        if self.is_closed() {
            return;
        }
        info!(session_id = %self.id, "Teardown delay elapsed, requesting close");
        self.emit(WizardEvent::CloseRequested {
            session_id: self.id,
        });
        self.shut_down();
    }

    /// Close the session. Cancels a pending teardown. Safe to call twice.
    pub fn close(&self) {
        self.shut_down();
    }

    fn shut_down(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Ok(mut slot) = self.teardown.lock() {
            if let Some(handle) = slot.take() {
                debug!(session_id = %self.id, "Cancelling pending teardown");
                handle.abort();
            }
        }
        info!(session_id = %self.id, "Wizard closed");
        self.emit(WizardEvent::Closed {
            session_id: self.id,
        });
    }
}

impl std::fmt::Debug for WizardController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WizardController")
            .field("id", &self.id)
            .field("gateway", &self.gateway.name())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl Drop for WizardController {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.teardown.lock() {
            if let Some(handle) = slot.take() {
                handle.abort();
            }
        }
    }
}
