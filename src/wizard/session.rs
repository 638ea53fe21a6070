//! Wizard session: the per-instance state value and its synchronous
//! transitions.
//!
//! Every operation either applies fully or is rejected with a
//! [`WizardError`] and leaves the session untouched.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::fields::{BlankPolicy, FieldValue, FormState};
use super::gateway::{FormSnapshot, SubmissionReceipt};
use super::steps::{Step, StepCatalog};
use super::validator;
use crate::error::WizardError;

/// Where the session is in the submit lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SubmissionState {
    Idle,
    Submitting { attempt: u32 },
    Succeeded { receipt: SubmissionReceipt },
    Failed { reason: String, attempts: u32 },
}

impl SubmissionState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Submitting { .. } => "submitting",
            Self::Succeeded { .. } => "succeeded",
            Self::Failed { .. } => "failed",
        }
    }

    /// Succeeded is terminal: only teardown follows.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }

    /// Whether the user may still edit fields and navigate.
    fn is_editable(&self) -> bool {
        matches!(self, Self::Idle | Self::Failed { .. })
    }
}

/// Which navigation controls are currently enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Controls {
    pub can_advance: bool,
    pub can_retreat: bool,
    pub can_submit: bool,
    pub can_retry: bool,
}

/// Serializable view of a session for hosts.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub id: Uuid,
    pub step: Step,
    pub total_steps: usize,
    pub controls: Controls,
    pub missing_fields: Vec<String>,
    pub submission: SubmissionState,
    pub fields: std::collections::BTreeMap<String, FieldValue>,
    pub revision: u64,
    pub opened_at: DateTime<Utc>,
}

/// One open wizard.
#[derive(Debug, Clone)]
pub struct WizardSession {
    id: Uuid,
    catalog: Arc<StepCatalog>,
    policy: BlankPolicy,
    current_step: usize,
    submission: SubmissionState,
    form: FormState,
    attempts: u32,
    opened_at: DateTime<Utc>,
}

impl WizardSession {
    /// Fresh session on step 0 with every field empty.
    pub fn new(catalog: Arc<StepCatalog>, policy: BlankPolicy) -> Self {
        let form = FormState::from_catalog(&catalog);
        Self {
            id: Uuid::new_v4(),
            catalog,
            policy,
            current_step: 0,
            submission: SubmissionState::Idle,
            form,
            attempts: 0,
            opened_at: Utc::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn current_step(&self) -> usize {
        self.current_step
    }

    pub fn step(&self) -> &Step {
        &self.catalog.steps()[self.current_step]
    }

    pub fn submission(&self) -> &SubmissionState {
        &self.submission
    }

    pub fn form(&self) -> &FormState {
        &self.form
    }

    pub fn catalog(&self) -> &StepCatalog {
        &self.catalog
    }

    fn is_last_step(&self) -> bool {
        self.current_step == self.catalog.last_ordinal()
    }

    /// Forward gate. Step 0 is always open so users can enter with no data.
    pub fn can_advance(&self) -> bool {
        self.submission.is_editable()
            && !self.is_last_step()
            && (self.current_step == 0
                || validator::can_advance(&self.catalog, self.current_step, &self.form, self.policy))
    }

    pub fn can_retreat(&self) -> bool {
        self.submission.is_editable() && self.current_step > 0
    }

    pub fn can_submit(&self) -> bool {
        self.is_last_step()
            && self.submission == SubmissionState::Idle
            && self.ensure_complete().is_ok()
    }

    pub fn can_retry(&self) -> bool {
        matches!(self.submission, SubmissionState::Failed { .. })
    }

    pub fn controls(&self) -> Controls {
        Controls {
            can_advance: self.can_advance(),
            can_retreat: self.can_retreat(),
            can_submit: self.can_submit(),
            can_retry: self.can_retry(),
        }
    }

    /// Required fields on the current step that are still empty.
    pub fn missing_fields(&self) -> Vec<&str> {
        validator::missing_fields(&self.catalog, self.current_step, &self.form, self.policy)
    }

    fn ensure_editable(&self, action: &'static str) -> Result<(), WizardError> {
        if self.submission.is_editable() {
            Ok(())
        } else {
            Err(WizardError::SessionLocked {
                action,
                state: self.submission.name(),
            })
        }
    }

    /// Every step's requirements must still hold when the form is sent.
    fn ensure_complete(&self) -> Result<(), WizardError> {
        match validator::first_incomplete(&self.catalog, &self.form, self.policy) {
            Some((step, missing)) => Err(WizardError::IncompleteApplication {
                step_id: step.id.clone(),
                missing: missing.join(", "),
            }),
            None => Ok(()),
        }
    }

    /// A user action after a failed submit means they are fixing something;
    /// the failure no longer describes the form.
    fn clear_failure(&mut self) {
        if matches!(self.submission, SubmissionState::Failed { .. }) {
            self.submission = SubmissionState::Idle;
        }
    }

    /// Move to the next step. Returns the new ordinal.
    pub fn advance(&mut self) -> Result<usize, WizardError> {
        self.ensure_editable("advance")?;
        if !self.can_advance() {
            return Err(WizardError::NavigationUnavailable {
                action: "advance",
                step: self.current_step,
            });
        }
        self.clear_failure();
        self.current_step += 1;
        Ok(self.current_step)
    }

    /// Move to the previous step. Never gated by validation.
    pub fn retreat(&mut self) -> Result<usize, WizardError> {
        self.ensure_editable("retreat")?;
        if self.current_step == 0 {
            return Err(WizardError::NavigationUnavailable {
                action: "retreat",
                step: 0,
            });
        }
        self.clear_failure();
        self.current_step -= 1;
        Ok(self.current_step)
    }

    pub fn set_scalar(&mut self, field: &str, value: impl Into<String>) -> Result<(), WizardError> {
        self.ensure_editable("edit fields")?;
        self.form.set_scalar(field, value)?;
        self.clear_failure();
        Ok(())
    }

    pub fn toggle_in_set(&mut self, field: &str, value: &str) -> Result<bool, WizardError> {
        self.ensure_editable("edit fields")?;
        let selected = self.form.toggle_in_set(field, value)?;
        self.clear_failure();
        Ok(selected)
    }

    pub fn snapshot(&self) -> FormSnapshot {
        FormSnapshot {
            session_id: self.id,
            captured_at: Utc::now(),
            fields: self.form.values().clone(),
        }
    }

    /// Enter `Submitting` from `Idle` on the last step and hand back the
    /// snapshot to send.
    pub fn begin_submit(&mut self) -> Result<FormSnapshot, WizardError> {
        match self.submission {
            SubmissionState::Idle => {}
            SubmissionState::Submitting { .. } => return Err(WizardError::SubmissionInFlight),
            ref other => {
                return Err(WizardError::SessionLocked {
                    action: "submit",
                    state: other.name(),
                });
            }
        }
        if !self.is_last_step() {
            return Err(WizardError::NotOnFinalStep {
                step: self.current_step,
                total: self.catalog.len(),
            });
        }
        self.ensure_complete()?;
        Ok(self.start_attempt())
    }

    /// Re-enter `Submitting` from `Failed`.
    pub fn begin_retry(&mut self) -> Result<FormSnapshot, WizardError> {
        match self.submission {
            SubmissionState::Failed { .. } => {}
            SubmissionState::Submitting { .. } => return Err(WizardError::SubmissionInFlight),
            ref other => return Err(WizardError::NothingToRetry(other.name())),
        }
        if !self.is_last_step() {
            return Err(WizardError::NotOnFinalStep {
                step: self.current_step,
                total: self.catalog.len(),
            });
        }
        self.ensure_complete()?;
        Ok(self.start_attempt())
    }

    fn start_attempt(&mut self) -> FormSnapshot {
        self.attempts += 1;
        self.submission = SubmissionState::Submitting {
            attempt: self.attempts,
        };
        self.snapshot()
    }

    /// Record the gateway outcome. Ignored unless a submission is in flight.
    pub fn finish_submit(
        &mut self,
        outcome: Result<SubmissionReceipt, String>,
    ) -> &SubmissionState {
        if matches!(self.submission, SubmissionState::Submitting { .. }) {
            self.submission = match outcome {
                Ok(receipt) => SubmissionState::Succeeded { receipt },
                Err(reason) => SubmissionState::Failed {
                    reason,
                    attempts: self.attempts,
                },
            };
        }
        &self.submission
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            id: self.id,
            step: self.step().clone(),
            total_steps: self.catalog.len(),
            controls: self.controls(),
            missing_fields: self.missing_fields().into_iter().map(String::from).collect(),
            submission: self.submission.clone(),
            fields: self.form.values().clone(),
            revision: self.form.revision(),
            opened_at: self.opened_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wizard::steps::{membership_catalog, names};

    fn session() -> WizardSession {
        WizardSession::new(Arc::new(membership_catalog().unwrap()), BlankPolicy::Trim)
    }

    fn fill_contact(s: &mut WizardSession) {
        s.set_scalar(names::FIRST_NAME, "John").unwrap();
        s.set_scalar(names::LAST_NAME, "Smith").unwrap();
        s.set_scalar(names::EMAIL, "john@x.com").unwrap();
        s.set_scalar(names::PHONE, "555-1234").unwrap();
    }

    /// Walk a session to the review step with every required answer given.
    fn at_review() -> WizardSession {
        let mut s = session();
        s.advance().unwrap();
        fill_contact(&mut s);
        s.advance().unwrap();
        s.set_scalar(names::RESIDENCE, "Monaco").unwrap();
        s.advance().unwrap();
        s.set_scalar(names::NET_WORTH, "$100M+").unwrap();
        s.advance().unwrap();
        s.toggle_in_set(names::INVESTMENT_INTERESTS, "Private Equity").unwrap();
        s.advance().unwrap();
        s.toggle_in_set(names::LIFESTYLE_INTERESTS, "Yachting").unwrap();
        s.advance().unwrap();
        s.set_scalar(names::REFERRAL_SOURCE, "Member referral").unwrap();
        s.advance().unwrap();
        assert_eq!(s.current_step(), 7);
        s
    }

    #[test]
    fn new_session_starts_idle_at_zero() {
        let s = session();
        assert_eq!(s.current_step(), 0);
        assert_eq!(s.submission(), &SubmissionState::Idle);
        assert_eq!(s.step().id, "welcome");
        assert_eq!(s.form().revision(), 0);
    }

    #[test]
    fn sessions_do_not_share_state() {
        let mut a = session();
        let b = session();
        assert_ne!(a.id(), b.id());
        a.set_scalar(names::FIRST_NAME, "John").unwrap();
        assert_eq!(b.form().text(names::FIRST_NAME), Some(""));
    }

    #[test]
    fn welcome_step_always_advances() {
        // Scenario A
        let mut s = session();
        assert!(s.can_advance());
        assert_eq!(s.advance().unwrap(), 1);
        assert!(!validator::can_advance(
            s.catalog(),
            1,
            s.form(),
            BlankPolicy::Trim
        ));
        assert!(!s.can_advance());
    }

    #[test]
    fn contact_details_unlock_next_step() {
        // Scenario B
        let mut s = session();
        s.advance().unwrap();
        let err = s.advance().unwrap_err();
        assert_eq!(
            err,
            WizardError::NavigationUnavailable {
                action: "advance",
                step: 1
            }
        );
        assert_eq!(s.current_step(), 1);

        fill_contact(&mut s);
        assert!(s.can_advance());
        assert_eq!(s.advance().unwrap(), 2);
    }

    #[test]
    fn toggling_interest_off_relocks_step() {
        // Scenario C
        let mut s = at_review();
        while s.current_step() > 4 {
            s.retreat().unwrap();
        }
        assert_eq!(s.step().id, "investments");

        s.toggle_in_set(names::INVESTMENT_INTERESTS, "Private Equity").unwrap();
        assert!(s.form().set(names::INVESTMENT_INTERESTS).unwrap().is_empty());
        assert!(!s.can_advance());

        s.toggle_in_set(names::INVESTMENT_INTERESTS, "Private Equity").unwrap();
        assert!(s.can_advance());
    }

    #[test]
    fn retreat_from_first_step_is_rejected() {
        let mut s = session();
        assert!(!s.can_retreat());
        assert!(s.retreat().is_err());
        assert_eq!(s.current_step(), 0);
    }

    #[test]
    fn retreat_ignores_validation() {
        let mut s = session();
        s.advance().unwrap();
        assert!(!s.can_advance());
        assert_eq!(s.retreat().unwrap(), 0);
    }

    #[test]
    fn step_stays_in_range() {
        let mut s = at_review();
        let last = s.catalog().last_ordinal();
        assert!(s.advance().is_err());
        assert_eq!(s.current_step(), last);

        for _ in 0..20 {
            let _ = s.retreat();
            assert!(s.current_step() <= last);
        }
        assert_eq!(s.current_step(), 0);
        for _ in 0..20 {
            let _ = s.advance();
            assert!(s.current_step() <= last);
        }
        assert_eq!(s.current_step(), last);
    }

    #[test]
    fn submit_only_on_final_step() {
        let mut s = session();
        assert!(!s.can_submit());
        assert_eq!(
            s.begin_submit().unwrap_err(),
            WizardError::NotOnFinalStep { step: 0, total: 8 }
        );
        assert_eq!(s.submission(), &SubmissionState::Idle);
    }

    #[test]
    fn submit_is_not_reentrant() {
        let mut s = at_review();
        let snapshot = s.begin_submit().unwrap();
        assert_eq!(snapshot.session_id, s.id());
        assert_eq!(
            snapshot.fields[names::FIRST_NAME],
            FieldValue::Text("John".into())
        );
        assert_eq!(s.submission(), &SubmissionState::Submitting { attempt: 1 });

        assert_eq!(s.begin_submit().unwrap_err(), WizardError::SubmissionInFlight);
        assert_eq!(s.submission(), &SubmissionState::Submitting { attempt: 1 });
    }

    #[test]
    fn session_locked_while_submitting() {
        let mut s = at_review();
        s.begin_submit().unwrap();
        assert!(matches!(
            s.set_scalar(names::NOTES, "late edit"),
            Err(WizardError::SessionLocked { .. })
        ));
        assert!(s.retreat().is_err());
        assert_eq!(s.current_step(), 7);
        assert_eq!(s.form().text(names::NOTES), Some(""));
    }

    #[test]
    fn submit_rechecks_passed_steps() {
        let mut s = at_review();
        s.set_scalar(names::FIRST_NAME, "").unwrap();
        s.toggle_in_set(names::INVESTMENT_INTERESTS, "Private Equity").unwrap();
        assert!(!s.can_submit());

        assert_eq!(
            s.begin_submit().unwrap_err(),
            WizardError::IncompleteApplication {
                step_id: "contact".into(),
                missing: names::FIRST_NAME.into(),
            }
        );
        assert_eq!(s.submission(), &SubmissionState::Idle);

        s.set_scalar(names::FIRST_NAME, "John").unwrap();
        assert!(matches!(
            s.begin_submit(),
            Err(WizardError::IncompleteApplication { ref step_id, .. }) if step_id == "investments"
        ));

        s.toggle_in_set(names::INVESTMENT_INTERESTS, "Fine Art").unwrap();
        assert!(s.can_submit());
        let snapshot = s.begin_submit().unwrap();
        assert_eq!(
            snapshot.fields[names::FIRST_NAME],
            FieldValue::Text("John".into())
        );
    }

    #[test]
    fn success_is_terminal() {
        let mut s = at_review();
        s.begin_submit().unwrap();
        let state = s.finish_submit(Ok(SubmissionReceipt::new("REF-1"))).clone();
        assert!(state.is_terminal());

        assert!(s.begin_submit().is_err());
        assert!(s.begin_retry().is_err());
        assert!(s.retreat().is_err());
        assert!(s.set_scalar(names::NOTES, "x").is_err());
        assert_eq!(
            s.controls(),
            Controls {
                can_advance: false,
                can_retreat: false,
                can_submit: false,
                can_retry: false
            }
        );
    }

    #[test]
    fn failure_then_retry() {
        let mut s = at_review();
        s.begin_submit().unwrap();
        s.finish_submit(Err("connection reset".into()));
        assert_eq!(
            s.submission(),
            &SubmissionState::Failed {
                reason: "connection reset".into(),
                attempts: 1
            }
        );
        assert!(s.can_retry());
        assert!(!s.can_submit());

        s.begin_retry().unwrap();
        assert_eq!(s.submission(), &SubmissionState::Submitting { attempt: 2 });
        s.finish_submit(Ok(SubmissionReceipt::new("REF-2")));
        assert!(s.submission().is_terminal());
    }

    #[test]
    fn editing_after_failure_returns_to_idle() {
        let mut s = at_review();
        s.begin_submit().unwrap();
        s.finish_submit(Err("timeout".into()));

        s.retreat().unwrap();
        assert_eq!(s.submission(), &SubmissionState::Idle);
        s.advance().unwrap();
        assert!(s.can_submit());
    }

    #[test]
    fn finish_without_submit_is_ignored() {
        let mut s = at_review();
        s.finish_submit(Ok(SubmissionReceipt::new("stray")));
        assert_eq!(s.submission(), &SubmissionState::Idle);
    }

    #[test]
    fn view_reports_missing_fields() {
        let mut s = session();
        s.advance().unwrap();
        s.set_scalar(names::FIRST_NAME, "John").unwrap();
        let view = s.view();
        assert_eq!(view.step.id, "contact");
        assert_eq!(view.total_steps, 8);
        assert_eq!(
            view.missing_fields,
            vec![names::LAST_NAME, names::EMAIL, names::PHONE]
        );
        assert!(!view.controls.can_advance);
        assert!(view.controls.can_retreat);
        assert_eq!(view.revision, 1);

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["submission"]["state"], "idle");
        assert_eq!(json["step"]["kind"], "details");
    }
}
