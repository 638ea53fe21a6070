//! Membership application wizard: a staged-disclosure form engine.
//!
//! A wizard walks a user through an ordered catalog of steps. Each step
//! gates forward navigation on its own required fields, answers accumulate
//! in one form state per session, and the final step hands a snapshot to a
//! submission gateway. After a successful submission the session asks its
//! host to close after a short delay.

pub mod controller;
pub mod fields;
pub mod gateway;
pub mod registry;
pub mod routes;
pub mod session;
pub mod steps;
pub mod validator;

pub use controller::{ControllerConfig, WizardController, WizardEvent};
pub use fields::{BlankPolicy, FieldValue, FormState};
pub use gateway::{FormSnapshot, HttpGateway, LoggingGateway, SubmissionGateway, SubmissionReceipt};
pub use registry::SessionRegistry;
pub use routes::{WizardRouteState, wizard_routes};
pub use session::{Controls, SessionView, SubmissionState, WizardSession};
pub use steps::{FieldKind, FieldSpec, Step, StepCatalog, StepKind, membership_catalog};
