//! Form state: the accumulated answers of one wizard session.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::steps::{FieldKind, StepCatalog};
use crate::error::WizardError;

/// The value held by one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Free text or the chosen option of a single-select field.
    Text(String),
    /// Selected options of a multi-select field.
    Set(BTreeSet<String>),
}

impl FieldValue {
    fn kind_name(&self) -> &'static str {
        match self {
            Self::Text(_) => "scalar",
            Self::Set(_) => "multi_select",
        }
    }
}

/// How blank scalar input is judged when gating.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlankPolicy {
    /// Whitespace-only input counts as empty.
    #[default]
    Trim,
    /// Any non-empty string counts as filled, whitespace included.
    Literal,
}

impl std::str::FromStr for BlankPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trim" => Ok(Self::Trim),
            "literal" => Ok(Self::Literal),
            other => Err(format!("expected \"trim\" or \"literal\", got \"{other}\"")),
        }
    }
}

/// Field name → value, pre-declared from the catalog.
///
/// Fields are only ever overwritten or toggled, never removed. Every accepted
/// mutation bumps `revision`, which hosts use as the re-render mark.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FormState {
    values: BTreeMap<String, FieldValue>,
    revision: u64,
}

impl FormState {
    /// Declare every catalog field with an empty default.
    pub fn from_catalog(catalog: &StepCatalog) -> Self {
        let values = catalog
            .fields()
            .iter()
            .map(|spec| {
                let empty = match spec.kind {
                    FieldKind::MultiSelect { .. } => FieldValue::Set(BTreeSet::new()),
                    FieldKind::Text | FieldKind::Choice { .. } => FieldValue::Text(String::new()),
                };
                (spec.name.clone(), empty)
            })
            .collect();
        Self {
            values,
            revision: 0,
        }
    }

    /// Overwrite a text or single-select field. The content itself is not
    /// checked here; gating happens in the validator.
    pub fn set_scalar(&mut self, field: &str, value: impl Into<String>) -> Result<(), WizardError> {
        match self.values.get_mut(field) {
            Some(FieldValue::Text(current)) => {
                *current = value.into();
                self.revision += 1;
                Ok(())
            }
            Some(other) => Err(WizardError::FieldKindMismatch {
                field: field.to_string(),
                expected: "scalar",
                actual: other.kind_name(),
            }),
            None => Err(WizardError::UnknownField(field.to_string())),
        }
    }

    /// Insert `value` into a multi-select field, or remove it if present.
    /// Returns whether the value is selected afterwards.
    pub fn toggle_in_set(&mut self, field: &str, value: &str) -> Result<bool, WizardError> {
        match self.values.get_mut(field) {
            Some(FieldValue::Set(set)) => {
                let selected = if set.remove(value) {
                    false
                } else {
                    set.insert(value.to_string());
                    true
                };
                self.revision += 1;
                Ok(selected)
            }
            Some(other) => Err(WizardError::FieldKindMismatch {
                field: field.to_string(),
                expected: "multi_select",
                actual: other.kind_name(),
            }),
            None => Err(WizardError::UnknownField(field.to_string())),
        }
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.values.get(field)
    }

    /// Text of a scalar field, `None` for unknown or multi-select fields.
    pub fn text(&self, field: &str) -> Option<&str> {
        match self.values.get(field) {
            Some(FieldValue::Text(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Members of a multi-select field, `None` for unknown or scalar fields.
    pub fn set(&self, field: &str) -> Option<&BTreeSet<String>> {
        match self.values.get(field) {
            Some(FieldValue::Set(set)) => Some(set),
            _ => None,
        }
    }

    /// Whether a field counts as answered. Unknown fields are never filled.
    pub fn is_filled(&self, field: &str, policy: BlankPolicy) -> bool {
        match self.values.get(field) {
            Some(FieldValue::Text(s)) => match policy {
                BlankPolicy::Trim => !s.trim().is_empty(),
                BlankPolicy::Literal => !s.is_empty(),
            },
            Some(FieldValue::Set(set)) => !set.is_empty(),
            None => false,
        }
    }

    pub fn values(&self) -> &BTreeMap<String, FieldValue> {
        &self.values
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }
}
