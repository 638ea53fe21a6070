//! Step catalog: the ordered, immutable list of wizard steps and the fields
//! they own.
//!
//! Each step carries a [`StepKind`] describing what it collects. Validation
//! and rendering dispatch on the kind, looked up by step id, so the step list
//! is the single source of truth for what each screen requires.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::CatalogError;

/// What kind of value a field holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
    /// Free text.
    Text,
    /// Single-select enumeration, stored as the chosen option's text.
    Choice { options: Vec<String> },
    /// Toggle-set of options.
    MultiSelect { options: Vec<String> },
}

impl FieldKind {
    /// Whether the field is written with `set_scalar` (text or single choice).
    pub fn is_scalar(&self) -> bool {
        !matches!(self, Self::MultiSelect { .. })
    }
}

/// A declared form field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub label: String,
    pub kind: FieldKind,
}

impl FieldSpec {
    pub fn text(name: &str, label: &str) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            kind: FieldKind::Text,
        }
    }

    pub fn choice(name: &str, label: &str, options: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            kind: FieldKind::Choice {
                options: options.iter().map(|s| s.to_string()).collect(),
            },
        }
    }

    pub fn multi_select(name: &str, label: &str, options: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            kind: FieldKind::MultiSelect {
                options: options.iter().map(|s| s.to_string()).collect(),
            },
        }
    }
}

/// What a step collects, and therefore how it is gated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepKind {
    /// Welcome screen. Never gated.
    Intro,
    /// Scalar fields; every field in `required` must be filled.
    Details {
        fields: Vec<String>,
        required: Vec<String>,
    },
    /// One multi-select field that needs at least one selection.
    Selection { field: String },
    /// Read-only summary of the collected answers.
    Review,
}

/// One screen of the wizard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    pub title: String,
    pub subtitle: String,
    pub ordinal: usize,
    #[serde(flatten)]
    pub kind: StepKind,
}

impl Step {
    pub fn new(ordinal: usize, id: &str, title: &str, subtitle: &str, kind: StepKind) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            subtitle: subtitle.to_string(),
            ordinal,
            kind,
        }
    }

    /// Names of the fields this step owns.
    pub fn fields(&self) -> Vec<&str> {
        match &self.kind {
            StepKind::Intro | StepKind::Review => Vec::new(),
            StepKind::Details { fields, .. } => fields.iter().map(String::as_str).collect(),
            StepKind::Selection { field } => vec![field.as_str()],
        }
    }
}

/// Validated, ordered step list plus the field declarations.
#[derive(Debug, Clone, Serialize)]
pub struct StepCatalog {
    steps: Vec<Step>,
    fields: Vec<FieldSpec>,
    #[serde(skip)]
    by_id: HashMap<String, usize>,
}

impl StepCatalog {
    /// Build a catalog, checking that ordinals are contiguous from zero, ids
    /// are unique, and every field a step references is declared with a
    /// matching kind and owned by exactly one step.
    pub fn new(steps: Vec<Step>, fields: Vec<FieldSpec>) -> Result<Self, CatalogError> {
        if steps.is_empty() {
            return Err(CatalogError::Empty);
        }

        let by_id = Self::check(&steps, &fields)?;
        Ok(Self {
            steps,
            fields,
            by_id,
        })
    }

    fn check(steps: &[Step], fields: &[FieldSpec]) -> Result<HashMap<String, usize>, CatalogError> {
        let mut declared: HashMap<&str, &FieldSpec> = HashMap::new();
        for field in fields {
            if declared.insert(field.name.as_str(), field).is_some() {
                return Err(CatalogError::DuplicateField(field.name.clone()));
            }
        }

        let mut by_id = HashMap::new();
        let mut owners: HashMap<&str, &str> = HashMap::new();
        for (expected, step) in steps.iter().enumerate() {
            if step.ordinal != expected {
                return Err(CatalogError::OrdinalGap {
                    id: step.id.clone(),
                    expected,
                    found: step.ordinal,
                });
            }
            if by_id.insert(step.id.clone(), expected).is_some() {
                return Err(CatalogError::DuplicateStep(step.id.clone()));
            }

            for name in step.fields() {
                let spec = declared
                    .get(name)
                    .ok_or_else(|| CatalogError::UndeclaredField {
                        step: step.id.clone(),
                        field: name.to_string(),
                    })?;
                let kind_ok = match step.kind {
                    StepKind::Selection { .. } => !spec.kind.is_scalar(),
                    _ => spec.kind.is_scalar(),
                };
                if !kind_ok {
                    return Err(CatalogError::WrongFieldKind {
                        step: step.id.clone(),
                        field: name.to_string(),
                    });
                }
                if let Some(first) = owners.insert(name, step.id.as_str()) {
                    return Err(CatalogError::SharedField {
                        field: name.to_string(),
                        first: first.to_string(),
                        second: step.id.clone(),
                    });
                }
            }

            if let StepKind::Details { fields, required } = &step.kind {
                if let Some(missing) = required.iter().find(|r| !fields.contains(r)) {
                    return Err(CatalogError::RequiredNotOwned {
                        step: step.id.clone(),
                        field: missing.clone(),
                    });
                }
            }
        }

        Ok(by_id)
    }

    /// Number of steps (`N`).
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Always false for a constructed catalog.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn last_ordinal(&self) -> usize {
        self.steps.len() - 1
    }

    pub fn get(&self, ordinal: usize) -> Option<&Step> {
        self.steps.get(ordinal)
    }

    pub fn by_id(&self, id: &str) -> Option<&Step> {
        self.by_id.get(id).map(|&i| &self.steps[i])
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }
}

/// Field names used by the membership application.
pub mod names {
    pub const FIRST_NAME: &str = "first_name";
    pub const LAST_NAME: &str = "last_name";
    pub const EMAIL: &str = "email";
    pub const PHONE: &str = "phone";
    pub const RESIDENCE: &str = "residence";
    pub const SECONDARY_RESIDENCES: &str = "secondary_residences";
    pub const NET_WORTH: &str = "net_worth";
    pub const INVESTMENT_INTERESTS: &str = "investment_interests";
    pub const LIFESTYLE_INTERESTS: &str = "lifestyle_interests";
    pub const REFERRAL_SOURCE: &str = "referral_source";
    pub const NOTES: &str = "notes";
}

/// The built-in membership application: welcome, contact details,
/// residence, net worth, investment interests, lifestyle interests,
/// referral source, review.
pub fn membership_catalog() -> Result<StepCatalog, CatalogError> {
    use names::*;

    let fields = vec![
        FieldSpec::text(FIRST_NAME, "First name"),
        FieldSpec::text(LAST_NAME, "Last name"),
        FieldSpec::text(EMAIL, "Email"),
        FieldSpec::text(PHONE, "Phone"),
        FieldSpec::text(RESIDENCE, "Primary residence"),
        FieldSpec::text(SECONDARY_RESIDENCES, "Other residences"),
        FieldSpec::choice(
            NET_WORTH,
            "Net worth",
            &["$5M - $10M", "$10M - $25M", "$25M - $100M", "$100M+"],
        ),
        FieldSpec::multi_select(
            INVESTMENT_INTERESTS,
            "Investment interests",
            &[
                "Private Equity",
                "Real Estate",
                "Venture Capital",
                "Hedge Funds",
                "Fine Art",
                "Philanthropy",
            ],
        ),
        FieldSpec::multi_select(
            LIFESTYLE_INTERESTS,
            "Lifestyle interests",
            &[
                "Private Aviation",
                "Yachting",
                "Fine Dining",
                "Luxury Travel",
                "Wellness",
                "Exclusive Events",
            ],
        ),
        FieldSpec::choice(
            REFERRAL_SOURCE,
            "How did you hear about us?",
            &[
                "Member referral",
                "Private banker",
                "Family office",
                "Press",
                "Event",
                "Other",
            ],
        ),
        FieldSpec::text(NOTES, "Anything else we should know?"),
    ];

    let owned = |names: &[&str]| names.iter().map(|s| s.to_string()).collect::<Vec<_>>();

    let steps = vec![
        Step::new(
            0,
            "welcome",
            "Welcome",
            "Membership is by application only",
            StepKind::Intro,
        ),
        Step::new(
            1,
            "contact",
            "Personal Details",
            "How should we reach you?",
            StepKind::Details {
                fields: owned(&[FIRST_NAME, LAST_NAME, EMAIL, PHONE]),
                required: owned(&[FIRST_NAME, LAST_NAME, EMAIL, PHONE]),
            },
        ),
        Step::new(
            2,
            "residence",
            "Residence",
            "Where do you spend most of your time?",
            StepKind::Details {
                fields: owned(&[RESIDENCE, SECONDARY_RESIDENCES]),
                required: owned(&[RESIDENCE]),
            },
        ),
        Step::new(
            3,
            "net_worth",
            "Financial Profile",
            "Your approximate net worth",
            StepKind::Details {
                fields: owned(&[NET_WORTH]),
                required: owned(&[NET_WORTH]),
            },
        ),
        Step::new(
            4,
            "investments",
            "Investment Interests",
            "Select all that apply",
            StepKind::Selection {
                field: INVESTMENT_INTERESTS.to_string(),
            },
        ),
        Step::new(
            5,
            "lifestyle",
            "Lifestyle",
            "Select all that apply",
            StepKind::Selection {
                field: LIFESTYLE_INTERESTS.to_string(),
            },
        ),
        Step::new(
            6,
            "referral",
            "Introduction",
            "How did you hear about us?",
            StepKind::Details {
                fields: owned(&[REFERRAL_SOURCE, NOTES]),
                required: owned(&[REFERRAL_SOURCE]),
            },
        ),
        Step::new(
            7,
            "review",
            "Review",
            "Confirm your application",
            StepKind::Review,
        ),
    ];

    StepCatalog::new(steps, fields)
}
