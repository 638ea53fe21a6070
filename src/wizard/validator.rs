//! Step gating: decides whether the user may move forward from a step.
//!
//! Pure functions over the catalog and form state. A failed gate is not an
//! error; hosts disable the continue control and may show `missing_fields`.

use super::fields::{BlankPolicy, FormState};
use super::steps::{Step, StepCatalog, StepKind};

/// Whether the step at `ordinal` has everything it needs.
///
/// Unknown ordinals never pass.
pub fn can_advance(
    catalog: &StepCatalog,
    ordinal: usize,
    form: &FormState,
    policy: BlankPolicy,
) -> bool {
    match catalog.get(ordinal) {
        Some(_) => missing_fields(catalog, ordinal, form, policy).is_empty(),
        None => false,
    }
}

/// Required fields of the step at `ordinal` that are still empty, in
/// declaration order.
pub fn missing_fields<'a>(
    catalog: &'a StepCatalog,
    ordinal: usize,
    form: &FormState,
    policy: BlankPolicy,
) -> Vec<&'a str> {
    let Some(step) = catalog.get(ordinal) else {
        return Vec::new();
    };

    match &step.kind {
        StepKind::Intro | StepKind::Review => Vec::new(),
        StepKind::Details { required, .. } => required
            .iter()
            .filter(|field| !form.is_filled(field, policy))
            .map(String::as_str)
            .collect(),
        StepKind::Selection { field } => {
            if form.is_filled(field, policy) {
                Vec::new()
            } else {
                vec![field.as_str()]
            }
        }
    }
}

/// The first step whose requirements are not met, with the fields it is
/// missing. Answers stay editable after their step is passed, so the whole
/// form is re-checked before it leaves the session.
pub fn first_incomplete<'a>(
    catalog: &'a StepCatalog,
    form: &FormState,
    policy: BlankPolicy,
) -> Option<(&'a Step, Vec<&'a str>)> {
    catalog.steps().iter().find_map(|step| {
        let missing = missing_fields(catalog, step.ordinal, form, policy);
        (!missing.is_empty()).then_some((step, missing))
    })
}
