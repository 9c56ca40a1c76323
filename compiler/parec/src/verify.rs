//! Lens chain consistency checks.
//!
//! Every member of the input program that still exists under its renamed
//! reference must lead back, through
//! [`get_original_type`](pare_lens::GraphLens::get_original_type) and
//! friends, to a member of the input that renames to the same reference.
//! Merged members share one representative original, so the original found
//! need not be the member the check started from.

use std::fmt::Display;

use pare_app::AppView;
use pare_ir::Program;

use crate::error::{Pass, PipelineError};

pub(crate) fn verify_lenses(input: &Program, app: &AppView, pass: Pass) -> Result<(), PipelineError> {
    let lens = app.lens();
    let output = app.program();
    let mut checked = 0_usize;
    for class in input.program_classes() {
        let ty = lens.get_renamed_type(class.ty);
        if output.class(ty).is_some_and(|c| c.is_program()) {
            let found = lens.get_original_type(ty);
            let consistent = input.contains(found) && lens.get_renamed_type(found) == ty;
            check(consistent, pass, class.ty, ty, found)?;
            checked += 1;
        }
        for field in &class.fields {
            let current = lens.get_renamed_field(field.reference);
            if output.field(&current).is_none() {
                continue;
            }
            let found = lens.get_original_field_signature(current);
            let consistent =
                input.field(&found).is_some() && lens.get_renamed_field(found) == current;
            check(consistent, pass, field.reference, current, found)?;
            checked += 1;
        }
        for method in &class.methods {
            let current = lens.get_renamed_method(&method.reference);
            if output.method(&current).is_none() {
                continue;
            }
            let found = lens.get_original_method_signature(&current);
            let consistent =
                input.method(&found).is_some() && lens.get_renamed_method(&found) == current;
            check(consistent, pass, &method.reference, &current, &found)?;
            checked += 1;
        }
    }
    tracing::debug!(%pass, checked, depth = lens.depth(), "lens chain verified");
    Ok(())
}

fn check(
    consistent: bool,
    pass: Pass,
    original: impl Display,
    current: impl Display,
    found: impl Display,
) -> Result<(), PipelineError> {
    if consistent {
        return Ok(());
    }
    Err(PipelineError::LensVerification {
        pass,
        original: original.to_string(),
        current: current.to_string(),
        found: found.to_string(),
    })
}

#[cfg(test)]
#[expect(
    clippy::unwrap_used,
    reason = "tests use unwrap for concise assertions"
)]
