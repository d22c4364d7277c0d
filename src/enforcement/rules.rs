//! Protocol rules for each transition entry point, using Validation.

use crate::enforcement::context::{Operation, ProtocolContext};
use crate::enforcement::violations::Violation;
use crate::error::{Result, StsError};
use stillwater::validation::Validation;
use stillwater::NonEmptyVec;

type Check = Validation<(), NonEmptyVec<Violation>>;

/// Run every rule that applies to the operation, accumulating ALL violations.
pub fn check(context: &ProtocolContext<'_>) -> Check {
    let mut checks: Vec<Check> = Vec::new();

    match context.operation {
        Operation::Start => {
            checks.push(require_idle(context));
        }
        Operation::End => {
            checks.push(require_open(context));
            checks.push(require_target(context));
        }
        Operation::Immediate => {
            checks.push(require_idle(context));
            checks.push(require_target(context));
        }
    }

    Validation::all_vec(checks).map(|_| ())
}

/// [`check`], converted into a StateError listing every violation.
pub fn enforce(context: &ProtocolContext<'_>) -> Result<()> {
    match check(context) {
        Validation::Success(_) => Ok(()),
        Validation::Failure(errors) => Err(StsError::State {
            violations: errors.iter().cloned().collect(),
        }),
    }
}

fn require_idle(context: &ProtocolContext<'_>) -> Check {
    if context.in_transition {
        Validation::fail(Violation::AlreadyInTransition)
    } else {
        Validation::success(())
    }
}

fn require_open(context: &ProtocolContext<'_>) -> Check {
    if context.in_transition {
        Validation::success(())
    } else {
        Validation::fail(Violation::NotInTransition)
    }
}

fn require_target(context: &ProtocolContext<'_>) -> Check {
    if context.target.is_none() {
        Validation::fail(Violation::MissingState)
    } else if context.targets_sentinel() {
        Validation::fail(Violation::ReservedState {
            name: context.sentinel.name.clone(),
        })
    } else {
        Validation::success(())
    }
}
